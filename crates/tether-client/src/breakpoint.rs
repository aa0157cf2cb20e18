//! Breakpoint and watchpoint bookkeeping.

use std::collections::BTreeMap;

use tether_proto::BreakpointKind;

/// A client-side breakpoint or watchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Target address.
    pub addr: u64,
    pub kind: BreakpointKind,
    /// Bytes covered (instruction length or watched span).
    pub len: u32,
    /// Whether the remote accepted it.
    pub installed: bool,
}

impl Breakpoint {
    pub fn new(addr: u64, kind: BreakpointKind, len: u32) -> Self {
        Self {
            addr,
            kind,
            len,
            installed: false,
        }
    }
}

fn kind_key(kind: BreakpointKind) -> u8 {
    kind.to_bits()
}

/// Breakpoints of the current process, keyed by address and kind.
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    entries: BTreeMap<(u64, u8), Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for (`bp.addr`, `bp.kind`).
    pub fn insert(&mut self, bp: Breakpoint) {
        self.entries.insert((bp.addr, kind_key(bp.kind)), bp);
    }

    /// Remove an entry. Returns it if it existed.
    pub fn remove(&mut self, addr: u64, kind: BreakpointKind) -> Option<Breakpoint> {
        self.entries.remove(&(addr, kind_key(kind)))
    }

    pub fn get(&self, addr: u64, kind: BreakpointKind) -> Option<&Breakpoint> {
        self.entries.get(&(addr, kind_key(kind)))
    }

    pub fn set_installed(&mut self, addr: u64, kind: BreakpointKind, installed: bool) {
        if let Some(bp) = self.entries.get_mut(&(addr, kind_key(kind))) {
            bp.installed = installed;
        }
    }

    /// Breakpoints at `addr` of any kind.
    pub fn at(&self, addr: u64) -> impl Iterator<Item = &Breakpoint> {
        self.entries
            .range((addr, 0)..=(addr, u8::MAX))
            .map(|(_, bp)| bp)
    }

    /// Mark everything uninstalled, e.g. after the process went away.
    pub fn uninstall_all(&mut self) {
        for bp in self.entries.values_mut() {
            bp.installed = false;
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_insert_and_install() {
        let mut table = BreakpointTable::new();
        table.insert(Breakpoint::new(0x1000, BreakpointKind::SoftwareExec, 1));
        assert!(!table.get(0x1000, BreakpointKind::SoftwareExec).unwrap().installed);

        table.set_installed(0x1000, BreakpointKind::SoftwareExec, true);
        assert!(table.get(0x1000, BreakpointKind::SoftwareExec).unwrap().installed);
    }

    #[test]
    fn breakpoint_kinds_at_same_address_are_distinct() {
        let mut table = BreakpointTable::new();
        table.insert(Breakpoint::new(0x2000, BreakpointKind::SoftwareExec, 1));
        table.insert(Breakpoint::new(0x2000, BreakpointKind::HardwareModify, 4));
        table.insert(Breakpoint::new(0x3000, BreakpointKind::HardwareRead, 8));

        assert_eq!(table.len(), 3);
        assert_eq!(table.at(0x2000).count(), 2);

        assert!(table.remove(0x2000, BreakpointKind::SoftwareExec).is_some());
        assert!(table.remove(0x2000, BreakpointKind::SoftwareExec).is_none());
        assert_eq!(table.at(0x2000).count(), 1);
    }

    #[test]
    fn breakpoint_uninstall_all() {
        let mut table = BreakpointTable::new();
        table.insert(Breakpoint::new(0x10, BreakpointKind::HardwareExec, 1));
        table.set_installed(0x10, BreakpointKind::HardwareExec, true);
        table.uninstall_all();
        assert!(table.all().all(|bp| !bp.installed));
        assert!(!table.is_empty());
    }
}
