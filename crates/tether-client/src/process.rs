//! Process and thread records owned by the session.

use std::collections::BTreeMap;
use std::fmt;

use tether_proto::{ProcessLoad, ThreadBrief, ThreadInfo, ThreadState};

use crate::arch::Cpu;

/// Execution-context identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptid {
    pub pid: i32,
    pub tid: i32,
}

impl Ptid {
    pub const fn new(pid: i32, tid: i32) -> Self {
        Self { pid, tid }
    }
}

impl fmt::Display for Ptid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pid, self.tid)
    }
}

/// What can be inspected in the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validity {
    pub execution: bool,
    pub stack: bool,
    pub registers: bool,
    pub memory: bool,
}

impl Validity {
    pub const ALL: Self = Self {
        execution: true,
        stack: true,
        registers: true,
        memory: true,
    };

    pub fn any(&self) -> bool {
        self.execution || self.stack || self.registers || self.memory
    }
}

/// One thread of the debugged process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub tid: i32,
    pub state: ThreadState,
    pub flags: u8,
    pub name: Option<String>,
    pub siginfo: Vec<u8>,
}

impl ThreadRecord {
    pub fn new(tid: i32) -> Self {
        Self {
            tid,
            state: ThreadState::Stopped,
            flags: 0,
            name: None,
            siginfo: Vec::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != ThreadState::Dead
    }

    /// Merge authoritative select-query data; keeps a known name when the
    /// query carries none.
    pub fn update_from_info(&mut self, info: &ThreadInfo) {
        self.state = info.state;
        self.flags = info.flags;
        self.siginfo = info.siginfo.clone();
        if info.name.is_some() {
            self.name = info.name.clone();
        }
    }

    pub fn update_from_brief(&mut self, brief: &ThreadBrief) {
        self.state = brief.state;
        self.flags = brief.flags;
    }
}

/// The debugged process.
///
/// Launch settings (`cwd`, `env`) survive unloads; everything else is
/// reset when the process goes away.
#[derive(Debug, Clone, Default)]
pub struct ProcessRecord {
    pub pid: Option<i32>,
    pub validity: Validity,
    pub cpu: Option<Cpu>,
    pub cpuid: i32,
    pub stop_ip: Option<u64>,
    pub stop_dp: Option<u64>,
    pub stop_flags: u32,
    pub siginfo: Vec<u8>,
    pub exe_path: Option<String>,
    pub cwd: Option<String>,
    pub env: Vec<String>,
    pub threads: BTreeMap<i32, ThreadRecord>,
}

impl ProcessRecord {
    /// Adopt a freshly loaded or attached process.
    pub fn loaded(&mut self, load: &ProcessLoad) {
        self.pid = Some(load.pid);
        self.validity = Validity::ALL;
        self.cpu = Some(Cpu::from_tag(load.cpu));
        self.cpuid = load.cpuid;
        if !load.name.is_empty() {
            self.exe_path = Some(load.name.clone());
        }
        self.stop_ip = None;
        self.stop_dp = None;
        self.stop_flags = 0;
        self.threads.clear();
        self.threads.insert(load.tid, ThreadRecord::new(load.tid));
    }

    /// Forget the process after unload, detach or kill.
    pub fn invalidate(&mut self) {
        self.pid = None;
        self.validity = Validity::default();
        self.stop_ip = None;
        self.stop_dp = None;
        self.stop_flags = 0;
        self.siginfo.clear();
        self.threads.clear();
    }

    pub fn record_stop(&mut self, ip: u64, dp: Option<u64>, flags: u32) {
        self.stop_ip = Some(ip);
        self.stop_dp = dp;
        self.stop_flags = flags;
    }

    pub fn thread_mut(&mut self, tid: i32) -> &mut ThreadRecord {
        self.threads.entry(tid).or_insert_with(|| ThreadRecord::new(tid))
    }

    pub fn mark_thread_dead(&mut self, tid: i32) {
        if let Some(thread) = self.threads.get_mut(&tid) {
            thread.state = ThreadState::Dead;
        }
    }

    /// Lowest-numbered live thread id, ignoring `except`.
    pub fn first_live_thread(&self, except: Option<i32>) -> Option<i32> {
        self.threads
            .values()
            .filter(|t| t.tid >= 1 && t.is_alive() && Some(t.tid) != except)
            .map(|t| t.tid)
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load() -> ProcessLoad {
        ProcessLoad {
            pid: 100,
            tid: 1,
            cpu: 3,
            cpuid: 0,
            name: "/bin/srv".into(),
        }
    }

    #[test]
    fn process_validity_follows_lifecycle() {
        let mut proc = ProcessRecord::default();
        assert!(!proc.validity.any());

        proc.loaded(&load());
        assert_eq!(proc.validity, Validity::ALL);
        assert_eq!(proc.pid, Some(100));
        assert_eq!(proc.cpu, Some(Cpu::X86));
        assert!(proc.threads.contains_key(&1));

        proc.invalidate();
        assert!(!proc.validity.any());
        assert_eq!(proc.pid, None);
        assert!(proc.threads.is_empty());
        assert_eq!(proc.exe_path.as_deref(), Some("/bin/srv"));
    }

    #[test]
    fn process_first_live_thread_skips_dead() {
        let mut proc = ProcessRecord::default();
        proc.loaded(&load());
        proc.thread_mut(2);
        proc.thread_mut(3);
        proc.mark_thread_dead(1);
        assert_eq!(proc.first_live_thread(None), Some(2));
        assert_eq!(proc.first_live_thread(Some(2)), Some(3));
    }

    #[test]
    fn thread_update_keeps_known_name() {
        let mut t = ThreadRecord::new(4);
        t.name = Some("worker".into());
        t.update_from_info(&ThreadInfo {
            tid: 4,
            state: ThreadState::Receive,
            flags: 2,
            siginfo: vec![0; 32],
            name: None,
        });
        assert_eq!(t.state, ThreadState::Receive);
        assert_eq!(t.name.as_deref(), Some("worker"));
    }

    #[test]
    fn ptid_display() {
        assert_eq!(Ptid::new(100, 7).to_string(), "100/7");
    }
}
