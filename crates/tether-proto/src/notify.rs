//! Asynchronous notify frames sent by the remote while the target runs.

use crate::error::ProtoError;
use crate::packet::{cmd, Channel, Endian, Header, Packet};
use crate::wire::{WireReader, WireWriter};

mod sub {
    pub const PIDLOAD: u8 = 0;
    pub const TIDLOAD: u8 = 1;
    pub const DLLLOAD: u8 = 2;
    pub const PIDUNLOAD: u8 = 3;
    pub const TIDUNLOAD: u8 = 4;
    pub const DLLUNLOAD: u8 = 5;
    pub const BRK: u8 = 6;
    pub const STEP: u8 = 7;
    pub const SIGEV: u8 = 8;
    pub const STOPPED: u8 = 9;
    pub const FORK: u8 = 10;
    pub const EXEC: u8 = 11;
}

/// Event-specific part of a notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    ProcessLoaded { cpu: i32, cpuid: i32, name: String },
    ThreadLoaded { tid: i32 },
    LibraryLoaded { name: String },
    /// `faulted` is only present on remotes speaking 0.3 or later.
    ProcessUnloaded { status: i32, faulted: Option<bool> },
    ThreadUnloaded { tid: i32, status: i32 },
    LibraryUnloaded { name: String },
    BreakpointHit { ip: u64, dp: u64, flags: u32 },
    StepDone { ip: u64, dp: u64, flags: u32 },
    Signal { signo: i32, code: i32, value: i32, ip: u64 },
    Stopped { ip: u64 },
    Fork { child_pid: i32, vfork: bool },
    Exec { name: String },
}

impl NotifyEvent {
    fn subcmd(&self) -> u8 {
        match self {
            NotifyEvent::ProcessLoaded { .. } => sub::PIDLOAD,
            NotifyEvent::ThreadLoaded { .. } => sub::TIDLOAD,
            NotifyEvent::LibraryLoaded { .. } => sub::DLLLOAD,
            NotifyEvent::ProcessUnloaded { .. } => sub::PIDUNLOAD,
            NotifyEvent::ThreadUnloaded { .. } => sub::TIDUNLOAD,
            NotifyEvent::LibraryUnloaded { .. } => sub::DLLUNLOAD,
            NotifyEvent::BreakpointHit { .. } => sub::BRK,
            NotifyEvent::StepDone { .. } => sub::STEP,
            NotifyEvent::Signal { .. } => sub::SIGEV,
            NotifyEvent::Stopped { .. } => sub::STOPPED,
            NotifyEvent::Fork { .. } => sub::FORK,
            NotifyEvent::Exec { .. } => sub::EXEC,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotifyEvent::ProcessLoaded { .. } => "pid-load",
            NotifyEvent::ThreadLoaded { .. } => "tid-load",
            NotifyEvent::LibraryLoaded { .. } => "dll-load",
            NotifyEvent::ProcessUnloaded { .. } => "pid-unload",
            NotifyEvent::ThreadUnloaded { .. } => "tid-unload",
            NotifyEvent::LibraryUnloaded { .. } => "dll-unload",
            NotifyEvent::BreakpointHit { .. } => "brk",
            NotifyEvent::StepDone { .. } => "step",
            NotifyEvent::Signal { .. } => "sigev",
            NotifyEvent::Stopped { .. } => "stopped",
            NotifyEvent::Fork { .. } => "fork",
            NotifyEvent::Exec { .. } => "exec",
        }
    }
}

/// A decoded notify: the originating context plus the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    pub pid: i32,
    pub tid: i32,
    pub event: NotifyEvent,
}

impl Notify {
    /// Decode a notify packet. The caller has already checked
    /// [`Header::is_notify`].
    pub fn decode(packet: &Packet) -> Result<Self, ProtoError> {
        let h = &packet.header;
        let mut r = WireReader::new(&packet.payload, h.endian, "notify");
        let pid = r.i32()?;
        let tid = r.i32()?;
        let event = match h.subcmd {
            sub::PIDLOAD => NotifyEvent::ProcessLoaded {
                cpu: r.i32()?,
                cpuid: r.i32()?,
                name: if r.is_empty() { String::new() } else { r.cstr()? },
            },
            sub::TIDLOAD => NotifyEvent::ThreadLoaded { tid: r.i32()? },
            sub::DLLLOAD => NotifyEvent::LibraryLoaded { name: r.cstr()? },
            sub::PIDUNLOAD => {
                let status = r.i32()?;
                let faulted = if r.remaining() >= 4 {
                    Some(r.u32()? != 0)
                } else {
                    None
                };
                NotifyEvent::ProcessUnloaded { status, faulted }
            }
            sub::TIDUNLOAD => NotifyEvent::ThreadUnloaded {
                tid: r.i32()?,
                status: r.i32()?,
            },
            sub::DLLUNLOAD => NotifyEvent::LibraryUnloaded { name: r.cstr()? },
            sub::BRK | sub::STEP => {
                let ip = r.u64()?;
                let dp = r.u64()?;
                let flags = r.u32()?;
                if h.subcmd == sub::BRK {
                    NotifyEvent::BreakpointHit { ip, dp, flags }
                } else {
                    NotifyEvent::StepDone { ip, dp, flags }
                }
            }
            sub::SIGEV => NotifyEvent::Signal {
                signo: r.i32()?,
                code: r.i32()?,
                value: r.i32()?,
                ip: r.u64()?,
            },
            sub::STOPPED => NotifyEvent::Stopped { ip: r.u64()? },
            sub::FORK => NotifyEvent::Fork {
                child_pid: r.i32()?,
                vfork: r.u32()? != 0,
            },
            sub::EXEC => NotifyEvent::Exec { name: r.cstr()? },
            other => {
                return Err(ProtoError::UnknownSubcommand {
                    cmd: cmd::NOTIFY,
                    subcmd: other,
                })
            }
        };
        Ok(Self { pid, tid, event })
    }

    /// Build the packet a remote would send for this notify.
    pub fn to_packet(&self, mid: u8, endian: Endian) -> Packet {
        let mut w = WireWriter::new(endian);
        w.put_i32(self.pid).put_i32(self.tid);
        match &self.event {
            NotifyEvent::ProcessLoaded { cpu, cpuid, name } => {
                w.put_i32(*cpu).put_i32(*cpuid).put_cstr(name);
            }
            NotifyEvent::ThreadLoaded { tid } => {
                w.put_i32(*tid);
            }
            NotifyEvent::LibraryLoaded { name }
            | NotifyEvent::LibraryUnloaded { name }
            | NotifyEvent::Exec { name } => {
                w.put_cstr(name);
            }
            NotifyEvent::ProcessUnloaded { status, faulted } => {
                w.put_i32(*status);
                if let Some(faulted) = faulted {
                    w.put_u32(u32::from(*faulted));
                }
            }
            NotifyEvent::ThreadUnloaded { tid, status } => {
                w.put_i32(*tid).put_i32(*status);
            }
            NotifyEvent::BreakpointHit { ip, dp, flags } | NotifyEvent::StepDone { ip, dp, flags } => {
                w.put_u64(*ip).put_u64(*dp).put_u32(*flags);
            }
            NotifyEvent::Signal {
                signo,
                code,
                value,
                ip,
            } => {
                w.put_i32(*signo).put_i32(*code).put_i32(*value).put_u64(*ip);
            }
            NotifyEvent::Stopped { ip } => {
                w.put_u64(*ip);
            }
            NotifyEvent::Fork { child_pid, vfork } => {
                w.put_i32(*child_pid).put_u32(u32::from(*vfork));
            }
        }
        Packet {
            header: Header {
                cmd: cmd::NOTIFY,
                subcmd: self.event.subcmd(),
                mid,
                channel: Channel::Debug.as_u8(),
                endian,
            },
            payload: w.into_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_breakpoint_layout() {
        let n = Notify {
            pid: 100,
            tid: 7,
            event: NotifyEvent::BreakpointHit {
                ip: 0x8048000,
                dp: 0,
                flags: 0,
            },
        };
        let pkt = n.to_packet(12, Endian::Little);
        assert!(pkt.header.is_notify());
        assert_eq!(pkt.header.subcmd, 6);
        assert_eq!(pkt.payload.len(), 8 + 8 + 8 + 4);
        assert_eq!(&pkt.payload[..4], &100i32.to_le_bytes());
        assert_eq!(Notify::decode(&pkt).unwrap(), n);
    }

    #[test]
    fn notify_pid_unload_without_faulted_flag() {
        let n = Notify {
            pid: 5,
            tid: 1,
            event: NotifyEvent::ProcessUnloaded {
                status: 3,
                faulted: None,
            },
        };
        let pkt = n.to_packet(1, Endian::Big);
        assert_eq!(pkt.payload.len(), 12);
        assert_eq!(Notify::decode(&pkt).unwrap(), n);
    }

    #[test]
    fn notify_pid_unload_with_faulted_flag() {
        let n = Notify {
            pid: 5,
            tid: 1,
            event: NotifyEvent::ProcessUnloaded {
                status: 11,
                faulted: Some(true),
            },
        };
        let pkt = n.to_packet(1, Endian::Little);
        assert_eq!(Notify::decode(&pkt).unwrap(), n);
    }

    #[test]
    fn notify_fork_discriminator() {
        let n = Notify {
            pid: 10,
            tid: 1,
            event: NotifyEvent::Fork {
                child_pid: 11,
                vfork: true,
            },
        };
        let pkt = n.to_packet(2, Endian::Little);
        assert_eq!(Notify::decode(&pkt).unwrap(), n);
        assert_eq!(n.event.name(), "fork");
    }

    #[test]
    fn notify_unknown_subcommand_is_rejected() {
        let mut pkt = Notify {
            pid: 1,
            tid: 1,
            event: NotifyEvent::Stopped { ip: 0 },
        }
        .to_packet(1, Endian::Little);
        pkt.header.subcmd = 42;
        assert_eq!(
            Notify::decode(&pkt),
            Err(ProtoError::UnknownSubcommand { cmd: 64, subcmd: 42 })
        );
    }

    #[test]
    fn notify_truncated_body() {
        let mut pkt = Notify {
            pid: 1,
            tid: 1,
            event: NotifyEvent::Signal {
                signo: 11,
                code: 1,
                value: 0,
                ip: 0x400000,
            },
        }
        .to_packet(1, Endian::Little);
        pkt.payload.truncate(14);
        assert!(matches!(
            Notify::decode(&pkt),
            Err(ProtoError::Truncated { what: "notify", .. })
        ));
    }
}
