//! Typed request and reply payloads.
//!
//! Every (command, subcommand) pair the client sends is one [`Request`]
//! variant. Replies are decoded into [`Reply`] once the header validates;
//! `okdata` bodies are then interpreted by the record type the caller
//! expects ([`ThreadInfo`], [`PidListPage`], ...).

use std::fmt;

use nix::errno::Errno;

use crate::errno::target_errno_to_host;
use crate::error::ProtoError;
use crate::packet::{cmd, Channel, Endian, Header, Packet};
use crate::signal::{TargetSignal, SIGNAL_TABLE_LEN};
use crate::wire::{WireReader, WireWriter};

/// Size of the signal-information blob carried with thread records.
pub const SIGINFO_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Small enums carried in subcommands
// ---------------------------------------------------------------------------

/// A group of machine registers transferred as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Regset {
    General,
    Float,
    System,
    Alt,
}

impl Regset {
    /// Every regset, in wire order.
    pub const ALL: [Regset; 4] = [Regset::General, Regset::Float, Regset::System, Regset::Alt];

    pub fn as_u8(self) -> u8 {
        match self {
            Regset::General => 0,
            Regset::Float => 1,
            Regset::System => 2,
            Regset::Alt => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }
}

/// How the remote should start a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Start it free-running, not under debug control.
    Run,
    /// Start it stopped under debug control.
    Debug,
    /// Start it free-running and keep it alive after disconnect.
    RunPersist,
}

impl LoadMode {
    fn as_u8(self) -> u8 {
        match self {
            LoadMode::Run => 0,
            LoadMode::Debug => 1,
            LoadMode::RunPersist => 2,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LoadMode::Run),
            1 => Some(LoadMode::Debug),
            2 => Some(LoadMode::RunPersist),
            _ => None,
        }
    }
}

/// Process/thread enumeration cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidListMode {
    /// First process on the remote.
    Begin,
    /// Process following `pid`.
    Next,
    /// Threads of `pid` from the start.
    Specific,
    /// Threads of `pid` starting at `tid`.
    SpecificTid,
}

impl PidListMode {
    fn as_u8(self) -> u8 {
        match self {
            PidListMode::Begin => 0,
            PidListMode::Next => 1,
            PidListMode::Specific => 2,
            PidListMode::SpecificTid => 3,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PidListMode::Begin),
            1 => Some(PidListMode::Next),
            2 => Some(PidListMode::Specific),
            3 => Some(PidListMode::SpecificTid),
            _ => None,
        }
    }
}

/// Argument/environment editing operation for the next load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvOp {
    ClearArgv,
    AddArg,
    ClearEnv,
    SetEnv,
    /// Continuation of a variable too long for one packet.
    SetEnvMore,
}

impl EnvOp {
    fn as_u8(self) -> u8 {
        match self {
            EnvOp::ClearArgv => 0,
            EnvOp::AddArg => 1,
            EnvOp::ClearEnv => 2,
            EnvOp::SetEnv => 3,
            EnvOp::SetEnvMore => 4,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EnvOp::ClearArgv),
            1 => Some(EnvOp::AddArg),
            2 => Some(EnvOp::ClearEnv),
            3 => Some(EnvOp::SetEnv),
            4 => Some(EnvOp::SetEnvMore),
            _ => None,
        }
    }
}

/// Breakpoint / watchpoint flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    SoftwareExec,
    HardwareExec,
    HardwareRead,
    HardwareReadWrite,
    HardwareModify,
}

impl BreakpointKind {
    const EXEC: u8 = 0x01;
    const READ: u8 = 0x02;
    const WRITE: u8 = 0x04;
    const MODIFY: u8 = 0x08;
    const HW: u8 = 0x10;

    /// Subcommand bits.
    pub fn to_bits(self) -> u8 {
        match self {
            BreakpointKind::SoftwareExec => Self::EXEC,
            BreakpointKind::HardwareExec => Self::HW | Self::EXEC,
            BreakpointKind::HardwareRead => Self::HW | Self::READ,
            BreakpointKind::HardwareReadWrite => Self::HW | Self::READ | Self::WRITE,
            BreakpointKind::HardwareModify => Self::HW | Self::MODIFY,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        [
            BreakpointKind::SoftwareExec,
            BreakpointKind::HardwareExec,
            BreakpointKind::HardwareRead,
            BreakpointKind::HardwareReadWrite,
            BreakpointKind::HardwareModify,
        ]
        .into_iter()
        .find(|k| k.to_bits() == bits)
    }

    /// Whether this kind uses a debug register rather than patched code.
    pub fn is_hardware(self) -> bool {
        self.to_bits() & Self::HW != 0
    }

    /// Whether this kind watches data accesses rather than execution.
    pub fn is_watchpoint(self) -> bool {
        self.to_bits() & Self::EXEC == 0
    }
}

mod sub {
    pub const SELECT_SET: u8 = 0;
    pub const SELECT_QUERY: u8 = 1;
    pub const KILL_PID: u8 = 1;
    pub const RUN: u8 = 0;
    pub const RUN_COUNT: u8 = 1;
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn string_count(field: &'static str, strings: &[String]) -> Result<u16, ProtoError> {
    u16::try_from(strings.len()).map_err(|_| ProtoError::InvalidValue {
        field,
        value: strings.len() as i64,
    })
}

/// One outgoing request, one variant per (command, subcommand).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect { major: u8, minor: u8 },
    Disconnect,
    Select { pid: i32, tid: i32 },
    SelectQuery { pid: i32, tid: i32 },
    Load { mode: LoadMode, args: Vec<String>, env: Vec<String> },
    Attach { pid: i32 },
    Detach { pid: i32 },
    Kill { signal: TargetSignal },
    Stop,
    MemRead { addr: u64, size: u16 },
    MemWrite { addr: u64, data: Vec<u8> },
    RegRead { regset: Regset, offset: u16, size: u16 },
    RegWrite { regset: Regset, offset: u16, data: Vec<u8> },
    Resume { step: bool, count: u32 },
    Breakpoint { kind: BreakpointKind, addr: u64, size: i32 },
    FileOpen { mode: i32, perms: i32, path: String },
    FileRead { size: u16 },
    FileWrite { data: Vec<u8> },
    FileClose { mtime: i32 },
    PidList { mode: PidListMode, pid: i32, tid: i32 },
    Cwd { path: String },
    Env { op: EnvOp, data: String },
    BaseAddress,
    ProtoVersion { major: u8, minor: u8 },
    HandleSignals { pass: TargetSignal, table: Vec<u8> },
    CpuInfo,
    TidNames,
    ProcfsInfo,
}

impl Request {
    /// Command byte.
    pub fn cmd(&self) -> u8 {
        match self {
            Request::Connect { .. } => cmd::CONNECT,
            Request::Disconnect => cmd::DISCONNECT,
            Request::Select { .. } | Request::SelectQuery { .. } => cmd::SELECT,
            Request::Load { .. } => cmd::LOAD,
            Request::Attach { .. } => cmd::ATTACH,
            Request::Detach { .. } => cmd::DETACH,
            Request::Kill { .. } => cmd::KILL,
            Request::Stop => cmd::STOP,
            Request::MemRead { .. } => cmd::MEMRD,
            Request::MemWrite { .. } => cmd::MEMWR,
            Request::RegRead { .. } => cmd::REGRD,
            Request::RegWrite { .. } => cmd::REGWR,
            Request::Resume { .. } => cmd::RUN,
            Request::Breakpoint { .. } => cmd::BRK,
            Request::FileOpen { .. } => cmd::FILEOPEN,
            Request::FileRead { .. } => cmd::FILERD,
            Request::FileWrite { .. } => cmd::FILEWR,
            Request::FileClose { .. } => cmd::FILECLOSE,
            Request::PidList { .. } => cmd::PIDLIST,
            Request::Cwd { .. } => cmd::CWD,
            Request::Env { .. } => cmd::ENV,
            Request::BaseAddress => cmd::BASE_ADDRESS,
            Request::ProtoVersion { .. } => cmd::PROTOVER,
            Request::HandleSignals { .. } => cmd::HANDLESIG,
            Request::CpuInfo => cmd::CPUINFO,
            Request::TidNames => cmd::TIDNAMES,
            Request::ProcfsInfo => cmd::PROCFSINFO,
        }
    }

    /// Subcommand byte.
    pub fn subcmd(&self) -> u8 {
        match self {
            Request::Select { .. } => sub::SELECT_SET,
            Request::SelectQuery { .. } => sub::SELECT_QUERY,
            Request::Load { mode, .. } => mode.as_u8(),
            Request::Kill { .. } => sub::KILL_PID,
            Request::RegRead { regset, .. } | Request::RegWrite { regset, .. } => regset.as_u8(),
            Request::Resume { step: false, .. } => sub::RUN,
            Request::Resume { step: true, .. } => sub::RUN_COUNT,
            Request::Breakpoint { kind, .. } => kind.to_bits(),
            Request::PidList { mode, .. } => mode.as_u8(),
            Request::Env { op, .. } => op.as_u8(),
            _ => 0,
        }
    }

    /// Channel the request travels on.
    pub fn channel(&self) -> Channel {
        Channel::Debug
    }

    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "connect",
            Request::Disconnect => "disconnect",
            Request::Select { .. } => "select",
            Request::SelectQuery { .. } => "select-query",
            Request::Load { .. } => "load",
            Request::Attach { .. } => "attach",
            Request::Detach { .. } => "detach",
            Request::Kill { .. } => "kill",
            Request::Stop => "stop",
            Request::MemRead { .. } => "memrd",
            Request::MemWrite { .. } => "memwr",
            Request::RegRead { .. } => "regrd",
            Request::RegWrite { .. } => "regwr",
            Request::Resume { .. } => "run",
            Request::Breakpoint { .. } => "brk",
            Request::FileOpen { .. } => "fileopen",
            Request::FileRead { .. } => "filerd",
            Request::FileWrite { .. } => "filewr",
            Request::FileClose { .. } => "fileclose",
            Request::PidList { .. } => "pidlist",
            Request::Cwd { .. } => "cwd",
            Request::Env { .. } => "env",
            Request::BaseAddress => "base-address",
            Request::ProtoVersion { .. } => "protover",
            Request::HandleSignals { .. } => "handlesig",
            Request::CpuInfo => "cpuinfo",
            Request::TidNames => "tidnames",
            Request::ProcfsInfo => "procfsinfo",
        }
    }

    /// Encode the payload (everything after the header).
    ///
    /// Fails only when a load carries more strings than its 16-bit counts
    /// can describe.
    pub fn encode_payload(&self, endian: Endian) -> Result<Vec<u8>, ProtoError> {
        let mut w = WireWriter::new(endian);
        match self {
            Request::Connect { major, minor } | Request::ProtoVersion { major, minor } => {
                w.put_u8(*major).put_u8(*minor).put_u8(0).put_u8(0);
            }
            Request::Select { pid, tid }
            | Request::SelectQuery { pid, tid }
            | Request::PidList { pid, tid, .. } => {
                w.put_i32(*pid).put_i32(*tid);
            }
            Request::Load { args, env, .. } => {
                w.put_u16(string_count("argc", args)?)
                    .put_u16(string_count("envc", env)?);
                for s in args.iter().chain(env.iter()) {
                    w.put_cstr(s);
                }
            }
            Request::Attach { pid } | Request::Detach { pid } => {
                w.put_i32(*pid);
            }
            Request::Kill { signal } => {
                w.put_i32(signal.0);
            }
            Request::MemRead { addr, size } => {
                w.put_u32(0).put_u64(*addr).put_u16(*size);
            }
            Request::MemWrite { addr, data } => {
                w.put_u32(0).put_u64(*addr).put_bytes(data);
            }
            Request::RegRead { offset, size, .. } => {
                w.put_u16(*offset).put_u16(*size);
            }
            Request::RegWrite { offset, data, .. } => {
                w.put_u16(*offset).put_bytes(data);
            }
            Request::Resume { count, .. } => {
                w.put_u32(*count);
            }
            Request::Breakpoint { addr, size, .. } => {
                w.put_u64(*addr).put_i32(*size);
            }
            Request::FileOpen { mode, perms, path } => {
                w.put_i32(*mode).put_i32(*perms).put_cstr(path);
            }
            Request::FileRead { size } => {
                w.put_u16(*size);
            }
            Request::FileWrite { data } => {
                w.put_bytes(data);
            }
            Request::FileClose { mtime } => {
                w.put_i32(*mtime);
            }
            Request::Cwd { path } => {
                w.put_cstr(path);
            }
            Request::Env { data, .. } => {
                w.put_cstr(data);
            }
            Request::HandleSignals { pass, table } => {
                w.put_i32(pass.0);
                let mut slots = [0u8; SIGNAL_TABLE_LEN];
                for (slot, bits) in slots.iter_mut().zip(table.iter()) {
                    *slot = *bits;
                }
                w.put_bytes(&slots);
            }
            Request::Disconnect
            | Request::Stop
            | Request::BaseAddress
            | Request::CpuInfo
            | Request::TidNames
            | Request::ProcfsInfo => {}
        }
        Ok(w.into_vec())
    }

    /// Build the full packet for this request.
    pub fn to_packet(&self, mid: u8, endian: Endian) -> Result<Packet, ProtoError> {
        Ok(Packet {
            header: Header {
                cmd: self.cmd(),
                subcmd: self.subcmd(),
                mid,
                channel: self.channel().as_u8(),
                endian,
            },
            payload: self.encode_payload(endian)?,
        })
    }

    /// Decode a request packet. Used by remote-side tooling and tests.
    pub fn decode(packet: &Packet) -> Result<Self, ProtoError> {
        let h = &packet.header;
        let mut r = WireReader::new(&packet.payload, h.endian, "request");
        let bad_sub = || ProtoError::UnknownSubcommand {
            cmd: h.cmd,
            subcmd: h.subcmd,
        };
        let req = match h.cmd {
            cmd::CONNECT | cmd::PROTOVER => {
                let major = r.u8()?;
                let minor = r.u8()?;
                if h.cmd == cmd::CONNECT {
                    Request::Connect { major, minor }
                } else {
                    Request::ProtoVersion { major, minor }
                }
            }
            cmd::DISCONNECT => Request::Disconnect,
            cmd::SELECT => {
                let pid = r.i32()?;
                let tid = r.i32()?;
                match h.subcmd {
                    sub::SELECT_SET => Request::Select { pid, tid },
                    sub::SELECT_QUERY => Request::SelectQuery { pid, tid },
                    _ => return Err(bad_sub()),
                }
            }
            cmd::LOAD => {
                let mode = LoadMode::from_u8(h.subcmd).ok_or_else(bad_sub)?;
                let argc = r.u16()? as usize;
                let envc = r.u16()? as usize;
                let args = (0..argc).map(|_| r.cstr()).collect::<Result<Vec<_>, _>>()?;
                let env = (0..envc).map(|_| r.cstr()).collect::<Result<Vec<_>, _>>()?;
                Request::Load { mode, args, env }
            }
            cmd::ATTACH => Request::Attach { pid: r.i32()? },
            cmd::DETACH => Request::Detach { pid: r.i32()? },
            cmd::KILL => Request::Kill {
                signal: TargetSignal(r.i32()?),
            },
            cmd::STOP => Request::Stop,
            cmd::MEMRD => {
                r.u32()?;
                let addr = r.u64()?;
                let size = r.u16()?;
                Request::MemRead { addr, size }
            }
            cmd::MEMWR => {
                r.u32()?;
                let addr = r.u64()?;
                Request::MemWrite {
                    addr,
                    data: r.rest().to_vec(),
                }
            }
            cmd::REGRD | cmd::REGWR => {
                let regset = Regset::from_u8(h.subcmd).ok_or_else(bad_sub)?;
                let offset = r.u16()?;
                if h.cmd == cmd::REGRD {
                    Request::RegRead {
                        regset,
                        offset,
                        size: r.u16()?,
                    }
                } else {
                    Request::RegWrite {
                        regset,
                        offset,
                        data: r.rest().to_vec(),
                    }
                }
            }
            cmd::RUN => Request::Resume {
                step: match h.subcmd {
                    sub::RUN => false,
                    sub::RUN_COUNT => true,
                    _ => return Err(bad_sub()),
                },
                count: r.u32()?,
            },
            cmd::BRK => {
                let kind = BreakpointKind::from_bits(h.subcmd).ok_or_else(bad_sub)?;
                let addr = r.u64()?;
                let size = r.i32()?;
                Request::Breakpoint { kind, addr, size }
            }
            cmd::FILEOPEN => {
                let mode = r.i32()?;
                let perms = r.i32()?;
                let path = r.cstr()?;
                Request::FileOpen { mode, perms, path }
            }
            cmd::FILERD => Request::FileRead { size: r.u16()? },
            cmd::FILEWR => Request::FileWrite {
                data: r.rest().to_vec(),
            },
            cmd::FILECLOSE => Request::FileClose { mtime: r.i32()? },
            cmd::PIDLIST => {
                let mode = PidListMode::from_u8(h.subcmd).ok_or_else(bad_sub)?;
                let pid = r.i32()?;
                let tid = r.i32()?;
                Request::PidList { mode, pid, tid }
            }
            cmd::CWD => Request::Cwd { path: r.cstr()? },
            cmd::ENV => Request::Env {
                op: EnvOp::from_u8(h.subcmd).ok_or_else(bad_sub)?,
                data: r.cstr()?,
            },
            cmd::BASE_ADDRESS => Request::BaseAddress,
            cmd::HANDLESIG => {
                let pass = TargetSignal(r.i32()?);
                let table = r.bytes(SIGNAL_TABLE_LEN)?.to_vec();
                Request::HandleSignals { pass, table }
            }
            cmd::CPUINFO => Request::CpuInfo,
            cmd::TIDNAMES => Request::TidNames,
            cmd::PROCFSINFO => Request::ProcfsInfo,
            other => return Err(ProtoError::UnknownCommand(other)),
        };
        Ok(req)
    }
}

// ---------------------------------------------------------------------------
// Replies and remote errors
// ---------------------------------------------------------------------------

/// Well-known failure classes reported in the subcommand of an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorCode {
    /// Plain errno, no further classification.
    Generic,
    NoPty,
    ThreadStart,
    InvalidConsole,
    Spawn,
    Procfs,
    ProcessStop,
    PsInfo,
    MemoryModel,
    Proxy,
    DebugService,
    Other(u8),
}

impl RemoteErrorCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => RemoteErrorCode::Generic,
            1 => RemoteErrorCode::NoPty,
            2 => RemoteErrorCode::ThreadStart,
            3 => RemoteErrorCode::InvalidConsole,
            4 => RemoteErrorCode::Spawn,
            5 => RemoteErrorCode::Procfs,
            6 => RemoteErrorCode::ProcessStop,
            7 => RemoteErrorCode::PsInfo,
            8 => RemoteErrorCode::MemoryModel,
            9 => RemoteErrorCode::Proxy,
            10 => RemoteErrorCode::DebugService,
            other => RemoteErrorCode::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            RemoteErrorCode::Generic => 0,
            RemoteErrorCode::NoPty => 1,
            RemoteErrorCode::ThreadStart => 2,
            RemoteErrorCode::InvalidConsole => 3,
            RemoteErrorCode::Spawn => 4,
            RemoteErrorCode::Procfs => 5,
            RemoteErrorCode::ProcessStop => 6,
            RemoteErrorCode::PsInfo => 7,
            RemoteErrorCode::MemoryModel => 8,
            RemoteErrorCode::Proxy => 9,
            RemoteErrorCode::DebugService => 10,
            RemoteErrorCode::Other(v) => v,
        }
    }

    /// Human-readable description of the failure class.
    pub fn description(self) -> &'static str {
        match self {
            RemoteErrorCode::Generic | RemoteErrorCode::Other(_) => "remote error",
            RemoteErrorCode::NoPty => "remote has no ptys available",
            RemoteErrorCode::ThreadStart => "remote thread start error",
            RemoteErrorCode::InvalidConsole => "remote invalid console number",
            RemoteErrorCode::Spawn => "remote spawn error",
            RemoteErrorCode::Procfs => "remote procfs error",
            RemoteErrorCode::ProcessStop => "remote could not stop the process",
            RemoteErrorCode::PsInfo => "remote psinfo error",
            RemoteErrorCode::MemoryModel => "remote memory model is not flat",
            RemoteErrorCode::Proxy => "remote proxy error",
            RemoteErrorCode::DebugService => "remote debug service error",
        }
    }
}

/// An error reply, either sent by the remote or synthesized locally after
/// retries ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Failure class.
    pub code: RemoteErrorCode,
    /// Errno in the target's numbering.
    pub errno: i32,
    /// Set when no reply ever arrived and the client made this one up.
    pub local: bool,
}

impl RemoteError {
    /// Target `EIO`.
    const TARGET_EIO: i32 = 5;

    /// The error reported when a request never got a valid reply.
    pub fn local_io() -> Self {
        Self {
            code: RemoteErrorCode::Generic,
            errno: Self::TARGET_EIO,
            local: true,
        }
    }

    /// The errno translated into host numbering.
    pub fn host_errno(&self) -> Errno {
        target_errno_to_host(self.errno)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.local {
            return write!(f, "no reply from remote: {}", self.host_errno().desc());
        }
        write!(
            f,
            "{}: {}",
            self.code.description(),
            self.host_errno().desc()
        )
    }
}

impl std::error::Error for RemoteError {}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    OkStatus(i32),
    OkData(Vec<u8>),
    Error(RemoteError),
}

impl Reply {
    /// Decode a reply packet. The header must carry a reply command.
    pub fn decode(packet: &Packet) -> Result<Self, ProtoError> {
        let h = &packet.header;
        let mut r = WireReader::new(&packet.payload, h.endian, "reply");
        match h.cmd {
            cmd::OK => Ok(Reply::Ok),
            cmd::OKSTATUS => Ok(Reply::OkStatus(r.i32()?)),
            cmd::OKDATA => Ok(Reply::OkData(packet.payload.clone())),
            cmd::ERR => Ok(Reply::Error(RemoteError {
                code: RemoteErrorCode::from_u8(h.subcmd),
                errno: r.i32()?,
                local: false,
            })),
            other => Err(ProtoError::UnknownCommand(other)),
        }
    }

    /// Build the packet a remote would send for this reply.
    pub fn to_packet(&self, mid: u8, endian: Endian) -> Packet {
        let mut w = WireWriter::new(endian);
        let (cmd, subcmd) = match self {
            Reply::Ok => (cmd::OK, 0),
            Reply::OkStatus(status) => {
                w.put_i32(*status);
                (cmd::OKSTATUS, 0)
            }
            Reply::OkData(data) => {
                w.put_bytes(data);
                (cmd::OKDATA, 0)
            }
            Reply::Error(err) => {
                w.put_i32(err.errno);
                (cmd::ERR, err.code.as_u8())
            }
        };
        Packet {
            header: Header {
                cmd,
                subcmd,
                mid,
                channel: Channel::Debug.as_u8(),
                endian,
            },
            payload: w.into_vec(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Reply::Error(_))
    }
}

// ---------------------------------------------------------------------------
// okdata records
// ---------------------------------------------------------------------------

/// Lifecycle state of a remote thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Dead,
    Running,
    Ready,
    Stopped,
    Send,
    Receive,
    Reply,
    Stack,
    WaitThread,
    WaitPage,
    SigSuspend,
    SigWaitInfo,
    NanoSleep,
    Mutex,
    CondVar,
    Join,
    Interrupt,
    Semaphore,
    WaitContext,
    NetSend,
    NetReply,
    Unknown(u8),
}

impl ThreadState {
    pub fn from_u8(v: u8) -> Self {
        use ThreadState::*;
        match v {
            0 => Dead,
            1 => Running,
            2 => Ready,
            3 => Stopped,
            4 => Send,
            5 => Receive,
            6 => Reply,
            7 => Stack,
            8 => WaitThread,
            9 => WaitPage,
            10 => SigSuspend,
            11 => SigWaitInfo,
            12 => NanoSleep,
            13 => Mutex,
            14 => CondVar,
            15 => Join,
            16 => Interrupt,
            17 => Semaphore,
            18 => WaitContext,
            19 => NetSend,
            20 => NetReply,
            other => Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        use ThreadState::*;
        match self {
            Dead => 0,
            Running => 1,
            Ready => 2,
            Stopped => 3,
            Send => 4,
            Receive => 5,
            Reply => 6,
            Stack => 7,
            WaitThread => 8,
            WaitPage => 9,
            SigSuspend => 10,
            SigWaitInfo => 11,
            NanoSleep => 12,
            Mutex => 13,
            CondVar => 14,
            Join => 15,
            Interrupt => 16,
            Semaphore => 17,
            WaitContext => 18,
            NetSend => 19,
            NetReply => 20,
            Unknown(v) => v,
        }
    }

    /// Short upper-case label for listings.
    pub fn label(self) -> String {
        match self {
            ThreadState::Unknown(v) => format!("STATE{v}"),
            other => format!("{other:?}").to_ascii_uppercase(),
        }
    }
}

/// A process starting (or being attached to) on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLoad {
    pub pid: i32,
    pub tid: i32,
    /// CPU family tag.
    pub cpu: i32,
    /// CPU model identifier.
    pub cpuid: i32,
    /// Executable path as the remote knows it.
    pub name: String,
}

impl ProcessLoad {
    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self, ProtoError> {
        let mut r = WireReader::new(payload, endian, "process-load");
        Ok(Self {
            pid: r.i32()?,
            tid: r.i32()?,
            cpu: r.i32()?,
            cpuid: r.i32()?,
            name: if r.is_empty() { String::new() } else { r.cstr()? },
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut w = WireWriter::new(endian);
        w.put_i32(self.pid)
            .put_i32(self.tid)
            .put_i32(self.cpu)
            .put_i32(self.cpuid)
            .put_cstr(&self.name);
        w.into_vec()
    }
}

/// Authoritative per-thread information from a select query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: i32,
    pub state: ThreadState,
    pub flags: u8,
    pub siginfo: Vec<u8>,
    pub name: Option<String>,
}

impl ThreadInfo {
    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self, ProtoError> {
        let mut r = WireReader::new(payload, endian, "thread-info");
        let tid = r.i32()?;
        let state = ThreadState::from_u8(r.u8()?);
        let flags = r.u8()?;
        r.u16()?;
        let siginfo = r.bytes(SIGINFO_LEN)?.to_vec();
        let name = if r.is_empty() {
            None
        } else {
            Some(r.cstr()?).filter(|n| !n.is_empty())
        };
        Ok(Self {
            tid,
            state,
            flags,
            siginfo,
            name,
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut w = WireWriter::new(endian);
        let mut siginfo = [0u8; SIGINFO_LEN];
        for (dst, src) in siginfo.iter_mut().zip(self.siginfo.iter()) {
            *dst = *src;
        }
        w.put_i32(self.tid)
            .put_u8(self.state.as_u8())
            .put_u8(self.flags)
            .put_u16(0)
            .put_bytes(&siginfo)
            .put_cstr(self.name.as_deref().unwrap_or(""));
        w.into_vec()
    }
}

/// Compact thread entry in a pidlist page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBrief {
    pub tid: i32,
    pub state: ThreadState,
    pub flags: u8,
}

/// One page of a pidlist reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidListPage {
    pub pid: i32,
    /// Total thread count of the process, not just this page.
    pub num_tids: i32,
    pub name: String,
    pub threads: Vec<ThreadBrief>,
}

impl PidListPage {
    const ENTRY_LEN: usize = 8;

    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self, ProtoError> {
        let mut r = WireReader::new(payload, endian, "pidlist");
        let pid = r.i32()?;
        let num_tids = r.i32()?;
        let name = r.cstr()?;
        r.align(4);
        let mut threads = Vec::with_capacity(r.remaining() / Self::ENTRY_LEN);
        while r.remaining() >= Self::ENTRY_LEN {
            let tid = r.i32()?;
            let state = ThreadState::from_u8(r.u8()?);
            let flags = r.u8()?;
            r.u16()?;
            threads.push(ThreadBrief { tid, state, flags });
        }
        Ok(Self {
            pid,
            num_tids,
            name,
            threads,
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut w = WireWriter::new(endian);
        w.put_i32(self.pid)
            .put_i32(self.num_tids)
            .put_cstr(&self.name)
            .pad_to(4);
        for t in &self.threads {
            w.put_i32(t.tid)
                .put_u8(t.state.as_u8())
                .put_u8(t.flags)
                .put_u16(0);
        }
        w.into_vec()
    }
}

/// One page of thread names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidNamesPage {
    pub num_tids: u32,
    /// Names still to come in later pages.
    pub num_left: u32,
    pub names: Vec<(i32, String)>,
}

impl TidNamesPage {
    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self, ProtoError> {
        let mut r = WireReader::new(payload, endian, "tidnames");
        let num_tids = r.u32()?;
        let num_left = r.u32()?;
        let mut names = Vec::new();
        while !r.is_empty() {
            let tid = r.i32()?;
            names.push((tid, r.cstr()?));
        }
        Ok(Self {
            num_tids,
            num_left,
            names,
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut w = WireWriter::new(endian);
        w.put_u32(self.num_tids).put_u32(self.num_left);
        for (tid, name) in &self.names {
            w.put_i32(*tid).put_cstr(name);
        }
        w.into_vec()
    }
}

/// CPU feature flags of the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuInfo {
    pub flags: u32,
}

impl CpuInfo {
    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self, ProtoError> {
        Ok(Self {
            flags: WireReader::new(payload, endian, "cpuinfo").u32()?,
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut w = WireWriter::new(endian);
        w.put_u32(self.flags).put_u32(0).put_u32(0).put_u32(0);
        w.into_vec()
    }
}

/// Process layout facts used to rebuild the auxiliary vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcfsInfo {
    pub initial_stack: u64,
    pub base_address: u64,
}

impl ProcfsInfo {
    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self, ProtoError> {
        let mut r = WireReader::new(payload, endian, "procfsinfo");
        Ok(Self {
            initial_stack: r.u64()?,
            base_address: r.u64()?,
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut w = WireWriter::new(endian);
        w.put_u64(self.initial_stack).put_u64(self.base_address);
        w.into_vec()
    }
}
