//! tether-proto: wire format of the remote debug protocol.
//!
//! This crate knows nothing about transports or sessions. It frames and
//! checksums bytes, lays out packet headers, and turns typed requests,
//! replies and notify events into payload bytes and back.

pub mod errno;
pub mod error;
pub mod frame;
pub mod message;
pub mod notify;
pub mod packet;
pub mod signal;
pub mod wire;

pub use errno::target_errno_to_host;
pub use error::ProtoError;
pub use frame::{encode_frame, FrameDecoder, FrameEvent};
pub use message::{
    BreakpointKind, CpuInfo, EnvOp, LoadMode, PidListMode, PidListPage, ProcessLoad, ProcfsInfo,
    Regset, RemoteError, RemoteErrorCode, Reply, Request, ThreadBrief, ThreadInfo, ThreadState,
    TidNamesPage, SIGINFO_LEN,
};
pub use notify::{Notify, NotifyEvent};
pub use packet::{Channel, ControlFrame, Endian, Header, Packet};
pub use signal::{SignalDisposition, TargetSignal};
pub use wire::{WireReader, WireWriter};
