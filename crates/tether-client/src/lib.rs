//! tether-client: remote debug protocol client.
//!
//! This crate drives a remote debug agent over a byte-stream transport:
//! request/reply correlation with retry, notify handling and the wait loop,
//! execution control, memory and register access, and the thread/process
//! directory. [`RemoteTarget`] is the entry point.

pub mod arch;
pub mod auxv;
pub mod breakpoint;
pub mod cancel;
pub mod capabilities;
pub mod client;
pub mod directory;
pub mod engine;
pub mod error;
pub mod exec;
pub mod file;
pub mod memory;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod notify;
pub mod process;
pub mod regs;
pub mod session;
pub mod transport;

pub use arch::{Cpu, RegisterDesc, RegisterLayout};
pub use auxv::{AuxEntry, ExecMetadata};
pub use breakpoint::{Breakpoint, BreakpointTable};
pub use cancel::{AutoConfirm, CancelToken, Confirm};
pub use capabilities::RemoteCapabilities;
pub use client::RemoteTarget;
pub use directory::ProcessSummary;
pub use engine::{BufferSink, ConsoleSink, StdoutSink};
pub use error::{ClientError, ClientResult};
pub use file::OpenMode;
pub use notify::{WaitOutcome, WaitStatus};
pub use process::{ProcessRecord, Ptid, ThreadRecord, Validity};
pub use session::{ProtocolVersion, Session, SessionOptions, SessionState};
pub use transport::{SerialTransport, SpawnTransport, Transport};
