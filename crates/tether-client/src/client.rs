//! High-level remote target.
//!
//! [`RemoteTarget`] wraps the engine, the process/thread records and the
//! breakpoint table. Its operations are split by concern across
//! `exec`, `memory`, `regs`, `directory`, `notify`, `file` and `auxv`.

use std::fmt;

use tether_proto::{ControlFrame, CpuInfo, Channel, Reply, Request};
use tracing::{debug, info};

use crate::arch::RegisterLayout;
use crate::breakpoint::BreakpointTable;
use crate::cancel::{AutoConfirm, CancelToken, Confirm};
use crate::capabilities::RemoteCapabilities;
use crate::engine::{ConsoleSink, Engine};
use crate::error::{ClientError, ClientResult};
use crate::process::{ProcessRecord, Ptid};
use crate::session::{ProtocolVersion, Session, SessionOptions, SessionState};
use crate::transport::Transport;

/// A process on a remote target, driven over one transport.
pub struct RemoteTarget {
    pub(crate) engine: Engine,
    pub(crate) process: ProcessRecord,
    pub(crate) current: Option<Ptid>,
    pub(crate) breakpoints: BreakpointTable,
    pub(crate) confirm: Box<dyn Confirm>,
    cpu_flags: Option<u32>,
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("engine", &self.engine)
            .field("process", &self.process)
            .field("current", &self.current)
            .field("breakpoints", &self.breakpoints)
            .finish_non_exhaustive()
    }
}

impl RemoteTarget {
    /// Wrap `transport`. Nothing is sent until [`open`](Self::open).
    pub fn new(transport: Box<dyn Transport>, options: SessionOptions) -> Self {
        Self {
            engine: Engine::new(transport, options),
            process: ProcessRecord::default(),
            current: None,
            breakpoints: BreakpointTable::new(),
            confirm: Box::new(AutoConfirm(true)),
            cpu_flags: None,
        }
    }

    /// Reset the remote, connect and negotiate the protocol revision.
    pub fn open(&mut self) -> ClientResult<ProtocolVersion> {
        self.engine.send_control(ControlFrame::Announce(Channel::Reset))?;

        let proposed = self.engine.session().options().client_version;
        let reply = self.engine.send_recv(&Request::Connect {
            major: proposed.major,
            minor: proposed.minor,
        })?;
        expect_ok("connect", reply)?;

        let version = match self.engine.send_recv(&Request::ProtoVersion {
            major: proposed.major,
            minor: proposed.minor,
        })? {
            Reply::OkStatus(status) => ProtocolVersion::from_status(status),
            other => {
                debug!(?other, "version query rejected, assuming legacy remote");
                ProtocolVersion::LEGACY
            }
        };
        self.engine.session_mut().connected(version);

        match self.engine.send_recv(&Request::CpuInfo)? {
            Reply::OkData(data) => {
                let info = CpuInfo::decode(&data, self.engine.session().endian())?;
                self.cpu_flags = Some(info.flags);
            }
            other => debug!(?other, "no cpu info"),
        }
        info!(%version, "connected");
        Ok(version)
    }

    /// Say goodbye to the remote and release the transport.
    pub fn close(&mut self) -> ClientResult<()> {
        if self.engine.session().state() == SessionState::Closed {
            return Ok(());
        }
        if self.engine.session().state() == SessionState::Connected {
            let reply = self.engine.send_recv_with(&Request::Disconnect, 1)?;
            if let Reply::Error(err) = reply {
                debug!(error = %err, "disconnect not acknowledged");
            }
        }
        self.process.invalidate();
        self.current = None;
        self.engine.close()
    }

    // -- accessors --------------------------------------------------------

    pub fn session(&self) -> &Session {
        self.engine.session()
    }

    pub fn version(&self) -> ProtocolVersion {
        self.engine.session().version()
    }

    pub fn capabilities(&self) -> &RemoteCapabilities {
        self.engine.session().capabilities()
    }

    pub fn process(&self) -> &ProcessRecord {
        &self.process
    }

    /// Launch settings (`cwd`, `env`) live on the process record.
    pub fn process_mut(&mut self) -> &mut ProcessRecord {
        &mut self.process
    }

    /// The selected execution context.
    pub fn current(&self) -> Option<Ptid> {
        self.current
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    /// CPU feature flags reported at connect time.
    pub fn cpu_flags(&self) -> Option<u32> {
        self.cpu_flags
    }

    /// Handle for interrupting a blocking wait from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.engine.cancel_token()
    }

    pub fn set_console(&mut self, console: Box<dyn ConsoleSink>) {
        self.engine.set_console(console);
    }

    pub fn set_confirm(&mut self, confirm: Box<dyn Confirm>) {
        self.confirm = confirm;
    }

    /// Send console input to the debuggee.
    pub fn write_console(&mut self, data: &[u8]) -> ClientResult<()> {
        self.engine.send_text(data)
    }

    // -- context ----------------------------------------------------------

    /// Make `ptid` the current context on the remote.
    pub fn select(&mut self, ptid: Ptid) -> ClientResult<()> {
        if self.current == Some(ptid) {
            return Ok(());
        }
        let reply = self.engine.send_recv(&Request::Select {
            pid: ptid.pid,
            tid: ptid.tid,
        })?;
        expect_ok("select", reply)?;
        self.current = Some(ptid);
        Ok(())
    }

    pub(crate) fn require_context(&self) -> ClientResult<Ptid> {
        self.engine.session().require_open()?;
        self.current.ok_or(ClientError::NoContext)
    }

    pub(crate) fn require_process(&self) -> ClientResult<i32> {
        self.engine.session().require_open()?;
        self.process.pid.ok_or(ClientError::NoProcess)
    }

    pub(crate) fn layout(&self) -> ClientResult<&'static dyn RegisterLayout> {
        let cpu = self.process.cpu.ok_or(ClientError::NoProcess)?;
        cpu.layout()
            .ok_or_else(|| ClientError::UnknownArchitecture(cpu.tag()))
    }

    /// Forget the process after it went away on the remote.
    pub(crate) fn process_gone(&mut self) {
        self.process.invalidate();
        self.breakpoints.uninstall_all();
        self.current = None;
    }
}

/// Any success shape is fine.
pub(crate) fn expect_ok(op: &'static str, reply: Reply) -> ClientResult<()> {
    match reply {
        Reply::Error(source) => Err(ClientError::Remote { op, source }),
        _ => Ok(()),
    }
}

/// Only an `okdata` reply is useful.
pub(crate) fn expect_data(op: &'static str, reply: Reply) -> ClientResult<Vec<u8>> {
    match reply {
        Reply::OkData(data) => Ok(data),
        Reply::Error(source) => Err(ClientError::Remote { op, source }),
        other => Err(ClientError::UnexpectedReply {
            op,
            reply: format!("{other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{reply_to, MockRemote};
    use tether_proto::packet::cmd;
    use tether_proto::{CpuInfo, RemoteError, RemoteErrorCode};

    fn responder(protover: Option<i32>) -> impl FnMut(&tether_proto::Packet) -> Vec<tether_proto::Packet> {
        move |p| {
            let reply = match Request::decode(p).unwrap() {
                Request::ProtoVersion { .. } => match protover {
                    Some(status) => Reply::OkStatus(status),
                    None => Reply::Error(RemoteError {
                        code: RemoteErrorCode::Generic,
                        errno: 22,
                        local: false,
                    }),
                },
                Request::CpuInfo => Reply::OkData(CpuInfo { flags: 0x41 }.encode(p.header.endian)),
                _ => Reply::Ok,
            };
            vec![reply_to(p, reply)]
        }
    }

    #[test]
    fn client_open_negotiates_version() {
        let (remote, handle) = MockRemote::new(responder(Some(0x0005)));
        let mut target = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        let version = target.open().unwrap();

        assert_eq!(version, ProtocolVersion::new(0, 5));
        assert_eq!(target.session().state(), SessionState::Connected);
        assert_eq!(target.cpu_flags(), Some(0x41));
        assert_eq!(
            handle.controls(),
            vec![
                ControlFrame::Announce(Channel::Reset),
                ControlFrame::Announce(Channel::Debug)
            ]
        );
        let cmds: Vec<u8> = handle.packets().iter().map(|p| p.header.cmd).collect();
        assert_eq!(cmds, vec![cmd::CONNECT, cmd::PROTOVER, cmd::CPUINFO]);
    }

    #[test]
    fn client_open_legacy_remote() {
        let (remote, _handle) = MockRemote::new(responder(None));
        let mut target = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        assert_eq!(target.open().unwrap(), ProtocolVersion::LEGACY);
        assert!(!target.capabilities().thread_names);
    }

    #[test]
    fn client_close_sends_disconnect_once() {
        let (remote, handle) = MockRemote::new(responder(Some(5)));
        let mut target = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        target.open().unwrap();
        target.close().unwrap();
        target.close().unwrap();
        assert_eq!(handle.count(cmd::DISCONNECT), 1);
        assert!(handle.is_closed());
        assert!(matches!(
            target.select(Ptid::new(1, 1)),
            Err(ClientError::Closed)
        ));
    }

    #[test]
    fn client_select_is_cached() {
        let (remote, handle) = MockRemote::new(responder(Some(5)));
        let mut target = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        target.select(Ptid::new(100, 2)).unwrap();
        target.select(Ptid::new(100, 2)).unwrap();
        assert_eq!(handle.count(cmd::SELECT), 1);
        assert_eq!(target.current(), Some(Ptid::new(100, 2)));
    }

    #[test]
    fn client_requires_context() {
        let (remote, _handle) = MockRemote::new(responder(Some(5)));
        let target = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        assert!(matches!(target.require_context(), Err(ClientError::NoContext)));
        assert!(matches!(target.require_process(), Err(ClientError::NoProcess)));
    }

    #[test]
    fn expect_data_rejects_plain_ok() {
        assert!(matches!(
            expect_data("memrd", Reply::Ok),
            Err(ClientError::UnexpectedReply { op: "memrd", .. })
        ));
        assert_eq!(expect_data("memrd", Reply::OkData(vec![1])).unwrap(), vec![1]);
    }
}
