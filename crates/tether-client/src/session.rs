//! Per-connection protocol state.

use std::fmt;
use std::time::Duration;

use tether_proto::{Channel, Endian, SignalDisposition, TargetSignal};
use tracing::info;

use crate::capabilities::RemoteCapabilities;
use crate::error::ClientError;

/// Negotiated protocol revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// What a remote that rejects the version query speaks.
    pub const LEGACY: Self = Self::new(0, 0);
    /// Newest revision this client understands.
    pub const CURRENT: Self = Self::new(0, 5);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Decode the `okstatus` value of a version reply.
    pub fn from_status(status: i32) -> Self {
        Self {
            major: ((status & 0xff00) >> 8) as u8,
            minor: (status & 0xff) as u8,
        }
    }

    pub fn at_least(self, major: u8, minor: u8) -> bool {
        self >= Self::new(major, minor)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Tunables fixed when the session is opened.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Revision proposed to the remote.
    pub client_version: ProtocolVersion,
    /// How long to wait for a reply before retransmitting.
    pub timeout: Duration,
    /// Transmissions of one request before giving up on a reply.
    pub max_retries: u32,
    /// Largest data block moved by one memory or file request.
    pub max_payload: usize,
    /// Report thread creation as a stop instead of a spurious event.
    pub stop_on_thread_events: bool,
    /// Stop retransmissions before the cancellation ladder gives up.
    pub cancel_retransmits: u32,
    /// Interval between stop retransmissions.
    pub cancel_interval: Duration,
    /// Signal handling pushed to the remote before each resume.
    pub signals: Vec<(TargetSignal, SignalDisposition)>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_version: ProtocolVersion::CURRENT,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            max_payload: 1024,
            stop_on_thread_events: false,
            cancel_retransmits: 3,
            cancel_interval: Duration::from_secs(5),
            signals: Vec::new(),
        }
    }
}

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, handshake not done.
    Opening,
    /// Handshake complete.
    Connected,
    /// Disconnected; the transport is gone.
    Closed,
}

/// Protocol state for one transport.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    options: SessionOptions,
    version: ProtocolVersion,
    capabilities: RemoteCapabilities,
    endian: Endian,
    send_channel: Option<Channel>,
    recv_channel: Channel,
    next_mid: u8,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            state: SessionState::Opening,
            options,
            version: ProtocolVersion::LEGACY,
            capabilities: RemoteCapabilities::from_version(ProtocolVersion::LEGACY),
            endian: Endian::default(),
            send_channel: None,
            recv_channel: Channel::Debug,
            next_mid: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn capabilities(&self) -> &RemoteCapabilities {
        &self.capabilities
    }

    /// Transition: Opening → Connected with the negotiated revision.
    pub fn connected(&mut self, version: ProtocolVersion) {
        info!(%version, "protocol negotiated");
        self.version = version;
        self.capabilities = RemoteCapabilities::from_version(version);
        self.state = SessionState::Connected;
    }

    /// Transition: any → Closed.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.send_channel = None;
    }

    pub fn require_open(&self) -> Result<(), ClientError> {
        if self.state == SessionState::Closed {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    /// Fail with [`ClientError::Unsupported`] below `major.minor`.
    pub fn require_version(
        &self,
        feature: &'static str,
        major: u8,
        minor: u8,
    ) -> Result<(), ClientError> {
        if self.version.at_least(major, minor) {
            return Ok(());
        }
        Err(ClientError::Unsupported {
            feature,
            required: ProtocolVersion::new(major, minor).to_string(),
            actual: self.version.to_string(),
        })
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Adopt the byte order the remote uses.
    pub fn set_endian(&mut self, endian: Endian) {
        if endian != self.endian {
            info!(?endian, "remote byte order differs, switching");
            self.endian = endian;
        }
    }

    /// Allocate the message id for the next debug-channel request.
    pub fn next_mid(&mut self) -> u8 {
        let mid = self.next_mid;
        self.next_mid = self.next_mid.wrapping_add(1);
        mid
    }

    /// Record a channel switch on the outbound side. Returns `true` when an
    /// announce frame has to be written first.
    pub fn switch_send_channel(&mut self, channel: Channel) -> bool {
        if self.send_channel == Some(channel) {
            return false;
        }
        self.send_channel = Some(channel);
        true
    }

    pub fn recv_channel(&self) -> Channel {
        self.recv_channel
    }

    pub fn set_recv_channel(&mut self, channel: Channel) {
        self.recv_channel = channel;
    }
}
