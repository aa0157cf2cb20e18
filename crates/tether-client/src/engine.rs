//! Request/reply engine.
//!
//! One request is outstanding at a time. Replies are matched by message id;
//! anything else that arrives meanwhile is either console text (forwarded to
//! the [`ConsoleSink`]), a notify (queued for the wait loop), or stale and
//! dropped. Lost frames, timeouts and NAKs trigger a resend of the same
//! packet until the retry budget runs out, at which point a local I/O error
//! reply is synthesized.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_proto::frame::DEFAULT_FRAME_LIMIT;
use tether_proto::packet::HEADER_LEN;
use tether_proto::{
    encode_frame, Channel, ControlFrame, FrameDecoder, FrameEvent, Header, Packet, RemoteError,
    Reply, Request,
};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::ClientResult;
use crate::session::{Session, SessionOptions};
use crate::transport::Transport;

/// Receives debuggee console output from the text channel.
pub trait ConsoleSink: Send {
    fn write(&mut self, data: &[u8]);
}

/// Writes console output to the process's stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write(&mut self, data: &[u8]) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(data).and_then(|()| out.flush()) {
            warn!(error = %e, "console output lost");
        }
    }
}

/// Collects console output in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    data: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl ConsoleSink for BufferSink {
    fn write(&mut self, data: &[u8]) {
        if let Ok(mut buf) = self.data.lock() {
            buf.extend_from_slice(data);
        }
    }
}

/// What one frame off the wire turned out to be.
#[derive(Debug)]
pub(crate) enum Inbound {
    Control(ControlFrame),
    Packet(Packet),
    /// A frame arrived damaged.
    Lost,
}

/// Bytes a reply may carry beyond its data block (header, record fields,
/// checksum).
const REPLY_OVERHEAD: usize = HEADER_LEN + 64;

/// Decoder limit large enough for a reply carrying a full `max_payload`
/// block.
fn frame_limit(max_payload: usize) -> usize {
    DEFAULT_FRAME_LIMIT.max(max_payload.saturating_add(REPLY_OVERHEAD))
}

/// Owns the transport and the session, and moves packets across.
pub struct Engine {
    transport: Box<dyn Transport>,
    session: Session,
    decoder: FrameDecoder,
    console: Box<dyn ConsoleSink>,
    cancel: CancelToken,
    notifies: VecDeque<Packet>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("transport", &self.transport)
            .field("session", &self.session)
            .field("queued_notifies", &self.notifies.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(transport: Box<dyn Transport>, options: SessionOptions) -> Self {
        let decoder = FrameDecoder::with_limit(frame_limit(options.max_payload));
        Self {
            transport,
            session: Session::new(options),
            decoder,
            console: Box::new(StdoutSink),
            cancel: CancelToken::new(),
            notifies: VecDeque::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn set_console(&mut self, console: Box<dyn ConsoleSink>) {
        self.console = console;
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // -- sending ----------------------------------------------------------

    fn write_frame(&mut self, content: &[u8]) -> ClientResult<()> {
        self.transport.write_all(&encode_frame(content))?;
        Ok(())
    }

    /// Write a control frame.
    pub(crate) fn send_control(&mut self, frame: ControlFrame) -> ClientResult<()> {
        debug!(?frame, "send control");
        self.write_frame(&[frame.as_u8()])?;
        self.transport.flush()?;
        Ok(())
    }

    /// Write a packet, announcing its channel first when it changed.
    pub(crate) fn send_packet(&mut self, packet: &Packet) -> ClientResult<()> {
        self.session.require_open()?;
        let channel = Channel::from_u8(packet.header.channel).unwrap_or(Channel::Debug);
        if self.session.switch_send_channel(channel) {
            self.write_frame(&[ControlFrame::Announce(channel).as_u8()])?;
        }
        debug!(
            cmd = packet.header.cmd,
            subcmd = packet.header.subcmd,
            mid = packet.header.mid,
            len = packet.payload.len(),
            "send packet"
        );
        self.write_frame(&packet.to_bytes())?;
        self.transport.flush()?;
        Ok(())
    }

    /// Build the packet for `request` with a fresh message id.
    pub(crate) fn prepare(&mut self, request: &Request) -> ClientResult<Packet> {
        let mid = self.session.next_mid();
        Ok(request.to_packet(mid, self.session.endian())?)
    }

    /// Acknowledge a notify with an `ok` carrying its message id.
    pub(crate) fn ack(&mut self, mid: u8) -> ClientResult<()> {
        let packet = Reply::Ok.to_packet(mid, self.session.endian());
        self.send_packet(&packet)
    }

    /// Send console input to the debuggee. No reply is expected.
    pub fn send_text(&mut self, data: &[u8]) -> ClientResult<()> {
        let packet = Packet {
            header: Header {
                cmd: tether_proto::packet::cmd::TEXT,
                subcmd: 0,
                mid: 0,
                channel: Channel::Text.as_u8(),
                endian: self.session.endian(),
            },
            payload: data.to_vec(),
        };
        self.send_packet(&packet)
    }

    // -- receiving --------------------------------------------------------

    /// Read until one frame completes or `timeout` passes between bytes.
    pub(crate) fn read_frame(&mut self, timeout: Option<Duration>) -> ClientResult<Option<Inbound>> {
        loop {
            let Some(byte) = self.transport.read_byte(timeout)? else {
                return Ok(None);
            };
            match self.decoder.push(byte) {
                FrameEvent::Ignore | FrameEvent::NeedMore => continue,
                FrameEvent::Lost(err) => {
                    warn!(error = %err, "damaged frame");
                    return Ok(Some(Inbound::Lost));
                }
                FrameEvent::Frame(content) if content.len() == 1 => {
                    match ControlFrame::from_u8(content[0]) {
                        Some(frame) => return Ok(Some(Inbound::Control(frame))),
                        None => {
                            debug!(byte = content[0], "unknown control frame");
                            continue;
                        }
                    }
                }
                FrameEvent::Frame(content) => match Packet::parse(&content) {
                    Ok(packet) => return Ok(Some(Inbound::Packet(packet))),
                    Err(err) => {
                        warn!(error = %err, "undecodable packet");
                        return Ok(Some(Inbound::Lost));
                    }
                },
            }
        }
    }

    /// Handle channel bookkeeping and console text. Returns the packet when
    /// it belongs on the debug channel.
    fn route(&mut self, inbound: Inbound) -> Option<Inbound> {
        match inbound {
            Inbound::Control(ControlFrame::Announce(channel)) => {
                self.session.set_recv_channel(channel);
                None
            }
            Inbound::Packet(packet) => {
                let channel = Channel::from_u8(packet.header.channel)
                    .unwrap_or_else(|| self.session.recv_channel());
                if channel == Channel::Text {
                    self.console.write(&packet.payload);
                    return None;
                }
                Some(Inbound::Packet(packet))
            }
            other => Some(other),
        }
    }

    /// Next debug-channel packet, or `None` on timeout. Damaged frames and
    /// stray NAKs are skipped. Queued notifies are returned first.
    pub(crate) fn next_packet(&mut self, timeout: Option<Duration>) -> ClientResult<Option<Packet>> {
        if let Some(packet) = self.notifies.pop_front() {
            return Ok(Some(packet));
        }
        loop {
            let Some(inbound) = self.read_frame(timeout)? else {
                return Ok(None);
            };
            match self.route(inbound) {
                Some(Inbound::Packet(packet)) => return Ok(Some(packet)),
                Some(Inbound::Control(ControlFrame::Nak)) | Some(Inbound::Lost) => {
                    debug!("ignoring damaged or NAK frame while waiting");
                }
                _ => {}
            }
        }
    }

    /// Send `request` and wait for its reply, transmitting it at most
    /// `max_retries` times in total. Never fails on a missing reply:
    /// exhaustion yields a local error reply instead.
    pub fn send_recv(&mut self, request: &Request) -> ClientResult<Reply> {
        let attempts = self.session.options().max_retries;
        self.send_recv_with(request, attempts)
    }

    pub fn send_recv_with(&mut self, request: &Request, attempts: u32) -> ClientResult<Reply> {
        let packet = self.prepare(request)?;
        let mid = packet.header.mid;
        let timeout = self.session.options().timeout;
        let attempts = attempts.max(1);
        let mut sent = 1;
        self.send_packet(&packet)?;

        loop {
            let retransmit = match self.read_frame(Some(timeout))? {
                None => {
                    debug!(op = request.name(), "timed out waiting for reply");
                    self.decoder.reset();
                    true
                }
                Some(inbound) => match self.route(inbound) {
                    None | Some(Inbound::Control(ControlFrame::Announce(_))) => false,
                    Some(Inbound::Lost) | Some(Inbound::Control(ControlFrame::Nak)) => true,
                    Some(Inbound::Packet(reply)) => {
                        if reply.header.is_notify() {
                            debug!(mid = reply.header.mid, "queueing notify received during request");
                            self.notifies.push_back(reply);
                            continue;
                        }
                        if !reply.header.is_reply() || reply.header.mid != mid {
                            debug!(
                                cmd = reply.header.cmd,
                                mid = reply.header.mid,
                                expected = mid,
                                "dropping stale frame"
                            );
                            continue;
                        }
                        self.session.set_endian(reply.header.endian);
                        match Reply::decode(&reply) {
                            Ok(decoded) => {
                                debug!(op = request.name(), ?decoded, "reply");
                                return Ok(decoded);
                            }
                            Err(err) => {
                                warn!(error = %err, op = request.name(), "malformed reply");
                                true
                            }
                        }
                    }
                },
            };
            if !retransmit {
                continue;
            }
            if sent >= attempts {
                warn!(op = request.name(), attempts = sent, "no reply, giving up");
                return Ok(Reply::Error(RemoteError::local_io()));
            }
            sent += 1;
            warn!(op = request.name(), attempt = sent, "retransmitting");
            self.send_packet(&packet)?;
        }
    }

    /// Send without waiting for the reply; the caller reads it later.
    pub(crate) fn send_nowait(&mut self, request: &Request) -> ClientResult<Packet> {
        let packet = self.prepare(request)?;
        self.send_packet(&packet)?;
        Ok(packet)
    }

    /// Close the transport and mark the session closed.
    pub fn close(&mut self) -> ClientResult<()> {
        self.session.close();
        self.transport.close()?;
        Ok(())
    }
}
