//! In-memory remote agent for tests.
//!
//! [`MockRemote`] implements [`Transport`]: frames the client writes are
//! decoded and handed to a responder closure, whose packets are queued for
//! the client to read. A [`MockHandle`] stays with the test to inspect what
//! was sent and to inject unsolicited frames. Reads never block; an empty
//! queue looks like a timeout.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tether_proto::packet::cmd;
use tether_proto::{
    encode_frame, Channel, ControlFrame, FrameDecoder, FrameEvent, Packet, Reply, Request,
};

use crate::transport::Transport;

/// Produces the remote's answer to one request packet.
pub type Responder = Box<dyn FnMut(&Packet) -> Vec<Packet> + Send>;

/// Build the reply packet for `request`.
pub fn reply_to(request: &Packet, reply: Reply) -> Packet {
    reply.to_packet(request.header.mid, request.header.endian)
}

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<Packet>,
    controls: Vec<ControlFrame>,
    damaged: usize,
    hung_up: bool,
    closed: bool,
}

/// Test-side view of a [`MockRemote`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockHandle {
    /// Queue a packet as one frame, as if the remote sent it unprompted.
    pub fn push_packet(&self, packet: &Packet) {
        let frame = encode_frame(&packet.to_bytes());
        lock(&self.state).inbound.extend(frame);
    }

    /// Queue raw bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes.iter().copied());
    }

    /// Every packet the client wrote, in order.
    pub fn packets(&self) -> Vec<Packet> {
        lock(&self.state).written.clone()
    }

    /// Every debug-channel request the client wrote, decoded.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.state)
            .written
            .iter()
            .filter(|p| is_request(p))
            .filter_map(|p| Request::decode(p).ok())
            .collect()
    }

    /// Message ids of the `ok` acknowledgements the client wrote.
    pub fn acks(&self) -> Vec<u8> {
        lock(&self.state)
            .written
            .iter()
            .filter(|p| p.header.cmd == cmd::OK)
            .map(|p| p.header.mid)
            .collect()
    }

    /// Control frames the client wrote.
    pub fn controls(&self) -> Vec<ControlFrame> {
        lock(&self.state).controls.clone()
    }

    /// How many packets with command `cmd` the client wrote.
    pub fn count(&self, command: u8) -> usize {
        lock(&self.state)
            .written
            .iter()
            .filter(|p| p.header.cmd == command)
            .count()
    }

    /// Frames from the client that failed to decode.
    pub fn damaged(&self) -> usize {
        lock(&self.state).damaged
    }

    /// Make further reads fail as if the link dropped.
    pub fn hang_up(&self) {
        lock(&self.state).hung_up = true;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

fn is_request(packet: &Packet) -> bool {
    packet.header.channel == Channel::Debug.as_u8() && packet.header.cmd < cmd::ERR
}

/// A scripted remote agent.
pub struct MockRemote {
    decoder: FrameDecoder,
    state: Arc<Mutex<MockState>>,
    responder: Responder,
}

impl fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRemote")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MockRemote {
    pub fn new<F>(responder: F) -> (Self, MockHandle)
    where
        F: FnMut(&Packet) -> Vec<Packet> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(MockState::default()));
        let remote = Self {
            decoder: FrameDecoder::new(),
            state: Arc::clone(&state),
            responder: Box::new(responder),
        };
        (remote, MockHandle { state })
    }

    fn on_frame(&mut self, content: Vec<u8>) {
        if content.len() == 1 {
            if let Some(frame) = ControlFrame::from_u8(content[0]) {
                lock(&self.state).controls.push(frame);
            }
            return;
        }
        let Ok(packet) = Packet::parse(&content) else {
            lock(&self.state).damaged += 1;
            return;
        };
        lock(&self.state).written.push(packet.clone());
        if !is_request(&packet) {
            return;
        }
        let replies = (self.responder)(&packet);
        let mut state = lock(&self.state);
        for reply in replies {
            state.inbound.extend(encode_frame(&reply.to_bytes()));
        }
    }
}

impl Transport for MockRemote {
    fn read_byte(&mut self, _timeout: Option<Duration>) -> io::Result<Option<u8>> {
        let mut state = lock(&self.state);
        if state.hung_up {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "mock hung up"));
        }
        Ok(state.inbound.pop_front())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        for &byte in data {
            match self.decoder.push(byte) {
                FrameEvent::Frame(content) => self.on_frame(content),
                FrameEvent::Lost(_) => lock(&self.state).damaged += 1,
                FrameEvent::Ignore | FrameEvent::NeedMore => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        lock(&self.state).closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        "mock remote".into()
    }
}
