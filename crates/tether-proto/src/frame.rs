//! Frame codec: delimiting, byte-stuffing and the one's-complement checksum.
//!
//! ```text
//!   [0x7E] [escaped content] [escaped checksum] [0x7E]
//! ```
//!
//! Any content byte equal to the delimiter or the escape byte is sent as
//! `0x7D, byte ^ 0x20`. The checksum is the one's complement of the 8-bit
//! sum of the unescaped content, so a receiver summing every unescaped byte
//! including the checksum must land on `0xFF`.

use crate::error::ProtoError;

/// Frame start and end delimiter.
pub const FRAME_CHAR: u8 = 0x7e;
/// Escape prefix.
pub const ESC_CHAR: u8 = 0x7d;
/// Value XORed into an escaped byte.
pub const ESC_XOR: u8 = 0x20;
/// Default upper bound on unescaped frame content (header + payload + checksum).
pub const DEFAULT_FRAME_LIMIT: usize = 4096;

/// Compute the checksum byte for `content`.
pub fn checksum(content: &[u8]) -> u8 {
    !content.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encode `content` into a complete, delimited frame.
pub fn encode_frame(content: &[u8]) -> Vec<u8> {
    encode_with_checksum(content, checksum(content))
}

fn encode_with_checksum(content: &[u8], csum: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(FRAME_CHAR);
    for &b in content.iter().chain(std::iter::once(&csum)) {
        if b == FRAME_CHAR || b == ESC_CHAR {
            out.push(ESC_CHAR);
            out.push(b ^ ESC_XOR);
        } else {
            out.push(b);
        }
    }
    out.push(FRAME_CHAR);
    out
}

/// Result of pushing one byte into a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Byte arrived outside of any frame and was discarded.
    Ignore,
    /// The frame is not complete yet.
    NeedMore,
    /// A frame was completed and validated; holds the unescaped content
    /// without the checksum.
    Frame(Vec<u8>),
    /// A frame was completed but failed validation. Callers treat this as a
    /// lost packet and ask for a resend.
    Lost(ProtoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    InFrame,
}

/// Incremental frame decoder fed one byte at a time.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    escape_pending: bool,
    sum: u8,
    buf: Vec<u8>,
    limit: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default frame size limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_FRAME_LIMIT)
    }

    /// Create a decoder that rejects frames with more than `limit`
    /// unescaped bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: DecodeState::Idle,
            escape_pending: false,
            sum: 0,
            buf: Vec::new(),
            limit,
        }
    }

    /// Whether a frame has been started but not yet completed.
    pub fn in_frame(&self) -> bool {
        self.state == DecodeState::InFrame && !self.buf.is_empty()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.escape_pending = false;
        self.sum = 0;
        self.buf.clear();
    }

    /// Feed one byte from the wire.
    pub fn push(&mut self, byte: u8) -> FrameEvent {
        match self.state {
            DecodeState::Idle => {
                if byte == FRAME_CHAR {
                    self.start();
                    FrameEvent::NeedMore
                } else {
                    FrameEvent::Ignore
                }
            }
            DecodeState::InFrame => match byte {
                // Back-to-back delimiters: the previous frame's end doubles
                // as this one's start.
                FRAME_CHAR if self.buf.is_empty() => {
                    self.start();
                    FrameEvent::NeedMore
                }
                FRAME_CHAR => self.finish(),
                ESC_CHAR => {
                    self.escape_pending = true;
                    FrameEvent::NeedMore
                }
                _ => {
                    let b = if self.escape_pending {
                        self.escape_pending = false;
                        byte ^ ESC_XOR
                    } else {
                        byte
                    };
                    self.buf.push(b);
                    self.sum = self.sum.wrapping_add(b);
                    if self.buf.len() > self.limit {
                        self.reset();
                        return FrameEvent::Lost(ProtoError::Oversized { limit: self.limit });
                    }
                    FrameEvent::NeedMore
                }
            },
        }
    }

    fn start(&mut self) {
        self.reset();
        self.state = DecodeState::InFrame;
    }

    fn finish(&mut self) -> FrameEvent {
        let sum = self.sum;
        let mut content = std::mem::take(&mut self.buf);
        self.reset();
        if sum != 0xff {
            return FrameEvent::Lost(ProtoError::Checksum { sum });
        }
        content.pop();
        FrameEvent::Frame(content)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the first complete frame found in `bytes`.
pub fn decode_frame(bytes: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let mut decoder = FrameDecoder::new();
    for &b in bytes {
        match decoder.push(b) {
            FrameEvent::Frame(content) => return Ok(content),
            FrameEvent::Lost(err) => return Err(err),
            FrameEvent::Ignore | FrameEvent::NeedMore => {}
        }
    }
    Err(ProtoError::Truncated {
        what: "frame",
        need: bytes.len() + 1,
        have: bytes.len(),
    })
}
