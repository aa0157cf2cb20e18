//! Packet header layout, channels and command numbering.

use crate::error::ProtoError;

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 4;

/// Bit in the command byte marking a big-endian sender.
pub const BIG_ENDIAN_FLAG: u8 = 0x80;

/// Command numbers. Requests are below 32, replies 32..64, notify 64.
pub mod cmd {
    pub const CONNECT: u8 = 0;
    pub const DISCONNECT: u8 = 1;
    pub const SELECT: u8 = 2;
    pub const MAPINFO: u8 = 3;
    pub const LOAD: u8 = 4;
    pub const ATTACH: u8 = 5;
    pub const DETACH: u8 = 6;
    pub const KILL: u8 = 7;
    pub const STOP: u8 = 8;
    pub const MEMRD: u8 = 9;
    pub const MEMWR: u8 = 10;
    pub const REGRD: u8 = 11;
    pub const REGWR: u8 = 12;
    pub const RUN: u8 = 13;
    pub const BRK: u8 = 14;
    pub const FILEOPEN: u8 = 15;
    pub const FILERD: u8 = 16;
    pub const FILEWR: u8 = 17;
    pub const FILECLOSE: u8 = 18;
    pub const PIDLIST: u8 = 19;
    pub const CWD: u8 = 20;
    pub const ENV: u8 = 21;
    pub const BASE_ADDRESS: u8 = 22;
    pub const PROTOVER: u8 = 23;
    pub const HANDLESIG: u8 = 24;
    pub const CPUINFO: u8 = 25;
    pub const TIDNAMES: u8 = 26;
    pub const PROCFSINFO: u8 = 27;

    pub const ERR: u8 = 32;
    pub const OK: u8 = 33;
    pub const OKSTATUS: u8 = 34;
    pub const OKDATA: u8 = 35;

    pub const NOTIFY: u8 = 64;

    /// Console text, only valid on the text channel.
    pub const TEXT: u8 = 0;
}

/// Byte order used for multi-byte payload fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// The opposite byte order.
    pub fn flipped(self) -> Self {
        match self {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        }
    }
}

/// Logical sub-stream multiplexed over one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Reset / negotiation.
    Reset,
    /// Debug commands, replies and notifies.
    Debug,
    /// Console text of the debuggee.
    Text,
}

impl Channel {
    /// Wire value of the channel.
    pub fn as_u8(self) -> u8 {
        match self {
            Channel::Reset => 0,
            Channel::Debug => 1,
            Channel::Text => 2,
        }
    }

    /// Parse a channel byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Channel::Reset),
            1 => Some(Channel::Debug),
            2 => Some(Channel::Text),
            _ => None,
        }
    }
}

/// One-byte frame that steers the receiver rather than carrying a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Subsequent frames belong to this channel.
    Announce(Channel),
    /// The last frame was not received intact; resend it.
    Nak,
}

impl ControlFrame {
    const NAK: u8 = 0xff;

    /// Wire byte of this control frame.
    pub fn as_u8(self) -> u8 {
        match self {
            ControlFrame::Announce(ch) => ch.as_u8(),
            ControlFrame::Nak => Self::NAK,
        }
    }

    /// Interpret the content of a one-byte frame.
    pub fn from_u8(value: u8) -> Option<Self> {
        if value == Self::NAK {
            return Some(ControlFrame::Nak);
        }
        Channel::from_u8(value).map(ControlFrame::Announce)
    }
}

/// Fixed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Command number, endian flag stripped.
    pub cmd: u8,
    /// Command-specific subcommand.
    pub subcmd: u8,
    /// Message id used to pair replies with requests.
    pub mid: u8,
    /// Channel the packet travels on.
    pub channel: u8,
    /// Byte order of the sender.
    pub endian: Endian,
}

impl Header {
    /// Encode the header, folding the endian marker into the command byte.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let cmd = match self.endian {
            Endian::Big => self.cmd | BIG_ENDIAN_FLAG,
            Endian::Little => self.cmd & !BIG_ENDIAN_FLAG,
        };
        [cmd, self.subcmd, self.mid, self.channel]
    }

    /// Decode a header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtoError::Truncated {
                what: "header",
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        let endian = if bytes[0] & BIG_ENDIAN_FLAG != 0 {
            Endian::Big
        } else {
            Endian::Little
        };
        Ok(Self {
            cmd: bytes[0] & !BIG_ENDIAN_FLAG,
            subcmd: bytes[1],
            mid: bytes[2],
            channel: bytes[3],
            endian,
        })
    }

    /// Whether this header belongs to a reply (`err`, `ok`, `okstatus`, `okdata`).
    pub fn is_reply(&self) -> bool {
        matches!(self.cmd, cmd::ERR | cmd::OK | cmd::OKSTATUS | cmd::OKDATA)
    }

    /// Whether this header belongs to an asynchronous notify.
    pub fn is_notify(&self) -> bool {
        self.cmd == cmd::NOTIFY
    }
}

/// A header plus its undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet header.
    pub header: Header,
    /// Raw payload bytes, interpreted in `header.endian`.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Split frame content into header and payload.
    pub fn parse(content: &[u8]) -> Result<Self, ProtoError> {
        let header = Header::parse(content)?;
        Ok(Self {
            header,
            payload: content[HEADER_LEN..].to_vec(),
        })
    }

    /// Concatenate header and payload into frame content.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_big_endian_marker_in_command_byte() {
        let header = Header {
            cmd: cmd::MEMRD,
            subcmd: 0,
            mid: 7,
            channel: Channel::Debug.as_u8(),
            endian: Endian::Big,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes, [cmd::MEMRD | BIG_ENDIAN_FLAG, 0, 7, 1]);

        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_little_endian_has_clear_marker() {
        let parsed = Header::parse(&[cmd::OKDATA, 0, 3, 1]).unwrap();
        assert_eq!(parsed.endian, Endian::Little);
        assert_eq!(parsed.cmd, cmd::OKDATA);
        assert!(parsed.is_reply());
        assert!(!parsed.is_notify());
    }

    #[test]
    fn header_parse_too_short() {
        let err = Header::parse(&[1, 2]).unwrap_err();
        assert_eq!(
            err,
            ProtoError::Truncated {
                what: "header",
                need: 4,
                have: 2
            }
        );
    }

    #[test]
    fn control_frame_values() {
        assert_eq!(ControlFrame::from_u8(0), Some(ControlFrame::Announce(Channel::Reset)));
        assert_eq!(ControlFrame::from_u8(2), Some(ControlFrame::Announce(Channel::Text)));
        assert_eq!(ControlFrame::from_u8(0xff), Some(ControlFrame::Nak));
        assert_eq!(ControlFrame::from_u8(9), None);
        assert_eq!(ControlFrame::Nak.as_u8(), 0xff);
    }

    #[test]
    fn packet_split_and_join() {
        let content = [cmd::NOTIFY | BIG_ENDIAN_FLAG, 6, 42, 1, 0xde, 0xad];
        let packet = Packet::parse(&content).unwrap();
        assert!(packet.header.is_notify());
        assert_eq!(packet.header.endian, Endian::Big);
        assert_eq!(packet.payload, vec![0xde, 0xad]);
        assert_eq!(packet.to_bytes(), content.to_vec());
    }

    #[test]
    fn endian_flip() {
        assert_eq!(Endian::Little.flipped(), Endian::Big);
        assert_eq!(Endian::Big.flipped(), Endian::Little);
    }
}
