//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while decoding frames or packet payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtoError {
    /// The running checksum of a frame did not come out to `0xFF`.
    #[error("frame checksum mismatch (sum {sum:#04x})")]
    Checksum {
        /// The sum that was computed over the frame.
        sum: u8,
    },

    /// A frame grew past the decoder's size limit.
    #[error("frame exceeds {limit} bytes")]
    Oversized {
        /// The configured limit.
        limit: usize,
    },

    /// A frame or payload ended before a field could be read.
    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        /// What was being decoded.
        what: &'static str,
        /// Bytes required.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// A string field was not NUL-terminated.
    #[error("unterminated string in {0}")]
    UnterminatedString(&'static str),

    /// The command byte is not one this client understands.
    #[error("unknown command {0:#04x}")]
    UnknownCommand(u8),

    /// The subcommand is not valid for its command.
    #[error("unknown subcommand {subcmd:#04x} for command {cmd:#04x}")]
    UnknownSubcommand {
        /// Command byte.
        cmd: u8,
        /// Subcommand byte.
        subcmd: u8,
    },

    /// A field held a value outside its allowed range.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_display() {
        let err = ProtoError::Checksum { sum: 0x3c };
        assert_eq!(err.to_string(), "frame checksum mismatch (sum 0x3c)");
    }

    #[test]
    fn truncated_display() {
        let err = ProtoError::Truncated {
            what: "header",
            need: 4,
            have: 2,
        };
        assert_eq!(err.to_string(), "truncated header: need 4 bytes, have 2");
    }

    #[test]
    fn unknown_subcommand_display() {
        let err = ProtoError::UnknownSubcommand { cmd: 0x40, subcmd: 0x20 };
        assert_eq!(
            err.to_string(),
            "unknown subcommand 0x20 for command 0x40"
        );
    }

    #[test]
    fn invalid_value_display() {
        let err = ProtoError::InvalidValue {
            field: "regset",
            value: 9,
        };
        assert_eq!(err.to_string(), "invalid value for regset: 9");
    }
}
