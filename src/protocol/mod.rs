//! ASTM LIS2-A2 line protocol.
//!
//! Control-character framing used by laboratory analyzers:
//!
//! ```text
//! <STX><FN><content><ETX><C1><C2><CR><LF>
//! ```
//!
//! where `FN` is an ASCII digit `'1'..='7'` and `C1C2` is the uppercase hex checksum of
//! the frame number, content and ETX bytes modulo 256.
//!
//! - [`frame`] encodes and decodes single frames.
//! - [`client`] drives the query exchange against an instrument over any async stream.

pub mod client;
pub mod frame;

pub use client::{AstmClient, HeaderRecord};
pub use frame::{checksum, decode_frame, encode_frame, Frame, FrameNumber};

use std::time::Duration;
use thiserror::Error;

/// Enquiry: requests the line
pub const ENQ: u8 = 0x05;
/// Positive acknowledgement
pub const ACK: u8 = 0x06;
/// Negative acknowledgement
pub const NAK: u8 = 0x15;
/// End of transmission
pub const EOT: u8 = 0x04;
/// Start of frame
pub const STX: u8 = 0x02;
/// End of frame content
pub const ETX: u8 = 0x03;
/// Carriage return
pub const CR: u8 = 0x0D;
/// Line feed
pub const LF: u8 = 0x0A;

/// Human-readable name for a control byte, used in error text.
pub fn control_name(byte: u8) -> &'static str {
    match byte {
        ENQ => "ENQ",
        ACK => "ACK",
        NAK => "NAK",
        EOT => "EOT",
        STX => "STX",
        ETX => "ETX",
        CR => "CR",
        LF => "LF",
        _ => "data",
    }
}

/// Failures of a single protocol exchange. Never retried by this crate.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer sent something other than the expected control byte.
    #[error("Expected {expected} (0x{expected_byte:02X}), received: 0x{received:02X}")]
    UnexpectedByte {
        /// Control name of the expected byte
        expected: &'static str,
        /// The expected byte
        expected_byte: u8,
        /// What arrived instead
        received: u8,
    },

    /// A frame was answered with something other than ACK.
    #[error("Frame not ACKed, received: 0x{0:02X}")]
    FrameNotAcknowledged(u8),

    /// The instrument did not open its reply with ENQ.
    #[error("Expected ENQ from server, received: 0x{0:02X}")]
    MissingServerEnquiry(u8),

    /// Frame number digit outside `'1'..='7'`.
    #[error("Invalid frame number: 0x{0:02X}")]
    InvalidFrameNumber(u8),

    /// Checksum digits were not hex.
    #[error("Invalid checksum digits: {0:?}")]
    InvalidChecksumDigits([u8; 2]),

    /// Checksum did not match the frame.
    #[error("Checksum mismatch: frame carries {received:02X}, computed {computed:02X}")]
    ChecksumMismatch {
        /// Checksum over the frame as received
        computed: u8,
        /// Checksum the frame carried
        received: u8,
    },

    /// Frame structure was wrong.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The peer closed the connection mid-exchange.
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// No byte arrived within the read timeout.
    #[error("Timed out after {0:?} waiting for instrument")]
    Timeout(Duration),

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn unexpected(expected_byte: u8, received: u8) -> Self {
        Self::UnexpectedByte {
            expected: control_name(expected_byte),
            expected_byte,
            received,
        }
    }
}
