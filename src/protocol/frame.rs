//! Frame encoding and decoding.

use super::{ProtocolError, CR, ETX, LF, STX};
use std::borrow::Cow;

/// Frame sequence number, `1..=7`, wrapping back to 1 after 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameNumber(u8);

impl FrameNumber {
    /// First number of a transfer.
    pub const FIRST: FrameNumber = FrameNumber(1);
    /// Highest number before wrapping.
    pub const LAST: FrameNumber = FrameNumber(7);

    /// `None` outside `1..=7`.
    pub fn new(value: u8) -> Option<Self> {
        (1..=7).contains(&value).then_some(Self(value))
    }

    /// Parse the ASCII digit carried on the wire.
    pub fn from_ascii(byte: u8) -> Result<Self, ProtocolError> {
        if (b'1'..=b'7').contains(&byte) {
            Ok(Self(byte - b'0'))
        } else {
            Err(ProtocolError::InvalidFrameNumber(byte))
        }
    }

    /// Numeric value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// ASCII digit sent on the wire.
    pub fn as_ascii(self) -> u8 {
        b'0' + self.0
    }

    /// Successor, wrapping 7 to 1.
    #[must_use]
    pub fn next(self) -> Self {
        if self.0 >= Self::LAST.0 {
            Self::FIRST
        } else {
            Self(self.0 + 1)
        }
    }
}

impl Default for FrameNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Checksum over the frame-number byte, the content bytes and ETX, modulo 256.
pub fn checksum(number: FrameNumber, content: &[u8]) -> u8 {
    content
        .iter()
        .fold(number.as_ascii().wrapping_add(ETX), |sum, b| sum.wrapping_add(*b))
}

/// Render a checksum as the two uppercase hex digits sent on the wire.
pub fn checksum_digits(sum: u8) -> [u8; 2] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    [HEX[(sum >> 4) as usize], HEX[(sum & 0x0F) as usize]]
}

/// Parse two hex digits. Lowercase digits are tolerated on input.
pub fn parse_checksum_digits(digits: [u8; 2]) -> Result<u8, ProtocolError> {
    fn nibble(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'A'..=b'F' => Some(b - b'A' + 10),
            b'a'..=b'f' => Some(b - b'a' + 10),
            _ => None,
        }
    }
    match (nibble(digits[0]), nibble(digits[1])) {
        (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
        _ => Err(ProtocolError::InvalidChecksumDigits(digits)),
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number.
    pub number: FrameNumber,
    /// Record bytes between the number and ETX.
    pub content: Vec<u8>,
}

impl Frame {
    /// A frame carrying `content`.
    pub fn new(number: FrameNumber, content: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            content: content.into(),
        }
    }

    /// Checksum over this frame.
    pub fn checksum(&self) -> u8 {
        checksum(self.number, &self.content)
    }

    /// Wire bytes for this frame.
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(self.number, &self.content)
    }

    /// Content as text. Instruments send Latin-1 as often as UTF-8, so invalid
    /// sequences are replaced rather than rejected.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Build `STX FN content ETX C1 C2 CR LF`.
pub fn encode_frame(number: FrameNumber, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 7);
    out.push(STX);
    out.push(number.as_ascii());
    out.extend_from_slice(content);
    out.push(ETX);
    out.extend_from_slice(&checksum_digits(checksum(number, content)));
    out.push(CR);
    out.push(LF);
    out
}

/// Decode one complete frame, verifying every structural byte and the checksum.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() < 7 {
        return Err(ProtocolError::MalformedFrame(format!(
            "frame too short ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[0] != STX {
        return Err(ProtocolError::unexpected(STX, bytes[0]));
    }
    let number = FrameNumber::from_ascii(bytes[1])?;

    let tail = bytes.len() - 5;
    let content = &bytes[2..tail];
    if content.contains(&ETX) {
        return Err(ProtocolError::MalformedFrame(
            "ETX inside frame content".to_string(),
        ));
    }
    if bytes[tail] != ETX {
        return Err(ProtocolError::unexpected(ETX, bytes[tail]));
    }

    let received = parse_checksum_digits([bytes[tail + 1], bytes[tail + 2]])?;
    let computed = checksum(number, content);
    if received != computed {
        return Err(ProtocolError::ChecksumMismatch { computed, received });
    }

    if bytes[tail + 3] != CR {
        return Err(ProtocolError::unexpected(CR, bytes[tail + 3]));
    }
    if bytes[tail + 4] != LF {
        return Err(ProtocolError::unexpected(LF, bytes[tail + 4]));
    }

    Ok(Frame::new(number, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_number_wraps() {
        let mut n = FrameNumber::FIRST;
        let seen: Vec<u8> = (0..9)
            .map(|_| {
                let v = n.get();
                n = n.next();
                v
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7, 1, 2]);
    }

    #[test]
    fn test_frame_number_rejects_out_of_range() {
        assert!(FrameNumber::from_ascii(b'0').is_err());
        assert!(FrameNumber::from_ascii(b'8').is_err());
        assert!(FrameNumber::new(0).is_none());
        assert_eq!(FrameNumber::from_ascii(b'7').map(FrameNumber::get).ok(), Some(7));
    }

    #[test]
    fn test_checksum_matches_manual_sum() {
        let content = b"H|\\^&";
        let expected = (b'1' as u32 + content.iter().map(|b| *b as u32).sum::<u32>() + ETX as u32) % 256;
        assert_eq!(checksum(FrameNumber::FIRST, content) as u32, expected);
    }

    #[test]
    fn test_checksum_digits_uppercase() {
        assert_eq!(&checksum_digits(0xAB), b"AB");
        assert_eq!(&checksum_digits(0x05), b"05");
        assert_eq!(parse_checksum_digits(*b"ab").ok(), Some(0xAB));
        assert!(parse_checksum_digits(*b"G1").is_err());
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode_frame(FrameNumber::FIRST, b"R|1");
        assert_eq!(bytes[0], STX);
        assert_eq!(bytes[1], b'1');
        assert_eq!(&bytes[2..5], b"R|1");
        assert_eq!(bytes[5], ETX);
        let sum = checksum(FrameNumber::FIRST, b"R|1");
        assert_eq!(&bytes[6..8], &checksum_digits(sum));
        assert_eq!(&bytes[8..], &[CR, LF]);
    }

    #[test]
    fn test_decode_reencode_identical() {
        let original = encode_frame(FrameNumber::new(5).unwrap_or_default(), b"R|1|^^^GLU|98|mg/dL");
        let frame = decode_frame(&original).expect("valid frame decodes");
        assert_eq!(frame.number.get(), 5);
        assert_eq!(frame.text(), "R|1|^^^GLU|98|mg/dL");
        assert_eq!(frame.encode(), original);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut bytes = encode_frame(FrameNumber::FIRST, b"O|1");
        let len = bytes.len();
        bytes[len - 4] = if bytes[len - 4] == b'0' { b'1' } else { b'0' };
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_missing_stx() {
        let mut bytes = encode_frame(FrameNumber::FIRST, b"O|1");
        bytes[0] = b'X';
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::UnexpectedByte { expected: "STX", .. })
        ));
    }
}
