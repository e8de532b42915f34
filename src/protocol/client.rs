//! Client side of the query exchange.
//!
//! The exchange has four phases and each one is a separate method so that a caller can
//! report progress or honor cancellation in between:
//!
//! 1. [`AstmClient::handshake`]: ENQ out, ACK in.
//! 2. [`AstmClient::send_query`]: header frame out, ACK in, EOT out.
//! 3. [`AstmClient::await_response`]: ENQ in, ACK out.
//! 4. [`AstmClient::receive_records`]: frames in (each ACKed) until EOT.
//!
//! [`AstmClient::query`] runs all four back to back.

use super::frame::{checksum, encode_frame, parse_checksum_digits, FrameNumber};
use super::{ProtocolError, ACK, CR, ENQ, EOT, ETX, LF, STX};
use crate::config::ProtocolConfig;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Header record sent to open a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Sender name in the header's sender field.
    pub sender_name: String,
}

impl HeaderRecord {
    /// Header for a query sent as `sender_name`.
    pub fn query(sender_name: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.into(),
        }
    }

    /// Record text, without framing.
    pub fn to_record(&self) -> String {
        format!(
            "H|\\^&|||{}^Query^1.0|||||||LIS2-A2",
            self.sender_name
        )
    }
}

/// Drives one query exchange over a byte stream.
pub struct AstmClient<S> {
    stream: S,
    read_timeout: Duration,
    verify_checksum: bool,
}

impl<S> AstmClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Client with the given per-byte read timeout. Checksums are not verified.
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream,
            read_timeout,
            verify_checksum: false,
        }
    }

    /// Client set up from protocol configuration.
    pub fn from_config(stream: S, config: &ProtocolConfig) -> Self {
        Self::new(stream, config.read_timeout())
            .with_checksum_verification(config.verify_inbound_checksum)
    }

    /// Reject inbound frames whose checksum does not match their content.
    #[must_use]
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Give back the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        match tokio::time::timeout(self.read_timeout, self.stream.read_u8()).await {
            Err(_) => Err(ProtocolError::Timeout(self.read_timeout)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::UnexpectedEof)
            }
            Ok(Err(e)) => Err(ProtocolError::Io(e)),
            Ok(Ok(byte)) => Ok(byte),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send ENQ and require ACK.
    pub async fn handshake(&mut self) -> Result<(), ProtocolError> {
        self.send(&[ENQ]).await?;
        let reply = self.read_byte().await?;
        if reply != ACK {
            return Err(ProtocolError::unexpected(ACK, reply));
        }
        debug!("Handshake acknowledged");
        Ok(())
    }

    /// Send the header as frame 1, require ACK, then release the line with EOT.
    pub async fn send_query(&mut self, header: &HeaderRecord) -> Result<(), ProtocolError> {
        let frame = encode_frame(FrameNumber::FIRST, header.to_record().as_bytes());
        self.send(&frame).await?;
        let reply = self.read_byte().await?;
        if reply != ACK {
            return Err(ProtocolError::FrameNotAcknowledged(reply));
        }
        self.send(&[EOT]).await?;
        debug!(sender = %header.sender_name, "Query header sent");
        Ok(())
    }

    /// Wait for the instrument to request the line, then grant it.
    pub async fn await_response(&mut self) -> Result<(), ProtocolError> {
        let byte = self.read_byte().await?;
        if byte != ENQ {
            return Err(ProtocolError::MissingServerEnquiry(byte));
        }
        self.send(&[ACK]).await
    }

    /// Receive frames until EOT, acknowledging each one. Returns the frame contents in
    /// the order received.
    pub async fn receive_records(&mut self) -> Result<Vec<String>, ProtocolError> {
        let mut records = Vec::new();
        loop {
            let first = self.read_byte().await?;
            if first == EOT {
                break;
            }
            if first != STX {
                return Err(ProtocolError::unexpected(STX, first));
            }
            let number = FrameNumber::from_ascii(self.read_byte().await?)?;

            let mut content = Vec::new();
            loop {
                let byte = self.read_byte().await?;
                if byte == ETX {
                    break;
                }
                content.push(byte);
            }

            let digits = [self.read_byte().await?, self.read_byte().await?];
            if self.verify_checksum {
                let received = parse_checksum_digits(digits)?;
                let computed = checksum(number, &content);
                if received != computed {
                    warn!(frame = number.get(), "Inbound checksum mismatch");
                    return Err(ProtocolError::ChecksumMismatch { computed, received });
                }
            }

            let cr = self.read_byte().await?;
            if cr != CR {
                return Err(ProtocolError::unexpected(CR, cr));
            }
            let lf = self.read_byte().await?;
            if lf != LF {
                return Err(ProtocolError::unexpected(LF, lf));
            }

            self.send(&[ACK]).await?;
            debug!(frame = number.get(), bytes = content.len(), "Frame received");
            records.push(String::from_utf8_lossy(&content).into_owned());
        }
        Ok(records)
    }

    /// Run the whole exchange.
    pub async fn query(&mut self, header: &HeaderRecord) -> Result<Vec<String>, ProtocolError> {
        self.handshake().await?;
        self.send_query(header).await?;
        self.await_response().await?;
        self.receive_records().await
    }
}
