//! Opening byte streams to instruments.

use crate::protocol::ProtocolError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Any duplex byte stream the client can drive.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Stream handed out by a [`Connector`].
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens streams to instruments. Swapped for scripted streams in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream to `host:port`.
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, ProtocolError>;
}

/// Plain TCP with a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Connector giving up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, ProtocolError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProtocolError::Timeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;
        debug!(host, port, "TCP connection established");
        Ok(Box::new(stream))
    }
}
