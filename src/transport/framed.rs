use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use super::{Batch, TransportClient};
use crate::config::settings::FramedSocketConfig;
use crate::protocol::frame::{sanitize_printable, FrameCodec};
use crate::utils::error::AcquisitionError;

/// One request/response round trip per cycle against the acquisition server.
pub struct FramedSocketTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    buffer_size: usize,
    command: String,
}

impl FramedSocketTransport {
    pub fn new(config: &FramedSocketConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            buffer_size: config.buffer_size.max(1),
            command: config.command.clone(),
        }
    }

    async fn connect(&self) -> Result<TcpStream, AcquisitionError> {
        let endpoint = self.endpoint();
        match timeout(self.connect_timeout, TcpStream::connect(&endpoint)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(AcquisitionError::ConnectionError(format!(
                "Failed to connect to {}: {}",
                endpoint, e
            ))),
            Err(_) => Err(AcquisitionError::Timeout(format!(
                "Connecting to {} took longer than {:?}",
                endpoint, self.connect_timeout
            ))),
        }
    }

    /// Read until the sanitized bytes hold a complete frame, the peer closes,
    /// the buffer bound is hit or the read deadline passes.
    async fn read_response(&self, stream: &mut TcpStream) -> Result<Vec<u8>, AcquisitionError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut received = Vec::with_capacity(self.buffer_size);
        let mut chunk = vec![0u8; self.buffer_size];

        while received.len() < self.buffer_size {
            let room = self.buffer_size - received.len();
            let n = match timeout_at(deadline, stream.read(&mut chunk[..room])).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(AcquisitionError::ConnectionError(format!(
                        "Read from {} failed: {}",
                        self.endpoint(),
                        e
                    )))
                }
                Err(_) if received.is_empty() => {
                    return Err(AcquisitionError::Timeout(format!(
                        "No response from {} within {:?}",
                        self.endpoint(),
                        self.read_timeout
                    )))
                }
                Err(_) => {
                    warn!("⏱️  Read deadline passed with {} bytes received", received.len());
                    break;
                }
            };

            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);

            if FrameCodec::is_complete(&sanitize_printable(&received)) {
                break;
            }
        }

        if received.is_empty() {
            return Err(AcquisitionError::ConnectionError(format!(
                "{} closed the connection without responding",
                self.endpoint()
            )));
        }
        Ok(received)
    }
}

#[async_trait]
impl TransportClient for FramedSocketTransport {
    async fn fetch_batch(&self) -> Result<Batch, AcquisitionError> {
        let request = FrameCodec::encode_bytes(self.command.as_bytes())?;
        let mut stream = self.connect().await?;

        stream.write_all(&request).await.map_err(|e| {
            AcquisitionError::ConnectionError(format!("Write to {} failed: {}", self.endpoint(), e))
        })?;
        debug!("📤 Sent {} to {}", String::from_utf8_lossy(&request), self.endpoint());

        let result = self.read_response(&mut stream).await;
        if let Err(e) = stream.shutdown().await {
            debug!("Socket shutdown: {}", e);
        }
        let received = result?;

        debug!("📥 {} bytes: {}", received.len(), hex::encode_upper(&received));
        let clean = sanitize_printable(&received);
        if clean.len() != received.len() {
            debug!("🧹 Dropped {} non-printable bytes", received.len() - clean.len());
        }

        Ok(Batch::Frame(Bytes::from(clean)))
    }

    fn transport_type(&self) -> &str {
        "framed_socket"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
