//! Carbon plaintext sink.
//!
//! Each call opens a fresh TCP connection to the collector, writes the
//! payload once and closes the connection. Nothing is read back.

use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::SendError;

/// Something that can accept an encoded metrics payload.
#[async_trait]
pub trait MetricWriter: Send + Sync + Debug {
    /// Deliver `payload` once. No retries, no buffering.
    async fn send(&self, payload: &str) -> Result<(), SendError>;

    /// Human-readable description of the destination.
    fn target(&self) -> &str;
}

/// TCP sink for a Graphite/Carbon plaintext listener.
#[derive(Debug, Clone)]
pub struct MetricSink {
    addr: String,
    connect_timeout: Duration,
}

impl MetricSink {
    /// Create a sink for `addr` ("host:port").
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    /// The collector address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream, SendError> {
        bounded_connect(&self.addr, self.connect_timeout, TcpStream::connect(&self.addr)).await
    }
}

/// Drive `connect` for at most `timeout`, mapping both failure kinds to `ConnectFailed`.
async fn bounded_connect<F, T>(addr: &str, timeout: Duration, connect: F) -> Result<T, SendError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(SendError::ConnectFailed {
            addr: addr.to_string(),
            detail: e.to_string(),
        }),
        Err(_) => Err(SendError::ConnectFailed {
            addr: addr.to_string(),
            detail: format!("timed out after {:?}", timeout),
        }),
    }
}

#[async_trait]
impl MetricWriter for MetricSink {
    async fn send(&self, payload: &str) -> Result<(), SendError> {
        if payload.is_empty() {
            return Ok(());
        }

        let mut stream = self.connect().await?;

        stream
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| SendError::WriteFailed {
                addr: self.addr.clone(),
                detail: e.to_string(),
            })?;

        // Best effort; the stream is closed on drop either way.
        let _ = stream.shutdown().await;
        Ok(())
    }

    fn target(&self) -> &str {
        &self.addr
    }
}
