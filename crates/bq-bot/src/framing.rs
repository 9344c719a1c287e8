//! Frame transport for the world connection
//!
//! Frames are newline-delimited JSON. The traits keep the transport
//! pluggable: production code wraps TCP halves, tests wrap in-memory
//! duplex pipes.

use async_trait::async_trait;
use bq_core::{BridgeError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

/// Reads one frame at a time from the transport
#[async_trait]
pub trait FrameRead: Send {
    /// Next frame, or `None` on clean EOF
    async fn read_frame(&mut self) -> Result<Option<String>>;
}

/// Writes complete frames to the transport
#[async_trait]
pub trait FrameWrite: Send + Sync {
    async fn write_frame(&mut self, frame: &str) -> Result<()>;
}

/// Newline-delimited frame reader over any byte stream
pub struct LineFrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> LineFrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameRead for LineFrameReader<R> {
    async fn read_frame(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .inner
            .read_line(&mut line)
            .await
            .map_err(|e| {
                debug!("frame read failed: {}", e);
                BridgeError::NotConnected
            })?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Newline-delimited frame writer over any byte stream
pub struct LineFrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineFrameWriter<W> {
    pub fn new(stream: W) -> Self {
        Self { inner: stream }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + Sync> FrameWrite for LineFrameWriter<W> {
    async fn write_frame(&mut self, frame: &str) -> Result<()> {
        let write = async {
            self.inner.write_all(frame.as_bytes()).await?;
            self.inner.write_all(b"\n").await?;
            self.inner.flush().await
        };
        write.await.map_err(|e| {
            debug!("frame write failed: {}", e);
            BridgeError::NotConnected
        })
    }
}
