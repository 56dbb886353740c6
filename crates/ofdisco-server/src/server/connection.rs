// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed JSON framing over the bus connection.

use super::protocol::BusMessage;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reading half of a bus connection.
pub struct FrameReader<R> {
    inner: R,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Read one frame.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully.
    pub async fn read_message(&mut self) -> Result<Option<BusMessage>, ConnectionError> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(ConnectionError::Io(e)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(ConnectionError::Protocol("empty frame".into()));
        }
        if len > self.max_message_size {
            return Err(ConnectionError::TooLarge {
                len,
                max: self.max_message_size,
            });
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.inner.read_exact(&mut self.read_buffer).await?;

        let msg = serde_json::from_slice(&self.read_buffer)
            .map_err(|e| ConnectionError::Protocol(format!("invalid JSON: {}", e)))?;
        Ok(Some(msg))
    }
}

/// Writing half of a bus connection.
pub struct FrameWriter<W> {
    inner: W,
    max_message_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
        }
    }

    pub async fn send_message(&mut self, msg: &BusMessage) -> Result<(), ConnectionError> {
        let json = serde_json::to_vec(msg)
            .map_err(|e| ConnectionError::Protocol(format!("serialize error: {}", e)))?;
        if json.len() > self.max_message_size {
            return Err(ConnectionError::TooLarge {
                len: json.len(),
                max: self.max_message_size,
            });
        }

        let len = json.len() as u32;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(&json).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("protocol error: {0}")]
    Protocol(String),
}
