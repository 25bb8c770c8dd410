// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte Transport (spec §4.A): exact-length reads/writes over a duplex
//! stream, with timeouts and a protocol-sanity size guard.

use crate::error::{Result, TransportError, VncError};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Read sizes above this are rejected outright as a protocol-sanity guard
/// (spec §4.A).
pub const MAX_READ_SIZE: usize = 100 * 1024 * 1024;

/// Wraps a duplex byte stream with the timeout and size-guard discipline
/// the RFB core requires of its transport.
///
/// Generic over the stream type so the same discipline applies to a real
/// `TcpStream` and to an in-memory `tokio::io::DuplexStream` used in tests.
pub struct Transport<S> {
    stream: S,
    read_timeout: Duration,
}

impl Transport<TcpStream> {
    /// Opens a TCP connection to `addr`, bounded by `connect_timeout`, and
    /// sets `TCP_NODELAY` to minimize interactive latency.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectTimeout` if the budget elapses, or
    /// `TransportError::Io` if the connection attempt itself fails.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| VncError::Transport(TransportError::ConnectTimeout))?
            .map_err(TransportError::Io)?;
        stream.set_nodelay(true).map_err(TransportError::Io)?;
        Ok(Self { stream, read_timeout })
    }
}

impl<S> Transport<S> {
    /// Wraps an already-connected stream (used for in-memory test pairs and
    /// for the split read/write halves the `Session` hands to its receive
    /// worker and writer lock respectively).
    pub fn from_stream(stream: S, read_timeout: Duration) -> Self {
        Self { stream, read_timeout }
    }

    /// Read timeout this transport enforces on every `read_exact`.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + Unpin,
{
    /// Reads exactly `n` bytes, or fails with `ReadTimeout` /
    /// `ConnectionClosed` / `OversizeRead`. Partial reads are never returned.
    ///
    /// # Errors
    ///
    /// See `TransportError` variants above.
    pub async fn read_exact(&mut self, n: usize) -> Result<BytesMut> {
        if n > MAX_READ_SIZE {
            return Err(VncError::Protocol(crate::error::ProtocolError::OversizeRead(n)));
        }
        let mut buf = vec![0u8; n];
        tokio::time::timeout(self.read_timeout, self.stream.read_exact(&mut buf))
            .await
            .map_err(|_| VncError::Transport(TransportError::ReadTimeout))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    VncError::Transport(TransportError::ConnectionClosed)
                } else {
                    VncError::Transport(TransportError::Io(e))
                }
            })?;
        Ok(BytesMut::from(&buf[..]))
    }
}

impl<S> Transport<S>
where
    S: AsyncWrite + Unpin,
{
    /// Writes the entire buffer, serialized by the caller's transport-write
    /// lock (spec §5's single-writer ordering guarantee).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` on write failure.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(TransportError::Io)?;
        Ok(())
    }

    /// Shuts this half of the duplex stream down, so a peer observing it
    /// sees EOF. On a full-duplex `TcpStream` this alone does not unblock a
    /// concurrently blocked read on the *same* socket (see
    /// `shutdown_both` for that case).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the shutdown syscall fails.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(TransportError::Io)?;
        Ok(())
    }
}

impl Transport<TcpStream> {
    /// Splits a connected TCP transport into an independent read half (for
    /// the receive worker) and write half (for the UI-context writer lock),
    /// per spec §5's "Transport is owned by the receive worker" ownership
    /// split between reader and writer.
    #[must_use]
    pub fn into_split(
        self,
    ) -> (
        Transport<tokio::net::tcp::OwnedReadHalf>,
        Transport<tokio::net::tcp::OwnedWriteHalf>,
    ) {
        let (read, write) = self.stream.into_split();
        (
            Transport { stream: read, read_timeout: self.read_timeout },
            Transport { stream: write, read_timeout: self.read_timeout },
        )
    }
}

impl Transport<tokio::net::tcp::OwnedWriteHalf> {
    /// Shuts down both directions of the underlying socket, which does
    /// unblock a receive worker's pending `read_exact` on the paired read
    /// half with a `ConnectionClosed`/EOF error (spec §5's cancellation
    /// contract: "closes the Transport, which unblocks the receive
    /// worker's read with an error").
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the shutdown syscall fails.
    pub fn shutdown_both(&self) -> Result<()> {
        self.stream
            .as_ref()
            .shutdown(std::net::Shutdown::Both)
            .map_err(TransportError::Io)?;
        Ok(())
    }
}
