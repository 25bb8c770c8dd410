//! Error types for the RFB client core.

use std::io;
use thiserror::Error;

/// Result type for RFB client operations.
pub type Result<T> = std::result::Result<T, VncError>;

/// Transport-layer failures: everything below the protocol parser.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connect budget elapsed before the TCP handshake completed.
    #[error("connect timed out")]
    ConnectTimeout,

    /// A read did not complete within the configured read timeout.
    #[error("read timed out")]
    ReadTimeout,

    /// The peer closed the connection (EOF on a read that expected more bytes).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Wire-protocol violations: bytes that parse but don't make sense, or don't parse.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The server's version string wasn't a recognized `"RFB 003.xxx\n"` line.
    #[error("unsupported protocol version: {0:?}")]
    BadVersion(String),

    /// A structurally invalid message (bad length, inconsistent field, etc).
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A length field requested more than the 100 MiB sanity ceiling.
    #[error("oversize read requested: {0} bytes")]
    OversizeRead(usize),

    /// An unknown message type arrived whose payload length can't be inferred,
    /// so the stream can no longer be trusted to stay aligned.
    #[error("unaligned stream after unknown message type {0}")]
    UnalignedStream(u8),
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// None of the server's offered security types are supported in automatic mode.
    #[error("no supported security type offered by server")]
    UnsupportedSecurity,

    /// VNC authentication's challenge-response was rejected.
    #[error("authentication failed{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    AuthFailed(Option<String>),

    /// The server rejected the connection outright during security negotiation.
    #[error("server rejected connection: {0}")]
    ServerRejected(String),
}

/// Pixel-decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// An encoding id with no decoder and no inferable Raw-equivalent size.
    #[error("unknown encoding: {0}")]
    UnknownEncoding(i32),

    /// A rectangle header whose bounds fall outside the framebuffer geometry.
    #[error("rectangle out of bounds")]
    RectOutOfBounds,

    /// A server `PixelFormat` this decoder cannot interpret.
    #[error("unsupported pixel format")]
    PixelFormatUnsupported,
}

/// Top-level error type unifying every failure category the client can raise.
#[derive(Debug, Error)]
pub enum VncError {
    /// Transport-layer failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol-layer failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Pixel-decoding failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The operation was cancelled (disconnect requested, worker joined early).
    #[error("cancelled")]
    Cancelled,
}

impl From<io::Error> for VncError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            VncError::Transport(TransportError::ConnectionClosed)
        } else {
            VncError::Transport(TransportError::Io(e))
        }
    }
}
