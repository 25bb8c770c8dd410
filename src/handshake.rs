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

//! Handshake & Auth, and Session Init (spec §4.B, §4.C): version exchange,
//! security negotiation, VNC authentication, `ClientInit`/`ServerInit`, and
//! encoding advertisement.

use crate::auth;
use crate::error::{AuthError, ProtocolError, Result, VncError};
use crate::protocol::{
    self, PixelFormat, ServerInit, ENCODING_COPYRECT, ENCODING_RAW, SECURITY_TYPE_NONE,
    SECURITY_TYPE_VNC_AUTH,
};
use crate::transport::Transport;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

/// The encodings this client advertises, in preference order (spec §4.C:
/// "a minimal, maximally compatible set"). The decoder additionally
/// understands RRE (spec §4.D, optional) should a server send it
/// unsolicited, but RRE is deliberately not advertised here.
pub const ADVERTISED_ENCODINGS: &[i32] = &[ENCODING_RAW, ENCODING_COPYRECT];

/// Outcome of a completed handshake: the parsed `ServerInit` the Decoder
/// and Update Engine need to begin streaming.
pub struct HandshakeOutcome {
    /// The server's initial geometry, pixel format, and desktop name.
    pub server_init: ServerInit,
}

/// Drives the full connect sequence: version exchange, security
/// negotiation, authentication, `ClientInit`/`ServerInit`, and encoding
/// advertisement (spec §4.B, §4.C).
///
/// # Errors
///
/// Returns `ProtocolError::BadVersion` for an unrecognized version line,
/// `AuthError::*` for negotiation/authentication failures, or any
/// `TransportError` the underlying reads/writes raise.
pub async fn connect<S>(
    transport: &mut Transport<S>,
    password: Option<&str>,
    shared: bool,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate_version(transport).await?;
    negotiate_security(transport, password).await?;

    let mut buf = BytesMut::new();
    buf.reserve(1);
    protocol::write_client_init(&mut buf, shared);
    transport.write_all(&buf).await?;

    let server_init = read_server_init(transport).await?;

    if !server_init.pixel_format.is_valid() {
        return Err(VncError::Decode(crate::error::DecodeError::PixelFormatUnsupported));
    }

    let mut buf = BytesMut::new();
    protocol::write_set_encodings(&mut buf, ADVERTISED_ENCODINGS);
    transport.write_all(&buf).await?;

    Ok(HandshakeOutcome { server_init })
}

async fn negotiate_version<S>(transport: &mut Transport<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = transport.read_exact(12).await?;
    if !line.starts_with(b"RFB 003.") || line[11] != b'\n' {
        return Err(VncError::Protocol(ProtocolError::BadVersion(
            String::from_utf8_lossy(&line).into_owned(),
        )));
    }
    // No fallback to older minor versions is attempted (spec §4.B).
    transport.write_all(protocol::PROTOCOL_VERSION.as_bytes()).await?;
    Ok(())
}

async fn negotiate_security<S>(transport: &mut Transport<S>, password: Option<&str>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let n_types = transport.read_exact(1).await?[0];
    if n_types == 0 {
        let len = transport.read_exact(4).await?.get_u32() as usize;
        let reason = transport.read_exact(len).await?;
        return Err(VncError::Auth(AuthError::ServerRejected(
            String::from_utf8_lossy(&reason).into_owned(),
        )));
    }

    let offered = transport.read_exact(n_types as usize).await?;
    // Preference order: VncAuthentication(2) > None(1). Other recognized
    // types (Tight, Ultra, TLS, VeNCrypt, MS-Logon-II) are never chosen in
    // automatic mode (spec §4.B).
    let selected = if offered.contains(&SECURITY_TYPE_VNC_AUTH) {
        SECURITY_TYPE_VNC_AUTH
    } else if offered.contains(&SECURITY_TYPE_NONE) {
        SECURITY_TYPE_NONE
    } else {
        return Err(VncError::Auth(AuthError::UnsupportedSecurity));
    };

    transport.write_all(&[selected]).await?;

    match selected {
        SECURITY_TYPE_VNC_AUTH => vnc_authenticate(transport, password).await,
        SECURITY_TYPE_NONE => check_security_result(transport).await,
        _ => unreachable!("selected only ever VNC_AUTH or NONE"),
    }
}

async fn vnc_authenticate<S>(transport: &mut Transport<S>, password: Option<&str>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let challenge_bytes = transport.read_exact(16).await?;
    let mut challenge = [0u8; 16];
    challenge.copy_from_slice(&challenge_bytes);

    let response = auth::encrypt_challenge(password.unwrap_or(""), &challenge);
    transport.write_all(&response).await?;

    check_security_result(transport).await
}

async fn check_security_result<S>(transport: &mut Transport<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = transport.read_exact(4).await?.get_u32();
    if result == protocol::SECURITY_RESULT_OK {
        return Ok(());
    }
    // RFB 3.8: a failure is followed by a length-prefixed reason string.
    let len = transport.read_exact(4).await?.get_u32() as usize;
    let reason_bytes = transport.read_exact(len).await?;
    let reason = String::from_utf8_lossy(&reason_bytes).into_owned();
    Err(VncError::Auth(AuthError::AuthFailed(Some(reason))))
}

async fn read_server_init<S>(transport: &mut Transport<S>) -> Result<ServerInit>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = transport.read_exact(24).await?;
    let framebuffer_width = header.get_u16();
    let framebuffer_height = header.get_u16();
    let pixel_format = PixelFormat::from_bytes(&mut header)?;
    let name_len = header.get_u32() as usize;

    let name_bytes: Bytes = if name_len == 0 {
        Bytes::new()
    } else {
        transport.read_exact(name_len).await?.freeze()
    };
    let name = String::from_utf8_lossy(&name_bytes).into_owned();

    Ok(ServerInit {
        framebuffer_width,
        framebuffer_height,
        pixel_format,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SECURITY_RESULT_OK;
    use bytes::BufMut;
    use std::time::Duration;

    async fn pair() -> (Transport<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        (Transport::from_stream(client, Duration::from_secs(1)), server)
    }

    #[tokio::test]
    async fn full_handshake_no_auth_succeeds() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut transport, mut server) = pair().await;

        let server_task = tokio::spawn(async move {
            let mut version = [0u8; 12];
            server.read_exact(&mut version).await.unwrap();
            server.write_all(protocol::PROTOCOL_VERSION.as_bytes()).await.unwrap();

            server.write_all(&[1, SECURITY_TYPE_NONE]).await.unwrap();
            let mut chosen = [0u8; 1];
            server.read_exact(&mut chosen).await.unwrap();
            assert_eq!(chosen[0], SECURITY_TYPE_NONE);

            let mut ok = BytesMut::new();
            ok.put_u32(SECURITY_RESULT_OK);
            server.write_all(&ok).await.unwrap();

            let mut shared = [0u8; 1];
            server.read_exact(&mut shared).await.unwrap();
            assert_eq!(shared[0], 1);

            let mut init = BytesMut::new();
            init.put_u16(2);
            init.put_u16(1);
            PixelFormat {
                bits_per_pixel: 32,
                depth: 24,
                big_endian_flag: 0,
                true_colour_flag: 1,
                red_max: 255,
                green_max: 255,
                blue_max: 255,
                red_shift: 16,
                green_shift: 8,
                blue_shift: 0,
            }
            .write_to_test(&mut init);
            init.put_u32(1);
            init.put_slice(b"X");
            server.write_all(&init).await.unwrap();

            let mut set_enc = [0u8; 4 + 8];
            server.read_exact(&mut set_enc).await.unwrap();
            assert_eq!(set_enc[0], protocol::CLIENT_MSG_SET_ENCODINGS);
        });

        let outcome = connect(&mut transport, None, true).await.unwrap();
        assert_eq!(outcome.server_init.framebuffer_width, 2);
        assert_eq!(outcome.server_init.name, "X");
        server_task.await.unwrap();
    }

    // Test-only mirror of PixelFormat::write_to (the production client
    // never writes a PixelFormat, so that impl lives only here).
    trait WriteToTest {
        fn write_to_test(&self, buf: &mut BytesMut);
    }
    impl WriteToTest for PixelFormat {
        fn write_to_test(&self, buf: &mut BytesMut) {
            buf.put_u8(self.bits_per_pixel);
            buf.put_u8(self.depth);
            buf.put_u8(self.big_endian_flag);
            buf.put_u8(self.true_colour_flag);
            buf.put_u16(self.red_max);
            buf.put_u16(self.green_max);
            buf.put_u16(self.blue_max);
            buf.put_u8(self.red_shift);
            buf.put_u8(self.green_shift);
            buf.put_u8(self.blue_shift);
            buf.put_bytes(0, 3);
        }
    }

    #[tokio::test]
    async fn bad_version_line_is_rejected() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let (mut transport, mut server) = pair().await;
        let server_task = tokio::spawn(async move {
            let mut discard = [0u8; 0];
            let _ = server.read(&mut discard).await;
            server.write_all(b"NOT A VERSION\n").await.unwrap();
        });
        let err = negotiate_version(&mut transport).await.unwrap_err();
        assert!(matches!(err, VncError::Protocol(ProtocolError::BadVersion(_))));
        server_task.await.unwrap();
    }
}
