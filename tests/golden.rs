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

//! End-to-end golden scenarios driven against `tokio::io::duplex`, one per
//! wire/behavior case this client's components must get exactly right:
//! auth success, auth failure, init + first frame, the CopyRect overlap
//! law, pacing under a burst of input, and the liveness health probe.

use bytes::{BufMut, BytesMut};
use rfb_client::engine::{QualityProfile, UpdateBudget, LIVENESS_TIMEOUT};
use rfb_client::error::{AuthError, VncError};
use rfb_client::protocol::{
    self, PixelFormat, SECURITY_RESULT_OK, SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH,
};
use rfb_client::transport::Transport;
use rfb_client::{decoder, handshake};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn write_pixel_format(buf: &mut BytesMut, pf: &PixelFormat) {
    buf.put_u8(pf.bits_per_pixel);
    buf.put_u8(pf.depth);
    buf.put_u8(pf.big_endian_flag);
    buf.put_u8(pf.true_colour_flag);
    buf.put_u16(pf.red_max);
    buf.put_u16(pf.green_max);
    buf.put_u16(pf.blue_max);
    buf.put_u8(pf.red_shift);
    buf.put_u8(pf.green_shift);
    buf.put_u8(pf.blue_shift);
    buf.put_bytes(0, 3);
}

fn bgra_32bpp() -> PixelFormat {
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
}

async fn pair() -> (Transport<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
    let (client, server) = tokio::io::duplex(8192);
    (Transport::from_stream(client, Duration::from_secs(2)), server)
}

/// Scenario: VNC Authentication offered and accepted end to end.
#[tokio::test]
async fn auth_success_with_vnc_authentication() {
    let (mut transport, mut server) = pair().await;

    let server_task = tokio::spawn(async move {
        let mut version = [0u8; 12];
        server.read_exact(&mut version).await.unwrap();
        assert_eq!(&version, protocol::PROTOCOL_VERSION.as_bytes());
        server.write_all(protocol::PROTOCOL_VERSION.as_bytes()).await.unwrap();

        server.write_all(&[1, SECURITY_TYPE_VNC_AUTH]).await.unwrap();
        let mut chosen = [0u8; 1];
        server.read_exact(&mut chosen).await.unwrap();
        assert_eq!(chosen[0], SECURITY_TYPE_VNC_AUTH);

        let challenge = [0x11u8; 16];
        server.write_all(&challenge).await.unwrap();
        let mut response = [0u8; 16];
        server.read_exact(&mut response).await.unwrap();
        // The wire sequence under test is "challenge out, 16-byte response
        // back, then a result"; DES correctness itself is covered in
        // auth.rs's own unit tests.
        assert_eq!(response.len(), 16);

        let mut ok = BytesMut::new();
        ok.put_u32(SECURITY_RESULT_OK);
        server.write_all(&ok).await.unwrap();

        let mut shared = [0u8; 1];
        server.read_exact(&mut shared).await.unwrap();
        assert_eq!(shared[0], 1);

        let mut init = BytesMut::new();
        init.put_u16(2);
        init.put_u16(1);
        write_pixel_format(&mut init, &bgra_32bpp());
        init.put_u32(1);
        init.put_slice(b"X");
        server.write_all(&init).await.unwrap();

        let mut set_enc = [0u8; 4 + 8];
        server.read_exact(&mut set_enc).await.unwrap();
        assert_eq!(set_enc[0], protocol::CLIENT_MSG_SET_ENCODINGS);
    });

    let outcome = handshake::connect(&mut transport, Some("secret"), true).await.unwrap();
    assert_eq!(outcome.server_init.framebuffer_width, 2);
    assert_eq!(outcome.server_init.framebuffer_height, 1);
    assert_eq!(outcome.server_init.name, "X");
    server_task.await.unwrap();
}

/// Scenario: RFB 3.8's post-auth failure path — SecurityResult != 0,
/// followed by a length-prefixed reason string, here "Bad password!!".
#[tokio::test]
async fn auth_failure_reports_server_reason() {
    let (mut transport, mut server) = pair().await;
    let reason = b"Bad password!!";

    let server_task = tokio::spawn(async move {
        let mut version = [0u8; 12];
        server.read_exact(&mut version).await.unwrap();
        server.write_all(protocol::PROTOCOL_VERSION.as_bytes()).await.unwrap();

        server.write_all(&[1, SECURITY_TYPE_VNC_AUTH]).await.unwrap();
        let mut chosen = [0u8; 1];
        server.read_exact(&mut chosen).await.unwrap();

        server.write_all(&[0x22u8; 16]).await.unwrap();
        let mut response = [0u8; 16];
        server.read_exact(&mut response).await.unwrap();

        let mut failure = BytesMut::new();
        failure.put_u32(1); // non-zero: failed
        failure.put_u32(reason.len() as u32);
        failure.put_slice(reason);
        server.write_all(&failure).await.unwrap();
    });

    let err = handshake::connect(&mut transport, Some("wrong"), true).await.unwrap_err();
    match err {
        VncError::Auth(AuthError::AuthFailed(Some(msg))) => {
            assert_eq!(msg, "Bad password!!");
        }
        other => panic!("expected AuthFailed with a reason, got {other:?}"),
    }
    server_task.await.unwrap();
}

/// Scenario: `None` security, full init, and the first frame: a 2x1
/// geometry, 32bpp BGRA, one Raw rectangle producing two known pixels.
#[tokio::test]
async fn init_and_first_frame_decode_expected_geometry_and_pixels() {
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

        let mut init = BytesMut::new();
        init.put_u16(2);
        init.put_u16(1);
        write_pixel_format(&mut init, &bgra_32bpp());
        init.put_u32(1);
        init.put_slice(b"X");
        server.write_all(&init).await.unwrap();

        let mut set_enc = [0u8; 4 + 8];
        server.read_exact(&mut set_enc).await.unwrap();

        // First FramebufferUpdate: one Raw rectangle, 2x1 BGRA pixels
        // producing (0,0,255) then (0,255,0) once decoded to RGB8.
        let mut update = BytesMut::new();
        update.put_u8(protocol::SERVER_MSG_FRAMEBUFFER_UPDATE);
        update.put_u8(0); // padding
        update.put_u16(1); // n_rects
        update.put_u16(0); // x
        update.put_u16(0); // y
        update.put_u16(2); // w
        update.put_u16(1); // h
        update.put_i32(protocol::ENCODING_RAW);
        update.put_slice(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00]);
        server.write_all(&update).await.unwrap();
    });

    let outcome = handshake::connect(&mut transport, None, true).await.unwrap();
    assert_eq!((outcome.server_init.framebuffer_width, outcome.server_init.framebuffer_height), (2, 1));
    assert_eq!(outcome.server_init.pixel_format.bits_per_pixel, 32);
    assert_eq!(outcome.server_init.pixel_format.depth, 24);

    let mut back = decoder::BackBuffer::new(
        outcome.server_init.framebuffer_width,
        outcome.server_init.framebuffer_height,
    );
    let _msg_type = transport.read_exact(1).await.unwrap(); // FramebufferUpdate type byte
    decoder::decode_update(&mut transport, &mut back, &outcome.server_init.pixel_format)
        .await
        .unwrap();

    assert_eq!(back.get_pixel(0, 0), [0, 0, 255]);
    assert_eq!(back.get_pixel(1, 0), [0, 255, 0]);
    server_task.await.unwrap();
}

/// Scenario: a CopyRect rectangle delivered through the full
/// `FramebufferUpdate` dispatch (not the bare decoder unit), shifting
/// [A,B,C,D] to [A,A,B,C] without smearing through the overlap.
#[tokio::test]
async fn copyrect_overlap_through_framebuffer_update_dispatch() {
    let (mut transport, mut server) = pair().await;
    let pf = bgra_32bpp();

    let mut back = decoder::BackBuffer::new(4, 1);
    back.set_pixel(0, 0, [1, 0, 0]);
    back.set_pixel(1, 0, [2, 0, 0]);
    back.set_pixel(2, 0, [3, 0, 0]);
    back.set_pixel(3, 0, [4, 0, 0]);

    let body: Vec<u8> = {
        let mut b = BytesMut::new();
        b.put_u8(0); // padding
        b.put_u16(1); // n_rects
        b.put_u16(1); // x
        b.put_u16(0); // y
        b.put_u16(3); // w
        b.put_u16(1); // h
        b.put_i32(protocol::ENCODING_COPYRECT);
        b.put_u16(0); // src_x
        b.put_u16(0); // src_y
        b.to_vec()
    };
    server.write_all(&body).await.unwrap();
    drop(server);

    decoder::decode_update(&mut transport, &mut back, &pf).await.unwrap();

    assert_eq!(back.get_pixel(0, 0), [1, 0, 0]);
    assert_eq!(back.get_pixel(1, 0), [1, 0, 0]);
    assert_eq!(back.get_pixel(2, 0), [2, 0, 0]);
    assert_eq!(back.get_pixel(3, 0), [3, 0, 0]);
}

/// Scenario: pacing under a burst. `Balanced`'s `request_interval` is 33ms
/// and `max_pending` is 2, so a 10ms-wide burst of a hundred key-presses
/// can issue at most `ceil(10/33) + max_pending` = 3 requests, never one
/// per keystroke.
#[test]
fn balanced_profile_paces_a_burst_of_input() {
    let budget = UpdateBudget::new(QualityProfile::Balanced);
    let start = Instant::now();
    let mut sent = 0u32;

    for i in 0..100 {
        let now = start + Duration::from_micros(i * 100); // spread across 10ms
        if budget.may_request(now) {
            budget.record_request(now);
            sent += 1;
        }
    }

    assert!(sent <= 3, "expected at most 3 paced requests, got {sent}");
    assert!(sent >= 1, "pacing should still allow the first request through");
}

/// Scenario: the server goes silent for the full liveness window. The
/// health probe must trip exactly once the 2s deadline is reached, and the
/// engine must still permit a full (non-incremental) request at that
/// instant so the probe actually reaches the wire.
#[test]
fn health_probe_trips_within_tolerance_of_liveness_deadline() {
    let budget = UpdateBudget::new(QualityProfile::Balanced);
    let t0 = Instant::now();
    budget.record_response(t0);

    // Comfortably before the deadline: no probe yet.
    assert!(!budget.needs_health_probe(t0 + LIVENESS_TIMEOUT - Duration::from_millis(50)));

    // At the deadline, and up to 50ms past it (the poll granularity the
    // session's health-probe timer uses): probe fires.
    assert!(budget.needs_health_probe(t0 + LIVENESS_TIMEOUT));
    assert!(budget.needs_health_probe(t0 + LIVENESS_TIMEOUT + Duration::from_millis(50)));

    // And the budget still allows the probe's full request through.
    assert!(budget.may_request(t0 + LIVENESS_TIMEOUT));
}
