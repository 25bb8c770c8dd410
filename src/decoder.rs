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

//! Pixel Decoder (spec §3, §4.D): the `BackBuffer` image and the
//! `FramebufferUpdate` dispatch loop that fills it.

use crate::encoding::{common, copyrect, raw, rre};
use crate::error::{DecodeError, ProtocolError, Result, VncError};
use crate::protocol::{PixelFormat, Rectangle, ENCODING_COPYRECT, ENCODING_RAW, ENCODING_RRE};
use crate::transport::Transport;
use bytes::Buf;
use tokio::io::{AsyncRead, AsyncWrite};

/// A rectangle's bounds, reported to the caller after a successful decode
/// so a presenter or budget accounting layer can act on "what changed".
#[derive(Debug, Clone, Copy)]
pub struct DirtyRect {
    /// X coordinate of the updated region.
    pub x: u16,
    /// Y coordinate of the updated region.
    pub y: u16,
    /// Width of the updated region.
    pub width: u16,
    /// Height of the updated region.
    pub height: u16,
}

/// The client-side mirror of the server's framebuffer (spec §3): an owned
/// RGB8 pixel array, initialized to opaque black, mutated solely by the
/// receive worker's decode loop.
pub struct BackBuffer {
    width: u16,
    height: u16,
    pixels: Vec<u8>, // RGB8, row-major, 3 bytes/pixel
}

impl BackBuffer {
    /// Allocates a zero-filled (opaque black) buffer of the given geometry.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; usize::from(width) * usize::from(height) * 3],
        }
    }

    /// Framebuffer width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Framebuffer height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    fn index(&self, x: u16, y: u16) -> usize {
        (usize::from(y) * usize::from(self.width) + usize::from(x)) * 3
    }

    /// Writes a single RGB pixel. Callers are responsible for bounds
    /// checking via `Rectangle::fits_within` before decoding.
    pub fn set_pixel(&mut self, x: u16, y: u16, rgb: [u8; 3]) {
        let i = self.index(x, y);
        self.pixels[i..i + 3].copy_from_slice(&rgb);
    }

    /// Reads back a single RGB pixel (test and `CopyRect` support).
    #[must_use]
    pub fn get_pixel(&self, x: u16, y: u16) -> [u8; 3] {
        let i = self.index(x, y);
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    /// Copies a `w × h` region starting at `(x, y)` out into a flat RGB8
    /// buffer, row by row (used by `CopyRect` before the destination write
    /// may alias the source).
    #[must_use]
    pub fn read_rect(&self, x: u16, y: u16, w: u16, h: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(usize::from(w) * usize::from(h) * 3);
        for row in 0..h {
            let start = self.index(x, y + row);
            out.extend_from_slice(&self.pixels[start..start + usize::from(w) * 3]);
        }
        out
    }

    /// Writes a flat RGB8 buffer (as produced by `read_rect`) into the
    /// rectangle at `(x, y)`.
    pub fn write_rect(&mut self, x: u16, y: u16, w: u16, h: u16, data: &[u8]) {
        for row in 0..h {
            let start = self.index(x, y + row);
            let src_off = usize::from(row) * usize::from(w) * 3;
            self.pixels[start..start + usize::from(w) * 3]
                .copy_from_slice(&data[src_off..src_off + usize::from(w) * 3]);
        }
    }

    /// Fills a rectangle with a single solid colour (RRE background and
    /// subrectangle overdraw).
    pub fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, rgb: [u8; 3]) {
        for row in 0..h {
            for col in 0..w {
                self.set_pixel(x + col, y + row, rgb);
            }
        }
    }

    /// Returns a copy of the entire buffer as flat RGB8 bytes — the
    /// screenshot-equivalent hook a host UI can use to save an image
    /// (spec §2's supplemented "screenshot" feature; the RFB core owns no
    /// filesystem or dialog itself).
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.pixels.clone()
    }
}

/// A rectangle decoded off the wire, ready to apply to a `BackBuffer` with
/// no further I/O.
enum RectOp {
    Raw { pixels: Vec<u8> },
    CopyRect { src_x: u16, src_y: u16 },
    Rre { background: [u8; 3], subrects: Vec<common::Subrect> },
    Skip,
}

/// One rectangle's header plus its decoded-but-not-yet-applied body.
pub struct PendingRect {
    rect: Rectangle,
    op: RectOp,
}

/// Reads one `FramebufferUpdate` message body (the caller has already
/// consumed the leading message-type byte) off the wire and decodes every
/// rectangle's payload, without touching a `BackBuffer`.
///
/// This is the async, I/O-bound half of a `FramebufferUpdate`: it never
/// holds the back buffer's lock, so a slow or stalled server cannot block
/// a concurrent `Session::snapshot()` caller (spec §5). Pair it with
/// `apply_update`, which is synchronous and does the actual pixel writes.
///
/// # Errors
///
/// Returns `DecodeError::RectOutOfBounds` if a rectangle's bounds exceed
/// `width`/`height`, or any transport error the underlying reads raise.
/// Unknown encodings are skipped by consuming their Raw-equivalent byte
/// length (spec §4.D) rather than failing the session.
pub async fn read_update<S>(
    transport: &mut Transport<S>,
    width: u16,
    height: u16,
    pixel_format: &PixelFormat,
) -> Result<Vec<PendingRect>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _padding = transport.read_exact(1).await?;
    let n_rects = transport.read_exact(2).await?.get_u16();

    let mut pending = Vec::with_capacity(usize::from(n_rects));
    for _ in 0..n_rects {
        let mut header = transport.read_exact(12).await?;
        let rect = Rectangle::from_bytes(&mut header)?;

        if !rect.fits_within(width, height) {
            return Err(VncError::Decode(DecodeError::RectOutOfBounds));
        }

        let op = read_rectangle_body(transport, pixel_format, &rect).await?;
        pending.push(PendingRect { rect, op });
    }
    Ok(pending)
}

async fn read_rectangle_body<S>(
    transport: &mut Transport<S>,
    pixel_format: &PixelFormat,
    rect: &Rectangle,
) -> Result<RectOp>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match rect.encoding {
        ENCODING_RAW => {
            let n = usize::from(rect.width) * usize::from(rect.height) * pixel_format.bytes_per_pixel();
            let payload = transport.read_exact(n).await?;
            let pixels = raw::decode_to_rgb(pixel_format, rect.width, rect.height, &payload);
            Ok(RectOp::Raw { pixels })
        }
        ENCODING_COPYRECT => {
            let src = transport.read_exact(4).await?;
            let src_x = u16::from_be_bytes([src[0], src[1]]);
            let src_y = u16::from_be_bytes([src[2], src[3]]);
            Ok(RectOp::CopyRect { src_x, src_y })
        }
        ENCODING_RRE => {
            let count_bytes = transport.read_exact(4).await?;
            let mut raw_count = [0u8; 4];
            raw_count.copy_from_slice(&count_bytes[..4]);
            let header = rre::parse_header(raw_count, pixel_format.bytes_per_pixel())?;

            let bg_raw = transport.read_exact(pixel_format.bytes_per_pixel()).await?;
            let background = common::decode_pixel(pixel_format, &bg_raw);

            let stride = pixel_format.bytes_per_pixel() + 8;
            let payload = transport
                .read_exact(header.n_subrects as usize * stride)
                .await?;
            let subrects = rre::parse_subrects(pixel_format, &payload);

            Ok(RectOp::Rre { background, subrects })
        }
        unknown => {
            log::warn!("unknown rectangle encoding {unknown}; skipping Raw-equivalent payload");
            let n = usize::from(rect.width) * usize::from(rect.height) * pixel_format.bytes_per_pixel();
            if n > crate::transport::MAX_READ_SIZE {
                return Err(VncError::Protocol(ProtocolError::OversizeRead(n)));
            }
            let _ = transport.read_exact(n).await?;
            Ok(RectOp::Skip)
        }
    }
}

/// Applies a batch of already-decoded rectangles to `back` in wire order,
/// returning the set that changed. Pure CPU work over data already off the
/// wire: a caller holds `back`'s lock only for the duration of this call,
/// never across a network read (spec §5).
///
/// # Errors
///
/// Returns `DecodeError::RectOutOfBounds` if a `CopyRect`'s source
/// rectangle or an RRE subrectangle falls outside the framebuffer.
pub fn apply_update(back: &mut BackBuffer, pending: &[PendingRect]) -> Result<Vec<DirtyRect>> {
    let mut dirty = Vec::with_capacity(pending.len());
    for item in pending {
        let rect = &item.rect;
        match &item.op {
            RectOp::Raw { pixels } => {
                if rect.width != 0 && rect.height != 0 {
                    back.write_rect(rect.x, rect.y, rect.width, rect.height, pixels);
                }
            }
            RectOp::CopyRect { src_x, src_y } => {
                copyrect::decode(back, rect, *src_x, *src_y)?;
            }
            RectOp::Rre { background, subrects } => {
                rre::decode(back, rect, *background, subrects)?;
            }
            RectOp::Skip => {}
        }
        dirty.push(DirtyRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }
    Ok(dirty)
}

/// Reads and applies one `FramebufferUpdate` message body in one call, for
/// callers (tests, and any path without a concurrent presenter to avoid
/// blocking) that don't need the read and apply phases split apart.
///
/// # Errors
///
/// See `read_update` and `apply_update`.
pub async fn decode_update<S>(
    transport: &mut Transport<S>,
    back: &mut BackBuffer,
    pixel_format: &PixelFormat,
) -> Result<Vec<DirtyRect>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let pending = read_update(transport, back.width(), back.height(), pixel_format).await?;
    apply_update(back, &pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn bgrx() -> PixelFormat {
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

    #[tokio::test]
    async fn decodes_single_raw_rectangle() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut transport = Transport::from_stream(client, Duration::from_secs(1));
        let mut back = BackBuffer::new(2, 1);

        let body: Vec<u8> = {
            let mut b = vec![0u8]; // padding
            b.extend_from_slice(&1u16.to_be_bytes()); // n_rects
            b.extend_from_slice(&0u16.to_be_bytes()); // x
            b.extend_from_slice(&0u16.to_be_bytes()); // y
            b.extend_from_slice(&2u16.to_be_bytes()); // w
            b.extend_from_slice(&1u16.to_be_bytes()); // h
            b.extend_from_slice(&0i32.to_be_bytes()); // encoding = Raw
            b.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00]);
            b
        };
        server.write_all(&body).await.unwrap();

        let pf = bgrx();
        let dirty = decode_update(&mut transport, &mut back, &pf).await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(back.get_pixel(0, 0), [0, 0, 255]);
        assert_eq!(back.get_pixel(1, 0), [0, 255, 0]);
    }

    #[tokio::test]
    async fn rejects_rectangle_out_of_bounds() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut transport = Transport::from_stream(client, Duration::from_secs(1));
        let mut back = BackBuffer::new(2, 1);

        let body: Vec<u8> = {
            let mut b = vec![0u8];
            b.extend_from_slice(&1u16.to_be_bytes());
            b.extend_from_slice(&0u16.to_be_bytes());
            b.extend_from_slice(&0u16.to_be_bytes());
            b.extend_from_slice(&5u16.to_be_bytes()); // width exceeds framebuffer
            b.extend_from_slice(&1u16.to_be_bytes());
            b.extend_from_slice(&0i32.to_be_bytes());
            b
        };
        server.write_all(&body).await.unwrap();

        let pf = bgrx();
        let err = decode_update(&mut transport, &mut back, &pf).await.unwrap_err();
        assert!(matches!(err, VncError::Decode(DecodeError::RectOutOfBounds)));
    }

    #[tokio::test]
    async fn read_update_then_apply_update_matches_decode_update() {
        // read_update() must not need a BackBuffer at all; apply_update()
        // must be a plain sync call a caller can run after dropping any
        // lock taken only for the read. This is the split session.rs's
        // receive loop relies on to avoid holding back_buffer's mutex
        // across the network reads.
        let (client, mut server) = tokio::io::duplex(4096);
        let mut transport = Transport::from_stream(client, Duration::from_secs(1));
        let mut back = BackBuffer::new(2, 1);

        let body: Vec<u8> = {
            let mut b = vec![0u8];
            b.extend_from_slice(&1u16.to_be_bytes());
            b.extend_from_slice(&0u16.to_be_bytes());
            b.extend_from_slice(&0u16.to_be_bytes());
            b.extend_from_slice(&2u16.to_be_bytes());
            b.extend_from_slice(&1u16.to_be_bytes());
            b.extend_from_slice(&0i32.to_be_bytes());
            b.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00]);
            b
        };
        server.write_all(&body).await.unwrap();

        let pf = bgrx();
        let pending = read_update(&mut transport, back.width(), back.height(), &pf)
            .await
            .unwrap();
        let dirty = apply_update(&mut back, &pending).unwrap();

        assert_eq!(dirty.len(), 1);
        assert_eq!(back.get_pixel(0, 0), [0, 0, 255]);
        assert_eq!(back.get_pixel(1, 0), [0, 255, 0]);
    }
}
