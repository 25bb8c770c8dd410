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

//! RRE (Rise-and-Run-length Encoding) decode — optional (spec §4.D).
//!
//! A rectangle as a background colour plus a list of subrectangles with
//! their own colours: fill with the background, then overdraw each
//! subrectangle.

use super::common::{decode_pixel, Subrect};
use crate::decoder::BackBuffer;
use crate::error::{DecodeError, ProtocolError, Result, VncError};
use crate::protocol::{PixelFormat, Rectangle};

/// Header fields read before the subrectangle list: subrect count and the
/// background pixel (still in wire bytes; caller decodes it).
pub struct RreHeader {
    /// Number of subrectangles that follow.
    pub n_subrects: u32,
}

/// Parses the 4-byte subrectangle count, guarding against an absurd count
/// that would imply an oversize read once multiplied by the subrect size.
///
/// # Errors
///
/// Returns `ProtocolError::OversizeRead` if `n_subrects` would require
/// reading more than the transport's 100 MiB ceiling.
pub fn parse_header(raw_count: [u8; 4], bytes_per_pixel: usize) -> Result<RreHeader> {
    let n_subrects = u32::from_be_bytes(raw_count);
    let subrect_size = bytes_per_pixel + 8;
    let total = usize::try_from(n_subrects)
        .unwrap_or(usize::MAX)
        .saturating_mul(subrect_size);
    if total > crate::transport::MAX_READ_SIZE {
        return Err(VncError::Protocol(ProtocolError::OversizeRead(total)));
    }
    Ok(RreHeader { n_subrects })
}

/// Parses subrectangles from their raw wire bytes
/// (`pixel`, `x: u16`, `y: u16`, `w: u16`, `h: u16` each, big-endian coords).
#[must_use]
pub fn parse_subrects(pixel_format: &PixelFormat, raw: &[u8]) -> Vec<Subrect> {
    let bpp = pixel_format.bytes_per_pixel();
    let stride = bpp + 8;
    raw.chunks_exact(stride)
        .map(|chunk| {
            let color = decode_pixel(pixel_format, &chunk[..bpp]);
            let x = u16::from_be_bytes([chunk[bpp], chunk[bpp + 1]]);
            let y = u16::from_be_bytes([chunk[bpp + 2], chunk[bpp + 3]]);
            let w = u16::from_be_bytes([chunk[bpp + 4], chunk[bpp + 5]]);
            let h = u16::from_be_bytes([chunk[bpp + 6], chunk[bpp + 7]]);
            Subrect { color, x, y, w, h }
        })
        .collect()
}

/// Fills `rect` with `background`, then overdraws each subrectangle
/// (spec §4.D: "fill with background, overdraw each subrectangle").
///
/// `rect` itself is assumed already validated against the framebuffer
/// geometry by the caller, but subrectangles are this encoding's own
/// fields and get no such check upstream, so each is validated here
/// against `rect`'s bounds before anything is drawn.
///
/// # Errors
///
/// Returns `DecodeError::RectOutOfBounds` if any subrectangle extends
/// past `rect`, rather than panicking on an out-of-range fill.
pub fn decode(back: &mut BackBuffer, rect: &Rectangle, background: [u8; 3], subrects: &[Subrect]) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }
    for sub in subrects {
        if u32::from(sub.x) + u32::from(sub.w) > u32::from(rect.width)
            || u32::from(sub.y) + u32::from(sub.h) > u32::from(rect.height)
        {
            return Err(VncError::Decode(DecodeError::RectOutOfBounds));
        }
    }
    back.fill_rect(rect.x, rect.y, rect.width, rect.height, background);
    for sub in subrects {
        back.fill_rect(rect.x + sub.x, rect.y + sub.y, sub.w, sub.h, sub.color);
    }
    Ok(())
}
