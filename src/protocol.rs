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

//! VNC Remote Framebuffer (RFB) protocol constants and structures.
//!
//! This module provides the fundamental building blocks for RFB protocol
//! communication from the client's point of view: protocol version
//! negotiation, message types, security handshakes, encodings, and pixel
//! format definitions. It implements RFB 3.8 as specified in RFC 6143.
//!
//! # Protocol Overview
//!
//! The RFB protocol operates in the following phases, driven by the client:
//! 1. **Protocol Version** - client and server agree on protocol version
//! 2. **Security Handshake** - authentication method selection and execution
//! 3. **Initialization** - exchange of framebuffer parameters and capabilities
//! 4. **Normal Operation** - ongoing message exchange for updates and input

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// The RFB protocol version string this client speaks.
///
/// This client targets RFB protocol version 3.8 only (see `handshake.rs`);
/// the version string is exactly 12 bytes including the trailing newline.
pub const PROTOCOL_VERSION: &str = "RFB 003.008\n";

// Client-to-Server Message Types

/// Message type: client requests to change the pixel format.
///
/// Reserved: this client never emits `SetPixelFormat`, it always decodes
/// whatever format the server advertised in `ServerInit`.
#[allow(dead_code)]
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: client advertises the encodings it can decode.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: client requests a framebuffer update.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: client sends a keyboard event.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: client sends a pointer (mouse) event.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

/// Message type: client sends cut text (clipboard data).
///
/// Reserved: outbound clipboard is out of scope (spec §4.F); the wire shape
/// is kept so a host application can emit it later without a protocol change.
#[allow(dead_code)]
pub const CLIENT_MSG_CUT_TEXT: u8 = 6;

// Server-to-Client Message Types

/// Message type: server sends a framebuffer update.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

/// Message type: server sets colour map entries (ignored; true-color only).
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;

/// Message type: server sends a bell (beep) notification.
pub const SERVER_MSG_BELL: u8 = 2;

/// Message type: server sends cut text (clipboard data).
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

// Encoding types the decoder understands.

/// Encoding type: raw pixel data.
pub const ENCODING_RAW: i32 = 0;

/// Encoding type: Copy Rectangle.
pub const ENCODING_COPYRECT: i32 = 1;

/// Encoding type: Rise-and-Run-length Encoding (optional, spec §4.D).
pub const ENCODING_RRE: i32 = 2;

// Encoding types the client recognizes but never advertises or decodes.
// Richer encodings are a server-only concern for this minimal client
// (spec §9's REDESIGN FLAGS: advertise only what is actually decoded).

/// Encoding type: Compact RRE. Not advertised; recognized for documentation only.
#[allow(dead_code)]
pub const ENCODING_CORRE: i32 = 4;

/// Encoding type: Hextile. Not advertised; recognized for documentation only.
#[allow(dead_code)]
pub const ENCODING_HEXTILE: i32 = 5;

/// Encoding type: Zlib compressed raw. Not advertised.
#[allow(dead_code)]
pub const ENCODING_ZLIB: i32 = 6;

/// Encoding type: Tight. Not advertised.
#[allow(dead_code)]
pub const ENCODING_TIGHT: i32 = 7;

/// Encoding type: ZRLE. Not advertised.
#[allow(dead_code)]
pub const ENCODING_ZRLE: i32 = 16;

// Security Types

/// Security type: invalid/unknown, used only when `nTypes == 0`.
#[allow(dead_code)]
pub const SECURITY_TYPE_INVALID: u8 = 0;

/// Security type: None (no authentication).
pub const SECURITY_TYPE_NONE: u8 = 1;

/// Security type: VNC Authentication (DES challenge-response).
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;

/// Security type: TightVNC tunneling. Recognized, never selected automatically.
#[allow(dead_code)]
pub const SECURITY_TYPE_TIGHT: u8 = 16;

/// Security type: UltraVNC. Recognized, never selected automatically.
#[allow(dead_code)]
pub const SECURITY_TYPE_ULTRA: u8 = 17;

/// Security type: VeNCrypt/TLS. Recognized, never selected automatically.
#[allow(dead_code)]
pub const SECURITY_TYPE_TLS: u8 = 18;

/// Security type: `VeNCrypt`. Recognized, never selected automatically.
#[allow(dead_code)]
pub const SECURITY_TYPE_VENCRYPT: u8 = 19;

/// Security type: UltraVNC MS-Logon II. Recognized but never chosen in
/// automatic mode — completing it correctly requires Diffie-Hellman key
/// agreement this client does not implement (spec §4.B, §9).
#[allow(dead_code)]
pub const SECURITY_TYPE_MS_LOGON_II: u8 = 113;

// Security Results

/// Security result: authentication succeeded.
pub const SECURITY_RESULT_OK: u32 = 0;

/// Represents the pixel format advertised by the server in `ServerInit`.
///
/// Immutable for the life of the session once parsed (spec §3).
#[derive(Debug, Clone)]
pub struct PixelFormat {
    /// Number of bits per pixel (8, 16, 24, or 32).
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// `1` if pixel data is big-endian, `0` if little-endian.
    pub big_endian_flag: u8,
    /// `1` if the pixel format is true-colour, `0` if colour-mapped.
    pub true_colour_flag: u8,
    /// Maximum red colour value.
    pub red_max: u16,
    /// Maximum green colour value.
    pub green_max: u16,
    /// Maximum blue colour value.
    pub blue_max: u16,
    /// Bit shift to apply to isolate the red component.
    pub red_shift: u8,
    /// Bit shift to apply to isolate the green component.
    pub green_shift: u8,
    /// Bit shift to apply to isolate the blue component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Validates that this pixel format is one the decoder can interpret.
    ///
    /// Checks spec §3's invariant: `bits_per_pixel` is a supported multiple
    /// of 8, and for true-colour formats the channel `max` values are
    /// `2^k - 1` and fit within `depth` bits without shift overlap.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if ![8, 16, 24, 32].contains(&self.bits_per_pixel) {
            return false;
        }
        if self.depth == 0 || self.depth > 32 {
            return false;
        }
        if self.true_colour_flag == 0 && self.bits_per_pixel != 8 {
            return false;
        }
        if self.true_colour_flag != 0 {
            let bits_needed = |max: u16| -> u32 {
                if max == 0 {
                    0
                } else {
                    16 - max.leading_zeros()
                }
            };
            let total = bits_needed(self.red_max) + bits_needed(self.green_max) + bits_needed(self.blue_max);
            if total > u32::from(self.depth) {
                return false;
            }
            if self.red_shift >= 32 || self.green_shift >= 32 || self.blue_shift >= 32 {
                return false;
            }
        }
        true
    }

    /// Bytes consumed per pixel on the wire for this format.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel) / 8
    }

    /// Reads and deserializes a `PixelFormat` from a 16-byte RFB buffer.
    ///
    /// # Errors
    ///
    /// Returns `Err` if fewer than 16 bytes are available.
    pub fn from_bytes(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.len() < 16 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for PixelFormat",
            ));
        }
        let pf = Self {
            bits_per_pixel: buf.get_u8(),
            depth: buf.get_u8(),
            big_endian_flag: buf.get_u8(),
            true_colour_flag: buf.get_u8(),
            red_max: buf.get_u16(),
            green_max: buf.get_u16(),
            blue_max: buf.get_u16(),
            red_shift: buf.get_u8(),
            green_shift: buf.get_u8(),
            blue_shift: buf.get_u8(),
        };
        buf.advance(3); // padding
        Ok(pf)
    }
}

/// The `ServerInit` message read at the end of session initialization.
///
/// Carries the framebuffer geometry, the server's pixel format, and a
/// human-readable desktop name (spec §4.C).
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// Width of the framebuffer in pixels.
    pub framebuffer_width: u16,
    /// Height of the framebuffer in pixels.
    pub framebuffer_height: u16,
    /// The pixel format the server will send rectangle payloads in.
    pub pixel_format: PixelFormat,
    /// The desktop name, decoded best-effort from UTF-8.
    pub name: String,
}

impl ServerInit {
    /// Reads a `ServerInit` message: 2+2 bytes geometry, 16 bytes
    /// `PixelFormat`, then a 4-byte length-prefixed name.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the buffer is shorter than the declared name length.
    pub fn from_bytes(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.len() < 20 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for ServerInit header",
            ));
        }
        let framebuffer_width = buf.get_u16();
        let framebuffer_height = buf.get_u16();
        let pixel_format = PixelFormat::from_bytes(buf)?;
        let name_len = buf.get_u32() as usize;
        if buf.len() < name_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for ServerInit name",
            ));
        }
        let name_bytes = buf.split_to(name_len);
        let name = String::from_utf8_lossy(&name_bytes).into_owned();
        Ok(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }
}

/// Writes the `ClientInit` message: a single byte, `1` for shared access.
pub fn write_client_init(buf: &mut BytesMut, shared: bool) {
    buf.put_u8(u8::from(shared));
}

/// Writes a `SetEncodings` message advertising the given encoding ids in
/// preference order.
pub fn write_set_encodings(buf: &mut BytesMut, encodings: &[i32]) {
    buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
    buf.put_u8(0); // padding
    #[allow(clippy::cast_possible_truncation)] // encoding lists are always tiny
    buf.put_u16(encodings.len() as u16);
    for &e in encodings {
        buf.put_i32(e);
    }
}

/// Writes a `FramebufferUpdateRequest` covering the given rectangle.
pub fn write_framebuffer_update_request(
    buf: &mut BytesMut,
    incremental: bool,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
) {
    buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
    buf.put_u8(u8::from(incremental));
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(width);
    buf.put_u16(height);
}

/// Writes a `KeyEvent` message.
pub fn write_key_event(buf: &mut BytesMut, down: bool, keysym: u32) {
    buf.put_u8(CLIENT_MSG_KEY_EVENT);
    buf.put_u8(u8::from(down));
    buf.put_u16(0); // padding
    buf.put_u32(keysym);
}

/// Writes a `PointerEvent` message.
pub fn write_pointer_event(buf: &mut BytesMut, button_mask: u8, x: u16, y: u16) {
    buf.put_u8(CLIENT_MSG_POINTER_EVENT);
    buf.put_u8(button_mask);
    buf.put_u16(x);
    buf.put_u16(y);
}

/// A rectangle header within a `FramebufferUpdate` message: `(x, y, w, h,
/// encoding_id)` (spec §3, §4.D).
#[derive(Debug, Clone, Copy)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type of the pixel data that follows.
    pub encoding: i32,
}

impl Rectangle {
    /// Reads a 12-byte rectangle header.
    ///
    /// # Errors
    ///
    /// Returns `Err` if fewer than 12 bytes are available.
    pub fn from_bytes(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.len() < 12 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for rectangle header",
            ));
        }
        Ok(Self {
            x: buf.get_u16(),
            y: buf.get_u16(),
            width: buf.get_u16(),
            height: buf.get_u16(),
            encoding: buf.get_i32(),
        })
    }

    /// `true` if this rectangle's bounds fit within the given geometry
    /// (spec §3's `x + w ≤ width ∧ y + h ≤ height` invariant).
    #[must_use]
    pub fn fits_within(&self, width: u16, height: u16) -> bool {
        u32::from(self.x) + u32::from(self.width) <= u32::from(width)
            && u32::from(self.y) + u32::from(self.height) <= u32::from(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_rejects_bad_bpp() {
        let mut pf = PixelFormat {
            bits_per_pixel: 12,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        };
        assert!(!pf.is_valid());
        pf.bits_per_pixel = 32;
        assert!(pf.is_valid());
    }

    #[test]
    fn rectangle_bounds_check() {
        let r = Rectangle { x: 10, y: 10, width: 5, height: 5, encoding: 0 };
        assert!(r.fits_within(20, 20));
        assert!(!r.fits_within(12, 20));
    }
}
