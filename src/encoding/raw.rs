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

//! Raw encoding decode (spec §4.D): `w × h × bytes_per_pixel` bytes,
//! row-major, each pixel unpacked per the server's `PixelFormat`.

use super::common::decode_pixel;
use crate::decoder::BackBuffer;
use crate::protocol::{PixelFormat, Rectangle};

/// Unpacks a Raw rectangle's wire payload into a flat RGB8 buffer,
/// row-major, without touching a `BackBuffer`.
///
/// Pure CPU work over bytes already read off the wire: the receive worker
/// calls this before it takes the back buffer's lock, so decoding never
/// happens while the lock is held (spec §5).
///
/// `payload` must be exactly `width * height * pixel_format.bytes_per_pixel()`
/// bytes.
#[must_use]
pub fn decode_to_rgb(pixel_format: &PixelFormat, width: u16, height: u16, payload: &[u8]) -> Vec<u8> {
    let bpp = pixel_format.bytes_per_pixel();
    let mut pixels = Vec::with_capacity(usize::from(width) * usize::from(height) * 3);
    for row in 0..height {
        for col in 0..width {
            let offset = (usize::from(row) * usize::from(width) + usize::from(col)) * bpp;
            pixels.extend_from_slice(&decode_pixel(pixel_format, &payload[offset..offset + bpp]));
        }
    }
    pixels
}

/// Decodes a Raw rectangle's payload directly into the back buffer.
///
/// `payload` must be exactly `rect.width * rect.height *
/// pixel_format.bytes_per_pixel()` bytes.
pub fn decode(back: &mut BackBuffer, rect: &Rectangle, pixel_format: &PixelFormat, payload: &[u8]) {
    if rect.width == 0 || rect.height == 0 {
        return; // a w=0 or h=0 rectangle mutates nothing (spec §8).
    }
    let pixels = decode_to_rgb(pixel_format, rect.width, rect.height, payload);
    back.write_rect(rect.x, rect.y, rect.width, rect.height, &pixels);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bgrx_payload_into_expected_pixels() {
        let pf = PixelFormat {
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
        };
        let mut back = BackBuffer::new(2, 1);
        let rect = Rectangle { x: 0, y: 0, width: 2, height: 1, encoding: 0 };
        let payload = [0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00];
        decode(&mut back, &rect, &pf, &payload);
        assert_eq!(back.get_pixel(0, 0), [0, 0, 255]);
        assert_eq!(back.get_pixel(1, 0), [0, 255, 0]);
    }

    #[test]
    fn zero_sized_rectangle_is_a_no_op() {
        let pf = PixelFormat {
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
        };
        let mut back = BackBuffer::new(2, 2);
        let before = back.snapshot();
        let rect = Rectangle { x: 0, y: 0, width: 0, height: 2, encoding: 0 };
        decode(&mut back, &rect, &pf, &[]);
        assert_eq!(back.snapshot(), before);
    }
}
