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

//! CopyRect decode (spec §4.D): copies a subrectangle of the back buffer
//! onto itself at a new position, preserving source pixels even when the
//! source and destination overlap.

use crate::decoder::BackBuffer;
use crate::error::{DecodeError, Result, VncError};
use crate::protocol::Rectangle;

/// Copies the `w × h` region at `(src_x, src_y)` to `(rect.x, rect.y)`.
///
/// Overlapping regions are copied through a temporary buffer so that
/// source pixels already overwritten by the destination write are never
/// read (spec §4.D, and the CopyRect-identity law of spec §8: copying a
/// region onto itself leaves the buffer unchanged).
///
/// The destination rectangle is assumed already validated against the
/// framebuffer geometry by the caller (as every rectangle header is,
/// spec §3); the *source* rectangle is this encoding's own field and gets
/// no such check upstream, so it is validated here.
///
/// # Errors
///
/// Returns `DecodeError::RectOutOfBounds` if the source rectangle
/// `(src_x, src_y, rect.width, rect.height)` falls outside the
/// framebuffer, rather than panicking on an out-of-range slice.
pub fn decode(back: &mut BackBuffer, rect: &Rectangle, src_x: u16, src_y: u16) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }
    if u32::from(src_x) + u32::from(rect.width) > u32::from(back.width())
        || u32::from(src_y) + u32::from(rect.height) > u32::from(back.height())
    {
        return Err(VncError::Decode(DecodeError::RectOutOfBounds));
    }
    let tile = back.read_rect(src_x, src_y, rect.width, rect.height);
    back.write_rect(rect.x, rect.y, rect.width, rect.height, &tile);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_overlapping_region_without_smearing() {
        // Starting buffer [A, B, C, D] (1x4); copy (src=0,0 w=3,h=1) to x=1.
        let mut back = BackBuffer::new(4, 1);
        back.set_pixel(0, 0, [1, 0, 0]);
        back.set_pixel(1, 0, [2, 0, 0]);
        back.set_pixel(2, 0, [3, 0, 0]);
        back.set_pixel(3, 0, [4, 0, 0]);

        let rect = Rectangle { x: 1, y: 0, width: 3, height: 1, encoding: 1 };
        decode(&mut back, &rect, 0, 0).unwrap();

        assert_eq!(back.get_pixel(0, 0), [1, 0, 0]);
        assert_eq!(back.get_pixel(1, 0), [1, 0, 0]);
        assert_eq!(back.get_pixel(2, 0), [2, 0, 0]);
        assert_eq!(back.get_pixel(3, 0), [3, 0, 0]);
    }

    #[test]
    fn copy_onto_self_is_identity() {
        let mut back = BackBuffer::new(4, 1);
        back.set_pixel(0, 0, [1, 0, 0]);
        back.set_pixel(1, 0, [2, 0, 0]);
        let before = back.snapshot();

        let rect = Rectangle { x: 0, y: 0, width: 2, height: 1, encoding: 1 };
        decode(&mut back, &rect, 0, 0).unwrap();

        assert_eq!(back.snapshot(), before);
    }

    #[test]
    fn out_of_bounds_source_is_rejected_not_panicked() {
        let mut back = BackBuffer::new(4, 1);
        // Source rectangle (src_x=2, w=3) reaches column 5, past width=4.
        let rect = Rectangle { x: 0, y: 0, width: 3, height: 1, encoding: 1 };
        let err = decode(&mut back, &rect, 2, 0).unwrap_err();
        assert!(matches!(
            err,
            VncError::Decode(DecodeError::RectOutOfBounds)
        ));
    }
}
