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

//! Input & Presentation's input half (spec §4.F): pointer/key wire
//! encoding, coordinate scaling and clamping, the keysym table, composite
//! chords, and wheel-as-button synthesis.

use crate::protocol::{write_key_event, write_pointer_event};
use bytes::BytesMut;
use std::time::Duration;

/// Button mask bits (spec §6): `1 = left`, `2 = middle`, `4 = right`,
/// `8 = wheel up`, `16 = wheel down`.
pub mod button {
    /// Left mouse button.
    pub const LEFT: u8 = 1;
    /// Middle mouse button.
    pub const MIDDLE: u8 = 2;
    /// Right mouse button.
    pub const RIGHT: u8 = 4;
    /// Synthetic "wheel up" button.
    pub const WHEEL_UP: u8 = 8;
    /// Synthetic "wheel down" button.
    pub const WHEEL_DOWN: u8 = 16;
}

/// Inter-event spacing used between chord transitions, tolerating slow
/// servers (spec §4.F; `original_source`'s `_send_ctrl_alt_del`/
/// `_send_alt_tab` use the same 50 ms spacing).
pub const CHORD_STEP_DELAY: Duration = Duration::from_millis(50);

/// Pointer-move events are rate-limited to this cadence at the UI boundary
/// before entering the encoder (spec §4.F).
pub const POINTER_MOTION_HZ: u32 = 50;

/// Maps UI-space coordinates to framebuffer-space coordinates, clamped to
/// `[0, width) × [0, height)` (spec §4.F).
#[must_use]
pub fn map_pointer(ui_x: f64, ui_y: f64, scale: f64, width: u16, height: u16) -> (u16, u16) {
    let real_x = ui_x / scale;
    let real_y = ui_y / scale;
    let x = real_x.max(0.0).min(f64::from(width.saturating_sub(1))) as u16;
    let y = real_y.max(0.0).min(f64::from(height.saturating_sub(1))) as u16;
    (x, y)
}

/// Encodes a `PointerEvent` message (spec §6: `0x05, button_mask, x, y`).
#[must_use]
pub fn pointer_event(button_mask: u8, x: u16, y: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(6);
    write_pointer_event(&mut buf, button_mask, x, y);
    buf
}

/// Encodes the press+release pair for a wheel tick: a synthetic press of
/// `WHEEL_UP`/`WHEEL_DOWN` immediately followed by a release with no
/// buttons held (spec §4.F; `original_source`'s `_on_mouse_wheel`).
#[must_use]
pub fn wheel_event(scroll_up: bool, other_buttons: u8, x: u16, y: u16) -> [BytesMut; 2] {
    let wheel_bit = if scroll_up { button::WHEEL_UP } else { button::WHEEL_DOWN };
    [
        pointer_event(other_buttons | wheel_bit, x, y),
        pointer_event(other_buttons, x, y),
    ]
}

/// Encodes a `KeyEvent` message (spec §6: `0x04, down?, padding×3,
/// keysym_u32`).
#[must_use]
pub fn key_event(down: bool, keysym: u32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    write_key_event(&mut buf, down, keysym);
    buf
}

/// One step of a composite chord: which keysym, and whether it's a press
/// or release.
#[derive(Debug, Clone, Copy)]
pub struct ChordStep {
    /// The X11 keysym for this step.
    pub keysym: u32,
    /// `true` for a key-down, `false` for a key-up.
    pub down: bool,
}

/// Builds the down/up sequence for Ctrl+Alt+Del, to be emitted with
/// `CHORD_STEP_DELAY` between each step (spec §4.F).
#[must_use]
pub fn ctrl_alt_delete_chord() -> Vec<ChordStep> {
    vec![
        ChordStep { keysym: keysym::CONTROL_L, down: true },
        ChordStep { keysym: keysym::ALT_L, down: true },
        ChordStep { keysym: keysym::DELETE, down: true },
        ChordStep { keysym: keysym::DELETE, down: false },
        ChordStep { keysym: keysym::ALT_L, down: false },
        ChordStep { keysym: keysym::CONTROL_L, down: false },
    ]
}

/// Builds the down/up sequence for Alt+Tab (spec §4.F).
#[must_use]
pub fn alt_tab_chord() -> Vec<ChordStep> {
    vec![
        ChordStep { keysym: keysym::ALT_L, down: true },
        ChordStep { keysym: keysym::TAB, down: true },
        ChordStep { keysym: keysym::TAB, down: false },
        ChordStep { keysym: keysym::ALT_L, down: false },
    ]
}

/// X11 keysyms for the common key set named in spec §4.F: letters,
/// digits, arrows, function keys, modifiers, Enter, Esc, Tab, Backspace,
/// Delete, Home/End/PageUp/PageDown.
pub mod keysym {
    /// Backspace.
    pub const BACKSPACE: u32 = 0xFF08;
    /// Tab.
    pub const TAB: u32 = 0xFF09;
    /// Enter/Return.
    pub const RETURN: u32 = 0xFF0D;
    /// Escape.
    pub const ESCAPE: u32 = 0xFF1B;
    /// Delete/forward-delete.
    pub const DELETE: u32 = 0xFFFF;
    /// Home.
    pub const HOME: u32 = 0xFF50;
    /// Left arrow.
    pub const LEFT: u32 = 0xFF51;
    /// Up arrow.
    pub const UP: u32 = 0xFF52;
    /// Right arrow.
    pub const RIGHT: u32 = 0xFF53;
    /// Down arrow.
    pub const DOWN: u32 = 0xFF54;
    /// Page Up.
    pub const PAGE_UP: u32 = 0xFF55;
    /// Page Down.
    pub const PAGE_DOWN: u32 = 0xFF56;
    /// End.
    pub const END: u32 = 0xFF57;
    /// Left Shift.
    pub const SHIFT_L: u32 = 0xFFE1;
    /// Left Control.
    pub const CONTROL_L: u32 = 0xFFE3;
    /// Left Alt.
    pub const ALT_L: u32 = 0xFFE9;
    /// F1.
    pub const F1: u32 = 0xFFBE;
    /// F12.
    pub const F12: u32 = 0xFFC9;

    /// Translates an ASCII printable character to its X11 keysym. For the
    /// common set (letters, digits, and the usual ASCII punctuation) the
    /// keysym value is numerically identical to the Latin-1 code point.
    #[must_use]
    pub fn from_ascii(ch: char) -> Option<u32> {
        if ch.is_ascii() && !ch.is_ascii_control() {
            Some(u32::from(ch as u8))
        } else {
            None
        }
    }

    /// Translates a function-key index (1-12) to its keysym.
    #[must_use]
    pub fn function_key(n: u8) -> Option<u32> {
        if (1..=12).contains(&n) {
            Some(F1 + u32::from(n - 1))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_pointer_clamps_to_framebuffer_bounds() {
        let (x, y) = map_pointer(-5.0, 9999.0, 1.0, 100, 50);
        assert_eq!((x, y), (0, 49));
    }

    #[test]
    fn map_pointer_applies_scale() {
        let (x, y) = map_pointer(100.0, 100.0, 2.0, 200, 200);
        assert_eq!((x, y), (50, 50));
    }

    #[test]
    fn ctrl_alt_delete_chord_is_balanced() {
        let chord = ctrl_alt_delete_chord();
        let downs = chord.iter().filter(|s| s.down).count();
        let ups = chord.iter().filter(|s| !s.down).count();
        assert_eq!(downs, ups);
    }

    #[test]
    fn wheel_event_presses_then_releases() {
        let [press, release] = wheel_event(true, 0, 10, 10);
        assert_eq!(press[1], button::WHEEL_UP);
        assert_eq!(release[1], 0);
    }

    #[test]
    fn ascii_keysym_matches_latin1_code_point() {
        assert_eq!(keysym::from_ascii('A'), Some(0x41));
        assert_eq!(keysym::from_ascii('\n'), None);
    }
}
