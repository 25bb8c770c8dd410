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

//! Typed session events (spec §9 redesign: replaces the source's "thread
//! to UI communication via a queue of string tags" with a typed enum).
//!
//! The receive worker pushes these to the [`crate::session::UiBridge`] as
//! they happen; the bridge decides how (or whether) to render them.

use crate::engine::FailureCause;

/// A snapshot of the back buffer handed to the UI bridge on `present`.
///
/// Carries the pixels as RGB8, row-major, matching `BackBuffer::snapshot`.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Framebuffer width in pixels.
    pub width: u16,
    /// Framebuffer height in pixels.
    pub height: u16,
    /// RGB8 pixel data, row-major, 3 bytes per pixel.
    pub pixels: Vec<u8>,
}

/// Events a running [`crate::session::Session`] can raise.
#[derive(Debug)]
pub enum SessionEvent {
    /// A `FramebufferUpdate` was fully decoded and applied to the back
    /// buffer; a new snapshot is ready to present.
    FramePresented(FrameSnapshot),

    /// The server sent a `Bell` message (spec §4.F, §6).
    Bell,

    /// The server sent `ServerCutText`; this is its Latin-1 text decoded
    /// to a Rust `String` (spec §4.F, §6).
    Clipboard(String),

    /// The session ended, cleanly or otherwise (spec §3's terminal
    /// `Disconnected` state with its `FailureCause`).
    Ended(FailureCause),
}
