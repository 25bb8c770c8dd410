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

//! Input & Presentation's presentation half (spec §4.F): display scale
//! resolution. Frame sampling and "update in place" are the host UI
//! bridge's responsibility (§6); this module only resolves the scale
//! factor the host should apply.

use std::time::Duration;

/// The UI thread samples the back buffer at roughly this cadence
/// (spec §4.F: "~30 fps").
pub const PRESENT_INTERVAL: Duration = Duration::from_millis(1000 / 30);

/// Display scale presets (spec §4.F; `original_source`'s
/// `_get_scale_factor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// 75% of native size.
    Percent75,
    /// Native size.
    Percent100,
    /// 125% of native size.
    Percent125,
    /// Fit to the canvas without ever upscaling.
    Auto,
}

impl Scale {
    /// Resolves this preset to a concrete multiplier given the host
    /// canvas size and the framebuffer geometry.
    ///
    /// `Auto` is `min(canvas_w/width, canvas_h/height, 1.0)` — it never
    /// upscales (spec §4.F).
    #[must_use]
    pub fn resolve(self, canvas_w: u32, canvas_h: u32, fb_width: u16, fb_height: u16) -> f64 {
        match self {
            Scale::Percent75 => 0.75,
            Scale::Percent100 => 1.0,
            Scale::Percent125 => 1.25,
            Scale::Auto => {
                if fb_width == 0 || fb_height == 0 {
                    return 1.0;
                }
                let w_ratio = f64::from(canvas_w) / f64::from(fb_width);
                let h_ratio = f64::from(canvas_h) / f64::from(fb_height);
                w_ratio.min(h_ratio).min(1.0)
            }
        }
    }
}
