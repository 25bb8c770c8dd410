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

//! Update Engine (spec §4.E): request/response pacing, the pending-request
//! budget, the quality-profile table, and the `ConnectionState` machine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long the engine tolerates silence from the server before deciding
/// prior requests were never honored and resetting the pending counter
/// (spec §4.E).
pub const STALL_THRESHOLD: Duration = Duration::from_secs(3);

/// Maximum tolerated silence before the engine emits a health-probe full
/// request (spec §4.E).
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Forced-refresh timer cadence, independent of the quality profile
/// (spec §4.E item 5: "Forced refresh cadence: 200 ms", held constant
/// across profiles per the table in §4.E).
pub const FORCED_REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// A quality preset modulating the four pacing parameters (spec §4.E,
/// supplemented from `original_source`'s `_on_quality_change`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityProfile {
    /// Lowest latency, least bandwidth-conscious.
    Performance,
    /// Default: a middle ground between latency and bandwidth.
    Balanced,
    /// Prioritizes full-frame fidelity over responsiveness.
    Quality,
}

impl Default for QualityProfile {
    fn default() -> Self {
        QualityProfile::Balanced
    }
}

/// Resolved pacing parameters for a [`QualityProfile`].
#[derive(Debug, Clone, Copy)]
pub struct QualityParams {
    /// Minimum gap between outbound requests.
    pub request_interval: Duration,
    /// Outstanding-request cap.
    pub max_pending: u32,
    /// Cadence of the continuous-update timer.
    pub continuous_interval: Duration,
}

impl QualityProfile {
    /// Resolves this profile to its pacing parameters, per the table in
    /// spec §4.E.
    #[must_use]
    pub fn params(self) -> QualityParams {
        match self {
            QualityProfile::Performance => QualityParams {
                request_interval: Duration::from_millis(25),
                max_pending: 2,
                continuous_interval: Duration::from_millis(33),
            },
            QualityProfile::Balanced => QualityParams {
                request_interval: Duration::from_millis(33),
                max_pending: 2,
                continuous_interval: Duration::from_millis(50),
            },
            QualityProfile::Quality => QualityParams {
                request_interval: Duration::from_millis(50),
                max_pending: 1,
                continuous_interval: Duration::from_millis(100),
            },
        }
    }
}

/// The pending-request budget and pacing bookkeeping (spec §3's
/// `UpdateBudget`, spec §4.E's pacing rules).
///
/// `pending_requests` and `last_response_time` are written only by the
/// receive worker; the UI context observes them through the same atomics
/// and mutex, satisfying spec §5's "acquire loads" ordering requirement —
/// a missed read at most costs one suppressed or duplicated request, never
/// correctness.
pub struct UpdateBudget {
    pending_requests: AtomicU32,
    last_request_time: Mutex<Option<Instant>>,
    last_response_time: Mutex<Option<Instant>>,
    profile: Mutex<QualityProfile>,
}

impl UpdateBudget {
    /// Creates a budget reset to zero pending requests under the given
    /// profile (spec §3: "`UpdateBudget` resets on every transition into
    /// `Streaming`").
    ///
    /// `last_response_time` is seeded to the moment of creation rather than
    /// left empty: spec §8 scenario 6 measures the liveness timeout "after
    /// Init", not from a first response that may never arrive, so a server
    /// that sends nothing at all must still trip the health probe.
    #[must_use]
    pub fn new(profile: QualityProfile) -> Self {
        Self {
            pending_requests: AtomicU32::new(0),
            last_request_time: Mutex::new(None),
            last_response_time: Mutex::new(Some(Instant::now())),
            profile: Mutex::new(profile),
        }
    }

    /// Current quality profile.
    #[must_use]
    pub fn quality_profile(&self) -> QualityProfile {
        *self.profile.lock().unwrap()
    }

    /// Swaps the active quality profile at runtime (spec §2's supplemented
    /// runtime-switchable profile).
    pub fn set_quality_profile(&self, profile: QualityProfile) {
        *self.profile.lock().unwrap() = profile;
    }

    /// Current pending-request count.
    #[must_use]
    pub fn pending_requests(&self) -> u32 {
        self.pending_requests.load(Ordering::Acquire)
    }

    /// Decides whether an outbound request may be sent right now, applying
    /// both pacing constraints (spec §4.E rules 1-3) and the stall-recovery
    /// rule (if the server hasn't responded in `STALL_THRESHOLD`, the
    /// pending counter is force-reset to zero so streaming can resume
    /// rather than starve).
    ///
    /// Does not itself record the request; callers that decide to send one
    /// must call [`UpdateBudget::record_request`] afterward.
    pub fn may_request(&self, now: Instant) -> bool {
        if let Some(last_response) = *self.last_response_time.lock().unwrap() {
            if now.duration_since(last_response) > STALL_THRESHOLD {
                self.pending_requests.store(0, Ordering::Release);
            }
        }

        let params = self.params();
        if let Some(last_request) = *self.last_request_time.lock().unwrap() {
            if now.duration_since(last_request) < params.request_interval {
                return false;
            }
        }
        self.pending_requests.load(Ordering::Acquire) < params.max_pending
    }

    /// Records that a request was just sent: bumps `pending_requests` and
    /// the pacing clock.
    pub fn record_request(&self, now: Instant) {
        *self.last_request_time.lock().unwrap() = Some(now);
        self.pending_requests.fetch_add(1, Ordering::AcqRel);
    }

    /// Records an inbound `FramebufferUpdate` header: decrements
    /// `pending_requests` (saturating at zero) and records the response
    /// time for stall/liveness bookkeeping.
    pub fn record_response(&self, now: Instant) {
        let _ = self
            .pending_requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| Some(p.saturating_sub(1)));
        *self.last_response_time.lock().unwrap() = Some(now);
    }

    /// `true` if no `FramebufferUpdate` has arrived for `LIVENESS_TIMEOUT`,
    /// meaning the engine should emit one full health-probe request
    /// (spec §4.E).
    #[must_use]
    pub fn needs_health_probe(&self, now: Instant) -> bool {
        match *self.last_response_time.lock().unwrap() {
            Some(last) => now.duration_since(last) >= LIVENESS_TIMEOUT,
            None => false,
        }
    }

    /// How long it has been since the last `FramebufferUpdate`, measured
    /// from session creation if none has arrived yet. Exposed so a host UI
    /// can build its own status line without duplicating the engine's
    /// bookkeeping (spec §2's supplemented status/diagnostics surface).
    #[must_use]
    pub fn time_since_last_response(&self, now: Instant) -> Option<Duration> {
        self.last_response_time
            .lock()
            .unwrap()
            .map(|last| now.duration_since(last))
    }

    fn params(&self) -> QualityParams {
        self.quality_profile().params()
    }
}

/// Connection lifecycle (spec §3, §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; idle.
    Disconnected,
    /// `connect()` called, TCP handshake in flight.
    Connecting,
    /// Exchanging the 12-byte version lines.
    HandshakingVersion,
    /// Security-type negotiation.
    Negotiating,
    /// Running the selected authentication method.
    Authenticating,
    /// `ClientInit`/`ServerInit` and encoding advertisement.
    Initializing,
    /// Normal operation: update requests and decode loop running.
    Streaming,
    /// Tearing down after an error or explicit disconnect.
    Draining,
}

/// Why a session ended, attached to the terminal `Disconnected` state
/// (spec §3).
#[derive(Debug)]
pub struct FailureCause {
    /// The error that caused the transition, if any. `None` for a clean,
    /// user-requested disconnect.
    pub error: Option<crate::error::VncError>,
}
