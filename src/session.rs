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

//! The concurrency scaffolding (spec §5) and `UiBridge` boundary (spec
//! §6, §9) that tie the other components into one live session.
//!
//! [`Session::connect`] drives the handshake, then splits the transport
//! into a read half owned by a dedicated receive-worker OS thread and a
//! write half shared (behind a single async lock) by the UI-context entry
//! points and the pacing timers. The receive worker is the sole writer of
//! the back buffer and the `UpdateBudget`; everything else only reads them
//! or sends bytes through the writer lock, matching the ownership split
//! spec §5 calls for in place of the source's "shared mutable globals
//! scattered on one object".

use crate::decoder::BackBuffer;
use crate::engine::{ConnectionState, FailureCause, QualityProfile, UpdateBudget};
use crate::error::{ProtocolError, Result, VncError};
use crate::events::{FrameSnapshot, SessionEvent};
use crate::handshake;
use crate::input::{self, ChordStep};
use crate::protocol::{self, SERVER_MSG_BELL, SERVER_MSG_FRAMEBUFFER_UPDATE, SERVER_MSG_SERVER_CUT_TEXT, SERVER_MSG_SET_COLOUR_MAP_ENTRIES};
use crate::transport::Transport;
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

/// Total budget for the connect sequence (spec §5).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-read timeout used only during connect (spec §5); streaming reads
/// may block indefinitely, bounded instead by the Update Engine's pacing
/// and health-probe timers.
pub const CONNECT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Budget for joining the receive worker after a disconnect (spec §5).
pub const DISCONNECT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How often the health-probe timer checks `UpdateBudget::needs_health_probe`.
/// Finer than the 2s liveness timeout itself so the probe fires within the
/// 50ms tolerance spec §8's scenario 6 requires.
const HEALTH_PROBE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Connect-time configuration (spec §3's configuration surface), built the
/// way the pack's `HsuJv-vnc-rs` shapes its `VncConnector`: a small struct
/// of `with_*` setters over sensible defaults, rather than a long positional
/// argument list on `Session::connect`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    connect_timeout: Duration,
    read_timeout: Duration,
    quality_profile: QualityProfile,
    shared: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: CONNECT_READ_TIMEOUT,
            quality_profile: QualityProfile::default(),
            shared: true,
        }
    }
}

impl ClientConfig {
    /// Starts from the defaults: 10s connect timeout, 2s connect-phase read
    /// timeout, `Balanced` quality, shared access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the total budget for the connect sequence (spec §5).
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the per-read timeout used only during connect (spec §5).
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Overrides the initial quality profile (default `Balanced`).
    #[must_use]
    pub fn with_quality_profile(mut self, profile: QualityProfile) -> Self {
        self.quality_profile = profile;
        self
    }

    /// Overrides the `shared` flag sent in `ClientInit`. `false` asks the
    /// server to drop other clients already attached to the desktop.
    #[must_use]
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }
}

/// A point-in-time snapshot of the Update Engine's pacing state, for a host
/// UI to build its own status line from (spec §2's supplemented
/// status/diagnostics surface).
#[derive(Debug, Clone, Copy)]
pub struct SessionHealth {
    /// Requests sent but not yet answered by a `FramebufferUpdate`.
    pub pending_requests: u32,
    /// How long it has been since the last `FramebufferUpdate`, measured
    /// from session creation if none has arrived yet.
    pub time_since_last_response: Option<Duration>,
    /// The active quality profile.
    pub quality_profile: QualityProfile,
}

/// The boundary a host application implements to receive decoded frames
/// and surface bell/clipboard notifications (spec §6).
///
/// Implementations must be cheap and non-blocking: they are called
/// directly from the receive worker thread.
pub trait UiBridge: Send + Sync {
    /// A new frame is ready to display.
    fn present(&self, frame: FrameSnapshot);

    /// The server rang the bell (spec §4.F: "surface it as a brief UI cue").
    fn on_bell(&self) {}

    /// The server pushed clipboard text.
    fn on_clipboard(&self, text: String) {}

    /// The session ended; `cause.error` is `None` for a clean disconnect.
    fn session_ended(&self, cause: FailureCause) {
        let _ = cause;
    }
}

/// A `UiBridge` that only forwards [`SessionEvent`]s through a channel,
/// for hosts that prefer to poll/select on an `mpsc::Receiver` from their
/// own event loop instead of implementing callbacks directly (spec §9's
/// redesign of the source's ad-hoc string-tag queue into a typed enum;
/// grounded on `whitequark-rust-vnc`'s client-pushes-an-`Event`-enum
/// pattern).
pub struct ChannelBridge {
    tx: tokio::sync::mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelBridge {
    /// Creates a bridge and its paired receiver.
    #[must_use]
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UiBridge for ChannelBridge {
    fn present(&self, frame: FrameSnapshot) {
        let _ = self.tx.send(SessionEvent::FramePresented(frame));
    }

    fn on_bell(&self) {
        let _ = self.tx.send(SessionEvent::Bell);
    }

    fn on_clipboard(&self, text: String) {
        let _ = self.tx.send(SessionEvent::Clipboard(text));
    }

    fn session_ended(&self, cause: FailureCause) {
        let _ = self.tx.send(SessionEvent::Ended(cause));
    }
}

/// A live RFB session: the receive worker, the shared back buffer and
/// update budget, and the write-side handle the UI context uses to send
/// input and update requests.
pub struct Session {
    stop: Arc<AtomicBool>,
    back_buffer: Arc<StdMutex<BackBuffer>>,
    budget: Arc<UpdateBudget>,
    state: Arc<StdMutex<ConnectionState>>,
    geometry: (u16, u16),
    writer: Arc<TokioMutex<Transport<OwnedWriteHalf>>>,
    worker: Option<std::thread::JoinHandle<()>>,
    worker_done: Option<std::sync::mpsc::Receiver<()>>,
    timers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Connects to `addr`, runs the handshake, and starts the receive
    /// worker and pacing timers. Returns once the session has reached
    /// `Streaming` and the initial full update has been requested.
    ///
    /// # Errors
    ///
    /// Returns any `TransportError`/`ProtocolError`/`AuthError` the
    /// handshake raises (spec §4.B, §4.C). These surface synchronously,
    /// per spec §7: "Connect-phase errors surface synchronously to the
    /// caller."
    pub async fn connect(
        addr: SocketAddr,
        password: Option<String>,
        profile: QualityProfile,
        bridge: Arc<dyn UiBridge>,
    ) -> Result<Self> {
        let config = ClientConfig::new().with_quality_profile(profile);
        Self::connect_with_config(addr, password, config, bridge).await
    }

    /// Connects with an explicit [`ClientConfig`], for callers that need to
    /// override the connect timeouts or the `ClientInit` `shared` flag in
    /// addition to the quality profile (spec §3).
    ///
    /// # Errors
    ///
    /// See [`Session::connect`].
    pub async fn connect_with_config(
        addr: SocketAddr,
        password: Option<String>,
        config: ClientConfig,
        bridge: Arc<dyn UiBridge>,
    ) -> Result<Self> {
        let profile = config.quality_profile;
        let mut transport =
            Transport::connect(addr, config.connect_timeout, config.read_timeout).await?;
        let outcome = handshake::connect(&mut transport, password.as_deref(), config.shared).await?;

        let width = outcome.server_init.framebuffer_width;
        let height = outcome.server_init.framebuffer_height;
        let pixel_format = outcome.server_init.pixel_format;

        let (read_half, write_half) = transport.into_split();
        // Streaming reads may block indefinitely (spec §5): the liveness
        // timer, not a read timeout, is what recovers from a silent
        // server. A long-but-finite timeout still guards against a truly
        // wedged kernel-level read that never even errors.
        let read_transport = Transport::from_stream(read_half, Duration::from_secs(3600));

        let back_buffer = Arc::new(StdMutex::new(BackBuffer::new(width, height)));
        let budget = Arc::new(UpdateBudget::new(profile));
        let state = Arc::new(StdMutex::new(ConnectionState::Streaming));
        let writer = Arc::new(TokioMutex::new(Transport::from_stream(write_half, CONNECT_READ_TIMEOUT)));
        let stop = Arc::new(AtomicBool::new(false));

        let session = Self {
            stop: Arc::clone(&stop),
            back_buffer: Arc::clone(&back_buffer),
            budget: Arc::clone(&budget),
            state: Arc::clone(&state),
            geometry: (width, height),
            writer: Arc::clone(&writer),
            worker: None,
            worker_done: None,
            timers: Vec::new(),
        };

        // Initial full request, issued once after Init (spec §4.E).
        session.request_full().await?;

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker_stop = Arc::clone(&stop);
        let worker_back_buffer = Arc::clone(&back_buffer);
        let worker_budget = Arc::clone(&budget);
        let worker_state = Arc::clone(&state);
        let worker_bridge = Arc::clone(&bridge);
        let worker = std::thread::Builder::new()
            .name("rfb-receive-worker".into())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to start receive worker runtime");
                rt.block_on(receive_loop(
                    read_transport,
                    worker_back_buffer,
                    worker_budget,
                    worker_state,
                    worker_bridge,
                    worker_stop,
                    pixel_format,
                    (width, height),
                ));
                let _ = done_tx.send(());
            })
            .expect("failed to spawn receive worker thread");

        let mut session = session;
        session.worker = Some(worker);
        session.worker_done = Some(done_rx);
        session.timers = spawn_timers(
            Arc::clone(&budget),
            Arc::clone(&writer),
            Arc::clone(&stop),
            (width, height),
        );

        Ok(session)
    }

    /// Current framebuffer geometry, fixed for the session's lifetime
    /// (spec §3).
    #[must_use]
    pub fn geometry(&self) -> (u16, u16) {
        self.geometry
    }

    /// A copy of the back buffer's current RGB8 pixels.
    #[must_use]
    pub fn snapshot(&self) -> FrameSnapshot {
        let back = self.back_buffer.lock().unwrap();
        FrameSnapshot {
            width: back.width(),
            height: back.height(),
            pixels: back.snapshot(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Swaps the active quality profile at runtime.
    pub fn set_quality_profile(&self, profile: QualityProfile) {
        self.budget.set_quality_profile(profile);
    }

    /// A point-in-time snapshot of the Update Engine's pacing state, for a
    /// host UI to build its own status line (spec §2's supplemented
    /// status/diagnostics surface).
    #[must_use]
    pub fn session_health(&self) -> SessionHealth {
        let now = Instant::now();
        SessionHealth {
            pending_requests: self.budget.pending_requests(),
            time_since_last_response: self.budget.time_since_last_response(now),
            quality_profile: self.budget.quality_profile(),
        }
    }

    /// Pointer motion: rate-limited to `input::POINTER_MOTION_HZ` at the UI
    /// boundary by the caller. Motion never triggers an update request
    /// (spec §4.E: "Issued opportunistically...on pointer press/release or
    /// key press — not on mouse motion or key release").
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the write fails.
    pub async fn send_pointer_move(&self, x: u16, y: u16, button_mask: u8) -> Result<()> {
        self.write(&input::pointer_event(button_mask, x, y)).await
    }

    /// Pointer press or release: also opportunistically requests an
    /// incremental update, subject to the Update Engine's pacing (spec
    /// §4.E).
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the write fails.
    pub async fn send_pointer_button(&self, x: u16, y: u16, button_mask: u8) -> Result<()> {
        self.write(&input::pointer_event(button_mask, x, y)).await?;
        self.maybe_request_incremental().await
    }

    /// A wheel tick: encoded as a synthetic press/release pair, then
    /// opportunistically requests an incremental update (spec §4.F).
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if either write fails.
    pub async fn send_wheel(&self, scroll_up: bool, other_buttons: u8, x: u16, y: u16) -> Result<()> {
        for msg in input::wheel_event(scroll_up, other_buttons, x, y) {
            self.write(&msg).await?;
        }
        self.maybe_request_incremental().await
    }

    /// A key press or release. Only presses opportunistically request an
    /// incremental update (spec §4.E).
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the write fails.
    pub async fn send_key(&self, down: bool, keysym: u32) -> Result<()> {
        self.write(&input::key_event(down, keysym)).await?;
        if down {
            self.maybe_request_incremental().await?;
        }
        Ok(())
    }

    /// Emits a composite chord (e.g. Ctrl+Alt+Del, Alt+Tab) as explicit
    /// down/up steps spaced by `input::CHORD_STEP_DELAY` (spec §4.F).
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if any step's write fails.
    pub async fn send_chord(&self, steps: &[ChordStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.write(&input::key_event(step.down, step.keysym)).await?;
            if i + 1 < steps.len() {
                tokio::time::sleep(input::CHORD_STEP_DELAY).await;
            }
        }
        Ok(())
    }

    /// Tears the session down: stops the timers, shuts down the socket
    /// (unblocking the receive worker's pending read), and joins the
    /// worker within `DISCONNECT_JOIN_TIMEOUT` (spec §5).
    pub async fn disconnect(mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.timers.drain(..) {
            handle.abort();
        }
        {
            let writer = self.writer.lock().await;
            let _ = writer.shutdown_both();
        }
        if let Some(done_rx) = self.worker_done.take() {
            let _ = tokio::task::spawn_blocking(move || {
                let _ = done_rx.recv_timeout(DISCONNECT_JOIN_TIMEOUT);
            })
            .await;
        }
        self.worker = None;
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
    }

    async fn maybe_request_incremental(&self) -> Result<()> {
        let now = Instant::now();
        if self.budget.may_request(now) {
            self.send_request(true, now).await?;
        }
        // else: the event that would have triggered a request is dropped,
        // no queueing (spec §4.E rule 3).
        Ok(())
    }

    async fn request_full(&self) -> Result<()> {
        self.send_request(false, Instant::now()).await
    }

    async fn send_request(&self, incremental: bool, now: Instant) -> Result<()> {
        let (width, height) = self.geometry;
        let mut buf = BytesMut::with_capacity(10);
        protocol::write_framebuffer_update_request(&mut buf, incremental, 0, 0, width, height);
        self.write(&buf).await?;
        self.budget.record_request(now);
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await
    }
}

impl Drop for Session {
    /// A `Session` dropped without an explicit `disconnect()` still stops
    /// its timers and signals the receive worker to stop; it just can't
    /// `await` the socket shutdown or the worker join from `Drop`, so a
    /// caller that cares about a prompt, clean teardown should call
    /// `disconnect()` instead of letting the value fall out of scope.
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.timers.drain(..) {
            handle.abort();
        }
    }
}

fn spawn_timers(
    budget: Arc<UpdateBudget>,
    writer: Arc<TokioMutex<Transport<OwnedWriteHalf>>>,
    stop: Arc<AtomicBool>,
    geometry: (u16, u16),
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(continuous_update_timer(
            Arc::clone(&budget),
            Arc::clone(&writer),
            Arc::clone(&stop),
            geometry,
        )),
        tokio::spawn(forced_refresh_timer(
            Arc::clone(&budget),
            Arc::clone(&writer),
            Arc::clone(&stop),
            geometry,
        )),
        tokio::spawn(health_probe_timer(budget, writer, stop, geometry)),
    ]
}

/// Issues incremental requests at the quality profile's continuous
/// cadence, as long as the engine's pacing allows it (spec §4.E).
async fn continuous_update_timer(
    budget: Arc<UpdateBudget>,
    writer: Arc<TokioMutex<Transport<OwnedWriteHalf>>>,
    stop: Arc<AtomicBool>,
    geometry: (u16, u16),
) {
    while !stop.load(Ordering::Acquire) {
        let interval = budget.quality_profile().params().continuous_interval;
        tokio::time::sleep(interval).await;
        if stop.load(Ordering::Acquire) {
            break;
        }
        send_if_allowed(&budget, &writer, true, geometry).await;
    }
}

/// Issues full requests at the fixed `FORCED_REFRESH_INTERVAL` cadence,
/// independent of quality profile (spec §4.E item 5).
async fn forced_refresh_timer(
    budget: Arc<UpdateBudget>,
    writer: Arc<TokioMutex<Transport<OwnedWriteHalf>>>,
    stop: Arc<AtomicBool>,
    geometry: (u16, u16),
) {
    while !stop.load(Ordering::Acquire) {
        tokio::time::sleep(crate::engine::FORCED_REFRESH_INTERVAL).await;
        if stop.load(Ordering::Acquire) {
            break;
        }
        send_if_allowed(&budget, &writer, false, geometry).await;
    }
}

/// Polls `UpdateBudget::needs_health_probe` and emits one full request the
/// first time it trips, recovering from a server that silently drops an
/// incremental cycle (spec §4.E).
async fn health_probe_timer(
    budget: Arc<UpdateBudget>,
    writer: Arc<TokioMutex<Transport<OwnedWriteHalf>>>,
    stop: Arc<AtomicBool>,
    geometry: (u16, u16),
) {
    while !stop.load(Ordering::Acquire) {
        tokio::time::sleep(HEALTH_PROBE_POLL_INTERVAL).await;
        if stop.load(Ordering::Acquire) {
            break;
        }
        if budget.needs_health_probe(Instant::now()) {
            send_if_allowed(&budget, &writer, false, geometry).await;
        }
    }
}

async fn send_if_allowed(
    budget: &Arc<UpdateBudget>,
    writer: &Arc<TokioMutex<Transport<OwnedWriteHalf>>>,
    incremental: bool,
    (width, height): (u16, u16),
) {
    let now = Instant::now();
    if !budget.may_request(now) {
        return;
    }
    let mut buf = BytesMut::with_capacity(10);
    protocol::write_framebuffer_update_request(&mut buf, incremental, 0, 0, width, height);
    let mut writer = writer.lock().await;
    if writer.write_all(&buf).await.is_ok() {
        budget.record_request(now);
    }
}

/// The receive worker's body: blocks on Transport reads, decodes, and
/// applies every server message to shared state until the stream ends or
/// a protocol error terminates the session (spec §4.D, §4.E, §4.F, §7).
async fn receive_loop(
    mut transport: Transport<OwnedReadHalf>,
    back_buffer: Arc<StdMutex<BackBuffer>>,
    budget: Arc<UpdateBudget>,
    state: Arc<StdMutex<ConnectionState>>,
    bridge: Arc<dyn UiBridge>,
    stop: Arc<AtomicBool>,
    pixel_format: crate::protocol::PixelFormat,
    geometry: (u16, u16),
) {
    let cause = loop {
        if stop.load(Ordering::Acquire) {
            break FailureCause { error: None };
        }
        match read_one_message(&mut transport, &back_buffer, &budget, &pixel_format, &bridge, geometry).await {
            Ok(()) => {}
            Err(VncError::Transport(crate::error::TransportError::ConnectionClosed)) if stop.load(Ordering::Acquire) => {
                break FailureCause { error: None };
            }
            Err(e) => break FailureCause { error: Some(e) },
        }
    };

    *state.lock().unwrap() = ConnectionState::Draining;
    *state.lock().unwrap() = ConnectionState::Disconnected;
    bridge.session_ended(cause);
}

async fn read_one_message(
    transport: &mut Transport<OwnedReadHalf>,
    back_buffer: &Arc<StdMutex<BackBuffer>>,
    budget: &Arc<UpdateBudget>,
    pixel_format: &crate::protocol::PixelFormat,
    bridge: &Arc<dyn UiBridge>,
    (width, height): (u16, u16),
) -> Result<()> {
    let msg_type = transport.read_exact(1).await?[0];
    match msg_type {
        SERVER_MSG_FRAMEBUFFER_UPDATE => {
            // Decode off the wire first, with the back buffer unlocked, so
            // a concurrent Session::snapshot() caller never stalls behind
            // a slow or stalled server (spec §5). The lock is taken only
            // to apply the already-decoded rectangles and copy the result.
            let pending = crate::decoder::read_update(transport, width, height, pixel_format).await?;

            let mut back = back_buffer.lock().unwrap();
            crate::decoder::apply_update(&mut back, &pending)?;
            let snapshot = FrameSnapshot {
                width: back.width(),
                height: back.height(),
                pixels: back.snapshot(),
            };
            drop(back);

            budget.record_response(Instant::now());
            bridge.present(snapshot);
            Ok(())
        }
        SERVER_MSG_SET_COLOUR_MAP_ENTRIES => {
            let mut header = transport.read_exact(5).await?;
            header.advance(1); // padding
            header.advance(2); // first colour
            let n = header.get_u16();
            if n > 0 {
                let _ = transport.read_exact(usize::from(n) * 6).await?;
            }
            Ok(())
        }
        SERVER_MSG_BELL => {
            bridge.on_bell();
            Ok(())
        }
        SERVER_MSG_SERVER_CUT_TEXT => {
            let mut header = transport.read_exact(7).await?;
            header.advance(3); // padding
            let len = header.get_u32() as usize;
            let text_bytes = if len == 0 {
                Vec::new()
            } else {
                transport.read_exact(len).await?.to_vec()
            };
            // Latin-1: every byte maps 1:1 to the Unicode code point of
            // the same value (spec §4.F).
            let text: String = text_bytes.iter().map(|&b| b as char).collect();
            bridge.on_clipboard(text);
            Ok(())
        }
        unknown => {
            log::warn!("unknown server message type {unknown}; stream alignment cannot be trusted");
            Err(VncError::Protocol(ProtocolError::UnalignedStream(unknown)))
        }
    }
}
