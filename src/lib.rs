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

//! # rfb-client
//!
//! A pure Rust implementation of an RFB (Remote Framebuffer, a.k.a. VNC)
//! **client** core: version negotiation, authentication, session
//! initialization, a continuous framebuffer-update loop with pixel
//! decoding, and bidirectional pointer/keyboard event transport.
//!
//! This crate is the embeddable engine behind a VNC viewer; it owns no
//! widgets and draws nothing itself. A host application supplies a
//! [`session::UiBridge`] to receive decoded frames and forward input.
//!
//! ## Features
//!
//! - **RFB 3.8 only**: version negotiation with no fallback to older
//!   minor versions.
//! - **VNC Authentication**: DES-ECB challenge-response, plus `None` for
//!   servers configured without a password.
//! - **Raw, CopyRect, and optional RRE decoding**: the minimal,
//!   maximally compatible encoding set (richer encodings are a
//!   server-side concern this client does not need to decode).
//! - **Paced update requests**: three quality profiles trade latency for
//!   bandwidth, backed by a pending-request budget, a continuous-update
//!   timer, a forced-refresh timer, and a liveness health probe.
//! - **A dedicated receive worker**: reads and decodes run on their own
//!   OS thread so a host UI loop is never blocked on socket I/O.
//!
//! ## Quick start
//!
//! ```no_run
//! use rfb_client::{QualityProfile, Session};
//! use rfb_client::events::FrameSnapshot;
//! use rfb_client::session::UiBridge;
//! use std::sync::Arc;
//!
//! struct PrintBridge;
//! impl UiBridge for PrintBridge {
//!     fn present(&self, frame: FrameSnapshot) {
//!         println!("frame: {}x{}", frame.width, frame.height);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = "127.0.0.1:5900".parse()?;
//!     let session = Session::connect(
//!         addr,
//!         Some("secret".to_string()),
//!         QualityProfile::Balanced,
//!         Arc::new(PrintBridge),
//!     )
//!     .await?;
//!
//!     session.send_key(true, rfb_client::input::keysym::RETURN).await?;
//!     session.send_key(false, rfb_client::input::keysym::RETURN).await?;
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Host application                │
//! │  • implements UiBridge (present/bell/clipboard)  │
//! │  • drives send_pointer_*/send_key/send_wheel     │
//! └────────────────────────┬─────────────────────────┘
//!                          │
//!                          ▼
//! ┌───────────────────────────────────────────────┐
//! │                     Session                      │
//! │  owns: UpdateBudget, BackBuffer (mutex-guarded)  │
//! └────────┬──────────────────────────┬───────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌────────────────┐         ┌────────────────────┐
//! │ Receive worker  │         │ UI-context writer   │
//! │ (OS thread)     │         │ lock + timers        │
//! │ reads, decodes  │         │ pointer/key/request  │
//! └────────┬────────┘         └────────────────────┘
//!          │
//!          ▼
//! ┌───────────────────────────────────────────────┐
//! │          BackBuffer (owned RGB8 image)           │
//! └───────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod decoder;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod events;
pub mod handshake;
pub mod input;
pub mod presenter;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports: the common entry points a host application needs.
pub use decoder::BackBuffer;
pub use engine::{ConnectionState, FailureCause, QualityProfile};
pub use error::{Result, VncError};
pub use events::{FrameSnapshot, SessionEvent};
pub use presenter::Scale;
pub use protocol::PixelFormat;
pub use session::{ChannelBridge, ClientConfig, Session, SessionHealth, UiBridge};

/// The RFB protocol version string this client speaks (spec §4.B).
pub const PROTOCOL_VERSION: &str = protocol::PROTOCOL_VERSION;

/// Default VNC port.
pub const DEFAULT_PORT: u16 = 5900;
