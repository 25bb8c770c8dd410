//! Headless RFB (VNC) client example.
//!
//! Connects to a VNC server, prints a line every time a frame is decoded,
//! forwards the bell and clipboard notifications to stdout, and exits
//! after a fixed run time.
//!
//! Usage:
//!   cargo run --example headless_viewer -- 127.0.0.1:5900 [password]

use rfb_client::events::FrameSnapshot;
use rfb_client::session::UiBridge;
use rfb_client::{QualityProfile, Session};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct LoggingBridge {
    frames_seen: AtomicU64,
}

impl UiBridge for LoggingBridge {
    fn present(&self, frame: FrameSnapshot) {
        let n = self.frames_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 10 == 0 || n == 1 {
            println!("frame {n}: {}x{}", frame.width, frame.height);
        }
    }

    fn on_bell(&self) {
        println!("(bell)");
    }

    fn on_clipboard(&self, text: String) {
        println!("clipboard: {text:?}");
    }

    fn session_ended(&self, cause: rfb_client::FailureCause) {
        match cause.error {
            Some(e) => println!("session ended: {e}"),
            None => println!("session ended cleanly"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let addr_str = args.next().unwrap_or_else(|| "127.0.0.1:5900".to_string());
    let password = args.next();

    println!("Connecting to {addr_str}...");
    let addr = addr_str.parse()?;

    let bridge = Arc::new(LoggingBridge { frames_seen: AtomicU64::new(0) });
    let session = Session::connect(addr, password, QualityProfile::Balanced, bridge).await?;

    let (width, height) = session.geometry();
    println!("Connected: {width}x{height}, state={:?}", session.state());

    // Demonstrate input: nudge the pointer and tap Enter a couple of times.
    session.send_pointer_move(10, 10, 0).await?;
    session.send_pointer_button(10, 10, rfb_client::input::button::LEFT).await?;
    session.send_pointer_button(10, 10, 0).await?;
    session
        .send_key(true, rfb_client::input::keysym::from_ascii('A').unwrap())
        .await?;
    session
        .send_key(false, rfb_client::input::keysym::from_ascii('A').unwrap())
        .await?;

    println!("Streaming for 10 seconds. Press Ctrl+C to stop early.");
    tokio::time::sleep(Duration::from_secs(10)).await;

    session.disconnect().await;
    println!("Disconnected.");
    Ok(())
}
