//! Network-distributed execution
//!
//! A [`ServerExecutor`] owns the work queue and a TCP listener; any number
//! of [`ClientExecutor`]s connect, drain the queue, and send results back.
//! Both sides resolve work items against their own registry, so the
//! handshake compares catalogue digests and refuses clients whose registry
//! differs from the server's.

mod client;
mod framing;
mod protocol;
mod server;

pub use client::ClientExecutor;
pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_SIZE};
pub use protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
pub use server::ServerExecutor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often a blocked executor looks at the interrupt flag
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Resolves once `flag` is set
async fn interrupted(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}
