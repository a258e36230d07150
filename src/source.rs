// src/source.rs
//
// Frame source seam. Only the retry/backoff contract is in scope here; the
// actual decoder (file, RTSP, device) lives behind the trait.

use crate::types::Frame;
use anyhow::Result;
use std::time::Duration;

pub trait FrameSource: Send {
    /// (Re)establish the connection. Called once at startup and again
    /// after every read failure.
    fn connect(&mut self) -> Result<()>;

    /// Next frame. `Ok(None)` is a clean end of stream; `Err` is a source
    /// failure and triggers reconnect-with-backoff.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Reconnect backoff: 2 s after the first failure, 5 s after every
/// consecutive one, reset on success.
pub struct Backoff {
    failures: u32,
}

pub const FIRST_RETRY: Duration = Duration::from_secs(2);
pub const LATER_RETRY: Duration = Duration::from_secs(5);

impl Backoff {
    pub fn new() -> Self {
        Self { failures: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.failures += 1;
        if self.failures == 1 {
            FIRST_RETRY
        } else {
            LATER_RETRY
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
