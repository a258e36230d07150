// src/pipeline/latest.rs
//
// Bounded most-recent-wins channel: a full queue drops its oldest entry
// instead of blocking the producer, trading completeness for bounded
// latency.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::trace;

pub struct LatestSender<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

pub fn latest_channel<T>(capacity: usize) -> (LatestSender<T>, Receiver<T>) {
    let (tx, rx) = bounded(capacity);
    (
        LatestSender {
            tx,
            rx: rx.clone(),
        },
        rx,
    )
}

impl<T> LatestSender<T> {
    /// Never blocks. On a full queue the oldest entry is discarded to make
    /// room; the send only fails if the consumer side is gone.
    pub fn send(&self, mut item: T) -> bool {
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if self.rx.try_recv().is_ok() {
                        trace!("latest queue full, dropped oldest");
                    }
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}
