// src/pipeline/flow_state.rs
//
// Process-wide shared state between pipeline stages. Single writer per
// field (capture writes the frame fields, the direction reader writes the
// direction fields); readers tolerate a stale value by at most one cycle.
// Everything goes through the mutex; no implicit ordering is assumed.

use crate::types::Direction;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug)]
struct FlowState {
    latest_frame_stamp_ms: f64,
    direction: Direction,
    direction_updated: Option<Instant>,
    /// Monotonically increasing count of valid direction samples.
    samples: u64,
}

#[derive(Clone)]
pub struct SharedFlow {
    inner: Arc<Mutex<FlowState>>,
}

impl SharedFlow {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FlowState {
                latest_frame_stamp_ms: f64::NEG_INFINITY,
                direction: Direction::Forward,
                direction_updated: None,
                samples: 0,
            })),
        }
    }

    pub fn publish_frame_stamp(&self, timestamp_ms: f64) {
        let mut state = self.inner.lock().unwrap();
        state.latest_frame_stamp_ms = timestamp_ms;
    }

    pub fn latest_frame_stamp(&self) -> f64 {
        self.inner.lock().unwrap().latest_frame_stamp_ms
    }

    pub fn publish_direction(&self, direction: Direction) {
        let mut state = self.inner.lock().unwrap();
        state.direction = direction;
        state.direction_updated = Some(Instant::now());
        state.samples += 1;
    }

    pub fn direction(&self) -> Direction {
        self.inner.lock().unwrap().direction
    }

    pub fn direction_samples(&self) -> u64 {
        self.inner.lock().unwrap().samples
    }

    /// Age of the last valid direction sample, if any arrived yet.
    pub fn direction_age(&self) -> Option<std::time::Duration> {
        self.inner
            .lock()
            .unwrap()
            .direction_updated
            .map(|at| at.elapsed())
    }
}

impl Default for SharedFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_defaults_to_forward_until_a_sample_arrives() {
        let flow = SharedFlow::new();
        assert_eq!(flow.direction(), Direction::Forward);
        assert_eq!(flow.direction_samples(), 0);
        assert!(flow.direction_age().is_none());
    }

    #[test]
    fn samples_increase_monotonically() {
        let flow = SharedFlow::new();
        flow.publish_direction(Direction::Stopped);
        flow.publish_direction(Direction::Reverse);
        assert_eq!(flow.direction(), Direction::Reverse);
        assert_eq!(flow.direction_samples(), 2);
        assert!(flow.direction_age().is_some());
    }
}
