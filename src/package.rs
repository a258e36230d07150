// src/package.rs
//
// Groups the tracker's running count into discrete packages, gated by
// actuator presence. The actuator marker is debounced, the count is
// corrected for rods that crossed the counter line but have not yet
// physically reached the actuator, and a package boundary hard-resets the
// tracker so its state never spans two packages.

use crate::positions::actuator_detected;
use crate::tracker::Tracker;
use crate::types::{ActuatorConfig, CounterConfig, PackageRecord, Rod};
use tracing::{debug, info};

pub struct PackageCoordinator {
    /// Consecutive cycles the actuator has been seen.
    seen_streak: u32,
    /// One package per actuator activation: set on closure, cleared when
    /// the actuator disappears.
    latched: bool,
    packages: PackageRecord,
}

impl PackageCoordinator {
    pub fn new() -> Self {
        Self {
            seen_streak: 0,
            latched: false,
            packages: PackageRecord::new(),
        }
    }

    /// Completed package sizes, oldest first.
    pub fn packages(&self) -> &[u32] {
        &self.packages
    }

    /// One coordination cycle. Returns the size of a package closed this
    /// cycle, if any.
    ///
    /// `prev_rods` is the rod snapshot from the frame before the one just
    /// processed; overshoot is judged against those positions, not the
    /// current ones.
    pub fn update(
        &mut self,
        actuator_pos: (f32, f32),
        prev_rods: &[Rod],
        tracker: &mut Tracker,
        counter: &CounterConfig,
        cfg: &ActuatorConfig,
    ) -> Option<u32> {
        if !actuator_detected(actuator_pos) {
            self.seen_streak = 0;
            self.latched = false;
            return None;
        }

        self.seen_streak += 1;
        if self.seen_streak < cfg.debounce_frames {
            debug!(streak = self.seen_streak, "actuator pending debounce");
            return None;
        }
        if self.latched || tracker.rod_count() == 0 {
            return None;
        }

        // Rods past the counter line but short of the actuator were already
        // credited to rod_count yet belong to the next package.
        let overshoot = prev_rods
            .iter()
            .filter(|r| counter.counter_line < r.pos_x && r.pos_x <= actuator_pos.0)
            .count() as u32;
        let size = tracker.rod_count().saturating_sub(overshoot);

        self.packages.push(size);
        self.latched = true;
        info!(
            package = self.packages.len(),
            size,
            overshoot,
            "package closed"
        );

        tracker.reset();
        Some(size)
    }
}

impl Default for PackageCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
