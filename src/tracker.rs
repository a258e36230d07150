// src/tracker.rs
//
// Core per-frame tracking state machine. Maintains persistent rod
// identities across frames, associates detections to prior identities with
// movement heuristics, detects counter-line crossings and keeps the running
// count. Intentionally a narrow zone-aware heuristic tracker for mostly
// unidirectional motion on a bounded track, not a general MOT solution.

use crate::types::{CounterConfig, Direction, Rod, TrackerConfig};
use crate::zones::{self, Zones};
use std::collections::HashSet;
use tracing::debug;

/// First id issued after startup or a package reset.
pub const INITIAL_TRACK_ID: i32 = 1;

/// Which association strategy a cycle selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Displacement-gated first-fit scan.
    Standard,
    /// Positional one-to-one pairing for queued/stalled clusters, where
    /// motion gating would mis-associate.
    Simplified,
}

/// A previous track carried into one association cycle.
#[derive(Debug, Clone, Copy)]
struct PrevTrack {
    id: i32,
    rod: Rod,
}

/// A track that survived association, with enough history for the
/// crossing check.
#[derive(Debug, Clone, Copy)]
struct Survivor {
    id: i32,
    prev_x: f32,
    /// Index into the current rod list; None when a stalled track kept its
    /// previous position (simplified strategy with a short pool).
    cur_idx: Option<usize>,
    rod: Rod,
}

pub struct Tracker {
    next_track_id: i32,
    /// Insertion-ordered: oldest (lowest id) first. Never a map, since
    /// several heuristics depend on this order explicitly.
    table: Vec<(i32, Rod)>,
    /// Ids already credited to the running count.
    counted: HashSet<i32>,
    prev_rods: Vec<Rod>,
    rod_count: u32,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            next_track_id: INITIAL_TRACK_ID,
            table: Vec::new(),
            counted: HashSet::new(),
            prev_rods: Vec::new(),
            rod_count: 0,
        }
    }

    pub fn rod_count(&self) -> u32 {
        self.rod_count
    }

    pub fn tracks(&self) -> &[(i32, Rod)] {
        &self.table
    }

    /// Cached rod list from the last processed frame (all zones, with
    /// assigned ids where the rod is tracked).
    pub fn prev_rods(&self) -> &[Rod] {
        &self.prev_rods
    }

    #[cfg(test)]
    fn counted_ids(&self) -> &HashSet<i32> {
        &self.counted
    }

    /// Hard reset at a package boundary. Tracker state never spans two
    /// packages.
    pub fn reset(&mut self) {
        self.next_track_id = INITIAL_TRACK_ID;
        self.table.clear();
        self.counted.clear();
        self.rod_count = 0;
    }

    /// Run one tracking cycle over the current frame's rods.
    ///
    /// `current` is expected pre-sorted by x descending (the upstream
    /// convention); identities are refreshed in place on the cached copy.
    /// Reverse direction deliberately runs the same path as Forward; the
    /// line protocol reports it but no deployment has needed mirrored
    /// association yet.
    pub fn process(
        &mut self,
        current: &[Rod],
        direction: Direction,
        counter: &CounterConfig,
        cfg: &TrackerConfig,
    ) {
        if direction == Direction::Stopped {
            // Frozen: no association, but the frame still becomes "previous".
            self.prev_rods = current.to_vec();
            return;
        }

        let mut cur: Vec<Rod> = current.to_vec();
        for rod in &mut cur {
            rod.track_id = -1;
        }

        let cur_zones = zones::classify(&cur, counter.counter_init, counter.counter_end);
        let prev_zones = zones::classify(&self.prev_rods, counter.counter_init, counter.counter_end);

        if self.table.is_empty() {
            self.bootstrap(&mut cur, counter);
            self.prev_rods = cur;
            return;
        }

        self.steady_update(&mut cur, &cur_zones, &prev_zones, counter, cfg);
        self.prev_rods = cur;
    }

    /// Empty table: every rod currently in the tracking zone gets a fresh
    /// ascending id, in input order.
    fn bootstrap(&mut self, cur: &mut [Rod], counter: &CounterConfig) {
        for rod in cur.iter_mut() {
            if rod.pos_x >= counter.counter_init && rod.pos_x <= counter.counter_end {
                rod.track_id = self.next_track_id;
                self.table.push((self.next_track_id, *rod));
                self.next_track_id += 1;
            }
        }
        debug!(tracks = self.table.len(), "tracker bootstrap");
    }

    fn steady_update(
        &mut self,
        cur: &mut Vec<Rod>,
        cur_zones: &Zones,
        prev_zones: &Zones,
        counter: &CounterConfig,
        cfg: &TrackerConfig,
    ) {
        let end_delta = cur_zones.end.len() as i32 - prev_zones.end.len() as i32;

        // FIFO eviction: a single new arrival in the end zone retires the
        // oldest identity. Strict equality: noisy deltas (0, >=2,
        // negative) leave the table alone.
        if end_delta == 1 {
            if let Some(pos) = self
                .table
                .iter()
                .enumerate()
                .min_by_key(|(_, (id, _))| *id)
                .map(|(pos, _)| pos)
            {
                let (evicted, _) = self.table.remove(pos);
                debug!(id = evicted, "evicted oldest track into end zone");
            }
        }

        // Candidate pool: indices into `cur` for tracking-zone rods, input
        // order preserved.
        let mut pool: Vec<usize> = cur
            .iter()
            .enumerate()
            .filter(|(_, r)| r.pos_x >= counter.counter_init && r.pos_x <= counter.counter_end)
            .map(|(i, _)| i)
            .collect();

        let mut prev_tracks: Vec<PrevTrack> = self
            .table
            .iter()
            .map(|&(id, rod)| PrevTrack { id, rod })
            .collect();

        let strategy = self.select_strategy(
            &mut prev_tracks,
            &mut pool,
            cur,
            cur_zones,
            prev_zones,
            end_delta,
            counter,
            cfg,
        );

        // Entry handling: exactly one rod left the init zone, so the
        // leftmost candidate must be that newcomer. Assign it a brand-new
        // id up front so it cannot steal an existing id positionally.
        let mut new_tracks: Vec<(i32, Rod)> = Vec::new();
        let init_left = prev_zones.init.len() as i32 - cur_zones.init.len() as i32;
        if init_left == 1 {
            if let Some(k) = pool
                .iter()
                .enumerate()
                .min_by(|(_, &a), (_, &b)| {
                    cur[a]
                        .pos_x
                        .partial_cmp(&cur[b].pos_x)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(k, _)| k)
            {
                let idx = pool.remove(k);
                cur[idx].track_id = self.next_track_id;
                new_tracks.push((self.next_track_id, cur[idx]));
                debug!(id = self.next_track_id, x = cur[idx].pos_x, "new entry from init zone");
                self.next_track_id += 1;
            }
        }

        let mut survivors: Vec<Survivor> = Vec::new();
        match strategy {
            Strategy::Standard => {
                for prev in &prev_tracks {
                    let hit = pool
                        .iter()
                        .position(|&idx| cur[idx].pos_x - prev.rod.pos_x >= cfg.displacement);
                    match hit {
                        Some(k) => {
                            let idx = pool.remove(k);
                            cur[idx].track_id = prev.id;
                            survivors.push(Survivor {
                                id: prev.id,
                                prev_x: prev.rod.pos_x,
                                cur_idx: Some(idx),
                                rod: cur[idx],
                            });
                        }
                        None => {
                            debug!(id = prev.id, "track lost");
                        }
                    }
                }
            }
            Strategy::Simplified => {
                // Queued/stalled cluster: pair purely positionally, no
                // motion gate. Tracks beyond the pool keep their previous
                // position.
                for prev in &prev_tracks {
                    if pool.is_empty() {
                        survivors.push(Survivor {
                            id: prev.id,
                            prev_x: prev.rod.pos_x,
                            cur_idx: None,
                            rod: prev.rod,
                        });
                        continue;
                    }
                    let idx = pool.remove(0);
                    cur[idx].track_id = prev.id;
                    survivors.push(Survivor {
                        id: prev.id,
                        prev_x: prev.rod.pos_x,
                        cur_idx: Some(idx),
                        rod: cur[idx],
                    });
                }
            }
        }

        // Leftover candidates are genuinely new.
        for &idx in &pool {
            cur[idx].track_id = self.next_track_id;
            new_tracks.push((self.next_track_id, cur[idx]));
            self.next_track_id += 1;
        }

        // Rebuild the table oldest-first and renumber to a contiguous run
        // ending at the current maximum, so downstream display/counting
        // logic always sees dense ids.
        let mut entries: Vec<Survivor> = survivors;
        for &(id, rod) in &new_tracks {
            entries.push(Survivor {
                id,
                prev_x: f32::NAN,
                cur_idx: None,
                rod,
            });
        }
        entries.sort_by_key(|e| e.id);
        self.remap(&mut entries, cur);

        self.table = entries.iter().map(|e| (e.id, e.rod)).collect();

        // Crossing/counting: credit each id at most once, on the cycle its
        // position moves past the counter line.
        for entry in &entries {
            if entry.prev_x.is_nan() {
                continue; // no prior position
            }
            if entry.prev_x <= counter.counter_line
                && counter.counter_line < entry.rod.pos_x
                && self.counted.insert(entry.id)
            {
                self.rod_count += 1;
                debug!(id = entry.id, count = self.rod_count, "rod crossed counter line");
            }
        }
    }

    /// Pick iteration order and matching strategy from how the zone
    /// populations shifted since the previous frame.
    #[allow(clippy::too_many_arguments)]
    fn select_strategy(
        &self,
        prev_tracks: &mut Vec<PrevTrack>,
        pool: &mut Vec<usize>,
        cur: &[Rod],
        cur_zones: &Zones,
        prev_zones: &Zones,
        end_delta: i32,
        counter: &CounterConfig,
        cfg: &TrackerConfig,
    ) -> Strategy {
        let t_cur = cur_zones.tracking.len();
        let t_prev = prev_zones.tracking.len();

        if t_cur < t_prev {
            prev_tracks.sort_by(|a, b| b.id.cmp(&a.id));
            pool.reverse();
            return Strategy::Standard;
        }

        if t_cur > t_prev {
            // A net-zero shuffle with the end zone means the "extra" rods
            // are the same physical rods straddling counter_end, not new
            // detections. Drop up to that many boundary-adjacent candidates.
            let gained = (t_cur - t_prev) as i32;
            if end_delta == -gained {
                let mut to_drop = gained;
                pool.retain(|&idx| {
                    if to_drop > 0
                        && (cur[idx].pos_x - counter.counter_end).abs() <= cfg.boundary_tolerance
                    {
                        to_drop -= 1;
                        debug!(x = cur[idx].pos_x, "dropped boundary-straddling candidate");
                        false
                    } else {
                        true
                    }
                });
            }
            return Strategy::Standard;
        }

        // Unchanged count: check whether the whole tracking cluster is
        // effectively queued against a stalled end zone.
        let mean_tracking = mean_displacement(&cur_zones.tracking, &prev_zones.tracking);
        let end_is_stopped = if end_delta < 0 {
            true
        } else if end_delta == 0 {
            mean_displacement(&cur_zones.end, &prev_zones.end).abs() < cfg.boundary_tolerance
        } else {
            false
        };

        if mean_tracking >= cfg.displacement && end_is_stopped {
            prev_tracks.sort_by(|a, b| b.id.cmp(&a.id));
            pool.reverse();
            debug!(mean_tracking, "switching to simplified positional association");
            return Strategy::Simplified;
        }

        Strategy::Standard
    }

    /// Renumber surviving ids into a contiguous run ending at the current
    /// maximum, preserving relative order. `entries` must be sorted
    /// ascending by id.
    fn remap(&mut self, entries: &mut [Survivor], cur: &mut [Rod]) {
        let Some(max_id) = entries.last().map(|e| e.id) else {
            return;
        };
        let n = entries.len() as i32;
        let contiguous = entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.id == max_id - n + 1 + i as i32);

        if !contiguous {
            for (i, entry) in entries.iter_mut().enumerate() {
                let new_id = max_id - n + 1 + i as i32;
                if entry.id != new_id {
                    debug!(old = entry.id, new = new_id, "remapped track id");
                    if let Some(idx) = entry.cur_idx {
                        cur[idx].track_id = new_id;
                    }
                    entry.id = new_id;
                    entry.rod.track_id = new_id;
                }
            }
        }

        if self.next_track_id <= max_id {
            self.next_track_id = max_id + 1;
        }
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean pairwise x-displacement between two positionally-aligned rod lists.
/// Empty zip means "no movement observed" and reports 0.
fn mean_displacement(cur: &[Rod], prev: &[Rod]) -> f32 {
    let diffs: Vec<f32> = cur
        .iter()
        .zip(prev.iter())
        .map(|(a, b)| a.pos_x - b.pos_x)
        .collect();
    if diffs.is_empty() {
        0.0
    } else {
        diffs.iter().sum::<f32>() / diffs.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CounterConfig, TrackerConfig};

    fn counter() -> CounterConfig {
        CounterConfig {
            counter_init: 100.0,
            counter_end: 500.0,
            counter_line: 300.0,
        }
    }

    fn cfg() -> TrackerConfig {
        TrackerConfig {
            min_confidence: 0.8,
            displacement: -15.0,
            boundary_tolerance: 15.0,
        }
    }

    /// Rods come in pre-sorted by x descending, the upstream convention.
    fn frame(xs: &[f32]) -> Vec<Rod> {
        let mut rods: Vec<Rod> = xs.iter().map(|&x| Rod::unassigned(x, 50.0)).collect();
        rods.sort_by(|a, b| b.pos_x.partial_cmp(&a.pos_x).unwrap());
        rods
    }

    fn ids(tracker: &Tracker) -> Vec<i32> {
        tracker.tracks().iter().map(|&(id, _)| id).collect()
    }

    #[test]
    fn bootstrap_assigns_sequential_ids_in_input_order() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0, 250.0]), Direction::Forward, &counter(), &cfg());

        assert_eq!(ids(&t), vec![1, 2, 3]);
        // Input order is descending x, so the furthest-along rod holds id 1.
        assert_eq!(t.tracks()[0].1.pos_x, 450.0);
        assert_eq!(t.rod_count(), 0);
    }

    #[test]
    fn bootstrap_skips_init_and_end_zones() {
        let mut t = Tracker::new();
        t.process(&frame(&[550.0, 450.0, 50.0]), Direction::Forward, &counter(), &cfg());

        assert_eq!(ids(&t), vec![1]);
        // Unassigned rods still land in the previous-frame cache.
        assert_eq!(t.prev_rods().len(), 3);
    }

    #[test]
    fn stopped_freezes_everything_except_previous_cache() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0]), Direction::Forward, &counter(), &cfg());
        let table_before = t.tracks().to_vec();

        t.process(&frame(&[480.0, 380.0]), Direction::Stopped, &counter(), &cfg());

        assert_eq!(t.tracks(), table_before.as_slice());
        assert_eq!(t.rod_count(), 0);
        assert!(t.counted_ids().is_empty());
        // The cache did advance.
        assert_eq!(t.prev_rods()[0].pos_x, 480.0);
    }

    #[test]
    fn crossing_increments_count_exactly_once() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0, 250.0]), Direction::Forward, &counter(), &cfg());
        // 450 -> 510 (end), 350 -> 410, 250 -> 310 crosses the line at 300.
        t.process(&frame(&[510.0, 410.0, 310.0]), Direction::Forward, &counter(), &cfg());

        assert_eq!(t.rod_count(), 1);

        // Re-evaluating an already-counted id must not double count.
        t.process(&frame(&[520.0, 420.0, 320.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(t.rod_count(), 1);
    }

    #[test]
    fn crossing_boundary_pair_counts_once() {
        let mut t = Tracker::new();
        t.process(&frame(&[299.0]), Direction::Forward, &counter(), &cfg());
        t.process(&frame(&[301.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(t.rod_count(), 1);

        // Same position again: prev.x = 301 > line, no second credit.
        t.process(&frame(&[301.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(t.rod_count(), 1);
    }

    #[test]
    fn fifo_eviction_fires_only_on_end_delta_one() {
        // end_delta == 1 evicts exactly the oldest id.
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0]), Direction::Forward, &counter(), &cfg());
        t.process(&frame(&[560.0, 440.0, 340.0]), Direction::Forward, &counter(), &cfg());
        // id 1 evicted; id 2 re-associates to 440; 340 gets a fresh id.
        assert_eq!(ids(&t), vec![2, 3]);
    }

    #[test]
    fn end_delta_two_does_not_evict() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0]), Direction::Forward, &counter(), &cfg());
        // Two rods appear in the end zone at once (noisy delta): no eviction,
        // both tracked ids survive via association.
        t.process(&frame(&[560.0, 520.0, 440.0, 340.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1, 2]);
        assert_eq!(t.tracks()[0].1.pos_x, 440.0);
        assert_eq!(t.tracks()[1].1.pos_x, 340.0);
    }

    #[test]
    fn lost_track_triggers_contiguous_remap() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0, 250.0]), Direction::Forward, &counter(), &cfg());

        // id 2's only candidates moved too far backward: it is lost, and a
        // leftover candidate gains a fresh id. Survivor ids {1, 3, 4} get
        // renumbered to a contiguous run ending at the maximum.
        t.process(&frame(&[460.0, 240.0, 230.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![2, 3, 4]);

        // The run always ends at the current maximum.
        let max = *ids(&t).iter().max().unwrap();
        let n = ids(&t).len() as i32;
        assert_eq!(ids(&t), ((max - n + 1)..=max).collect::<Vec<_>>());
    }

    #[test]
    fn single_init_departure_gets_fresh_id() {
        let mut t = Tracker::new();
        // One tracked rod plus one still in the init zone.
        t.process(&frame(&[450.0, 90.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1]);

        // The init rod crosses into tracking: it must get a brand-new id,
        // not inherit id 1 through positional luck.
        t.process(&frame(&[460.0, 120.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1, 2]);
        let newcomer = t.tracks().iter().find(|&&(id, _)| id == 2).unwrap();
        assert_eq!(newcomer.1.pos_x, 120.0);
    }

    #[test]
    fn boundary_straddler_is_not_a_new_detection() {
        let mut t = Tracker::new();
        // 510 sits in the end zone (unassigned), 450 is tracked as id 1.
        t.process(&frame(&[510.0, 450.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1]);

        // The end-zone rod wobbles back to 495: tracking count +1, end
        // count -1, net zero. The boundary-adjacent 495 is dropped from the
        // pool instead of being issued an id.
        t.process(&frame(&[495.0, 460.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1]);
        assert_eq!(t.tracks()[0].1.pos_x, 460.0);
    }

    #[test]
    fn stalled_cluster_uses_positional_pairing() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 350.0]), Direction::Forward, &counter(), &cfg());

        // Small forward creep, empty end zone: simplified strategy pairs
        // descending ids against the reversed (ascending-x) list.
        t.process(&frame(&[455.0, 355.0]), Direction::Forward, &counter(), &cfg());
        let table = t.tracks();
        assert_eq!(table.iter().find(|&&(id, _)| id == 1).unwrap().1.pos_x, 455.0);
        assert_eq!(table.iter().find(|&&(id, _)| id == 2).unwrap().1.pos_x, 355.0);
    }

    #[test]
    fn simplified_carry_over_keeps_previous_position_when_pool_runs_short() {
        let mut t = Tracker::new();
        // Two tracked rods plus one still in the init zone.
        t.process(&frame(&[250.0, 150.0, 95.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1, 2]);

        // Next frame: the init rod enters tracking (fresh id, consuming one
        // candidate) while id 1's rod goes undetected. Mean displacement
        // stays above the gate and the end zone is empty, so the simplified
        // strategy runs with fewer candidates than surviving tracks: the
        // track beyond the pool keeps its previous position.
        t.process(&frame(&[255.0, 130.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![1, 2, 3]);

        let table = t.tracks();
        let pos = |id: i32| table.iter().find(|&&(i, _)| i == id).unwrap().1.pos_x;
        assert_eq!(pos(2), 255.0); // paired positionally
        assert_eq!(pos(3), 130.0); // newcomer from the init zone
        assert_eq!(pos(1), 250.0); // carried over, unchanged
        assert_eq!(t.rod_count(), 0);
    }

    #[test]
    fn reverse_direction_runs_forward_logic() {
        // Reverse is NOT mirrored; it reuses the forward association and
        // counting path unmodified. This test documents that choice.
        let mut fwd = Tracker::new();
        fwd.process(&frame(&[450.0, 250.0]), Direction::Forward, &counter(), &cfg());
        fwd.process(&frame(&[460.0, 310.0]), Direction::Forward, &counter(), &cfg());

        let mut rev = Tracker::new();
        rev.process(&frame(&[450.0, 250.0]), Direction::Reverse, &counter(), &cfg());
        rev.process(&frame(&[460.0, 310.0]), Direction::Reverse, &counter(), &cfg());

        assert_eq!(ids(&fwd), ids(&rev));
        assert_eq!(fwd.rod_count(), rev.rod_count());
        assert_eq!(rev.rod_count(), 1);
    }

    #[test]
    fn reset_clears_state_and_id_counter() {
        let mut t = Tracker::new();
        t.process(&frame(&[450.0, 250.0]), Direction::Forward, &counter(), &cfg());
        t.process(&frame(&[460.0, 310.0]), Direction::Forward, &counter(), &cfg());
        assert!(t.rod_count() > 0);

        t.reset();
        assert_eq!(t.rod_count(), 0);
        assert!(t.tracks().is_empty());
        assert!(t.counted_ids().is_empty());

        // Ids restart from the initial value.
        t.process(&frame(&[450.0]), Direction::Forward, &counter(), &cfg());
        assert_eq!(ids(&t), vec![INITIAL_TRACK_ID]);
    }
}
