// src/zones.rs
//
// Partitions rod positions into the three x-coordinate bands the tracker
// reasons about. Pure function; called on both the current and the cached
// previous frame every cycle.

use crate::types::Rod;

#[derive(Debug, Clone, Default)]
pub struct Zones {
    /// x < counter_init
    pub init: Vec<Rod>,
    /// counter_init <= x <= counter_end
    pub tracking: Vec<Rod>,
    /// x > counter_end
    pub end: Vec<Rod>,
}

/// Strict partition of `rods` by x. Element order within each zone is the
/// input order; nothing is re-sorted here.
pub fn classify(rods: &[Rod], counter_init: f32, counter_end: f32) -> Zones {
    let mut zones = Zones::default();
    for rod in rods {
        if rod.pos_x < counter_init {
            zones.init.push(*rod);
        } else if rod.pos_x <= counter_end {
            zones.tracking.push(*rod);
        } else {
            zones.end.push(*rod);
        }
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rod(x: f32) -> Rod {
        Rod::unassigned(x, 50.0)
    }

    #[test]
    fn partition_is_disjoint_and_lossless() {
        let rods = vec![
            rod(10.0),
            rod(100.0), // boundary: belongs to tracking
            rod(250.0),
            rod(500.0), // boundary: belongs to tracking
            rod(501.0),
            rod(99.9),
        ];
        let zones = classify(&rods, 100.0, 500.0);

        assert_eq!(zones.init.len(), 2);
        assert_eq!(zones.tracking.len(), 3);
        assert_eq!(zones.end.len(), 1);
        assert_eq!(
            zones.init.len() + zones.tracking.len() + zones.end.len(),
            rods.len()
        );

        // Every input rod lands in exactly one zone.
        for r in &rods {
            let hits = [&zones.init, &zones.tracking, &zones.end]
                .iter()
                .map(|z| z.iter().filter(|zr| zr.pos_x == r.pos_x).count())
                .sum::<usize>();
            assert_eq!(hits, 1, "rod at x={} in {} zones", r.pos_x, hits);
        }
    }

    #[test]
    fn preserves_input_order() {
        let rods = vec![rod(400.0), rod(200.0), rod(300.0)];
        let zones = classify(&rods, 100.0, 500.0);
        let xs: Vec<f32> = zones.tracking.iter().map(|r| r.pos_x).collect();
        assert_eq!(xs, vec![400.0, 200.0, 300.0]);
    }

    #[test]
    fn empty_input_yields_empty_zones() {
        let zones = classify(&[], 100.0, 500.0);
        assert!(zones.init.is_empty() && zones.tracking.is_empty() && zones.end.is_empty());
    }
}
