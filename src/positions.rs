// src/positions.rs
//
// Converts raw detector output into candidate rod positions plus a single
// actuator marker position.

use crate::types::{ActuatorConfig, Detection, Rod};

/// Actuator position meaning "not detected this frame".
pub const NO_ACTUATOR: (f32, f32) = (0.0, 0.0);

/// Filter detections by confidence and split them into rod centers and one
/// actuator position.
///
/// Rods keep the detector's native order and come back unassigned
/// (`track_id == -1`). When several actuator candidates survive, the one
/// closest to the top of the frame (minimum y) wins; on an exact tie the
/// first seen is kept. The configured `x_offset` shifts the actuator so its
/// reported position lines up with the contact point rather than the marker.
pub fn extract_positions(
    detections: &[Detection],
    min_confidence: f32,
    actuator: &ActuatorConfig,
) -> (Vec<Rod>, (f32, f32)) {
    let mut rods = Vec::new();
    let mut actuator_pos = NO_ACTUATOR;
    let mut best_y = f32::INFINITY;

    for det in detections {
        if det.confidence <= min_confidence {
            continue;
        }

        let [x1, y1, x2, y2] = det.bbox;
        let center_x = (x1 + x2) / 2.0;
        let center_y = (y1 + y2) / 2.0;

        if det.class_id == actuator.class_id {
            // Strict less-than keeps the earlier candidate on equal y.
            if center_y < best_y {
                best_y = center_y;
                actuator_pos = (center_x + actuator.x_offset, center_y);
            }
        } else {
            rods.push(Rod::unassigned(center_x, center_y));
        }
    }

    (rods, actuator_pos)
}

/// True when the extractor reported "not detected".
pub fn actuator_detected(pos: (f32, f32)) -> bool {
    pos != NO_ACTUATOR
}
