// src/detector.rs
//
// Black-box detector seam. The core never looks at pixels itself; it hands
// an image region to whatever implements this trait and consumes the
// resulting candidate boxes.

use crate::types::{Detection, Frame};
use anyhow::Result;

pub trait Detector: Send {
    /// Run detection on a frame. Detections at or below `min_confidence`
    /// may still be returned; the position extractor applies the threshold.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Detector that replays a fixed script, one batch per call.
    pub struct ScriptedDetector {
        batches: std::vec::IntoIter<Vec<Detection>>,
    }

    impl ScriptedDetector {
        pub fn new(batches: Vec<Vec<Detection>>) -> Self {
            Self {
                batches: batches.into_iter(),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(self.batches.next().unwrap_or_default())
        }
    }
}
