// src/replay.rs
//
// Offline frame source: a JSONL file with one record per frame, carrying
// the timestamp and the recorded detector output. The detections ride
// inside the opaque frame payload, so the replay detector is the only
// component that looks at the bytes, the same shape as a live camera +
// inference pair.

use crate::detector::Detector;
use crate::source::FrameSource;
use crate::types::{Detection, Frame};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp_ms: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

pub struct ReplayFrameSource {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl ReplayFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
        }
    }
}

impl FrameSource for ReplayFrameSource {
    fn connect(&mut self) -> Result<()> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open replay file {}", self.path.display()))?;
        self.reader = Some(BufReader::new(file));
        info!(path = %self.path.display(), "replay source opened");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let reader = self
            .reader
            .as_mut()
            .context("Replay source read before connect")?;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None); // end of stream
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        let record: FrameRecord =
            serde_json::from_str(line.trim()).context("Malformed replay record")?;

        Ok(Some(Frame {
            data: serde_json::to_vec(&record.detections)?,
            width: 0,
            height: 0,
            timestamp_ms: record.timestamp_ms,
            stale: false,
        }))
    }
}

/// Detector half of the replay pair: decodes the detections embedded in
/// the frame payload.
pub struct ReplayDetector;

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.data.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&frame.data).context("Malformed detections in replay frame")
    }
}
