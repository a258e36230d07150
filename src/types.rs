use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub counter: CounterConfig,
    pub tracker: TrackerConfig,
    pub actuator: ActuatorConfig,
    pub signal: SignalConfig,
    pub logging: LoggingConfig,
    pub replay: ReplayConfig,
}

/// Pixel x-coordinates of the three zone boundaries.
/// Must satisfy `counter_init < counter_line < counter_end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    pub counter_init: f32,
    pub counter_end: f32,
    pub counter_line: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub min_confidence: f32,
    /// Minimum accepted x-displacement for an association match.
    /// Negative: "not moving meaningfully backward".
    #[serde(default = "default_displacement")]
    pub displacement: f32,
    /// Pixel tolerance for boundary-straddling rods and the
    /// "end zone is stopped" check.
    #[serde(default = "default_boundary_tolerance")]
    pub boundary_tolerance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Detector class id reserved for the actuator marker.
    pub class_id: u32,
    pub x_offset: f32,
    /// Informational only; not currently gating.
    pub y_limit: f32,
    /// Consecutive sightings required before a package closes.
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Two-symbol codes decoded as Reverse.
    #[serde(default = "default_reverse_codes")]
    pub reverse_codes: Vec<String>,
    /// Two-symbol codes decoded as Stopped. Site variants differ on
    /// whether "11" belongs here; keep it configurable.
    #[serde(default = "default_stop_codes")]
    pub stop_codes: Vec<String>,
    /// Blocking read timeout for the signal source, milliseconds.
    #[serde(default = "default_signal_timeout_ms")]
    pub timeout_ms: u64,
    /// Line device to read samples from (serial tty, FIFO). Empty runs
    /// without a direction feed.
    #[serde(default)]
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// CSV count log destination. Empty disables the log sink.
    #[serde(default)]
    pub count_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// JSONL file with one frame record per line.
    pub path: String,
}

fn default_displacement() -> f32 {
    -15.0
}

fn default_boundary_tolerance() -> f32 {
    15.0
}

fn default_debounce_frames() -> u32 {
    2
}

fn default_reverse_codes() -> Vec<String> {
    vec!["10".to_string()]
}

fn default_stop_codes() -> Vec<String> {
    vec!["00".to_string()]
}

fn default_signal_timeout_ms() -> u64 {
    500
}

/// A tracked object instance. `track_id == -1` means unassigned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rod {
    pub track_id: i32,
    pub pos_x: f32,
    pub pos_y: f32,
}

impl Rod {
    pub fn unassigned(pos_x: f32, pos_y: f32) -> Self {
        Self {
            track_id: -1,
            pos_x,
            pos_y,
        }
    }
}

/// Motor direction decoded from the two-symbol line protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Forward,
    Stopped,
    Reverse,
}

/// One detector output candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    /// (x1, y1, x2, y2)
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

/// A captured frame as seen by the pipeline. Pixel data is opaque to the
/// core; only the detector looks inside.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
    /// Re-published last-good frame during a source outage.
    pub stale: bool,
}

/// Completed package sizes for the run, append-only.
pub type PackageRecord = Vec<u32>;
