// src/pipeline/mod.rs
//
// Four independent stages on dedicated OS threads:
//
//   capture ──(latest-wins queue)──> processing ──(latest-wins queue)──> sink
//                                        ^
//   direction reader ──(SharedFlow)──────┘
//
// Frame order is "most-recent-wins", not strict FIFO. Cancellation is
// cooperative: a shared stop flag, checked at every loop top, with all
// blocking calls bounded by short timeouts.

pub mod flow_state;
pub mod latest;

use crate::detector::Detector;
use crate::logger::CountLogger;
use crate::package::PackageCoordinator;
use crate::positions::extract_positions;
use crate::signal::{DirectionDecoder, SignalSource};
use crate::source::{Backoff, FrameSource};
use crate::tracker::Tracker;
use crate::types::{Config, Direction, Frame, Rod};
use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use flow_state::SharedFlow;
use latest::{latest_channel, LatestSender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on any blocking wait, so every stage observes the stop flag
/// promptly.
pub const STAGE_TIMEOUT: Duration = Duration::from_millis(500);

/// Depth of the inter-stage queues. Small on purpose: only the most recent
/// frames matter.
pub const QUEUE_DEPTH: usize = 2;

/// Annotated result of one processed frame, for the sink.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub timestamp_ms: f64,
    pub direction: Direction,
    pub rod_count: u32,
    pub tracks: Vec<(i32, Rod)>,
    pub actuator: (f32, f32),
    pub packages: Vec<u32>,
    /// Set on the cycle a package closed.
    pub closed_package: Option<u32>,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub direction_samples: u64,
    pub final_count: u32,
    pub packages: Vec<u32>,
}

/// The per-frame work of the processing stage, separated from the thread
/// loop: detect -> extract positions -> track -> coordinate packages.
pub struct ProcessingCore {
    config: Arc<Config>,
    tracker: Tracker,
    coordinator: PackageCoordinator,
    last_processed_ms: f64,
    frames_processed: u64,
    frames_skipped: u64,
}

impl ProcessingCore {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            tracker: Tracker::new(),
            coordinator: PackageCoordinator::new(),
            last_processed_ms: f64::NEG_INFINITY,
            frames_processed: 0,
            frames_skipped: 0,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn rod_count(&self) -> u32 {
        self.tracker.rod_count()
    }

    pub fn packages(&self) -> &[u32] {
        self.coordinator.packages()
    }

    /// Handle one frame. Returns `None` when the frame is not newer than
    /// the last one processed (stale re-publishes, duplicate stamps);
    /// backlog is never reprocessed.
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        detector: &mut dyn Detector,
        direction: Direction,
    ) -> Result<Option<ProcessedFrame>> {
        if frame.timestamp_ms <= self.last_processed_ms {
            self.frames_skipped += 1;
            debug!(stamp = frame.timestamp_ms, "skipped stale frame");
            return Ok(None);
        }
        self.last_processed_ms = frame.timestamp_ms;

        let detections = detector.detect(frame)?;
        let (mut rods, actuator_pos) = extract_positions(
            &detections,
            self.config.tracker.min_confidence,
            &self.config.actuator,
        );
        // Rightmost-first ordering is what the tracker heuristics expect.
        rods.sort_by(|a, b| {
            b.pos_x
                .partial_cmp(&a.pos_x)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Overshoot correction judges positions from the frame before this
        // one, so snapshot the cache before the tracker replaces it.
        let prev_snapshot = self.tracker.prev_rods().to_vec();
        self.tracker
            .process(&rods, direction, &self.config.counter, &self.config.tracker);
        let closed = self.coordinator.update(
            actuator_pos,
            &prev_snapshot,
            &mut self.tracker,
            &self.config.counter,
            &self.config.actuator,
        );

        self.frames_processed += 1;
        Ok(Some(ProcessedFrame {
            timestamp_ms: frame.timestamp_ms,
            direction,
            rod_count: self.tracker.rod_count(),
            tracks: self.tracker.tracks().to_vec(),
            actuator: actuator_pos,
            packages: self.coordinator.packages().to_vec(),
            closed_package: closed,
        }))
    }
}

/// Run the full pipeline until the source ends or the stop flag is set.
pub fn run(
    config: Arc<Config>,
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    signal: Box<dyn SignalSource>,
    stop: Arc<AtomicBool>,
) -> Result<PipelineReport> {
    let flow = SharedFlow::new();
    let (frame_tx, frame_rx) = latest_channel::<Frame>(QUEUE_DEPTH);
    let (out_tx, out_rx) = latest_channel::<ProcessedFrame>(QUEUE_DEPTH);
    let logger = CountLogger::open(&config.logging.count_log);
    let decoder = DirectionDecoder::new(&config.signal);
    let core = ProcessingCore::new(config);

    let capture = thread::Builder::new().name("capture".into()).spawn({
        let stop = stop.clone();
        let flow = flow.clone();
        move || capture_stage(source, frame_tx, flow, stop)
    })?;

    let direction = thread::Builder::new().name("direction".into()).spawn({
        let stop = stop.clone();
        let flow = flow.clone();
        move || direction_stage(signal, decoder, flow, stop)
    })?;

    let processing = thread::Builder::new().name("processing".into()).spawn({
        let stop = stop.clone();
        let flow = flow.clone();
        move || processing_stage(frame_rx, detector, core, flow, out_tx, stop)
    })?;

    let sink = thread::Builder::new().name("sink".into()).spawn({
        let stop = stop.clone();
        move || sink_stage(out_rx, logger, stop)
    })?;

    let frames_captured = capture
        .join()
        .map_err(|_| anyhow!("capture stage panicked"))?;
    let core = processing
        .join()
        .map_err(|_| anyhow!("processing stage panicked"))?;
    let direction_samples = direction
        .join()
        .map_err(|_| anyhow!("direction stage panicked"))?;
    sink.join().map_err(|_| anyhow!("sink stage panicked"))?;

    debug!(
        last_frame_stamp = flow.latest_frame_stamp(),
        "pipeline joined"
    );
    Ok(PipelineReport {
        frames_captured,
        frames_processed: core.frames_processed(),
        frames_skipped: core.frames_skipped(),
        direction_samples,
        final_count: core.rod_count(),
        packages: core.packages().to_vec(),
    })
}

/// Sleep in short slices so the stop flag interrupts a backoff wait.
fn sleep_with_stop(total: Duration, stop: &AtomicBool) {
    let mut remaining = total;
    while remaining > Duration::ZERO && !stop.load(Ordering::Relaxed) {
        let slice = remaining.min(STAGE_TIMEOUT);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

fn capture_stage(
    mut source: Box<dyn FrameSource>,
    tx: LatestSender<Frame>,
    flow: SharedFlow,
    stop: Arc<AtomicBool>,
) -> u64 {
    let mut backoff = Backoff::new();
    let mut last_good: Option<Frame> = None;
    let mut captured: u64 = 0;

    'reconnect: while !stop.load(Ordering::Relaxed) {
        if let Err(e) = source.connect() {
            warn!(error = %e, "frame source connect failed, backing off");
            sleep_with_stop(backoff.next_delay(), &stop);
            continue;
        }
        info!("frame source connected");

        while !stop.load(Ordering::Relaxed) {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    backoff.reset();
                    captured += 1;
                    flow.publish_frame_stamp(frame.timestamp_ms);
                    last_good = Some(frame.clone());
                    tx.send(frame);
                }
                Ok(None) => {
                    info!(captured, "frame source ended");
                    stop.store(true, Ordering::Relaxed);
                    break 'reconnect;
                }
                Err(e) => {
                    warn!(error = %e, "frame read failed, reconnecting");
                    // Keep consumers fed with the last good frame, marked
                    // stale, instead of letting them block on an outage.
                    if let Some(frame) = &last_good {
                        let mut stale = frame.clone();
                        stale.stale = true;
                        tx.send(stale);
                    }
                    sleep_with_stop(backoff.next_delay(), &stop);
                    continue 'reconnect;
                }
            }
        }
    }

    info!(captured, "capture stage stopped");
    captured
}

fn direction_stage(
    mut signal: Box<dyn SignalSource>,
    decoder: DirectionDecoder,
    flow: SharedFlow,
    stop: Arc<AtomicBool>,
) -> u64 {
    let mut last = Direction::Forward;
    while !stop.load(Ordering::Relaxed) {
        match signal.read_line() {
            Ok(Some(line)) => {
                if let Some(direction) = decoder.decode(&line) {
                    if direction != last {
                        info!(?direction, "direction changed");
                        last = direction;
                    }
                    flow.publish_direction(direction);
                }
                // Malformed lines fall through silently; the last known
                // direction persists.
            }
            Ok(None) => {} // timeout
            Err(e) => {
                warn!(error = %e, "signal read failed");
                sleep_with_stop(Duration::from_millis(100), &stop);
            }
        }
    }
    info!(
        samples = flow.direction_samples(),
        last_sample_age = ?flow.direction_age(),
        "direction stage stopped"
    );
    flow.direction_samples()
}

fn processing_stage(
    rx: Receiver<Frame>,
    mut detector: Box<dyn Detector>,
    mut core: ProcessingCore,
    flow: SharedFlow,
    out_tx: LatestSender<ProcessedFrame>,
    stop: Arc<AtomicBool>,
) -> ProcessingCore {
    loop {
        // Drain what is already queued on shutdown, but never block past
        // the stage timeout.
        if stop.load(Ordering::Relaxed) && rx.is_empty() {
            break;
        }
        match rx.recv_timeout(STAGE_TIMEOUT) {
            Ok(frame) => {
                let direction = flow.direction();
                match core.handle_frame(&frame, detector.as_mut(), direction) {
                    Ok(Some(processed)) => {
                        out_tx.send(processed);
                    }
                    Ok(None) => {}
                    // Detector hiccups are diagnostics, not fatal.
                    Err(e) => warn!(error = %e, "frame processing failed"),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(
        processed = core.frames_processed(),
        skipped = core.frames_skipped(),
        "processing stage stopped"
    );
    core
}

fn sink_stage(rx: Receiver<ProcessedFrame>, mut logger: CountLogger, stop: Arc<AtomicBool>) {
    let mut last_count = 0u32;
    loop {
        if stop.load(Ordering::Relaxed) && rx.is_empty() {
            break;
        }
        match rx.recv_timeout(STAGE_TIMEOUT) {
            Ok(processed) => {
                if let Some(size) = processed.closed_package {
                    info!(
                        size,
                        total = processed.packages.len(),
                        "package completed"
                    );
                }
                if processed.rod_count != last_count {
                    debug!(count = processed.rod_count, "rod count updated");
                    last_count = processed.rod_count;
                }
                logger.log_packages(&processed.packages);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("sink stage stopped");
}
