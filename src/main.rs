// src/main.rs

mod config;
mod detector;
mod logger;
mod package;
mod pipeline;
mod positions;
mod replay;
mod signal;
mod source;
mod tracker;
mod types;
mod zones;

use anyhow::Result;
use replay::{ReplayDetector, ReplayFrameSource};
use signal::{LineSignalSource, NullSignalSource, SignalSource};
use source::FrameSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = types::Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("rod_counter={}", config.logging.level)),
        )
        .init();

    info!("Rod counting system starting");
    info!(
        "Counter boundaries: init={}, line={}, end={}",
        config.counter.counter_init, config.counter.counter_line, config.counter.counter_end
    );
    info!(
        "Tracker thresholds: displacement={}, boundary_tolerance={}, min_confidence={}",
        config.tracker.displacement,
        config.tracker.boundary_tolerance,
        config.tracker.min_confidence
    );

    // A replay file that cannot be opened at startup is a configuration
    // error, not an outage to retry.
    let mut frame_source = ReplayFrameSource::new(config.replay.path.clone());
    frame_source.connect()?;
    let signal_source: Box<dyn SignalSource> = if config.signal.device.is_empty() {
        info!("No signal device configured, direction defaults to Forward");
        Box::new(NullSignalSource)
    } else {
        match std::fs::File::open(&config.signal.device) {
            Ok(file) => {
                info!("Reading direction samples from {}", config.signal.device);
                Box::new(LineSignalSource::new(
                    std::io::BufReader::new(file),
                    std::time::Duration::from_millis(config.signal.timeout_ms),
                ))
            }
            Err(e) => {
                // Optional feature: run without a direction feed.
                warn!(
                    "Failed to open signal device {}: {}; continuing without it",
                    config.signal.device, e
                );
                Box::new(NullSignalSource)
            }
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            stop.store(true, Ordering::Relaxed);
        })?;
    }

    let report = pipeline::run(
        Arc::new(config),
        Box::new(frame_source),
        Box::new(ReplayDetector),
        signal_source,
        stop,
    )?;

    info!("Run complete");
    info!("  Frames captured: {}", report.frames_captured);
    info!(
        "  Frames processed: {} ({} skipped as stale)",
        report.frames_processed, report.frames_skipped
    );
    info!("  Direction samples: {}", report.direction_samples);
    info!("  Packages completed: {}", report.packages.len());
    for (i, size) in report.packages.iter().enumerate() {
        info!("    Package {}: {} rods", i + 1, size);
    }
    if report.final_count > 0 {
        info!(
            "  Rods counted toward the open package: {}",
            report.final_count
        );
    }

    Ok(())
}
