// src/signal.rs
//
// Two-symbol motor-direction protocol. The external controller emits one
// line per sample, exactly two ASCII '0'/'1' symbols. The decode table is
// configurable because deployed sites disagree on whether "11" means
// Stopped or Forward. Anything that is not a clean two-symbol line is
// ignored, never an error.

use crate::types::{Direction, SignalConfig};
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::BufRead;
use std::thread;
use std::time::Duration;

/// Blocking line source for direction samples (serial port, FIFO, file).
/// `read_line` returns `Ok(None)` on timeout so callers can observe the
/// stop flag between reads.
pub trait SignalSource: Send {
    fn read_line(&mut self) -> Result<Option<String>>;
}

pub struct DirectionDecoder {
    reverse_codes: Vec<String>,
    stop_codes: Vec<String>,
}

impl DirectionDecoder {
    pub fn new(cfg: &SignalConfig) -> Self {
        Self {
            reverse_codes: cfg.reverse_codes.clone(),
            stop_codes: cfg.stop_codes.clone(),
        }
    }

    /// Decode one line. `None` means malformed; the caller keeps the last
    /// known direction.
    pub fn decode(&self, line: &str) -> Option<Direction> {
        let line = line.trim();
        if line.len() != 2 || !line.chars().all(|ch| ch == '0' || ch == '1') {
            return None;
        }
        if self.reverse_codes.iter().any(|c| c == line) {
            Some(Direction::Reverse)
        } else if self.stop_codes.iter().any(|c| c == line) {
            Some(Direction::Stopped)
        } else {
            Some(Direction::Forward)
        }
    }
}

/// Signal source over any buffered reader. The unbounded blocking reads
/// happen on a detached reader thread; `read_line` drains its channel with
/// `recv_timeout`, so a silent device still returns within `timeout` and
/// the calling stage keeps observing the stop flag. EOF behaves like a
/// line gone silent.
pub struct LineSignalSource {
    lines: Receiver<String>,
    timeout: Duration,
}

impl LineSignalSource {
    pub fn new<R: BufRead + Send + 'static>(mut reader: R, timeout: Duration) -> Self {
        let (tx, lines) = bounded(16);
        thread::spawn(move || loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        });
        Self { lines, timeout }
    }
}

impl SignalSource for LineSignalSource {
    fn read_line(&mut self) -> Result<Option<String>> {
        match self.lines.recv_timeout(self.timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // Reader thread ended (EOF or read error). Pace the caller
                // like a silent line instead of spinning.
                thread::sleep(self.timeout);
                Ok(None)
            }
        }
    }
}

/// Source for runs without a direction feed: every read times out and the
/// pipeline keeps the default Forward.
pub struct NullSignalSource;

impl SignalSource for NullSignalSource {
    fn read_line(&mut self) -> Result<Option<String>> {
        std::thread::sleep(std::time::Duration::from_millis(100));
        Ok(None)
    }
}
