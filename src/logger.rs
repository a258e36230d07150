// src/logger.rs
//
// Appends one CSV row per completed package. The "how many rows were
// already written" cursor is an explicit field, not hidden static state,
// so the sink can hand the full package history in every cycle and only
// new entries get logged.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

pub struct CountLogger {
    writer: Option<BufWriter<File>>,
    /// Number of package rows already written.
    last_logged: usize,
}

impl CountLogger {
    /// An empty path, or a path that fails to open, disables the log for
    /// the run. The pipeline keeps going either way.
    pub fn open(path: &str) -> Self {
        if path.is_empty() {
            return Self {
                writer: None,
                last_logged: 0,
            };
        }
        match OpenOptions::new().create(true).append(true).open(Path::new(path)) {
            Ok(file) => {
                info!(path, "count log opened");
                Self {
                    writer: Some(BufWriter::new(file)),
                    last_logged: 0,
                }
            }
            Err(e) => {
                warn!(path, error = %e, "count log disabled: failed to open");
                Self {
                    writer: None,
                    last_logged: 0,
                }
            }
        }
    }

    pub fn enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Write rows for packages not yet logged: `date,time,package_label,count`.
    pub fn log_packages(&mut self, packages: &[u32]) {
        if packages.len() <= self.last_logged {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            self.last_logged = packages.len();
            return;
        };

        let now = Local::now();
        let date = now.format("%Y-%m-%d");
        let time = now.format("%H:%M:%S");

        for (i, count) in packages.iter().enumerate().skip(self.last_logged) {
            if let Err(e) = writeln!(writer, "{},{},package-{},{}", date, time, i + 1, count) {
                warn!(error = %e, "count log write failed; disabling");
                self.writer = None;
                break;
            }
        }
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
        self.last_logged = packages.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_only_new_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.csv");
        let path_str = path.to_str().unwrap();

        let mut logger = CountLogger::open(path_str);
        assert!(logger.enabled());

        logger.log_packages(&[12]);
        logger.log_packages(&[12]); // unchanged, no new row
        logger.log_packages(&[12, 9]);

        let contents = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = contents.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with(",package-1,12"), "row: {}", rows[0]);
        assert!(rows[1].ends_with(",package-2,9"), "row: {}", rows[1]);
    }

    #[test]
    fn empty_path_disables_logging() {
        let mut logger = CountLogger::open("");
        assert!(!logger.enabled());
        logger.log_packages(&[1, 2, 3]); // no-op, no panic
    }

    #[test]
    fn unopenable_path_disables_rather_than_failing() {
        let mut logger = CountLogger::open("/nonexistent-dir/counts.csv");
        assert!(!logger.enabled());
        logger.log_packages(&[5]);
    }
}
