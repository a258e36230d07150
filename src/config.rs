use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Config = serde_yaml::from_str(&contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.counter;
        if !(c.counter_init < c.counter_line && c.counter_line < c.counter_end) {
            anyhow::bail!(
                "Invalid counter boundaries: need counter_init < counter_line < counter_end, \
                 got {} / {} / {}",
                c.counter_init,
                c.counter_line,
                c.counter_end
            );
        }
        if !(self.tracker.min_confidence > 0.0 && self.tracker.min_confidence < 1.0) {
            anyhow::bail!(
                "min_confidence must be in (0, 1), got {}",
                self.tracker.min_confidence
            );
        }
        for code in self
            .signal
            .reverse_codes
            .iter()
            .chain(self.signal.stop_codes.iter())
        {
            if code.len() != 2 || !code.chars().all(|ch| ch == '0' || ch == '1') {
                anyhow::bail!("Signal codes must be two binary symbols, got {:?}", code);
            }
        }
        Ok(())
    }
}
