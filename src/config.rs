//! Execution settings shared by a stream and everything derived from it.

use crate::error::Result;
use anyhow::Context;
use std::env;
use std::path::PathBuf;

/// Environment variable overriding [`StreamConfig::max_items_in_memory`].
pub const ENV_MAX_ITEMS: &str = "TABSTREAM_MAX_ITEMS";
/// Environment variable overriding [`StreamConfig::step`].
pub const ENV_STEP: &str = "TABSTREAM_STEP";
/// Environment variable overriding [`StreamConfig::spill_dir`].
pub const ENV_SPILL_DIR: &str = "TABSTREAM_SPILL_DIR";

/// Thresholds and defaults consulted by buffering operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Streams with at most this many items are sorted, grouped and joined in memory.
    pub max_items_in_memory: usize,
    /// Chunk size of the external sort: each spill file holds at most this many items.
    pub step: usize,
    /// Where spill files go; the system temp directory when `None`.
    pub spill_dir: Option<PathBuf>,
    /// Delimiter used when lines are split into rows and rows are joined into lines.
    pub delimiter: char,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_items_in_memory: 5_000_000,
            step: 100_000,
            spill_dir: None,
            delimiter: '\t',
        }
    }
}

impl StreamConfig {
    /// Defaults overridden by `TABSTREAM_MAX_ITEMS`, `TABSTREAM_STEP` and
    /// `TABSTREAM_SPILL_DIR` when set.
    ///
    /// # Errors
    /// Returns an error if a numeric variable does not parse or is zero.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Ok(v) = env::var(ENV_MAX_ITEMS) {
            cfg.max_items_in_memory = parse_count(ENV_MAX_ITEMS, &v)?;
        }
        if let Ok(v) = env::var(ENV_STEP) {
            cfg.step = parse_count(ENV_STEP, &v)?;
        }
        if let Ok(v) = env::var(ENV_SPILL_DIR)
            && !v.is_empty()
        {
            cfg.spill_dir = Some(PathBuf::from(v));
        }
        Ok(cfg)
    }

    #[must_use]
    pub const fn with_max_items_in_memory(mut self, n: usize) -> Self {
        self.max_items_in_memory = n;
        self
    }

    #[must_use]
    pub const fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
    let n: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("{name}={raw:?} is not a non-negative integer"))?;
    anyhow::ensure!(n > 0, "{name} must be positive");
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_rejects_garbage() {
        assert_eq!(parse_count("X", " 12 ").unwrap(), 12);
        assert!(parse_count("X", "abc").is_err());
        assert!(parse_count("X", "0").is_err());
    }

    #[test]
    fn builders_override_defaults() {
        let c = StreamConfig::default().with_max_items_in_memory(10).with_step(3);
        assert_eq!(c.max_items_in_memory, 10);
        assert_eq!(c.step, 3);
        assert_eq!(c.delimiter, '\t');
    }
}
