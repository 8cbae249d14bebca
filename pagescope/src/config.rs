//! Session configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) is a valid configuration.
//!
//! ```json
//! { "resolution_msec": 20, "refresh_delay_msec": 150, "data_available_instantaneous": true }
//! ```

use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::{ConfigError, Resolution};

pub const DEFAULT_RESOLUTION_MSEC: u64 = 20;
pub const MIN_RESOLUTION_MSEC: u64 = 2;
pub const DEFAULT_REFRESH_DELAY_MSEC: u64 = 150;
pub const MIN_REFRESH_DELAY_MSEC: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Bucket width for quantisation
    pub resolution_msec: u64,
    /// Delay between scheduler ticks
    pub refresh_delay_msec: u64,
    /// Record data availability as a single bucket instead of a span
    /// ending at pipeline teardown
    pub data_available_instantaneous: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            resolution_msec: DEFAULT_RESOLUTION_MSEC,
            refresh_delay_msec: DEFAULT_REFRESH_DELAY_MSEC,
            data_available_instantaneous: true,
        }
    }
}

impl TimelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Raise values below their minimums
    #[must_use]
    pub fn clamped(mut self) -> Self {
        if self.resolution_msec < MIN_RESOLUTION_MSEC {
            warn!(
                "resolution_msec {} below minimum, using {MIN_RESOLUTION_MSEC}",
                self.resolution_msec
            );
            self.resolution_msec = MIN_RESOLUTION_MSEC;
        }
        if self.refresh_delay_msec < MIN_REFRESH_DELAY_MSEC {
            warn!(
                "refresh_delay_msec {} below minimum, using {MIN_REFRESH_DELAY_MSEC}",
                self.refresh_delay_msec
            );
            self.refresh_delay_msec = MIN_REFRESH_DELAY_MSEC;
        }
        self
    }

    /// Session resolution (clamped)
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution::from_usec(self.resolution_msec.max(MIN_RESOLUTION_MSEC) * 1_000)
    }

    /// Tick delay (clamped)
    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_msec.max(MIN_REFRESH_DELAY_MSEC))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = TimelineConfig::default();
        assert_eq!(config.resolution().as_usec(), 20_000);
        assert_eq!(config.refresh_delay(), Duration::from_millis(150));
        assert!(config.data_available_instantaneous);
    }

    #[test]
    fn test_clamping() {
        let config = TimelineConfig {
            resolution_msec: 0,
            refresh_delay_msec: 1,
            data_available_instantaneous: false,
        }
        .clamped();
        assert_eq!(config.resolution_msec, 2);
        assert_eq!(config.refresh_delay_msec, 10);
        assert!(!config.data_available_instantaneous);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "resolution_msec": 5 }}"#).unwrap();
        let config = TimelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.resolution_msec, 5);
        assert_eq!(config.refresh_delay_msec, DEFAULT_REFRESH_DELAY_MSEC);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = TimelineConfig::from_file("/nonexistent/pagescope.json");
        assert!(matches!(missing, Err(ConfigError::ReadFailed(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(TimelineConfig::from_file(file.path()), Err(ConfigError::Json(_))));
    }
}
