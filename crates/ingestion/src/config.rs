//! Ingestion configuration.
//!
//! Band and color step counts are fixed per deployment, never inferred
//! from the data.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{IngestionError, Result};

/// Names of the coordinate variables every dataset must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisNames {
    pub time: String,
    pub lat: String,
    pub lon: String,
}

impl Default for AxisNames {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            lat: "lat".to_string(),
            lon: "lon".to_string(),
        }
    }
}

/// Bounded retry for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_secs: 5,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Whether a unit that just failed on `attempt` (zero-based) may run again.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Per-deployment ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of contour bands per field.
    pub band_count: usize,
    /// Number of stops in a variable's color bar.
    pub color_steps: usize,
    /// Value substituted for nulls on unstructured meshes after masking.
    pub null_fill_value: f64,
    pub axes: AxisNames,
    pub retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            band_count: 25,
            color_steps: 10,
            null_fill_value: -9999.0,
            axes: AxisNames::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.band_count == 0 {
            return Err(IngestionError::InvalidConfig(
                "band_count must be at least 1".to_string(),
            ));
        }
        if self.color_steps < 2 {
            return Err(IngestionError::InvalidConfig(
                "color_steps must be at least 2".to_string(),
            ));
        }
        if !self.null_fill_value.is_finite() {
            return Err(IngestionError::InvalidConfig(
                "null_fill_value must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.band_count, 25);
        assert_eq!(config.color_steps, 10);
        assert_eq!(config.null_fill_value, -9999.0);
        assert_eq!(config.retry.delay(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: IngestConfig =
            serde_json::from_str(r#"{"band_count": 10, "axes": {"lat": "y"}}"#).unwrap();
        assert_eq!(config.band_count, 10);
        assert_eq!(config.axes.lat, "y");
        assert_eq!(config.axes.lon, "lon");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_retry_bound() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn test_invalid_config() {
        let config = IngestConfig {
            band_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IngestionError::InvalidConfig(_))));
    }
}
