//! Error types.
//!
//! Stall conditions themselves are never returned as errors; they are delivered
//! as [`MediaEvent`](crate::events::MediaEvent)s. Only misconfiguration fails.

use std::fmt;

/// Invalid [`WatchdogConfig`](crate::config::WatchdogConfig) values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `max_buffer_hole` is negative or not finite
    InvalidMaxBufferHole(f64),
    /// `high_buffer_watchdog_period` is negative or not finite
    InvalidWatchdogPeriod(f64),
    /// `nudge_offset` is not strictly positive and finite
    InvalidNudgeOffset(f64),
    /// `nudge_max_retry` is zero
    ZeroNudgeRetries,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidMaxBufferHole(v) => {
                write!(f, "max_buffer_hole must be a finite value >= 0, got {v}")
            }
            ConfigError::InvalidWatchdogPeriod(v) => write!(
                f,
                "high_buffer_watchdog_period must be a finite value >= 0, got {v}"
            ),
            ConfigError::InvalidNudgeOffset(v) => {
                write!(f, "nudge_offset must be a finite value > 0, got {v}")
            }
            ConfigError::ZeroNudgeRetries => write!(f, "nudge_max_retry must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidNudgeOffset(-0.1);
        assert!(err.to_string().contains("nudge_offset"));
        assert!(err.to_string().contains("-0.1"));
        assert_eq!(
            ConfigError::ZeroNudgeRetries.to_string(),
            "nudge_max_retry must be at least 1"
        );
    }
}
