//! Watchdog tuning.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for [`StallWatchdog`](crate::StallWatchdog).
///
/// All time values are in seconds of media time except
/// `high_buffer_watchdog_period`, which is wall-clock seconds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WatchdogConfig {
    /// Largest gap between buffered ranges still treated as contiguous.
    pub max_buffer_hole: f64,
    /// How long a stall with buffer ahead may last before nudging.
    pub high_buffer_watchdog_period: f64,
    /// Base forward step of a nudge; the n-th nudge moves n times this far.
    pub nudge_offset: f64,
    /// Attempt number at which nudging gives up with a fatal stall.
    pub nudge_max_retry: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_buffer_hole: 0.5,
            high_buffer_watchdog_period: 2.0,
            nudge_offset: 0.1,
            nudge_max_retry: 3,
        }
    }
}

impl WatchdogConfig {
    #[must_use]
    pub fn with_max_buffer_hole(mut self, seconds: f64) -> Self {
        self.max_buffer_hole = seconds;
        self
    }

    #[must_use]
    pub fn with_high_buffer_watchdog_period(mut self, seconds: f64) -> Self {
        self.high_buffer_watchdog_period = seconds;
        self
    }

    #[must_use]
    pub fn with_nudge_offset(mut self, seconds: f64) -> Self {
        self.nudge_offset = seconds;
        self
    }

    #[must_use]
    pub fn with_nudge_max_retry(mut self, retries: u32) -> Self {
        self.nudge_max_retry = retries;
        self
    }

    /// Stall duration after which a stall with buffer ahead gets nudged.
    ///
    /// Saturates for periods [`validate`](Self::validate) would reject.
    pub fn high_buffer_watchdog(&self) -> Duration {
        Duration::try_from_secs_f64(self.high_buffer_watchdog_period).unwrap_or(Duration::MAX)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_buffer_hole.is_finite() || self.max_buffer_hole < 0.0 {
            return Err(ConfigError::InvalidMaxBufferHole(self.max_buffer_hole));
        }
        if Duration::try_from_secs_f64(self.high_buffer_watchdog_period).is_err() {
            return Err(ConfigError::InvalidWatchdogPeriod(
                self.high_buffer_watchdog_period,
            ));
        }
        if !self.nudge_offset.is_finite() || self.nudge_offset <= 0.0 {
            return Err(ConfigError::InvalidNudgeOffset(self.nudge_offset));
        }
        if self.nudge_max_retry == 0 {
            return Err(ConfigError::ZeroNudgeRetries);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WatchdogConfig::default();
        assert_eq!(config.max_buffer_hole, 0.5);
        assert_eq!(config.nudge_max_retry, 3);
        assert_eq!(config.high_buffer_watchdog(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = WatchdogConfig::default();

        assert_eq!(
            base.clone().with_max_buffer_hole(-1.0).validate(),
            Err(ConfigError::InvalidMaxBufferHole(-1.0))
        );
        assert!(matches!(
            base.clone()
                .with_high_buffer_watchdog_period(f64::NAN)
                .validate(),
            Err(ConfigError::InvalidWatchdogPeriod(_))
        ));
        assert!(matches!(
            base.clone()
                .with_high_buffer_watchdog_period(-0.5)
                .validate(),
            Err(ConfigError::InvalidWatchdogPeriod(_))
        ));
        assert_eq!(
            base.clone().with_nudge_offset(0.0).validate(),
            Err(ConfigError::InvalidNudgeOffset(0.0))
        );
        assert_eq!(
            base.with_nudge_max_retry(0).validate(),
            Err(ConfigError::ZeroNudgeRetries)
        );
    }

    #[test]
    fn test_unrepresentable_watchdog_period_rejected() {
        let config = WatchdogConfig::default().with_high_buffer_watchdog_period(1e20);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidWatchdogPeriod(1e20))
        );
        assert_eq!(config.high_buffer_watchdog(), Duration::MAX);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: WatchdogConfig =
            serde_json::from_str(r#"{ "nudge_offset": 0.25 }"#).expect("valid json");
        assert_eq!(config.nudge_offset, 0.25);
        assert_eq!(config.nudge_max_retry, 3);
        assert_eq!(config.max_buffer_hole, 0.5);
    }
}
