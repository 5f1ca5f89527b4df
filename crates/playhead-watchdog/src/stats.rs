//! Per-session stall counters.

use std::time::Duration;

/// Counters describing what the watchdog saw and did during a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogStats {
    /// Stall episodes started (playhead confirmed not moving)
    pub stalls_detected: u64,
    /// Episodes that lasted long enough to be reported
    pub stalls_reported: u64,
    /// Seeks over holes left by partial fragments
    pub holes_skipped: u64,
    /// Forward nudges applied
    pub nudges: u64,
    /// Fatal stall notifications emitted
    pub fatal_stalls: u64,
    /// Reported episodes that ended with the playhead moving again
    pub recoveries: u64,
    /// Total time spent in reported episodes that recovered
    pub total_stalled: Duration,
}

impl WatchdogStats {
    /// Average length of a recovered stall.
    pub fn mean_stall(&self) -> Option<Duration> {
        if self.recoveries == 0 {
            return None;
        }
        u32::try_from(self.recoveries)
            .ok()
            .map(|n| self.total_stalled / n)
    }
}
