//! The playback engine seen by the watchdog.

use crate::buffer::TimeRange;

/// How much media the engine has ready at the current position.
///
/// Ordered so that comparisons read naturally (`state < HaveCurrentData`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Nothing known about the media
    HaveNothing = 0,
    /// Duration and dimensions known, no frame data
    HaveMetadata = 1,
    /// Data for the current position only
    HaveCurrentData = 2,
    /// Data for the current position and a little beyond
    HaveFutureData = 3,
    /// Enough data to play through
    HaveEnoughData = 4,
}

impl ReadyState {
    /// True once frame data exists at the current position.
    pub fn has_current_data(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

/// Mutable view of the media element driving playback.
///
/// Writing the position is an immediate seek; later reads must reflect it.
pub trait PlaybackEngine {
    /// Current playback position in seconds.
    fn position(&self) -> f64;

    /// Seeks to `position` seconds.
    fn set_position(&mut self, position: f64);

    /// Buffered ranges, ordered and non-overlapping.
    fn buffered(&self) -> Vec<TimeRange>;

    /// True once playback reached the end of the media.
    fn ended(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// True while a user-initiated seek is in flight.
    fn seeking(&self) -> bool;

    /// True when the user paused playback. A paused playhead is not a stall.
    fn paused(&self) -> bool {
        false
    }
}
