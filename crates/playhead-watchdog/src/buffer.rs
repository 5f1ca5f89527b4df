//! Buffered-range helpers.
//!
//! Playback engines expose what they hold as an ordered list of time ranges.
//! The watchdog needs two questions answered about that list: is a position
//! inside a range, and how much contiguous media lies ahead of it once small
//! holes are ignored.

/// A half-open buffered time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the range in seconds.
    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Contiguous buffer around a playback position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferInfo {
    /// Seconds of media buffered ahead of the position.
    pub len: f64,
    /// Start of the range holding the position (the position itself if unbuffered).
    pub start: f64,
    /// End of the range holding the position (the position itself if unbuffered).
    pub end: f64,
    /// Start of the next range beyond the position, if one exists.
    pub next_start: Option<f64>,
}

impl BufferInfo {
    /// True when at least some media is buffered ahead of the position.
    pub fn is_buffered(&self) -> bool {
        self.len > 0.0
    }
}

/// Returns true if `position` falls inside any range (end inclusive).
pub fn is_buffered(ranges: &[TimeRange], position: f64) -> bool {
    ranges
        .iter()
        .any(|range| position >= range.start && position <= range.end)
}

/// Computes the contiguous buffer ahead of `position`.
///
/// Ranges separated by less than `max_hole` are merged first, so a playhead
/// sitting just before a range (within `max_hole`) counts as buffered.
pub fn buffer_info(ranges: &[TimeRange], position: f64, max_hole: f64) -> BufferInfo {
    let mut sorted: Vec<TimeRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(prev) if range.start - prev.end < max_hole => {
                prev.end = prev.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }

    let mut info = BufferInfo {
        len: 0.0,
        start: position,
        end: position,
        next_start: None,
    };

    for range in &merged {
        if position + max_hole >= range.start && position < range.end {
            info.start = range.start;
            info.end = range.end;
            info.len = range.end - position;
        } else if position + max_hole < range.start {
            info.next_start = Some(range.start);
            break;
        }
    }

    info
}
