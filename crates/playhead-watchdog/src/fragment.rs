//! Fragment bookkeeping.
//!
//! The watchdog only needs to ask "is the media at this position from a
//! fragment that was buffered incompletely?". [`FragmentTracker`] answers that
//! by comparing what was appended with what the engine reports as buffered.

use std::collections::BTreeMap;

use crate::buffer::TimeRange;

/// Slack around a fragment's bounds when matching a playback position.
const PARTIAL_LOOKUP_PADDING: f64 = 0.2;

/// Tolerance for a buffered range edge to count as covering a fragment edge.
/// Engines commonly trim a few milliseconds at fragment boundaries.
const COVERAGE_TOLERANCE: f64 = 0.05;

/// A media fragment (segment) of a rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Sequence number within the level.
    pub sn: u64,
    /// Quality level the fragment belongs to.
    pub level: u32,
    /// Presentation start in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl Fragment {
    pub fn new(sn: u64, level: u32, start: f64, duration: f64) -> Self {
        Self {
            sn,
            level,
            start,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    fn key(&self) -> (u32, u64) {
        (self.level, self.sn)
    }
}

/// Looks up the partially buffered fragment covering a position.
pub trait FragmentLookup {
    fn partial_fragment(&self, position: f64) -> Option<Fragment>;
}

impl<F: Fn(f64) -> Option<Fragment>> FragmentLookup for F {
    fn partial_fragment(&self, position: f64) -> Option<Fragment> {
        self(position)
    }
}

/// Buffering state of a tracked fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentState {
    /// Appended, not yet checked against the buffered ranges
    Appending,
    /// Some of the fragment's time span is missing from the buffer
    Partial,
    /// The whole time span is buffered
    Ok,
}

#[derive(Debug, Clone)]
struct TrackedFragment {
    frag: Fragment,
    state: FragmentState,
}

/// Tracks appended fragments and classifies them against buffered ranges.
#[derive(Debug, Default)]
pub struct FragmentTracker {
    fragments: BTreeMap<(u32, u64), TrackedFragment>,
}

impl FragmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fragment whose data was handed to the engine.
    pub fn fragment_buffered(&mut self, frag: Fragment) {
        self.fragments.insert(
            frag.key(),
            TrackedFragment {
                frag,
                state: FragmentState::Appending,
            },
        );
    }

    /// Re-evaluates every tracked fragment against the engine's buffered ranges.
    ///
    /// Fragments with no buffered data left are forgotten (evicted).
    pub fn detect_partial_fragments(&mut self, buffered: &[TimeRange]) {
        self.fragments.retain(|_, tracked| {
            let frag = &tracked.frag;
            let overlaps = buffered
                .iter()
                .any(|r| r.start < frag.end() && r.end > frag.start);
            if !overlaps {
                tracing::debug!(
                    "Fragment sn={} level={} evicted from buffer",
                    frag.sn,
                    frag.level
                );
                return false;
            }

            let covered = buffered.iter().any(|r| {
                r.start <= frag.start + COVERAGE_TOLERANCE
                    && r.end >= frag.end() - COVERAGE_TOLERANCE
            });
            let state = if covered {
                FragmentState::Ok
            } else {
                FragmentState::Partial
            };
            if state == FragmentState::Partial && tracked.state != FragmentState::Partial {
                tracing::warn!(
                    "Fragment sn={} level={} [{:.3}, {:.3}] is partially buffered",
                    frag.sn,
                    frag.level,
                    frag.start,
                    frag.end()
                );
            }
            tracked.state = state;
            true
        });
    }

    /// State of a tracked fragment.
    pub fn state(&self, frag: &Fragment) -> Option<FragmentState> {
        self.fragments.get(&frag.key()).map(|t| t.state)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Forgets every fragment (new media or level switch flush).
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

impl FragmentLookup for FragmentTracker {
    fn partial_fragment(&self, position: f64) -> Option<Fragment> {
        let mut best: Option<(&Fragment, f64)> = None;
        for tracked in self.fragments.values() {
            if tracked.state != FragmentState::Partial {
                continue;
            }
            let start = tracked.frag.start - PARTIAL_LOOKUP_PADDING;
            let end = tracked.frag.end() + PARTIAL_LOOKUP_PADDING;
            if position < start || position > end {
                continue;
            }
            // Prefer the fragment the position sits most centrally in.
            let margin = (position - start).min(end - position);
            if best.map_or(true, |(_, m)| margin >= m) {
                best = Some((&tracked.frag, margin));
            }
        }
        best.map(|(frag, _)| frag.clone())
    }
}
