//! Playback stall detection and recovery.
//!
//! [`StallWatchdog::poll`] is called on a fixed cadence by whoever drives
//! playback. Each call compares the playhead with the previous poll and, when
//! it has not moved although it should have, walks the stall state machine:
//!
//! ```text
//! moved?  ── yes ──> reset episode (log recovery if it was reported)
//!   │ no
//! exempt? ── yes ──> nothing to judge (ended, empty buffer, not ready, ...)
//!   │ no
//! timer armed? ── no ──> arm it, wait one poll
//!   │ yes
//! stalled >= 1s ──> report once per episode
//!   │
//! partial fragment at playhead ──> seek over the hole
//!   │ else
//! buffer ahead > 0.5s and stalled > watchdog period ──> nudge / give up
//! ```
//!
//! The report is debounced but fix attempts are not, so short holes are
//! skipped on the first poll after the stall is confirmed.

use std::time::{Duration, Instant};

use crate::buffer::{self, BufferInfo, TimeRange};
use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::engine::PlaybackEngine;
use crate::error::ConfigError;
use crate::events::{EventSink, MediaEvent};
use crate::fragment::{Fragment, FragmentLookup};
use crate::stats::WatchdogStats;

/// Minimum stalled time before a stall is reported.
pub const STALL_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Buffer ahead of the playhead (seconds) above which a stall is nudged.
/// Some engines stop slightly before the end of a buffered range, so smaller
/// values are not treated as a stall inside a populated buffer.
pub const JUMP_THRESHOLD: f64 = 0.5;

/// Minimum forward step when seeking over a hole.
pub const SKIP_BUFFER_HOLE_STEP: f64 = 0.1;

/// Why a poll made no stall judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExemptReason {
    /// Playback reached the end of the media
    Ended,
    /// Nothing is buffered at all
    NothingBuffered,
    /// The engine has no frame data yet
    NotReady,
    /// The user paused playback
    Paused,
    /// A seek is in flight and its target is already buffered
    SeekingBuffered,
}

/// Corrective action taken during a stalled poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixAction {
    /// Nothing applicable this poll; waiting
    None,
    /// Seeked over a hole left by a partial fragment
    SkippedHole { from: f64, to: f64 },
    /// Nudged the playhead forward
    Nudged { from: f64, to: f64, attempt: u32 },
    /// Nudge retries exhausted; a fatal stall was emitted
    GaveUp,
}

/// Result of a single [`StallWatchdog::poll`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    /// The playhead advanced since the previous poll
    Moving,
    /// The playhead advanced again after a reported stall
    Recovered { stalled_for: Duration },
    /// Not moving, but no stall judgement applies
    Exempt(ExemptReason),
    /// Not moving; stall timer armed this poll
    StallDetected,
    /// Not moving for `stalled_for`; `action` is what was tried
    Stalled {
        stalled_for: Duration,
        action: FixAction,
    },
}

/// State of the current stall episode, from first non-moving poll to movement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StallEpisode {
    /// Start of the current measurement window. Cleared by a hole skip or
    /// before a nudge so the debounce restarts.
    since: Option<Instant>,
    /// Stall notification already emitted for this episode
    reported: bool,
    /// Nudges attempted in this episode
    nudge_retry: u32,
}

/// Watches the playhead of one playback session.
pub struct StallWatchdog<C, F, S> {
    config: WatchdogConfig,
    clock: C,
    fragments: F,
    sink: S,
    /// `None` while playback is advancing.
    episode: Option<StallEpisode>,
    stats: WatchdogStats,
}

impl<C: Clock, F: FragmentLookup, S: EventSink> StallWatchdog<C, F, S> {
    /// Creates a watchdog, rejecting unusable configuration.
    pub fn new(
        config: WatchdogConfig,
        clock: C,
        fragments: F,
        sink: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            fragments,
            sink,
            episode: None,
            stats: WatchdogStats::default(),
        })
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn fragments(&self) -> &F {
        &self.fragments
    }

    /// Mutable access to the fragment lookup, e.g. to feed a tracker.
    pub fn fragments_mut(&mut self) -> &mut F {
        &mut self.fragments
    }

    /// True while a stall measurement window is running.
    pub fn is_stalled(&self) -> bool {
        self.episode.is_some_and(|ep| ep.since.is_some())
    }

    /// True once the current episode has been reported.
    pub fn stall_reported(&self) -> bool {
        self.episode.is_some_and(|ep| ep.reported)
    }

    /// Nudges attempted in the current episode.
    pub fn nudge_retry(&self) -> u32 {
        self.episode.map_or(0, |ep| ep.nudge_retry)
    }

    pub fn stats(&self) -> WatchdogStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = WatchdogStats::default();
    }

    /// Forgets the current episode without logging a recovery.
    ///
    /// Use when the media source changes under the watchdog.
    pub fn reset(&mut self) {
        self.episode = None;
    }

    /// Checks the playhead once.
    ///
    /// `previous_position` is the playhead observed at the previous poll.
    pub fn poll<E: PlaybackEngine + ?Sized>(
        &mut self,
        previous_position: f64,
        engine: &mut E,
    ) -> PollOutcome {
        let position = engine.position();
        let now = self.clock.now();
        let stalled_for = self
            .episode
            .and_then(|ep| ep.since)
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));

        if position != previous_position {
            return self.on_moved(position, stalled_for);
        }

        let buffered = engine.buffered();
        if let Some(reason) = exemption(&*engine, &buffered, position) {
            return PollOutcome::Exempt(reason);
        }

        let info = buffer::buffer_info(&buffered, position, self.config.max_buffer_hole);

        if self.episode.is_none() {
            self.stats.stalls_detected += 1;
            tracing::debug!(
                "Playhead not moving @{:.3} (buffer ahead {:.3}s)",
                position,
                info.len
            );
        }
        let episode = self.episode.get_or_insert_with(StallEpisode::default);
        if episode.since.is_none() {
            // Give the engine one poll of grace before judging.
            episode.since = Some(now);
            return PollOutcome::StallDetected;
        }

        if stalled_for >= STALL_DEBOUNCE {
            self.report_stall(info.len);
        }

        let action = self.try_fix_buffer_stall(engine, &buffered, &info, position, stalled_for);
        PollOutcome::Stalled {
            stalled_for,
            action,
        }
    }

    fn on_moved(&mut self, position: f64, stalled_for: Duration) -> PollOutcome {
        match self.episode.take() {
            Some(ep) if ep.reported => {
                let stalled_for = round_to_millis(stalled_for);
                tracing::warn!(
                    "Playback not stuck anymore @{:.3}, after {}ms",
                    position,
                    stalled_for.as_millis()
                );
                self.stats.recoveries += 1;
                self.stats.total_stalled += stalled_for;
                PollOutcome::Recovered { stalled_for }
            }
            _ => PollOutcome::Moving,
        }
    }

    /// Emits the non-fatal stall notification once per episode.
    fn report_stall(&mut self, buffer_len: f64) {
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        if episode.reported {
            return;
        }
        episode.reported = true;
        self.stats.stalls_reported += 1;
        tracing::warn!("Playback stalling, {:.3}s buffered ahead", buffer_len);
        self.sink.emit(MediaEvent::stalled(buffer_len));
    }

    fn try_fix_buffer_stall<E: PlaybackEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        buffered: &[TimeRange],
        info: &BufferInfo,
        position: f64,
        stalled_for: Duration,
    ) -> FixAction {
        if let Some(frag) = self.fragments.partial_fragment(position) {
            if let Some(action) = self.try_skip_buffer_hole(engine, buffered, position, frag) {
                return action;
            }
        }

        if info.len > JUMP_THRESHOLD && stalled_for > self.config.high_buffer_watchdog() {
            tracing::warn!(
                "Stalled for {}ms with {:.3}s buffered, trying to nudge playhead",
                stalled_for.as_millis(),
                info.len
            );
            self.clear_stall_timer();
            return self.try_nudge_buffer(engine, position);
        }

        FixAction::None
    }

    /// Seeks past the gap in front of the playhead, if it sits in one.
    fn try_skip_buffer_hole<E: PlaybackEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        buffered: &[TimeRange],
        position: f64,
        frag: Fragment,
    ) -> Option<FixAction> {
        let mut last_end = 0.0;
        for range in buffered {
            if position >= last_end && position < range.start {
                // The step guarantees progress when range.start rounds to the position.
                let target = range.start.max(position + SKIP_BUFFER_HOLE_STEP);
                tracing::warn!(
                    "Fragment sn={} level={} has a buffer hole, seeking from {:.3} to {:.3}",
                    frag.sn,
                    frag.level,
                    position,
                    target
                );
                self.clear_stall_timer();
                engine.set_position(target);
                self.stats.holes_skipped += 1;
                self.sink
                    .emit(MediaEvent::seek_over_hole(frag, position, target));
                return Some(FixAction::SkippedHole {
                    from: position,
                    to: target,
                });
            }
            last_end = range.end;
        }
        None
    }

    fn try_nudge_buffer<E: PlaybackEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        position: f64,
    ) -> FixAction {
        let episode = self.episode.get_or_insert_with(StallEpisode::default);
        episode.nudge_retry += 1;
        let attempt = episode.nudge_retry;

        if attempt < self.config.nudge_max_retry {
            let target = position + f64::from(attempt) * self.config.nudge_offset;
            tracing::info!(
                "Nudging playhead from {:.3} to {:.3} (attempt {})",
                position,
                target,
                attempt
            );
            engine.set_position(target);
            self.stats.nudges += 1;
            self.sink.emit(MediaEvent::nudge_on_stall(position, target));
            FixAction::Nudged {
                from: position,
                to: target,
                attempt,
            }
        } else {
            let reason = format!(
                "still stuck in high buffer @{position} after {} nudges",
                self.config.nudge_max_retry
            );
            tracing::error!("Playback stall is unrecoverable: {}", reason);
            self.stats.fatal_stalls += 1;
            self.sink.emit(MediaEvent::stalled_fatal(reason));
            FixAction::GaveUp
        }
    }

    /// Restarts the measurement window; report flag and nudge count survive.
    fn clear_stall_timer(&mut self) {
        if let Some(episode) = self.episode.as_mut() {
            episode.since = None;
        }
    }
}

/// Conditions under which a motionless playhead is expected.
fn exemption<E: PlaybackEngine + ?Sized>(
    engine: &E,
    buffered: &[TimeRange],
    position: f64,
) -> Option<ExemptReason> {
    if engine.ended() {
        Some(ExemptReason::Ended)
    } else if buffered.is_empty() {
        Some(ExemptReason::NothingBuffered)
    } else if !engine.ready_state().has_current_data() {
        Some(ExemptReason::NotReady)
    } else if engine.paused() {
        Some(ExemptReason::Paused)
    } else if engine.seeking() && buffer::is_buffered(buffered, position) {
        Some(ExemptReason::SeekingBuffered)
    } else {
        None
    }
}

fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis((d.as_secs_f64() * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::ReadyState;
    use crate::events::{ErrorDetails, EventLog};

    struct FrozenEngine {
        position: f64,
        buffered: Vec<TimeRange>,
        ready_state: ReadyState,
        ended: bool,
        seeking: bool,
        paused: bool,
    }

    impl FrozenEngine {
        fn new(position: f64, buffered: &[(f64, f64)]) -> Self {
            Self {
                position,
                buffered: buffered
                    .iter()
                    .map(|&(s, e)| TimeRange::new(s, e))
                    .collect(),
                ready_state: ReadyState::HaveCurrentData,
                ended: false,
                seeking: false,
                paused: false,
            }
        }
    }

    impl PlaybackEngine for FrozenEngine {
        fn position(&self) -> f64 {
            self.position
        }
        fn set_position(&mut self, position: f64) {
            self.position = position;
        }
        fn buffered(&self) -> Vec<TimeRange> {
            self.buffered.clone()
        }
        fn ended(&self) -> bool {
            self.ended
        }
        fn ready_state(&self) -> ReadyState {
            self.ready_state
        }
        fn seeking(&self) -> bool {
            self.seeking
        }
        fn paused(&self) -> bool {
            self.paused
        }
    }

    fn no_partial(_: f64) -> Option<Fragment> {
        None
    }

    type TestWatchdog = StallWatchdog<ManualClock, fn(f64) -> Option<Fragment>, EventLog>;

    fn watchdog(config: WatchdogConfig) -> (TestWatchdog, ManualClock, EventLog) {
        let clock = ManualClock::new();
        let log = EventLog::new();
        let dog = StallWatchdog::new(
            config,
            clock.clone(),
            no_partial as fn(f64) -> Option<Fragment>,
            log.clone(),
        )
        .expect("valid config");
        (dog, clock, log)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = StallWatchdog::new(
            WatchdogConfig::default().with_nudge_max_retry(0),
            ManualClock::new(),
            no_partial as fn(f64) -> Option<Fragment>,
            EventLog::new(),
        );
        assert!(matches!(result, Err(ConfigError::ZeroNudgeRetries)));

        let result = StallWatchdog::new(
            WatchdogConfig::default().with_high_buffer_watchdog_period(1e20),
            ManualClock::new(),
            no_partial as fn(f64) -> Option<Fragment>,
            EventLog::new(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidWatchdogPeriod(_))
        ));
    }

    #[test]
    fn test_first_stall_poll_only_arms_timer() {
        let (mut dog, _clock, log) = watchdog(WatchdogConfig::default());
        let mut engine = FrozenEngine::new(3.0, &[(0.0, 10.0)]);

        assert_eq!(dog.poll(3.0, &mut engine), PollOutcome::StallDetected);
        assert!(dog.is_stalled());
        assert!(!dog.stall_reported());
        assert!(log.is_empty());
        assert_eq!(dog.stats().stalls_detected, 1);
    }

    #[test]
    fn test_movement_is_not_a_stall() {
        let (mut dog, _clock, log) = watchdog(WatchdogConfig::default());
        let mut engine = FrozenEngine::new(3.5, &[(0.0, 10.0)]);

        assert_eq!(dog.poll(3.0, &mut engine), PollOutcome::Moving);
        assert!(!dog.is_stalled());
        assert!(log.is_empty());
    }

    #[test]
    fn test_exemptions() {
        let (mut dog, _clock, _log) = watchdog(WatchdogConfig::default());

        let mut engine = FrozenEngine::new(3.0, &[(0.0, 10.0)]);
        engine.ended = true;
        assert_eq!(
            dog.poll(3.0, &mut engine),
            PollOutcome::Exempt(ExemptReason::Ended)
        );

        let mut engine = FrozenEngine::new(3.0, &[]);
        assert_eq!(
            dog.poll(3.0, &mut engine),
            PollOutcome::Exempt(ExemptReason::NothingBuffered)
        );

        let mut engine = FrozenEngine::new(3.0, &[(0.0, 10.0)]);
        engine.ready_state = ReadyState::HaveMetadata;
        assert_eq!(
            dog.poll(3.0, &mut engine),
            PollOutcome::Exempt(ExemptReason::NotReady)
        );

        let mut engine = FrozenEngine::new(3.0, &[(0.0, 10.0)]);
        engine.paused = true;
        assert_eq!(
            dog.poll(3.0, &mut engine),
            PollOutcome::Exempt(ExemptReason::Paused)
        );

        let mut engine = FrozenEngine::new(3.0, &[(0.0, 10.0)]);
        engine.seeking = true;
        assert_eq!(
            dog.poll(3.0, &mut engine),
            PollOutcome::Exempt(ExemptReason::SeekingBuffered)
        );

        assert!(!dog.is_stalled());
    }

    #[test]
    fn test_seeking_into_unbuffered_position_is_judged() {
        let (mut dog, _clock, _log) = watchdog(WatchdogConfig::default());
        let mut engine = FrozenEngine::new(15.0, &[(0.0, 10.0)]);
        engine.seeking = true;
        assert_eq!(dog.poll(15.0, &mut engine), PollOutcome::StallDetected);
    }

    #[test]
    fn test_report_is_debounced_and_emitted_once() {
        let (mut dog, clock, log) = watchdog(WatchdogConfig::default());
        let mut engine = FrozenEngine::new(10.0, &[(0.0, 10.0)]);

        dog.poll(10.0, &mut engine);
        clock.advance_ms(999);
        dog.poll(10.0, &mut engine);
        assert!(log.is_empty());

        clock.advance_ms(1);
        dog.poll(10.0, &mut engine);
        assert_eq!(log.count(ErrorDetails::BufferStalled), 1);
        assert!(dog.stall_reported());

        for _ in 0..5 {
            clock.advance_ms(500);
            dog.poll(10.0, &mut engine);
        }
        assert_eq!(log.len(), 1);
        assert_eq!(dog.stats().stalls_reported, 1);
    }

    #[test]
    fn test_recovery_resets_episode() {
        let (mut dog, clock, log) = watchdog(WatchdogConfig::default());
        let mut engine = FrozenEngine::new(10.0, &[(0.0, 10.0)]);

        dog.poll(10.0, &mut engine);
        clock.advance_ms(1200);
        dog.poll(10.0, &mut engine);
        assert!(dog.stall_reported());

        clock.advance_ms(300);
        engine.position = 10.2;
        assert_eq!(
            dog.poll(10.0, &mut engine),
            PollOutcome::Recovered {
                stalled_for: Duration::from_millis(1500)
            }
        );
        assert!(!dog.is_stalled());
        assert!(!dog.stall_reported());
        assert_eq!(dog.nudge_retry(), 0);
        assert_eq!(log.len(), 1);

        let stats = dog.stats();
        assert_eq!(stats.recoveries, 1);
        assert_eq!(stats.total_stalled, Duration::from_millis(1500));
    }

    #[test]
    fn test_round_to_millis() {
        assert_eq!(
            round_to_millis(Duration::from_micros(1_499_600)),
            Duration::from_millis(1500)
        );
        assert_eq!(
            round_to_millis(Duration::from_micros(1_499_400)),
            Duration::from_millis(1499)
        );
    }

    #[test]
    fn test_reset_drops_episode_silently() {
        let (mut dog, clock, _log) = watchdog(WatchdogConfig::default());
        let mut engine = FrozenEngine::new(10.0, &[(0.0, 10.0)]);
        dog.poll(10.0, &mut engine);
        clock.advance_ms(1500);
        dog.poll(10.0, &mut engine);
        assert!(dog.stall_reported());

        dog.reset();
        assert!(!dog.is_stalled());
        assert!(!dog.stall_reported());

        engine.position = 11.0;
        assert_eq!(dog.poll(10.0, &mut engine), PollOutcome::Moving);
        assert_eq!(dog.stats().recoveries, 0);

        dog.reset_stats();
        assert_eq!(dog.stats(), WatchdogStats::default());
    }
}
