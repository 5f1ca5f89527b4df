//! playhead-watchdog: playback stall detection and recovery.
//!
//! A media engine can stop advancing its playhead while it is expected to play:
//! the buffer ran dry, a fragment was appended with a hole in it, or the decoder
//! simply got stuck inside buffered media. [`StallWatchdog`] is polled on a
//! fixed cadence, notices the playhead is not moving, reports the stall once,
//! and tries to get playback going again:
//!
//! - seek over a hole left by a partially buffered fragment
//! - nudge the playhead forward in growing steps
//! - give up with a fatal stall event once nudging is exhausted
//!
//! The crate owns no timers or threads. The engine, clock, fragment lookup and
//! event sink are injected:
//!
//! - Engine: [`engine::PlaybackEngine`]
//! - Time: [`clock::Clock`] ([`clock::SystemClock`], [`clock::ManualClock`])
//! - Fragments: [`fragment::FragmentLookup`] ([`fragment::FragmentTracker`])
//! - Notifications: [`events::EventSink`] ([`events::ChannelSink`], [`events::EventLog`])
//!
//! # Example
//!
//! ```ignore
//! use playhead_watchdog::{EventLog, FragmentTracker, StallWatchdog, SystemClock, WatchdogConfig};
//!
//! let log = EventLog::new();
//! let mut watchdog = StallWatchdog::new(
//!     WatchdogConfig::default(),
//!     SystemClock,
//!     FragmentTracker::new(),
//!     log.clone(),
//! )?;
//!
//! // Every tick of the player loop:
//! let outcome = watchdog.poll(last_position, &mut engine);
//! last_position = engine.position();
//! ```

pub mod buffer;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fragment;
pub mod stats;
pub mod watchdog;

pub use buffer::{BufferInfo, TimeRange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WatchdogConfig;
pub use engine::{PlaybackEngine, ReadyState};
pub use error::ConfigError;
pub use events::{ChannelSink, ErrorDetails, ErrorKind, EventLog, EventSink, MediaEvent};
pub use fragment::{Fragment, FragmentLookup, FragmentState, FragmentTracker};
pub use stats::WatchdogStats;
pub use watchdog::{
    ExemptReason, FixAction, PollOutcome, StallWatchdog, JUMP_THRESHOLD, SKIP_BUFFER_HOLE_STEP,
    STALL_DEBOUNCE,
};
