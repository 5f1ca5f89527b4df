//! Notifications emitted by the watchdog.
//!
//! Every condition the watchdog detects is delivered as a [`MediaEvent`] to an
//! [`EventSink`]. Nothing is returned as an error to the caller.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::fragment::Fragment;

/// Broad category of a media event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MediaError,
}

/// Specific condition carried by a media event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDetails {
    /// Playback has not advanced for the debounce interval, or nudging gave up
    BufferStalled,
    /// The playhead was moved over a hole left by a partial fragment
    BufferSeekOverHole,
    /// The playhead was nudged forward inside a populated buffer
    BufferNudgeOnStall,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetails::BufferStalled => write!(f, "bufferStalledError"),
            ErrorDetails::BufferSeekOverHole => write!(f, "bufferSeekOverHole"),
            ErrorDetails::BufferNudgeOnStall => write!(f, "bufferNudgeOnStall"),
        }
    }
}

/// A structured notification.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub kind: ErrorKind,
    pub details: ErrorDetails,
    /// Advisory: the watchdog will not recover from this on its own.
    pub fatal: bool,
    /// Seconds buffered ahead of the playhead, for stall reports.
    pub buffer_len: Option<f64>,
    pub reason: Option<String>,
    /// Fragment responsible for a skipped hole.
    pub frag: Option<Fragment>,
}

impl MediaEvent {
    fn media(details: ErrorDetails, fatal: bool) -> Self {
        Self {
            kind: ErrorKind::MediaError,
            details,
            fatal,
            buffer_len: None,
            reason: None,
            frag: None,
        }
    }

    /// Non-fatal stall report.
    pub fn stalled(buffer_len: f64) -> Self {
        Self {
            buffer_len: Some(buffer_len),
            ..Self::media(ErrorDetails::BufferStalled, false)
        }
    }

    /// Terminal stall after nudging was exhausted.
    pub fn stalled_fatal(reason: String) -> Self {
        Self {
            reason: Some(reason),
            ..Self::media(ErrorDetails::BufferStalled, true)
        }
    }

    pub fn seek_over_hole(frag: Fragment, from: f64, to: f64) -> Self {
        Self {
            reason: Some(format!(
                "fragment loaded with buffer holes, seeking from {from} to {to}"
            )),
            frag: Some(frag),
            ..Self::media(ErrorDetails::BufferSeekOverHole, false)
        }
    }

    pub fn nudge_on_stall(from: f64, to: f64) -> Self {
        Self {
            reason: Some(format!("nudged playhead from {from} to {to}")),
            ..Self::media(ErrorDetails::BufferNudgeOnStall, false)
        }
    }
}

impl fmt::Display for MediaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{} (fatal: {})",
            self.kind, self.details, self.fatal
        )?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// Receiver of watchdog notifications.
pub trait EventSink {
    fn emit(&mut self, event: MediaEvent);
}

impl<F: FnMut(MediaEvent)> EventSink for F {
    fn emit(&mut self, event: MediaEvent) {
        self(event)
    }
}

/// Forwards events over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<MediaEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<MediaEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: MediaEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Media event dropped: receiver disconnected");
        }
    }
}

/// Shared in-memory recorder of emitted events.
///
/// Clones record into the same log, so one clone can be given to the
/// watchdog while another inspects what was emitted.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MediaEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far.
    pub fn events(&self) -> Vec<MediaEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns all recorded events.
    pub fn drain(&self) -> Vec<MediaEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of recorded events with the given details.
    pub fn count(&self, details: ErrorDetails) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.details == details)
            .count()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: MediaEvent) {
        self.events.lock().push(event);
    }
}
