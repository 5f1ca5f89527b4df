//! Simulated playback session supervised by the stall watchdog.
//!
//! A playback thread advances a fake engine in real time. The media has a hole
//! left by a partially appended fragment at 4.0s and the decoder freezes at
//! 8.0s. The main loop polls the watchdog every 100ms and prints the events it
//! emits.
//!
//! ```bash
//! RUST_LOG=playhead_watchdog=debug cargo run -p playhead-watchdog-demo
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use playhead_watchdog::{
    ChannelSink, Fragment, FragmentTracker, PlaybackEngine, PollOutcome, ReadyState,
    StallWatchdog, SystemClock, TimeRange, WatchdogConfig,
};

const MEDIA_DURATION: f64 = 12.0;
const FRAGMENT_DURATION: f64 = 2.0;
const DECODER_FREEZE_AT: f64 = 8.0;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PLAYBACK_TICK: Duration = Duration::from_millis(10);
/// Give up on the demo if playback has not finished by then.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOG_FILTER: &str = "playhead_watchdog=debug,playhead_watchdog_demo=debug";

/// Fake media element: plays through buffered ranges at 1x.
struct SimulatedPlayer {
    position: f64,
    buffered: Vec<TimeRange>,
    /// Decoder wedged until the next seek
    frozen: bool,
    froze_once: bool,
}

impl SimulatedPlayer {
    fn new(buffered: Vec<TimeRange>) -> Self {
        Self {
            position: 0.0,
            buffered,
            frozen: false,
            froze_once: false,
        }
    }

    fn advance(&mut self, dt: f64) {
        if self.frozen || self.position >= MEDIA_DURATION {
            return;
        }
        let Some(range) = self
            .buffered
            .iter()
            .find(|r| self.position >= r.start && self.position < r.end)
        else {
            // In a hole: the playhead waits for data that never comes.
            return;
        };

        let mut next = (self.position + dt).min(range.end);
        if !self.froze_once && self.position < DECODER_FREEZE_AT && next >= DECODER_FREEZE_AT {
            next = DECODER_FREEZE_AT;
            self.frozen = true;
            self.froze_once = true;
            tracing::info!("Simulated decoder freeze at {:.3}", next);
        }
        self.position = next;
    }
}

/// Engine handle shared between the playback thread and the watchdog.
#[derive(Clone)]
struct SharedPlayer(Arc<Mutex<SimulatedPlayer>>);

impl PlaybackEngine for SharedPlayer {
    fn position(&self) -> f64 {
        self.0.lock().position
    }

    fn set_position(&mut self, position: f64) {
        let mut player = self.0.lock();
        player.position = position;
        player.frozen = false;
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.0.lock().buffered.clone()
    }

    fn ended(&self) -> bool {
        self.0.lock().position >= MEDIA_DURATION
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::HaveEnoughData
    }

    fn seeking(&self) -> bool {
        false
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    // Fragment 2 (4.0..6.0) was appended with its first 0.3s missing.
    let buffered = vec![TimeRange::new(0.0, 4.0), TimeRange::new(4.3, MEDIA_DURATION)];

    let (tx, rx) = crossbeam_channel::unbounded();
    let config = WatchdogConfig::default().with_high_buffer_watchdog_period(1.0);
    let mut watchdog = match StallWatchdog::new(
        config,
        SystemClock,
        FragmentTracker::new(),
        ChannelSink::new(tx),
    ) {
        Ok(watchdog) => watchdog,
        Err(e) => {
            tracing::error!("Invalid watchdog configuration: {}", e);
            std::process::exit(1);
        }
    };

    let fragment_count = (MEDIA_DURATION / FRAGMENT_DURATION).ceil() as u64;
    for sn in 0..fragment_count {
        watchdog.fragments_mut().fragment_buffered(Fragment::new(
            sn,
            0,
            sn as f64 * FRAGMENT_DURATION,
            FRAGMENT_DURATION,
        ));
    }
    watchdog.fragments_mut().detect_partial_fragments(&buffered);

    let mut engine = SharedPlayer(Arc::new(Mutex::new(SimulatedPlayer::new(buffered))));
    let stop = Arc::new(AtomicBool::new(false));

    let playback = {
        let engine = engine.clone();
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let mut last = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(PLAYBACK_TICK);
                    let now = Instant::now();
                    engine.0.lock().advance((now - last).as_secs_f64());
                    last = now;
                }
            })
    };
    let playback = match playback {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to spawn playback thread: {}", e);
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    let mut last_position = engine.position();
    let mut gave_up = false;
    while !engine.ended() && !gave_up && started.elapsed() < SESSION_TIMEOUT {
        thread::sleep(POLL_INTERVAL);
        match watchdog.poll(last_position, &mut engine) {
            PollOutcome::Recovered { stalled_for } => {
                tracing::info!("Recovered after {}ms", stalled_for.as_millis());
            }
            PollOutcome::StallDetected => {
                tracing::info!("Playhead stopped @{:.3}", engine.position());
            }
            _ => {}
        }
        last_position = engine.position();

        for event in rx.try_iter() {
            if event.fatal {
                tracing::error!("{}", event);
                gave_up = true;
            } else {
                tracing::info!("{}", event);
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    if playback.join().is_err() {
        tracing::error!("Playback thread panicked");
    }

    let stats = watchdog.stats();
    tracing::info!(
        "Session finished @{:.3} in {:.1}s: {} stalls, {} reported, {} holes skipped, {} nudges, {} fatal",
        engine.position(),
        started.elapsed().as_secs_f64(),
        stats.stalls_detected,
        stats.stalls_reported,
        stats.holes_skipped,
        stats.nudges,
        stats.fatal_stalls
    );
    if let Some(mean) = stats.mean_stall() {
        tracing::info!(
            "{} recoveries, mean stall {}ms",
            stats.recoveries,
            mean.as_millis()
        );
    }
}
