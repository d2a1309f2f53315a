//! Edge capture engine
//!
//! Converts asynchronous edge events into mark/space durations and decides
//! when a burst is over by polling wall-clock time.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ BACKEND EVENT CONTEXT (sole writer)                              │
//! │   EdgeEvent → CaptureState::on_edge()                            │
//! │     last_tick         AtomicU64   anchor for the next interval   │
//! │     durations         SegQueue    one push per edge after first  │
//! │     last_activity_us  AtomicU64   Release store, after the push  │
//! │     recording         AtomicBool  Release store, first edge only │
//! └──────────────────────────────────────────────────────────────────┘
//!                          │ Acquire loads
//!                          ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ CALLER CONTEXT (reader)                                          │
//! │   loop every 10ms:                                               │
//! │     a. !recording && elapsed > timeout   → no signal             │
//! │     b.  recording && idle > gap          → burst complete        │
//! │     c.  elapsed > timeout                → ceiling               │
//! │   drain durations once, after the watch is released              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The callback never blocks: every write is an atomic store or a lock-free
//! queue push.

use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{Edge, EdgeEvent, EdgeWatch, GpioBackend};
use crate::error::{CaptureError, Result};
use crate::pin::{Level, PinConfig, PinMode};
use crate::tick::{tick_delta, Tick};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_GAP: Duration = Duration::from_millis(150);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timing bounds for one capture
///
/// # Example
/// ```
/// use irrecord::capture::CaptureConfig;
///
/// let config = CaptureConfig::from_secs(5.0, 0.15).unwrap();
/// assert_eq!(config.gap.as_millis(), 150);
/// assert!(CaptureConfig::from_secs(0.0, 0.15).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Longest wait for the first edge, and ceiling on the whole capture
    pub timeout: Duration,

    /// Silence after the latest edge that ends a started burst
    pub gap: Duration,

    /// Supervising loop cadence; termination is decided within one interval
    pub poll_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            gap: DEFAULT_GAP,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CaptureConfig {
    /// Build from seconds, rejecting non-positive or non-finite values
    pub fn from_secs(timeout_secs: f64, gap_secs: f64) -> Result<Self> {
        let config = Self {
            timeout: positive_secs("timeout", timeout_secs)?,
            gap: positive_secs("gap", gap_secs)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "timeout must be positive".to_string(),
            ));
        }
        if self.gap.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "gap must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive_secs(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CaptureError::InvalidConfig(format!(
            "{} must be a positive number of seconds, got {}",
            name, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| CaptureError::InvalidConfig(format!("{} out of range: {}", name, e)))
}

/// Why the supervising loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No edge arrived before the timeout
    NoSignal,
    /// The line went quiet for the gap after recording started
    GapReached,
    /// The timeout elapsed while edges were still arriving
    Ceiling,
}

/// Result of one capture with its diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Burst {
    /// Microsecond intervals, mark first; empty when nothing was seen
    pub durations: Vec<u32>,
    pub stop: StopReason,
    /// Level the line switched to on the first edge
    pub anchor_level: Option<Level>,
    pub elapsed: Duration,
}

const NO_TICK: u64 = u64::MAX;
const NO_LEVEL: u8 = 0;
const LEVEL_LOW: u8 = 1;
const LEVEL_HIGH: u8 = 2;

/// State shared by the edge callback (writer) and the capture loop (reader)
#[derive(Debug)]
pub struct CaptureState {
    started: Instant,
    recording: AtomicBool,
    last_tick: AtomicU64,
    anchor_level: AtomicU8,
    last_activity_us: AtomicU64,
    durations: SegQueue<u32>,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            recording: AtomicBool::new(false),
            last_tick: AtomicU64::new(NO_TICK),
            anchor_level: AtomicU8::new(NO_LEVEL),
            last_activity_us: AtomicU64::new(0),
            durations: SegQueue::new(),
        }
    }

    /// Edge callback body; must only be called from one context at a time
    pub fn on_edge(&self, event: EdgeEvent) {
        // watchdog pseudo-events carry no timing; inactivity is polled
        let Some(level) = event.level.level() else {
            return;
        };

        let previous = self.last_tick.swap(u64::from(event.tick), Ordering::AcqRel);
        if previous == NO_TICK {
            self.anchor_level.store(
                match level {
                    Level::Low => LEVEL_LOW,
                    Level::High => LEVEL_HIGH,
                },
                Ordering::Relaxed,
            );
            self.touch();
            self.recording.store(true, Ordering::Release);
            return;
        }

        self.durations.push(tick_delta(previous as Tick, event.tick));
        self.touch();
    }

    fn touch(&self) {
        let now_us = self.started.elapsed().as_micros() as u64;
        self.last_activity_us.store(now_us, Ordering::Release);
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Time since the latest edge as seen at `now`
    pub fn idle_for(&self, now: Instant) -> Duration {
        let last_us = self.last_activity_us.load(Ordering::Acquire);
        let last = self.started + Duration::from_micros(last_us);
        now.saturating_duration_since(last)
    }

    pub fn anchor_level(&self) -> Option<Level> {
        match self.anchor_level.load(Ordering::Relaxed) {
            LEVEL_LOW => Some(Level::Low),
            LEVEL_HIGH => Some(Level::High),
            _ => None,
        }
    }

    /// Durations recorded so far, in arrival order
    pub fn take_durations(&self) -> Vec<u32> {
        let mut durations = Vec::with_capacity(self.durations.len());
        while let Some(duration) = self.durations.pop() {
            durations.push(duration);
        }
        durations
    }
}

/// Apply the exit rules against `state` until one fires
fn supervise(
    state: &CaptureState,
    watch: &EdgeWatch,
    config: &CaptureConfig,
) -> Result<StopReason> {
    loop {
        watch.health()?;

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.started());

        if !state.is_recording() {
            if elapsed > config.timeout {
                return Ok(StopReason::NoSignal);
            }
        } else {
            if state.idle_for(now) > config.gap {
                return Ok(StopReason::GapReached);
            }
            if elapsed > config.timeout {
                return Ok(StopReason::Ceiling);
            }
        }

        thread::sleep(config.poll_interval);
    }
}

/// An armed capture: the shared state plus the edge registration feeding it
///
/// The registration lives exactly as long as the session. Every way out of
/// [`CaptureSession::run`], including errors, releases it.
#[derive(Debug)]
pub struct CaptureSession {
    state: Arc<CaptureState>,
    watch: EdgeWatch,
}

impl CaptureSession {
    /// Configure the pin and register the both-edge callback
    pub fn arm<B: GpioBackend + ?Sized>(backend: &B, pin: &PinConfig) -> Result<Self> {
        backend.set_mode(pin.pin(), PinMode::Input)?;
        backend.set_pull(pin.pin(), pin.pull())?;

        let state = Arc::new(CaptureState::new());
        let writer = Arc::clone(&state);
        let watch = backend.watch(
            pin.pin(),
            Edge::Either,
            Arc::new(move |event| writer.on_edge(event)),
        )?;

        Ok(Self { state, watch })
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Supervise until an exit rule fires, then release the registration
    pub fn run(self, config: &CaptureConfig) -> Result<Burst> {
        let CaptureSession { state, watch } = self;

        let stop = supervise(&state, &watch, config)?;
        watch.cancel()?;

        Ok(Burst {
            durations: state.take_durations(),
            stop,
            anchor_level: state.anchor_level(),
            elapsed: state.started().elapsed(),
        })
    }
}

/// Records bursts from one pin through a backend
///
/// # Example
///
/// ```
/// use irrecord::backend::sim::{pulse_train, SimBackend};
/// use irrecord::capture::EdgeCaptureEngine;
/// use irrecord::pin::{Level, Pin, PinConfig};
///
/// let sim = SimBackend::new();
/// let pin = Pin::new(17).unwrap();
/// sim.queue_train(pin, pulse_train(Level::Low, 0, &[9000, 4500, 560]));
///
/// let engine = EdgeCaptureEngine::new(sim, PinConfig::new(pin, true));
/// let pulses = engine.record_single(1.0, 0.05).unwrap();
/// assert_eq!(pulses, vec![9000, 4500, 560]);
/// ```
#[derive(Debug)]
pub struct EdgeCaptureEngine<B> {
    backend: B,
    pin: PinConfig,
}

impl<B: GpioBackend> EdgeCaptureEngine<B> {
    pub fn new(backend: B, pin: PinConfig) -> Self {
        Self { backend, pin }
    }

    pub fn pin(&self) -> &PinConfig {
        &self.pin
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Record one burst; an empty result means no signal before the timeout
    pub fn record_single(&self, timeout_secs: f64, gap_secs: f64) -> Result<Vec<u32>> {
        let config = CaptureConfig::from_secs(timeout_secs, gap_secs)?;
        Ok(self.record(&config)?.durations)
    }

    /// Record one burst with full diagnostics
    pub fn record(&self, config: &CaptureConfig) -> Result<Burst> {
        config.validate()?;

        tracing::debug!(
            "Arming capture on GPIO {} (timeout {:?}, gap {:?})",
            self.pin.pin(),
            config.timeout,
            config.gap
        );
        let burst = CaptureSession::arm(&self.backend, &self.pin)?.run(config)?;

        if let Some(level) = burst.anchor_level {
            if !burst.durations.is_empty() && !self.pin.polarity().starts_mark(level) {
                tracing::warn!(
                    "Burst on GPIO {} began with a {:?} transition; with {:?} polarity the first duration is a space",
                    self.pin.pin(),
                    level,
                    self.pin.polarity()
                );
            }
        }

        tracing::debug!(
            "Capture on GPIO {} stopped ({:?}) after {:?} with {} durations",
            self.pin.pin(),
            burst.stop,
            burst.elapsed,
            burst.durations.len()
        );
        Ok(burst)
    }
}

/// Clean up raw durations before export
///
/// Currently a copy. Protocol-specific fixes such as merging spurious short
/// gaps belong here.
pub fn normalize_pulses(pulses: &[u32]) -> Vec<u32> {
    pulses.to_vec()
}
