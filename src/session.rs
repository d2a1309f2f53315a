//! Multi-burst capture sessions
//!
//! Runs the capture engine several times in a row so the operator can press
//! a button more than once and keep the cleanest burst. Empty bursts are
//! reported and skipped; backend faults end the session.

use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::backend::GpioBackend;
use crate::capture::{normalize_pulses, CaptureConfig, EdgeCaptureEngine};
use crate::error::CaptureError;

/// Settle time between bursts (switch bounce, receiver AGC recovery)
pub const DEFAULT_INTER_BURST_PAUSE: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No bursts captured ({attempted} attempted)")]
    NoBursts { attempted: usize },

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl SessionError {
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, SessionError::Capture(e) if e.is_backend_unavailable())
    }
}

/// Session parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    bursts: usize,
    pub capture: CaptureConfig,
    pub pause: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bursts: 1,
            capture: CaptureConfig::default(),
            pause: DEFAULT_INTER_BURST_PAUSE,
        }
    }
}

impl SessionConfig {
    /// `bursts` below 1 is raised to 1
    pub fn new(bursts: usize, capture: CaptureConfig) -> Self {
        Self {
            bursts: bursts.max(1),
            capture,
            ..Self::default()
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn bursts(&self) -> usize {
        self.bursts
    }
}

/// Progress notifications; all methods default to doing nothing
pub trait SessionObserver {
    fn burst_started(&mut self, _index: usize, _total: usize) {}

    fn burst_captured(&mut self, _index: usize, _durations: &[u32]) {}

    fn burst_empty(&mut self, _index: usize) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default)]
pub struct SilentObserver;

impl SessionObserver for SilentObserver {}

/// Picks one of several captured bursts
///
/// Only consulted when more than one burst was captured. Out-of-range
/// answers fall back to the first burst.
pub trait BurstChooser {
    fn choose(&mut self, candidates: &[Vec<u32>]) -> usize;
}

impl<F> BurstChooser for F
where
    F: FnMut(&[Vec<u32>]) -> usize,
{
    fn choose(&mut self, candidates: &[Vec<u32>]) -> usize {
        self(candidates)
    }
}

/// What a successful session produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub candidates: Vec<Vec<u32>>,
    pub chosen: usize,
    pub attempted: usize,
}

impl SessionOutcome {
    pub fn chosen_pulses(&self) -> &[u32] {
        &self.candidates[self.chosen]
    }

    /// The chosen burst, normalized for export
    pub fn into_pulses(mut self) -> Vec<u32> {
        normalize_pulses(&self.candidates.swap_remove(self.chosen))
    }
}

/// Sequential burst capture over one engine
pub struct BurstSession<'a, B> {
    engine: &'a EdgeCaptureEngine<B>,
    config: SessionConfig,
}

impl<'a, B: GpioBackend> BurstSession<'a, B> {
    pub fn new(engine: &'a EdgeCaptureEngine<B>, config: SessionConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Capture every burst and return the non-empty ones in order
    pub fn capture(
        &self,
        observer: &mut dyn SessionObserver,
    ) -> Result<Vec<Vec<u32>>, CaptureError> {
        let total = self.config.bursts();
        let mut candidates = Vec::new();

        for index in 0..total {
            if index > 0 {
                thread::sleep(self.config.pause);
            }

            observer.burst_started(index, total);
            let burst = self.engine.record(&self.config.capture)?;
            if burst.durations.is_empty() {
                tracing::info!("Burst {}/{}: no signal ({:?})", index + 1, total, burst.stop);
                observer.burst_empty(index);
            } else {
                tracing::info!(
                    "Burst {}/{}: {} durations ({:?})",
                    index + 1,
                    total,
                    burst.durations.len(),
                    burst.stop
                );
                observer.burst_captured(index, &burst.durations);
                candidates.push(burst.durations);
            }
        }

        Ok(candidates)
    }

    /// Capture, then select one burst
    pub fn run(
        &self,
        observer: &mut dyn SessionObserver,
        chooser: &mut dyn BurstChooser,
    ) -> Result<SessionOutcome, SessionError> {
        let candidates = self.capture(observer)?;
        let attempted = self.config.bursts();

        let chosen = match candidates.len() {
            0 => return Err(SessionError::NoBursts { attempted }),
            1 => 0,
            n => {
                let picked = chooser.choose(&candidates);
                if picked < n {
                    picked
                } else {
                    tracing::debug!("Burst choice {} out of range, using 0", picked);
                    0
                }
            }
        };

        Ok(SessionOutcome {
            candidates,
            chosen,
            attempted,
        })
    }
}
