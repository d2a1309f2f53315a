//! In-process simulated GPIO line
//!
//! Stands in for the daemon when no hardware is attached. Edges carry
//! explicit ticks, so wraparound and exact interval values can be driven
//! directly. Handlers run on whichever thread injects the event, which keeps
//! the two-context shape of a real interrupt source.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::{Edge, EdgeEvent, EdgeHandler, EdgeWatch, GpioBackend, WatchHandle};
use crate::error::{CaptureError, Result};
use crate::pin::{Level, Pin, PinMode, Pull};
use crate::tick::Tick;

/// Delay between registration and playback of a queued train
pub const TRAIN_DELAY: Duration = Duration::from_millis(5);

struct SimWatcher {
    id: u64,
    pin: Pin,
    edge: Edge,
    handler: EdgeHandler,
    fault: Arc<AtomicBool>,
}

struct SimInner {
    available: AtomicBool,
    next_id: AtomicU64,
    watchers: RwLock<Vec<SimWatcher>>,
    modes: Mutex<HashMap<Pin, PinMode>>,
    pulls: Mutex<HashMap<Pin, Pull>>,
    trains: Mutex<HashMap<Pin, VecDeque<Vec<EdgeEvent>>>>,
}

/// Simulated edge-interrupt service; clones share the same line state
#[derive(Clone)]
pub struct SimBackend {
    inner: Arc<SimInner>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBackend").finish()
    }
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimInner {
                available: AtomicBool::new(true),
                next_id: AtomicU64::new(0),
                watchers: RwLock::new(Vec::new()),
                modes: Mutex::new(HashMap::new()),
                pulls: Mutex::new(HashMap::new()),
                trains: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Make every backend call fail as if the service were down
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Deliver a transition to `level` at `tick`; returns the number of handlers invoked
    pub fn inject(&self, pin: Pin, level: Level, tick: Tick) -> usize {
        self.deliver(pin, EdgeEvent::edge(level, tick))
    }

    pub fn inject_watchdog(&self, pin: Pin, tick: Tick) -> usize {
        self.deliver(pin, EdgeEvent::watchdog(tick))
    }

    /// Handlers run under the registry read lock, so a cancel blocks until
    /// every in-flight delivery has returned.
    pub fn deliver(&self, pin: Pin, event: EdgeEvent) -> usize {
        let watchers = self.read_watchers();
        let mut delivered = 0;
        for watcher in watchers.iter().filter(|w| w.pin == pin) {
            if event.level.level().map_or(true, |l| watcher.edge.matches(l)) {
                (watcher.handler)(event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Play `events` shortly after the next registration on `pin`
    ///
    /// Trains are consumed one per registration, in order. An empty train
    /// makes that registration see a silent line.
    pub fn queue_train(&self, pin: Pin, events: Vec<EdgeEvent>) {
        self.inner
            .trains
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(pin)
            .or_default()
            .push_back(events);
    }

    pub fn active_watches(&self, pin: Pin) -> usize {
        self.read_watchers().iter().filter(|w| w.pin == pin).count()
    }

    /// Mark every registration on `pin` as broken
    pub fn break_watches(&self, pin: Pin) -> usize {
        let watchers = self.read_watchers();
        let mut broken = 0;
        for watcher in watchers.iter().filter(|w| w.pin == pin) {
            watcher.fault.store(true, Ordering::Release);
            broken += 1;
        }
        broken
    }

    pub fn mode(&self, pin: Pin) -> Option<PinMode> {
        self.inner
            .modes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&pin)
            .copied()
    }

    pub fn pull(&self, pin: Pin) -> Option<Pull> {
        self.inner
            .pulls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&pin)
            .copied()
    }

    /// Block until a handler is registered on `pin`
    pub fn wait_for_watch(&self, pin: Pin, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.active_watches(pin) > 0)
    }

    /// Block until no handler remains registered on `pin`
    pub fn wait_for_release(&self, pin: Pin, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.active_watches(pin) == 0)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    fn read_watchers(&self) -> RwLockReadGuard<'_, Vec<SimWatcher>> {
        self.inner
            .watchers
            .read()
            .unwrap_or_else(|p| p.into_inner())
    }

    fn write_watchers(&self) -> RwLockWriteGuard<'_, Vec<SimWatcher>> {
        self.inner
            .watchers
            .write()
            .unwrap_or_else(|p| p.into_inner())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(CaptureError::BackendUnavailable {
            addr: "sim".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulated backend offline",
            ),
        })
    }
}

impl GpioBackend for SimBackend {
    fn set_mode(&self, pin: Pin, mode: PinMode) -> Result<()> {
        self.ensure_available()?;
        self.inner
            .modes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(pin, mode);
        Ok(())
    }

    fn set_pull(&self, pin: Pin, pull: Pull) -> Result<()> {
        self.ensure_available()?;
        self.inner
            .pulls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(pin, pull);
        Ok(())
    }

    fn watch(&self, pin: Pin, edge: Edge, handler: EdgeHandler) -> Result<EdgeWatch> {
        self.ensure_available()?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let fault = Arc::new(AtomicBool::new(false));
        self.write_watchers().push(SimWatcher {
            id,
            pin,
            edge,
            handler,
            fault: Arc::clone(&fault),
        });

        let train = self
            .inner
            .trains
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get_mut(&pin)
            .and_then(VecDeque::pop_front);
        if let Some(events) = train {
            let backend = self.clone();
            thread::spawn(move || {
                thread::sleep(TRAIN_DELAY);
                for event in events {
                    backend.deliver(pin, event);
                }
            });
        }

        Ok(EdgeWatch::new(
            pin,
            Box::new(SimWatch {
                id,
                backend: self.clone(),
                fault,
            }),
        ))
    }
}

struct SimWatch {
    id: u64,
    backend: SimBackend,
    fault: Arc<AtomicBool>,
}

impl WatchHandle for SimWatch {
    fn cancel(&mut self) -> Result<()> {
        self.backend.write_watchers().retain(|w| w.id != self.id);
        Ok(())
    }

    fn health(&self) -> Result<()> {
        if self.fault.load(Ordering::Acquire) {
            return Err(CaptureError::StreamClosed(
                "simulated stream fault".to_string(),
            ));
        }
        Ok(())
    }
}

/// Edges for a pulse train starting at `start_tick`, one edge per boundary
///
/// `durations.len()` intervals produce `durations.len() + 1` edges with
/// alternating levels, the first being `first`. Ticks wrap like hardware.
pub fn pulse_train(first: Level, start_tick: Tick, durations: &[u32]) -> Vec<EdgeEvent> {
    let mut events = Vec::with_capacity(durations.len() + 1);
    let mut level = first;
    let mut tick = start_tick;
    events.push(EdgeEvent::edge(level, tick));
    for &duration in durations {
        tick = tick.wrapping_add(duration);
        level = level.toggled();
        events.push(EdgeEvent::edge(level, tick));
    }
    events
}
