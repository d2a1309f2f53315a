//! GPIO backends delivering edge events to the capture engine
//!
//! A backend configures pins and invokes a registered handler from its own
//! execution context (a notification reader thread for `pigpiod`, the
//! injecting thread for `sim`). Handlers must return immediately.
//!
//! Registrations are scoped: [`GpioBackend::watch`] returns an [`EdgeWatch`]
//! guard and the handler stays registered exactly as long as the guard lives.

pub mod pigpiod;
pub mod sim;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::pin::{Level, Pin, PinMode, Pull};
use crate::tick::Tick;

/// Level reported with an edge event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLevel {
    Low,
    High,
    /// No transition: the backend's watchdog noticed a quiet line
    WatchdogTimeout,
}

impl EdgeLevel {
    /// The line level, or `None` for a watchdog pseudo-event
    pub fn level(self) -> Option<Level> {
        match self {
            EdgeLevel::Low => Some(Level::Low),
            EdgeLevel::High => Some(Level::High),
            EdgeLevel::WatchdogTimeout => None,
        }
    }
}

impl From<Level> for EdgeLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => EdgeLevel::Low,
            Level::High => EdgeLevel::High,
        }
    }
}

/// One notification from the backend; consumed immediately by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub level: EdgeLevel,
    pub tick: Tick,
}

impl EdgeEvent {
    pub fn edge(level: Level, tick: Tick) -> Self {
        Self {
            level: level.into(),
            tick,
        }
    }

    pub fn watchdog(tick: Tick) -> Self {
        Self {
            level: EdgeLevel::WatchdogTimeout,
            tick,
        }
    }
}

/// Transition direction a handler is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Either,
}

impl Edge {
    /// Whether a transition to `level` should be delivered
    pub fn matches(self, level: Level) -> bool {
        match self {
            Edge::Rising => level == Level::High,
            Edge::Falling => level == Level::Low,
            Edge::Either => true,
        }
    }
}

/// Callback invoked from the backend's event context
pub type EdgeHandler = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// Hardware edge-interrupt service
pub trait GpioBackend: Send + Sync {
    fn set_mode(&self, pin: Pin, mode: PinMode) -> Result<()>;

    fn set_pull(&self, pin: Pin, pull: Pull) -> Result<()>;

    /// Register `handler` for transitions on `pin`
    fn watch(&self, pin: Pin, edge: Edge, handler: EdgeHandler) -> Result<EdgeWatch>;
}

/// Backend-specific half of an edge registration
pub trait WatchHandle: Send {
    /// Deregister the handler; no events are delivered after this returns
    fn cancel(&mut self) -> Result<()>;

    /// Fails once the event source behind the registration has broken
    fn health(&self) -> Result<()>;
}

/// Scoped edge registration; dropping it releases the handler
pub struct EdgeWatch {
    pin: Pin,
    handle: Option<Box<dyn WatchHandle>>,
}

impl EdgeWatch {
    pub fn new(pin: Pin, handle: Box<dyn WatchHandle>) -> Self {
        Self {
            pin,
            handle: Some(handle),
        }
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Ok while events can still arrive
    pub fn health(&self) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.health(),
            None => Ok(()),
        }
    }

    /// Release the registration, reporting any deregistration failure
    pub fn cancel(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => handle.cancel(),
            None => Ok(()),
        }
    }
}

impl Drop for EdgeWatch {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to release edge watch on GPIO {}: {}", self.pin, e);
        }
    }
}

impl fmt::Debug for EdgeWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeWatch")
            .field("pin", &self.pin)
            .field("active", &self.handle.is_some())
            .finish()
    }
}
