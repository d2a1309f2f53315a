//! GPIO pin identity and electrical configuration

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CaptureError, Result};

/// Highest BCM pin number reported by the level notification stream (bank 1)
pub const MAX_GPIO: u8 = 31;

/// A validated BCM GPIO number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Pin(u8);

impl Pin {
    pub fn new(gpio: u32) -> Result<Self> {
        if gpio > u32::from(MAX_GPIO) {
            return Err(CaptureError::InvalidPin(gpio));
        }
        Ok(Self(gpio as u8))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Bit for this pin in a bank-1 level bitmask
    pub fn mask(self) -> u32 {
        1 << self.0
    }
}

impl TryFrom<u32> for Pin {
    type Error = CaptureError;

    fn try_from(gpio: u32) -> Result<Self> {
        Pin::new(gpio)
    }
}

impl From<Pin> for u32 {
    fn from(pin: Pin) -> u32 {
        u32::from(pin.0)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logic level of the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bit(set: bool) -> Self {
        if set {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Pin direction (pigpio mode codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

impl PinMode {
    pub fn code(self) -> u32 {
        match self {
            PinMode::Input => 0,
            PinMode::Output => 1,
        }
    }
}

/// Internal pull resistor setting (pigpio PUD codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Down,
    Up,
}

impl Pull {
    pub fn code(self) -> u32 {
        match self {
            Pull::Off => 0,
            Pull::Down => 1,
            Pull::Up => 2,
        }
    }
}

/// Which line level corresponds to an active IR mark
///
/// Most demodulating receivers idle high and pull the line low while the
/// carrier is present, which is `ActiveLow` (the "invert" setting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    pub fn from_invert(invert: bool) -> Self {
        if invert {
            Polarity::ActiveLow
        } else {
            Polarity::ActiveHigh
        }
    }

    /// Level the line sits at during a mark
    pub fn mark_level(self) -> Level {
        match self {
            Polarity::ActiveLow => Level::Low,
            Polarity::ActiveHigh => Level::High,
        }
    }

    /// True when an edge to `level` begins a mark
    pub fn starts_mark(self, level: Level) -> bool {
        level == self.mark_level()
    }
}

/// Pin configuration for one capture engine; fixed for the engine's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pin: Pin,
    polarity: Polarity,
    pull: Pull,
}

impl PinConfig {
    /// Capture pins never use the internal pull network: the receiver
    /// module drives the line.
    pub fn new(pin: Pin, invert: bool) -> Self {
        Self {
            pin,
            polarity: Polarity::from_invert(invert),
            pull: Pull::Off,
        }
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn pull(&self) -> Pull {
        self.pull
    }
}
