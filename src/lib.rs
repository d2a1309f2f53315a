//! irrecord - raw infrared remote capture from a GPIO pin
//!
//! This library times edge transitions on a GPIO input fed by a demodulating
//! IR receiver and turns them into mark/space durations in microseconds.
//! Bursts are delimited by an inactivity gap, and the hardware's 32-bit tick
//! counter is handled modulo 2^32.
//!
//! The edge source is a [`backend::GpioBackend`]: the pigpio daemon on real
//! hardware, or an in-process simulated line for tests and dry runs.

pub mod backend;
pub mod capture;
pub mod cli;
pub mod console;
pub mod error;
pub mod pin;
pub mod pulse_file;
pub mod session;
pub mod tick;

pub use capture::{normalize_pulses, CaptureConfig, EdgeCaptureEngine};
pub use error::CaptureError;
pub use pin::{Pin, PinConfig};
pub use session::{BurstSession, SessionConfig, SessionError};
