//! Hardware tick arithmetic
//!
//! The pigpio tick is a free-running 32-bit microsecond counter that wraps
//! roughly every 71.6 minutes. Intervals are differences modulo 2^32, never
//! signed or clamped values.

/// Raw hardware tick (microseconds, wrapping)
pub type Tick = u32;

/// Microseconds elapsed from `earlier` to `later`, correct across wraparound
///
/// ```
/// use irrecord::tick::tick_delta;
///
/// assert_eq!(tick_delta(0xFFFF_FFF0, 0x0000_0010), 0x20);
/// ```
#[inline]
pub const fn tick_delta(earlier: Tick, later: Tick) -> u32 {
    later.wrapping_sub(earlier)
}
