//! Hardware access used by the router, the test cycler and the validator.
//!
//! Everything above this module talks to the board through [`Board`]: write a
//! pin, read a pin, wait, and read a millisecond clock. [`HalBoard`] drives
//! real GPIO through `embedded-hal`; [`FakeBoard`] records writes and
//! simulates the multiplexer matrix in memory.

mod fake;
mod hal;

pub use fake::{FakeBoard, PinWrite};
pub use hal::HalBoard;

/// Logic level of a GPIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Minimal pin-level interface of the router board.
///
/// Pins are identified by their GPIO number as listed in
/// [`crate::config::PinMap`]. Operations are infallible; a board that can
/// fail must deal with that itself.
pub trait Board {
    /// Drive an output pin.
    fn write_pin(&mut self, pin: u8, level: Level);

    /// Sample an input pin.
    fn read_pin(&mut self, pin: u8) -> Level;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Block for `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Monotonic milliseconds since start-up.
    fn millis(&self) -> u64;
}
