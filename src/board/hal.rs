use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use tracing::warn;

use super::{Board, Level};

/// [`Board`] over `embedded-hal` GPIO.
///
/// Pins are registered by GPIO number. The HAL's pin types must be
/// type-erased (one output type, one input type) and infallible, as they are
/// on RP2040 and most other MCU HALs. `clock` returns monotonic milliseconds.
pub struct HalBoard<O, I, D, C> {
    outputs: Vec<(u8, O)>,
    inputs: Vec<(u8, I)>,
    delay: D,
    clock: C,
}

impl<O, I, D, C> HalBoard<O, I, D, C>
where
    O: OutputPin<Error = Infallible>,
    I: InputPin<Error = Infallible>,
    D: DelayNs,
    C: Fn() -> u64,
{
    pub fn new(delay: D, clock: C) -> Self {
        Self {
            outputs: Vec::new(),
            inputs: Vec::new(),
            delay,
            clock,
        }
    }

    /// Registers an output. The pin is driven low straight away.
    pub fn with_output(mut self, pin: u8, mut output: O) -> Self {
        match output.set_low() {
            Ok(()) => {}
            Err(never) => match never {},
        }
        self.outputs.push((pin, output));
        self
    }

    pub fn with_input(mut self, pin: u8, input: I) -> Self {
        self.inputs.push((pin, input));
        self
    }
}

impl<O, I, D, C> Board for HalBoard<O, I, D, C>
where
    O: OutputPin<Error = Infallible>,
    I: InputPin<Error = Infallible>,
    D: DelayNs,
    C: Fn() -> u64,
{
    fn write_pin(&mut self, pin: u8, level: Level) {
        let Some((_, output)) = self.outputs.iter_mut().find(|(id, _)| *id == pin) else {
            warn!("write to unregistered output GP{pin}");
            return;
        };
        let result = match level {
            Level::High => output.set_high(),
            Level::Low => output.set_low(),
        };
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    fn read_pin(&mut self, pin: u8) -> Level {
        let Some((_, input)) = self.inputs.iter_mut().find(|(id, _)| *id == pin) else {
            warn!("read from unregistered input GP{pin}");
            return Level::Low;
        };
        match input.is_high() {
            Ok(high) => Level::from(high),
            Err(never) => match never {},
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn millis(&self) -> u64 {
        (self.clock)()
    }
}
