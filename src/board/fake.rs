use std::collections::HashMap;

use super::{Board, Level};
use crate::config::PinMap;
use crate::routing::{Channel, Pad};

/// A single recorded output change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    /// Virtual time of the write in microseconds.
    pub at_us: u64,
    pub pin: u8,
    pub level: Level,
}

/// In-memory board.
///
/// Records every pin write and answers sense-pin reads from a simulated
/// switch matrix: a chip's sense input reads high when the chip is enabled,
/// its address lines select a pad, that pad's drive output is high, and the
/// (chip, pad) switch is wired. Reads can also be forced to a fixed level.
///
/// Time is virtual. Delays advance the clock instead of sleeping.
#[derive(Debug, Clone)]
pub struct FakeBoard {
    pins: PinMap,
    levels: HashMap<u8, Level>,
    writes: Vec<PinWrite>,
    // wiring[chip][pad]
    wiring: [[bool; 4]; 4],
    forced: HashMap<u8, Level>,
    now_us: u64,
    record: bool,
}

impl FakeBoard {
    /// A board whose every switch path closes.
    pub fn new(pins: PinMap) -> Self {
        Self {
            pins,
            levels: HashMap::new(),
            writes: Vec::new(),
            wiring: [[true; 4]; 4],
            forced: HashMap::new(),
            now_us: 0,
            record: true,
        }
    }

    /// A board with no working switch path at all.
    pub fn unwired(pins: PinMap) -> Self {
        let mut board = Self::new(pins);
        board.wiring = [[false; 4]; 4];
        board
    }

    /// Stops keeping the write log, for long-running simulations.
    pub fn without_history(mut self) -> Self {
        self.record = false;
        self
    }

    /// Connects or breaks the switch between `chip` and `pad`.
    pub fn set_wired(&mut self, chip: Channel, pad: Pad, wired: bool) {
        self.wiring[chip.index()][pad.index()] = wired;
    }

    /// Makes every read of `pin` return `level`, regardless of the matrix.
    pub fn force_input(&mut self, pin: u8, level: Level) {
        self.forced.insert(pin, level);
    }

    /// Current level of an output. Never-written pins are low.
    pub fn level(&self, pin: u8) -> Level {
        self.levels.get(&pin).copied().unwrap_or_default()
    }

    pub fn writes(&self) -> &[PinWrite] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Moves the virtual clock forward without any pin activity.
    pub fn advance_ms(&mut self, ms: u64) {
        self.now_us += ms * 1000;
    }

    pub fn chip_enabled(&self, chip: Channel) -> bool {
        let pin = self.pins.enable[chip.index()];
        self.level(pin) == self.pins.enable_level(true)
    }

    /// The pad a chip's address lines currently select, if any.
    pub fn selected_pad(&self, chip: Channel) -> Option<Pad> {
        let pins = self.pins.address[chip.index()];
        let address = u8::from(self.level(pins.a0).is_high())
            | u8::from(self.level(pins.a1).is_high()) << 1
            | u8::from(self.level(pins.a2).is_high()) << 2;
        Pad::from_address(address)
    }

    fn sensed(&self, chip: Channel) -> bool {
        if !self.chip_enabled(chip) {
            return false;
        }
        match self.selected_pad(chip) {
            Some(pad) => {
                self.level(self.pins.drive[pad.index()]).is_high()
                    && self.wiring[chip.index()][pad.index()]
            }
            None => false,
        }
    }
}

impl Board for FakeBoard {
    fn write_pin(&mut self, pin: u8, level: Level) {
        self.levels.insert(pin, level);
        if self.record {
            self.writes.push(PinWrite {
                at_us: self.now_us,
                pin,
                level,
            });
        }
    }

    fn read_pin(&mut self, pin: u8) -> Level {
        if let Some(level) = self.forced.get(&pin) {
            return *level;
        }
        match self.pins.sense.iter().position(|&sense| sense == pin) {
            Some(chip) => Level::from(self.sensed(Channel::ALL[chip])),
            // Unconnected inputs sit on their pull-downs.
            None => Level::Low,
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now_us += u64::from(ms) * 1000;
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us += u64::from(us);
    }

    fn millis(&self) -> u64 {
        self.now_us / 1000
    }
}
