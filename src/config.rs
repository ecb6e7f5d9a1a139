//! Pin wiring and timing constants for the router board.

use crate::board::Level;

/// Address pins of one MAX328 multiplexer chip.
///
/// The chip is an 8:1 switch; only the first four inputs are wired to pads,
/// so `a2` is always driven low while routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipPins {
    pub a0: u8,
    pub a1: u8,
    pub a2: u8,
}

/// GPIO assignment for the routing chips and the switch validator.
///
/// Arrays indexed by channel follow the order IP, IM, VP, VM. Arrays indexed
/// by pad follow A, B, C, D.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    /// Address lines of each chip. The stock board shares one bus.
    pub address: [ChipPins; 4],
    /// Enable line of each chip.
    pub enable: [u8; 4],
    /// Whether a chip is enabled by driving its enable line high.
    pub enable_active_high: bool,
    /// Validator drive outputs, one per pad.
    pub drive: [u8; 4],
    /// Validator sense inputs, one per chip. Pulled down on the board.
    pub sense: [u8; 4],
}

impl PinMap {
    /// Wiring of the Feather RP2040 carrier board.
    pub fn feather_rp2040() -> Self {
        let bus = ChipPins { a0: 10, a1: 11, a2: 12 };
        Self {
            address: [bus; 4],
            enable: [9, 8, 7, 6],
            enable_active_high: true,
            drive: [0, 1, 2, 3],
            sense: [26, 27, 28, 29],
        }
    }

    /// The level that puts a chip's enable line into the requested state.
    pub fn enable_level(&self, enabled: bool) -> Level {
        Level::from(enabled == self.enable_active_high)
    }

    /// Every pin the firmware drives, without duplicates.
    pub fn output_pins(&self) -> Vec<u8> {
        let mut pins = Vec::new();
        for chip in &self.address {
            pins.extend([chip.a0, chip.a1, chip.a2]);
        }
        pins.extend(self.enable);
        pins.extend(self.drive);
        pins.sort_unstable();
        pins.dedup();
        pins
    }

    /// Every pin the firmware reads.
    pub fn input_pins(&self) -> Vec<u8> {
        self.sense.to_vec()
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self::feather_rp2040()
    }
}

/// Fixed delays and limits. These model analog settling and must not be
/// shortened below what the switch chips need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long all enables are held off before the address lines change.
    pub disable_hold_ms: u32,
    /// Settle time after a routing change.
    pub settle_ms: u32,
    /// Settle time between validator switching steps.
    pub scan_settle_us: u32,
    /// Default period of free-running test cycling.
    pub cycle_interval_ms: u32,
    /// Maximum number of bytes kept per input line.
    pub line_limit: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            disable_hold_ms: 1,
            settle_ms: 50,
            scan_settle_us: 100,
            cycle_interval_ms: 500,
            line_limit: 120,
        }
    }
}

/// Everything needed to bring up an [`crate::Instrument`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub pins: PinMap,
    pub timing: Timing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feather_wiring_lists_each_output_once() {
        let pins = PinMap::feather_rp2040();
        // 3 shared address lines + 4 enables + 4 drive outputs
        assert_eq!(pins.output_pins(), vec![0, 1, 2, 3, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(pins.input_pins(), vec![26, 27, 28, 29]);
    }

    #[test]
    fn enable_polarity() {
        let mut pins = PinMap::default();
        assert_eq!(pins.enable_level(true), Level::High);
        assert_eq!(pins.enable_level(false), Level::Low);

        pins.enable_active_high = false;
        assert_eq!(pins.enable_level(true), Level::Low);
        assert_eq!(pins.enable_level(false), Level::High);
    }
}
