//! Electrical self-test of the switch matrix.
//!
//! The validator has its own drive outputs (one per pad) and sense inputs
//! (one per chip), and borrows the chip enable and address lines while it
//! runs. It never consults the router: a pass means the switch actually
//! closed.

use tracing::info;

use crate::board::{Board, Level};
use crate::config::{PinMap, Timing};
use crate::routing::{Channel, Pad, RoutingAssignment};

/// Overall outcome of a self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Partial,
    Fail,
}

impl Verdict {
    fn from_counts(passed: usize, expected: usize) -> Self {
        if passed == expected {
            Verdict::Pass
        } else if passed == 0 {
            Verdict::Fail
        } else {
            Verdict::Partial
        }
    }
}

/// Result of a full matrix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// `connections[chip][pad]`
    pub connections: [[bool; 4]; 4],
    pub connection_count: u8,
}

impl ScanResult {
    pub fn is_connected(&self, chip: Channel, pad: Pad) -> bool {
        self.connections[chip.index()][pad.index()]
    }

    /// Pass only if every chip reaches every pad.
    pub fn verdict(&self) -> Verdict {
        Verdict::from_counts(usize::from(self.connection_count), 16)
    }

    /// Table with one row per drive output and one column per sense input.
    pub fn report(&self, pins: &PinMap) -> Vec<String> {
        let mut lines = vec!["SWTEST RESULT:".to_string(), header(pins)];
        for pad in Pad::ALL {
            let marks = Channel::ALL.map(|chip| if self.is_connected(chip, pad) { "X" } else { "." });
            lines.push(row(pins, pad, marks));
        }
        lines.push(format!("CONNECTIONS: {}", self.connection_count));
        lines
    }
}

/// Result of checking one routing assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCheck {
    pub assignment: RoutingAssignment,
    /// Per channel, in IP, IM, VP, VM order.
    pub channels: [bool; 4],
}

impl ConfigCheck {
    pub fn channel_passed(&self, channel: Channel) -> bool {
        self.channels[channel.index()]
    }

    pub fn passed(&self) -> bool {
        self.channels.iter().all(|ok| *ok)
    }

    pub fn pass_count(&self) -> usize {
        self.channels.iter().filter(|ok| **ok).count()
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_counts(self.pass_count(), Channel::ALL.len())
    }

    /// Table of the checked cells, one PASS/FAIL line per channel and an
    /// overall line. Cells that were not checked show `-`.
    pub fn report(&self, pins: &PinMap, cfg_id: u8) -> Vec<String> {
        let mut lines = vec![format!("CFGTEST RESULT: CFG={cfg_id}"), header(pins)];
        for pad in Pad::ALL {
            let marks = Channel::ALL.map(|chip| {
                if self.assignment.pad(chip) != pad {
                    "-"
                } else if self.channel_passed(chip) {
                    "X"
                } else {
                    "."
                }
            });
            lines.push(row(pins, pad, marks));
        }
        lines.push(format!("CONNECTIONS: {}", self.pass_count()));
        for channel in Channel::ALL {
            let outcome = if self.channel_passed(channel) { "PASS" } else { "FAIL" };
            lines.push(format!(
                "{} PAD={} {}",
                channel,
                self.assignment.pad(channel),
                outcome
            ));
        }
        lines.push(if self.passed() { "CFGTEST PASS" } else { "CFGTEST FAIL" }.to_string());
        lines
    }
}

fn header(pins: &PinMap) -> String {
    let mut line = format!("{:<10}", "");
    for chip in Channel::ALL {
        line.push_str(&format!("{:>10}", format!("{}(GP{})", chip, pins.sense[chip.index()])));
    }
    line
}

fn row(pins: &PinMap, pad: Pad, marks: [&str; 4]) -> String {
    let mut line = format!("{:<10}", format!("{} (GP{})", pad, pins.drive[pad.index()]));
    for mark in marks {
        line.push_str(&format!("{mark:>10}"));
    }
    line
}

/// Drives the matrix through its dedicated pins.
#[derive(Debug, Clone)]
pub struct SwitchValidator {
    pins: PinMap,
    settle_us: u32,
}

impl SwitchValidator {
    pub fn new(pins: PinMap, timing: Timing) -> Self {
        Self {
            pins,
            settle_us: timing.scan_settle_us,
        }
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    /// Parks all drive outputs low.
    pub fn begin<B: Board>(&self, board: &mut B) {
        self.drive_all_low(board);
    }

    /// Probes every (chip, pad) switch.
    ///
    /// Leaves all drive outputs low and every chip disabled.
    pub fn scan<B: Board>(&self, board: &mut B) -> ScanResult {
        let mut result = ScanResult {
            connections: [[false; 4]; 4],
            connection_count: 0,
        };

        for chip in Channel::ALL {
            self.isolate(board, chip);
            for pad in Pad::ALL {
                if self.probe(board, chip, pad) {
                    result.connections[chip.index()][pad.index()] = true;
                    result.connection_count += 1;
                }
            }
        }

        self.release(board);
        info!(connections = result.connection_count, "switch matrix scanned");
        result
    }

    /// Checks that each channel's chip closes onto its assigned pad.
    pub fn verify_config<B: Board>(&self, board: &mut B, assignment: &RoutingAssignment) -> ConfigCheck {
        let mut channels = [false; 4];
        for channel in Channel::ALL {
            self.isolate(board, channel);
            channels[channel.index()] = self.probe(board, channel, assignment.pad(channel));
        }
        self.release(board);

        let check = ConfigCheck {
            assignment: *assignment,
            channels,
        };
        info!(passed = check.pass_count(), "routing verified");
        check
    }

    fn isolate<B: Board>(&self, board: &mut B, chip: Channel) {
        self.disable_all(board);
        board.delay_us(self.settle_us);
        board.write_pin(self.pins.enable[chip.index()], self.pins.enable_level(true));
        board.delay_us(self.settle_us);
    }

    fn probe<B: Board>(&self, board: &mut B, chip: Channel, pad: Pad) -> bool {
        self.drive_all_low(board);

        let address = self.pins.address[chip.index()];
        let bits = pad.address();
        board.write_pin(address.a0, Level::from(bits & 0x01 != 0));
        board.write_pin(address.a1, Level::from(bits & 0x02 != 0));
        board.write_pin(address.a2, Level::Low);
        board.delay_us(self.settle_us);

        board.write_pin(self.pins.drive[pad.index()], Level::High);
        board.delay_us(self.settle_us);

        board.read_pin(self.pins.sense[chip.index()]).is_high()
    }

    fn release<B: Board>(&self, board: &mut B) {
        self.drive_all_low(board);
        self.disable_all(board);
    }

    fn drive_all_low<B: Board>(&self, board: &mut B) {
        for pin in self.pins.drive {
            board.write_pin(pin, Level::Low);
        }
    }

    fn disable_all<B: Board>(&self, board: &mut B) {
        for pin in self.pins.enable {
            board.write_pin(pin, self.pins.enable_level(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::FakeBoard;

    fn validator() -> SwitchValidator {
        SwitchValidator::new(PinMap::default(), Timing::default())
    }

    #[test]
    fn fully_wired_matrix_connects_everywhere() {
        let mut board = FakeBoard::new(PinMap::default());
        let result = validator().scan(&mut board);
        assert_eq!(result.connection_count, 16);
        assert_eq!(result.connections, [[true; 4]; 4]);
        assert_eq!(result.verdict(), Verdict::Pass);
    }

    #[test]
    fn open_matrix_connects_nowhere() {
        let mut board = FakeBoard::unwired(PinMap::default());
        let result = validator().scan(&mut board);
        assert_eq!(result.connection_count, 0);
        assert_eq!(result.connections, [[false; 4]; 4]);
        assert_eq!(result.verdict(), Verdict::Fail);
    }

    #[test]
    fn scan_locates_single_broken_switch() {
        let mut board = FakeBoard::new(PinMap::default());
        board.set_wired(Channel::Vm, Pad::C, false);

        let result = validator().scan(&mut board);
        assert_eq!(result.connection_count, 15);
        assert!(!result.is_connected(Channel::Vm, Pad::C));
        assert!(result.is_connected(Channel::Vp, Pad::C));
        assert_eq!(result.verdict(), Verdict::Partial);
    }

    #[test]
    fn scan_leaves_outputs_low_and_chips_disabled() {
        let pins = PinMap::default();
        let mut board = FakeBoard::new(pins.clone());
        validator().scan(&mut board);

        for pin in pins.drive {
            assert_eq!(board.level(pin), Level::Low);
        }
        for chip in Channel::ALL {
            assert!(!board.chip_enabled(chip));
        }
    }

    #[test]
    fn only_one_chip_enabled_while_probing() {
        let pins = PinMap::default();
        let mut board = FakeBoard::new(pins.clone());
        validator().scan(&mut board);

        let mut live = [false; 4];
        for write in board.writes() {
            if let Some(chip) = pins.enable.iter().position(|&p| p == write.pin) {
                live[chip] = write.level == pins.enable_level(true);
                assert!(live.iter().filter(|on| **on).count() <= 1);
            }
        }
    }

    #[test]
    fn verify_reports_each_channel() {
        let mut board = FakeBoard::new(PinMap::default());
        let assignment = RoutingAssignment::new(Pad::C, Pad::B, Pad::A, Pad::D);
        board.set_wired(Channel::Im, Pad::B, false);
        // Breaking a switch that is not in use must not matter.
        board.set_wired(Channel::Ip, Pad::A, false);

        let check = validator().verify_config(&mut board, &assignment);
        assert_eq!(check.channels, [true, false, true, true]);
        assert!(!check.passed());
        assert_eq!(check.verdict(), Verdict::Partial);
    }

    #[test]
    fn scan_report_layout() {
        let mut board = FakeBoard::new(PinMap::default());
        board.set_wired(Channel::Ip, Pad::A, false);
        let lines = validator().scan(&mut board).report(&PinMap::default());

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "SWTEST RESULT:");
        assert_eq!(
            lines[1],
            "            IP(GP26)  IM(GP27)  VP(GP28)  VM(GP29)"
        );
        assert_eq!(
            lines[2],
            "A (GP0)            .         X         X         X"
        );
        assert_eq!(lines[6], "CONNECTIONS: 15");
    }

    #[test]
    fn verify_report_lists_failures() {
        let mut board = FakeBoard::new(PinMap::default());
        board.set_wired(Channel::Vp, Pad::A, false);
        let assignment = RoutingAssignment::new(Pad::C, Pad::B, Pad::A, Pad::D);
        let lines = validator()
            .verify_config(&mut board, &assignment)
            .report(&PinMap::default(), 1);

        assert_eq!(lines[0], "CFGTEST RESULT: CFG=1");
        assert_eq!(
            lines[2],
            "A (GP0)            -         -         .         -"
        );
        assert_eq!(lines[6], "CONNECTIONS: 3");
        assert_eq!(&lines[7..], &[
            "IP PAD=C PASS",
            "IM PAD=B PASS",
            "VP PAD=A FAIL",
            "VM PAD=D PASS",
            "CFGTEST FAIL",
        ]);
    }
}
