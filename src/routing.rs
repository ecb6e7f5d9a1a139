//! Probe routing: the pad/channel model and the engine that drives the
//! multiplexer chips.

use std::fmt;

use bitflags::bitflags;
use tracing::debug;

use crate::board::{Board, Level};
use crate::config::{PinMap, Timing};

/// One of the four sample terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pad {
    #[default]
    A,
    B,
    C,
    D,
}

impl Pad {
    pub const ALL: [Pad; 4] = [Pad::A, Pad::B, Pad::C, Pad::D];

    /// Multiplexer address that selects this pad.
    pub fn address(self) -> u8 {
        self as u8
    }

    pub fn from_address(address: u8) -> Option<Pad> {
        Self::ALL.get(usize::from(address)).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn letter(self) -> char {
        match self {
            Pad::A => 'A',
            Pad::B => 'B',
            Pad::C => 'C',
            Pad::D => 'D',
        }
    }

    /// Parses a pad letter, ignoring case.
    pub fn from_letter(letter: char) -> Option<Pad> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Pad::A),
            'B' => Some(Pad::B),
            'C' => Some(Pad::C),
            'D' => Some(Pad::D),
            _ => None,
        }
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A measurement role, each switched by its own multiplexer chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Current source +
    Ip,
    /// Current source −
    Im,
    /// Voltage sense +
    Vp,
    /// Voltage sense −
    Vm,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Ip, Channel::Im, Channel::Vp, Channel::Vm];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Ip => "IP",
            Channel::Im => "IM",
            Channel::Vp => "VP",
            Channel::Vm => "VM",
        }
    }

    /// The enable bit of this channel.
    pub fn mask(self) -> EnableMask {
        EnableMask::from_bits_truncate(1 << self.index())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Which channels are electrically live.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnableMask: u8 {
        const IP = 0b0001;
        const IM = 0b0010;
        const VP = 0b0100;
        const VM = 0b1000;
    }
}

impl EnableMask {
    pub fn contains_channel(self, channel: Channel) -> bool {
        self.contains(channel.mask())
    }

    /// The only enabled channel, if exactly one is enabled.
    pub fn single_channel(self) -> Option<Channel> {
        Channel::ALL.into_iter().find(|channel| channel.mask() == self)
    }

    /// Symbolic form used in status lines: a channel name, `NONE` or `MULTI`.
    pub fn label(self) -> &'static str {
        match self.single_channel() {
            Some(channel) => channel.name(),
            None if self.is_empty() => "NONE",
            None => "MULTI",
        }
    }
}

impl Default for EnableMask {
    fn default() -> Self {
        EnableMask::all()
    }
}

/// The pad assigned to each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoutingAssignment {
    pub ip: Pad,
    pub im: Pad,
    pub vp: Pad,
    pub vm: Pad,
}

impl RoutingAssignment {
    pub const fn new(ip: Pad, im: Pad, vp: Pad, vm: Pad) -> Self {
        Self { ip, im, vp, vm }
    }

    /// Every channel on the same pad.
    pub const fn broadcast(pad: Pad) -> Self {
        Self::new(pad, pad, pad, pad)
    }

    pub fn pad(&self, channel: Channel) -> Pad {
        match channel {
            Channel::Ip => self.ip,
            Channel::Im => self.im,
            Channel::Vp => self.vp,
            Channel::Vm => self.vm,
        }
    }
}

impl fmt::Display for RoutingAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IP={} IM={} VP={} VM={}",
            self.ip, self.im, self.vp, self.vm
        )
    }
}

/// Snapshot of everything the router has applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    pub assignment: RoutingAssignment,
    pub cfg_id: u8,
    pub enable_mask: EnableMask,
}

/// Owner of the live routing.
///
/// All routing changes go through [`Router::apply`] and
/// [`Router::set_enable_mask`]. Address lines only ever change while every
/// chip is disabled.
#[derive(Debug, Clone)]
pub struct Router {
    pins: PinMap,
    timing: Timing,
    state: EngineState,
}

impl Router {
    pub fn new(pins: PinMap, timing: Timing) -> Self {
        Self {
            pins,
            timing,
            state: EngineState::default(),
        }
    }

    /// Drives all routing lines to match the initial state.
    pub fn begin<B: Board>(&self, board: &mut B) {
        self.refresh(board);
    }

    /// Switches to `assignment`.
    ///
    /// Enables are dropped and held off while the address lines change, then
    /// the previous mask is restored and the chips are given time to settle.
    pub fn apply<B: Board>(&mut self, board: &mut B, assignment: RoutingAssignment, cfg_id: u8) {
        debug!(cfg_id, %assignment, "applying routing");
        self.state.assignment = assignment;
        self.state.cfg_id = cfg_id;

        self.write_enables(board, EnableMask::empty());
        board.delay_ms(self.timing.disable_hold_ms);

        self.write_addresses(board);

        self.write_enables(board, self.state.enable_mask);
        board.delay_ms(self.timing.settle_ms);
    }

    /// Changes which channels are live without touching pad selection.
    pub fn set_enable_mask<B: Board>(&mut self, board: &mut B, mask: EnableMask) {
        debug!(mask = mask.bits(), "setting enable mask");
        self.state.enable_mask = mask;
        self.write_enables(board, mask);
    }

    /// Re-drives every routing line from the current state, e.g. after the
    /// validator borrowed the chip enables, and waits for the chips to settle.
    pub fn refresh<B: Board>(&self, board: &mut B) {
        self.write_enables(board, EnableMask::empty());
        self.write_addresses(board);
        self.write_enables(board, self.state.enable_mask);
        board.delay_ms(self.timing.settle_ms);
    }

    pub fn state(&self) -> &RoutingAssignment {
        &self.state.assignment
    }

    pub fn cfg_id(&self) -> u8 {
        self.state.cfg_id
    }

    pub fn enable_mask(&self) -> EnableMask {
        self.state.enable_mask
    }

    pub fn snapshot(&self) -> EngineState {
        self.state
    }

    fn write_addresses<B: Board>(&self, board: &mut B) {
        for channel in Channel::ALL {
            let pins = self.pins.address[channel.index()];
            let address = self.state.assignment.pad(channel).address();
            board.write_pin(pins.a0, Level::from(address & 0x01 != 0));
            board.write_pin(pins.a1, Level::from(address & 0x02 != 0));
            board.write_pin(pins.a2, Level::from(address & 0x04 != 0));
        }
    }

    fn write_enables<B: Board>(&self, board: &mut B, mask: EnableMask) {
        for channel in Channel::ALL {
            let level = self.pins.enable_level(mask.contains_channel(channel));
            board.write_pin(self.pins.enable[channel.index()], level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::FakeBoard;

    fn router_and_board() -> (Router, FakeBoard) {
        let pins = PinMap::default();
        let mut board = FakeBoard::new(pins.clone());
        let mut router = Router::new(pins, Timing::default());
        router.begin(&mut board);
        board.clear_writes();
        (router, board)
    }

    #[test]
    fn pad_letters_and_addresses() {
        for (index, pad) in Pad::ALL.into_iter().enumerate() {
            assert_eq!(pad.address() as usize, index);
            assert_eq!(Pad::from_address(pad.address()), Some(pad));
            assert_eq!(Pad::from_letter(pad.letter()), Some(pad));
            assert_eq!(Pad::from_letter(pad.letter().to_ascii_lowercase()), Some(pad));
        }
        assert_eq!(Pad::from_address(4), None);
        assert_eq!(Pad::from_letter('E'), None);
    }

    #[test]
    fn enable_mask_labels() {
        assert_eq!(EnableMask::empty().label(), "NONE");
        assert_eq!(EnableMask::IP.label(), "IP");
        assert_eq!(EnableMask::VM.label(), "VM");
        assert_eq!((EnableMask::IP | EnableMask::VP).label(), "MULTI");
        assert_eq!(EnableMask::all().bits(), 0x0F);
    }

    #[test]
    fn default_state_is_all_pad_a_all_enabled() {
        let router = Router::new(PinMap::default(), Timing::default());
        assert_eq!(*router.state(), RoutingAssignment::broadcast(Pad::A));
        assert_eq!(router.cfg_id(), 0);
        assert_eq!(router.enable_mask(), EnableMask::all());
    }

    #[test]
    fn apply_updates_state_and_waits_for_settle() {
        let (mut router, mut board) = router_and_board();
        let before = board.millis();
        let assignment = RoutingAssignment::new(Pad::C, Pad::B, Pad::A, Pad::D);

        router.apply(&mut board, assignment, 3);

        assert_eq!(*router.state(), assignment);
        assert_eq!(router.cfg_id(), 3);
        assert_eq!(router.enable_mask(), EnableMask::all());
        assert_eq!(board.millis() - before, 51);
    }

    #[test]
    fn address_lines_only_change_while_disabled() {
        let (mut router, mut board) = router_and_board();
        router.apply(&mut board, RoutingAssignment::new(Pad::D, Pad::C, Pad::B, Pad::A), 0);

        let pins = PinMap::default();
        let mut live = [true; 4];
        let mut address_writes = 0;
        for write in board.writes() {
            if let Some(chip) = pins.enable.iter().position(|&p| p == write.pin) {
                live[chip] = write.level == pins.enable_level(true);
            } else {
                address_writes += 1;
                assert!(live.iter().all(|on| !on), "address write {write:?} on live chip");
            }
        }
        assert_eq!(address_writes, 12);
        assert!(live.iter().all(|on| *on));
    }

    #[test]
    fn disable_hold_precedes_address_change() {
        let (mut router, mut board) = router_and_board();
        router.apply(&mut board, RoutingAssignment::broadcast(Pad::B), 0);

        let pins = PinMap::default();
        let writes = board.writes();
        let last_disable = writes
            .iter()
            .filter(|w| pins.enable.contains(&w.pin))
            .take(4)
            .last()
            .map(|w| w.at_us);
        let first_address = writes
            .iter()
            .find(|w| !pins.enable.contains(&w.pin))
            .map(|w| w.at_us);
        assert_eq!(first_address.zip(last_disable).map(|(a, d)| a - d), Some(1000));
    }

    #[test]
    fn enable_mask_leaves_address_lines_alone() {
        let (mut router, mut board) = router_and_board();
        router.set_enable_mask(&mut board, EnableMask::IM | EnableMask::VM);

        let pins = PinMap::default();
        assert!(board.writes().iter().all(|w| pins.enable.contains(&w.pin)));
        assert!(!board.chip_enabled(Channel::Ip));
        assert!(board.chip_enabled(Channel::Im));
        assert!(!board.chip_enabled(Channel::Vp));
        assert!(board.chip_enabled(Channel::Vm));
        assert_eq!(router.enable_mask().bits(), 0b1010);
    }

    #[test]
    fn disabled_mask_survives_apply() {
        let (mut router, mut board) = router_and_board();
        router.set_enable_mask(&mut board, EnableMask::VP);
        router.apply(&mut board, RoutingAssignment::broadcast(Pad::C), 0);

        assert_eq!(router.enable_mask(), EnableMask::VP);
        assert!(board.chip_enabled(Channel::Vp));
        assert!(!board.chip_enabled(Channel::Ip));
        assert_eq!(board.selected_pad(Channel::Vp), Some(Pad::C));
    }

    #[test]
    fn refresh_restores_lines_and_settles() {
        let (mut router, mut board) = router_and_board();
        router.apply(&mut board, RoutingAssignment::broadcast(Pad::D), 2);
        router.set_enable_mask(&mut board, EnableMask::IM);

        // Something else borrowed the lines.
        let pins = PinMap::default();
        for pin in pins.enable {
            board.write_pin(pin, Level::High);
        }
        board.write_pin(pins.address[0].a0, Level::Low);
        board.clear_writes();

        let before = board.millis();
        router.refresh(&mut board);

        assert_eq!(board.millis() - before, 50);
        let last_write = board.writes().last().map(|w| w.at_us);
        assert_eq!(last_write, Some(before * 1000));
        assert!(board.chip_enabled(Channel::Im));
        assert!(!board.chip_enabled(Channel::Ip));
        assert_eq!(board.selected_pad(Channel::Im), Some(Pad::D));
        assert_eq!(router.snapshot().cfg_id, 2);
    }
}
