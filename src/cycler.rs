//! Exhaustive pad/channel cycling for burn-in and wiring checks.

use std::fmt;

use tracing::{debug, info};

use crate::board::Board;
use crate::routing::{Channel, EnableMask, EngineState, Pad, RoutingAssignment, Router};

/// Number of distinct (pad, channel) combinations in one sweep.
pub const COMBINATIONS: usize = Pad::ALL.len() * Channel::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Inactive,
    SingleStep,
    FreeRunning,
}

/// The combination that was just applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub pad: Pad,
    pub channel: Channel,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TEST STEP PAD={} EN={}", self.pad, self.channel)
    }
}

/// Snapshot for `TEST?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStatus {
    pub active: bool,
    pub auto_run: bool,
    pub interval_ms: u32,
    pub pad: Pad,
    pub enable_mask: EnableMask,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TEST ACTIVE={} AUTO={} INTERVAL_MS={} PAD={} EN={}",
            u8::from(self.active),
            u8::from(self.auto_run),
            self.interval_ms,
            self.pad,
            self.enable_mask.label()
        )
    }
}

/// Walks the router through every pad with one channel live at a time.
///
/// The sweep is channel-fastest: A/IP, A/IM, A/VP, A/VM, B/IP, ... and wraps
/// after D/VM. Whatever was routed before cycling started is restored by
/// [`TestCycler::stop`].
#[derive(Debug, Clone)]
pub struct TestCycler {
    mode: CycleMode,
    interval_ms: u32,
    last_ms: u64,
    pad_index: usize,
    channel_index: usize,
    last: StepReport,
    saved: EngineState,
}

impl TestCycler {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            mode: CycleMode::Inactive,
            interval_ms,
            last_ms: 0,
            pad_index: 0,
            channel_index: 0,
            last: StepReport {
                pad: Pad::A,
                channel: Channel::Ip,
            },
            saved: EngineState::default(),
        }
    }

    /// Enters free-running mode and applies the first combination at once.
    pub fn start<B: Board>(
        &mut self,
        router: &mut Router,
        board: &mut B,
        interval_ms: Option<u32>,
    ) -> StepReport {
        let interval_ms = interval_ms.unwrap_or(self.interval_ms);
        self.enter(router, board, CycleMode::FreeRunning, interval_ms)
    }

    /// Applies exactly one combination and leaves free-running mode.
    pub fn step_once<B: Board>(&mut self, router: &mut Router, board: &mut B) -> StepReport {
        self.enter(router, board, CycleMode::SingleStep, self.interval_ms)
    }

    /// Restores the routing captured when cycling began.
    ///
    /// Returns false, and does nothing, when cycling was not active.
    pub fn stop<B: Board>(&mut self, router: &mut Router, board: &mut B) -> bool {
        if !self.is_active() {
            return false;
        }
        self.mode = CycleMode::Inactive;
        // Keep every chip off until the saved pads are selected again.
        router.set_enable_mask(board, EnableMask::empty());
        router.apply(board, self.saved.assignment, self.saved.cfg_id);
        router.set_enable_mask(board, self.saved.enable_mask);
        info!(cfg_id = self.saved.cfg_id, "test cycling stopped, routing restored");
        true
    }

    /// Main-loop hook. Advances one combination when free-running and the
    /// period has elapsed.
    pub fn update<B: Board>(&mut self, router: &mut Router, board: &mut B) -> Option<StepReport> {
        if self.mode != CycleMode::FreeRunning {
            return None;
        }
        let now = board.millis();
        if now.saturating_sub(self.last_ms) < u64::from(self.interval_ms) {
            return None;
        }
        self.last_ms = now;
        let report = self.apply_current(router, board);
        self.advance();
        Some(report)
    }

    pub fn mode(&self) -> CycleMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode != CycleMode::Inactive
    }

    pub fn auto_run(&self) -> bool {
        self.mode == CycleMode::FreeRunning
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// The combination most recently applied.
    pub fn last_step(&self) -> StepReport {
        self.last
    }

    /// Status as reported to the host. `enable_mask` is the router's live mask.
    pub fn status(&self, enable_mask: EnableMask) -> CycleStatus {
        CycleStatus {
            active: self.is_active(),
            auto_run: self.auto_run(),
            interval_ms: self.interval_ms,
            pad: self.last.pad,
            enable_mask,
        }
    }

    fn enter<B: Board>(
        &mut self,
        router: &mut Router,
        board: &mut B,
        mode: CycleMode,
        interval_ms: u32,
    ) -> StepReport {
        if !self.is_active() {
            self.saved = router.snapshot();
            self.pad_index = 0;
            self.channel_index = 0;
            self.last_ms = board.millis();
            info!(cfg_id = self.saved.cfg_id, "test cycling started");
        }
        self.mode = mode;
        self.interval_ms = interval_ms;
        let report = self.apply_current(router, board);
        self.advance();
        report
    }

    fn apply_current<B: Board>(&mut self, router: &mut Router, board: &mut B) -> StepReport {
        let pad = Pad::ALL[self.pad_index];
        let channel = Channel::ALL[self.channel_index];

        router.set_enable_mask(board, EnableMask::empty());
        router.apply(board, RoutingAssignment::broadcast(pad), 0);
        router.set_enable_mask(board, channel.mask());

        self.last = StepReport { pad, channel };
        debug!(%pad, %channel, "test step applied");
        self.last
    }

    fn advance(&mut self) {
        self.channel_index += 1;
        if self.channel_index == Channel::ALL.len() {
            self.channel_index = 0;
            self.pad_index = (self.pad_index + 1) % Pad::ALL.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::FakeBoard;
    use crate::config::{ChipPins, PinMap, Timing};

    fn setup() -> (TestCycler, Router, FakeBoard) {
        let pins = PinMap::default();
        let mut board = FakeBoard::new(pins.clone());
        let mut router = Router::new(pins, Timing::default());
        router.begin(&mut board);
        (TestCycler::new(500), router, board)
    }

    #[test]
    fn sweep_is_channel_fastest_and_wraps() {
        let (mut cycler, mut router, mut board) = setup();
        let steps: Vec<StepReport> = (0..COMBINATIONS + 1)
            .map(|_| cycler.step_once(&mut router, &mut board))
            .collect();

        assert_eq!(steps[0], StepReport { pad: Pad::A, channel: Channel::Ip });
        assert_eq!(steps[1], StepReport { pad: Pad::A, channel: Channel::Im });
        assert_eq!(steps[4], StepReport { pad: Pad::B, channel: Channel::Ip });
        assert_eq!(steps[15], StepReport { pad: Pad::D, channel: Channel::Vm });
        assert_eq!(steps[16], steps[0]);
    }

    #[test]
    fn step_broadcasts_pad_and_enables_one_channel() {
        let (mut cycler, mut router, mut board) = setup();
        for _ in 0..6 {
            cycler.step_once(&mut router, &mut board);
        }
        // Sixth step is B/IM.
        assert_eq!(*router.state(), RoutingAssignment::broadcast(Pad::B));
        assert_eq!(router.cfg_id(), 0);
        assert_eq!(router.enable_mask(), EnableMask::IM);
        assert!(board.chip_enabled(Channel::Im));
        assert!(!board.chip_enabled(Channel::Ip));
        assert_eq!(board.selected_pad(Channel::Im), Some(Pad::B));
    }

    #[test]
    fn stop_restores_previous_state() {
        let (mut cycler, mut router, mut board) = setup();
        let assignment = RoutingAssignment::new(Pad::C, Pad::B, Pad::A, Pad::D);
        router.apply(&mut board, assignment, 1);
        router.set_enable_mask(&mut board, EnableMask::IP | EnableMask::VM);
        let before = router.snapshot();

        cycler.start(&mut router, &mut board, None);
        for _ in 0..COMBINATIONS {
            cycler.step_once(&mut router, &mut board);
        }
        assert!(cycler.stop(&mut router, &mut board));

        assert_eq!(router.snapshot(), before);
        assert!(board.chip_enabled(Channel::Ip));
        assert!(!board.chip_enabled(Channel::Im));
        assert!(!cycler.is_active());
    }

    // Each chip on its own address lines, so every chip's selection is visible.
    fn split_bus_pins() -> PinMap {
        let mut pins = PinMap::default();
        for (chip, first) in pins.address.iter_mut().zip([10, 13, 16, 19]) {
            *chip = ChipPins {
                a0: first,
                a1: first + 1,
                a2: first + 2,
            };
        }
        pins
    }

    #[test]
    fn stop_never_enables_a_chip_on_the_cycling_pad() {
        let pins = split_bus_pins();
        let mut board = FakeBoard::new(pins.clone());
        let mut router = Router::new(pins, Timing::default());
        router.begin(&mut board);
        let saved = RoutingAssignment::new(Pad::C, Pad::B, Pad::A, Pad::D);
        router.apply(&mut board, saved, 1);
        router.set_enable_mask(&mut board, EnableMask::IP | EnableMask::VM);

        let mut cycler = TestCycler::new(500);
        cycler.step_once(&mut router, &mut board);
        assert_eq!(board.selected_pad(Channel::Vm), Some(Pad::A));

        let mut replay = board.clone();
        board.clear_writes();
        assert!(cycler.stop(&mut router, &mut board));
        assert!(!board.writes().is_empty());

        for write in board.writes() {
            replay.write_pin(write.pin, write.level);
            for channel in Channel::ALL {
                if replay.chip_enabled(channel) {
                    assert_eq!(
                        replay.selected_pad(channel),
                        Some(saved.pad(channel)),
                        "{channel} live on the wrong pad at {}us",
                        write.at_us
                    );
                }
            }
        }
        assert!(replay.chip_enabled(Channel::Ip));
        assert!(replay.chip_enabled(Channel::Vm));
        assert!(!replay.chip_enabled(Channel::Im));
    }

    #[test]
    fn stop_when_inactive_is_a_no_op() {
        let (mut cycler, mut router, mut board) = setup();
        board.clear_writes();
        assert!(!cycler.stop(&mut router, &mut board));
        assert!(board.writes().is_empty());
    }

    #[test]
    fn free_running_advances_on_period() {
        let (mut cycler, mut router, mut board) = setup();
        let first = cycler.start(&mut router, &mut board, Some(100));
        assert_eq!(first, StepReport { pad: Pad::A, channel: Channel::Ip });
        assert_eq!(cycler.mode(), CycleMode::FreeRunning);

        // Applying a step takes 51 ms of settle time, short of the period.
        assert_eq!(cycler.update(&mut router, &mut board), None);

        board.advance_ms(100);
        assert_eq!(
            cycler.update(&mut router, &mut board),
            Some(StepReport { pad: Pad::A, channel: Channel::Im })
        );
        assert_eq!(cycler.update(&mut router, &mut board), None);
    }

    #[test]
    fn update_does_nothing_unless_free_running() {
        let (mut cycler, mut router, mut board) = setup();
        board.advance_ms(10_000);
        assert_eq!(cycler.update(&mut router, &mut board), None);

        cycler.step_once(&mut router, &mut board);
        board.advance_ms(10_000);
        assert_eq!(cycler.update(&mut router, &mut board), None);
        assert_eq!(cycler.mode(), CycleMode::SingleStep);
    }

    #[test]
    fn restart_keeps_original_restore_point() {
        let (mut cycler, mut router, mut board) = setup();
        router.apply(&mut board, RoutingAssignment::broadcast(Pad::D), 0);
        let before = router.snapshot();

        cycler.start(&mut router, &mut board, Some(250));
        cycler.step_once(&mut router, &mut board);
        cycler.start(&mut router, &mut board, None);
        assert_eq!(cycler.interval_ms(), 250);

        cycler.stop(&mut router, &mut board);
        assert_eq!(router.snapshot(), before);
    }

    #[test]
    fn status_line_format() {
        let (mut cycler, mut router, mut board) = setup();
        assert_eq!(
            cycler.status(router.enable_mask()).to_string(),
            "TEST ACTIVE=0 AUTO=0 INTERVAL_MS=500 PAD=A EN=MULTI"
        );

        cycler.step_once(&mut router, &mut board);
        cycler.step_once(&mut router, &mut board);
        assert_eq!(
            cycler.status(router.enable_mask()).to_string(),
            "TEST ACTIVE=1 AUTO=0 INTERVAL_MS=500 PAD=A EN=IM"
        );
        assert_eq!(cycler.last_step().to_string(), "TEST STEP PAD=A EN=IM");
    }
}
