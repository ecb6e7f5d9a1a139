//! The assembled instrument: board, router, optional test components and the
//! command dispatcher.

use tracing::{info, warn};

use crate::board::Board;
use crate::config::Config;
use crate::cycler::TestCycler;
use crate::indicator::{IndicatorState, NoIndicator, StatusIndicator};
use crate::presets;
use crate::protocol::{self, Command, CommandError, LineBuffer, ERR};
use crate::routing::Router;
use crate::validator::SwitchValidator;

/// The router firmware's single context object.
///
/// Owns the board and every component that touches it. Host input goes in
/// through [`Instrument::feed`] or [`Instrument::process_line`]; the main loop
/// also calls [`Instrument::tick`] so free-running test cycling can advance.
/// Both return the lines to send back to the host.
pub struct Instrument<B: Board> {
    board: B,
    config: Config,
    router: Router,
    cycler: Option<TestCycler>,
    validator: Option<SwitchValidator>,
    indicator: Box<dyn StatusIndicator>,
    input: LineBuffer,
}

impl<B: Board> Instrument<B> {
    /// An instrument with routing only. Add the optional components with the
    /// `with_*` methods.
    pub fn new(board: B, config: Config) -> Self {
        Self {
            router: Router::new(config.pins.clone(), config.timing),
            input: LineBuffer::new(config.timing.line_limit),
            board,
            config,
            cycler: None,
            validator: None,
            indicator: Box::new(NoIndicator),
        }
    }

    pub fn with_test_cycler(mut self) -> Self {
        self.cycler = Some(TestCycler::new(self.config.timing.cycle_interval_ms));
        self
    }

    pub fn with_validator(mut self) -> Self {
        self.validator = Some(SwitchValidator::new(
            self.config.pins.clone(),
            self.config.timing,
        ));
        self
    }

    pub fn with_indicator(mut self, indicator: Box<dyn StatusIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    /// Start-up: drive every line, apply the default preset and announce
    /// readiness.
    pub fn begin(&mut self) -> Vec<String> {
        self.router.begin(&mut self.board);
        if let Some(validator) = &self.validator {
            validator.begin(&mut self.board);
        }
        if let Some(assignment) = presets::lookup(presets::DEFAULT_CONFIG) {
            self.router.apply(&mut self.board, assignment, presets::DEFAULT_CONFIG);
        }
        self.indicator.set_state(IndicatorState::Idle);
        info!("router ready");
        vec!["READY".to_string()]
    }

    /// Feeds raw bytes from the host link and returns every response they
    /// complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for &byte in bytes {
            if let Some(line) = self.input.push(byte) {
                out.extend(self.process_line(&line));
            }
        }
        out
    }

    /// Main-loop hook for free-running test cycling.
    pub fn tick(&mut self) -> Vec<String> {
        let Some(cycler) = &mut self.cycler else {
            return Vec::new();
        };
        match cycler.update(&mut self.router, &mut self.board) {
            Some(step) => vec![step.to_string()],
            None => Vec::new(),
        }
    }

    /// Handles one complete line. Rejected lines yield the single `ERR` line.
    pub fn process_line(&mut self, line: &str) -> Vec<String> {
        match Command::parse(line).and_then(|command| self.execute(command)) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(line, %err, "command rejected");
                self.indicator.set_state(IndicatorState::Error);
                vec![ERR.to_string()]
            }
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cycler(&self) -> Option<&TestCycler> {
        self.cycler.as_ref()
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    fn execute(&mut self, command: Command) -> Result<Vec<String>, CommandError> {
        let lines = match command {
            Command::Ping => vec!["PONG".to_string()],
            Command::Help => protocol::help_lines(),
            Command::State => vec![format!(
                "STATE CFG={} {}",
                self.router.cfg_id(),
                self.router.state()
            )],
            Command::Config(cfg_id) => {
                let assignment =
                    presets::lookup(cfg_id).ok_or(CommandError::UnknownConfig(cfg_id))?;
                self.router.apply(&mut self.board, assignment, cfg_id);
                self.indicator.set_state(IndicatorState::Idle);
                vec![format!("OK CFG {cfg_id}")]
            }
            Command::Set(assignment) => {
                self.router.apply(&mut self.board, assignment, 0);
                self.indicator.set_state(IndicatorState::Idle);
                vec![format!("OK SET {assignment}")]
            }
            Command::EnableMask(mask) => {
                self.router.set_enable_mask(&mut self.board, mask);
                self.indicator.set_state(IndicatorState::Idle);
                vec![format!("OK ENMASK {}", mask.bits())]
            }
            Command::TestOn(interval_ms) => {
                let cycler = self
                    .cycler
                    .as_mut()
                    .ok_or(CommandError::Unavailable("test cycling"))?;
                let step = cycler.start(&mut self.router, &mut self.board, interval_ms);
                self.indicator.set_state(IndicatorState::Busy);
                vec![
                    step.to_string(),
                    cycler.status(self.router.enable_mask()).to_string(),
                ]
            }
            Command::TestStep => {
                let cycler = self
                    .cycler
                    .as_mut()
                    .ok_or(CommandError::Unavailable("test cycling"))?;
                let step = cycler.step_once(&mut self.router, &mut self.board);
                self.indicator.set_state(IndicatorState::Busy);
                vec![
                    step.to_string(),
                    cycler.status(self.router.enable_mask()).to_string(),
                ]
            }
            Command::TestOff => {
                let cycler = self
                    .cycler
                    .as_mut()
                    .ok_or(CommandError::Unavailable("test cycling"))?;
                cycler.stop(&mut self.router, &mut self.board);
                self.indicator.set_state(IndicatorState::Idle);
                vec!["OK TEST OFF".to_string()]
            }
            Command::TestStatus => {
                let cycler = self
                    .cycler
                    .as_ref()
                    .ok_or(CommandError::Unavailable("test cycling"))?;
                vec![cycler.status(self.router.enable_mask()).to_string()]
            }
            Command::SwitchTest => {
                let validator = self
                    .validator
                    .as_ref()
                    .ok_or(CommandError::Unavailable("switch validator"))?;
                self.indicator.set_state(IndicatorState::Busy);
                let result = validator.scan(&mut self.board);
                self.router.refresh(&mut self.board);
                self.indicator.set_state(result.verdict().into());
                result.report(validator.pins())
            }
            Command::ConfigTest => {
                let validator = self
                    .validator
                    .as_ref()
                    .ok_or(CommandError::Unavailable("switch validator"))?;
                self.indicator.set_state(IndicatorState::Busy);
                let check = validator.verify_config(&mut self.board, self.router.state());
                self.router.refresh(&mut self.board);
                self.indicator.set_state(check.verdict().into());
                check.report(validator.pins(), self.router.cfg_id())
            }
        };
        Ok(lines)
    }
}
