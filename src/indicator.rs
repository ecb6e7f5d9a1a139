//! Operator-facing status light.

use std::fmt;

use crate::validator::Verdict;

/// Coarse instrument state shown on the status light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Idle,
    Busy,
    Pass,
    Fail,
    Partial,
    Error,
}

impl From<Verdict> for IndicatorState {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Pass => IndicatorState::Pass,
            Verdict::Partial => IndicatorState::Partial,
            Verdict::Fail => IndicatorState::Fail,
        }
    }
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorState::Idle => "IDLE",
            IndicatorState::Busy => "BUSY",
            IndicatorState::Pass => "PASS",
            IndicatorState::Fail => "FAIL",
            IndicatorState::Partial => "PARTIAL",
            IndicatorState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Sink for indicator changes, e.g. an RGB LED.
pub trait StatusIndicator {
    fn set_state(&mut self, state: IndicatorState);
}

/// Used when the board has no status light.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl StatusIndicator for NoIndicator {
    fn set_state(&mut self, _state: IndicatorState) {}
}
