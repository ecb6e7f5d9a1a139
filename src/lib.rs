//! # OpenPauw Probe Router
//!
//! Control logic for a four-point / Van der Pauw resistivity fixture. Four
//! probe channels (current +/−, voltage +/−) are switched onto four sample
//! pads by MAX328 multiplexers, one chip per channel.
//!
//! The library is board-independent. It talks to hardware through
//! [`board::Board`] and to the host through text lines:
//!
//! - [`routing`] owns the live assignment and sequences the chip enables so a
//!   pad is never switched onto a live channel.
//! - [`presets`] holds the four standard Van der Pauw orientations.
//! - [`cycler`] sweeps every pad/channel combination and restores the prior
//!   routing afterwards.
//! - [`validator`] proves the switch matrix electrically through dedicated
//!   drive and sense pins.
//! - [`protocol`] parses host commands; [`Instrument`] ties everything
//!   together and produces the responses.

pub mod board;
pub mod config;
pub mod cycler;
pub mod indicator;
pub mod instrument;
pub mod presets;
pub mod protocol;
pub mod routing;
pub mod validator;

pub use board::{Board, FakeBoard, HalBoard, Level};
pub use config::{ChipPins, Config, PinMap, Timing};
pub use indicator::{IndicatorState, NoIndicator, StatusIndicator};
pub use instrument::Instrument;
pub use protocol::CommandError;
pub use routing::{Channel, EnableMask, EngineState, Pad, RoutingAssignment, Router};
