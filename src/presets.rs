//! Van der Pauw routing presets.
//!
//! Pads sit on the corners of a square sample:
//!
//! ```text
//!   A ---------- C
//!   |            |
//!   B ---------- D
//! ```
//!
//! Each preset drives current along one edge and senses voltage across the
//! opposite edge. 2 and 4 are the reversed-polarity forms of 1 and 3.

use crate::routing::{Pad, RoutingAssignment};

/// Preset applied at start-up.
pub const DEFAULT_CONFIG: u8 = 1;

const PRESETS: [(u8, RoutingAssignment); 4] = [
    // I: B->C, V: A-D
    (1, RoutingAssignment::new(Pad::C, Pad::B, Pad::A, Pad::D)),
    // I: C->B, V: D-A
    (2, RoutingAssignment::new(Pad::B, Pad::C, Pad::D, Pad::A)),
    // I: A->D, V: B-C
    (3, RoutingAssignment::new(Pad::D, Pad::A, Pad::B, Pad::C)),
    // I: D->A, V: C-B
    (4, RoutingAssignment::new(Pad::A, Pad::D, Pad::C, Pad::B)),
];

/// Looks up a preset by config id.
pub fn lookup(cfg_id: u8) -> Option<RoutingAssignment> {
    PRESETS
        .iter()
        .find(|(id, _)| *id == cfg_id)
        .map(|(_, assignment)| *assignment)
}
