//! Subcircuits of a tessent flat model: pins, gates and cell types pulled in
//! on demand through a [`Netlist`](crate::io::netlist::Netlist), plus the
//! graph, path and pattern analysis built on top of them.

mod model;
pub mod elements;
pub mod graph;
pub mod pattern;
pub mod pinpath;
pub mod plot;
pub mod snapshot;
pub mod types;
pub mod verilog;

use thiserror::Error;

pub use model::Circuit;
pub use elements::{CellType, Gate, Pin};
pub use pattern::{Pattern, XSimulation};
pub use pinpath::PinPath;
pub use types::{CellTypeId, Direction, GateId, LogicValue, PinId, PinKind};

/// Circuit-level failures that callers may want to tell apart.
#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("pin {0} not found in design")]
    ElementNotFound(String),

    #[error("pin {0} is not part of circuit {1}")]
    NotInCircuit(String, String),

    #[error("input pin {pin} has {count} drivers")]
    MultipleFanin { pin: String, count: usize },

    #[error("unknown pin direction: {0:?}")]
    UnknownDirection(String),

    #[error("unknown logic value: {0:?}")]
    UnknownValue(String),

    #[error("fanin of {0} has not been loaded")]
    MissingConnectivity(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
