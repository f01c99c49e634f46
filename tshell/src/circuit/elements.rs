//! Pins, gates and cell types as stored in a circuit.

use crate::circuit::types::{CellTypeId, Direction, GateId, PinId, PinKind};
use crate::core::names::verilog_name;

/// A pin on a gate instance or a top-level port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub(crate) name: String,
    pub(crate) kind: PinKind,
    pub(crate) direction: Direction,
    pub(crate) gate: Option<GateId>,
    pub(crate) fanin: Option<Vec<PinId>>,
    pub(crate) fanout: Option<Vec<PinId>>,
}

impl Pin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PinKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Gate owning the pin; `None` for top-level ports.
    pub fn gate(&self) -> Option<GateId> {
        self.gate
    }

    /// Last hierarchy component, e.g. `Y` for `core/u1/Y`.
    pub fn leaf(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn vname(&self) -> String {
        verilog_name(&self.name)
    }

    pub fn netname(&self) -> String {
        format!("{}_net", verilog_name(&self.name))
    }

    /// Drivers, if they have been loaded.
    pub fn cached_fanin(&self) -> Option<&[PinId]> {
        self.fanin.as_deref()
    }

    /// Loads, if they have been loaded.
    pub fn cached_fanout(&self) -> Option<&[PinId]> {
        self.fanout.as_deref()
    }
}

/// A gate instance in the flat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    pub(crate) name: String,
    pub(crate) celltype: Option<CellTypeId>,
    pub(crate) inputs: Vec<PinId>,
    pub(crate) outputs: Vec<PinId>,
}

impl Gate {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            celltype: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vname(&self) -> String {
        self.name.replace('/', "__")
    }

    pub fn celltype(&self) -> Option<CellTypeId> {
        self.celltype
    }

    /// Input pins seen so far, in discovery order.
    pub fn inputs(&self) -> &[PinId] {
        &self.inputs
    }

    /// Output pins seen so far, in discovery order.
    pub fn outputs(&self) -> &[PinId] {
        &self.outputs
    }

    pub(crate) fn attach(&mut self, pin: PinId, direction: Direction) {
        let list = match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        };
        if !list.contains(&pin) {
            list.push(pin);
        }
    }
}

/// A library cell (tessent module).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellType {
    pub(crate) name: String,
    pub(crate) input_ports: Option<Vec<String>>,
    pub(crate) output_ports: Option<Vec<String>>,
}

impl CellType {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            input_ports: None,
            output_ports: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Gate name of a gate pin: everything before the last `/`.
pub fn gate_name_of(pin_name: &str) -> &str {
    pin_name.rsplit_once('/').map_or("", |(gate, _)| gate)
}
