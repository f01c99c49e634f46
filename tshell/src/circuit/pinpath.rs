//! Input-to-output paths through a circuit's pin graph.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::circuit::model::Circuit;
use crate::circuit::types::PinId;

/// A simple path of pins from a circuit input to a circuit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPath {
    index: usize,
    pins: Vec<PinId>,
}

impl PinPath {
    pub fn new(index: usize, pins: Vec<PinId>) -> Self {
        Self { index, pins }
    }

    /// Position of the path in the circuit's enumeration.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pins(&self) -> &[PinId] {
        &self.pins
    }

    pub fn first(&self) -> Option<PinId> {
        self.pins.first().copied()
    }

    pub fn last(&self) -> Option<PinId> {
        self.pins.last().copied()
    }

    pub fn contains(&self, pin: PinId) -> bool {
        self.pins.contains(&pin)
    }

    /// True when every pin on the path carries X.
    pub fn is_activated(&self, x_pins: &BTreeSet<PinId>) -> bool {
        self.pins.iter().all(|pin| x_pins.contains(pin))
    }

    /// Tessent path delay fault definition for the path.
    pub fn pdf_definition(&self, circuit: &Circuit) -> String {
        let mut out = format!("PATH \"path_{}\" = \n", self.index);
        for &pin in &self.pins {
            let _ = writeln!(out, "  PIN {} ;", circuit.pin(pin).name());
        }
        out.push_str("END ;");
        out
    }

    /// Pin names joined with `->`.
    pub fn describe(&self, circuit: &Circuit) -> String {
        self.pins
            .iter()
            .map(|&pin| circuit.pin(pin).name())
            .collect::<Vec<_>>()
            .join("->")
    }
}
