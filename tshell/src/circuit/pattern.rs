//! Per-pattern values and X-propagation experiments.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::circuit::model::Circuit;
use crate::circuit::types::{LogicValue, PinId};
use crate::io::netlist::Simulator;

/// Simulation context every pattern context is copied from.
pub const BASE_SIM_CONTEXT: &str = "stable_capture";

/// One pattern of the loaded pattern set, as seen by a circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    index: u32,
    pin_values: BTreeMap<PinId, Vec<LogicValue>>,
    activated: Vec<usize>,
}

/// Outcome of forcing X on one pin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XSimulation {
    /// Member pins that carry X.
    pub x_pins: BTreeSet<PinId>,
    /// Circuit outputs that carry X.
    pub failing_outputs: BTreeSet<PinId>,
}

impl Pattern {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            pin_values: BTreeMap::new(),
            activated: Vec::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Name of the simulation context holding this pattern.
    pub fn sim_context(&self) -> String {
        format!("pattern_{}", self.index)
    }

    pub fn values(&self, pin: PinId) -> Option<&[LogicValue]> {
        self.pin_values.get(&pin).map(Vec::as_slice)
    }

    pub fn pin_values(&self) -> &BTreeMap<PinId, Vec<LogicValue>> {
        &self.pin_values
    }

    pub fn set_values(&mut self, pin: PinId, values: Vec<LogicValue>) {
        self.pin_values.insert(pin, values);
    }

    /// Indices of activated pin paths, in the order they were found.
    pub fn activated_pinpaths(&self) -> &[usize] {
        &self.activated
    }

    pub fn add_activated_pinpath(&mut self, index: usize) {
        if !self.activated.contains(&index) {
            self.activated.push(index);
        }
    }

    /// True when the pin's launch and capture values (frames 0 and 1) differ.
    /// Later frames are ignored.
    pub fn has_transition(&self, pin: PinId) -> bool {
        match self.values(pin) {
            Some([launch, capture, ..]) => launch != capture,
            _ => false,
        }
    }

    /// Read the values of every member pin not already known.
    #[instrument(skip_all, fields(pattern = self.index))]
    pub fn load_circuit_values<S: Simulator + ?Sized>(
        &mut self,
        circuit: &Circuit,
        sim: &mut S,
    ) -> Result<()> {
        sim.set_gate_report_pattern(self.index)?;
        for pin in circuit.pins() {
            if self.pin_values.contains_key(&pin) {
                continue;
            }
            let values = sim.pin_values(circuit.pin(pin).name())?;
            self.pin_values.insert(pin, values);
        }
        debug!(pins = self.pin_values.len(), "loaded pattern values");
        Ok(())
    }

    /// Create and select a simulation context with every circuit input
    /// forced to its captured value.
    pub fn create_sim_context<S: Simulator + ?Sized>(
        &mut self,
        circuit: &Circuit,
        sim: &mut S,
    ) -> Result<()> {
        self.load_circuit_values(circuit, sim)?;
        let context = self.sim_context();
        sim.add_simulation_context(&context, BASE_SIM_CONTEXT)?;
        sim.set_current_simulation_context(&context)?;
        for &pin in circuit.inputs() {
            let value = self.captured_value(circuit, pin)?;
            sim.add_simulation_force(circuit.pin(pin).name(), value)?;
        }
        sim.simulate_forces()
    }

    /// Force X on `pin`, see where it propagates, then restore the pin's
    /// captured value.
    pub fn simulate_x_at_pin<S: Simulator + ?Sized>(
        &self,
        circuit: &Circuit,
        sim: &mut S,
        pin: PinId,
    ) -> Result<XSimulation> {
        let name = circuit.pin(pin).name();
        sim.add_simulation_force(name, LogicValue::X)?;
        sim.simulate_forces()?;

        let mut result = XSimulation::default();
        for member in circuit.pins() {
            if sim.simulation_value(circuit.pin(member).name())?.is_x() {
                result.x_pins.insert(member);
                if circuit.is_output(member) {
                    result.failing_outputs.insert(member);
                }
            }
        }

        let value = self.captured_value(circuit, pin)?;
        sim.add_simulation_force(name, value)?;
        debug!(
            pattern = self.index,
            pin = name,
            x_pins = result.x_pins.len(),
            failing = result.failing_outputs.len(),
            "x simulation"
        );
        Ok(result)
    }

    fn captured_value(&self, circuit: &Circuit, pin: PinId) -> Result<LogicValue> {
        self.values(pin)
            .and_then(<[LogicValue]>::last)
            .copied()
            .ok_or_else(|| {
                anyhow!(
                    "pattern {} has no value for pin {}",
                    self.index,
                    circuit.pin(pin).name()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::types::LogicValue::{One, Zero};
    use crate::test_support::MemoryNetlist;

    fn inverter_circuit(nl: &mut MemoryNetlist) -> (Circuit, PinId, PinId, PinId) {
        let mut circuit = Circuit::new("inv");
        let q = circuit.get_pin(nl, "a/Q").expect("pin");
        let a = circuit.get_pin(nl, "u1/A").expect("pin");
        let y = circuit.get_pin(nl, "u1/Y").expect("pin");
        circuit.define_input(q).expect("input");
        circuit.define_output(y).expect("output");
        (circuit, q, a, y)
    }

    fn design() -> MemoryNetlist {
        MemoryNetlist::new()
            .gate("a", "DFF", &["D"], &["Q"])
            .gate("u1", "INV", &["A"], &["Y"])
            .connect("a/Q", "u1/A")
            .pattern_values(5, "a/Q", &[Zero, One])
            .pattern_values(5, "u1/A", &[Zero, One])
            .pattern_values(5, "u1/Y", &[One, Zero])
    }

    #[test]
    fn transitions_compare_first_two_frames() {
        let mut pattern = Pattern::new(1);
        pattern.set_values(PinId(0), vec![Zero, One]);
        pattern.set_values(PinId(1), vec![One, One]);
        pattern.set_values(PinId(2), vec![One]);
        pattern.set_values(PinId(4), vec![Zero, One, Zero]);
        pattern.set_values(PinId(5), vec![One, One, Zero]);
        assert!(pattern.has_transition(PinId(0)));
        assert!(!pattern.has_transition(PinId(1)));
        assert!(!pattern.has_transition(PinId(2)));
        assert!(!pattern.has_transition(PinId(3)));
        assert!(pattern.has_transition(PinId(4)));
        assert!(!pattern.has_transition(PinId(5)));
        assert_eq!(pattern.sim_context(), "pattern_1");
    }

    #[test]
    fn loads_values_of_member_pins() {
        let mut nl = design();
        let (circuit, q, _, y) = inverter_circuit(&mut nl);
        let mut pattern = Pattern::new(5);
        pattern.load_circuit_values(&circuit, &mut nl).expect("values");
        assert_eq!(pattern.values(q), Some(&[Zero, One][..]));
        assert_eq!(pattern.values(y), Some(&[One, Zero][..]));
        assert_eq!(nl.gate_report_pattern(), Some(5));
    }

    #[test]
    fn x_at_input_reaches_output() {
        let mut nl = design();
        let (circuit, q, a, y) = inverter_circuit(&mut nl);
        let mut pattern = Pattern::new(5);
        pattern.create_sim_context(&circuit, &mut nl).expect("context");
        assert_eq!(nl.current_context(), Some("pattern_5"));

        let result = pattern.simulate_x_at_pin(&circuit, &mut nl, q).expect("sim");
        assert_eq!(result.x_pins, [q, a, y].into());
        assert_eq!(result.failing_outputs, [y].into());

        // force restored to the captured value
        assert_eq!(nl.forced_value("a/Q"), Some(One));
    }

    #[test]
    fn activated_paths_are_deduplicated() {
        let mut pattern = Pattern::new(0);
        pattern.add_activated_pinpath(2);
        pattern.add_activated_pinpath(0);
        pattern.add_activated_pinpath(2);
        assert_eq!(pattern.activated_pinpaths(), &[2, 0]);
    }
}
