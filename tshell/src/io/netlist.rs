//! Design queries answered by a running tessent shell.
//!
//! The [`Netlist`] and [`Simulator`] traits decouple the circuit model from
//! the tool. [`TessentDesign`] answers them by issuing tessent commands;
//! tests use an in-memory design instead.

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument};

use crate::circuit::types::{Direction, LogicValue, PinKind};
use crate::core::names::{parse_name_list, strip_braces};
use crate::io::shell::CommandShell;

/// Structural questions about the loaded flat model.
pub trait Netlist {
    /// True if `name` is a pin on a gate instance.
    fn pin_exists(&mut self, name: &str) -> Result<bool>;
    /// True if `name` is a top-level port.
    fn port_exists(&mut self, name: &str) -> Result<bool>;
    fn pin_direction(&mut self, name: &str) -> Result<Direction>;
    /// Pins driving `name`.
    fn fanin(&mut self, name: &str) -> Result<Vec<String>>;
    /// Pins driven by `name`, excluding net objects.
    fn fanout(&mut self, name: &str) -> Result<Vec<String>>;
    /// Module (cell type) instantiated by gate `name`.
    fn gate_module(&mut self, name: &str) -> Result<String>;
    fn module_ports(&mut self, module: &str, direction: Direction) -> Result<Vec<String>>;
    /// Net attached to a pin. Drivers (gate outputs and primary inputs) find
    /// it through their fanout, loads through their fanin.
    fn pin_net(&mut self, pin: &str, kind: PinKind, direction: Direction) -> Result<String>;
    /// Capture pin of scan cell `cell` on scan chain `chain`.
    fn scan_cell_pin(&mut self, chain: &str, cell: u32) -> Result<String>;
    /// Sequential endpoints reached by tracing backward from `pin`.
    fn trace_backward(&mut self, pin: &str) -> Result<Vec<String>>;
}

/// Pattern values and good-machine simulation.
pub trait Simulator {
    /// Make gate reports show the values of pattern `index`.
    fn set_gate_report_pattern(&mut self, index: u32) -> Result<()>;
    /// Values of `pin` under the current gate report, one per capture frame.
    fn pin_values(&mut self, pin: &str) -> Result<Vec<LogicValue>>;
    fn add_simulation_context(&mut self, name: &str, copy_from: &str) -> Result<()>;
    fn set_current_simulation_context(&mut self, name: &str) -> Result<()>;
    fn add_simulation_force(&mut self, pin: &str, value: LogicValue) -> Result<()>;
    fn simulate_forces(&mut self) -> Result<()>;
    fn simulation_value(&mut self, pin: &str) -> Result<LogicValue>;
}

/// [`Netlist`] and [`Simulator`] backed by tessent commands.
pub struct TessentDesign<S> {
    shell: S,
}

impl<S: CommandShell> TessentDesign<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    pub fn into_inner(self) -> S {
        self.shell
    }

    fn send(&mut self, command: &str) -> Result<String> {
        self.shell
            .send_command(command)
            .with_context(|| format!("tessent command `{command}`"))
    }

    fn object_type(&mut self, name: &str) -> Result<String> {
        let response = self.send(&format!("get_attribute_value_list {name} -name object_type"))?;
        Ok(response.trim().to_string())
    }
}

impl<S: CommandShell> Netlist for TessentDesign<S> {
    fn pin_exists(&mut self, name: &str) -> Result<bool> {
        Ok(!self.send(&format!("get_pin {name}"))?.contains("Error"))
    }

    fn port_exists(&mut self, name: &str) -> Result<bool> {
        Ok(!self.send(&format!("get_port {name}"))?.contains("Error"))
    }

    fn pin_direction(&mut self, name: &str) -> Result<Direction> {
        let response = self.send(&format!(
            "get_single_attribute_value {name} -name direction"
        ))?;
        response
            .parse()
            .with_context(|| format!("direction of {name}"))
    }

    fn fanin(&mut self, name: &str) -> Result<Vec<String>> {
        let response = self.send(&format!("get_name_list [get_fanin {name}]"))?;
        Ok(parse_name_list(&response))
    }

    #[instrument(skip(self))]
    fn fanout(&mut self, name: &str) -> Result<Vec<String>> {
        let response = self.send(&format!("get_name_list [get_fanout {name}]"))?;
        let mut pins = Vec::new();
        for candidate in parse_name_list(&response) {
            if self.object_type(&candidate)? == "net" {
                debug!(net = %candidate, "skipping net in fanout");
                continue;
            }
            pins.push(candidate);
        }
        Ok(pins)
    }

    fn gate_module(&mut self, name: &str) -> Result<String> {
        let response = self.send(&format!(
            "get_single_attribute_value {name} -name module_name"
        ))?;
        Ok(response.trim().to_string())
    }

    fn module_ports(&mut self, module: &str, direction: Direction) -> Result<Vec<String>> {
        let response = self.send(&format!(
            "get_ports -of_module {module} -direction {direction}"
        ))?;
        Ok(strip_braces(&response)
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    fn pin_net(&mut self, pin: &str, kind: PinKind, direction: Direction) -> Result<String> {
        let query = match (kind, direction) {
            (PinKind::PrimaryInput, _) | (PinKind::Gate, Direction::Output) => "get_fanout",
            (PinKind::PrimaryOutput, _) | (PinKind::Gate, Direction::Input) => "get_fanin",
        };
        let response = self.send(&format!("{query} {pin} -stop_on net"))?;
        let net = strip_braces(&response);
        if net.is_empty() {
            bail!("no net found for {pin}");
        }
        Ok(net.to_string())
    }

    fn scan_cell_pin(&mut self, chain: &str, cell: u32) -> Result<String> {
        let report = self.send(&format!("report_scan_cell {chain} -range {cell} {cell}"))?;
        parse_scan_cell_report(&report)
            .with_context(|| format!("scan cell {cell} of chain {chain}"))
    }

    fn trace_backward(&mut self, pin: &str) -> Result<Vec<String>> {
        let response = self.send(&format!(
            "get_attribute_value_list [trace_flat_model -from {pin} -direction backward \
             -map_tag_to_design_module_boundary on] -name name"
        ))?;
        Ok(parse_name_list(&response))
    }
}

impl<S: CommandShell> Simulator for TessentDesign<S> {
    fn set_gate_report_pattern(&mut self, index: u32) -> Result<()> {
        self.send(&format!("set_gate_report pattern_index {index} -external"))?;
        Ok(())
    }

    fn pin_values(&mut self, pin: &str) -> Result<Vec<LogicValue>> {
        let report = self.send(&format!("report_gate {pin}"))?;
        let leaf = pin.rsplit('/').next().unwrap_or(pin);
        parse_gate_report_values(&report, leaf)
    }

    fn add_simulation_context(&mut self, name: &str, copy_from: &str) -> Result<()> {
        self.send(&format!("add_simulation_context {name} -copy_from {copy_from}"))?;
        Ok(())
    }

    fn set_current_simulation_context(&mut self, name: &str) -> Result<()> {
        self.send(&format!("set_current_simulation_context {name}"))?;
        Ok(())
    }

    fn add_simulation_force(&mut self, pin: &str, value: LogicValue) -> Result<()> {
        self.send(&format!("add_simulation_forces {{{pin}}} -value {value}"))?;
        Ok(())
    }

    fn simulate_forces(&mut self) -> Result<()> {
        self.send("simulate_forces")?;
        Ok(())
    }

    fn simulation_value(&mut self, pin: &str) -> Result<LogicValue> {
        let response = self.send(&format!("get_simulation_value_list {{{pin}}}"))?;
        strip_braces(&response)
            .parse()
            .with_context(|| format!("simulation value of {pin}"))
    }
}

/// Capture pin named by the last line of a `report_scan_cell` report.
///
/// Columns 10 and 11 hold the cell instance and its internal primitive. An
/// empty primitive (`""`) means the instance's `d` pin; otherwise the
/// primitive path maps onto the data pin (`bit` → `d`, `_inst` dropped).
pub fn parse_scan_cell_report(report: &str) -> Result<String> {
    let line = report
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| anyhow!("empty scan cell report"))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (instance, primitive) = match fields.get(9..11) {
        Some([instance, primitive]) => (*instance, *primitive),
        _ => bail!("scan cell report line has {} fields: {line:?}", fields.len()),
    };

    let pin = if primitive == "\"\"" {
        format!("{instance}/d")
    } else {
        let data_pin = primitive.replace("bit", "d").replace("_inst", "");
        format!("{instance}/{data_pin}")
    };
    Ok(pin.strip_prefix('/').unwrap_or(&pin).to_string())
}

/// Values reported for pin `leaf` in a `report_gate` listing.
///
/// The value column sits two tokens after the pin name, e.g. `(01-1)`:
/// the outer characters are dropped, the rest is split on `-`, and the
/// first character of each part that is a logic value is kept.
pub fn parse_gate_report_values(report: &str, leaf: &str) -> Result<Vec<LogicValue>> {
    let fields: Vec<&str> = report.split_whitespace().collect();
    let position = fields
        .iter()
        .position(|field| *field == leaf)
        .ok_or_else(|| anyhow!("could not find pin {leaf} in gate report {report:?}"))?;
    let value_field = fields
        .get(position + 2)
        .ok_or_else(|| anyhow!("gate report ends before value of pin {leaf}"))?;

    let mut chars = value_field.chars();
    chars.next();
    chars.next_back();
    Ok(chars
        .as_str()
        .split('-')
        .filter_map(|part| part.chars().next().and_then(LogicValue::from_char))
        .collect())
}
