//! Test-only stand-ins for the tessent tool.
//!
//! - [`ScriptedShell`] answers commands from a fixed table.
//! - [`MemoryNetlist`] is a small in-memory design implementing
//!   [`Netlist`] and [`Simulator`], with structural X propagation.
//! - [`write_fake_tessent`] writes a shell script that behaves like
//!   `tessent -shell` closely enough to drive the real process plumbing.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};

use crate::circuit::types::{Direction, LogicValue, PinKind};
use crate::core::names::verilog_name;
use crate::error::ShellError;
use crate::io::netlist::{Netlist, Simulator};
use crate::io::shell::CommandShell;

/// Shell that answers from a command table and records what it was sent.
/// Unscripted commands get an empty response.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    responses: HashMap<String, String>,
    sent: Vec<String>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, response: &str) -> Self {
        self.responses
            .insert(command.to_string(), response.to_string());
        self
    }

    /// Commands received so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl CommandShell for ScriptedShell {
    fn send_command(&mut self, command: &str) -> Result<String, ShellError> {
        self.sent.push(command.to_string());
        Ok(self.responses.get(command).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct MemoryGate {
    module: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// In-memory flat model.
///
/// Gate output pins are driven by every input pin of their gate; gate input
/// pins and primary outputs are driven by whatever was [`connect`]ed to
/// them. Backward traces stop at output pins of [`sequential`] modules and
/// at primary inputs.
///
/// [`connect`]: MemoryNetlist::connect
/// [`sequential`]: MemoryNetlist::sequential
#[derive(Debug, Default)]
pub struct MemoryNetlist {
    gates: BTreeMap<String, MemoryGate>,
    ports: BTreeMap<String, Direction>,
    drivers: HashMap<String, Vec<String>>,
    loads: HashMap<String, Vec<String>>,
    sequential: BTreeSet<String>,
    scan_cells: HashMap<(String, u32), String>,
    queries: usize,

    values: HashMap<(u32, String), Vec<LogicValue>>,
    report_pattern: Option<u32>,
    contexts: BTreeSet<String>,
    current_context: Option<String>,
    forces: HashMap<String, LogicValue>,
    simulated: HashMap<String, LogicValue>,
}

impl MemoryNetlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add gate `name` of `module` with the given input and output leaf pins.
    pub fn gate(mut self, name: &str, module: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        let leaf_names = |leaves: &[&str]| leaves.iter().map(|leaf| leaf.to_string()).collect();
        self.gates.insert(
            name.to_string(),
            MemoryGate {
                module: module.to_string(),
                inputs: leaf_names(inputs),
                outputs: leaf_names(outputs),
            },
        );
        self
    }

    pub fn primary_input(mut self, name: &str) -> Self {
        self.ports.insert(name.to_string(), Direction::Input);
        self
    }

    pub fn primary_output(mut self, name: &str) -> Self {
        self.ports.insert(name.to_string(), Direction::Output);
        self
    }

    /// Wire `driver` to `load`.
    pub fn connect(mut self, driver: &str, load: &str) -> Self {
        self.drivers
            .entry(load.to_string())
            .or_default()
            .push(driver.to_string());
        self.loads
            .entry(driver.to_string())
            .or_default()
            .push(load.to_string());
        self
    }

    /// Mark `module` as a state element for backward traces.
    pub fn sequential(mut self, module: &str) -> Self {
        self.sequential.insert(module.to_string());
        self
    }

    pub fn scan_cell(mut self, chain: &str, cell: u32, pin: &str) -> Self {
        self.scan_cells
            .insert((chain.to_string(), cell), pin.to_string());
        self
    }

    /// Values `pin` reports under pattern `index`.
    pub fn pattern_values(mut self, index: u32, pin: &str, values: &[LogicValue]) -> Self {
        self.values
            .insert((index, pin.to_string()), values.to_vec());
        self
    }

    /// Number of structural queries answered so far.
    pub fn query_count(&self) -> usize {
        self.queries
    }

    pub fn gate_report_pattern(&self) -> Option<u32> {
        self.report_pattern
    }

    pub fn current_context(&self) -> Option<&str> {
        self.current_context.as_deref()
    }

    pub fn forced_value(&self, pin: &str) -> Option<LogicValue> {
        self.forces.get(pin).copied()
    }

    fn split_pin<'a>(&self, name: &'a str) -> Option<(&MemoryGate, &'a str)> {
        let (gate, leaf) = name.rsplit_once('/')?;
        let gate = self.gates.get(gate)?;
        Some((gate, leaf))
    }

    fn gate_pin_direction(&self, name: &str) -> Option<Direction> {
        let (gate, leaf) = self.split_pin(name)?;
        if gate.inputs.iter().any(|pin| pin == leaf) {
            Some(Direction::Input)
        } else if gate.outputs.iter().any(|pin| pin == leaf) {
            Some(Direction::Output)
        } else {
            None
        }
    }

    fn direction_of(&self, name: &str) -> Result<Direction> {
        self.gate_pin_direction(name)
            .or_else(|| self.ports.get(name).copied())
            .ok_or_else(|| anyhow!("no pin or port named {name}"))
    }

    fn sibling_pins(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some((gate, _)) = self.split_pin(name) else {
            return Vec::new();
        };
        let (gate_name, _) = name.rsplit_once('/').unwrap_or_default();
        let leaves = match direction {
            Direction::Input => &gate.inputs,
            Direction::Output => &gate.outputs,
        };
        leaves
            .iter()
            .map(|leaf| format!("{gate_name}/{leaf}"))
            .collect()
    }

    fn drivers_of(&self, name: &str) -> Vec<String> {
        match self.gate_pin_direction(name) {
            Some(Direction::Output) => self.sibling_pins(name, Direction::Input),
            _ => self.drivers.get(name).cloned().unwrap_or_default(),
        }
    }

    fn loads_of(&self, name: &str) -> Vec<String> {
        match self.gate_pin_direction(name) {
            Some(Direction::Input) => self.sibling_pins(name, Direction::Output),
            _ => self.loads.get(name).cloned().unwrap_or_default(),
        }
    }

    fn is_state_output(&self, name: &str) -> bool {
        self.gate_pin_direction(name) == Some(Direction::Output)
            && self
                .split_pin(name)
                .is_some_and(|(gate, _)| self.sequential.contains(&gate.module))
    }

    fn captured_value(&self, name: &str) -> LogicValue {
        self.report_pattern
            .and_then(|index| self.values.get(&(index, name.to_string())))
            .and_then(|values| values.last().copied())
            .unwrap_or(LogicValue::Zero)
    }
}

impl Netlist for MemoryNetlist {
    fn pin_exists(&mut self, name: &str) -> Result<bool> {
        self.queries += 1;
        Ok(self.gate_pin_direction(name).is_some())
    }

    fn port_exists(&mut self, name: &str) -> Result<bool> {
        self.queries += 1;
        Ok(self.ports.contains_key(name))
    }

    fn pin_direction(&mut self, name: &str) -> Result<Direction> {
        self.queries += 1;
        self.direction_of(name)
    }

    fn fanin(&mut self, name: &str) -> Result<Vec<String>> {
        self.queries += 1;
        Ok(self.drivers_of(name))
    }

    fn fanout(&mut self, name: &str) -> Result<Vec<String>> {
        self.queries += 1;
        Ok(self.loads_of(name))
    }

    fn gate_module(&mut self, name: &str) -> Result<String> {
        self.queries += 1;
        self.gates
            .get(name)
            .map(|gate| gate.module.clone())
            .ok_or_else(|| anyhow!("no gate named {name}"))
    }

    fn module_ports(&mut self, module: &str, direction: Direction) -> Result<Vec<String>> {
        self.queries += 1;
        let gate = self
            .gates
            .values()
            .find(|gate| gate.module == module)
            .ok_or_else(|| anyhow!("no module named {module}"))?;
        Ok(match direction {
            Direction::Input => gate.inputs.clone(),
            Direction::Output => gate.outputs.clone(),
        })
    }

    fn pin_net(&mut self, pin: &str, kind: PinKind, direction: Direction) -> Result<String> {
        self.queries += 1;
        let is_driver = match kind {
            PinKind::PrimaryInput => true,
            PinKind::PrimaryOutput => false,
            PinKind::Gate => direction == Direction::Output,
        };
        if is_driver {
            return Ok(format!("{}_net", verilog_name(pin)));
        }
        match self.drivers_of(pin).first() {
            Some(driver) => Ok(format!("{}_net", verilog_name(driver))),
            None => bail!("no net found for {pin}"),
        }
    }

    fn scan_cell_pin(&mut self, chain: &str, cell: u32) -> Result<String> {
        self.queries += 1;
        self.scan_cells
            .get(&(chain.to_string(), cell))
            .cloned()
            .ok_or_else(|| anyhow!("no scan cell {cell} on chain {chain}"))
    }

    fn trace_backward(&mut self, pin: &str) -> Result<Vec<String>> {
        self.queries += 1;
        let mut found = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = self.drivers_of(pin).into();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if self.is_state_output(&current) || self.ports.get(&current) == Some(&Direction::Input) {
                found.push(current);
                continue;
            }
            queue.extend(self.drivers_of(&current));
        }
        Ok(found)
    }
}

impl Simulator for MemoryNetlist {
    fn set_gate_report_pattern(&mut self, index: u32) -> Result<()> {
        self.report_pattern = Some(index);
        Ok(())
    }

    /// Unset values read as `00`.
    fn pin_values(&mut self, pin: &str) -> Result<Vec<LogicValue>> {
        let index = self
            .report_pattern
            .ok_or_else(|| anyhow!("gate report pattern not set"))?;
        self.direction_of(pin)?;
        Ok(self
            .values
            .get(&(index, pin.to_string()))
            .cloned()
            .unwrap_or_else(|| vec![LogicValue::Zero, LogicValue::Zero]))
    }

    fn add_simulation_context(&mut self, name: &str, copy_from: &str) -> Result<()> {
        if copy_from != "stable_capture" && !self.contexts.contains(copy_from) {
            bail!("unknown simulation context {copy_from}");
        }
        self.contexts.insert(name.to_string());
        Ok(())
    }

    fn set_current_simulation_context(&mut self, name: &str) -> Result<()> {
        if !self.contexts.contains(name) {
            bail!("unknown simulation context {name}");
        }
        self.current_context = Some(name.to_string());
        self.forces.clear();
        self.simulated.clear();
        Ok(())
    }

    fn add_simulation_force(&mut self, pin: &str, value: LogicValue) -> Result<()> {
        self.direction_of(pin)?;
        self.forces.insert(pin.to_string(), value);
        Ok(())
    }

    fn simulate_forces(&mut self) -> Result<()> {
        let mut queue: VecDeque<String> = self
            .forces
            .iter()
            .filter(|(_, value)| value.is_x())
            .map(|(pin, _)| pin.clone())
            .collect();
        let mut x_pins = BTreeSet::new();
        while let Some(pin) = queue.pop_front() {
            if x_pins.insert(pin.clone()) {
                queue.extend(self.loads_of(&pin));
            }
        }
        self.simulated = x_pins
            .into_iter()
            .map(|pin| (pin, LogicValue::X))
            .collect();
        Ok(())
    }

    fn simulation_value(&mut self, pin: &str) -> Result<LogicValue> {
        self.direction_of(pin)?;
        Ok(self
            .simulated
            .get(pin)
            .or_else(|| self.forces.get(pin))
            .copied()
            .unwrap_or_else(|| self.captured_value(pin)))
    }
}

/// Write an executable `tessent` stand-in into `dir` and return its path.
///
/// The script prints a banner and `SETUP> `, then answers one command per
/// line:
///
/// | command | effect |
/// |---|---|
/// | `exit -force` | exits 0 |
/// | `set_system_mode analysis` / `setup` | switches the prompt |
/// | `puts TEXT` | prints `TEXT` |
/// | `sleep N` | sleeps `N` seconds |
/// | `set_context`, `read_flat_model`, `read_patterns` | prints nothing |
/// | `report_args` | prints the script's arguments |
/// | `crash` | prints `fatal` and exits 3 |
/// | anything else | prints `// Error: unknown command ...` |
///
/// Launching with `-arguments echo=1` makes it echo each command line first.
#[cfg(unix)]
pub fn write_fake_tessent(dir: &Path) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    const SCRIPT: &str = r#"#!/bin/sh
prompt="SETUP> "
echo_mode=0
case " $* " in
  *" echo=1 "*) echo_mode=1 ;;
esac
echo "//  Tessent Shell (stand-in)"
echo "//  $*"
printf '%s' "$prompt"
while IFS= read -r line; do
  if [ "$echo_mode" = 1 ]; then
    printf '%s\n' "$line"
  fi
  case "$line" in
    "exit -force") exit 0 ;;
    "set_system_mode analysis") prompt="ANALYSIS> " ;;
    "set_system_mode setup") prompt="SETUP> " ;;
    "puts "*) printf '%s\n' "${line#puts }" ;;
    "sleep "*) sleep "${line#sleep }" ;;
    "set_context "*|"read_flat_model "*|"read_patterns "*) ;;
    report_args) printf '%s\n' "$*" ;;
    crash) printf 'fatal\n'; exit 3 ;;
    *) printf '// Error: unknown command %s\n' "$line" ;;
  esac
  printf '%s' "$prompt"
done
"#;

    let path = dir.join("tessent");
    std::fs::write(&path, SCRIPT)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
