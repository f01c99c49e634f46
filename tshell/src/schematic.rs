//! Highlighting pin sets on the tessent flat schematic viewer.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::io::shell::CommandShell;

/// Pins to highlight: a path plus the pins marked as its inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightPins {
    pub path: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl HighlightPins {
    /// Pins that are both inputs and outputs, sorted.
    pub fn io_pins(&self) -> Vec<String> {
        let outputs: BTreeSet<&String> = self.outputs.iter().collect();
        let io: BTreeSet<&String> = self
            .inputs
            .iter()
            .filter(|pin| outputs.contains(pin))
            .collect();
        io.into_iter().cloned().collect()
    }
}

/// Colors and reach of a highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightStyle {
    pub message: String,
    /// Distance limit for forward/backward connections.
    pub levels: u32,
    /// Also trace connections up to end points.
    pub end_points: bool,
    pub path_color: String,
    pub forward_color: String,
    pub backward_color: String,
    pub input_color: String,
    pub io_color: String,
    pub output_color: String,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            message: "Component".to_string(),
            levels: 1,
            end_points: false,
            path_color: "pink".to_string(),
            forward_color: "green".to_string(),
            backward_color: "blue".to_string(),
            input_color: "red".to_string(),
            io_color: "orange".to_string(),
            output_color: "yellow".to_string(),
        }
    }
}

fn tcl_list(items: &[String]) -> String {
    format!("{{{}}}", items.join(" "))
}

/// Schematic commands on top of a shell.
pub struct Schematic<S> {
    shell: S,
}

impl<S: CommandShell> Schematic<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    pub fn into_inner(self) -> S {
        self.shell
    }

    /// Send a command as is.
    pub fn command(&mut self, command: &str) -> Result<String> {
        self.shell
            .send_command(command)
            .with_context(|| format!("tessent command `{command}`"))
    }

    /// Highlight `pins` and their neighborhood; returns the tool's combined output.
    #[instrument(skip_all, fields(path = pins.path.len()))]
    pub fn display_pins(&mut self, pins: &HighlightPins, style: &HighlightStyle) -> Result<String> {
        let path = tcl_list(&pins.path);
        let levels = style.levels;
        let mut commands = vec![
            format!("add_schematic_objects {path} -highlight {}", style.path_color),
            format!("add_schematic_callout {path} -message \"{}\"", style.message),
        ];
        let mut kinds = Vec::new();
        if style.end_points {
            kinds.push("end_point");
        }
        kinds.push("decision_point");
        for kind in kinds {
            commands.push(format!(
                "add_schematic_connections {path} -forward {kind} -distance_limit {levels} -highlight {}",
                style.forward_color
            ));
            commands.push(format!(
                "add_schematic_connections {path} -backward {kind} -distance_limit {levels} -highlight {}",
                style.backward_color
            ));
        }
        commands.push(format!(
            "add_schematic_objects {} -highlight {}",
            tcl_list(&pins.inputs),
            style.input_color
        ));
        commands.push(format!(
            "add_schematic_objects {} -highlight {}",
            tcl_list(&pins.outputs),
            style.output_color
        ));
        commands.push(format!(
            "add_schematic_objects {} -highlight {}",
            tcl_list(&pins.io_pins()),
            style.io_color
        ));

        let mut output = String::new();
        for command in &commands {
            let response = self.command(command)?;
            if !response.is_empty() {
                output.push_str(&response);
                output.push('\n');
            }
        }
        Ok(output)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.command("delete_schematic_objects -all")?;
        Ok(())
    }

    /// `set_context patterns -<context>`, e.g. `scan`.
    pub fn set_context(&mut self, context: &str) -> Result<String> {
        self.command(&format!("set_context patterns -{context}"))
    }

    pub fn read_flat_model(&mut self, path: &Path) -> Result<String> {
        self.command(&format!("read_flat_model {}", path.display()))
    }

    pub fn read_patterns(&mut self, path: &Path) -> Result<String> {
        self.command(&format!("read_patterns {}", path.display()))
    }

    /// Read SDF delays; selects transition faults first.
    pub fn read_sdf(&mut self, path: &Path) -> Result<String> {
        self.command("set_fault_type transition")?;
        self.command(&format!("read_sdf {}", path.display()))
    }

    pub fn set_gate_report(&mut self, switches: &[&str]) -> Result<String> {
        self.command(&format!("set_gate_report {}", switches.join(" ")))
    }
}
