//! Pattern generation flows built from tessent commands.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use tracing::{debug, info, instrument};

use crate::circuit::{Circuit, PinPath};
use crate::io::shell::CommandShell;
use crate::io::write_atomic;

/// Marker tessent puts in front of command errors.
const ERROR_MARKER: &str = "// Error";

/// Send `command` and fail if the tool reports an error.
pub fn run_step<S: CommandShell + ?Sized>(shell: &mut S, command: &str) -> Result<String> {
    debug!(command, "tessent step");
    let response = shell
        .send_command(command)
        .with_context(|| format!("tessent command `{command}`"))?;
    if let Some(line) = response.lines().find(|line| line.contains(ERROR_MARKER)) {
        bail!("tessent rejected `{command}`: {}", line.trim());
    }
    Ok(response)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PatternFormat {
    #[default]
    Patdb,
    Stil,
    Ascii,
    Bin,
}

impl PatternFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternFormat::Patdb => "patdb",
            PatternFormat::Stil => "stil",
            PatternFormat::Ascii => "ascii",
            PatternFormat::Bin => "bin",
        }
    }
}

impl fmt::Display for PatternFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FaultType {
    Stuck,
    Transition,
}

impl FaultType {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultType::Stuck => "stuck",
            FaultType::Transition => "transition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CoverageEffort {
    Low,
    Medium,
    #[default]
    High,
}

impl CoverageEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            CoverageEffort::Low => "low",
            CoverageEffort::Medium => "medium",
            CoverageEffort::High => "high",
        }
    }
}

/// Deterministic ATPG run over a flat model.
#[derive(Debug, Clone)]
pub struct AtpgRequest {
    pub flat_model: PathBuf,
    pub out: PathBuf,
    pub format: PatternFormat,
    pub fault_type: Option<FaultType>,
    pub effort: CoverageEffort,
    pub replace: bool,
}

impl AtpgRequest {
    pub fn new(flat_model: impl Into<PathBuf>, out: impl Into<PathBuf>) -> Self {
        Self {
            flat_model: flat_model.into(),
            out: out.into(),
            format: PatternFormat::default(),
            fault_type: None,
            effort: CoverageEffort::default(),
            replace: true,
        }
    }
}

/// Random pattern simulation over a flat model.
#[derive(Debug, Clone)]
pub struct RandomPatternsRequest {
    pub flat_model: PathBuf,
    pub out: PathBuf,
    pub format: PatternFormat,
    pub fault_type: Option<FaultType>,
    pub count: u32,
    pub replace: bool,
}

impl RandomPatternsRequest {
    pub fn new(flat_model: impl Into<PathBuf>, out: impl Into<PathBuf>) -> Self {
        Self {
            flat_model: flat_model.into(),
            out: out.into(),
            format: PatternFormat::default(),
            fault_type: None,
            count: 100,
            replace: true,
        }
    }
}

fn load_flat_model<S: CommandShell + ?Sized>(
    shell: &mut S,
    flat_model: &Path,
    fault_type: Option<FaultType>,
) -> Result<()> {
    run_step(shell, "set_context pattern -scan")?;
    run_step(shell, &format!("read_flat_model {}", flat_model.display()))?;
    if let Some(fault_type) = fault_type {
        run_step(shell, &format!("set_fault_type {}", fault_type.as_str()))?;
    }
    run_step(shell, "add_faults -all")?;
    Ok(())
}

fn write_patterns<S: CommandShell + ?Sized>(
    shell: &mut S,
    out: &Path,
    format: PatternFormat,
    replace: bool,
) -> Result<()> {
    let replace = if replace { " -replace" } else { "" };
    run_step(
        shell,
        &format!("write_patterns {} -{format}{replace} -pattern_sets scan", out.display()),
    )?;
    if !out.exists() {
        bail!("did not find pattern file generated at {}", out.display());
    }
    Ok(())
}

/// Run ATPG and write the resulting pattern set.
#[instrument(skip_all, fields(flat_model = %request.flat_model.display()))]
pub fn create_atpg_patterns<S: CommandShell + ?Sized>(
    shell: &mut S,
    request: &AtpgRequest,
) -> Result<()> {
    load_flat_model(shell, &request.flat_model, request.fault_type)?;
    run_step(
        shell,
        &format!("create_patterns -coverage_effort {}", request.effort.as_str()),
    )?;
    write_patterns(shell, &request.out, request.format, request.replace)?;
    info!(out = %request.out.display(), "wrote atpg patterns");
    Ok(())
}

/// Simulate random patterns and write them.
#[instrument(skip_all, fields(flat_model = %request.flat_model.display(), count = request.count))]
pub fn create_random_patterns<S: CommandShell + ?Sized>(
    shell: &mut S,
    request: &RandomPatternsRequest,
) -> Result<()> {
    load_flat_model(shell, &request.flat_model, request.fault_type)?;
    if request.fault_type == Some(FaultType::Transition) {
        run_step(shell, "set_pattern_type -sequential 2")?;
        run_step(shell, "set_random_clocks clock")?;
    }
    run_step(shell, &format!("set_random_patterns {}", request.count))?;
    run_step(shell, "simulate_patterns -source random -store_patterns all")?;
    write_patterns(shell, &request.out, request.format, request.replace)?;
    info!(out = %request.out.display(), "wrote random patterns");
    Ok(())
}

/// Settings for [`create_path_delay_tests`].
#[derive(Debug, Clone)]
pub struct PathDelayOptions {
    pub robust: bool,
    pub hazard_free: bool,
    /// Where the path definitions are written for `read_fault_sites`.
    pub fault_file: PathBuf,
    /// Pattern file to write, with its format.
    pub patterns: Option<(PathBuf, PatternFormat)>,
}

impl Default for PathDelayOptions {
    fn default() -> Self {
        Self {
            robust: true,
            hazard_free: false,
            fault_file: PathBuf::from("pdf_temp.faults"),
            patterns: None,
        }
    }
}

impl PathDelayOptions {
    fn fault_type_command(&self) -> String {
        let mut command = String::from("set_fault_type path_delay -mask_nonobservation_points");
        if self.hazard_free {
            command.push_str(" -robust_detection_only -hazard_free_robust_detections");
        } else if self.robust {
            command.push_str(" -robust_detection_only");
        }
        command
    }
}

/// Path delay fault definitions for `paths`, one block per path.
pub fn pdf_definitions(circuit: &Circuit, paths: &[&PinPath]) -> String {
    paths
        .iter()
        .map(|path| format!("{}\n\n", path.pdf_definition(circuit)))
        .collect()
}

/// Generate path delay tests for `paths` in the currently loaded design.
#[instrument(skip_all, fields(paths = paths.len()))]
pub fn create_path_delay_tests<S: CommandShell + ?Sized>(
    shell: &mut S,
    circuit: &Circuit,
    paths: &[&PinPath],
    options: &PathDelayOptions,
) -> Result<()> {
    run_step(shell, "set_pattern_type -sequential 2")?;
    run_step(shell, "set_fault_type path_delay")?;

    write_atomic(&options.fault_file, &pdf_definitions(circuit, paths))
        .with_context(|| format!("write fault sites {}", options.fault_file.display()))?;
    run_step(
        shell,
        &format!("read_fault_sites {}", options.fault_file.display()),
    )?;

    run_step(shell, &options.fault_type_command())?;
    run_step(shell, "add_faults -all")?;
    run_step(shell, "create_patterns")?;

    if let Some((out, format)) = &options.patterns {
        write_patterns(shell, out, *format, true)?;
        info!(out = %out.display(), "wrote path delay patterns");
    }
    Ok(())
}

/// Load a Verilog subcircuit against the cell libraries in `cell_library_dir`
/// and enter analysis mode.
#[instrument(skip_all, fields(verilog = %verilog.display()))]
pub fn load_verilog_subcircuit<S: CommandShell + ?Sized>(
    shell: &mut S,
    verilog: &Path,
    cell_library_dir: &Path,
) -> Result<()> {
    run_step(shell, "set_context pattern -scan")?;

    let mut libraries: Vec<PathBuf> = fs::read_dir(cell_library_dir)
        .with_context(|| format!("read cell library dir {}", cell_library_dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with("lib"))
        })
        .collect();
    libraries.sort();
    if libraries.is_empty() {
        bail!("no cell libraries found in {}", cell_library_dir.display());
    }
    for library in &libraries {
        run_step(shell, &format!("read_cell_library {}", library.display()))?;
    }

    run_step(shell, &format!("read_verilog {}", verilog.display()))?;
    run_step(shell, "set_design_level top")?;
    run_step(shell, "set_system_mode analysis")?;
    info!(libraries = libraries.len(), "loaded verilog subcircuit");
    Ok(())
}
