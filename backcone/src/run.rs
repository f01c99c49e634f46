//! The `analyze`, `shell` and `subcircuit` commands: launching tessent,
//! loading the failing design and writing the requested outputs.

use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};
use tshell::atpg::{PathDelayOptions, PatternFormat, create_path_delay_tests, load_verilog_subcircuit, run_step};
use tshell::circuit::plot::{DOT_PROGRAM, render_png, write_dot};
use tshell::circuit::snapshot::{read_snapshot, write_snapshot};
use tshell::circuit::verilog::write_verilog;
use tshell::circuit::{Circuit, Pattern, PinPath};
use tshell::io::config::ShellConfig;
use tshell::io::netlist::TessentDesign;
use tshell::repl::run_repl;
use tshell::schematic::{HighlightPins, HighlightStyle, Schematic};
use tshell::{CommandShell, TessentShell};

use crate::analysis::{build_backcone, write_failpaths};
use crate::config::BackconeConfig;

/// How long graph layout may take before it is abandoned.
const PLOT_TIMEOUT: Duration = Duration::from_secs(120);

/// How tessent is started for a backcone run.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    pub shell: ShellConfig,
    /// Overrides `shell.tessent_path`.
    pub tessent_path: Option<PathBuf>,
    /// Tool log; replaced if it exists.
    pub tessent_log: Option<PathBuf>,
}

impl ToolOptions {
    /// Launch tessent, logging to `tessent_log` or `default_log`.
    pub fn launch(&self, default_log: &Path) -> Result<TessentShell> {
        let log = self.tessent_log.as_deref().unwrap_or(default_log);
        let mut options = self.shell.launch_options().with_logfile(log, true);
        if let Some(path) = &self.tessent_path {
            options.tessent_path = Some(path.clone());
        }
        TessentShell::launch(&options).context("launch tessent")
    }
}

/// Select the scan pattern context, then read the flat model and patterns.
#[instrument(skip_all, fields(name = %cfg.name))]
pub fn setup_design<S: CommandShell + ?Sized>(shell: &mut S, cfg: &BackconeConfig) -> Result<()> {
    run_step(shell, "set_context pattern -scan")?;
    run_step(shell, &format!("read_flat_model {}", cfg.flatmodel.display()))?;
    run_step(shell, &format!("read_patterns {}", cfg.pattern_file().display()))?;
    info!(patterns = %cfg.pattern_file().display(), "design loaded");
    Ok(())
}

/// What `analyze` should produce.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub analyze_patterns: bool,
    pub write_verilog: bool,
    pub write_snapshot: bool,
    /// Restore circuit and patterns from a snapshot instead of tracing.
    pub from_snapshot: Option<PathBuf>,
    pub plot_graph: bool,
    /// Generate path delay tests for the activated paths into this file.
    pub path_delay_patterns: Option<(PathBuf, PatternFormat)>,
    /// Directory the `backcone_<name>` directory is created in.
    pub out_root: PathBuf,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            analyze_patterns: true,
            write_verilog: false,
            write_snapshot: false,
            from_snapshot: None,
            plot_graph: false,
            path_delay_patterns: None,
            out_root: PathBuf::from("."),
        }
    }
}

/// Files written by [`analyze`], inside its output directory.
pub mod files {
    pub const TESSENT_LOG: &str = "tessent.log";
    pub const FAILPATHS: &str = "failpaths.txt";
    pub const SNAPSHOT: &str = "backcone.json";
    pub const VERILOG: &str = "backcone.v";
    pub const DOT: &str = "backcone.dot";
    pub const PNG: &str = "backcone.png";
    pub const PATH_DELAY_FAULTS: &str = "backcone.faults";
}

/// What an analysis run found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeSummary {
    pub out_dir: PathBuf,
    pub pins: usize,
    pub inputs: usize,
    pub outputs: usize,
    pub paths: usize,
    pub patterns: usize,
    /// Distinct paths activated by any pattern.
    pub activated_paths: usize,
}

/// Run a backcone analysis and write its outputs under
/// `<out_root>/backcone_<name>/`.
#[instrument(skip_all, fields(name = %cfg.name))]
pub fn analyze(cfg: &BackconeConfig, tool: &ToolOptions, options: &AnalyzeOptions) -> Result<AnalyzeSummary> {
    let out_dir = options.out_root.join(cfg.output_dir_name());
    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;

    let mut shell = tool.launch(&out_dir.join(files::TESSENT_LOG))?;
    setup_design(&mut shell, cfg)?;
    let mut design = TessentDesign::new(&mut shell);

    let (mut circuit, patterns) = match &options.from_snapshot {
        Some(snapshot) => {
            info!(path = %snapshot.display(), "restoring backcone");
            read_snapshot(snapshot)?
        }
        None => build_backcone(cfg, &mut design, options.analyze_patterns)?,
    };

    if options.analyze_patterns {
        write_failpaths(&out_dir.join(files::FAILPATHS), &mut circuit, &patterns)?;
    }
    if options.write_snapshot {
        write_snapshot(&out_dir.join(files::SNAPSHOT), &mut circuit, &patterns)?;
    }
    if options.write_verilog {
        write_verilog(&circuit, &mut design, &out_dir.join(files::VERILOG))?;
    }
    if options.plot_graph {
        plot(&circuit, &out_dir)?;
    }
    if let Some((out, format)) = &options.path_delay_patterns {
        path_delay_tests(&mut circuit, &patterns, design.shell_mut(), &out_dir, out, *format)?;
    }

    let paths = circuit.pinpaths()?.len();
    let summary = AnalyzeSummary {
        out_dir,
        pins: circuit.pin_count(),
        inputs: circuit.inputs().len(),
        outputs: circuit.outputs().len(),
        paths,
        patterns: patterns.len(),
        activated_paths: activated_paths(&patterns).len(),
    };
    drop(design);
    shell.close().context("close tessent")?;
    Ok(summary)
}

/// Write the DOT graph and lay it out as PNG. A missing or failing layout
/// program leaves the DOT file in place.
fn plot(circuit: &Circuit, out_dir: &Path) -> Result<()> {
    let dot = out_dir.join(files::DOT);
    write_dot(circuit, &dot)?;
    if let Err(err) = render_png(Path::new(DOT_PROGRAM), &dot, &out_dir.join(files::PNG), PLOT_TIMEOUT) {
        warn!(err = %format!("{err:#}"), dot = %dot.display(), "graph layout failed, kept dot file");
    }
    Ok(())
}

fn path_delay_tests<S: CommandShell + ?Sized>(
    circuit: &mut Circuit,
    patterns: &[Pattern],
    shell: &mut S,
    out_dir: &Path,
    out: &Path,
    format: PatternFormat,
) -> Result<()> {
    let wanted = activated_paths(patterns);
    if wanted.is_empty() {
        warn!("no activated paths, skipping path delay tests");
        return Ok(());
    }
    circuit.pinpaths()?;
    let circuit = &*circuit;
    let paths: Vec<&PinPath> = circuit
        .cached_pinpaths()
        .unwrap_or_default()
        .iter()
        .filter(|path| wanted.contains(&path.index()))
        .collect();
    let options = PathDelayOptions {
        fault_file: out_dir.join(files::PATH_DELAY_FAULTS),
        patterns: Some((out.to_path_buf(), format)),
        ..PathDelayOptions::default()
    };
    create_path_delay_tests(shell, circuit, &paths, &options)
}

fn activated_paths(patterns: &[Pattern]) -> BTreeSet<usize> {
    patterns
        .iter()
        .flat_map(|pattern| pattern.activated_pinpaths().iter().copied())
        .collect()
}

/// One-paragraph description of a restored backcone.
pub fn describe(circuit: &Circuit, patterns: &[Pattern]) -> String {
    let paths = circuit.cached_pinpaths().map_or(0, |paths| paths.len());
    let mut out = format!(
        "backcone {}: {} pins, {} gates, {} inputs, {} outputs, {} paths\n",
        circuit.name(),
        circuit.pin_count(),
        circuit.gates().count(),
        circuit.inputs().len(),
        circuit.outputs().len(),
        paths
    );
    for pattern in patterns {
        out.push_str(&format!(
            "  pattern {}: {} activated paths\n",
            pattern.index(),
            pattern.activated_pinpaths().len()
        ));
    }
    out
}

/// Pins to highlight for `pattern`: every pin on its activated paths, with
/// the circuit inputs and outputs among them marked.
pub fn highlight_pins(circuit: &Circuit, pattern: &Pattern) -> HighlightPins {
    let paths = circuit.cached_pinpaths().unwrap_or_default();
    let mut seen = BTreeSet::new();
    let mut pins = HighlightPins::default();
    for path in pattern
        .activated_pinpaths()
        .iter()
        .filter_map(|&index| paths.get(index))
    {
        for &pin in path.pins() {
            if !seen.insert(pin) {
                continue;
            }
            let name = circuit.pin(pin).name().to_string();
            if circuit.is_input(pin) {
                pins.inputs.push(name.clone());
            }
            if circuit.is_output(pin) {
                pins.outputs.push(name.clone());
            }
            pins.path.push(name);
        }
    }
    pins
}

/// What `shell` should do before handing over to the user.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    pub snapshot: PathBuf,
    /// Highlight this pattern's activated paths in the schematic viewer.
    pub highlight_pattern: Option<u32>,
}

/// Load the design and a saved backcone, print a summary, then relay
/// commands from `input` until `close`.
pub fn interactive<R: BufRead, W: Write>(
    cfg: &BackconeConfig,
    tool: &ToolOptions,
    options: &ShellOptions,
    input: R,
    mut output: W,
) -> Result<()> {
    let (circuit, patterns) = read_snapshot(&options.snapshot)?;
    let mut shell = tool.launch(Path::new(files::TESSENT_LOG))?;
    setup_design(&mut shell, cfg)?;
    write!(output, "{}", describe(&circuit, &patterns)).context("write summary")?;

    if let Some(index) = options.highlight_pattern {
        let pattern = patterns
            .iter()
            .find(|pattern| pattern.index() == index)
            .ok_or_else(|| anyhow!("pattern {index} is not in {}", options.snapshot.display()))?;
        let pins = highlight_pins(&circuit, pattern);
        let style = HighlightStyle {
            message: format!("Pattern {index}"),
            ..HighlightStyle::default()
        };
        let mut schematic = Schematic::new(&mut shell);
        schematic.display_pins(&pins, &style)?;
        info!(pattern = index, pins = pins.path.len(), "highlighted activated paths");
    }

    run_repl(&mut shell, input, &mut output)?;
    shell.close().context("close tessent")?;
    Ok(())
}

/// Load a Verilog subcircuit into a fresh tool session, then relay commands
/// from `input` until `close`.
pub fn subcircuit<R: BufRead, W: Write>(
    verilog: &Path,
    cell_library_dir: &Path,
    tool: &ToolOptions,
    input: R,
    output: W,
) -> Result<()> {
    let mut shell = tool.launch(Path::new(files::TESSENT_LOG))?;
    load_verilog_subcircuit(&mut shell, verilog, cell_library_dir)?;
    run_repl(&mut shell, input, output)?;
    shell.close().context("close tessent")?;
    Ok(())
}
