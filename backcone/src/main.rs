//! `backcone`: trace failing scan cells back through a tessent flat model.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use backcone::config::load_backcone_config;
use backcone::run::{AnalyzeOptions, ShellOptions, ToolOptions, analyze, interactive, subcircuit};
use tshell::atpg::PatternFormat;
use tshell::io::config::{DEFAULT_CONFIG_FILE, load_config};
use tshell::{exit_codes, logging};

#[derive(Parser)]
#[command(name = "backcone", version, about = "Backcone analysis of failing scan cells")]
struct Cli {
    /// Shell config file (tshell format).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Debug logging on stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ToolArgs {
    /// Tessent executable (overrides the config file).
    #[arg(long, value_name = "PATH")]
    tessent_path: Option<PathBuf>,
    /// Tessent log file.
    #[arg(long, value_name = "PATH")]
    tessent_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Trace and analyse the failbits of a backcone YAML file.
    Analyze {
        /// Backcone YAML file.
        yaml: PathBuf,
        #[command(flatten)]
        tool: ToolArgs,
        /// Skip failing pattern analysis.
        #[arg(long = "no-analyze-patterns", action = ArgAction::SetFalse)]
        analyze_patterns: bool,
        /// Write the subcircuit as Verilog.
        #[arg(long)]
        write_verilog: bool,
        /// Write a JSON snapshot of the subcircuit and patterns.
        #[arg(long)]
        write_snapshot: bool,
        /// Restore the subcircuit from a snapshot instead of tracing.
        #[arg(long, value_name = "PATH")]
        from_snapshot: Option<PathBuf>,
        /// Write the gate graph (DOT, plus PNG when graphviz is available).
        #[arg(long)]
        plot_graph: bool,
        /// Generate path delay tests for the activated paths.
        #[arg(long, value_name = "PATH")]
        path_delay_patterns: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = PatternFormat::Patdb, requires = "path_delay_patterns")]
        path_delay_format: PatternFormat,
        /// Directory `backcone_<name>/` is created in.
        #[arg(long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },
    /// Load the design and a saved backcone, then relay commands from stdin.
    Shell {
        /// Backcone YAML file.
        yaml: PathBuf,
        #[arg(long, value_name = "PATH")]
        snapshot: PathBuf,
        #[command(flatten)]
        tool: ToolArgs,
        /// Highlight a pattern's activated paths in the schematic viewer.
        #[arg(long, value_name = "INDEX")]
        highlight_pattern: Option<u32>,
    },
    /// Load a Verilog subcircuit, then relay commands from stdin.
    Subcircuit {
        verilog: PathBuf,
        /// Directory holding the `*lib` cell libraries.
        #[arg(long, value_name = "DIR")]
        cell_library_dir: PathBuf,
        #[command(flatten)]
        tool: ToolArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let result = run(cli);
    if let Err(err) = &result {
        eprintln!("{:#}", err);
    }
    std::process::exit(exit_codes::for_result(&result));
}

fn tool_options(config: &Path, args: ToolArgs) -> Result<ToolOptions> {
    Ok(ToolOptions {
        shell: load_config(config)?,
        tessent_path: args.tessent_path,
        tessent_log: args.tessent_log,
    })
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze {
            yaml,
            tool,
            analyze_patterns,
            write_verilog,
            write_snapshot,
            from_snapshot,
            plot_graph,
            path_delay_patterns,
            path_delay_format,
            out_dir,
        } => {
            let cfg = load_backcone_config(&yaml)?;
            let tool = tool_options(&cli.config, tool)?;
            let options = AnalyzeOptions {
                analyze_patterns,
                write_verilog,
                write_snapshot,
                from_snapshot,
                plot_graph,
                path_delay_patterns: path_delay_patterns.map(|path| (path, path_delay_format)),
                out_root: out_dir,
            };
            let summary = analyze(&cfg, &tool, &options)?;
            info!(
                out_dir = %summary.out_dir.display(),
                pins = summary.pins,
                paths = summary.paths,
                patterns = summary.patterns,
                activated = summary.activated_paths,
                "analysis finished"
            );
            println!(
                "{}: {} pins, {} paths, {} patterns, {} activated paths",
                summary.out_dir.display(),
                summary.pins,
                summary.paths,
                summary.patterns,
                summary.activated_paths
            );
            Ok(())
        }
        Command::Shell {
            yaml,
            snapshot,
            tool,
            highlight_pattern,
        } => {
            let cfg = load_backcone_config(&yaml)?;
            let tool = tool_options(&cli.config, tool)?;
            let options = ShellOptions {
                snapshot,
                highlight_pattern,
            };
            interactive(&cfg, &tool, &options, io::stdin().lock(), io::stdout().lock())
        }
        Command::Subcircuit {
            verilog,
            cell_library_dir,
            tool,
        } => {
            let tool = tool_options(&cli.config, tool)?;
            subcircuit(
                &verilog,
                &cell_library_dir,
                &tool,
                io::stdin().lock(),
                io::stdout().lock(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_toggles_default_on_analysis_only() {
        let cli = Cli::parse_from(["backcone", "analyze", "bc.yaml"]);
        match cli.command {
            Command::Analyze {
                yaml,
                analyze_patterns,
                write_verilog,
                write_snapshot,
                plot_graph,
                from_snapshot,
                out_dir,
                ..
            } => {
                assert_eq!(yaml, PathBuf::from("bc.yaml"));
                assert!(analyze_patterns);
                assert!(!write_verilog && !write_snapshot && !plot_graph);
                assert_eq!(from_snapshot, None);
                assert_eq!(out_dir, PathBuf::from("."));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn analyze_flags_parse() {
        let cli = Cli::parse_from([
            "backcone",
            "-v",
            "analyze",
            "bc.yaml",
            "--no-analyze-patterns",
            "--write-snapshot",
            "--from-snapshot",
            "old.json",
            "--tessent-log",
            "t.log",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Analyze {
                analyze_patterns,
                write_snapshot,
                from_snapshot,
                tool,
                ..
            } => {
                assert!(!analyze_patterns);
                assert!(write_snapshot);
                assert_eq!(from_snapshot, Some(PathBuf::from("old.json")));
                assert_eq!(tool.tessent_log, Some(PathBuf::from("t.log")));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn path_delay_format_needs_an_output() {
        assert!(
            Cli::try_parse_from(["backcone", "analyze", "bc.yaml", "--path-delay-format", "stil"])
                .is_err()
        );
    }

    #[test]
    fn shell_needs_a_snapshot() {
        assert!(Cli::try_parse_from(["backcone", "shell", "bc.yaml"]).is_err());
    }
}
