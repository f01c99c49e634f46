//! `tshell`: drive an interactive `tessent -shell` from the command line.
//!
//! Settings come from `tshell.toml` (see [`tshell::io::config`]); launch flags
//! override them per invocation.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use tshell::atpg::{
    AtpgRequest, CoverageEffort, FaultType, PatternFormat, RandomPatternsRequest,
    create_atpg_patterns, create_random_patterns,
};
use tshell::cli::LaunchArgs;
use tshell::io::config::{DEFAULT_CONFIG_FILE, ShellConfig, load_config, write_config};
use tshell::repl::run_repl;
use tshell::{CommandShell, TessentShell, exit_codes, logging};

#[derive(Parser)]
#[command(name = "tshell", version, about = "Drive an interactive tessent shell")]
struct Cli {
    /// Config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Debug logging on stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Launch the tool, run commands, print each response.
    Exec {
        #[command(flatten)]
        launch: LaunchArgs,
        /// Command to send (repeatable, sent in order).
        #[arg(short = 'c', long = "command", value_name = "CMD", required = true)]
        commands: Vec<String>,
    },
    /// Relay commands typed on stdin until `close` or `exit`.
    Repl {
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Generate patterns for a flat model.
    Atpg {
        #[command(flatten)]
        launch: LaunchArgs,
        #[arg(long, value_name = "PATH")]
        flat_model: PathBuf,
        /// Pattern file to write.
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = PatternFormat::Patdb)]
        format: PatternFormat,
        #[arg(long, value_enum)]
        fault_type: Option<FaultType>,
        #[arg(long, value_enum, default_value_t = CoverageEffort::High)]
        effort: CoverageEffort,
        /// Simulate N random patterns instead of running ATPG.
        #[arg(long, value_name = "N")]
        random: Option<u32>,
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

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Exec { launch, commands } => cmd_exec(&cli.config, &launch, &commands),
        Command::Repl { launch } => cmd_repl(&cli.config, &launch),
        Command::Atpg {
            launch,
            flat_model,
            out,
            format,
            fault_type,
            effort,
            random,
        } => {
            let mut shell = launch_shell(&cli.config, &launch)?;
            match random {
                Some(count) => {
                    let request = RandomPatternsRequest {
                        format,
                        fault_type,
                        count,
                        ..RandomPatternsRequest::new(flat_model, out)
                    };
                    create_random_patterns(&mut shell, &request)?;
                }
                None => {
                    let request = AtpgRequest {
                        format,
                        fault_type,
                        effort,
                        ..AtpgRequest::new(flat_model, out)
                    };
                    create_atpg_patterns(&mut shell, &request)?;
                }
            }
            shell.close().context("close tessent")?;
            Ok(())
        }
    }
}

fn cmd_init(config: &Path, force: bool) -> Result<()> {
    if config.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", config.display());
    }
    write_config(config, &ShellConfig::default())?;
    info!(path = %config.display(), "wrote default config");
    Ok(())
}

fn launch_shell(config: &Path, launch: &LaunchArgs) -> Result<TessentShell> {
    let cfg = load_config(config)?;
    let options = launch.launch_options(&cfg);
    TessentShell::launch(&options).context("launch tessent")
}

fn cmd_exec(config: &Path, launch: &LaunchArgs, commands: &[String]) -> Result<()> {
    let mut shell = launch_shell(config, launch)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for command in commands {
        let response = shell
            .send_command(command)
            .with_context(|| format!("tessent command `{command}`"))?;
        if !response.is_empty() {
            writeln!(out, "{response}").context("write response")?;
        }
    }
    shell.close().context("close tessent")?;
    Ok(())
}

fn cmd_repl(config: &Path, launch: &LaunchArgs) -> Result<()> {
    let mut shell = launch_shell(config, launch)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if !shell.banner().is_empty() {
        writeln!(out, "{}", shell.banner()).context("write banner")?;
    }
    run_repl(&mut shell, io::stdin().lock(), &mut out)?;
    shell.close().context("close tessent")?;
    Ok(())
}
