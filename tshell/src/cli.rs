//! Command-line flags shared by the tessent tools.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;

use crate::core::launch::LaunchOptions;
use crate::io::config::ShellConfig;

/// Flags controlling how `tessent -shell` is started.
#[derive(Debug, Clone, Default, Args)]
pub struct LaunchArgs {
    /// Tessent executable (overrides the config file).
    #[arg(long, value_name = "PATH")]
    pub tessent_path: Option<PathBuf>,
    /// Tcl dofile run at startup.
    #[arg(long, value_name = "PATH")]
    pub dofile: Option<PathBuf>,
    /// Tool log file.
    #[arg(long, value_name = "PATH")]
    pub logfile: Option<PathBuf>,
    /// Overwrite the log file if it exists.
    #[arg(long, requires = "logfile")]
    pub replace: bool,
    /// Value passed through `-arguments` (repeatable).
    #[arg(long = "arg", value_name = "K=V", value_parser = parse_key_value)]
    pub arguments: Vec<(String, String)>,
    /// Seconds to wait for each prompt; 0 waits forever.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl LaunchArgs {
    /// Launch options from `cfg`, overridden by any flags given.
    pub fn launch_options(&self, cfg: &ShellConfig) -> LaunchOptions {
        let mut options = cfg.launch_options();
        if let Some(path) = &self.tessent_path {
            options.tessent_path = Some(path.clone());
        }
        options.dofile = self.dofile.clone();
        options.logfile = self.logfile.clone();
        options.replace = self.replace;
        options
            .arguments
            .extend(self.arguments.iter().cloned());
        if let Some(secs) = self.timeout_secs {
            options.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        options
    }
}

/// Parse `key=value`.
pub fn parse_key_value(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => bail!("expected KEY=VALUE, got {raw:?}"),
    }
}
