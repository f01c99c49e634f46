//! Launch options for `tessent -shell` and the argument list they produce.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::prompt::{DEFAULT_PROMPTS, PromptSet};

/// Executable name searched on `PATH` when no explicit path is configured.
pub const DEFAULT_TESSENT: &str = "tessent";
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How to start a tessent shell session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Tcl dofile executed at startup (`-dofile`).
    pub dofile: Option<PathBuf>,
    /// Tool log file (`-logfile`).
    pub logfile: Option<PathBuf>,
    /// Overwrite an existing log file (`-replace`); only used with `logfile`.
    pub replace: bool,
    /// Values passed through `-arguments key=value`.
    pub arguments: BTreeMap<String, String>,
    /// Default wait for a prompt. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Explicit executable. `None` searches `PATH` for `tessent`.
    pub tessent_path: Option<PathBuf>,
    pub prompts: Vec<String>,
    /// File everything the tool prints is appended to.
    pub transcript: Option<PathBuf>,
    /// How long `close` waits for the tool to exit before killing it.
    pub close_grace: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            dofile: None,
            logfile: None,
            replace: false,
            arguments: BTreeMap::new(),
            timeout: None,
            tessent_path: None,
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            transcript: None,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl LaunchOptions {
    pub fn with_logfile(mut self, logfile: impl Into<PathBuf>, replace: bool) -> Self {
        self.logfile = Some(logfile.into());
        self.replace = replace;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tessent_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tessent_path = Some(path.into());
        self
    }

    pub fn prompt_set(&self) -> PromptSet {
        PromptSet::new(self.prompts.clone())
    }
}

/// Command-line arguments for `tessent` (excluding the executable).
pub fn build_args(options: &LaunchOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-shell".into()];
    if let Some(dofile) = &options.dofile {
        args.push("-dofile".into());
        args.push(dofile.into());
    }
    if let Some(logfile) = &options.logfile {
        args.push("-logfile".into());
        args.push(logfile.into());
        if options.replace {
            args.push("-replace".into());
        }
    }
    if !options.arguments.is_empty() {
        args.push("-arguments".into());
        for (key, value) in &options.arguments {
            args.push(format!("{key}={value}").into());
        }
    }
    args
}
