//! Typed failures of the tessent shell session.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure while launching or talking to a `tessent -shell` process.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The tessent executable could not be located.
    #[error("could not find tessent executable{}", display_path(.path))]
    NotFound { path: Option<PathBuf> },

    /// The process could not be started.
    #[error("spawn {}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No prompt appeared before the deadline.
    #[error("timed out after {waited:?} waiting for a prompt")]
    Timeout { waited: Duration, partial: String },

    /// The process closed its output before printing a prompt.
    #[error("tessent process exited before printing a prompt")]
    ProcessExited { output: String },

    /// The session was already closed.
    #[error("tessent shell is closed")]
    Closed,

    /// Commands are sent one line at a time.
    #[error("command contains a newline: {0:?}")]
    MultilineCommand(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" at {}", path.display()),
        None => " on PATH".to_string(),
    }
}
