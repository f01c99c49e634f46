//! Driver for the interactive `tessent -shell` tool, plus the circuit model
//! and analysis flows built on it.
//!
//! - **[`core`]**: Pure logic (prompt scanning, response cleanup, launch
//!   arguments, tessent names). No I/O.
//! - **[`io`]**: Side effects: the tool process and session, config files,
//!   design queries answered by the tool.
//! - **[`circuit`]**: Subcircuits pulled out of the flat model, their graphs,
//!   pin paths, pattern values, and Verilog/JSON/DOT exports.
//!
//! Flows ([`atpg`], [`schematic`], [`repl`]) compose shell commands into the
//! tasks the CLIs expose.

pub mod atpg;
pub mod circuit;
pub mod cli;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repl;
pub mod schematic;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::ShellError;
pub use io::shell::{CommandShell, TessentShell};
