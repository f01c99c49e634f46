//! Backcone analysis of failing scan cells.
//!
//! Given a YAML description of a failing design ([`config`]), trace the logic
//! feeding each failing scan cell ([`trace`]), build it into a
//! [`tshell::circuit::Circuit`] and find the pin paths each failing pattern
//! activates ([`analysis`]). [`run`] wires this to a live tessent session and
//! the output files.

pub mod analysis;
pub mod config;
pub mod run;
pub mod trace;
