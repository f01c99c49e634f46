//! Line-by-line relay between a user and a shell.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::ShellError;
use crate::io::shell::CommandShell;

/// Prompt shown before each line is read.
pub const REPL_PROMPT: &str = "tshell> ";

fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case("close") || line.eq_ignore_ascii_case("exit")
}

/// Relay lines from `input` to `shell` and responses to `output` until
/// `close`/`exit` or end of input. Returns the number of commands sent.
///
/// A command that times out is reported and the loop continues; any other
/// shell failure ends the loop with an error.
pub fn run_repl<S, R, W>(shell: &mut S, input: R, mut output: W) -> Result<usize>
where
    S: CommandShell + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut sent = 0;
    let mut lines = input.lines();
    loop {
        write!(output, "{REPL_PROMPT}").context("write prompt")?;
        output.flush().context("flush prompt")?;

        let Some(line) = lines.next() else {
            writeln!(output).context("write newline")?;
            break;
        };
        let line = line.context("read command")?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if is_quit(command) {
            break;
        }

        sent += 1;
        match shell.send_command(command) {
            Ok(response) => {
                if !response.is_empty() {
                    writeln!(output, "{response}").context("write response")?;
                }
            }
            Err(err @ ShellError::Timeout { .. }) => {
                warn!(command, err = %err, "command timed out");
                writeln!(output, "error: {err}").context("write error")?;
            }
            Err(err) => return Err(err).with_context(|| format!("tessent command `{command}`")),
        }
    }
    info!(commands = sent, "repl finished");
    Ok(sent)
}
