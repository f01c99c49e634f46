//! Live `tessent -shell` session: send a command line, wait for the next
//! prompt, return what the tool printed in between.

use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::launch::{DEFAULT_TESSENT, LaunchOptions, build_args};
use crate::core::prompt::{PromptSet, clean_response};
use crate::error::ShellError;
use crate::io::process::{InteractiveChild, spawn_interactive};

/// Command sent by `close` to leave the tool.
pub const EXIT_COMMAND: &str = "exit -force";

/// Anything that accepts a tessent command and returns its response.
pub trait CommandShell {
    fn send_command(&mut self, command: &str) -> Result<String, ShellError>;
}

impl<T: CommandShell + ?Sized> CommandShell for &mut T {
    fn send_command(&mut self, command: &str) -> Result<String, ShellError> {
        (**self).send_command(command)
    }
}

/// Handle to one `tessent -shell` process.
pub struct TessentShell {
    session: Option<InteractiveChild>,
    tessent_path: PathBuf,
    prompts: PromptSet,
    timeout: Option<Duration>,
    close_grace: Duration,
    banner: String,
    current_prompt: Option<usize>,
    /// Prompts still owed by commands that timed out.
    owed_prompts: usize,
}

impl TessentShell {
    /// Start the tool and wait until it is ready for commands.
    #[instrument(skip_all, fields(timeout = ?options.timeout))]
    pub fn launch(options: &LaunchOptions) -> Result<Self, ShellError> {
        let tessent_path = resolve_tessent_path(options.tessent_path.as_deref())?;
        let mut cmd = Command::new(&tessent_path);
        cmd.args(build_args(options));
        info!(program = %tessent_path.display(), args = ?cmd.get_args().collect::<Vec<_>>(), "launching tessent");

        let mut session = spawn_interactive(cmd, options.transcript.as_deref())?;
        let prompts = options.prompt_set();
        let (banner, prompt) = match session.output.read_until_prompt(&prompts, options.timeout) {
            Ok(ready) => ready,
            Err(err) => {
                warn!(err = %err, "tessent did not reach a prompt, killing");
                let _ = session.child.kill();
                let _ = session.child.wait();
                return Err(err);
            }
        };
        debug!(pid = session.child.id(), "tessent ready");

        Ok(Self {
            session: Some(session),
            tessent_path,
            prompts,
            timeout: options.timeout,
            close_grace: options.close_grace,
            banner: banner.replace('\r', "").trim_end().to_string(),
            current_prompt: Some(prompt),
            owed_prompts: 0,
        })
    }

    /// Send one command line, waiting at most `timeout` (or the session
    /// default when `None`) for the tool to return to a prompt.
    ///
    /// Output of earlier commands that timed out is read up to their prompts
    /// and discarded first, within the same deadline. If those prompts do not
    /// arrive in time the command is not sent and `Timeout` is returned.
    #[instrument(skip(self), fields(timeout = ?timeout.or(self.timeout)))]
    pub fn send_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ShellError> {
        if command.contains('\n') {
            return Err(ShellError::MultilineCommand(command.to_string()));
        }
        let timeout = timeout.or(self.timeout);
        let started = Instant::now();
        let remaining = || timeout.map(|limit| limit.saturating_sub(started.elapsed()));
        let session = self.session.as_mut().ok_or(ShellError::Closed)?;

        while self.owed_prompts > 0 {
            let (stale, prompt) = session.output.read_until_prompt(&self.prompts, remaining())?;
            self.owed_prompts -= 1;
            self.current_prompt = Some(prompt);
            debug!(bytes = stale.len(), "discarded output of a timed-out command");
        }

        let written = session
            .stdin
            .write_all(format!("{command}\n").as_bytes())
            .and_then(|()| session.stdin.flush());
        if let Err(e) = written {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Err(ShellError::ProcessExited {
                    output: String::new(),
                });
            }
            return Err(e.into());
        }

        let (raw, prompt) = match session.output.read_until_prompt(&self.prompts, remaining()) {
            Ok(done) => done,
            Err(err @ ShellError::Timeout { .. }) => {
                self.owed_prompts += 1;
                warn!(command, owed = self.owed_prompts, "command timed out, tool still busy");
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        self.current_prompt = Some(prompt);
        let response = clean_response(&raw, command);
        debug!(bytes = response.len(), "command finished");
        Ok(response)
    }

    /// Leave the tool and reap the process. Safe to call more than once.
    #[instrument(skip(self))]
    pub fn close(&mut self) -> Result<(), ShellError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.current_prompt = None;
        self.owed_prompts = 0;

        // The tool exits without printing a prompt, so write directly instead
        // of waiting for a response.
        if let Err(e) = writeln!(session.stdin, "{EXIT_COMMAND}").and_then(|()| session.stdin.flush()) {
            debug!(err = %e, "exit command not delivered");
        }
        drop(session.stdin);

        match session.child.wait_timeout(self.close_grace)? {
            Some(status) => {
                info!(exit_code = ?status.code(), "tessent exited");
            }
            None => {
                warn!(
                    grace_secs = self.close_grace.as_secs_f64(),
                    "tessent still running after exit, killing"
                );
                session.child.kill()?;
                session.child.wait()?;
            }
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// True while a timed-out command has not yet returned to a prompt.
    pub fn is_busy(&self) -> bool {
        self.owed_prompts > 0
    }

    /// Text the tool printed before its first prompt.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Prompt that ended the last exchange, i.e. the tool's current mode.
    pub fn current_prompt(&self) -> Option<&str> {
        self.current_prompt.and_then(|index| self.prompts.get(index))
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.child.id())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn tessent_path(&self) -> &Path {
        &self.tessent_path
    }

    pub fn prompts(&self) -> &[String] {
        self.prompts.prompts()
    }
}

impl CommandShell for TessentShell {
    fn send_command(&mut self, command: &str) -> Result<String, ShellError> {
        self.send_command_with_timeout(command, None)
    }
}

impl Drop for TessentShell {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(err = %err, "failed to close tessent shell");
        }
    }
}

/// Locate the tessent executable.
///
/// A path with a directory component must exist as given. A bare name
/// (including the default `tessent`) is looked up on `PATH`.
pub fn resolve_tessent_path(explicit: Option<&Path>) -> Result<PathBuf, ShellError> {
    let requested = explicit.unwrap_or_else(|| Path::new(DEFAULT_TESSENT));
    let is_bare_name = requested.components().count() == 1 && requested.parent() == Some(Path::new(""));

    if !is_bare_name {
        return if requested.is_file() {
            Ok(requested.to_path_buf())
        } else {
            Err(ShellError::NotFound {
                path: Some(requested.to_path_buf()),
            })
        };
    }

    env::var_os("PATH")
        .and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(requested))
                .find(|candidate| candidate.is_file())
        })
        .ok_or_else(|| ShellError::NotFound {
            path: explicit.map(Path::to_path_buf),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_path_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bin").join("tessent");
        let err = resolve_tessent_path(Some(&path)).expect_err("missing");
        assert!(matches!(err, ShellError::NotFound { path: Some(p) } if p == path));
    }

    #[test]
    fn existing_explicit_path_is_used_as_is() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tessent");
        std::fs::write(&path, "#!/bin/sh\n").expect("write");
        assert_eq!(resolve_tessent_path(Some(&path)).expect("resolve"), path);
    }

    #[test]
    fn unknown_bare_name_is_not_found() {
        let err = resolve_tessent_path(Some(Path::new("tessent-does-not-exist-42")))
            .expect_err("missing");
        assert!(matches!(err, ShellError::NotFound { .. }));
    }
}
