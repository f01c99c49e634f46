//! Helpers for running child processes: one-shot commands with timeouts, and
//! long-lived interactive children whose output is drained on reader threads.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, trace, warn};
use wait_timeout::ChildExt;

use crate::core::prompt::{PromptMatch, PromptSet, last_line_start};
use crate::error::ShellError;

type Transcript = Arc<Option<Mutex<BufWriter<File>>>>;

/// Captured output of a one-shot child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(mut cmd: Command, timeout: Duration) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_to_end(stdout));
    let stderr_handle = thread::spawn(move || read_to_end(stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_to_end<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

/// A spawned child with piped stdin and merged stdout/stderr.
pub struct InteractiveChild {
    pub child: Child,
    pub stdin: ChildStdin,
    pub output: OutputStream,
}

/// Spawn `cmd` for interactive use.
///
/// stdout and stderr are drained on reader threads into one channel, so the
/// child never blocks on a full pipe. When `transcript_path` is set every
/// chunk is also appended to that file as it arrives.
#[instrument(skip_all, fields(transcript = transcript_path.is_some()))]
pub fn spawn_interactive(
    mut cmd: Command,
    transcript_path: Option<&Path>,
) -> Result<InteractiveChild, ShellError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let transcript: Transcript = Arc::new(match transcript_path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Mutex::new(BufWriter::new(file)))
        }
        None => None,
    });

    debug!("spawning interactive child");
    let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
        program: cmd.get_program().into(),
        source,
    })?;

    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let (tx, rx) = mpsc::channel();
    let stderr_tx = tx.clone();
    let stderr_transcript = transcript.clone();
    thread::spawn(move || pump(stdout, tx, transcript));
    thread::spawn(move || pump(stderr, stderr_tx, stderr_transcript));

    Ok(InteractiveChild {
        child,
        stdin,
        output: OutputStream::new(rx),
    })
}

fn missing_pipe(name: &str) -> ShellError {
    ShellError::Io(std::io::Error::other(format!("{name} was not piped")))
}

/// Forward chunks from `reader` until EOF or until the receiver goes away.
fn pump<R: Read>(mut reader: R, tx: Sender<Vec<u8>>, transcript: Transcript) {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(err = %e, "failed to read child output");
                break;
            }
        };

        if let Some(ref mutex) = *transcript
            && let Ok(mut writer) = mutex.lock()
        {
            if let Err(e) = writer.write_all(&chunk[..n]) {
                warn!(err = %e, "failed to write transcript");
            } else if let Err(e) = writer.flush() {
                warn!(err = %e, "failed to flush transcript");
            }
        }

        if tx.send(chunk[..n].to_vec()).is_err() {
            break;
        }
    }
}

/// Child output accumulated until a prompt shows up.
pub struct OutputStream {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    /// Line start in `pending` that prompt scanning resumes from.
    scanned: usize,
    eof: bool,
}

impl OutputStream {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            scanned: 0,
            eof: false,
        }
    }

    /// Block until one of `prompts` begins a line, returning the text before
    /// it and which prompt matched. Output after the prompt stays pending.
    pub fn read_until_prompt(
        &mut self,
        prompts: &PromptSet,
        timeout: Option<Duration>,
    ) -> Result<(String, usize), ShellError> {
        let started = Instant::now();
        loop {
            if let Some(PromptMatch { start, end, prompt }) =
                prompts.find_from(&self.pending, self.scanned)
            {
                let before = String::from_utf8_lossy(&self.pending[..start]).into_owned();
                self.pending.drain(..end);
                self.scanned = 0;
                return Ok((before, prompt));
            }
            self.scanned = last_line_start(&self.pending, self.scanned);
            if self.eof {
                return Err(ShellError::ProcessExited {
                    output: self.take_pending(),
                });
            }

            let received = match timeout {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return Err(self.timed_out(started));
                    }
                    self.rx.recv_timeout(remaining)
                }
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(chunk) => {
                    trace!(bytes = chunk.len(), "received output");
                    self.pending.extend_from_slice(&chunk);
                }
                Err(RecvTimeoutError::Timeout) => return Err(self.timed_out(started)),
                // Both reader threads finished; drain anything still queued.
                Err(RecvTimeoutError::Disconnected) => self.eof = true,
            }
        }
    }

    fn timed_out(&mut self, started: Instant) -> ShellError {
        ShellError::Timeout {
            waited: started.elapsed(),
            partial: String::from_utf8_lossy(&self.pending).into_owned(),
        }
    }

    fn take_pending(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.scanned = 0;
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with(chunks: &[&[u8]], close: bool) -> (OutputStream, Option<Sender<Vec<u8>>>) {
        let (tx, rx) = mpsc::channel();
        for chunk in chunks {
            tx.send(chunk.to_vec()).expect("send");
        }
        let tx = if close { None } else { Some(tx) };
        (OutputStream::new(rx), tx)
    }

    #[test]
    fn prompt_split_across_chunks_is_found() {
        let (mut stream, _tx) = stream_with(&[b"hello\nSET", b"UP> rest"], false);
        let (before, prompt) = stream
            .read_until_prompt(&PromptSet::default(), Some(Duration::from_secs(1)))
            .expect("prompt");
        assert_eq!(before, "hello\n");
        assert_eq!(prompt, 0);
        assert_eq!(stream.pending, b"rest");
    }

    #[test]
    fn scanning_resumes_at_the_unfinished_line() {
        let (mut stream, tx) = stream_with(&[b"line one\nline t", b"wo\nSET"], false);
        let err = stream
            .read_until_prompt(&PromptSet::default(), Some(Duration::from_millis(50)))
            .expect_err("no prompt yet");
        assert!(matches!(err, ShellError::Timeout { .. }));
        assert_eq!(stream.scanned, 18);

        tx.expect("sender").send(b"UP> next".to_vec()).expect("send");
        let (before, prompt) = stream
            .read_until_prompt(&PromptSet::default(), Some(Duration::from_secs(1)))
            .expect("prompt");
        assert_eq!(before, "line one\nline two\n");
        assert_eq!(prompt, 0);
        assert_eq!(stream.pending, b"next");
        assert_eq!(stream.scanned, 0);
    }

    #[test]
    fn closed_stream_without_prompt_reports_exit() {
        let (mut stream, _) = stream_with(&[b"fatal: license unavailable\n"], true);
        let err = stream
            .read_until_prompt(&PromptSet::default(), None)
            .expect_err("no prompt");
        match err {
            ShellError::ProcessExited { output } => {
                assert_eq!(output, "fatal: license unavailable\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn silent_stream_times_out_with_partial_output() {
        let (mut stream, _tx) = stream_with(&[b"working..."], false);
        let err = stream
            .read_until_prompt(&PromptSet::default(), Some(Duration::from_millis(50)))
            .expect_err("timeout");
        match err {
            ShellError::Timeout { partial, .. } => assert_eq!(partial, "working..."),
            other => panic!("unexpected error: {other}"),
        }
    }
}
