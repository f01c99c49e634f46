//! Prompt detection and response cleanup for the tessent shell.
//!
//! The shell signals command completion by printing one of its mode prompts
//! (`SETUP> ` or `ANALYSIS> `) at the start of a line. Everything printed
//! between the command and that prompt is the command's response.

use std::sync::LazyLock;

use regex::Regex;

/// Prompts printed by `tessent -shell` in setup and analysis mode.
pub const DEFAULT_PROMPTS: [&str; 2] = ["SETUP> ", "ANALYSIS> "];

static BACKSPACE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    // Any character immediately erased by a backspace.
    Regex::new(r"(?s).\x08").expect("backspace regex is valid")
});

/// Location of a prompt inside pending output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptMatch {
    /// Byte offset where the prompt starts.
    pub start: usize,
    /// Byte offset just past the prompt.
    pub end: usize,
    /// Index into the prompt set of the prompt that matched.
    pub prompt: usize,
}

/// Ordered set of prompts recognized as command terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    prompts: Vec<String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect())
    }
}

impl PromptSet {
    pub fn new(prompts: Vec<String>) -> Self {
        Self { prompts }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.prompts.get(index).map(String::as_str)
    }

    /// Find the earliest prompt that begins a line in `buf`.
    ///
    /// A line begins at offset 0 or right after `\n`. When two prompts start
    /// at the same offset the longer one wins.
    pub fn find(&self, buf: &[u8]) -> Option<PromptMatch> {
        self.find_from(buf, 0)
    }

    /// [`find`](Self::find), skipping the lines before `from`, which must be
    /// 0 or a line start.
    pub fn find_from(&self, buf: &[u8], from: usize) -> Option<PromptMatch> {
        let mut line_start = from;
        loop {
            if let Some(found) = self.match_at(buf, line_start) {
                return Some(found);
            }
            let next_newline = buf[line_start..].iter().position(|&b| b == b'\n')?;
            line_start += next_newline + 1;
        }
    }

    fn match_at(&self, buf: &[u8], offset: usize) -> Option<PromptMatch> {
        let rest = &buf[offset..];
        self.prompts
            .iter()
            .enumerate()
            .filter(|(_, prompt)| !prompt.is_empty() && rest.starts_with(prompt.as_bytes()))
            .max_by_key(|(index, prompt)| (prompt.len(), std::cmp::Reverse(*index)))
            .map(|(index, prompt)| PromptMatch {
                start: offset,
                end: offset + prompt.len(),
                prompt: index,
            })
    }
}

/// Start of the last line in `buf` at or after line start `from`.
///
/// Complete lines before it cannot hold a prompt, so a later
/// [`PromptSet::find_from`] on the same growing buffer can start here.
pub fn last_line_start(buf: &[u8], from: usize) -> usize {
    buf[from..]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(from, |newline| from + newline + 1)
}

/// Turn raw output captured before a prompt into the command's response.
///
/// Drops carriage returns and backspace-erased characters, strips the
/// echoed command line when the shell echoed it, and trims trailing
/// whitespace.
pub fn clean_response(raw: &str, command: &str) -> String {
    let without_cr = raw.replace('\r', "");
    let cleaned = BACKSPACE_PAIR.replace_all(&without_cr, "");
    let body = strip_echo(&cleaned, command);
    body.trim_end().to_string()
}

fn strip_echo<'a>(text: &'a str, command: &str) -> &'a str {
    if command.is_empty() {
        return text;
    }
    match text.strip_prefix(command) {
        Some(rest) if rest.is_empty() => rest,
        Some(rest) if rest.starts_with('\n') => &rest[1..],
        _ => text,
    }
}
