//! Shell configuration stored in `tshell.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::launch::LaunchOptions;
use crate::core::prompt::DEFAULT_PROMPTS;
use crate::io::write_atomic;

pub const DEFAULT_CONFIG_FILE: &str = "tshell.toml";

/// Shell configuration (TOML).
///
/// Missing fields fall back to defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Executable to launch. Unset means `tessent` from `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tessent_path: Option<PathBuf>,

    /// Prompts that mark the end of a command's output.
    pub prompts: Vec<String>,

    /// Seconds to wait for a prompt; `0` waits forever.
    pub timeout_secs: u64,

    /// Seconds `close` waits for the tool to exit before killing it.
    pub close_grace_secs: u64,

    /// Append everything the tool prints to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            tessent_path: None,
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            timeout_secs: 0,
            close_grace_secs: 5,
            transcript_path: None,
        }
    }
}

impl ShellConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prompts.is_empty() {
            return Err(anyhow!("prompts must be a non-empty array"));
        }
        if self.prompts.iter().any(|prompt| prompt.is_empty()) {
            return Err(anyhow!("prompts must not contain empty strings"));
        }
        if self.close_grace_secs == 0 {
            return Err(anyhow!("close_grace_secs must be > 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Launch options seeded from this configuration.
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            timeout: self.timeout(),
            tessent_path: self.tessent_path.clone(),
            prompts: self.prompts.clone(),
            transcript: self.transcript_path.clone(),
            close_grace: Duration::from_secs(self.close_grace_secs),
            ..LaunchOptions::default()
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ShellConfig::default()`.
pub fn load_config(path: &Path) -> Result<ShellConfig> {
    if !path.exists() {
        let cfg = ShellConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ShellConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ShellConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
