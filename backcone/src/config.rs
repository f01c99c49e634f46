//! Backcone input file (YAML).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// A failing design: where the flat model and patterns live, and which scan
/// cells failed under which patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackconeConfig {
    pub name: String,
    pub flatmodel: PathBuf,
    pub patdb: PathBuf,
    /// Binary pattern file, used instead of `patdb` when it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binpat: Option<PathBuf>,
    pub failbits: Vec<FailBit>,
    /// Pin names flagged in the reports.
    #[serde(default)]
    pub defectsites: Vec<String>,
}

/// One failing scan cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailBit {
    pub chain: String,
    pub cell: u32,
    #[serde(default)]
    pub failpatterns: Vec<u32>,
}

impl BackconeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must not be empty");
        }
        if self.name.contains(['/', '\\']) {
            bail!("name must not contain path separators: {:?}", self.name);
        }
        if let Some(failbit) = self.failbits.iter().find(|fb| fb.chain.trim().is_empty()) {
            bail!("failbit at cell {} has an empty chain name", failbit.cell);
        }
        Ok(())
    }

    /// Pattern file to read: `binpat` if it is set and exists, else `patdb`.
    pub fn pattern_file(&self) -> &Path {
        match &self.binpat {
            Some(binpat) if binpat.exists() => binpat,
            _ => &self.patdb,
        }
    }

    /// Directory name all outputs go into.
    pub fn output_dir_name(&self) -> String {
        format!("backcone_{}", self.name)
    }
}

/// Read and validate a backcone YAML file.
pub fn load_backcone_config(path: &Path) -> Result<BackconeConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BackconeConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
