//! Evoplan configuration stored as TOML (default `evoplan.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "evoplan.toml";

/// Evoplan configuration (TOML).
///
/// Missing fields fall back to defaults, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvoplanConfig {
    /// Byte budget for a rendered prompt; droppable sections go first.
    pub prompt_budget_bytes: usize,

    /// Number of whole-task examples requested from the model.
    pub example_cases: usize,

    pub spawn: SpawnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpawnConfig {
    /// Completions requested per spawn round.
    pub batch_size: usize,

    /// Deduplicate combined rows on the first step's input.
    pub unique: bool,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            unique: true,
        }
    }
}

impl Default for EvoplanConfig {
    fn default() -> Self {
        Self {
            prompt_budget_bytes: 40_000,
            example_cases: 5,
            spawn: SpawnConfig::default(),
        }
    }
}

impl EvoplanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.example_cases == 0 {
            return Err(anyhow!("example_cases must be > 0"));
        }
        if self.spawn.batch_size == 0 {
            return Err(anyhow!("spawn.batch_size must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EvoplanConfig::default()`.
pub fn load_config(path: &Path) -> Result<EvoplanConfig> {
    if !path.exists() {
        return Ok(EvoplanConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EvoplanConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EvoplanConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EvoplanConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("evoplan.toml");
        let mut cfg = EvoplanConfig::default();
        cfg.spawn.unique = false;
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("evoplan.toml");
        fs::write(&path, "[spawn]\nbatch_size = 6\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.spawn.batch_size, 6);
        assert!(cfg.spawn.unique);
        assert_eq!(cfg.prompt_budget_bytes, 40_000);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("evoplan.toml");
        fs::write(&path, "[spawn]\nbatch_size = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("spawn.batch_size must be > 0"));
    }
}
