use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tally_finance::{ClassifierConfig, PipelineConfig};

use crate::state::{ensure_tally_home, expand_home};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerSection,
    pub classifier: ClassifierSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Directory holding the ledger, staging file, and classification cache
    pub dir: String,
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Remember categories per transaction id across imports
    pub cache: bool,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            dir: "~/.tally/data".to_string(),
            lock_timeout_secs: 30,
        }
    }
}

impl Default for ClassifierSection {
    fn default() -> Self {
        let defaults = ClassifierConfig::default();
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.0,
            workers: defaults.workers,
            max_attempts: defaults.max_attempts,
            backoff_ms: defaults.backoff.as_millis() as u64,
            request_timeout_secs: defaults.request_timeout.as_secs(),
            cache: true,
        }
    }
}

impl Config {
    pub fn ledger_dir(&self) -> Result<PathBuf> {
        expand_home(&self.ledger.dir)
    }

    pub fn pipeline(&self) -> Result<PipelineConfig> {
        let mut cfg = PipelineConfig::in_dir(self.ledger_dir()?);
        cfg.lock_timeout = Duration::from_secs(self.ledger.lock_timeout_secs);
        Ok(cfg)
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        Ok(self.ledger_dir()?.join("classifications.json"))
    }

    pub fn classifier(&self) -> ClassifierConfig {
        let c = &self.classifier;
        ClassifierConfig {
            workers: c.workers.max(1),
            max_attempts: c.max_attempts.max(1),
            backoff: Duration::from_millis(c.backoff_ms),
            request_timeout: Duration::from_secs(c.request_timeout_secs),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    read_config(&config_path()?)
}

/// Parse the config at `path`; a missing file yields the defaults.
pub fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

pub fn write_config(cfg: &Config, path: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    write_config(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}
