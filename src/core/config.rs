//! Configuration loaded from `<root>/config.toml`.
//!
//! A missing file is not an error: the defaults describe a small mixed
//! roster so that a fresh state directory is usable immediately.

use crate::core::error::PincerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "config.toml";

fn default_trust_score() -> f64 {
    1.0
}

/// One roster slot as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    pub capability: String,
    #[serde(default = "default_trust_score")]
    pub trust_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_concurrency: usize,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let agents = vec![
            ("backend-1", "Backend Agent 1", "backend"),
            ("backend-2", "Backend Agent 2", "backend"),
            ("frontend-1", "Frontend Agent 1", "frontend"),
            ("tester-1", "Test Agent 1", "tester"),
        ]
        .into_iter()
        .map(|(id, name, capability)| AgentSpec {
            id: id.to_string(),
            name: name.to_string(),
            capability: capability.to_string(),
            trust_score: default_trust_score(),
        })
        .collect::<Vec<_>>();
        Self {
            max_concurrency: agents.len(),
            agents,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PincerConfig {
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Load `<root>/config.toml`, falling back to defaults when it is absent.
pub fn load_config(root: &Path) -> Result<PincerConfig, PincerError> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(PincerConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(PincerError::IoError)?;
    let config: PincerConfig = toml::from_str(&content)
        .map_err(|e| PincerError::ConfigError(format!("{}: {}", path.display(), e)))?;
    if config.pool.max_concurrency == 0 {
        return Err(PincerError::ConfigError(format!(
            "{}: pool.max_concurrency must be at least 1",
            path.display()
        )));
    }
    Ok(config)
}

/// Write a config file (used by `pincer init`). Refuses to overwrite.
pub fn write_default_config(root: &Path) -> Result<bool, PincerError> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Ok(false);
    }
    fs::create_dir_all(root).map_err(PincerError::IoError)?;
    let body = toml::to_string_pretty(&PincerConfig::default())
        .map_err(|e| PincerError::ConfigError(e.to_string()))?;
    fs::write(&path, body).map_err(PincerError::IoError)?;
    Ok(true)
}
