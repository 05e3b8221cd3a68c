//! Configuration file parsing for firmil.toml.

use anyhow::Context;
use firmil_compiler::CompilerConfig;
use firmil_resolver::{Rule, RuleSet};
use firmil_runtime::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_NAME: &str = "firmil.toml";

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Device link settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Compilation settings
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Substitution rules
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Config {
    /// Validated rule table
    pub fn rule_set(&self) -> anyhow::Result<RuleSet> {
        RuleSet::compile(self.rules.clone()).context("Invalid substitution rules")
    }
}

/// Load configuration from a file or search for firmil.toml.
///
/// An explicit path must exist; a missing searched file means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) => {
            anyhow::ensure!(path.exists(), "Config file {} not found", path.display());
            Some(path.to_path_buf())
        }
        None => std::env::current_dir().ok().and_then(|cwd| find_config_file(&cwd)),
    };

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), rules = config.rules.len(), "loaded config");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Search for firmil.toml in `start` and its parent directories.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let path = current.join(CONFIG_NAME);
        if path.exists() {
            return Some(path);
        }
        dir = current.parent();
    }
    None
}
