/// Config file loading and creation for the pairjudge CLI.
///
/// Config lives at ~/.config/pairjudge/config.toml.
/// All fields are optional; CLI args override config values.
use anyhow::{bail, Context, Result};
use pairjudge_core::{RatingConfig, RevisionPolicy};
use pairjudge_store::{EngineConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PairjudgeConfig {
    pub database: Option<PathBuf>,
    pub initial_mu: Option<f64>,
    pub initial_sigma_sq: Option<f64>,
    pub k_base: Option<f64>,
    pub sigma_decay: Option<f64>,
    pub max_retries: Option<usize>,
    pub revision_policy: Option<RevisionPolicy>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# pairjudge configuration
# All values here can be overridden by CLI flags.

# SQLite database holding items and comparisons
# database = \"pairjudge.db\"

# Rating every new item starts at
# initial_mu = 1500.0
# initial_sigma_sq = 350000.0

# Base step size; uncertain items move up to twice as far
# k_base = 32.0

# Factor applied to both items' sigma_sq after each judgment, in (0, 1)
# sigma_decay = 0.85

# Retries when a concurrent judgment touched the same items
# max_retries = 8

# What revising an old judgment does when later judgments involve its items:
# \"replay\" refolds them, \"restore\" keeps their deltas, \"reject\" refuses
# revision_policy = \"replay\"
";

const DEFAULT_DATABASE: &str = "pairjudge.db";

impl PairjudgeConfig {
    /// Database path: CLI arg > config file > ./pairjudge.db
    pub fn database(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    /// Engine settings with unset fields at their defaults.
    pub fn engine_config(&self, policy_override: Option<RevisionPolicy>) -> EngineConfig {
        let rating = RatingConfig::default();
        let retry = RetryPolicy::default();
        EngineConfig {
            rating: RatingConfig {
                initial_mu: self.initial_mu.unwrap_or(rating.initial_mu),
                initial_sigma_sq: self.initial_sigma_sq.unwrap_or(rating.initial_sigma_sq),
                k_base: self.k_base.unwrap_or(rating.k_base),
                sigma_decay: self.sigma_decay.unwrap_or(rating.sigma_decay),
            },
            revision_policy: policy_override
                .or(self.revision_policy)
                .unwrap_or_default(),
            retry: RetryPolicy {
                max_retries: self.max_retries.unwrap_or(retry.max_retries),
                ..retry
            },
        }
    }
}

/// Returns the default config path: ~/.config/pairjudge/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("pairjudge").join("config.toml"))
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> Result<PairjudgeConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PairjudgeConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read config at {}", path.display())),
    }
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let cfg: PairjudgeConfig = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(cfg, PairjudgeConfig::default());
        assert_eq!(cfg.engine_config(None), EngineConfig::default());
        assert_eq!(cfg.database(None), PathBuf::from("pairjudge.db"));
    }

    #[test]
    fn test_config_values_and_overrides() {
        let cfg: PairjudgeConfig = toml::from_str(
            r#"
            database = "/tmp/essays.db"
            k_base = 16.0
            max_retries = 2
            revision_policy = "reject"
            "#,
        )
        .unwrap();

        let engine = cfg.engine_config(None);
        assert_eq!(engine.rating.k_base, 16.0);
        assert_eq!(engine.rating.initial_mu, 1500.0);
        assert_eq!(engine.retry.max_retries, 2);
        assert_eq!(engine.revision_policy, RevisionPolicy::Reject);

        let overridden = cfg.engine_config(Some(RevisionPolicy::Restore));
        assert_eq!(overridden.revision_policy, RevisionPolicy::Restore);

        assert_eq!(cfg.database(None), PathBuf::from("/tmp/essays.db"));
        assert_eq!(cfg.database(Some("x.db".into())), PathBuf::from("x.db"));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let parsed: std::result::Result<PairjudgeConfig, _> = toml::from_str("revision_policy = \"undo\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let cfg = load_config(Path::new("/nonexistent/pairjudge/config.toml")).unwrap();
        assert_eq!(cfg, PairjudgeConfig::default());
    }
}
