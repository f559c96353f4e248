use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Settings for the `gh`-backed remote client.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// `owner/name`. When absent, `gh` infers the repository from the cwd.
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default = "default_gh_binary")]
    pub gh_binary: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    #[serde(default = "default_network_cooldown")]
    pub network_cooldown_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            repo: None,
            gh_binary: default_gh_binary(),
            requests_per_minute: default_requests_per_minute(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            network_cooldown_secs: default_network_cooldown(),
        }
    }
}

fn default_gh_binary() -> String {
    "gh".to_string()
}
fn default_requests_per_minute() -> u32 {
    30
}
fn default_rate_limit_cooldown() -> u64 {
    60
}
fn default_network_cooldown() -> u64 {
    5
}

impl RemoteConfig {
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn network_cooldown(&self) -> Duration {
        Duration::from_secs(self.network_cooldown_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    5
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    120
}

/// Model used by the local provider when `model` is not set.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The configured model, or the local provider's default.
    /// `None` for `openai` without an explicit model.
    pub fn model_name(&self) -> Option<&str> {
        match (self.model.as_deref(), self.provider.as_str()) {
            (Some(model), _) => Some(model),
            (None, "ollama") => Some(DEFAULT_OLLAMA_MODEL),
            (None, _) => None,
        }
    }
}

/// Settings for per-area context document generation.
#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default = "default_recency_months")]
    pub recency_months: u32,
    #[serde(default = "default_max_displayed")]
    pub max_displayed: usize,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_threshold(),
            recency_months: default_recency_months(),
            max_displayed: default_max_displayed(),
            filename: default_filename(),
            root: default_root(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_threshold() -> usize {
    3
}
fn default_recency_months() -> u32 {
    6
}
fn default_max_displayed() -> usize {
    20
}
fn default_filename() -> String {
    "PR_CONTEXT.md".to_string()
}
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Config with defaults everywhere except the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            remote: RemoteConfig::default(),
            enrichment: EnrichmentConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.remote.requests_per_minute == 0 {
        anyhow::bail!("remote.requests_per_minute must be > 0");
    }

    if config.enrichment.batch_size == 0 {
        anyhow::bail!("enrichment.batch_size must be > 0");
    }

    if config.context.threshold == 0 {
        anyhow::bail!("context.threshold must be >= 1");
    }
    if config.context.max_displayed == 0 {
        anyhow::bail!("context.max_displayed must be >= 1");
    }
    if config.context.filename.trim().is_empty() || config.context.filename.contains('/') {
        anyhow::bail!("context.filename must be a plain file name");
    }

    if config.enrichment.is_enabled() && config.enrichment.model_name().is_none() {
        anyhow::bail!(
            "enrichment.model must be specified when provider is '{}'",
            config.enrichment.provider
        );
    }

    match config.enrichment.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown enrichment provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/prctx.sqlite\"\n").unwrap();
        assert_eq!(config.remote.requests_per_minute, 30);
        assert_eq!(config.remote.rate_limit_cooldown(), Duration::from_secs(60));
        assert_eq!(config.remote.network_cooldown(), Duration::from_secs(5));
        assert!(config.enrichment.is_enabled());
        assert_eq!(config.enrichment.provider, "ollama");
        assert_eq!(config.enrichment.model_name(), Some("llama3.1"));
        assert_eq!(config.enrichment.batch_size, 5);
        assert!(config.context.enabled);
        assert_eq!(config.context.threshold, 3);
        assert_eq!(config.context.max_displayed, 20);
        assert_eq!(config.context.filename, "PR_CONTEXT.md");
    }

    #[test]
    fn test_hosted_provider_requires_model() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[enrichment]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("enrichment.model"));
    }

    #[test]
    fn test_explicit_model_overrides_default() {
        let config = parse(
            "[db]\npath = \"x.sqlite\"\n[enrichment]\nprovider = \"ollama\"\nmodel = \"qwen2.5\"\n",
        )
        .unwrap();
        assert_eq!(config.enrichment.model_name(), Some("qwen2.5"));
    }

    #[test]
    fn test_disabled_provider_has_no_model() {
        let config =
            parse("[db]\npath = \"x.sqlite\"\n[enrichment]\nprovider = \"disabled\"\n").unwrap();
        assert!(!config.enrichment.is_enabled());
        assert_eq!(config.enrichment.model_name(), None);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[enrichment]\nprovider = \"mystery\"\nmodel = \"m\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown enrichment provider"));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let err =
            parse("[db]\npath = \"x.sqlite\"\n[remote]\nrequests_per_minute = 0\n").unwrap_err();
        assert!(err.to_string().contains("requests_per_minute"));
    }

    #[test]
    fn test_filename_with_separator_rejected() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[context]\nfilename = \"a/b.md\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("context.filename"));
    }
}
