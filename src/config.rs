//! Configuration for the retrieval benchmark
//!
//! Defines the providers.toml schema: retry policy plus the list of
//! embedding providers to compare. Credentials never live in the file; each
//! provider names the environment variable holding its API key, and a
//! provider only runs when that variable is set.
//!
//! ```toml
//! [retry]
//! max_retries = 5
//! initial_delay_secs = 25.0
//! growth_factor = 1.5
//!
//! [[providers]]
//! kind = "voyage"
//! model = "voyage-3"
//! api_key_env = "VOYAGE_API_KEY"
//! batch_size = 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::embedders::{EmbeddingProvider, OpenAiProvider, VoyageProvider};
use crate::error::{BenchError, Result};
use crate::orchestrator::{is_rate_limit, RetryPolicy, MAX_RETRY_DELAY};

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "providers.toml";

/// Supported embedding APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI `/v1/embeddings`
    OpenAi,
    /// Voyage AI `/v1/embeddings`
    Voyage,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Voyage => "voyage",
        }
    }
}

/// Backoff settings for rate-limited calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_secs: f64,
    pub growth_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_secs: 25.0,
            growth_factor: 1.5,
        }
    }
}

impl RetrySettings {
    /// Build the orchestrator policy with the default rate-limit classifier
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::try_from_secs_f64(
                self.initial_delay_secs.clamp(0.0, MAX_RETRY_DELAY.as_secs_f64()),
            )
            .unwrap_or(Duration::ZERO),
            growth_factor: self.growth_factor,
            is_retryable: is_rate_limit,
        }
    }
}

/// One provider to benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,

    /// Display name in logs and reports (defaults to the kind)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Model identifier sent to the API
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// API root override (proxies, gateways)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Texts per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Requested output dimensionality (OpenAI only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

fn default_batch_size() -> usize {
    10
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind, model: impl Into<String>, api_key_env: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            model: model.into(),
            api_key_env: api_key_env.into(),
            base_url: None,
            batch_size: default_batch_size(),
            dimensions: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.name())
    }

    /// API key from `lookup`, if set and non-empty
    pub fn api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        lookup(&self.api_key_env).filter(|key| !key.trim().is_empty())
    }

    /// Construct the provider adapter with the given key
    pub fn build(&self, api_key: String) -> Result<Box<dyn EmbeddingProvider>> {
        let provider: Box<dyn EmbeddingProvider> = match self.kind {
            ProviderKind::OpenAi => {
                let mut provider = OpenAiProvider::new(self.name(), &self.model, api_key)?
                    .with_dimensions(self.dimensions);
                if let Some(base_url) = &self.base_url {
                    provider = provider.with_base_url(base_url);
                }
                Box::new(provider)
            }
            ProviderKind::Voyage => {
                let mut provider = VoyageProvider::new(self.name(), &self.model, api_key)?;
                if let Some(base_url) = &self.base_url {
                    provider = provider.with_base_url(base_url);
                }
                Box::new(provider)
            }
        };
        Ok(provider)
    }
}

/// A provider whose credential was found
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub settings: ProviderSettings,
    pub api_key: String,
}

impl ResolvedProvider {
    pub fn build(&self) -> Result<Box<dyn EmbeddingProvider>> {
        self.settings.build(self.api_key.clone())
    }
}

/// Providers configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub retry: RetrySettings,

    /// Providers in run order
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderSettings>,
}

fn default_providers() -> Vec<ProviderSettings> {
    vec![
        ProviderSettings::new(ProviderKind::Voyage, "voyage-3", "VOYAGE_API_KEY"),
        ProviderSettings::new(ProviderKind::OpenAi, "text-embedding-3-small", "OPENAI_API_KEY"),
    ]
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            providers: default_providers(),
        }
    }
}

impl ProvidersConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let config_error = |message: String| BenchError::Config {
            path: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config: Self = toml::from_str(&content).map_err(|e| config_error(e.to_string()))?;
        config.validate().map_err(|e| config_error(e.to_string()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.display(), "no config file, using built-in providers");
        Ok(Self::default())
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| BenchError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the TOML types cannot express
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if !retry.initial_delay_secs.is_finite() || retry.initial_delay_secs < 0.0 {
            return Err(BenchError::Configuration(format!(
                "retry.initial_delay_secs must be a non-negative number, got {}",
                retry.initial_delay_secs
            )));
        }
        if retry.initial_delay_secs > MAX_RETRY_DELAY.as_secs_f64() {
            return Err(BenchError::Configuration(format!(
                "retry.initial_delay_secs must be at most {}, got {}",
                MAX_RETRY_DELAY.as_secs(),
                retry.initial_delay_secs
            )));
        }
        if !retry.growth_factor.is_finite() || retry.growth_factor < 1.0 {
            return Err(BenchError::Configuration(format!(
                "retry.growth_factor must be at least 1.0, got {}",
                retry.growth_factor
            )));
        }
        // Longest sleep is before the last retry
        let longest = retry.initial_delay_secs
            * retry.growth_factor.powf(f64::from(retry.max_retries.saturating_sub(1)));
        if longest.is_nan() || longest > MAX_RETRY_DELAY.as_secs_f64() {
            return Err(BenchError::Configuration(format!(
                "retry backoff reaches {:.0}s before the last retry, above the {}s limit; \
                 lower growth_factor or max_retries",
                longest,
                MAX_RETRY_DELAY.as_secs()
            )));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name()) {
                return Err(BenchError::Configuration(format!(
                    "duplicate provider name '{}'; set a distinct `name`",
                    provider.name()
                )));
            }
            if provider.batch_size == 0 {
                return Err(BenchError::Configuration(format!(
                    "provider '{}': batch_size must be positive",
                    provider.name()
                )));
            }
            if provider.dimensions.is_some() && provider.kind != ProviderKind::OpenAi {
                return Err(BenchError::Configuration(format!(
                    "provider '{}': dimensions is only supported for openai",
                    provider.name()
                )));
            }
        }
        Ok(())
    }

    /// Providers matching `only` (all when empty)
    pub fn select(&self, only: &[String]) -> Result<Vec<&ProviderSettings>> {
        if only.is_empty() {
            return Ok(self.providers.iter().collect());
        }
        if let Some(unknown) = only.iter().find(|n| !self.providers.iter().any(|p| p.name() == n.as_str())) {
            return Err(BenchError::Configuration(format!(
                "unknown provider '{}' (configured: {})",
                unknown,
                self.provider_names().join(", ")
            )));
        }
        Ok(self
            .providers
            .iter()
            .filter(|p| only.iter().any(|n| n == p.name()))
            .collect())
    }

    /// Keep only providers whose credential is present
    ///
    /// Fails with [`BenchError::Configuration`] when none qualify, before any
    /// network call is made.
    pub fn resolve_credentials(
        &self,
        only: &[String],
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<ResolvedProvider>> {
        let selected = self.select(only)?;
        let mut resolved = Vec::new();

        for settings in &selected {
            match settings.api_key(&lookup) {
                Some(api_key) => resolved.push(ResolvedProvider {
                    settings: (*settings).clone(),
                    api_key,
                }),
                None => tracing::warn!(
                    provider = settings.name(),
                    "{} not set, skipping",
                    settings.api_key_env
                ),
            }
        }

        if resolved.is_empty() {
            let vars: Vec<&str> = selected.iter().map(|p| p.api_key_env.as_str()).collect();
            return Err(BenchError::Configuration(format!(
                "no provider credentials found; set one of: {}",
                vars.join(", ")
            )));
        }
        Ok(resolved)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(ProviderSettings::name).collect()
    }
}

/// Credential lookup backed by the process environment
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_retry_backoff_bounded() {
        let err = ProvidersConfig::from_toml("[retry]\ninitial_delay_secs = 1e300\n").unwrap_err();
        assert!(matches!(err, BenchError::Configuration(_)));

        let err = ProvidersConfig::from_toml("[retry]\ngrowth_factor = 1e200\n").unwrap_err();
        assert!(err.to_string().contains("growth_factor"));

        // 25 * 2^4 = 400s stays under the limit
        let config =
            ProvidersConfig::from_toml("[retry]\ngrowth_factor = 2.0\nmax_retries = 5\n").unwrap();
        assert_eq!(config.retry.to_policy().delay_for(4), Duration::from_secs(400));

        // huge growth is harmless when only one retry happens
        assert!(ProvidersConfig::from_toml("[retry]\ngrowth_factor = 1e200\nmax_retries = 1\n").is_ok());
    }

    #[test]
    fn test_to_policy_clamps_unvalidated_delay() {
        let settings = RetrySettings {
            initial_delay_secs: 1e300,
            ..RetrySettings::default()
        };
        assert_eq!(settings.to_policy().initial_delay, MAX_RETRY_DELAY);

        let settings = RetrySettings {
            initial_delay_secs: f64::NAN,
            ..RetrySettings::default()
        };
        assert_eq!(settings.to_policy().initial_delay, Duration::ZERO);
    }

    #[test]
    fn test_providers_config_default() {
        let config = ProvidersConfig::default();
        assert_eq!(config.provider_names(), vec!["voyage", "openai"]);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.to_policy().initial_delay, Duration::from_secs(25));
        assert!(config.providers.iter().all(|p| p.batch_size == 10));
    }

    #[test]
    fn test_providers_config_toml() {
        let toml_str = r#"
[retry]
max_retries = 3
initial_delay_secs = 2.0

[[providers]]
kind = "openai"
name = "openai-large"
model = "text-embedding-3-large"
api_key_env = "OPENAI_API_KEY"
dimensions = 1024
batch_size = 50

[[providers]]
kind = "voyage"
model = "voyage-3-lite"
api_key_env = "VOYAGE_API_KEY"
base_url = "http://localhost:9000/v1"
"#;
        let config = ProvidersConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.growth_factor, 1.5);
        assert_eq!(config.provider_names(), vec!["openai-large", "voyage"]);
        assert_eq!(config.providers[0].dimensions, Some(1024));
        assert_eq!(config.providers[0].batch_size, 50);
        assert_eq!(config.providers[1].batch_size, 10);
        assert_eq!(config.providers[1].base_url.as_deref(), Some("http://localhost:9000/v1"));
    }

    #[test]
    fn test_missing_providers_uses_defaults() {
        let config = ProvidersConfig::from_toml("[retry]\nmax_retries = 1\n").unwrap();
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_validation_errors() {
        let zero_batch = r#"
[[providers]]
kind = "voyage"
model = "voyage-3"
api_key_env = "VOYAGE_API_KEY"
batch_size = 0
"#;
        assert!(ProvidersConfig::from_toml(zero_batch).is_err());

        let voyage_dims = r#"
[[providers]]
kind = "voyage"
model = "voyage-3"
api_key_env = "VOYAGE_API_KEY"
dimensions = 256
"#;
        assert!(ProvidersConfig::from_toml(voyage_dims).is_err());

        let duplicate = r#"
[[providers]]
kind = "openai"
model = "a"
api_key_env = "K"

[[providers]]
kind = "openai"
model = "b"
api_key_env = "K"
"#;
        assert!(ProvidersConfig::from_toml(duplicate).is_err());

        assert!(ProvidersConfig::from_toml("[retry]\ngrowth_factor = 0.5\n").is_err());
        assert!(ProvidersConfig::from_toml("[retry]\ninitial_delay_secs = -1.0\n").is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = ProvidersConfig::from_toml(
            "[[providers]]\nkind = \"cohere\"\nmodel = \"m\"\napi_key_env = \"K\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Config { .. }));
    }

    #[test]
    fn test_credentials_gate_providers() {
        let config = ProvidersConfig::default();

        let resolved = config
            .resolve_credentials(&[], lookup_from(&[("OPENAI_API_KEY", "sk-test")]))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].settings.name(), "openai");
        assert_eq!(resolved[0].api_key, "sk-test");

        let both = config
            .resolve_credentials(
                &[],
                lookup_from(&[("OPENAI_API_KEY", "sk"), ("VOYAGE_API_KEY", "pa")]),
            )
            .unwrap();
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].settings.name(), "voyage");
    }

    #[test]
    fn test_no_credentials_is_configuration_error() {
        let config = ProvidersConfig::default();
        let err = config
            .resolve_credentials(&[], lookup_from(&[("VOYAGE_API_KEY", "   ")]))
            .unwrap_err();
        match err {
            BenchError::Configuration(message) => {
                assert!(message.contains("VOYAGE_API_KEY"));
                assert!(message.contains("OPENAI_API_KEY"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_provider_filter() {
        let config = ProvidersConfig::default();
        let keys = lookup_from(&[("OPENAI_API_KEY", "sk"), ("VOYAGE_API_KEY", "pa")]);

        let only = vec!["voyage".to_string()];
        let resolved = config.resolve_credentials(&only, &keys).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].settings.kind, ProviderKind::Voyage);

        let unknown = vec!["cohere".to_string()];
        assert!(config.resolve_credentials(&unknown, &keys).is_err());
    }

    #[test]
    fn test_build_providers() {
        let config = ProvidersConfig::default();
        let keys = lookup_from(&[("OPENAI_API_KEY", "sk"), ("VOYAGE_API_KEY", "pa")]);
        for resolved in config.resolve_credentials(&[], keys).unwrap() {
            let provider = resolved.build().unwrap();
            assert_eq!(provider.name(), resolved.settings.name());
            assert_eq!(provider.model(), resolved.settings.model);
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[[providers]]\nkind = \"openai\"\nmodel = \"text-embedding-3-small\"\napi_key_env = \"MY_KEY\"\n"
        )
        .unwrap();

        let config = ProvidersConfig::load(file.path()).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].api_key_env, "MY_KEY");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvidersConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.providers.len(), 2);

        let err = ProvidersConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, BenchError::Config { .. }));
    }
}
