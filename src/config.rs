//! TOML configuration loading and validation.
//!
//! Only `[db]` and `[server]` are required. `[search]` falls back to the
//! engine defaults and each `[credentials.*]` section is optional; a
//! missing section disables that credential kind.
//!
//! Secrets never live in the file. They are read from the environment at
//! startup (see [`SPEECH_KEY_ENV`] and [`STORAGE_CONNECTION_ENV`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use patient_search_core::SearchLimits;

/// Subscription key for the bearer token issuer.
pub const SPEECH_KEY_ENV: &str = "AZURE_SPEECH_KEY";
/// `AccountName=..;AccountKey=..;EndpointSuffix=..` for the signed-URL issuer.
pub const STORAGE_CONNECTION_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_min_similarity")]
    pub default_min_similarity: f64,
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_default_limit: usize,
    #[serde(default = "default_suggestion_max_limit")]
    pub suggestion_max_limit: usize,
    #[serde(default = "default_suggestion_min_similarity")]
    pub suggestion_min_similarity: f64,
    #[serde(default = "default_max_term_length")]
    pub max_term_length: usize,
    #[serde(default = "default_max_partial_term_length")]
    pub max_partial_term_length: usize,
}

fn default_limit() -> usize {
    20
}
fn default_max_limit() -> usize {
    100
}
fn default_min_similarity() -> f64 {
    0.3
}
fn default_suggestion_limit() -> usize {
    10
}
fn default_suggestion_max_limit() -> usize {
    50
}
fn default_suggestion_min_similarity() -> f64 {
    0.75
}
fn default_max_term_length() -> usize {
    200
}
fn default_max_partial_term_length() -> usize {
    100
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_min_similarity: default_min_similarity(),
            suggestion_default_limit: default_suggestion_limit(),
            suggestion_max_limit: default_suggestion_max_limit(),
            suggestion_min_similarity: default_suggestion_min_similarity(),
            max_term_length: default_max_term_length(),
            max_partial_term_length: default_max_partial_term_length(),
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            default_min_similarity: self.default_min_similarity,
            suggestion_default_limit: self.suggestion_default_limit,
            suggestion_max_limit: self.suggestion_max_limit,
            suggestion_min_similarity: self.suggestion_min_similarity,
            max_term_length: self.max_term_length,
            max_partial_term_length: self.max_partial_term_length,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CredentialsConfig {
    pub bearer: Option<BearerConfig>,
    pub signed_url: Option<SignedUrlConfig>,
}

/// Short-lived bearer token from a regional STS endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct BearerConfig {
    pub region: String,
    /// Overrides the regional `issueToken` URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_bearer_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_bearer_expires_in")]
    pub expires_in_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bearer_cache_ttl() -> u64 {
    540
}
fn default_bearer_expires_in() -> u64 {
    600
}
fn default_timeout_secs() -> u64 {
    30
}

impl BearerConfig {
    pub fn token_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://{}.api.cognitive.microsoft.com/sts/v1.0/issueToken",
                self.region
            )
        })
    }
}

/// Container-scoped signed-URL token.
#[derive(Debug, Deserialize, Clone)]
pub struct SignedUrlConfig {
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_signed_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_signed_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_permissions")]
    pub permissions: String,
}

fn default_container() -> String {
    "documents".to_string()
}
fn default_signed_cache_ttl() -> u64 {
    3300
}
fn default_signed_token_ttl() -> u64 {
    3600
}
fn default_permissions() -> String {
    "rl".to_string()
}

/// Upper bound for every credential TTL and timeout: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Permission letters accepted in a container SAS `sp` field.
const SAS_PERMISSIONS: &str = "racwdxltmeop";

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let s = &config.search;

    if s.default_limit == 0 || s.max_limit == 0 {
        bail!("search.default_limit and search.max_limit must be >= 1");
    }
    if s.default_limit > s.max_limit {
        bail!(
            "search.default_limit ({}) must not exceed search.max_limit ({})",
            s.default_limit,
            s.max_limit
        );
    }
    if s.suggestion_default_limit == 0 || s.suggestion_max_limit == 0 {
        bail!("search.suggestion_default_limit and search.suggestion_max_limit must be >= 1");
    }
    if s.suggestion_default_limit > s.suggestion_max_limit {
        bail!(
            "search.suggestion_default_limit ({}) must not exceed search.suggestion_max_limit ({})",
            s.suggestion_default_limit,
            s.suggestion_max_limit
        );
    }
    for (name, value) in [
        ("search.default_min_similarity", s.default_min_similarity),
        ("search.suggestion_min_similarity", s.suggestion_min_similarity),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if s.max_term_length == 0 || s.max_partial_term_length == 0 {
        bail!("search term length limits must be >= 1");
    }

    if let Some(bearer) = &config.credentials.bearer {
        if bearer.region.trim().is_empty() {
            bail!("credentials.bearer.region must not be empty");
        }
        if bearer.cache_ttl_secs == 0 || bearer.expires_in_secs == 0 || bearer.timeout_secs == 0 {
            bail!("credentials.bearer TTLs and timeout must be > 0");
        }
        for (name, value) in [
            ("cache_ttl_secs", bearer.cache_ttl_secs),
            ("expires_in_secs", bearer.expires_in_secs),
            ("timeout_secs", bearer.timeout_secs),
        ] {
            if value > MAX_TTL_SECS {
                bail!("credentials.bearer.{} must be at most {} seconds", name, MAX_TTL_SECS);
            }
        }
        if bearer.cache_ttl_secs > bearer.expires_in_secs {
            bail!(
                "credentials.bearer.cache_ttl_secs ({}) must not exceed expires_in_secs ({})",
                bearer.cache_ttl_secs,
                bearer.expires_in_secs
            );
        }
    }

    if let Some(signed) = &config.credentials.signed_url {
        if signed.container.trim().is_empty() {
            bail!("credentials.signed_url.container must not be empty");
        }
        if signed.permissions.is_empty() {
            bail!("credentials.signed_url.permissions must not be empty");
        }
        if let Some(bad) = signed.permissions.chars().find(|c| !SAS_PERMISSIONS.contains(*c)) {
            bail!(
                "credentials.signed_url.permissions has invalid letter {:?}; allowed: {}",
                bad,
                SAS_PERMISSIONS
            );
        }
        if signed.cache_ttl_secs == 0 || signed.token_ttl_secs == 0 {
            bail!("credentials.signed_url TTLs must be > 0");
        }
        for (name, value) in [
            ("cache_ttl_secs", signed.cache_ttl_secs),
            ("token_ttl_secs", signed.token_ttl_secs),
        ] {
            if value > MAX_TTL_SECS {
                bail!("credentials.signed_url.{} must be at most {} seconds", name, MAX_TTL_SECS);
            }
        }
        if signed.cache_ttl_secs > signed.token_ttl_secs {
            bail!(
                "credentials.signed_url.cache_ttl_secs ({}) must not exceed token_ttl_secs ({})",
                signed.cache_ttl_secs,
                signed.token_ttl_secs
            );
        }
    }

    Ok(())
}
