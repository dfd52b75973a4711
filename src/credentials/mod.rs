//! Short-lived credential cache.
//!
//! Two independent credential kinds are cached, one entry each:
//!
//! | Kind | Generator | Default cache lifetime |
//! |------|-----------|------------------------|
//! | [`CredentialKind::Bearer`] | [`bearer::SpeechTokenIssuer`] (STS `issueToken`) | 540 s |
//! | [`CredentialKind::SignedUrl`] | [`signed_url::SasTokenSigner`] (container SAS) | 3300 s |
//!
//! # Protocol
//!
//! Each kind lives in its own [`CredentialSlot`]. A slot's entry sits
//! behind a `tokio::sync::Mutex` that is held across the whole
//! check-generate-store sequence, so concurrent callers that find the entry
//! stale wait for one generation instead of racing their own. The two kinds
//! never share a lock.
//!
//! - `get_or_generate` returns the cached value while `now < expires_at`,
//!   otherwise runs the generator once and stores the result.
//! - A failed generation returns the error and leaves the entry untouched.
//! - `invalidate` drops the entry unconditionally; it is idempotent.
//! - `describe` reports presence, validity and expiry without mutating.
//!
//! Time comes from an injected [`Clock`] so expiry can be driven in tests.

pub mod bearer;
pub mod signed_url;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CredentialsConfig;

pub use bearer::{BearerToken, SpeechTokenIssuer};
pub use signed_url::{BlobUrl, SasTokenSigner, SignedUrlToken};

/// The two cached credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Bearer,
    SignedUrl,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Bearer => "bearer",
            CredentialKind::SignedUrl => "signed_url",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    /// The upstream issuer answered with a non-success status.
    #[error("upstream credential service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("failed to reach upstream credential service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("credential configuration error: {0}")]
    Configuration(String),

    #[error("invalid blob name: {0}")]
    InvalidBlobName(String),

    #[error("{0} credentials are not configured")]
    NotConfigured(CredentialKind),
}

/// `secs` as a [`Duration`], or a configuration error when it does not fit.
pub(crate) fn ttl_from_secs(field: &str, secs: u64) -> Result<Duration, CredentialError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| CredentialError::Configuration(format!("{} out of range: {}", field, secs)))
}

/// `now + lifetime`, or a configuration error when the result overflows.
pub(crate) fn expiry_after(
    now: DateTime<Utc>,
    lifetime: Duration,
) -> Result<DateTime<Utc>, CredentialError> {
    now.checked_add_signed(lifetime).ok_or_else(|| {
        CredentialError::Configuration(format!(
            "lifetime of {}s overflows the expiry timestamp",
            lifetime.num_seconds()
        ))
    })
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Produces a fresh credential value.
#[async_trait]
pub trait CredentialGenerator<T>: Send + Sync {
    /// Build a new credential issued at `now`.
    async fn generate(&self, now: DateTime<Utc>) -> Result<T, CredentialError>;

    /// Static identifiers reported by `describe` (region, account, ...).
    fn details(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}

/// A cached value with its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Observability snapshot of one slot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub kind: CredentialKind,
    pub has_cached_token: bool,
    pub is_token_valid: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Single-entry TTL cache for one credential kind.
pub struct CredentialSlot<T> {
    kind: CredentialKind,
    generator: Arc<dyn CredentialGenerator<T>>,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
    entry: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone + Send> CredentialSlot<T> {
    pub fn new(
        kind: CredentialKind,
        generator: Arc<dyn CredentialGenerator<T>>,
        lifetime: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kind,
            generator,
            lifetime,
            clock,
            entry: Mutex::new(None),
        }
    }

    /// Cached entry if still valid, otherwise a freshly generated one.
    pub async fn get_or_generate(&self) -> Result<CacheEntry<T>, CredentialError> {
        let mut slot = self.entry.lock().await;

        let now = self.clock.now();
        if let Some(entry) = slot.as_ref() {
            if entry.is_valid_at(now) {
                debug!(kind = %self.kind, expires_at = %entry.expires_at, "credential cache hit");
                return Ok(entry.clone());
            }
        }

        let expires_at = expiry_after(now, self.lifetime)?;
        let value = match self.generator.generate(now).await {
            Ok(v) => v,
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "credential generation failed");
                return Err(e);
            }
        };

        let entry = CacheEntry {
            value,
            issued_at: now,
            expires_at,
        };
        *slot = Some(entry.clone());
        info!(kind = %self.kind, expires_at = %entry.expires_at, "generated new credential");
        Ok(entry)
    }

    /// Drop the cached entry. Returns whether one was present.
    pub async fn invalidate(&self) -> bool {
        let had_entry = self.entry.lock().await.take().is_some();
        info!(kind = %self.kind, had_entry, "credential cache invalidated");
        had_entry
    }

    pub async fn describe(&self) -> CacheStatus {
        let slot = self.entry.lock().await;
        let now = self.clock.now();
        CacheStatus {
            kind: self.kind,
            has_cached_token: slot.is_some(),
            is_token_valid: slot.as_ref().is_some_and(|e| e.is_valid_at(now)),
            token_expires_at: slot.as_ref().map(|e| e.expires_at),
            details: self.generator.details(),
        }
    }
}

/// A credential of either kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Credential {
    Bearer(BearerToken),
    SignedUrl(SignedUrlToken),
}

/// Both credential slots. A kind without configuration has no slot.
pub struct CredentialCache {
    bearer: Option<CredentialSlot<BearerToken>>,
    signed_url: Option<CredentialSlot<SignedUrlToken>>,
}

impl CredentialCache {
    pub fn new(
        bearer: Option<CredentialSlot<BearerToken>>,
        signed_url: Option<CredentialSlot<SignedUrlToken>>,
    ) -> Self {
        Self { bearer, signed_url }
    }

    /// Cache with neither kind configured.
    pub fn empty() -> Self {
        Self::new(None, None)
    }

    /// Build the slots for every configured kind, reading secrets from the
    /// environment.
    pub fn from_config(
        config: &CredentialsConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CredentialError> {
        let bearer = match &config.bearer {
            Some(cfg) => Some(CredentialSlot::new(
                CredentialKind::Bearer,
                Arc::new(SpeechTokenIssuer::from_env(cfg)?),
                ttl_from_secs("credentials.bearer.cache_ttl_secs", cfg.cache_ttl_secs)?,
                clock.clone(),
            )),
            None => None,
        };
        let signed_url = match &config.signed_url {
            Some(cfg) => Some(CredentialSlot::new(
                CredentialKind::SignedUrl,
                Arc::new(SasTokenSigner::from_env(cfg)?),
                ttl_from_secs("credentials.signed_url.cache_ttl_secs", cfg.cache_ttl_secs)?,
                clock,
            )),
            None => None,
        };
        Ok(Self::new(bearer, signed_url))
    }

    pub fn is_configured(&self, kind: CredentialKind) -> bool {
        match kind {
            CredentialKind::Bearer => self.bearer.is_some(),
            CredentialKind::SignedUrl => self.signed_url.is_some(),
        }
    }

    fn bearer_slot(&self) -> Result<&CredentialSlot<BearerToken>, CredentialError> {
        self.bearer
            .as_ref()
            .ok_or(CredentialError::NotConfigured(CredentialKind::Bearer))
    }

    fn signed_url_slot(&self) -> Result<&CredentialSlot<SignedUrlToken>, CredentialError> {
        self.signed_url
            .as_ref()
            .ok_or(CredentialError::NotConfigured(CredentialKind::SignedUrl))
    }

    pub async fn bearer(&self) -> Result<CacheEntry<BearerToken>, CredentialError> {
        self.bearer_slot()?.get_or_generate().await
    }

    pub async fn signed_url(&self) -> Result<CacheEntry<SignedUrlToken>, CredentialError> {
        self.signed_url_slot()?.get_or_generate().await
    }

    pub async fn get_or_generate(&self, kind: CredentialKind) -> Result<Credential, CredentialError> {
        match kind {
            CredentialKind::Bearer => Ok(Credential::Bearer(self.bearer().await?.value)),
            CredentialKind::SignedUrl => Ok(Credential::SignedUrl(self.signed_url().await?.value)),
        }
    }

    pub async fn invalidate(&self, kind: CredentialKind) -> Result<bool, CredentialError> {
        match kind {
            CredentialKind::Bearer => Ok(self.bearer_slot()?.invalidate().await),
            CredentialKind::SignedUrl => Ok(self.signed_url_slot()?.invalidate().await),
        }
    }

    pub async fn describe(&self, kind: CredentialKind) -> Result<CacheStatus, CredentialError> {
        match kind {
            CredentialKind::Bearer => Ok(self.bearer_slot()?.describe().await),
            CredentialKind::SignedUrl => Ok(self.signed_url_slot()?.describe().await),
        }
    }

    /// URL for one blob, signed with the cached (or freshly generated)
    /// container token.
    pub async fn sign_blob_url(&self, blob_name: &str) -> Result<BlobUrl, CredentialError> {
        let path = signed_url::encode_blob_path(blob_name)?;
        let slot = self.signed_url_slot()?;
        let token = slot.get_or_generate().await?.value;
        Ok(BlobUrl {
            blob_name: blob_name.to_string(),
            blob_url: format!(
                "{}/{}/{}?{}",
                token.base_url, token.container_name, path, token.sas_token
            ),
            generated_at: slot.clock.now(),
        })
    }
}
