//! Bearer token issuer backed by a regional STS `issueToken` endpoint.
//!
//! The subscription key is read from `AZURE_SPEECH_KEY`. One `POST` per
//! generation; non-success statuses surface as
//! [`CredentialError::Upstream`] and are not retried here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::{CredentialError, CredentialGenerator};
use crate::config::{BearerConfig, SPEECH_KEY_ENV};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Issued bearer token as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BearerToken {
    pub access_token: String,
    /// Always `"Bearer"`.
    pub token_type: String,
    /// Lifetime reported to clients, in seconds.
    pub expires_in: u64,
    pub region: String,
    pub issued_at: DateTime<Utc>,
}

pub struct SpeechTokenIssuer {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    subscription_key: String,
    expires_in: u64,
}

impl SpeechTokenIssuer {
    pub fn new(config: &BearerConfig, subscription_key: String) -> Result<Self, CredentialError> {
        if subscription_key.trim().is_empty() {
            return Err(CredentialError::Configuration(format!(
                "{} is empty",
                SPEECH_KEY_ENV
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.token_endpoint(),
            region: config.region.clone(),
            subscription_key,
            expires_in: config.expires_in_secs,
        })
    }

    /// Build from config, taking the key from the environment.
    pub fn from_env(config: &BearerConfig) -> Result<Self, CredentialError> {
        let key = std::env::var(SPEECH_KEY_ENV).map_err(|_| {
            CredentialError::Configuration(format!("{} not set", SPEECH_KEY_ENV))
        })?;
        Self::new(config, key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CredentialGenerator<BearerToken> for SpeechTokenIssuer {
    async fn generate(&self, now: DateTime<Utc>) -> Result<BearerToken, CredentialError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header("Content-Length", "0")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let access_token = response.text().await?.trim().to_string();
        if access_token.is_empty() {
            return Err(CredentialError::Upstream {
                status: status.as_u16(),
                body: "empty token in response".to_string(),
            });
        }

        Ok(BearerToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.expires_in,
            region: self.region.clone(),
            issued_at: now,
        })
    }

    fn details(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("speech_region".into(), self.region.clone().into());
        map.insert("token_endpoint".into(), self.endpoint.clone().into());
        map
    }
}
