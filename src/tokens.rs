//! `psearch token`: issue a credential once and print it as JSON.
//!
//! Each invocation is a fresh process, so the cache never hits here; this
//! is a diagnostic for the configuration and secrets. The server holds the
//! long-lived cache.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::{CredentialCache, CredentialKind, SystemClock};

/// What to issue.
#[derive(Debug, Clone)]
pub enum TokenRequest {
    Bearer,
    SignedUrl,
    Blob(String),
}

pub async fn run_token(config: &Config, request: TokenRequest) -> Result<()> {
    let cache = CredentialCache::from_config(&config.credentials, Arc::new(SystemClock))?;

    let json = match request {
        TokenRequest::Bearer => {
            serde_json::to_string_pretty(&cache.get_or_generate(CredentialKind::Bearer).await?)?
        }
        TokenRequest::SignedUrl => serde_json::to_string_pretty(
            &cache.get_or_generate(CredentialKind::SignedUrl).await?,
        )?,
        TokenRequest::Blob(name) => serde_json::to_string_pretty(&cache.sign_blob_url(&name).await?)?,
    };

    println!("{}", json);
    Ok(())
}
