//! Container-scoped shared access signature (SAS) signer.
//!
//! Tokens are signed locally; no network call is made. The storage account
//! comes from `AZURE_STORAGE_CONNECTION_STRING`:
//!
//! ```text
//! AccountName=<name>;AccountKey=<base64 key>;EndpointSuffix=core.windows.net
//! ```
//!
//! # Signing
//!
//! ```text
//! string_to_sign = perms \n \n expiry \n /account/container \n\n\n\n version \n\n\n\n\n
//! sig            = base64(HMAC-SHA256(base64_decode(AccountKey), string_to_sign))
//! token          = sv=<version>&sr=c&sp=<perms>&se=<expiry>&sig=<sig>
//! ```
//!
//! `expiry` is formatted `%Y-%m-%dT%H:%M:%SZ`; `se` and `sig` are
//! percent-encoded in the token.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use super::{expiry_after, ttl_from_secs, CredentialError, CredentialGenerator};
use crate::config::{SignedUrlConfig, STORAGE_CONNECTION_ENV};

type HmacSha256 = Hmac<Sha256>;

/// Storage service version the signature format follows.
pub const SERVICE_VERSION: &str = "2021-06-08";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Container token as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedUrlToken {
    pub sas_token: String,
    pub container_url: String,
    pub base_url: String,
    pub container_name: String,
    pub account_name: String,
    pub expires_at: DateTime<Utc>,
    pub permissions: String,
    /// Always `"container"`.
    pub resource_type: String,
    pub issued_at: DateTime<Utc>,
}

/// Signed URL for one blob.
#[derive(Debug, Clone, Serialize)]
pub struct BlobUrl {
    pub blob_name: String,
    pub blob_url: String,
    pub generated_at: DateTime<Utc>,
}

/// Parsed storage connection string.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageAccount {
    pub name: String,
    pub key: Vec<u8>,
    pub endpoint_suffix: String,
}

impl StorageAccount {
    pub fn parse(connection_string: &str) -> Result<Self, CredentialError> {
        let mut name = None;
        let mut key = None;
        let mut suffix = None;

        for part in connection_string.split(';') {
            let Some((k, v)) = part.trim().split_once('=') else {
                continue;
            };
            match k {
                "AccountName" => name = Some(v.to_string()),
                "AccountKey" => key = Some(v.to_string()),
                "EndpointSuffix" => suffix = Some(v.to_string()),
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CredentialError::Configuration("AccountName missing from connection string".into()))?;
        let key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CredentialError::Configuration("AccountKey missing from connection string".into()))?;
        let key = BASE64
            .decode(key.as_bytes())
            .map_err(|e| CredentialError::Configuration(format!("AccountKey is not valid base64: {}", e)))?;

        Ok(Self {
            name,
            key,
            endpoint_suffix: suffix.unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
        })
    }

    pub fn base_url(&self) -> String {
        format!("https://{}.blob.{}", self.name, self.endpoint_suffix)
    }
}

pub struct SasTokenSigner {
    account: StorageAccount,
    container: String,
    permissions: String,
    token_ttl_secs: u64,
}

impl SasTokenSigner {
    pub fn new(config: &SignedUrlConfig, account: StorageAccount) -> Self {
        Self {
            account,
            container: config.container.clone(),
            permissions: config.permissions.clone(),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    /// Build from config, taking the account from the environment.
    pub fn from_env(config: &SignedUrlConfig) -> Result<Self, CredentialError> {
        let conn = std::env::var(STORAGE_CONNECTION_ENV).map_err(|_| {
            CredentialError::Configuration(format!("{} not set", STORAGE_CONNECTION_ENV))
        })?;
        Ok(Self::new(config, StorageAccount::parse(&conn)?))
    }

    fn string_to_sign(&self, expiry: &str) -> String {
        format!(
            "{}\n\n{}\n/{}/{}\n\n\n\n{}\n\n\n\n\n",
            self.permissions, expiry, self.account.name, self.container, SERVICE_VERSION
        )
    }

    /// SAS query string valid until `expires_at`.
    pub fn sign(&self, expires_at: DateTime<Utc>) -> String {
        let expiry = expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let signature = BASE64.encode(hmac_sha256(
            &self.account.key,
            self.string_to_sign(&expiry).as_bytes(),
        ));
        format!(
            "sv={}&sr=c&sp={}&se={}&sig={}",
            SERVICE_VERSION,
            self.permissions,
            uri_encode(&expiry),
            uri_encode(&signature)
        )
    }
}

#[async_trait]
impl CredentialGenerator<SignedUrlToken> for SasTokenSigner {
    async fn generate(&self, now: DateTime<Utc>) -> Result<SignedUrlToken, CredentialError> {
        let ttl = ttl_from_secs("credentials.signed_url.token_ttl_secs", self.token_ttl_secs)?;
        let expires_at = expiry_after(now, ttl)?;
        let sas_token = self.sign(expires_at);
        let base_url = self.account.base_url();

        Ok(SignedUrlToken {
            container_url: format!("{}/{}?{}", base_url, self.container, sas_token),
            sas_token,
            base_url,
            container_name: self.container.clone(),
            account_name: self.account.name.clone(),
            expires_at,
            permissions: self.permissions.clone(),
            resource_type: "container".to_string(),
            issued_at: now,
        })
    }

    fn details(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("account_name".into(), self.account.name.clone().into());
        map.insert("container_name".into(), self.container.clone().into());
        map.insert("base_url".into(), self.account.base_url().into());
        map
    }
}

/// Percent-encode each `/`-separated segment of a blob name.
pub fn encode_blob_path(blob_name: &str) -> Result<String, CredentialError> {
    if blob_name.trim().is_empty() {
        return Err(CredentialError::InvalidBlobName(
            "blob name must not be empty".to_string(),
        ));
    }

    let mut segments = Vec::new();
    for segment in blob_name.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(CredentialError::InvalidBlobName(format!(
                "'{}' contains an empty or relative path segment",
                blob_name
            )));
        }
        segments.push(uri_encode(segment));
    }
    Ok(segments.join("/"))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// URI-encode a string per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
