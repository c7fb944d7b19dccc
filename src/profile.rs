//! Profile resolution from a zone file's profile marker.
//!
//! A profile is published as a token file: a JSON array of signed tokens whose
//! payload carries the profile under `claim`. Older names publish the profile
//! object directly. Signatures are not verified here.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::ProfileError;
use crate::zonefile::Zonefile;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub source_url: String,
    pub claim: Value,
}

impl Profile {
    /// Structural check run before the profile is persisted.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let obj = self
            .claim
            .as_object()
            .ok_or_else(|| ProfileError::Invalid("claim is not a JSON object".to_string()))?;
        if obj.is_empty() {
            return Err(ProfileError::Invalid("claim is empty".to_string()));
        }
        if let Some(kind) = obj.get("@type") {
            if !kind.is_string() {
                return Err(ProfileError::Invalid("@type must be a string".to_string()));
            }
        }
        Ok(())
    }
}

/// Derives a profile from a zone file.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// `Ok(None)` when the zone file points nowhere or the document holds no profile.
    async fn resolve(&self, zonefile: &Zonefile) -> Result<Option<Profile>, ProfileError>;
}

pub struct HttpProfileResolver {
    client: reqwest::Client,
}

impl HttpProfileResolver {
    pub fn new(timeout: Duration) -> Result<Self, ProfileError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bns-indexer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProfileResolver for HttpProfileResolver {
    async fn resolve(&self, zonefile: &Zonefile) -> Result<Option<Profile>, ProfileError> {
        let Some(url) = zonefile.profile_url() else {
            return Ok(None);
        };

        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(url, "Profile document not found");
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        parse_profile_document(&body, url)
    }
}

/// Extract the profile claim from a fetched profile document.
pub fn parse_profile_document(body: &Value, url: &str) -> Result<Option<Profile>, ProfileError> {
    let claim = match body {
        Value::Array(tokens) => match tokens.first() {
            Some(first) => claim_from_token_record(first)?,
            None => return Ok(None),
        },
        Value::Object(_) => body.clone(),
        _ => {
            return Err(ProfileError::Token(
                "profile document is neither a token file nor an object".to_string(),
            ))
        }
    };

    Ok(Some(Profile {
        source_url: url.to_string(),
        claim,
    }))
}

fn claim_from_token_record(record: &Value) -> Result<Value, ProfileError> {
    if let Some(claim) = record.pointer("/decodedToken/payload/claim") {
        return Ok(claim.clone());
    }

    let token = record
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| ProfileError::Token("token record has no token".to_string()))?;

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ProfileError::Token("token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ProfileError::Token(format!("payload is not base64url: {}", e)))?;
    let payload: Value = serde_json::from_slice(&bytes)?;

    payload
        .get("claim")
        .cloned()
        .ok_or_else(|| ProfileError::Token("token payload has no claim".to_string()))
}
