use thiserror::Error;

/// Errors returned by the naming-service client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("naming service returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response for {method}: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("response for {0} carried neither a result nor an error")]
    EmptyResponse(&'static str),
    #[error("invalid naming service url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors from decoding a zone file pulled out of a bulk response.
#[derive(Debug, Error)]
pub enum ZonefileError {
    #[error("zone file is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("zone file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("zone file line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Errors from resolving or validating a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("profile document is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("profile token is malformed: {0}")]
    Token(String),
    #[error("profile failed validation: {0}")]
    Invalid(String),
}

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The store cannot hand out handles, e.g. its pool has been shut down.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error for a crawl run.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("failed to list namespaces: {0}")]
    ListNamespaces(#[source] ClientError),
    #[error("run cancelled before namespaces were listed")]
    Cancelled,
}
