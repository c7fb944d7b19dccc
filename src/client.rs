//! # Naming Service Client
//!
//! The `NamingClient` trait is the pipeline's only view of the upstream naming
//! service. `CoreRpcClient` implements it over JSON-RPC on HTTP against a
//! naming node (the `blockstackd` RPC surface), optionally throttled to a
//! fixed request rate since the upstream API is metered.
//!
//! Every listing response carries the block height it was produced at; the
//! pipeline feeds those heights into the shared `Cursor`.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;
use url::Url;

use crate::error::ClientError;
use crate::metrics;
use crate::record::BlockchainRecord;
use crate::settings::Core;
use crate::zonefile::ZonefileBundle;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamespaceListing {
    pub namespaces: Vec<String>,
    #[serde(rename = "lastblock", default)]
    pub last_block: u64,
}

/// Names listed from one namespace at one offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamePage {
    pub names: Vec<String>,
    #[serde(rename = "lastblock", default)]
    pub last_block: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ZonefileResponse {
    pub zonefiles: ZonefileBundle,
    #[serde(rename = "lastblock", default)]
    pub last_block: u64,
}

#[derive(Debug, Deserialize)]
struct NameCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct NameRecordEnvelope {
    record: BlockchainRecord,
}

/// Operations the crawl needs from the naming service.
#[async_trait]
pub trait NamingClient: Send + Sync {
    async fn list_namespaces(&self) -> Result<NamespaceListing, ClientError>;

    async fn count_names(&self, namespace: &str) -> Result<u64, ClientError>;

    async fn list_names(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> Result<NamePage, ClientError>;

    async fn get_blockchain_record(&self, name: &str) -> Result<BlockchainRecord, ClientError>;

    /// Fetch every zone file in `hashes` with a single call.
    async fn get_zonefiles(&self, hashes: &[String]) -> Result<ZonefileResponse, ClientError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct CoreRpcClient {
    http: reqwest::Client,
    endpoint: Url,
    limiter: Option<DirectRateLimiter>,
    next_id: AtomicU64,
}

impl CoreRpcClient {
    pub fn new(settings: &Core) -> Result<Self, ClientError> {
        let endpoint = Url::parse(&settings.url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        let limiter = settings
            .qps_limit
            .and_then(NonZeroU32::new)
            .map(|qps| RateLimiter::direct(Quota::per_second(qps)));

        Ok(Self {
            http,
            endpoint,
            limiter,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ClientError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        trace!(method, id, "RPC request");

        let start = Instant::now();
        let result = self.send(method, &body).await;
        metrics::record_upstream_call(method, start.elapsed(), result.is_ok());
        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: &Value,
    ) -> Result<T, ClientError> {
        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_response(method, response)
    }
}

fn decode_response<T: DeserializeOwned>(
    method: &'static str,
    response: RpcResponse,
) -> Result<T, ClientError> {
    if let Some(err) = response.error {
        return Err(ClientError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    let result = response
        .result
        .ok_or(ClientError::EmptyResponse(method))?;
    // blockstackd reports failures inside a successful envelope
    if let Some(message) = result.get("error").and_then(Value::as_str) {
        return Err(ClientError::Rpc {
            code: result.get("http_status").and_then(Value::as_i64).unwrap_or(0),
            message: message.to_string(),
        });
    }
    serde_json::from_value(result).map_err(|source| ClientError::Decode { method, source })
}

#[async_trait]
impl NamingClient for CoreRpcClient {
    async fn list_namespaces(&self) -> Result<NamespaceListing, ClientError> {
        self.call("get_all_namespaces", json!([])).await
    }

    async fn count_names(&self, namespace: &str) -> Result<u64, ClientError> {
        let count: NameCount = self
            .call("get_num_names_in_namespace", json!([namespace]))
            .await?;
        Ok(count.count)
    }

    async fn list_names(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> Result<NamePage, ClientError> {
        self.call("get_names_in_namespace", json!([namespace, offset, limit]))
            .await
    }

    async fn get_blockchain_record(&self, name: &str) -> Result<BlockchainRecord, ClientError> {
        let envelope: NameRecordEnvelope = self
            .call("get_name_blockchain_record", json!([name]))
            .await?;
        Ok(envelope.record)
    }

    async fn get_zonefiles(&self, hashes: &[String]) -> Result<ZonefileResponse, ClientError> {
        self.call("get_zonefiles", json!([hashes])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(v: Value) -> RpcResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_decode_namespace_listing() {
        let resp = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "status": true, "namespaces": ["id", "helloworld"], "lastblock": 512345 }
        }));
        let listing: NamespaceListing = decode_response("get_all_namespaces", resp).unwrap();
        assert_eq!(listing.namespaces, vec!["id", "helloworld"]);
        assert_eq!(listing.last_block, 512345);
    }

    #[test]
    fn test_decode_zonefiles_keeps_base64() {
        let resp = envelope(json!({
            "result": { "zonefiles": { "abcd": "JE9SSUdJTiBhLmlk" }, "lastblock": 7 }
        }));
        let zf: ZonefileResponse = decode_response("get_zonefiles", resp).unwrap();
        assert_eq!(zf.zonefiles.len(), 1);
        assert_eq!(zf.last_block, 7);
        assert_eq!(zf.zonefiles.decode()["abcd"].origin.as_deref(), Some("a.id"));
    }

    #[test]
    fn test_rpc_and_inline_errors() {
        let resp = envelope(json!({ "error": { "code": -32601, "message": "no such method" } }));
        let err = decode_response::<NameCount>("x", resp).unwrap_err();
        assert!(matches!(err, ClientError::Rpc { code: -32601, .. }));

        let resp = envelope(json!({ "result": { "error": "Name not found", "http_status": 404 } }));
        let err = decode_response::<NameRecordEnvelope>("x", resp).unwrap_err();
        assert!(matches!(err, ClientError::Rpc { code: 404, .. }));

        let resp = envelope(json!({ "id": 3 }));
        assert!(matches!(
            decode_response::<NameCount>("get_num_names_in_namespace", resp),
            Err(ClientError::EmptyResponse("get_num_names_in_namespace"))
        ));
    }

    #[test]
    fn test_client_keeps_configured_endpoint() {
        let settings = Core {
            url: "http://core.example:6270/rpc".to_string(),
            qps_limit: Some(5),
            ..Core::default()
        };
        let client = CoreRpcClient::new(&settings).unwrap();
        assert_eq!(client.endpoint().as_str(), "http://core.example:6270/rpc");
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let settings = Core {
            url: "not a url".to_string(),
            ..Core::default()
        };
        assert!(matches!(
            CoreRpcClient::new(&settings),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
