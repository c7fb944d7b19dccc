//! In-memory collaborators for driving the indexer in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bns_indexer::client::{NamePage, NamespaceListing, NamingClient, ZonefileResponse};
use bns_indexer::error::{ClientError, ProfileError, StoreError};
use bns_indexer::profile::{Profile, ProfileResolver};
use bns_indexer::record::{BlockchainRecord, RecordDocument};
use bns_indexer::settings::{RetrySettings, Settings};
use bns_indexer::store::{CollectionHandle, DocumentStore};
use bns_indexer::zonefile::{Zonefile, ZonefileBundle};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACES_BLOCK: u64 = 100;
pub const ZONEFILES_BLOCK: u64 = 9_000;

/// Block height reported by a name listing at `offset`.
pub fn listing_block(offset: u64) -> u64 {
    500 + offset
}

pub fn name_at(namespace: &str, index: usize) -> String {
    format!("name{:04}.{}", index, namespace)
}

pub fn zonefile_text(name: &str, profile_url: Option<&str>) -> String {
    let mut text = format!("$ORIGIN {}\n$TTL 3600\n", name);
    if let Some(url) = profile_url {
        text.push_str(&format!("_http._tcp IN URI 10 1 \"{}\"\n", url));
    }
    text.push_str("@ IN TXT \"indexed\"\n");
    text
}

/// Settings tuned for tests: fast retries, no periodic reporting.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.retry = RetrySettings {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };
    settings.pipeline.stats_interval_seconds = 3600;
    settings
}

/// Scripted naming service.
#[derive(Default)]
pub struct FakeCore {
    namespaces: BTreeMap<String, Vec<String>>,
    records: HashMap<String, Value>,
    zonefiles: HashMap<String, String>,
    failing_hashes: HashSet<String>,
    failing_records: HashSet<String>,
    fail_namespace_listing: bool,
    stall_listing: bool,
    list_delay: Duration,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    list_calls: Mutex<Vec<(String, u64, u64)>>,
    zonefile_calls: AtomicUsize,
}

impl FakeCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace holding `count` names without zone files.
    pub fn namespace(mut self, namespace: &str, count: usize) -> Self {
        let names: Vec<String> = (0..count).map(|i| name_at(namespace, i)).collect();
        for name in &names {
            self.records.insert(
                name.clone(),
                json!({ "name": name, "value_hash": "", "address": "1Fake" }),
            );
        }
        self.namespaces.insert(namespace.to_string(), names);
        self
    }

    /// Give `name` a zone file.
    pub fn zonefile(mut self, name: &str, text: &str) -> Self {
        let hash = format!("hash-{}", name);
        if let Some(record) = self.records.get_mut(name) {
            record["value_hash"] = json!(hash);
        }
        self.zonefiles.insert(hash, STANDARD.encode(text));
        self
    }

    /// Point `name` at a zone file hash the bulk response never returns.
    pub fn missing_zonefile(mut self, name: &str) -> Self {
        if let Some(record) = self.records.get_mut(name) {
            record["value_hash"] = json!(format!("hash-{}", name));
        }
        self
    }

    /// Any bulk fetch that includes `name`'s zone file fails.
    pub fn failing_zonefile(self, name: &str) -> Self {
        let mut this = self.zonefile(name, &zonefile_text(name, None));
        this.failing_hashes.insert(format!("hash-{}", name));
        this
    }

    pub fn failing_record(mut self, name: &str) -> Self {
        self.failing_records.insert(name.to_string());
        self
    }

    pub fn fail_namespace_listing(mut self) -> Self {
        self.fail_namespace_listing = true;
        self
    }

    /// Name listings never return.
    pub fn stall_listing(mut self) -> Self {
        self.stall_listing = true;
        self
    }

    pub fn list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `(namespace, offset, limit)` of every name listing, in call order.
    pub fn list_calls(&self) -> Vec<(String, u64, u64)> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn offsets_for(&self, namespace: &str) -> Vec<u64> {
        let mut offsets: Vec<u64> = self
            .list_calls()
            .into_iter()
            .filter(|(ns, _, _)| ns == namespace)
            .map(|(_, offset, _)| offset)
            .collect();
        offsets.sort_unstable();
        offsets
    }

    pub fn zonefile_calls(&self) -> usize {
        self.zonefile_calls.load(Ordering::SeqCst)
    }
}

fn rpc_error(code: i64, message: &str) -> ClientError {
    ClientError::Rpc {
        code,
        message: message.to_string(),
    }
}

#[async_trait]
impl NamingClient for FakeCore {
    async fn list_namespaces(&self) -> Result<NamespaceListing, ClientError> {
        if self.fail_namespace_listing {
            return Err(rpc_error(503, "node unavailable"));
        }
        Ok(NamespaceListing {
            namespaces: self.namespaces.keys().cloned().collect(),
            last_block: NAMESPACES_BLOCK,
        })
    }

    async fn count_names(&self, namespace: &str) -> Result<u64, ClientError> {
        self.namespaces
            .get(namespace)
            .map(|names| names.len() as u64)
            .ok_or_else(|| rpc_error(404, "no such namespace"))
    }

    async fn list_names(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> Result<NamePage, ClientError> {
        if self.stall_listing {
            std::future::pending::<()>().await;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.list_calls
            .lock()
            .unwrap()
            .push((namespace.to_string(), offset, limit));

        let names = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| rpc_error(404, "no such namespace"))?;
        let start = (offset as usize).min(names.len());
        let end = (start + limit as usize).min(names.len());
        Ok(NamePage {
            names: names[start..end].to_vec(),
            last_block: listing_block(offset),
        })
    }

    async fn get_blockchain_record(&self, name: &str) -> Result<BlockchainRecord, ClientError> {
        if self.failing_records.contains(name) {
            return Err(rpc_error(500, "record lookup failed"));
        }
        let record = self
            .records
            .get(name)
            .cloned()
            .ok_or_else(|| rpc_error(404, "Name not found"))?;
        Ok(serde_json::from_value(record).unwrap())
    }

    async fn get_zonefiles(&self, hashes: &[String]) -> Result<ZonefileResponse, ClientError> {
        self.zonefile_calls.fetch_add(1, Ordering::SeqCst);
        if hashes.iter().any(|h| self.failing_hashes.contains(h)) {
            return Err(rpc_error(500, "zone file storage unavailable"));
        }
        let found = hashes
            .iter()
            .filter_map(|h| self.zonefiles.get(h).map(|z| (h.clone(), z.clone())))
            .collect();
        Ok(ZonefileResponse {
            zonefiles: ZonefileBundle(found),
            last_block: ZONEFILES_BLOCK,
        })
    }
}

/// Serves fixed profile claims keyed by profile URL.
#[derive(Default)]
pub struct StaticResolver {
    claims: HashMap<String, Value>,
    failing: HashSet<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(mut self, url: &str, claim: Value) -> Self {
        self.claims.insert(url.to_string(), claim);
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }
}

#[async_trait]
impl ProfileResolver for StaticResolver {
    async fn resolve(&self, zonefile: &Zonefile) -> Result<Option<Profile>, ProfileError> {
        let Some(url) = zonefile.profile_url() else {
            return Ok(None);
        };
        if self.failing.contains(url) {
            return Err(ProfileError::Token(format!("unreadable token at {}", url)));
        }
        Ok(self.claims.get(url).map(|claim| Profile {
            source_url: url.to_string(),
            claim: claim.clone(),
        }))
    }
}

/// Document store backed by a map; counts handles so tests can check that
/// every handle is released.
#[derive(Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, RecordDocument>>>,
    writes: Arc<Mutex<Vec<String>>>,
    failing: Arc<HashSet<String>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts of these names fail.
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: Arc::new(names.iter().map(|n| n.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn documents(&self) -> HashMap<String, RecordDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn document(&self, name: &str) -> Option<RecordDocument> {
        self.documents.lock().unwrap().get(name).cloned()
    }

    /// Names of every successful write, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn acquire(&self) -> Result<Box<dyn CollectionHandle>, StoreError> {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCollection {
            documents: self.documents.clone(),
            writes: self.writes.clone(),
            failing: self.failing.clone(),
            open_handles: self.open_handles.clone(),
        }))
    }
}

struct MemoryCollection {
    documents: Arc<Mutex<HashMap<String, RecordDocument>>>,
    writes: Arc<Mutex<Vec<String>>>,
    failing: Arc<HashSet<String>>,
    open_handles: Arc<AtomicUsize>,
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    async fn upsert(&mut self, document: &RecordDocument) -> Result<(), StoreError> {
        if self.failing.contains(&document.name) {
            return Err(StoreError::Unavailable(format!(
                "insert of {} rejected",
                document.name
            )));
        }
        self.writes.lock().unwrap().push(document.name.clone());
        self.documents
            .lock()
            .unwrap()
            .insert(document.name.clone(), document.clone());
        Ok(())
    }
}

impl Drop for MemoryCollection {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
