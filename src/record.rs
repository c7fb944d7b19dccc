//! The per-name aggregate that travels through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::profile::Profile;
use crate::zonefile::Zonefile;

/// Opaque name record as returned by the naming service.
///
/// Only `value_hash` (the zone file hash) is interpreted; every other field is
/// carried through to the stored document untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockchainRecord(pub Map<String, Value>);

impl BlockchainRecord {
    /// Zone file hash referenced by the record, if any.
    pub fn zonefile_hash(&self) -> Option<&str> {
        self.0
            .get("value_hash")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

/// One discovered name and everything attached to it so far.
#[derive(Debug, Clone)]
pub struct Record {
    name: String,
    pub namespace: String,
    pub blockchain_record: Option<BlockchainRecord>,
    pub zonefile: Option<Zonefile>,
    pub profile: Option<Profile>,
}

impl Record {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            blockchain_record: None,
            zonefile: None,
            profile: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Empty when the blockchain record is missing or carries no hash.
    pub fn zonefile_hash(&self) -> Option<&str> {
        self.blockchain_record
            .as_ref()
            .and_then(BlockchainRecord::zonefile_hash)
    }

    /// Profile URL advertised by the attached zone file.
    pub fn profile_marker(&self) -> Option<&str> {
        self.zonefile.as_ref().and_then(Zonefile::profile_url)
    }

    pub fn into_document(self, block_height: u64) -> RecordDocument {
        let zonefile_hash = self.zonefile_hash().map(str::to_string);
        RecordDocument {
            name: self.name,
            namespace: self.namespace,
            zonefile_hash,
            blockchain_record: self.blockchain_record,
            zonefile: self.zonefile.map(|z| z.raw),
            profile: self.profile.map(|p| p.claim),
            block_height,
            indexed_at: Utc::now(),
        }
    }
}

/// All records discovered from one name page, handed to the zone file stage
/// as a unit.
#[derive(Debug)]
pub struct RecordBatch {
    pub namespace: String,
    pub page: u64,
    pub records: Vec<Record>,
}

impl RecordBatch {
    /// Distinct non-empty zone file hashes referenced by the batch, in first-seen order.
    pub fn zonefile_hashes(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .filter_map(Record::zonefile_hash)
            .filter(|h| seen.insert(*h))
            .map(str::to_string)
            .collect()
    }
}

/// Document written to the store, keyed by `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDocument {
    pub name: String,
    pub namespace: String,
    pub zonefile_hash: Option<String>,
    pub blockchain_record: Option<BlockchainRecord>,
    pub zonefile: Option<String>,
    pub profile: Option<Value>,
    pub block_height: u64,
    pub indexed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with_hash(name: &str, hash: &str) -> Record {
        let mut r = Record::new(name, "id");
        r.blockchain_record = Some(
            serde_json::from_value(json!({ "value_hash": hash, "address": "1abc" })).unwrap(),
        );
        r
    }

    #[test]
    fn test_empty_hash_is_none() {
        assert_eq!(record_with_hash("a.id", "").zonefile_hash(), None);
        assert_eq!(record_with_hash("a.id", "  ").zonefile_hash(), None);
        assert_eq!(Record::new("b.id", "id").zonefile_hash(), None);
        assert_eq!(record_with_hash("c.id", "ff00").zonefile_hash(), Some("ff00"));
    }

    #[test]
    fn test_batch_hashes_are_distinct_and_skip_empty() {
        let batch = RecordBatch {
            namespace: "id".into(),
            page: 0,
            records: vec![
                record_with_hash("a.id", "h1"),
                record_with_hash("b.id", ""),
                record_with_hash("c.id", "h2"),
                record_with_hash("d.id", "h1"),
                Record::new("e.id", "id"),
            ],
        };
        assert_eq!(batch.zonefile_hashes(), vec!["h1".to_string(), "h2".to_string()]);
    }

    #[test]
    fn test_document_keeps_opaque_record_fields() {
        let doc = record_with_hash("a.id", "h1").into_document(42);
        assert_eq!(doc.name, "a.id");
        assert_eq!(doc.zonefile_hash.as_deref(), Some("h1"));
        assert_eq!(doc.block_height, 42);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["blockchain_record"]["address"], "1abc");
        assert!(value["profile"].is_null());
    }
}
