//! Zone file decoding.
//!
//! Bulk fetches return zone files base64 encoded and keyed by hash. Each one
//! is a small DNS-style text file; the only record the indexer interprets is
//! the first `URI` record, which points at the owner's profile.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::ZonefileError;

const CLASSES: [&str; 4] = ["IN", "CH", "HS", "CS"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub owner: String,
    pub ttl: Option<u32>,
    pub class: Option<String>,
    pub rtype: String,
    pub rdata: Vec<String>,
}

/// A parsed zone file together with its original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zonefile {
    pub raw: String,
    pub origin: Option<String>,
    pub ttl: Option<u32>,
    pub records: Vec<ResourceRecord>,
}

impl Zonefile {
    pub fn parse(raw: &str) -> Result<Self, ZonefileError> {
        let mut origin = None;
        let mut ttl = None;
        let mut records = Vec::new();
        let mut last_owner: Option<String> = None;

        for (line_no, line) in logical_lines(raw) {
            let starts_blank = line.starts_with(char::is_whitespace);
            let tokens = tokenize(&line);
            if tokens.is_empty() {
                continue;
            }

            match tokens[0].to_ascii_uppercase().as_str() {
                "$ORIGIN" => {
                    origin = tokens.get(1).cloned();
                    continue;
                }
                "$TTL" => {
                    ttl = tokens.get(1).and_then(|t| t.parse().ok());
                    continue;
                }
                d if d.starts_with('$') => continue,
                _ => {}
            }

            let mut rest = tokens.into_iter().peekable();
            let owner = if starts_blank {
                last_owner.clone().ok_or_else(|| ZonefileError::Malformed {
                    line: line_no,
                    reason: "record without owner".to_string(),
                })?
            } else {
                rest.next().unwrap_or_default()
            };

            let mut record_ttl = None;
            let mut class = None;
            let rtype = loop {
                let token = rest.next().ok_or_else(|| ZonefileError::Malformed {
                    line: line_no,
                    reason: "missing record type".to_string(),
                })?;
                if record_ttl.is_none() {
                    if let Ok(t) = token.parse::<u32>() {
                        record_ttl = Some(t);
                        continue;
                    }
                }
                if class.is_none() && CLASSES.contains(&token.to_ascii_uppercase().as_str()) {
                    class = Some(token.to_ascii_uppercase());
                    continue;
                }
                break token.to_ascii_uppercase();
            };

            last_owner = Some(owner.clone());
            records.push(ResourceRecord {
                owner,
                ttl: record_ttl,
                class,
                rtype,
                rdata: rest.collect(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            origin,
            ttl,
            records,
        })
    }

    /// Decode a base64 payload from a bulk response and parse it.
    pub fn from_base64(encoded: &str) -> Result<Self, ZonefileError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let text = String::from_utf8(bytes)?;
        Self::parse(&text)
    }

    /// Target of the first `URI` record, the profile marker.
    pub fn profile_url(&self) -> Option<&str> {
        self.records
            .iter()
            .filter(|r| r.rtype == "URI")
            // priority weight "target"
            .find_map(|r| r.rdata.get(2).or_else(|| r.rdata.last()))
            .map(String::as_str)
            .filter(|u| !u.is_empty())
    }
}

/// Raw zone files keyed by hash, as returned by one bulk fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ZonefileBundle(pub HashMap<String, String>);

impl ZonefileBundle {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode every entry. Entries that fail are logged and left out, so a
    /// record pointing at them simply gets no zone file.
    pub fn decode(&self) -> HashMap<String, Zonefile> {
        let mut decoded = HashMap::with_capacity(self.0.len());
        for (hash, encoded) in &self.0 {
            match Zonefile::from_base64(encoded) {
                Ok(zonefile) => {
                    decoded.insert(hash.clone(), zonefile);
                }
                Err(e) => warn!(hash = %hash, error = %e, "Skipping undecodable zone file"),
            }
        }
        decoded
    }
}

/// Join parenthesised continuations and drop comments. Yields the 1-based
/// line number where each logical line starts.
fn logical_lines(raw: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut depth = 0i32;

    for (idx, line) in raw.lines().enumerate() {
        let stripped = strip_comment(line);
        let mut cleaned = String::with_capacity(stripped.len());
        let mut in_quotes = false;
        for c in stripped.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    cleaned.push(c);
                }
                '(' if !in_quotes => {
                    depth += 1;
                    cleaned.push(' ');
                }
                ')' if !in_quotes => {
                    depth -= 1;
                    cleaned.push(' ');
                }
                c => cleaned.push(c),
            }
        }
        match pending.as_mut() {
            Some((_, acc)) => {
                acc.push(' ');
                acc.push_str(cleaned.trim());
            }
            None => pending = Some((idx + 1, cleaned)),
        }
        if depth <= 0 {
            depth = 0;
            if let Some(done) = pending.take() {
                out.push(done);
            }
        }
    }
    if let Some(done) = pending {
        out.push(done);
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}
