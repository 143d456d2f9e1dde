use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::datasource::{DataSource, ReputationRequest};
use crate::error::{AppError, AppResult};
use crate::services::transfers::TransferRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct ReputationEntry {
    pub key: String,
    pub reputation: f64,
}

/// The answer shapes of the reputation endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ReputationPayload {
    /// `{ "reputation_records": [{ "title", "reputation" }] }`, keyed by
    /// normalized title
    Catalogue(Vec<ReputationEntry>),
    /// `{ "nfts": [...], "<category>": [...] }`, every list holding
    /// `{ "token_id", "reputation" }`
    OwnerRecord {
        categories: Vec<(String, Vec<ReputationEntry>)>,
    },
    /// Bare `{ "token_id", "reputation" }` object or array of them
    Flat(Vec<ReputationEntry>),
}

impl ReputationPayload {
    pub fn parse(body: &Value) -> Option<Self> {
        match body {
            Value::Array(items) => Some(Self::Flat(parse_token_list(items))),
            Value::Object(map) if map.contains_key("reputation_records") => {
                parse_catalogue(map)
            }
            Value::Object(map) if map.contains_key("token_id") => {
                parse_token_entry(body).map(|entry| Self::Flat(vec![entry]))
            }
            Value::Object(map) => parse_owner_record(map),
            _ => None,
        }
    }

    pub fn key_kind(&self) -> KeyKind {
        match self {
            ReputationPayload::Catalogue(_) => KeyKind::Title,
            ReputationPayload::OwnerRecord { .. } | ReputationPayload::Flat(_) => KeyKind::TokenId,
        }
    }

    pub fn into_entries(self) -> Vec<ReputationEntry> {
        match self {
            ReputationPayload::Catalogue(entries) | ReputationPayload::Flat(entries) => entries,
            ReputationPayload::OwnerRecord { categories } => categories
                .into_iter()
                .flat_map(|(_, entries)| entries)
                .collect(),
        }
    }
}

fn parse_catalogue(map: &Map<String, Value>) -> Option<ReputationPayload> {
    let records = map.get("reputation_records")?.as_array()?;
    let entries = records
        .iter()
        .filter_map(|record| {
            let title = record.get("title")?.as_str()?;
            let reputation = record.get("reputation").and_then(reputation_value)?;
            Some(ReputationEntry {
                key: normalize_title(title),
                reputation,
            })
        })
        .collect();
    Some(ReputationPayload::Catalogue(entries))
}

fn parse_owner_record(map: &Map<String, Value>) -> Option<ReputationPayload> {
    let categories: Vec<(String, Vec<ReputationEntry>)> = map
        .iter()
        .filter_map(|(name, list)| {
            let items = list.as_array()?;
            Some((name.clone(), parse_token_list(items)))
        })
        .collect();

    if categories.is_empty() {
        None
    } else {
        Some(ReputationPayload::OwnerRecord { categories })
    }
}

fn parse_token_list(items: &[Value]) -> Vec<ReputationEntry> {
    items.iter().filter_map(parse_token_entry).collect()
}

fn parse_token_entry(item: &Value) -> Option<ReputationEntry> {
    let key = match item.get("token_id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let reputation = item.get("reputation").and_then(reputation_value)?;
    Some(ReputationEntry { key, reputation })
}

/// Finite reputation from a JSON number or numeric string. `NaN` and
/// infinities are rejected so totals stay comparable and serializable.
fn reputation_value(value: &Value) -> Option<f64> {
    let reputation = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    reputation.is_finite().then_some(reputation)
}

pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    TokenId,
    Title,
}

/// Reputation lookup for one request
#[derive(Debug, Clone)]
pub struct ReputationMap {
    kind: KeyKind,
    entries: HashMap<String, f64>,
}

impl ReputationMap {
    pub fn empty(kind: KeyKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: String, reputation: f64) {
        self.entries.insert(key, reputation);
    }

    /// Key of a transfer under this map's keying scheme
    pub fn key_for(&self, record: &TransferRecord) -> Option<String> {
        match self.kind {
            KeyKind::TokenId => record.token_id.clone(),
            KeyKind::Title => record.title.as_deref().map(normalize_title),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).copied()
    }

    /// Reputation of a transfer, zero when it does not match
    pub fn reputation_of(&self, record: &TransferRecord) -> f64 {
        self.key_for(record)
            .and_then(|key| self.get(&key))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedReputation {
    pub map: ReputationMap,
    /// Token ids only found through single-token lookups
    pub fallback_token_ids: Vec<String>,
    pub raw_payloads: Vec<Value>,
}

impl ResolvedReputation {
    fn empty(kind: KeyKind) -> Self {
        Self {
            map: ReputationMap::empty(kind),
            fallback_token_ids: Vec::new(),
            raw_payloads: Vec::new(),
        }
    }
}

pub struct ReputationResolver {
    datasource: Arc<dyn DataSource>,
    required: bool,
    fallback_limit: usize,
}

impl ReputationResolver {
    pub fn new(datasource: Arc<dyn DataSource>, required: bool, fallback_limit: usize) -> Self {
        Self {
            datasource,
            required,
            fallback_limit,
        }
    }

    /// Bulk lookup failure: an error when reputation is required, otherwise
    /// logged and swallowed.
    fn absorb(&self, what: &str, err: AppError) -> AppResult<()> {
        if self.required {
            let message = match err {
                AppError::UpstreamError { status, .. } => format!("Reputation API {}", status),
                other => format!("Reputation API: {}", other),
            };
            return Err(AppError::InternalError(message));
        }
        tracing::warn!("{} lookup failed, continuing without reputation: {}", what, err);
        Ok(())
    }

    /// Global catalogue matched by item title
    pub async fn resolve_catalogue(&self) -> AppResult<ResolvedReputation> {
        let mut resolved = ResolvedReputation::empty(KeyKind::Title);

        let body = match self.datasource.get_reputation(&ReputationRequest::Catalogue).await {
            Ok(body) => body,
            Err(e) => {
                self.absorb("Catalogue", e)?;
                return Ok(resolved);
            }
        };

        match ReputationPayload::parse(&body) {
            Some(payload @ ReputationPayload::Catalogue(_)) => {
                for entry in payload.into_entries() {
                    resolved.map.insert(entry.key, entry.reputation);
                }
            }
            _ => tracing::warn!("Reputation catalogue has an unexpected shape"),
        }
        resolved.raw_payloads.push(body);

        tracing::info!("Loaded {} catalogue titles", resolved.map.len());
        Ok(resolved)
    }

    /// Owner record matched by token id, then single-token lookups for the
    /// observed ids the bulk record did not cover.
    pub async fn resolve_for_owner(
        &self,
        owner: &str,
        observed: &[String],
    ) -> AppResult<ResolvedReputation> {
        let mut resolved = ResolvedReputation::empty(KeyKind::TokenId);
        let wanted: HashSet<&str> = observed.iter().map(String::as_str).collect();

        let bulk = ReputationRequest::Owner {
            owner: owner.to_string(),
        };
        match self.datasource.get_reputation(&bulk).await {
            Ok(body) => {
                match ReputationPayload::parse(&body) {
                    Some(payload) if payload.key_kind() == KeyKind::TokenId => {
                        for entry in payload.into_entries() {
                            if wanted.contains(entry.key.as_str()) {
                                resolved.map.insert(entry.key, entry.reputation);
                            }
                        }
                    }
                    _ => tracing::warn!("Reputation record for {} has an unexpected shape", owner),
                }
                resolved.raw_payloads.push(body);
            }
            Err(e) => {
                // Upstream is down; single-token lookups would fail the same way.
                self.absorb("Owner reputation", e)?;
                return Ok(resolved);
            }
        }

        let missing: Vec<&String> = observed
            .iter()
            .filter(|id| !resolved.map.contains_key(id))
            .collect();
        if missing.len() > self.fallback_limit {
            tracing::warn!(
                "{} tokens lack reputation, looking up only the first {}",
                missing.len(),
                self.fallback_limit
            );
        }

        for token_id in missing.into_iter().take(self.fallback_limit) {
            let request = ReputationRequest::Token {
                owner: owner.to_string(),
                token_id: token_id.clone(),
            };
            let body = match self.datasource.get_reputation(&request).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("No reputation for token {}: {}", token_id, e);
                    continue;
                }
            };

            if let Some(payload) = ReputationPayload::parse(&body) {
                if payload.key_kind() == KeyKind::TokenId {
                    let found = payload
                        .into_entries()
                        .into_iter()
                        .find(|entry| &entry.key == token_id);
                    if let Some(entry) = found {
                        resolved.map.insert(entry.key, entry.reputation);
                        resolved.fallback_token_ids.push(token_id.clone());
                    }
                }
            }
            resolved.raw_payloads.push(body);
        }

        tracing::info!(
            "Resolved reputation for {} of {} tokens ({} via fallback)",
            resolved.map.len(),
            observed.len(),
            resolved.fallback_token_ids.len()
        );
        Ok(resolved)
    }
}
