use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

use crate::datasource::{AssetKind, DataSource, TransferPageRequest};
use crate::error::AppResult;

/// A single incoming transfer as reported by the history API
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub sender_id: String,
    pub token_id: Option<String>,
    pub title: Option<String>,
    pub timestamp_nanosec: Option<i128>,
}

impl TransferRecord {
    /// Reads a record from either the NFT or the FT history shape. Records
    /// without a sender cannot be attributed and are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let sender_id = string_field(value, "sender_id")
            .or_else(|| string_field(value, "from"))
            .filter(|s| !s.is_empty())?;

        let args = value.get("args");
        let token_id = string_field(value, "token_id")
            .or_else(|| args.and_then(|a| string_field(a, "token_id")));
        let title = string_field(value, "title")
            .or_else(|| args.and_then(|a| string_field(a, "title")));
        let timestamp_nanosec = value.get("timestamp_nanosec").and_then(nanos_value);

        Some(Self {
            sender_id,
            token_id,
            title,
            timestamp_nanosec,
        })
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn nanos_value(value: &Value) -> Option<i128> {
    match value {
        Value::String(s) => s.trim().parse::<i128>().ok(),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().map(|f| f as i128)),
        _ => None,
    }
}

/// Returns the record list of a history page, whichever key the API used.
pub fn page_records(body: &Value) -> Option<&Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("nft_transfers")
            .or_else(|| map.get("transfers"))
            .and_then(Value::as_array),
        _ => None,
    }
}

/// Inclusive `[start, end]` window in nanoseconds. A missing side is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<i128>,
    pub end: Option<i128>,
}

impl TimeRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, timestamp: Option<i128>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(ts) = timestamp else {
            return false;
        };
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts <= end)
    }
}

#[derive(Debug, Clone)]
pub struct TransferQuery {
    pub kind: AssetKind,
    pub wallet_id: String,
    pub limit: u32,
    pub skip: u64,
    pub range: TimeRange,
}

/// A fetched page after time filtering. `raw_len` is the unfiltered size
/// and drives the end-of-data check.
#[derive(Debug, Clone)]
pub struct TransferPage {
    pub raw_len: usize,
    pub records: Vec<TransferRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchedTransfers {
    pub pages: usize,
    pub raw_count: usize,
    pub records: Vec<TransferRecord>,
}

#[derive(Debug, Clone, Copy)]
struct PageCursor {
    skip: u64,
    pages: usize,
    done: bool,
}

pub struct TransferFetcher {
    datasource: Arc<dyn DataSource>,
    max_pages: usize,
}

impl TransferFetcher {
    pub fn new(datasource: Arc<dyn DataSource>, max_pages: usize) -> Self {
        Self {
            datasource,
            max_pages,
        }
    }

    /// Single upstream page, errors included. Used by the pass-through routes.
    pub async fn fetch_page_raw(&self, request: &TransferPageRequest) -> AppResult<Value> {
        self.datasource.get_transfers(request).await
    }

    /// Lazily walks the history with `skip += limit` until the upstream
    /// fails, returns an empty or short page, or the page cap is hit.
    pub fn pages(&self, query: TransferQuery) -> impl Stream<Item = TransferPage> + Send {
        let datasource = Arc::clone(&self.datasource);
        let max_pages = self.max_pages;
        let limit = query.limit.max(1);
        let start = PageCursor {
            skip: query.skip,
            pages: 0,
            done: false,
        };

        stream::unfold(start, move |cursor| {
            let datasource = Arc::clone(&datasource);
            let query = query.clone();
            async move {
                if cursor.done {
                    return None;
                }
                if cursor.pages >= max_pages {
                    tracing::warn!(
                        "Stopping pagination for {} after {} pages",
                        query.wallet_id,
                        cursor.pages
                    );
                    return None;
                }

                let request = TransferPageRequest {
                    kind: query.kind.clone(),
                    wallet_id: query.wallet_id.clone(),
                    limit,
                    skip: cursor.skip,
                };

                let body = match datasource.get_transfers(&request).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(
                            "Transfer page at skip={} failed, truncating: {}",
                            cursor.skip,
                            e
                        );
                        return None;
                    }
                };

                let Some(raw) = page_records(&body) else {
                    tracing::warn!("Transfer page at skip={} has no record list", cursor.skip);
                    return None;
                };
                if raw.is_empty() {
                    return None;
                }

                let raw_len = raw.len();
                let records = raw
                    .iter()
                    .filter_map(TransferRecord::from_value)
                    .filter(|record| query.range.contains(record.timestamp_nanosec))
                    .collect();

                let page = TransferPage { raw_len, records };

                // An offset past u64::MAX cannot be requested; stop there.
                let next_skip = cursor.skip.checked_add(u64::from(limit));
                let next = PageCursor {
                    skip: next_skip.unwrap_or(cursor.skip),
                    pages: cursor.pages + 1,
                    done: raw_len < limit as usize || next_skip.is_none(),
                };
                Some((page, next))
            }
        })
    }

    /// Collects every page into one filtered transfer set
    pub async fn fetch_all(&self, query: TransferQuery) -> FetchedTransfers {
        tracing::info!("Fetching transfers for wallet: {}", query.wallet_id);

        let pages: Vec<TransferPage> = self.pages(query).collect().await;

        let mut fetched = FetchedTransfers::default();
        for page in pages {
            fetched.pages += 1;
            fetched.raw_count += page.raw_len;
            fetched.records.extend(page.records);
        }

        tracing::info!(
            "Fetched {} transfers over {} pages, {} kept",
            fetched.raw_count,
            fetched.pages,
            fetched.records.len()
        );
        fetched
    }
}
