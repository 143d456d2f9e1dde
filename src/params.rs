use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::transfers::TimeRange;

/// Raw query string of the leaderboard routes. Everything is kept as text so
/// that malformed numbers fall back to defaults instead of rejecting the call.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub wallet_id: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub debug: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardParams {
    pub wallet_id: String,
    pub limit: u32,
    pub skip: u64,
    pub range: TimeRange,
    pub debug: bool,
}

impl LeaderboardParams {
    pub fn resolve(query: LeaderboardQuery, config: &Config) -> AppResult<Self> {
        let wallet_id = require_wallet(query.wallet_id)?;

        Ok(Self {
            wallet_id,
            limit: parse_limit(query.limit.as_deref(), config.default_limit),
            skip: parse_skip(query.skip.as_deref(), config.default_skip),
            range: TimeRange {
                start: query.start_time.as_deref().and_then(parse_time_nanos),
                end: query.end_time.as_deref().and_then(parse_time_nanos),
            },
            debug: parse_flag(query.debug.as_deref()),
        })
    }
}

pub fn require_wallet(wallet_id: Option<String>) -> AppResult<String> {
    wallet_id
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .ok_or_else(|| AppError::ValidationError("Parameter wallet_id is required".to_string()))
}

/// Zero or unparsable limits fall back to the default.
pub fn parse_limit(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(default)
}

pub fn parse_skip(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

/// Converts an ISO-8601 timestamp into nanoseconds since the epoch with
/// millisecond precision. Naive timestamps are read as UTC.
pub fn parse_time_nanos(raw: &str) -> Option<i128> {
    let raw = raw.trim();

    let millis = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.timestamp_millis()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc().timestamp_millis()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis()
    } else {
        return None;
    };

    Some(i128::from(millis) * 1_000_000)
}
