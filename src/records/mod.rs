//! Game log records
//!
//! The service returns rich log rows; only a small projection of each row is
//! persisted. The projection's `bc_id` is the natural key used for dedup.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One row of a log page as sent by the service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGameLog {
    pub game_log: GameLog,
}

/// The log entry inside a [`RawGameLog`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLog {
    pub id: i64,
    #[serde(default)]
    pub sender_bc_id: Option<i64>,
    #[serde(default)]
    pub receiver_bc_id: Option<i64>,
    pub item_id: i64,
    pub date: LogDate,
    #[serde(default)]
    pub data: LogData,
}

/// Timestamp as the service sends it: epoch milliseconds or RFC 3339 text
///
/// Epoch values may carry a fraction, which is truncated toward zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LogDate {
    Millis(f64),
    Text(String),
}

/// Largest epoch millisecond value a date may hold (+/- 100 million days)
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

impl LogDate {
    /// Converts to UTC; `None` for out-of-range or unparseable values
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            LogDate::Millis(ms) if ms.is_finite() && ms.abs() <= MAX_EPOCH_MILLIS => {
                Utc.timestamp_millis_opt(ms.trunc() as i64).single()
            }
            LogDate::Millis(_) => None,
            LogDate::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|date| date.with_timezone(&Utc)),
        }
    }
}

/// Trade details of a log entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogData {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub listing_price: Option<f64>,
}

/// Persisted projection of a game log
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedGameLog {
    /// Upstream log id, unique across the service
    pub bc_id: i64,
    pub sender_bc_id: Option<i64>,
    pub recipient_bc_id: Option<i64>,
    pub item_id: i64,
    pub date: DateTime<Utc>,
    pub amount: Option<f64>,
    pub price: f64,
}

/// Why a raw row was not turned into a [`TrimmedGameLog`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// The row does not have the expected shape
    #[error("malformed row: {0}")]
    Malformed(String),

    /// The row carries no listing price (not a market trade)
    #[error("no listing price")]
    NoPrice,

    /// The row's date could not be interpreted
    #[error("unreadable date")]
    BadDate,
}

/// Trims a raw row to its persisted projection
///
/// Rows that fail to decode or carry no price are skipped, never fatal.
pub fn trim_game_log(raw: &Value) -> Result<TrimmedGameLog, SkipReason> {
    let RawGameLog { game_log } = RawGameLog::deserialize(raw)
        .map_err(|e| SkipReason::Malformed(e.to_string()))?;

    let price = game_log.data.listing_price.ok_or(SkipReason::NoPrice)?;
    let date = game_log.date.to_utc().ok_or(SkipReason::BadDate)?;

    Ok(TrimmedGameLog {
        bc_id: game_log.id,
        sender_bc_id: game_log.sender_bc_id,
        recipient_bc_id: game_log.receiver_bc_id,
        item_id: game_log.item_id,
        date,
        amount: game_log.data.amount,
        price,
    })
}
