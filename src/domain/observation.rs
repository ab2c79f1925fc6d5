//! Raw hourly funding-rate observations.

use crate::domain::error::MalformedValue;
use crate::domain::hour::floor_to_hour;
use chrono::NaiveDateTime;

/// One funding-rate sample for `(timestamp_hour, symbol, exchange)`.
/// `rate` is `None` when the exchange reported nothing for that hour.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp_hour: NaiveDateTime,
    pub symbol: String,
    pub exchange: String,
    pub rate: Option<f64>,
}

impl Observation {
    /// Timestamp is floored to its hour; non-finite rates become `None`.
    pub fn new(
        timestamp: NaiveDateTime,
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        rate: Option<f64>,
    ) -> Self {
        Self {
            timestamp_hour: floor_to_hour(timestamp),
            symbol: symbol.into(),
            exchange: exchange.into(),
            rate: rate.filter(|r| r.is_finite()),
        }
    }

    /// Build from an unparsed rate. A malformed rate is logged and stored
    /// as absent; the observation itself is always produced.
    pub fn from_raw(
        timestamp: NaiveDateTime,
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        raw_rate: Option<&str>,
    ) -> Self {
        let symbol = symbol.into();
        let exchange = exchange.into();
        let rate = match raw_rate.map(parse_rate).transpose() {
            Ok(rate) => rate.flatten(),
            Err(e) => {
                log::warn!("{symbol}@{exchange} {timestamp}: {e}, treating as null");
                None
            }
        };
        Self::new(timestamp, symbol, exchange, rate)
    }
}

/// Parse a raw rate string. Empty strings and the usual null spellings are
/// an absent rate, not an error.
pub fn parse_rate(raw: &str) -> Result<Option<f64>, MalformedValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "null" | "none" | "nan" | "na" => return Ok(None),
        _ => {}
    }
    let value: f64 = trimmed.parse().map_err(|e: std::num::ParseFloatError| MalformedValue {
        raw: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !value.is_finite() {
        return Err(MalformedValue {
            raw: raw.to_string(),
            reason: "rate is not finite".to_string(),
        });
    }
    Ok(Some(value))
}
