//! Time-aligned funding-rate differential between two exchanges.
//!
//! For one `(symbol, exchange_a, exchange_b)` the engine emits exactly one
//! [`Differential`] per hour of the requested range, whether or not either
//! exchange observed that hour. Per-hour resolution:
//!
//! | rate_a | rate_b | diff          |
//! |--------|--------|---------------|
//! | a      | b      | a - b         |
//! | a      | null   | a             |
//! | null   | b      | -b            |
//! | null   | null   | null          |
//!
//! A missing leg counts as no funding cost from that exchange. Only a
//! double absence is unknown. Storage adapters may coerce a null `diff` to
//! `0.0`; the in-memory value stays `None`.

use crate::domain::hour::HourRange;
use crate::domain::observation::Observation;
use crate::domain::trading_pair::{ExchangePair, TradingPair};
use chrono::NaiveDateTime;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Differential {
    pub timestamp_hour: NaiveDateTime,
    pub symbol: String,
    pub exchange_a: String,
    pub exchange_b: String,
    pub rate_a: Option<f64>,
    pub rate_b: Option<f64>,
    pub diff: Option<f64>,
}

impl Differential {
    pub fn new(
        timestamp_hour: NaiveDateTime,
        symbol: &str,
        pair: &ExchangePair,
        rate_a: Option<f64>,
        rate_b: Option<f64>,
    ) -> Self {
        Self {
            timestamp_hour,
            symbol: symbol.to_string(),
            exchange_a: pair.exchange_a().to_string(),
            exchange_b: pair.exchange_b().to_string(),
            rate_a,
            rate_b,
            diff: resolve_diff(rate_a, rate_b),
        }
    }

    pub fn trading_pair_key(&self) -> String {
        format!("{}_{}_{}", self.symbol, self.exchange_a, self.exchange_b)
    }

    pub fn trading_pair(&self) -> Option<TradingPair> {
        ExchangePair::new(&self.exchange_a, &self.exchange_b)
            .map(|pair| TradingPair::new(self.symbol.clone(), pair))
    }

    /// Neither exchange reported a rate for this hour.
    pub fn is_gap(&self) -> bool {
        self.rate_a.is_none() && self.rate_b.is_none()
    }
}

pub fn resolve_diff(rate_a: Option<f64>, rate_b: Option<f64>) -> Option<f64> {
    match (rate_a, rate_b) {
        (Some(a), Some(b)) => Some(a - b),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(-b),
        (None, None) => None,
    }
}

/// Earliest and latest observed hour for `symbol` on either exchange of
/// `pair`. Observations with a null rate still count as observed.
pub fn observed_extent(
    symbol: &str,
    pair: &ExchangePair,
    observations: &[Observation],
) -> Option<HourRange> {
    let mut hours = observations
        .iter()
        .filter(|o| o.symbol == symbol && pair.exchanges().contains(&o.exchange.as_str()))
        .map(|o| o.timestamp_hour);
    let first = hours.next()?;
    let (min, max) = hours.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
    HourRange::new(min, max)
}

/// Differentials for every hour of `range`. Observations for other symbols,
/// other exchanges or outside `range` are ignored. When an exchange reports
/// the same hour twice, the first non-null rate wins.
pub fn compute_differentials(
    symbol: &str,
    pair: &ExchangePair,
    observations: &[Observation],
    range: HourRange,
) -> Vec<Differential> {
    let mut rates_a: HashMap<NaiveDateTime, Option<f64>> = HashMap::new();
    let mut rates_b: HashMap<NaiveDateTime, Option<f64>> = HashMap::new();

    for obs in observations {
        if obs.symbol != symbol || !range.contains(obs.timestamp_hour) {
            continue;
        }
        let target = if obs.exchange == pair.exchange_a() {
            &mut rates_a
        } else if obs.exchange == pair.exchange_b() {
            &mut rates_b
        } else {
            continue;
        };
        let slot = target.entry(obs.timestamp_hour).or_insert(None);
        if slot.is_none() {
            *slot = obs.rate;
        }
    }

    if rates_a.is_empty() || rates_b.is_empty() {
        let missing = if rates_a.is_empty() {
            pair.exchange_a()
        } else {
            pair.exchange_b()
        };
        log::warn!("{symbol}: no {missing} observations in {range}, differential is one-sided");
    }

    let rows: Vec<Differential> = range
        .hours()
        .map(|hour| {
            let rate_a = rates_a.get(&hour).copied().flatten();
            let rate_b = rates_b.get(&hour).copied().flatten();
            Differential::new(hour, symbol, pair, rate_a, rate_b)
        })
        .collect();

    let gaps = rows.iter().filter(|d| d.diff.is_none()).count();
    log::debug!(
        "{symbol} {pair}: {} hourly rows over {range}, {gaps} without any rate",
        rows.len()
    );

    rows
}

/// Differentials over the observed extent of `observations`.
pub fn differentials_for_observations(
    symbol: &str,
    pair: &ExchangePair,
    observations: &[Observation],
) -> Vec<Differential> {
    match observed_extent(symbol, pair, observations) {
        Some(range) => compute_differentials(symbol, pair, observations, range),
        None => Vec::new(),
    }
}
