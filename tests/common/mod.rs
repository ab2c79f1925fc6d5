#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use fundingarb::domain::differential::Differential;
use fundingarb::domain::error::FundingArbError;
use fundingarb::domain::hour::{parse_timestamp, HourRange};
pub use fundingarb::domain::observation::Observation;
use fundingarb::domain::ranking::StrategyRankingRecord;
use fundingarb::domain::returns::ReturnMetric;
use fundingarb::domain::trading_pair::{ExchangePair, TradingPair};
use fundingarb::ports::differential_port::DifferentialStore;
use fundingarb::ports::observation_port::ObservationStore;
use fundingarb::ports::ranking_port::RankingStore;
use fundingarb::ports::return_metric_port::ReturnMetricStore;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

type DiffKey = (String, String, String, NaiveDateTime);

/// In-memory implementation of every store port.
#[derive(Default)]
pub struct MockStore {
    pub observations: Mutex<BTreeMap<(String, String, NaiveDateTime), Observation>>,
    pub differentials: Mutex<BTreeMap<DiffKey, Differential>>,
    pub metrics: Mutex<BTreeMap<(String, NaiveDate), ReturnMetric>>,
    pub rankings: Mutex<BTreeMap<(String, NaiveDate, String), StrategyRankingRecord>>,
    /// Every store call fails with this reason when set.
    pub failure: Option<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn with_observations(self, observations: &[Observation]) -> Self {
        self.upsert_observations(observations).unwrap();
        self
    }

    pub fn diff_count(&self) -> usize {
        self.differentials.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), FundingArbError> {
        match &self.failure {
            Some(reason) => Err(FundingArbError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn extent(hours: impl Iterator<Item = NaiveDateTime>) -> Option<HourRange> {
    let mut hours = hours.peekable();
    let first = *hours.peek()?;
    let (lo, hi) = hours.fold((first, first), |(lo, hi), h| (lo.min(h), hi.max(h)));
    HourRange::new(lo, hi)
}

impl ObservationStore for MockStore {
    fn get_observations(
        &self,
        symbol: &str,
        exchange: &str,
        range: HourRange,
    ) -> Result<Vec<Observation>, FundingArbError> {
        self.check()?;
        Ok(self
            .observations
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.symbol == symbol && o.exchange == exchange && range.contains(o.timestamp_hour))
            .cloned()
            .collect())
    }

    fn upsert_observations(&self, observations: &[Observation]) -> Result<usize, FundingArbError> {
        self.check()?;
        let mut map = self.observations.lock().unwrap();
        for o in observations {
            map.insert((o.symbol.clone(), o.exchange.clone(), o.timestamp_hour), o.clone());
        }
        Ok(observations.len())
    }

    fn observation_extent(
        &self,
        symbol: &str,
        exchange: &str,
    ) -> Result<Option<HourRange>, FundingArbError> {
        self.check()?;
        let map = self.observations.lock().unwrap();
        Ok(extent(
            map.values()
                .filter(|o| o.symbol == symbol && o.exchange == exchange)
                .map(|o| o.timestamp_hour),
        ))
    }

    fn list_symbols(&self) -> Result<Vec<String>, FundingArbError> {
        self.check()?;
        let mut symbols: Vec<String> = self.observations.lock().unwrap().keys().map(|k| k.0.clone()).collect();
        symbols.dedup();
        Ok(symbols)
    }

    fn list_exchanges(&self) -> Result<Vec<String>, FundingArbError> {
        self.check()?;
        let mut exchanges: Vec<String> = self.observations.lock().unwrap().keys().map(|k| k.1.clone()).collect();
        exchanges.sort();
        exchanges.dedup();
        Ok(exchanges)
    }
}

impl DifferentialStore for MockStore {
    fn upsert_differentials(&self, rows: &[Differential]) -> Result<usize, FundingArbError> {
        self.check()?;
        let mut map = self.differentials.lock().unwrap();
        for d in rows {
            let key = (d.symbol.clone(), d.exchange_a.clone(), d.exchange_b.clone(), d.timestamp_hour);
            map.insert(key, d.clone());
        }
        Ok(rows.len())
    }

    fn get_differential_extent(
        &self,
        symbol: &str,
        exchange_a: &str,
        exchange_b: &str,
    ) -> Result<Option<HourRange>, FundingArbError> {
        self.check()?;
        let map = self.differentials.lock().unwrap();
        Ok(extent(
            map.values()
                .filter(|d| d.symbol == symbol && d.exchange_a == exchange_a && d.exchange_b == exchange_b)
                .map(|d| d.timestamp_hour),
        ))
    }

    fn get_differentials(
        &self,
        pair: &TradingPair,
        range: Option<HourRange>,
    ) -> Result<Vec<Differential>, FundingArbError> {
        self.check()?;
        let map = self.differentials.lock().unwrap();
        Ok(map
            .values()
            .filter(|d| {
                d.symbol == pair.symbol
                    && d.exchange_a == pair.exchanges.exchange_a()
                    && d.exchange_b == pair.exchanges.exchange_b()
                    && range.is_none_or(|r| r.contains(d.timestamp_hour))
            })
            .cloned()
            .collect())
    }

    fn list_trading_pairs(&self) -> Result<Vec<TradingPair>, FundingArbError> {
        self.check()?;
        let mut pairs: Vec<TradingPair> = self
            .differentials
            .lock()
            .unwrap()
            .values()
            .filter_map(|d| d.trading_pair())
            .collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }
}

impl ReturnMetricStore for MockStore {
    fn upsert_return_metrics(&self, metrics: &[ReturnMetric]) -> Result<usize, FundingArbError> {
        self.check()?;
        let mut map = self.metrics.lock().unwrap();
        for m in metrics {
            map.insert((m.trading_pair.clone(), m.date), m.clone());
        }
        Ok(metrics.len())
    }

    fn get_return_metrics(
        &self,
        trading_pair: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ReturnMetric>, FundingArbError> {
        self.check()?;
        let mut out: Vec<ReturnMetric> = self
            .metrics
            .lock()
            .unwrap()
            .values()
            .filter(|m| trading_pair.is_none_or(|p| m.trading_pair == p) && m.date >= start && m.date <= end)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.trading_pair.cmp(&b.trading_pair)));
        Ok(out)
    }

    fn latest_metric_date(&self, trading_pair: &str) -> Result<Option<NaiveDate>, FundingArbError> {
        self.check()?;
        Ok(self
            .metrics
            .lock()
            .unwrap()
            .keys()
            .filter(|(p, _)| p == trading_pair)
            .map(|(_, d)| *d)
            .max())
    }
}

impl RankingStore for MockStore {
    fn upsert_ranking(
        &self,
        strategy_name: &str,
        records: &[StrategyRankingRecord],
    ) -> Result<usize, FundingArbError> {
        self.check()?;
        if let Some(foreign) = records.iter().find(|r| r.strategy_name != strategy_name) {
            return Err(FundingArbError::StrategyInvalid {
                strategy: strategy_name.to_string(),
                reason: format!("record belongs to {}", foreign.strategy_name),
            });
        }
        let mut map = self.rankings.lock().unwrap();
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        map.retain(|(name, d, _), _| name != strategy_name || !dates.contains(d));
        for r in records {
            map.insert((r.strategy_name.clone(), r.date, r.trading_pair.clone()), r.clone());
        }
        Ok(records.len())
    }

    fn get_rankings(
        &self,
        strategy_name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StrategyRankingRecord>, FundingArbError> {
        self.check()?;
        let mut out: Vec<StrategyRankingRecord> = self
            .rankings
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.strategy_name == strategy_name && r.date >= start && r.date <= end)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.date, r.rank_position));
        Ok(out)
    }

    fn clear_ranking(&self, strategy_name: &str, date: NaiveDate) -> Result<usize, FundingArbError> {
        self.check()?;
        let mut map = self.rankings.lock().unwrap();
        let before = map.len();
        map.retain(|(name, d, _), _| name != strategy_name || *d != date);
        Ok(before - map.len())
    }

    fn ranked_strategies(&self) -> Result<Vec<String>, FundingArbError> {
        self.check()?;
        let mut names: Vec<String> = self.rankings.lock().unwrap().keys().map(|k| k.0.clone()).collect();
        names.dedup();
        Ok(names)
    }
}

pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn obs(timestamp: &str, symbol: &str, exchange: &str, rate: Option<f64>) -> Observation {
    Observation::new(ts(timestamp), symbol, exchange, rate)
}

pub fn binance_bybit() -> ExchangePair {
    ExchangePair::new("binance", "bybit").unwrap()
}

/// One observation per exchange every 8 hours for `days` days starting
/// 2025-01-01. Binance pays `rate_a`, bybit pays `rate_b`.
pub fn steady_observations(symbol: &str, days: u32, rate_a: f64, rate_b: f64) -> Vec<Observation> {
    let start = date("2025-01-01");
    let mut out = Vec::new();
    for d in 0..days {
        let day = start + chrono::Duration::days(i64::from(d));
        for hour in [0, 8, 16] {
            let t = day.and_hms_opt(hour, 0, 0).unwrap();
            out.push(Observation::new(t, symbol, "binance", Some(rate_a)));
            out.push(Observation::new(t, symbol, "bybit", Some(rate_b)));
        }
    }
    out
}

pub fn write_temp_file(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
