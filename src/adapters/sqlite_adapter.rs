//! SQLite storage adapter. One database backs every store.
//!
//! `funding_rate_diff.diff_ab` is `NOT NULL`: an hour where neither exchange
//! reported is written as `0.0` with both rate columns null, and read back
//! as a null `diff`. Stored diffs are rounded to 8 decimal places.

use crate::domain::differential::Differential;
use crate::domain::error::FundingArbError;
use crate::domain::hour::{format_timestamp, HourRange, TIMESTAMP_FORMAT};
use crate::domain::observation::Observation;
use crate::domain::ranking::StrategyRankingRecord;
use crate::domain::returns::ReturnMetric;
use crate::domain::trading_pair::{ExchangePair, TradingPair};
use crate::ports::config_port::ConfigPort;
use crate::ports::differential_port::DifferentialStore;
use crate::ports::observation_port::ObservationStore;
use crate::ports::ranking_port::RankingStore;
use crate::ports::return_metric_port::ReturnMetricStore;
use chrono::{NaiveDate, NaiveDateTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::{BTreeMap, BTreeSet};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DIFF_DECIMALS: f64 = 1e8;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS funding_rate_history (
    timestamp_utc TEXT NOT NULL,
    symbol TEXT NOT NULL,
    exchange TEXT NOT NULL,
    funding_rate REAL,
    PRIMARY KEY (timestamp_utc, symbol, exchange)
);
CREATE INDEX IF NOT EXISTS idx_frh_symbol_exchange
    ON funding_rate_history(symbol, exchange, timestamp_utc);

CREATE TABLE IF NOT EXISTS funding_rate_diff (
    timestamp_utc TEXT NOT NULL,
    symbol TEXT NOT NULL,
    exchange_a TEXT NOT NULL,
    funding_rate_a REAL,
    exchange_b TEXT NOT NULL,
    funding_rate_b REAL,
    diff_ab REAL NOT NULL,
    UNIQUE (timestamp_utc, symbol, exchange_a, exchange_b)
);
CREATE INDEX IF NOT EXISTS idx_frd_pair
    ON funding_rate_diff(symbol, exchange_a, exchange_b, timestamp_utc);

CREATE TABLE IF NOT EXISTS return_metrics (
    trading_pair TEXT NOT NULL,
    date TEXT NOT NULL,
    history_days INTEGER NOT NULL DEFAULT 0,
    return_1d REAL NOT NULL, roi_1d REAL NOT NULL,
    return_2d REAL NOT NULL, roi_2d REAL NOT NULL,
    return_7d REAL NOT NULL, roi_7d REAL NOT NULL,
    return_14d REAL NOT NULL, roi_14d REAL NOT NULL,
    return_30d REAL NOT NULL, roi_30d REAL NOT NULL,
    return_all REAL NOT NULL, roi_all REAL NOT NULL,
    UNIQUE (trading_pair, date)
);
CREATE INDEX IF NOT EXISTS idx_rm_date ON return_metrics(date);

CREATE TABLE IF NOT EXISTS strategy_ranking (
    strategy_name TEXT NOT NULL,
    trading_pair TEXT NOT NULL,
    date TEXT NOT NULL,
    final_ranking_score REAL NOT NULL,
    rank_position INTEGER NOT NULL,
    component_scores TEXT NOT NULL,
    final_combination_value TEXT NOT NULL,
    UNIQUE (strategy_name, trading_pair, date)
);
CREATE INDEX IF NOT EXISTS idx_sr_strategy_date ON strategy_ranking(strategy_name, date);
";

fn pool_err(e: r2d2::Error) -> FundingArbError {
    FundingArbError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> FundingArbError {
    FundingArbError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_hour(raw: &str, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn parse_date(raw: &str, idx: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn hour_range(min: Option<String>, max: Option<String>) -> Result<Option<HourRange>, FundingArbError> {
    let (Some(min), Some(max)) = (min, max) else {
        return Ok(None);
    };
    let start = parse_hour(&min, 0).map_err(query_err)?;
    let end = parse_hour(&max, 1).map_err(query_err)?;
    Ok(HourRange::new(start, end))
}

/// Value written to `diff_ab`.
pub fn stored_diff(diff: Option<f64>) -> f64 {
    diff.map(|d| (d * DIFF_DECIMALS).round() / DIFF_DECIMALS)
        .unwrap_or(0.0)
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, FundingArbError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(query_err)?);
    }
    Ok(out)
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundingArbError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| FundingArbError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        log::debug!("opened {db_path} (pool size {pool_size})");
        Ok(adapter)
    }

    /// Single-connection in-memory database with the schema in place.
    pub fn in_memory() -> Result<Self, FundingArbError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn initialize_schema(&self) -> Result<(), FundingArbError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FundingArbError> {
        self.pool.get().map_err(pool_err)
    }

    /// Row counts per table.
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>, FundingArbError> {
        let conn = self.conn()?;
        let tables = [
            "funding_rate_history",
            "funding_rate_diff",
            "return_metrics",
            "strategy_ranking",
        ];
        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(query_err)?;
            counts.push((table, n));
        }
        Ok(counts)
    }
}

impl ObservationStore for SqliteAdapter {
    fn get_observations(
        &self,
        symbol: &str,
        exchange: &str,
        range: HourRange,
    ) -> Result<Vec<Observation>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp_utc, funding_rate FROM funding_rate_history
                 WHERE symbol = ?1 AND exchange = ?2
                   AND timestamp_utc >= ?3 AND timestamp_utc <= ?4
                 ORDER BY timestamp_utc ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    symbol,
                    exchange,
                    format_timestamp(range.start()),
                    format_timestamp(range.end())
                ],
                |row| {
                    let ts: String = row.get(0)?;
                    let rate: Option<f64> = row.get(1)?;
                    Ok(Observation::new(parse_hour(&ts, 0)?, symbol, exchange, rate))
                },
            )
            .map_err(query_err)?;

        collect_rows(rows)
    }

    fn upsert_observations(&self, observations: &[Observation]) -> Result<usize, FundingArbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO funding_rate_history
                     (timestamp_utc, symbol, exchange, funding_rate)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(query_err)?;
            for obs in observations {
                stmt.execute(params![
                    format_timestamp(obs.timestamp_hour),
                    obs.symbol,
                    obs.exchange,
                    obs.rate
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(observations.len())
    }

    fn observation_extent(
        &self,
        symbol: &str,
        exchange: &str,
    ) -> Result<Option<HourRange>, FundingArbError> {
        let (min, max): (Option<String>, Option<String>) = self
            .conn()?
            .query_row(
                "SELECT MIN(timestamp_utc), MAX(timestamp_utc) FROM funding_rate_history
                 WHERE symbol = ?1 AND exchange = ?2",
                params![symbol, exchange],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(query_err)?;
        hour_range(min, max)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM funding_rate_history ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        collect_rows(rows)
    }

    fn list_exchanges(&self) -> Result<Vec<String>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT exchange FROM funding_rate_history ORDER BY exchange")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        collect_rows(rows)
    }
}

impl DifferentialStore for SqliteAdapter {
    fn upsert_differentials(&self, rows: &[Differential]) -> Result<usize, FundingArbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO funding_rate_diff
                     (timestamp_utc, symbol, exchange_a, funding_rate_a, exchange_b, funding_rate_b, diff_ab)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;
            for d in rows {
                stmt.execute(params![
                    format_timestamp(d.timestamp_hour),
                    d.symbol,
                    d.exchange_a,
                    d.rate_a,
                    d.exchange_b,
                    d.rate_b,
                    stored_diff(d.diff)
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(rows.len())
    }

    fn get_differential_extent(
        &self,
        symbol: &str,
        exchange_a: &str,
        exchange_b: &str,
    ) -> Result<Option<HourRange>, FundingArbError> {
        let (min, max): (Option<String>, Option<String>) = self
            .conn()?
            .query_row(
                "SELECT MIN(timestamp_utc), MAX(timestamp_utc) FROM funding_rate_diff
                 WHERE symbol = ?1 AND exchange_a = ?2 AND exchange_b = ?3",
                params![symbol, exchange_a, exchange_b],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(query_err)?;
        hour_range(min, max)
    }

    fn get_differentials(
        &self,
        pair: &TradingPair,
        range: Option<HourRange>,
    ) -> Result<Vec<Differential>, FundingArbError> {
        let (start, end) = match range {
            Some(r) => (format_timestamp(r.start()), format_timestamp(r.end())),
            None => (String::new(), "9999".to_string()),
        };
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp_utc, funding_rate_a, funding_rate_b, diff_ab
                 FROM funding_rate_diff
                 WHERE symbol = ?1 AND exchange_a = ?2 AND exchange_b = ?3
                   AND timestamp_utc >= ?4 AND timestamp_utc <= ?5
                 ORDER BY timestamp_utc ASC",
            )
            .map_err(query_err)?;

        let exchanges = &pair.exchanges;
        let rows = stmt
            .query_map(
                params![
                    pair.symbol,
                    exchanges.exchange_a(),
                    exchanges.exchange_b(),
                    start,
                    end
                ],
                |row| {
                    let ts: String = row.get(0)?;
                    let rate_a: Option<f64> = row.get(1)?;
                    let rate_b: Option<f64> = row.get(2)?;
                    let stored: f64 = row.get(3)?;
                    let mut d = Differential::new(parse_hour(&ts, 0)?, &pair.symbol, exchanges, rate_a, rate_b);
                    if !d.is_gap() {
                        d.diff = Some(stored);
                    }
                    Ok(d)
                },
            )
            .map_err(query_err)?;

        collect_rows(rows)
    }

    fn list_trading_pairs(&self) -> Result<Vec<TradingPair>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT symbol, exchange_a, exchange_b FROM funding_rate_diff
                 ORDER BY symbol, exchange_a, exchange_b",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(query_err)?;

        let mut pairs = Vec::new();
        for (symbol, a, b) in collect_rows(rows)? {
            match ExchangePair::new(&a, &b) {
                Some(exchanges) => pairs.push(TradingPair::new(symbol, exchanges)),
                None => log::warn!("ignoring differential rows for {symbol} with {a} on both legs"),
            }
        }
        Ok(pairs)
    }
}

impl ReturnMetricStore for SqliteAdapter {
    fn upsert_return_metrics(&self, metrics: &[ReturnMetric]) -> Result<usize, FundingArbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO return_metrics
                     (trading_pair, date, history_days,
                      return_1d, roi_1d, return_2d, roi_2d, return_7d, roi_7d,
                      return_14d, roi_14d, return_30d, roi_30d, return_all, roi_all)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                )
                .map_err(query_err)?;
            for m in metrics {
                stmt.execute(params![
                    m.trading_pair,
                    m.date.format(DATE_FORMAT).to_string(),
                    m.history_days,
                    m.return_1d,
                    m.roi_1d,
                    m.return_2d,
                    m.roi_2d,
                    m.return_7d,
                    m.roi_7d,
                    m.return_14d,
                    m.roi_14d,
                    m.return_30d,
                    m.roi_30d,
                    m.return_all,
                    m.roi_all
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(metrics.len())
    }

    fn get_return_metrics(
        &self,
        trading_pair: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ReturnMetric>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT trading_pair, date, history_days,
                        return_1d, roi_1d, return_2d, roi_2d, return_7d, roi_7d,
                        return_14d, roi_14d, return_30d, roi_30d, return_all, roi_all
                 FROM return_metrics
                 WHERE (?1 IS NULL OR trading_pair = ?1) AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC, trading_pair ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    trading_pair,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    let date: String = row.get(1)?;
                    Ok(ReturnMetric {
                        trading_pair: row.get(0)?,
                        date: parse_date(&date, 1)?,
                        history_days: row.get(2)?,
                        return_1d: row.get(3)?,
                        roi_1d: row.get(4)?,
                        return_2d: row.get(5)?,
                        roi_2d: row.get(6)?,
                        return_7d: row.get(7)?,
                        roi_7d: row.get(8)?,
                        return_14d: row.get(9)?,
                        roi_14d: row.get(10)?,
                        return_30d: row.get(11)?,
                        roi_30d: row.get(12)?,
                        return_all: row.get(13)?,
                        roi_all: row.get(14)?,
                    })
                },
            )
            .map_err(query_err)?;

        collect_rows(rows)
    }

    fn latest_metric_date(&self, trading_pair: &str) -> Result<Option<NaiveDate>, FundingArbError> {
        let latest: Option<String> = self
            .conn()?
            .query_row(
                "SELECT MAX(date) FROM return_metrics WHERE trading_pair = ?1",
                params![trading_pair],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        latest
            .map(|d| parse_date(&d, 0).map_err(query_err))
            .transpose()
    }
}

impl RankingStore for SqliteAdapter {
    fn upsert_ranking(
        &self,
        strategy_name: &str,
        records: &[StrategyRankingRecord],
    ) -> Result<usize, FundingArbError> {
        if let Some(foreign) = records.iter().find(|r| r.strategy_name != strategy_name) {
            return Err(FundingArbError::StrategyInvalid {
                strategy: strategy_name.to_string(),
                reason: format!("record for {} passed to {strategy_name}", foreign.strategy_name),
            });
        }

        let dates: BTreeSet<String> = records.iter().map(|r| r.date.format(DATE_FORMAT).to_string()).collect();

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut clear = tx
                .prepare("DELETE FROM strategy_ranking WHERE strategy_name = ?1 AND date = ?2")
                .map_err(query_err)?;
            for d in &dates {
                clear.execute(params![strategy_name, d]).map_err(query_err)?;
            }

            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO strategy_ranking
                     (strategy_name, trading_pair, date, final_ranking_score, rank_position,
                      component_scores, final_combination_value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;
            for r in records {
                let scores = serde_json::to_string(&r.component_scores).map_err(|e| {
                    FundingArbError::DatabaseQuery {
                        reason: format!("encoding component scores: {e}"),
                    }
                })?;
                stmt.execute(params![
                    strategy_name,
                    r.trading_pair,
                    r.date.format(DATE_FORMAT).to_string(),
                    r.final_score,
                    r.rank_position,
                    scores,
                    r.combination_detail
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(records.len())
    }

    fn get_rankings(
        &self,
        strategy_name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StrategyRankingRecord>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT trading_pair, date, final_ranking_score, rank_position,
                        component_scores, final_combination_value
                 FROM strategy_ranking
                 WHERE strategy_name = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC, rank_position ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    strategy_name,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    let date: String = row.get(1)?;
                    let scores: String = row.get(4)?;
                    let component_scores: BTreeMap<String, f64> =
                        serde_json::from_str(&scores).map_err(|e| conversion_err(4, e))?;
                    Ok(StrategyRankingRecord {
                        strategy_name: strategy_name.to_string(),
                        trading_pair: row.get(0)?,
                        date: parse_date(&date, 1)?,
                        final_score: row.get(2)?,
                        rank_position: row.get(3)?,
                        component_scores,
                        combination_detail: row.get(5)?,
                    })
                },
            )
            .map_err(query_err)?;

        collect_rows(rows)
    }

    fn clear_ranking(&self, strategy_name: &str, date: NaiveDate) -> Result<usize, FundingArbError> {
        self.conn()?
            .execute(
                "DELETE FROM strategy_ranking WHERE strategy_name = ?1 AND date = ?2",
                params![strategy_name, date.format(DATE_FORMAT).to_string()],
            )
            .map_err(query_err)
    }

    fn ranked_strategies(&self) -> Result<Vec<String>, FundingArbError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT strategy_name FROM strategy_ranking ORDER BY strategy_name")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        collect_rows(rows)
    }
}
