//! Orchestration: observations to differentials to return metrics to
//! rankings, each stage reading from and writing to its store.

use crate::domain::config_validation::{parse_exchanges, parse_list, parse_symbols, validate_pipeline_config};
use crate::domain::differential::compute_differentials;
use crate::domain::error::FundingArbError;
use crate::domain::hour::HourRange;
use crate::domain::range_planner::{plan_refresh, PlanWindow, RefreshMode};
use crate::domain::ranking::{rank_by_date, SkippedPair};
use crate::domain::ranking_strategy::RankingStrategyConfig;
use crate::domain::returns::{DailySeries, ReturnMetric};
use crate::domain::trading_pair::{exchange_pairs, ExchangePair, TradingPair};
use crate::ports::config_port::ConfigPort;
use crate::ports::differential_port::DifferentialStore;
use crate::ports::observation_port::ObservationStore;
use crate::ports::ranking_port::RankingStore;
use crate::ports::return_metric_port::ReturnMetricStore;
use chrono::NaiveDate;
use rayon::prelude::*;

/// The `[pipeline]` section, parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub exchanges: Vec<String>,
    /// `None` means every symbol in the observation store.
    pub symbols: Option<Vec<String>>,
    /// `None` means every known strategy.
    pub strategies: Option<Vec<String>>,
    pub strategy_file: Option<String>,
}

impl PipelineConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundingArbError> {
        validate_pipeline_config(config)?;
        let exchanges = parse_exchanges(&config.get_string("pipeline", "exchanges").unwrap_or_default())?;
        let symbols = config
            .get_string("pipeline", "symbols")
            .map(|s| parse_symbols(&s))
            .transpose()?;
        let strategies = config
            .get_string("pipeline", "strategies")
            .map(|s| parse_list(&s, "pipeline", "strategies", |t| t.to_lowercase()))
            .transpose()?;
        let strategy_file = config
            .get_string("pipeline", "strategy_file")
            .filter(|s| !s.trim().is_empty());
        Ok(Self {
            exchanges,
            symbols,
            strategies,
            strategy_file,
        })
    }

    pub fn exchange_pairs(&self) -> Vec<ExchangePair> {
        exchange_pairs(&self.exchanges)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffRefreshReport {
    pub pair: TradingPair,
    pub windows: Vec<PlanWindow>,
    pub rows_written: usize,
}

/// Hour extent of `symbol` across both exchanges of `pair`.
pub fn source_extent(
    observations: &dyn ObservationStore,
    symbol: &str,
    pair: &ExchangePair,
) -> Result<Option<HourRange>, FundingArbError> {
    let a = observations.observation_extent(symbol, pair.exchange_a())?;
    let b = observations.observation_extent(symbol, pair.exchange_b())?;
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(a.hull(&b)),
        (a, b) => a.or(b),
    })
}

/// Bring one trading pair's differential timeline up to date.
///
/// Errors with `NoData` when neither exchange has observations for the
/// symbol.
pub fn refresh_differentials(
    observations: &dyn ObservationStore,
    differentials: &dyn DifferentialStore,
    symbol: &str,
    pair: &ExchangePair,
    mode: RefreshMode,
) -> Result<DiffRefreshReport, FundingArbError> {
    let trading_pair = TradingPair::new(symbol, pair.clone());
    let source = source_extent(observations, symbol, pair)?.ok_or_else(|| FundingArbError::NoData {
        symbol: trading_pair.key(),
    })?;
    let existing = differentials.get_differential_extent(symbol, pair.exchange_a(), pair.exchange_b())?;

    let windows = plan_refresh(mode, source, existing);
    if windows.is_empty() {
        log::info!("{trading_pair}: up to date ({source})");
    }

    let mut rows_written = 0;
    for window in &windows {
        let mut obs = observations.get_observations(symbol, pair.exchange_a(), window.range)?;
        obs.extend(observations.get_observations(symbol, pair.exchange_b(), window.range)?);

        let rows = compute_differentials(symbol, pair, &obs, window.range);
        let written = differentials.upsert_differentials(&rows)?;
        log::info!("{trading_pair}: {} {} -> {written} rows", window.kind, window.range);
        rows_written += written;
    }

    Ok(DiffRefreshReport {
        pair: trading_pair,
        windows,
        rows_written,
    })
}

/// Refresh every `symbol x exchange pair` combination. Combinations without
/// any observations are skipped with a warning; a symbol with no data on
/// any pair is a `NoData` error.
pub fn refresh_all_differentials(
    observations: &dyn ObservationStore,
    differentials: &dyn DifferentialStore,
    symbols: &[String],
    pairs: &[ExchangePair],
    mode: RefreshMode,
) -> Result<Vec<DiffRefreshReport>, FundingArbError> {
    let mut reports = Vec::new();
    for symbol in symbols {
        let mut any = false;
        for pair in pairs {
            match refresh_differentials(observations, differentials, symbol, pair, mode) {
                Ok(report) => {
                    any = true;
                    reports.push(report);
                }
                Err(FundingArbError::NoData { .. }) => {
                    log::warn!("{symbol}: no observations on {pair}, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        if !any && !pairs.is_empty() {
            return Err(FundingArbError::NoData {
                symbol: symbol.clone(),
            });
        }
    }
    Ok(reports)
}

/// Which dates to (re)compute return metrics for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDates {
    /// From the latest stored metric date (inclusive) to the end of data,
    /// or every date when earlier history changed since it was stored.
    Incremental,
    /// Every date with data.
    Full,
    /// A fixed window, clipped to each pair's data.
    Between(NaiveDate, NaiveDate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRefreshReport {
    pub pairs: usize,
    pub metrics_written: usize,
}

fn metrics_for_pair(
    differentials: &dyn DifferentialStore,
    metrics: &dyn ReturnMetricStore,
    pair: &TradingPair,
    dates: ReturnDates,
) -> Result<Vec<ReturnMetric>, FundingArbError> {
    let key = pair.key();
    let rows = differentials.get_differentials(pair, None)?;
    let series = DailySeries::from_differentials(&key, &rows);
    let (Some(first), Some(last)) = (series.first_date(), series.last_date()) else {
        log::debug!("{key}: no non-null differentials");
        return Ok(Vec::new());
    };

    let (start, end) = match dates {
        ReturnDates::Full => (first, last),
        ReturnDates::Between(start, end) => (start, end),
        ReturnDates::Incremental => match metrics.latest_metric_date(&key)? {
            Some(latest) if history_unchanged(metrics, &series, &key, latest)? => (latest, last),
            Some(latest) => {
                log::info!("{key}: history before {latest} changed, recomputing from {first}");
                (first, last)
            }
            None => (first, last),
        },
    };

    let out = series.metrics_between(start, end);
    log::info!("{key}: {} daily metrics ({start} ~ {end})", out.len());
    Ok(out)
}

/// True when the stored metric for `date` still agrees with `series`. A
/// backfill or a rewritten window moves `history_days` or `return_all`.
fn history_unchanged(
    metrics: &dyn ReturnMetricStore,
    series: &DailySeries,
    key: &str,
    date: NaiveDate,
) -> Result<bool, FundingArbError> {
    let Some(stored) = metrics.get_return_metrics(Some(key), date, date)?.into_iter().next() else {
        return Ok(false);
    };
    let fresh = series.metric_for(date);
    Ok(stored.history_days == fresh.history_days && (stored.return_all - fresh.return_all).abs() <= 1e-12)
}

/// Compute return metrics for `pairs` in parallel and store them.
pub fn refresh_return_metrics(
    differentials: &dyn DifferentialStore,
    metrics: &dyn ReturnMetricStore,
    pairs: &[TradingPair],
    dates: ReturnDates,
) -> Result<ReturnRefreshReport, FundingArbError> {
    let computed = pairs
        .par_iter()
        .map(|pair| metrics_for_pair(differentials, metrics, pair, dates))
        .collect::<Result<Vec<_>, _>>()?;

    let mut metrics_written = 0;
    for batch in computed.iter().filter(|b| !b.is_empty()) {
        metrics_written += metrics.upsert_return_metrics(batch)?;
    }

    Ok(ReturnRefreshReport {
        pairs: pairs.len(),
        metrics_written,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankRunReport {
    pub dates: usize,
    pub records_written: usize,
    pub skipped: Vec<(NaiveDate, SkippedPair)>,
}

/// Rank every date in `[start, end]` under `strategy` and store the result.
pub fn run_strategy(
    metrics: &dyn ReturnMetricStore,
    rankings: &dyn RankingStore,
    strategy: &RankingStrategyConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RankRunReport, FundingArbError> {
    strategy.validate()?;
    let day_metrics = metrics.get_return_metrics(None, start, end)?;

    let mut report = RankRunReport::default();
    for (date, outcome) in rank_by_date(strategy, &day_metrics)? {
        report.dates += 1;
        if outcome.records.is_empty() {
            rankings.clear_ranking(&strategy.name, date)?;
        } else {
            report.records_written += rankings.upsert_ranking(&strategy.name, &outcome.records)?;
        }
        report
            .skipped
            .extend(outcome.skipped.into_iter().map(|s| (date, s)));
    }

    if report.dates == 0 {
        log::warn!("{}: no return metrics between {start} and {end}", strategy.name);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn pipeline_config_defaults() {
        let config = FileConfigAdapter::from_string(
            "[sqlite]\npath = x.db\n[pipeline]\nexchanges = okx, binance, bybit\n",
        )
        .unwrap();
        let pc = PipelineConfig::from_config(&config).unwrap();
        assert_eq!(pc.exchanges, vec!["okx", "binance", "bybit"]);
        assert!(pc.symbols.is_none());
        assert!(pc.strategies.is_none());
        assert!(pc.strategy_file.is_none());
        let rendered: Vec<String> = pc.exchange_pairs().iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["binance/bybit", "binance/okx", "bybit/okx"]);
    }

    #[test]
    fn pipeline_config_lists() {
        let config = FileConfigAdapter::from_string(
            "[sqlite]\npath = x.db\n[pipeline]\nexchanges = binance, bybit\nsymbols = btcusdt\nstrategies = Original\nstrategy_file = s.ini\n",
        )
        .unwrap();
        let pc = PipelineConfig::from_config(&config).unwrap();
        assert_eq!(pc.symbols, Some(vec!["BTCUSDT".to_string()]));
        assert_eq!(pc.strategies, Some(vec!["original".to_string()]));
        assert_eq!(pc.strategy_file.as_deref(), Some("s.ini"));
    }
}
