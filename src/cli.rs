//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::comparison::compare_strategies;
use crate::domain::config_validation::{parse_symbols, validate_pipeline_config};
use crate::domain::error::FundingArbError;
use crate::domain::hour::{parse_timestamp, HourRange};
use crate::domain::pipeline::{
    refresh_all_differentials, refresh_return_metrics, run_strategy, PipelineConfig, ReturnDates,
};
use crate::domain::range_planner::RefreshMode;
use crate::domain::rank_streaks::{find_streaks, summarize_streaks, StreakThresholds};
use crate::domain::ranking::SkipReason;
use crate::domain::ranking_strategy::{RankingStrategyConfig, StrategyRegistry};
use crate::domain::trading_pair::TradingPair;
use crate::ports::config_port::ConfigPort;
use crate::ports::Stores;

#[derive(Parser, Debug)]
#[command(name = "fundingarb", about = "Funding-rate arbitrage differentials and rankings")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import funding-rate observations from CSV
    Import {
        #[arg(short, long)]
        config: PathBuf,
        /// A CSV file or a directory of CSV files
        path: PathBuf,
    },
    /// Refresh hourly differentials
    Diff {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Recompute the whole source extent
        #[arg(long, conflicts_with_all = ["from", "to"])]
        full: bool,
        /// Recompute from this hour (requires --to)
        #[arg(long, requires = "to")]
        from: Option<String>,
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// Compute rolling return metrics
    Returns {
        #[arg(short, long)]
        config: PathBuf,
        /// Only this trading pair, e.g. BTCUSDT_binance_bybit
        #[arg(long)]
        pair: Option<String>,
        #[arg(long, conflicts_with_all = ["from", "to"])]
        full: bool,
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },
    /// Rank trading pairs under one or more strategies
    Rank {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: Vec<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// List available ranking strategies
    Strategies {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        strategy_file: Option<PathBuf>,
        /// Print full definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a pipeline config and/or strategy file
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        strategy_file: Option<PathBuf>,
    },
    /// Rank persistence: streaks inside the top ranks
    Streaks {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: String,
        /// A streak starts at rank <= entry
        #[arg(long)]
        entry: u32,
        /// and lasts while rank <= stay
        #[arg(long)]
        stay: u32,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Compare the top-N of several strategies on one date
    Compare {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        #[arg(short, long, num_args = 1..)]
        strategy: Vec<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Show data coverage per symbol and trading pair
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Import { config, path } => run_import(&config, path),
        Command::Diff {
            config,
            symbol,
            full,
            from,
            to,
        } => run_diff(&config, symbol.as_deref(), full, from.as_deref(), to.as_deref()),
        Command::Returns {
            config,
            pair,
            full,
            from,
            to,
        } => run_returns(&config, pair.as_deref(), full, from.zip(to)),
        Command::Rank {
            config,
            strategy,
            from,
            to,
        } => run_rank(&config, &strategy, from, to),
        Command::Strategies {
            config,
            strategy_file,
            json,
        } => run_strategies(config.as_ref(), strategy_file.as_ref(), json),
        Command::Validate {
            config,
            strategy_file,
        } => run_validate(config.as_ref(), strategy_file.as_ref()),
        Command::Streaks {
            config,
            strategy,
            entry,
            stay,
            from,
            to,
        } => run_streaks(&config, &strategy, entry, stay, from, to),
        Command::Compare {
            config,
            date,
            strategy,
            top,
        } => run_compare(&config, date, &strategy, top),
        Command::Info { config } => run_info(&config),
    }
}

/// Lower and upper bound used when the user gives no date.
fn date_bounds(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    let lo = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let hi = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or_default();
    (from.unwrap_or(lo), to.unwrap_or(hi))
}

fn finish(result: Result<(), FundingArbError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_pipeline(path: &PathBuf) -> Result<(FileConfigAdapter, PipelineConfig), ExitCode> {
    let config = load_config(path)?;
    let pipeline = PipelineConfig::from_config(&config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    Ok((config, pipeline))
}

/// Open the configured store and hand it to `f`.
fn with_store(
    config: &dyn ConfigPort,
    f: impl FnOnce(Stores<'_>) -> Result<(), FundingArbError>,
) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let adapter = match SqliteAdapter::from_config(config) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };
        if let Ok(counts) = adapter.table_counts() {
            for (table, rows) in counts {
                log::debug!("{table}: {rows} rows");
            }
        }
        finish(f(Stores::from_one(&adapter)))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, f);
        eprintln!("error: sqlite feature is required");
        ExitCode::from(1)
    }
}

/// Built-in strategies plus the pipeline's strategy file (or `extra`, if
/// given).
pub fn load_registry(
    pipeline: Option<&PipelineConfig>,
    extra: Option<&PathBuf>,
) -> Result<StrategyRegistry, FundingArbError> {
    let mut registry = StrategyRegistry::builtin();
    let file = extra
        .cloned()
        .or_else(|| pipeline.and_then(|p| p.strategy_file.as_ref().map(PathBuf::from)));
    if let Some(path) = file {
        let config = FileConfigAdapter::from_file(&path)?;
        let n = registry.load_file(&config)?;
        eprintln!("Loaded {n} strategies from {}", path.display());
    }
    Ok(registry)
}

/// Requested strategies, else the pipeline's list, else every strategy.
fn select_strategies<'r>(
    registry: &'r StrategyRegistry,
    requested: &[String],
    pipeline: &PipelineConfig,
) -> Result<Vec<&'r RankingStrategyConfig>, FundingArbError> {
    let names: Vec<String> = if !requested.is_empty() {
        requested.to_vec()
    } else if let Some(list) = &pipeline.strategies {
        list.clone()
    } else {
        registry.names().iter().map(|s| s.to_string()).collect()
    };
    names.iter().map(|n| registry.get(n)).collect()
}

fn run_import(config_path: &PathBuf, path: PathBuf) -> ExitCode {
    let (config, _pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    with_store(&config, |stores| {
        let observations = CsvAdapter::new(path).read_all()?;
        let total = stores.observations.upsert_observations(&observations)?;
        println!("Imported {total} observations");
        Ok(())
    })
}

fn parse_hour_arg(raw: &str, key: &str) -> Result<chrono::NaiveDateTime, FundingArbError> {
    parse_timestamp(raw).ok_or_else(|| FundingArbError::ConfigInvalid {
        section: "diff".to_string(),
        key: key.to_string(),
        reason: format!("cannot read {raw:?} as a timestamp"),
    })
}

fn refresh_mode(full: bool, from: Option<&str>, to: Option<&str>) -> Result<RefreshMode, FundingArbError> {
    if full {
        return Ok(RefreshMode::Full);
    }
    match (from, to) {
        (Some(from), Some(to)) => {
            let start = parse_hour_arg(from, "from")?;
            let end = parse_hour_arg(to, "to")?;
            let range = HourRange::new(start, end).ok_or_else(|| FundingArbError::ConfigInvalid {
                section: "diff".to_string(),
                key: "from".to_string(),
                reason: "from must not be after to".to_string(),
            })?;
            Ok(RefreshMode::Range(range))
        }
        _ => Ok(RefreshMode::Incremental),
    }
}

fn run_diff(
    config_path: &PathBuf,
    symbol: Option<&str>,
    full: bool,
    from: Option<&str>,
    to: Option<&str>,
) -> ExitCode {
    let (config, pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    with_store(&config, |stores| {
        let mode = refresh_mode(full, from, to)?;
        let symbols = match symbol {
            Some(s) => parse_symbols(s)?,
            None => match &pipeline.symbols {
                Some(list) => list.clone(),
                None => stores.observations.list_symbols()?,
            },
        };
        let pairs = pipeline.exchange_pairs();
        eprintln!(
            "Refreshing {} symbols across {} exchange pairs ({mode:?})",
            symbols.len(),
            pairs.len()
        );

        let reports = refresh_all_differentials(
            stores.observations,
            stores.differentials,
            &symbols,
            &pairs,
            mode,
        )?;
        let rows: usize = reports.iter().map(|r| r.rows_written).sum();
        let windows: usize = reports.iter().map(|r| r.windows.len()).sum();
        println!(
            "{} trading pairs, {windows} windows, {rows} differential rows written",
            reports.len()
        );
        Ok(())
    })
}

fn run_returns(
    config_path: &PathBuf,
    pair: Option<&str>,
    full: bool,
    window: Option<(NaiveDate, NaiveDate)>,
) -> ExitCode {
    let (config, _pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    with_store(&config, |stores| {
        let dates = match (full, window) {
            (true, _) => ReturnDates::Full,
            (false, Some((start, end))) => ReturnDates::Between(start, end),
            (false, None) => ReturnDates::Incremental,
        };

        let mut pairs = stores.differentials.list_trading_pairs()?;
        if let Some(key) = pair {
            let wanted = TradingPair::parse_key(key).ok_or_else(|| FundingArbError::ConfigInvalid {
                section: "returns".to_string(),
                key: "pair".to_string(),
                reason: format!("{key} is not SYMBOL_exchangeA_exchangeB"),
            })?;
            pairs.retain(|p| *p == wanted);
            if pairs.is_empty() {
                return Err(FundingArbError::NoData {
                    symbol: key.to_string(),
                });
            }
        }

        let report = refresh_return_metrics(stores.differentials, stores.metrics, &pairs, dates)?;
        println!(
            "{} trading pairs, {} return metrics written",
            report.pairs, report.metrics_written
        );
        Ok(())
    })
}

fn run_rank(
    config_path: &PathBuf,
    requested: &[String],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ExitCode {
    let (config, pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let registry = match load_registry(Some(&pipeline), None) {
        Ok(r) => r,
        Err(e) => return finish(Err(e)),
    };
    let strategies = match select_strategies(&registry, requested, &pipeline) {
        Ok(s) => s,
        Err(e) => return finish(Err(e)),
    };
    let (start, end) = date_bounds(from, to);

    with_store(&config, |stores| {
        for strategy in strategies {
            let report = run_strategy(stores.metrics, stores.rankings, strategy, start, end)?;
            let insufficient = report
                .skipped
                .iter()
                .filter(|(_, s)| matches!(s.reason, SkipReason::InsufficientHistory { .. }))
                .count();
            println!(
                "{:<22} {:>5} dates {:>8} records {:>6} skipped ({insufficient} short history)",
                strategy.name,
                report.dates,
                report.records_written,
                report.skipped.len()
            );
        }
        Ok(())
    })
}

fn run_strategies(config_path: Option<&PathBuf>, strategy_file: Option<&PathBuf>, json: bool) -> ExitCode {
    let pipeline = match config_path {
        Some(path) => match load_pipeline(path) {
            Ok((_, p)) => Some(p),
            Err(code) => return code,
        },
        None => None,
    };
    let registry = match load_registry(pipeline.as_ref(), strategy_file) {
        Ok(r) => r,
        Err(e) => return finish(Err(e)),
    };

    if json {
        let all: Vec<&RankingStrategyConfig> = registry.iter().collect();
        return match serde_json::to_string_pretty(&all) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(1)
            }
        };
    }

    for s in registry.iter() {
        println!("{:<22} {}", s.name, s.description);
        let finals = &s.final_combination;
        for (name, weight) in finals.components.iter().zip(&finals.weights) {
            let Some(component) = s.components.get(name) else {
                continue;
            };
            let indicators: Vec<String> = component
                .indicators
                .iter()
                .zip(&component.weights)
                .map(|(ind, w)| format!("{ind}*{w}"))
                .collect();
            println!(
                "    {name} (w={weight}): {}{}{}",
                indicators.join(" + "),
                if component.normalize { " [normalized]" } else { "" },
                if component.volatility_penalty { " [vol penalty]" } else { "" },
            );
        }
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: Option<&PathBuf>, strategy_file: Option<&PathBuf>) -> ExitCode {
    if config_path.is_none() && strategy_file.is_none() {
        eprintln!("error: give --config and/or --strategy-file");
        return ExitCode::from(2);
    }

    let mut pipeline = None;
    if let Some(path) = config_path {
        eprintln!("Validating config: {}", path.display());
        let config = match load_config(path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        if let Err(e) = validate_pipeline_config(&config) {
            return finish(Err(e));
        }
        match PipelineConfig::from_config(&config) {
            Ok(p) => {
                eprintln!("  exchanges: {}", p.exchanges.join(", "));
                eprintln!("  exchange pairs: {}", p.exchange_pairs().len());
                pipeline = Some(p);
            }
            Err(e) => return finish(Err(e)),
        }
    }

    let registry = match load_registry(pipeline.as_ref(), strategy_file) {
        Ok(r) => r,
        Err(e) => return finish(Err(e)),
    };
    if let Some(p) = &pipeline {
        if let Err(e) = select_strategies(&registry, &[], p) {
            return finish(Err(e));
        }
    }
    eprintln!("OK: {} strategies available", registry.len());
    ExitCode::SUCCESS
}

fn run_streaks(
    config_path: &PathBuf,
    strategy: &str,
    entry: u32,
    stay: u32,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ExitCode {
    let (config, pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let thresholds = match StreakThresholds::new(entry, stay) {
        Ok(t) => t,
        Err(e) => return finish(Err(e)),
    };
    // Rankings are stored under the registry's name, not the typed one.
    let resolved = load_registry(Some(&pipeline), None)
        .and_then(|registry| registry.get(strategy).map(|s| s.name.clone()));
    let strategy = match resolved {
        Ok(name) => name,
        Err(e) => return finish(Err(e)),
    };
    let (start, end) = date_bounds(from, to);

    with_store(&config, |stores| {
        let records = stores.rankings.get_rankings(&strategy, start, end)?;
        if records.is_empty() {
            return Err(FundingArbError::NoData {
                symbol: format!("rankings of {strategy}"),
            });
        }
        let streaks = find_streaks(&records, thresholds);
        for s in &streaks {
            println!(
                "{:<40} {} #{} -> {} #{} {:>4} days (total {})",
                s.event_id(),
                s.entry_date,
                s.entry_rank,
                s.exit_date,
                s.exit_rank,
                s.consecutive_days,
                s.cumulative_days
            );
        }
        println!();
        for row in summarize_streaks(&streaks).iter().take(20) {
            println!(
                "{:<32} {:>3} streaks {:>5} days (longest {})",
                row.trading_pair, row.streaks, row.total_days, row.longest
            );
        }
        eprintln!(
            "{} streaks for {strategy} (entry <= {}, stay <= {})",
            streaks.len(),
            thresholds.entry(),
            thresholds.stay()
        );
        Ok(())
    })
}

fn run_compare(config_path: &PathBuf, date: NaiveDate, requested: &[String], top: usize) -> ExitCode {
    let (config, pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let registry = match load_registry(Some(&pipeline), None) {
        Ok(r) => r,
        Err(e) => return finish(Err(e)),
    };
    let strategies = match select_strategies(&registry, requested, &pipeline) {
        Ok(s) => s,
        Err(e) => return finish(Err(e)),
    };

    with_store(&config, |stores| {
        let metrics = stores.metrics.get_return_metrics(None, date, date)?;
        if metrics.is_empty() {
            return Err(FundingArbError::NoData {
                symbol: format!("any pair on {date}"),
            });
        }
        let (tops, overlaps) = compare_strategies(&strategies, date, &metrics, top)?;
        for t in &tops {
            println!("{:<22} {}", t.strategy_name, t.pairs.join(", "));
        }
        println!();
        for o in &overlaps {
            println!(
                "{:<22} vs {:<22} {:>3}/{top} ({:5.1}%)",
                o.first,
                o.second,
                o.overlap_count(),
                o.overlap_rate * 100.0
            );
        }
        Ok(())
    })
}

fn run_info(config_path: &PathBuf) -> ExitCode {
    let (config, pipeline) = match load_pipeline(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    with_store(&config, |stores| {
        let stored = stores.observations.list_exchanges()?;
        for exchange in stored.iter().filter(|e| !pipeline.exchanges.contains(e)) {
            eprintln!("{exchange}: in the store but not in [pipeline] exchanges");
        }

        let symbols = match &pipeline.symbols {
            Some(list) => list.clone(),
            None => stores.observations.list_symbols()?,
        };
        for symbol in &symbols {
            for exchange in &pipeline.exchanges {
                match stores.observations.observation_extent(symbol, exchange)? {
                    Some(range) => println!("{symbol}@{exchange}: {} hours, {range}", range.len()),
                    None => eprintln!("{symbol}@{exchange}: no observations"),
                }
            }
        }

        for pair in stores.differentials.list_trading_pairs()? {
            let ex = &pair.exchanges;
            if let Some(range) =
                stores
                    .differentials
                    .get_differential_extent(&pair.symbol, ex.exchange_a(), ex.exchange_b())?
            {
                println!("{pair}: {} differential hours, {range}", range.len());
            }
        }

        let ranked = stores.rankings.ranked_strategies()?;
        if !ranked.is_empty() {
            println!("ranked strategies: {}", ranked.join(", "));
        }
        Ok(())
    })
}
