//! End-to-end pipeline tests: observations through differentials, return
//! metrics and rankings, against the in-memory mock and SQLite stores.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use fundingarb::domain::error::FundingArbError;
use fundingarb::domain::pipeline::{
    refresh_all_differentials, refresh_differentials, refresh_return_metrics, run_strategy, ReturnDates,
};
use fundingarb::domain::range_planner::{RefreshMode, WindowKind};
use fundingarb::domain::hour::HourRange;
use fundingarb::domain::rank_streaks::{find_streaks, StreakThresholds};
use fundingarb::domain::ranking_strategy::{RankingStrategyConfig, StrategyRegistry};
use fundingarb::domain::returns::ReturnMetric;
use fundingarb::domain::trading_pair::TradingPair;
use fundingarb::ports::differential_port::DifferentialStore;
use fundingarb::ports::observation_port::ObservationStore;
use fundingarb::ports::ranking_port::RankingStore;
use fundingarb::ports::return_metric_port::ReturnMetricStore;
use fundingarb::ports::Stores;

fn one_day_example() -> Vec<Observation> {
    vec![
        obs("2025-01-15 08:00:00", "BTCUSDT", "binance", Some(0.0001)),
        obs("2025-01-15 08:00:00", "BTCUSDT", "bybit", None),
        obs("2025-01-15 16:00:00", "BTCUSDT", "binance", None),
        obs("2025-01-15 16:00:00", "BTCUSDT", "bybit", Some(0.0002)),
    ]
}

fn btc_pair() -> TradingPair {
    TradingPair::new("BTCUSDT", binance_bybit())
}

/// `n` consecutive hours of observations on both exchanges from
/// 2025-01-01 00:00.
fn hourly_observations(n: i64) -> Vec<Observation> {
    let start = ts("2025-01-01 00:00:00");
    (0..n)
        .flat_map(|h| {
            let t = start + chrono::Duration::hours(h);
            [
                Observation::new(t, "BTCUSDT", "binance", Some(0.0001 * (h % 7) as f64)),
                Observation::new(t, "BTCUSDT", "bybit", Some(0.00005)),
            ]
        })
        .collect()
}

fn hour_window(from: i64, to: i64) -> RefreshMode {
    let start = ts("2025-01-01 00:00:00");
    RefreshMode::Range(
        HourRange::new(start + chrono::Duration::hours(from), start + chrono::Duration::hours(to)).unwrap(),
    )
}

/// Apply `modes` in order and check the stored timeline has one row per
/// hour of its extent.
fn assert_contiguous_after(
    observations: &dyn ObservationStore,
    differentials: &dyn DifferentialStore,
    modes: &[RefreshMode],
) {
    for mode in modes {
        refresh_differentials(observations, differentials, "BTCUSDT", &binance_bybit(), *mode).unwrap();
    }
    let extent = differentials
        .get_differential_extent("BTCUSDT", "binance", "bybit")
        .unwrap()
        .unwrap();
    let rows = differentials.get_differentials(&btc_pair(), None).unwrap();
    assert_eq!(rows.len(), extent.len());
    for pair in rows.windows(2) {
        assert_eq!(pair[1].timestamp_hour - pair[0].timestamp_hour, chrono::Duration::hours(1));
    }
}

mod differentials {
    use super::*;

    #[test]
    fn one_sided_hours_use_zero_for_the_missing_leg() {
        let store = MockStore::new().with_observations(&one_day_example());
        let report =
            refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();

        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].kind, WindowKind::Full);
        // 08:00 through 16:00 inclusive.
        assert_eq!(report.rows_written, 9);

        let rows = store.get_differentials(&btc_pair(), None).unwrap();
        assert_eq!(rows.len(), 9);
        assert_abs_diff_eq!(rows[0].diff.unwrap(), 0.0001, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[8].diff.unwrap(), -0.0002, epsilon = 1e-12);
        assert!(rows[1..8].iter().all(|d| d.is_gap() && d.diff.is_none()));
    }

    #[test]
    fn second_refresh_writes_nothing() {
        let store = MockStore::new().with_observations(&one_day_example());
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        let again =
            refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        assert!(again.windows.is_empty());
        assert_eq!(again.rows_written, 0);
    }

    #[test]
    fn new_data_is_appended_only() {
        let store = MockStore::new().with_observations(&one_day_example());
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();

        store
            .upsert_observations(&[obs("2025-01-16 00:00:00", "BTCUSDT", "binance", Some(0.0005))])
            .unwrap();
        let report =
            refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].kind, WindowKind::Append);
        assert_eq!(report.windows[0].range.start(), ts("2025-01-15 17:00:00"));
        assert_eq!(report.rows_written, 8);
        assert_eq!(store.diff_count(), 17);
    }

    #[test]
    fn full_refresh_rewrites_everything() {
        let store = MockStore::new().with_observations(&one_day_example());
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        let report = refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Full).unwrap();
        assert_eq!(report.rows_written, 9);
        assert_eq!(store.diff_count(), 9);
    }

    #[test]
    fn separate_requested_windows_leave_no_hole() {
        let store = MockStore::new().with_observations(&hourly_observations(101));
        assert_contiguous_after(&store, &store, &[hour_window(0, 10), hour_window(50, 60)]);
        assert_eq!(store.diff_count(), 61);

        assert_contiguous_after(&store, &store, &[RefreshMode::Incremental]);
        assert_eq!(store.diff_count(), 101);
    }

    #[test]
    fn requested_window_before_existing_result_backfills_the_gap() {
        let store = MockStore::new().with_observations(&hourly_observations(101));
        assert_contiguous_after(&store, &store, &[hour_window(80, 90), hour_window(5, 10), RefreshMode::Incremental]);
        assert_eq!(store.diff_count(), 101);
    }

    #[test]
    fn unknown_symbol_is_no_data() {
        let store = MockStore::new().with_observations(&one_day_example());
        let err = refresh_all_differentials(
            &store,
            &store,
            &["ETHUSDT".to_string()],
            &[binance_bybit()],
            RefreshMode::Incremental,
        )
        .unwrap_err();
        assert!(matches!(err, FundingArbError::NoData { .. }));
    }

    #[test]
    fn store_failures_propagate() {
        let store = MockStore::failing("disk gone");
        let err =
            refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap_err();
        assert!(err.to_string().contains("disk gone"));
    }
}

mod returns {
    use super::*;

    #[test]
    fn daily_sum_and_annualised_roi() {
        let store = MockStore::new().with_observations(&one_day_example());
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();

        let report = refresh_return_metrics(&store, &store, &[btc_pair()], ReturnDates::Full).unwrap();
        assert_eq!(report.metrics_written, 1);

        let metrics = store
            .get_return_metrics(Some("BTCUSDT_binance_bybit"), date("2025-01-15"), date("2025-01-15"))
            .unwrap();
        let m = &metrics[0];
        assert_eq!(m.history_days, 1);
        assert_abs_diff_eq!(m.return_1d, -0.0001, epsilon = 1e-12);
        assert_abs_diff_eq!(m.roi_1d, -0.0365, epsilon = 1e-10);
        assert_abs_diff_eq!(m.roi_7d, -0.0365, epsilon = 1e-10);
        assert_abs_diff_eq!(m.roi_all, -0.0365, epsilon = 1e-10);
    }

    #[test]
    fn incremental_starts_at_latest_stored_date() {
        let store = MockStore::new().with_observations(&steady_observations("BTCUSDT", 5, 0.0003, 0.0001));
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        let first = refresh_return_metrics(&store, &store, &[btc_pair()], ReturnDates::Incremental).unwrap();
        assert_eq!(first.metrics_written, 5);

        let again = refresh_return_metrics(&store, &store, &[btc_pair()], ReturnDates::Incremental).unwrap();
        assert_eq!(again.metrics_written, 1);
    }

    #[test]
    fn incremental_recomputes_after_a_backfill() {
        let store = MockStore::new().with_observations(&steady_observations("BTCUSDT", 5, 0.0003, 0.0001));
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        refresh_return_metrics(&store, &store, &[btc_pair()], ReturnDates::Incremental).unwrap();

        store
            .upsert_observations(&[
                obs("2024-12-31 16:00:00", "BTCUSDT", "binance", Some(0.0003)),
                obs("2024-12-31 16:00:00", "BTCUSDT", "bybit", Some(0.0001)),
            ])
            .unwrap();
        let diff = refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        assert_eq!(diff.windows[0].kind, WindowKind::Backfill);

        let report = refresh_return_metrics(&store, &store, &[btc_pair()], ReturnDates::Incremental).unwrap();
        assert_eq!(report.metrics_written, 6);

        let day = store
            .get_return_metrics(None, date("2025-01-03"), date("2025-01-03"))
            .unwrap();
        assert_eq!(day[0].history_days, 4);
        assert_abs_diff_eq!(day[0].return_all, 0.0002 + 3.0 * 0.0006, epsilon = 1e-12);
    }

    #[test]
    fn seven_day_window_over_five_days() {
        let store = MockStore::new().with_observations(&steady_observations("BTCUSDT", 5, 0.0003, 0.0001));
        refresh_differentials(&store, &store, "BTCUSDT", &binance_bybit(), RefreshMode::Incremental).unwrap();
        refresh_return_metrics(&store, &store, &[btc_pair()], ReturnDates::Full).unwrap();

        let m = store.latest_metric_date("BTCUSDT_binance_bybit").unwrap();
        assert_eq!(m, Some(date("2025-01-05")));
        let last = &store
            .get_return_metrics(None, date("2025-01-05"), date("2025-01-05"))
            .unwrap()[0];
        assert_eq!(last.history_days, 5);
        assert_abs_diff_eq!(last.return_7d, 0.003, epsilon = 1e-12);
        assert_abs_diff_eq!(last.roi_7d, 0.003 * 365.0 / 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(last.roi_1d, 0.0006 * 365.0, epsilon = 1e-10);
    }
}

mod rankings {
    use super::*;

    fn ranked_store() -> MockStore {
        let mut observations = steady_observations("BTCUSDT", 3, 0.0003, 0.0001);
        observations.extend(steady_observations("ETHUSDT", 3, 0.0001, 0.0001));
        observations.extend(steady_observations("SOLUSDT", 3, 0.0001, 0.0004));
        let store = MockStore::new().with_observations(&observations);

        let symbols = store.list_symbols().unwrap();
        refresh_all_differentials(&store, &store, &symbols, &[binance_bybit()], RefreshMode::Incremental).unwrap();
        let pairs = store.list_trading_pairs().unwrap();
        refresh_return_metrics(&store, &store, &pairs, ReturnDates::Full).unwrap();
        store
    }

    #[test]
    fn ranks_by_one_day_roi() {
        let store = ranked_store();
        let registry = StrategyRegistry::builtin();
        let strategy = registry.get("test_simple_1d").unwrap();

        let report = run_strategy(&store, &store, strategy, date("2025-01-01"), date("2025-01-03")).unwrap();
        assert_eq!(report.dates, 3);
        assert_eq!(report.records_written, 9);

        let day = store
            .get_rankings("test_simple_1d", date("2025-01-03"), date("2025-01-03"))
            .unwrap();
        let order: Vec<&str> = day.iter().map(|r| r.trading_pair.as_str()).collect();
        assert_eq!(
            order,
            vec!["BTCUSDT_binance_bybit", "ETHUSDT_binance_bybit", "SOLUSDT_binance_bybit"]
        );
        assert_eq!(day[0].rank_position, 1);
        assert_abs_diff_eq!(day[0].final_score, 0.0006 * 365.0, epsilon = 1e-10);
        assert_eq!(store.ranked_strategies().unwrap(), vec!["test_simple_1d"]);
    }

    #[test]
    fn min_history_skips_young_pairs() {
        let store = ranked_store();
        let mut strategy = StrategyRegistry::builtin().get("original").unwrap().clone();
        strategy.min_history_days = 3;

        let report = run_strategy(&store, &store, &strategy, date("2025-01-01"), date("2025-01-03")).unwrap();
        // Only the third day has three days of history.
        assert_eq!(report.records_written, 3);
        assert_eq!(report.skipped.len(), 6);
    }

    fn metric(pair: &str, roi_1d: f64, history_days: u32) -> ReturnMetric {
        ReturnMetric {
            roi_1d,
            history_days,
            ..ReturnMetric::zero(pair, date("2025-01-10"))
        }
    }

    fn simple_1d(min_history_days: u32) -> RankingStrategyConfig {
        let mut strategy = StrategyRegistry::builtin().get("test_simple_1d").unwrap().clone();
        strategy.min_history_days = min_history_days;
        strategy
    }

    #[test]
    fn rerunning_a_date_replaces_its_ranking() {
        let store = MockStore::new();
        store
            .upsert_return_metrics(&[metric("A_binance_bybit", 0.1, 10), metric("B_binance_bybit", 0.3, 1)])
            .unwrap();
        let day = date("2025-01-10");

        run_strategy(&store, &store, &simple_1d(0), day, day).unwrap();
        let first = store.get_rankings("test_simple_1d", day, day).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].trading_pair, "B_binance_bybit");

        run_strategy(&store, &store, &simple_1d(5), day, day).unwrap();
        let second = store.get_rankings("test_simple_1d", day, day).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].trading_pair, "A_binance_bybit");
        assert_eq!(second[0].rank_position, 1);

        // Every pair skipped: the date is cleared rather than left stale.
        let report = run_strategy(&store, &store, &simple_1d(50), day, day).unwrap();
        assert_eq!(report.skipped.len(), 2);
        assert!(store.get_rankings("test_simple_1d", day, day).unwrap().is_empty());
    }

    #[test]
    fn streaks_from_stored_rankings() {
        let store = ranked_store();
        let strategy = StrategyRegistry::builtin().get("test_simple_1d").unwrap().clone();
        run_strategy(&store, &store, &strategy, date("2025-01-01"), date("2025-01-03")).unwrap();

        let records = store
            .get_rankings("test_simple_1d", date("2025-01-01"), date("2025-01-03"))
            .unwrap();
        let streaks = find_streaks(&records, StreakThresholds::new(1, 1).unwrap());
        assert_eq!(streaks.len(), 1);
        assert_eq!(streaks[0].trading_pair, "BTCUSDT_binance_bybit");
        assert_eq!(streaks[0].consecutive_days, 3);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use fundingarb::adapters::sqlite_adapter::SqliteAdapter;

    #[test]
    fn mixed_refresh_modes_keep_sqlite_timeline_contiguous() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.upsert_observations(&hourly_observations(101)).unwrap();
        assert_contiguous_after(
            &adapter,
            &adapter,
            &[hour_window(0, 10), hour_window(50, 60), RefreshMode::Incremental],
        );
        assert_eq!(adapter.get_differentials(&btc_pair(), None).unwrap().len(), 101);
    }

    #[test]
    fn full_refresh_twice_stores_identical_rows() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.upsert_observations(&one_day_example()).unwrap();

        refresh_differentials(&adapter, &adapter, "BTCUSDT", &binance_bybit(), RefreshMode::Full).unwrap();
        let first = adapter.get_differentials(&btc_pair(), None).unwrap();
        refresh_differentials(&adapter, &adapter, "BTCUSDT", &binance_bybit(), RefreshMode::Full).unwrap();
        let second = adapter.get_differentials(&btc_pair(), None).unwrap();

        assert_eq!(first.len(), 9);
        assert_eq!(first, second);
        assert_eq!(first[0].diff, Some(0.0001));
        assert!(first[1].diff.is_none());
    }

    #[test]
    fn reranking_clears_stale_sqlite_rows() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter
            .upsert_return_metrics(&[
                rankings_metric("A_binance_bybit", 0.1, 10),
                rankings_metric("B_binance_bybit", 0.3, 1),
            ])
            .unwrap();
        let day = date("2025-01-10");
        let mut strategy = StrategyRegistry::builtin().get("test_simple_1d").unwrap().clone();

        run_strategy(&adapter, &adapter, &strategy, day, day).unwrap();
        strategy.min_history_days = 5;
        run_strategy(&adapter, &adapter, &strategy, day, day).unwrap();

        let stored = adapter.get_rankings("test_simple_1d", day, day).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].trading_pair, "A_binance_bybit");
    }

    fn rankings_metric(pair: &str, roi_1d: f64, history_days: u32) -> ReturnMetric {
        ReturnMetric {
            roi_1d,
            history_days,
            ..ReturnMetric::zero(pair, date("2025-01-10"))
        }
    }

    #[test]
    fn full_pipeline_against_sqlite() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let stores = Stores::from_one(&adapter);
        stores
            .observations
            .upsert_observations(&steady_observations("BTCUSDT", 4, 0.0002, 0.0001))
            .unwrap();

        refresh_differentials(
            stores.observations,
            stores.differentials,
            "BTCUSDT",
            &binance_bybit(),
            RefreshMode::Incremental,
        )
        .unwrap();
        let again = refresh_differentials(
            stores.observations,
            stores.differentials,
            "BTCUSDT",
            &binance_bybit(),
            RefreshMode::Incremental,
        )
        .unwrap();
        assert_eq!(again.rows_written, 0);

        let pairs = stores.differentials.list_trading_pairs().unwrap();
        assert_eq!(pairs, vec![btc_pair()]);
        refresh_return_metrics(stores.differentials, stores.metrics, &pairs, ReturnDates::Full).unwrap();

        let strategy = StrategyRegistry::builtin().get("original").unwrap().clone();
        let report = run_strategy(stores.metrics, stores.rankings, &strategy, date("2025-01-01"), date("2025-01-04"))
            .unwrap();
        assert_eq!(report.records_written, 4);

        let stored = stores
            .rankings
            .get_rankings("original", date("2025-01-04"), date("2025-01-04"))
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rank_position, 1);
        assert!(stored[0].component_scores.contains_key("long_term_score"));
    }
}
