//! Daily aggregation and rolling-window returns.
//!
//! A trading pair's hourly `diff` values are summed per calendar date
//! (nulls skipped, not counted as zero). Rolling returns sum those daily
//! values over the trailing N calendar days ending at the target date,
//! clipped to the first day of history. Annualised ROI is
//! `return * 365 / days_used`.

use crate::domain::differential::Differential;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReturnWindow {
    D1,
    D2,
    D7,
    D14,
    D30,
    All,
}

impl ReturnWindow {
    pub const ALL: [ReturnWindow; 6] = [
        ReturnWindow::D1,
        ReturnWindow::D2,
        ReturnWindow::D7,
        ReturnWindow::D14,
        ReturnWindow::D30,
        ReturnWindow::All,
    ];

    /// Window length in days; `None` for the full history.
    pub fn days(&self) -> Option<i64> {
        match self {
            ReturnWindow::D1 => Some(1),
            ReturnWindow::D2 => Some(2),
            ReturnWindow::D7 => Some(7),
            ReturnWindow::D14 => Some(14),
            ReturnWindow::D30 => Some(30),
            ReturnWindow::All => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReturnWindow::D1 => "1d",
            ReturnWindow::D2 => "2d",
            ReturnWindow::D7 => "7d",
            ReturnWindow::D14 => "14d",
            ReturnWindow::D30 => "30d",
            ReturnWindow::All => "all",
        }
    }
}

impl fmt::Display for ReturnWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReturn {
    pub trading_pair: String,
    pub date: NaiveDate,
    pub daily_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetric {
    pub trading_pair: String,
    pub date: NaiveDate,
    /// Calendar days covered by the `all` window.
    pub history_days: u32,
    pub return_1d: f64,
    pub roi_1d: f64,
    pub return_2d: f64,
    pub roi_2d: f64,
    pub return_7d: f64,
    pub roi_7d: f64,
    pub return_14d: f64,
    pub roi_14d: f64,
    pub return_30d: f64,
    pub roi_30d: f64,
    pub return_all: f64,
    pub roi_all: f64,
}

impl ReturnMetric {
    pub fn zero(trading_pair: &str, date: NaiveDate) -> Self {
        Self {
            trading_pair: trading_pair.to_string(),
            date,
            history_days: 0,
            return_1d: 0.0,
            roi_1d: 0.0,
            return_2d: 0.0,
            roi_2d: 0.0,
            return_7d: 0.0,
            roi_7d: 0.0,
            return_14d: 0.0,
            roi_14d: 0.0,
            return_30d: 0.0,
            roi_30d: 0.0,
            return_all: 0.0,
            roi_all: 0.0,
        }
    }

    /// `(return, roi)` for a window.
    pub fn window(&self, window: ReturnWindow) -> (f64, f64) {
        match window {
            ReturnWindow::D1 => (self.return_1d, self.roi_1d),
            ReturnWindow::D2 => (self.return_2d, self.roi_2d),
            ReturnWindow::D7 => (self.return_7d, self.roi_7d),
            ReturnWindow::D14 => (self.return_14d, self.roi_14d),
            ReturnWindow::D30 => (self.return_30d, self.roi_30d),
            ReturnWindow::All => (self.return_all, self.roi_all),
        }
    }

    fn set_window(&mut self, window: ReturnWindow, ret: f64, roi: f64) {
        let (r, o) = match window {
            ReturnWindow::D1 => (&mut self.return_1d, &mut self.roi_1d),
            ReturnWindow::D2 => (&mut self.return_2d, &mut self.roi_2d),
            ReturnWindow::D7 => (&mut self.return_7d, &mut self.roi_7d),
            ReturnWindow::D14 => (&mut self.return_14d, &mut self.roi_14d),
            ReturnWindow::D30 => (&mut self.return_30d, &mut self.roi_30d),
            ReturnWindow::All => (&mut self.return_all, &mut self.roi_all),
        };
        *r = ret;
        *o = roi;
    }
}

pub fn annualize(ret: f64, days_used: i64) -> f64 {
    if days_used > 0 {
        ret * DAYS_PER_YEAR / days_used as f64
    } else {
        0.0
    }
}

/// Sum non-null `diff` per calendar date. Dates whose hours are all null
/// produce no entry.
pub fn aggregate_daily(trading_pair: &str, diffs: &[Differential]) -> Vec<DailyReturn> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for d in diffs {
        if let Some(diff) = d.diff {
            *by_date.entry(d.timestamp_hour.date()).or_insert(0.0) += diff;
        }
    }
    by_date
        .into_iter()
        .map(|(date, daily_sum)| DailyReturn {
            trading_pair: trading_pair.to_string(),
            date,
            daily_sum,
        })
        .collect()
}

/// Daily sums for one trading pair, indexed by date.
#[derive(Debug, Clone)]
pub struct DailySeries {
    trading_pair: String,
    sums: BTreeMap<NaiveDate, f64>,
}

impl DailySeries {
    pub fn new(trading_pair: &str, daily: &[DailyReturn]) -> Self {
        Self {
            trading_pair: trading_pair.to_string(),
            sums: daily.iter().map(|d| (d.date, d.daily_sum)).collect(),
        }
    }

    pub fn from_differentials(trading_pair: &str, diffs: &[Differential]) -> Self {
        Self::new(trading_pair, &aggregate_daily(trading_pair, diffs))
    }

    pub fn trading_pair(&self) -> &str {
        &self.trading_pair
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.sums.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.sums.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Rolling metrics for `target`. All zero when `target` itself has no
    /// daily entry.
    pub fn metric_for(&self, target: NaiveDate) -> ReturnMetric {
        let mut metric = ReturnMetric::zero(&self.trading_pair, target);

        let Some(first) = self.first_date() else {
            return metric;
        };
        if !self.sums.contains_key(&target) {
            log::debug!("{} {target}: no data for target date", self.trading_pair);
            return metric;
        }

        for window in ReturnWindow::ALL {
            let start = match window.days() {
                Some(n) => (target - Duration::days(n - 1)).max(first),
                None => first,
            };
            let days_used = (target - start).num_days() + 1;
            let ret: f64 = self.sums.range(start..=target).map(|(_, v)| v).sum();
            metric.set_window(window, ret, annualize(ret, days_used));
            if window == ReturnWindow::All {
                metric.history_days = days_used as u32;
            }
        }

        metric
    }

    /// Metrics for every date in `[start, end]` that falls within this
    /// series' history.
    pub fn metrics_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<ReturnMetric> {
        let (Some(first), Some(last)) = (self.first_date(), self.last_date()) else {
            return Vec::new();
        };
        let from = start.max(first);
        let to = end.min(last);
        from.iter_days()
            .take_while(|d| *d <= to)
            .map(|d| self.metric_for(d))
            .collect()
    }
}

/// Metric for one trading pair on `target`, straight from its differentials.
pub fn compute_return_metric(
    trading_pair: &str,
    diffs: &[Differential],
    target: NaiveDate,
) -> ReturnMetric {
    DailySeries::from_differentials(trading_pair, diffs).metric_for(target)
}
