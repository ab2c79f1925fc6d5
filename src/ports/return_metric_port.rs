//! Rolling return metric storage.

use crate::domain::error::FundingArbError;
use crate::domain::returns::ReturnMetric;
use chrono::NaiveDate;

pub trait ReturnMetricStore: Send + Sync {
    /// Insert or replace by `(trading_pair, date)`.
    fn upsert_return_metrics(&self, metrics: &[ReturnMetric]) -> Result<usize, FundingArbError>;

    /// Metrics dated within `[start, end]`, for one pair or all of them.
    fn get_return_metrics(
        &self,
        trading_pair: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ReturnMetric>, FundingArbError>;

    fn latest_metric_date(&self, trading_pair: &str) -> Result<Option<NaiveDate>, FundingArbError>;
}
