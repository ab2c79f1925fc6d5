//! Materialised differential storage.

use crate::domain::differential::Differential;
use crate::domain::error::FundingArbError;
use crate::domain::hour::HourRange;
use crate::domain::trading_pair::TradingPair;

pub trait DifferentialStore: Send + Sync {
    /// Insert or replace by `(timestamp_hour, symbol, exchange_a, exchange_b)`.
    fn upsert_differentials(&self, rows: &[Differential]) -> Result<usize, FundingArbError>;

    fn get_differential_extent(
        &self,
        symbol: &str,
        exchange_a: &str,
        exchange_b: &str,
    ) -> Result<Option<HourRange>, FundingArbError>;

    /// Rows for one trading pair, ordered by hour. `None` reads everything.
    fn get_differentials(
        &self,
        pair: &TradingPair,
        range: Option<HourRange>,
    ) -> Result<Vec<Differential>, FundingArbError>;

    fn list_trading_pairs(&self) -> Result<Vec<TradingPair>, FundingArbError>;
}
