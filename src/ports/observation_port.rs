//! Raw funding-rate observation storage.

use crate::domain::error::FundingArbError;
use crate::domain::hour::HourRange;
use crate::domain::observation::Observation;

pub trait ObservationStore: Send + Sync {
    /// Observations for one symbol on one exchange within `range`
    /// (inclusive), ordered by hour.
    fn get_observations(
        &self,
        symbol: &str,
        exchange: &str,
        range: HourRange,
    ) -> Result<Vec<Observation>, FundingArbError>;

    /// Insert or replace by `(timestamp_hour, symbol, exchange)`.
    fn upsert_observations(&self, observations: &[Observation]) -> Result<usize, FundingArbError>;

    fn observation_extent(
        &self,
        symbol: &str,
        exchange: &str,
    ) -> Result<Option<HourRange>, FundingArbError>;

    fn list_symbols(&self) -> Result<Vec<String>, FundingArbError>;

    fn list_exchanges(&self) -> Result<Vec<String>, FundingArbError>;
}
