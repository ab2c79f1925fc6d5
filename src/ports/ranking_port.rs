//! Strategy ranking storage.

use crate::domain::error::FundingArbError;
use crate::domain::ranking::StrategyRankingRecord;
use chrono::NaiveDate;

pub trait RankingStore: Send + Sync {
    /// Store `records` as the complete ranking of every date they carry:
    /// rows previously stored for those dates are replaced, not merged.
    /// Records for other strategies are rejected.
    fn upsert_ranking(
        &self,
        strategy_name: &str,
        records: &[StrategyRankingRecord],
    ) -> Result<usize, FundingArbError>;

    /// Rankings for one strategy within `[start, end]`, ordered by date then
    /// rank.
    fn get_rankings(
        &self,
        strategy_name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StrategyRankingRecord>, FundingArbError>;

    /// Drop the stored ranking of one strategy on one date.
    fn clear_ranking(&self, strategy_name: &str, date: NaiveDate) -> Result<usize, FundingArbError>;

    fn ranked_strategies(&self) -> Result<Vec<String>, FundingArbError>;
}
