//! Side-by-side comparison of strategies on the same day.

use crate::domain::error::FundingArbError;
use crate::domain::ranking::{rank, StrategyRankingRecord};
use crate::domain::ranking_strategy::RankingStrategyConfig;
use crate::domain::returns::ReturnMetric;
use chrono::NaiveDate;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct TopPairs {
    pub strategy_name: String,
    pub pairs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOverlap {
    pub first: String,
    pub second: String,
    pub common: Vec<String>,
    /// `|common| / top_n`
    pub overlap_rate: f64,
}

impl StrategyOverlap {
    pub fn overlap_count(&self) -> usize {
        self.common.len()
    }
}

/// The `top_n` best ranked pairs of an already ranked day.
pub fn top_pairs(records: &[StrategyRankingRecord], top_n: usize) -> Vec<String> {
    let mut sorted: Vec<&StrategyRankingRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.rank_position);
    sorted
        .into_iter()
        .take(top_n)
        .map(|r| r.trading_pair.clone())
        .collect()
}

/// Overlap of every pair of strategies, in the order given.
pub fn overlaps(tops: &[TopPairs], top_n: usize) -> Vec<StrategyOverlap> {
    let mut out = Vec::new();
    for (i, a) in tops.iter().enumerate() {
        let set_a: BTreeSet<&str> = a.pairs.iter().map(String::as_str).collect();
        for b in &tops[i + 1..] {
            let set_b: BTreeSet<&str> = b.pairs.iter().map(String::as_str).collect();
            let common: Vec<String> = set_a.intersection(&set_b).map(|s| s.to_string()).collect();
            let overlap_rate = if top_n == 0 {
                0.0
            } else {
                common.len() as f64 / top_n as f64
            };
            out.push(StrategyOverlap {
                first: a.strategy_name.clone(),
                second: b.strategy_name.clone(),
                common,
                overlap_rate,
            });
        }
    }
    out
}

/// Rank `metrics` for `date` under each strategy and compare their top
/// `top_n`. Any strategy error aborts the comparison.
pub fn compare_strategies(
    strategies: &[&RankingStrategyConfig],
    date: NaiveDate,
    metrics: &[ReturnMetric],
    top_n: usize,
) -> Result<(Vec<TopPairs>, Vec<StrategyOverlap>), FundingArbError> {
    let tops = strategies
        .iter()
        .map(|s| {
            rank(s, date, metrics).map(|outcome| TopPairs {
                strategy_name: s.name.clone(),
                pairs: top_pairs(&outcome.records, top_n),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let pairwise = overlaps(&tops, top_n);
    Ok((tops, pairwise))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ranking_strategy::StrategyRegistry;
    use approx::assert_relative_eq;

    fn tops(name: &str, pairs: &[&str]) -> TopPairs {
        TopPairs {
            strategy_name: name.into(),
            pairs: pairs.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn pairwise_overlap_rate() {
        let all = vec![
            tops("a", &["P1", "P2", "P3", "P4"]),
            tops("b", &["P2", "P4", "P5", "P6"]),
            tops("c", &["P7", "P8", "P9", "P10"]),
        ];
        let result = overlaps(&all, 4);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].first, "a");
        assert_eq!(result[0].second, "b");
        assert_eq!(result[0].common, vec!["P2", "P4"]);
        assert_relative_eq!(result[0].overlap_rate, 0.5);
        assert_eq!(result[2].overlap_count(), 0);
    }

    #[test]
    fn compare_ranks_each_strategy() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let metrics: Vec<ReturnMetric> = (0..6)
            .map(|i| {
                let mut m = ReturnMetric::zero(&format!("P{i}_x_y"), date);
                m.roi_1d = i as f64;
                m.roi_2d = -(i as f64);
                m
            })
            .collect();
        let registry = StrategyRegistry::builtin();
        let strategies = vec![
            registry.get("test_simple_1d").unwrap(),
            registry.get("test_normalize_1d").unwrap(),
        ];
        let (tops, overlaps) = compare_strategies(&strategies, date, &metrics, 3).unwrap();
        assert_eq!(tops[0].pairs, vec!["P5_x_y", "P4_x_y", "P3_x_y"]);
        assert_eq!(tops[0].pairs, tops[1].pairs);
        assert_relative_eq!(overlaps[0].overlap_rate, 1.0);
    }
}
