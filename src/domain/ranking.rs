//! Cross-sectional ranking of trading pairs under a strategy.
//!
//! For one date: indicator values are read from each pair's
//! [`ReturnMetric`], non-finite values become `0.0`, normalised components
//! are z-scored per indicator across pairs (sample standard deviation),
//! then weighted into component scores and a final score. Pairs are sorted
//! by final score, descending, with ties kept in input order, and ranked
//! `1..=N`.

use crate::domain::error::FundingArbError;
use crate::domain::ranking_strategy::{normalized_weights, ComponentConfig, RankingStrategyConfig};
use crate::domain::returns::ReturnMetric;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Volatility penalty is `max(0, 1 - VOLATILITY_DAMPING * sigma)`.
pub const VOLATILITY_DAMPING: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRankingRecord {
    pub strategy_name: String,
    pub trading_pair: String,
    pub date: NaiveDate,
    pub rank_position: u32,
    pub final_score: f64,
    pub component_scores: BTreeMap<String, f64>,
    pub combination_detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientHistory { days: u32, minimum: u32 },
    NotComputable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPair {
    pub trading_pair: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct RankingOutcome {
    pub records: Vec<StrategyRankingRecord>,
    pub skipped: Vec<SkippedPair>,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). `None` below two values.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Cross-sectional z-scores. All zero when the spread is zero or undefined.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    match sample_std(values) {
        Some(std) if std > 0.0 && std.is_finite() => {
            let m = mean(values);
            values.iter().map(|v| (v - m) / std).collect()
        }
        _ => vec![0.0; values.len()],
    }
}

pub fn volatility_penalty(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 1.0;
    }
    (1.0 - VOLATILITY_DAMPING * population_std(values)).max(0.0)
}

fn is_computable(component: &ComponentConfig, metric: &ReturnMetric) -> bool {
    component
        .indicators
        .iter()
        .any(|ind| ind.value(metric).is_finite())
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Component scores for every pair, in input order.
fn score_component(component: &ComponentConfig, metrics: &[&ReturnMetric]) -> Vec<f64> {
    if component.indicators.is_empty() {
        return vec![0.0; metrics.len()];
    }
    let weights = normalized_weights(&component.weights).unwrap_or_default();

    // columns[j][i]: indicator j for pair i
    let columns: Vec<Vec<f64>> = component
        .indicators
        .iter()
        .map(|ind| {
            let raw: Vec<f64> = metrics.iter().map(|m| finite_or_zero(ind.value(m))).collect();
            if component.normalize { z_scores(&raw) } else { raw }
        })
        .collect();

    (0..metrics.len())
        .map(|i| {
            let row: Vec<f64> = columns.iter().map(|c| c[i]).collect();
            let score: f64 = row.iter().zip(&weights).map(|(v, w)| v * w).sum();
            if component.volatility_penalty {
                score * volatility_penalty(&row)
            } else {
                score
            }
        })
        .collect()
}

fn combination_detail(parts: &[(&str, f64, f64)], final_score: f64) -> String {
    let terms: Vec<String> = parts
        .iter()
        .map(|(name, score, weight)| format!("{name}({score:.6})*{weight:.3}"))
        .collect();
    format!("{} = {final_score:.6}", terms.join(" + "))
}

/// Rank the cross-section of `metrics` dated `date`.
///
/// Fails only on a malformed strategy. Pairs below the strategy's minimum
/// history, or with no computable component, come back in
/// [`RankingOutcome::skipped`].
pub fn rank(
    strategy: &RankingStrategyConfig,
    date: NaiveDate,
    metrics: &[ReturnMetric],
) -> Result<RankingOutcome, FundingArbError> {
    strategy.validate()?;

    let final_names = &strategy.final_combination.components;
    let final_weights = normalized_weights(&strategy.final_combination.weights).unwrap_or_default();
    let components: Vec<&ComponentConfig> = final_names
        .iter()
        .filter_map(|n| strategy.components.get(n))
        .collect();

    let mut skipped = Vec::new();
    let mut seen = HashSet::new();
    let mut included: Vec<&ReturnMetric> = Vec::new();

    for m in metrics.iter().filter(|m| m.date == date) {
        if !seen.insert(m.trading_pair.as_str()) {
            log::warn!("{}: duplicate metric on {date}, keeping the first", m.trading_pair);
            continue;
        }
        if m.history_days < strategy.min_history_days {
            log::warn!(
                "{}: skipping for {} ({} days of history, minimum {})",
                m.trading_pair,
                strategy.name,
                m.history_days,
                strategy.min_history_days
            );
            skipped.push(SkippedPair {
                trading_pair: m.trading_pair.clone(),
                reason: SkipReason::InsufficientHistory {
                    days: m.history_days,
                    minimum: strategy.min_history_days,
                },
            });
            continue;
        }
        if !components.iter().any(|c| is_computable(c, m)) {
            log::warn!("{}: no computable component for {}", m.trading_pair, strategy.name);
            skipped.push(SkippedPair {
                trading_pair: m.trading_pair.clone(),
                reason: SkipReason::NotComputable,
            });
            continue;
        }
        included.push(m);
    }

    let component_scores: Vec<Vec<f64>> = components
        .iter()
        .map(|c| score_component(c, &included))
        .collect();

    let mut scored: Vec<(usize, f64)> = (0..included.len())
        .map(|i| {
            let score = component_scores
                .iter()
                .zip(&final_weights)
                .map(|(scores, w)| scores[i] * w)
                .sum();
            (i, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let records = scored
        .into_iter()
        .enumerate()
        .map(|(pos, (i, final_score))| {
            let parts: Vec<(&str, f64, f64)> = final_names
                .iter()
                .zip(&component_scores)
                .zip(&final_weights)
                .map(|((name, scores), w)| (name.as_str(), scores[i], *w))
                .collect();
            StrategyRankingRecord {
                strategy_name: strategy.name.clone(),
                trading_pair: included[i].trading_pair.clone(),
                date,
                rank_position: pos as u32 + 1,
                final_score,
                component_scores: parts.iter().map(|(n, s, _)| (n.to_string(), *s)).collect(),
                combination_detail: combination_detail(&parts, final_score),
            }
        })
        .collect::<Vec<_>>();

    log::info!(
        "{} {date}: ranked {} pairs, skipped {}",
        strategy.name,
        records.len(),
        skipped.len()
    );

    Ok(RankingOutcome { records, skipped })
}

/// Rank every date present in `metrics`, oldest first.
pub fn rank_by_date(
    strategy: &RankingStrategyConfig,
    metrics: &[ReturnMetric],
) -> Result<Vec<(NaiveDate, RankingOutcome)>, FundingArbError> {
    let mut by_date: BTreeMap<NaiveDate, Vec<ReturnMetric>> = BTreeMap::new();
    for m in metrics {
        by_date.entry(m.date).or_default().push(m.clone());
    }
    by_date
        .into_iter()
        .map(|(date, day)| rank(strategy, date, &day).map(|outcome| (date, outcome)))
        .collect()
}
