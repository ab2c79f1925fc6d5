//! Rank persistence: how long a pair stays near the top once it gets there.
//!
//! A streak opens on a day the pair ranks at or above `entry` and is not
//! already inside a streak. It runs over consecutive calendar days while the
//! pair ranks at or above `stay`, and closes on the first day it drops below
//! `stay` or has no ranking.

use crate::domain::error::FundingArbError;
use crate::domain::ranking::StrategyRankingRecord;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakThresholds {
    entry: u32,
    stay: u32,
}

impl StreakThresholds {
    pub fn new(entry: u32, stay: u32) -> Result<Self, FundingArbError> {
        if entry == 0 || entry > stay {
            return Err(FundingArbError::ConfigInvalid {
                section: "streaks".to_string(),
                key: "entry".to_string(),
                reason: format!("need 1 <= entry <= stay, got entry={entry} stay={stay}"),
            });
        }
        Ok(Self { entry, stay })
    }

    pub fn entry(&self) -> u32 {
        self.entry
    }

    pub fn stay(&self) -> u32 {
        self.stay
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankStreak {
    pub strategy_name: String,
    pub trading_pair: String,
    /// 1-based count of this pair's streaks.
    pub event_number: u32,
    pub entry_date: NaiveDate,
    pub entry_rank: u32,
    pub exit_date: NaiveDate,
    pub exit_rank: u32,
    pub consecutive_days: u32,
    pub cumulative_days: u32,
}

impl RankStreak {
    pub fn event_id(&self) -> String {
        format!("{}_{}_({})", self.strategy_name, self.trading_pair, self.event_number)
    }
}

/// Streaks for one strategy's rankings, ordered by pair then entry date.
pub fn find_streaks(records: &[StrategyRankingRecord], thresholds: StreakThresholds) -> Vec<RankStreak> {
    let mut by_pair: BTreeMap<&str, BTreeMap<NaiveDate, &StrategyRankingRecord>> = BTreeMap::new();
    for r in records {
        by_pair
            .entry(r.trading_pair.as_str())
            .or_default()
            .entry(r.date)
            .or_insert(r);
    }

    let mut streaks = Vec::new();
    for (pair, days) in by_pair {
        let mut event_number = 0;
        let mut cumulative = 0;
        let mut open: Option<RankStreak> = None;

        for (date, record) in &days {
            let rank = record.rank_position;

            if let Some(streak) = open.as_mut() {
                let next_day = streak.exit_date.succ_opt();
                if next_day == Some(*date) && rank <= thresholds.stay {
                    streak.exit_date = *date;
                    streak.exit_rank = rank;
                    streak.consecutive_days += 1;
                    continue;
                }
                if let Some(done) = open.take() {
                    cumulative += done.consecutive_days;
                    streaks.push(RankStreak {
                        cumulative_days: cumulative,
                        ..done
                    });
                }
            }

            if rank <= thresholds.entry {
                event_number += 1;
                open = Some(RankStreak {
                    strategy_name: record.strategy_name.clone(),
                    trading_pair: pair.to_string(),
                    event_number,
                    entry_date: *date,
                    entry_rank: rank,
                    exit_date: *date,
                    exit_rank: rank,
                    consecutive_days: 1,
                    cumulative_days: 0,
                });
            }
        }

        if let Some(done) = open {
            cumulative += done.consecutive_days;
            streaks.push(RankStreak {
                cumulative_days: cumulative,
                ..done
            });
        }
    }
    streaks
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreakSummary {
    pub trading_pair: String,
    pub streaks: u32,
    pub total_days: u32,
    pub longest: u32,
}

/// Per-pair totals, longest cumulative time in the top first.
pub fn summarize_streaks(streaks: &[RankStreak]) -> Vec<StreakSummary> {
    let mut totals: HashMap<&str, StreakSummary> = HashMap::new();
    for s in streaks {
        let entry = totals
            .entry(s.trading_pair.as_str())
            .or_insert_with(|| StreakSummary {
                trading_pair: s.trading_pair.clone(),
                streaks: 0,
                total_days: 0,
                longest: 0,
            });
        entry.streaks += 1;
        entry.total_days += s.consecutive_days;
        entry.longest = entry.longest.max(s.consecutive_days);
    }
    let mut summary: Vec<StreakSummary> = totals.into_values().collect();
    summary.sort_by(|a, b| {
        b.total_days
            .cmp(&a.total_days)
            .then_with(|| a.trading_pair.cmp(&b.trading_pair))
    });
    summary
}
