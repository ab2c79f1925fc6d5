//! Core domain types and logic.

pub mod comparison;
pub mod config_validation;
pub mod differential;
pub mod error;
pub mod hour;
pub mod indicator;
pub mod observation;
pub mod pipeline;
pub mod range_planner;
pub mod rank_streaks;
pub mod ranking;
pub mod ranking_strategy;
pub mod returns;
pub mod trading_pair;
