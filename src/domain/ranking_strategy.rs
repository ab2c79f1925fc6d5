//! Ranking strategies as data.
//!
//! A strategy is a set of named components, each a weighted sum of
//! indicators with optional cross-sectional normalisation, plus a final
//! weighted combination of components. One evaluator in
//! [`crate::domain::ranking`] interprets every strategy, so adding one is a
//! config change only.

use crate::domain::error::FundingArbError;
use crate::domain::indicator::Indicator;
use crate::domain::returns::ReturnWindow;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_STRATEGY: &str = "original";

/// Section prefix for strategies in an INI strategy file.
pub const SECTION_PREFIX: &str = "ranking:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub indicators: Vec<Indicator>,
    pub weights: Vec<f64>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub volatility_penalty: bool,
}

impl ComponentConfig {
    pub fn new(terms: &[(Indicator, f64)], normalize: bool) -> Self {
        Self {
            indicators: terms.iter().map(|(i, _)| *i).collect(),
            weights: terms.iter().map(|(_, w)| *w).collect(),
            normalize,
            volatility_penalty: false,
        }
    }

    pub fn with_volatility_penalty(mut self) -> Self {
        self.volatility_penalty = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalCombination {
    pub components: Vec<String>,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingStrategyConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Pairs with fewer days of history are left out of the ranking.
    #[serde(default)]
    pub min_history_days: u32,
    pub components: BTreeMap<String, ComponentConfig>,
    pub final_combination: FinalCombination,
}

impl RankingStrategyConfig {
    /// Check shape: weight counts match, weight sums are usable, and the
    /// final combination only names defined components.
    pub fn validate(&self) -> Result<(), FundingArbError> {
        let invalid = |reason: String| FundingArbError::StrategyInvalid {
            strategy: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("strategy name is empty".into()));
        }

        for (name, component) in &self.components {
            if component.indicators.len() != component.weights.len() {
                return Err(invalid(format!(
                    "component {name} has {} indicators but {} weights",
                    component.indicators.len(),
                    component.weights.len()
                )));
            }
            if !component.indicators.is_empty() && normalized_weights(&component.weights).is_none() {
                return Err(invalid(format!("component {name} weights must have a non-zero finite sum")));
            }
        }

        let fc = &self.final_combination;
        if fc.components.is_empty() {
            return Err(invalid("final combination names no components".into()));
        }
        if fc.components.len() != fc.weights.len() {
            return Err(invalid(format!(
                "final combination has {} components but {} weights",
                fc.components.len(),
                fc.weights.len()
            )));
        }
        for name in &fc.components {
            if !self.components.contains_key(name) {
                return Err(invalid(format!("final combination references missing component {name}")));
            }
        }
        if normalized_weights(&fc.weights).is_none() {
            return Err(invalid("final weights must have a non-zero finite sum".into()));
        }

        Ok(())
    }
}

/// Scale weights to sum to one. `None` when the sum is zero or not finite.
pub fn normalized_weights(weights: &[f64]) -> Option<Vec<f64>> {
    let sum: f64 = weights.iter().sum();
    if weights.iter().any(|w| !w.is_finite()) || !sum.is_finite() || sum == 0.0 {
        return None;
    }
    Some(weights.iter().map(|w| w / sum).collect())
}

fn strategy(
    name: &str,
    description: &str,
    components: Vec<(&str, ComponentConfig)>,
    final_weights: &[f64],
) -> RankingStrategyConfig {
    let names: Vec<String> = components.iter().map(|(n, _)| n.to_string()).collect();
    RankingStrategyConfig {
        name: name.to_string(),
        description: description.to_string(),
        min_history_days: 0,
        components: components
            .into_iter()
            .map(|(n, c)| (n.to_string(), c))
            .collect(),
        final_combination: FinalCombination {
            components: names,
            weights: final_weights.to_vec(),
        },
    }
}

/// The strategies that ship with the tool, in listing order.
pub fn builtin_strategies() -> Vec<RankingStrategyConfig> {
    use ReturnWindow::*;
    let roi = Indicator::roi;

    vec![
        strategy(
            "original",
            "Equal-weighted long and short term normalised ROI",
            vec![
                (
                    "long_term_score",
                    ComponentConfig::new(
                        &[
                            (roi(D1), 1.0),
                            (roi(D2), 1.0),
                            (roi(D7), 1.0),
                            (roi(D14), 1.0),
                            (roi(D30), 1.0),
                            (roi(All), 1.0),
                        ],
                        true,
                    ),
                ),
                (
                    "short_term_score",
                    ComponentConfig::new(
                        &[(roi(D1), 1.0), (roi(D2), 1.0), (roi(D7), 1.0), (roi(D14), 1.0)],
                        true,
                    ),
                ),
            ],
            &[0.5, 0.5],
        ),
        strategy(
            "momentum_focused",
            "Weights recent returns over medium term",
            vec![
                (
                    "short_momentum",
                    ComponentConfig::new(&[(roi(D1), 0.6), (roi(D2), 0.4)], true),
                ),
                (
                    "medium_momentum",
                    ComponentConfig::new(&[(roi(D7), 0.6), (roi(D14), 0.4)], true),
                ),
            ],
            &[0.7, 0.3],
        ),
        strategy(
            "stability_focused",
            "Favours consistent long-run returns",
            vec![
                (
                    "consistency_score",
                    ComponentConfig::new(&[(roi(D14), 0.4), (roi(D30), 0.4), (roi(All), 0.2)], true),
                ),
                (
                    "recent_performance",
                    ComponentConfig::new(&[(roi(D1), 0.2), (roi(D2), 0.3), (roi(D7), 0.5)], true),
                ),
            ],
            &[0.6, 0.4],
        ),
        strategy(
            "adaptive",
            "Normalised ROI damped by cross-window volatility",
            vec![(
                "volatility_adjusted",
                ComponentConfig::new(&[(roi(D1), 0.3), (roi(D7), 0.4), (roi(D30), 0.3)], true)
                    .with_volatility_penalty(),
            )],
            &[1.0],
        ),
        strategy(
            "pure_short_term",
            "Daily ROI with a little two-day smoothing",
            vec![(
                "daily_focus",
                ComponentConfig::new(&[(roi(D1), 0.8), (roi(D2), 0.2)], true),
            )],
            &[1.0],
        ),
        strategy(
            "balanced",
            "Short, medium and full-history ROI blend",
            vec![
                (
                    "short_term",
                    ComponentConfig::new(&[(roi(D1), 0.5), (roi(D2), 0.3), (roi(D7), 0.2)], true),
                ),
                (
                    "medium_term",
                    ComponentConfig::new(&[(roi(D14), 0.6), (roi(D30), 0.4)], true),
                ),
                ("long_term", ComponentConfig::new(&[(roi(All), 1.0)], true)),
            ],
            &[0.5, 0.3, 0.2],
        ),
        strategy(
            "test_1",
            "Experimental: raw 1d ROI",
            vec![("ultra_short", ComponentConfig::new(&[(roi(D1), 1.0)], false))],
            &[1.0],
        ),
        strategy(
            "test_2",
            "Experimental: short/long split 80/20",
            vec![
                (
                    "short",
                    ComponentConfig::new(&[(roi(D1), 0.6), (roi(D2), 0.4)], true),
                ),
                (
                    "long",
                    ComponentConfig::new(&[(roi(D30), 0.7), (roi(All), 0.3)], true),
                ),
            ],
            &[0.8, 0.2],
        ),
        strategy(
            "test_3",
            "Experimental: long-weighted reverse momentum",
            vec![(
                "reverse_momentum",
                ComponentConfig::new(&[(roi(D1), 0.1), (roi(D7), 0.3), (roi(D30), 0.6)], true),
            )],
            &[1.0],
        ),
        strategy(
            "test_4",
            "Experimental: extreme short 90/10",
            vec![
                ("extreme_short", ComponentConfig::new(&[(roi(D1), 1.0)], true)),
                ("extreme_long", ComponentConfig::new(&[(roi(All), 1.0)], true)),
            ],
            &[0.9, 0.1],
        ),
        strategy(
            "test_simple_1d",
            "Experimental: 1d ROI, no normalisation",
            vec![("simple", ComponentConfig::new(&[(roi(D1), 1.0)], false))],
            &[1.0],
        ),
        strategy(
            "test_simple_avg",
            "Experimental: mean of 1d and 2d ROI",
            vec![(
                "simple_avg",
                ComponentConfig::new(&[(roi(D1), 0.5), (roi(D2), 0.5)], false),
            )],
            &[1.0],
        ),
        strategy(
            "test_normalize_1d",
            "Experimental: normalised 1d ROI",
            vec![("normalized", ComponentConfig::new(&[(roi(D1), 1.0)], true))],
            &[1.0],
        ),
        strategy(
            "test_weighted_simple",
            "Experimental: 70/30 1d and 2d ROI",
            vec![(
                "weighted",
                ComponentConfig::new(&[(roi(D1), 0.7), (roi(D2), 0.3)], false),
            )],
            &[1.0],
        ),
        strategy(
            "test_two_components",
            "Experimental: 1d and 2d as separate components",
            vec![
                ("comp_1d", ComponentConfig::new(&[(roi(D1), 1.0)], false)),
                ("comp_2d", ComponentConfig::new(&[(roi(D2), 1.0)], false)),
            ],
            &[0.6, 0.4],
        ),
    ]
}

/// Named strategies available to a run: built-ins, then any loaded from a
/// strategy file, which replace built-ins of the same name.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<RankingStrategyConfig>,
}

impl StrategyRegistry {
    pub fn builtin() -> Self {
        Self {
            strategies: builtin_strategies(),
        }
    }

    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn insert(&mut self, strategy: RankingStrategyConfig) {
        match self.strategies.iter_mut().find(|s| s.name == strategy.name) {
            Some(existing) => {
                log::info!("strategy {} overrides an earlier definition", strategy.name);
                *existing = strategy;
            }
            None => self.strategies.push(strategy),
        }
    }

    pub fn load_file(&mut self, config: &dyn ConfigPort) -> Result<usize, FundingArbError> {
        let loaded = load_strategies(config)?;
        let count = loaded.len();
        for s in loaded {
            self.insert(s);
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Result<&RankingStrategyConfig, FundingArbError> {
        let wanted = name.trim();
        self.strategies
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FundingArbError::UnknownStrategy {
                name: wanted.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankingStrategyConfig> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_weights(
    section: &str,
    key: &str,
    value: Option<String>,
    count: usize,
) -> Result<Vec<f64>, FundingArbError> {
    let Some(value) = value else {
        return Ok(vec![1.0; count]);
    };
    split_list(&value)
        .iter()
        .map(|w| {
            w.parse::<f64>().map_err(|_| FundingArbError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("weight {w:?} is not a number"),
            })
        })
        .collect()
}

fn load_component(
    config: &dyn ConfigPort,
    strategy: &str,
    component: &str,
    section: &str,
) -> Result<ComponentConfig, FundingArbError> {
    let raw = config
        .get_string(section, "indicators")
        .ok_or_else(|| FundingArbError::ConfigMissing {
            section: section.to_string(),
            key: "indicators".to_string(),
        })?;

    let indicators = split_list(&raw)
        .iter()
        .map(|name| {
            name.parse::<Indicator>()
                .map_err(|_| FundingArbError::UnknownIndicator {
                    strategy: strategy.to_string(),
                    component: component.to_string(),
                    indicator: name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let weights = parse_weights(
        section,
        "weights",
        config.get_string(section, "weights"),
        indicators.len(),
    )?;

    Ok(ComponentConfig {
        indicators,
        weights,
        normalize: config.get_bool(section, "normalize", false),
        volatility_penalty: config.get_bool(section, "volatility_penalty", false),
    })
}

/// Read every `[ranking:<name>]` strategy, with its
/// `[ranking:<name>.<component>]` sections, from an INI config.
/// Each strategy is validated before it is returned.
pub fn load_strategies(config: &dyn ConfigPort) -> Result<Vec<RankingStrategyConfig>, FundingArbError> {
    let sections = config.sections();
    let mut headers: Vec<&str> = Vec::new();
    let mut component_sections: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();

    for section in &sections {
        let Some(rest) = section.strip_prefix(SECTION_PREFIX) else {
            continue;
        };
        match rest.split_once('.') {
            Some((strategy, component)) => component_sections
                .entry(strategy)
                .or_default()
                .push((component, section.as_str())),
            None => headers.push(rest),
        }
    }

    let mut strategies = Vec::with_capacity(headers.len());
    for name in headers {
        let header = format!("{SECTION_PREFIX}{name}");

        let min_history = config.get_int(&header, "min_history_days", 0);
        let min_history_days = u32::try_from(min_history).map_err(|_| FundingArbError::ConfigInvalid {
            section: header.clone(),
            key: "min_history_days".to_string(),
            reason: "min_history_days must be non-negative".to_string(),
        })?;

        let final_components = config
            .get_string(&header, "final_components")
            .map(|v| split_list(&v))
            .ok_or_else(|| FundingArbError::ConfigMissing {
                section: header.clone(),
                key: "final_components".to_string(),
            })?;
        let final_weights = parse_weights(
            &header,
            "final_weights",
            config.get_string(&header, "final_weights"),
            final_components.len(),
        )?;

        let mut components = BTreeMap::new();
        for (component, section) in component_sections.get(name).into_iter().flatten() {
            components.insert(
                component.to_string(),
                load_component(config, name, component, section)?,
            );
        }

        let strategy = RankingStrategyConfig {
            name: name.to_string(),
            description: config.get_string(&header, "description").unwrap_or_default(),
            min_history_days,
            components,
            final_combination: FinalCombination {
                components: final_components,
                weights: final_weights,
            },
        };
        strategy.validate()?;
        log::debug!("loaded strategy {name} ({} components)", strategy.components.len());
        strategies.push(strategy);
    }

    for orphan in component_sections.keys() {
        if !strategies.iter().any(|s| s.name == *orphan) {
            log::warn!("component sections for {orphan} have no [{SECTION_PREFIX}{orphan}] header");
        }
    }

    Ok(strategies)
}
