//! Configuration validation.
//!
//! Checks the pipeline config before any store is opened or any work runs.

use crate::domain::error::FundingArbError;
use crate::ports::config_port::ConfigPort;
use std::collections::HashSet;

pub fn validate_pipeline_config(config: &dyn ConfigPort) -> Result<(), FundingArbError> {
    validate_sqlite_path(config)?;
    validate_pool_size(config)?;
    validate_exchanges(config)?;
    validate_symbols(config)?;
    validate_strategy_names(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FundingArbError {
    FundingArbError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Split a comma separated list. Empty tokens and duplicates (after
/// `normalize`) are rejected.
pub fn parse_list(
    input: &str,
    section: &str,
    key: &str,
    normalize: fn(&str) -> String,
) -> Result<Vec<String>, FundingArbError> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(invalid(section, key, "empty token in list"));
        }
        let item = normalize(trimmed);
        if !seen.insert(item.clone()) {
            return Err(invalid(section, key, format!("duplicate entry: {item}")));
        }
        items.push(item);
    }

    Ok(items)
}

pub fn parse_exchanges(input: &str) -> Result<Vec<String>, FundingArbError> {
    parse_list(input, "pipeline", "exchanges", |s| s.to_lowercase())
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, FundingArbError> {
    parse_list(input, "pipeline", "symbols", |s| s.to_uppercase())
}

fn validate_sqlite_path(config: &dyn ConfigPort) -> Result<(), FundingArbError> {
    match config.get_string("sqlite", "path") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(FundingArbError::ConfigMissing {
            section: "sqlite".to_string(),
            key: "path".to_string(),
        }),
    }
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), FundingArbError> {
    let value = config.get_int("sqlite", "pool_size", 4);
    if !(1..=64).contains(&value) {
        return Err(invalid("sqlite", "pool_size", "pool_size must be between 1 and 64"));
    }
    Ok(())
}

fn validate_exchanges(config: &dyn ConfigPort) -> Result<(), FundingArbError> {
    let raw = config
        .get_string("pipeline", "exchanges")
        .ok_or_else(|| FundingArbError::ConfigMissing {
            section: "pipeline".to_string(),
            key: "exchanges".to_string(),
        })?;
    let exchanges = parse_exchanges(&raw)?;
    if exchanges.len() < 2 {
        return Err(invalid(
            "pipeline",
            "exchanges",
            "at least two distinct exchanges are required",
        ));
    }
    if let Some(bad) = exchanges.iter().find(|e| e.contains('_')) {
        return Err(invalid(
            "pipeline",
            "exchanges",
            format!("exchange name {bad} may not contain '_'"),
        ));
    }
    Ok(())
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), FundingArbError> {
    if let Some(raw) = config.get_string("pipeline", "symbols") {
        parse_symbols(&raw)?;
    }
    Ok(())
}

fn validate_strategy_names(config: &dyn ConfigPort) -> Result<(), FundingArbError> {
    if let Some(raw) = config.get_string("pipeline", "strategies") {
        parse_list(&raw, "pipeline", "strategies", |s| s.to_lowercase())?;
    }
    Ok(())
}
