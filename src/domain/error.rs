//! Domain error types.

/// A raw funding-rate value that could not be read as a number.
///
/// Never propagated out of the ingestion boundary: callers log it and
/// treat the leg as absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed rate {raw:?}: {reason}")]
pub struct MalformedValue {
    pub raw: String,
    pub reason: String,
}

/// Top-level error type for fundingarb.
#[derive(Debug, thiserror::Error)]
pub enum FundingArbError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("strategy {strategy}: component {component} references unknown indicator {indicator}")]
    UnknownIndicator {
        strategy: String,
        component: String,
        indicator: String,
    },

    #[error("invalid strategy {strategy}: {reason}")]
    StrategyInvalid { strategy: String, reason: String },

    #[error("no observations for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FundingArbError {
    /// True for errors caused by a strategy definition rather than data.
    pub fn is_strategy_error(&self) -> bool {
        matches!(
            self,
            FundingArbError::UnknownStrategy { .. }
                | FundingArbError::UnknownIndicator { .. }
                | FundingArbError::StrategyInvalid { .. }
        )
    }
}

impl From<&FundingArbError> for std::process::ExitCode {
    fn from(err: &FundingArbError) -> Self {
        let code: u8 = match err {
            FundingArbError::Io(_) => 1,
            FundingArbError::ConfigParse { .. }
            | FundingArbError::ConfigMissing { .. }
            | FundingArbError::ConfigInvalid { .. } => 2,
            FundingArbError::Database { .. } | FundingArbError::DatabaseQuery { .. } => 3,
            FundingArbError::UnknownStrategy { .. }
            | FundingArbError::UnknownIndicator { .. }
            | FundingArbError::StrategyInvalid { .. } => 4,
            FundingArbError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
