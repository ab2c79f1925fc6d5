//! Exchange pairs and the `symbol_exchangeA_exchangeB` trading-pair key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Two exchanges in canonical order (`exchange_a < exchange_b`), so a
/// mirrored pair never produces a second timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangePair {
    exchange_a: String,
    exchange_b: String,
}

impl ExchangePair {
    /// Returns `None` if both names are the same exchange.
    pub fn new(first: &str, second: &str) -> Option<Self> {
        let first = first.trim();
        let second = second.trim();
        if first == second {
            return None;
        }
        let (a, b) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        Some(Self {
            exchange_a: a.to_string(),
            exchange_b: b.to_string(),
        })
    }

    pub fn exchange_a(&self) -> &str {
        &self.exchange_a
    }

    pub fn exchange_b(&self) -> &str {
        &self.exchange_b
    }

    pub fn exchanges(&self) -> [&str; 2] {
        [&self.exchange_a, &self.exchange_b]
    }
}

impl fmt::Display for ExchangePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange_a, self.exchange_b)
    }
}

/// Every unordered pair of distinct exchanges, canonicalised and sorted.
pub fn exchange_pairs(exchanges: &[String]) -> Vec<ExchangePair> {
    let mut pairs = BTreeSet::new();
    for (i, a) in exchanges.iter().enumerate() {
        for b in &exchanges[i + 1..] {
            if let Some(pair) = ExchangePair::new(a, b) {
                pairs.insert(pair);
            }
        }
    }
    pairs.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradingPair {
    pub symbol: String,
    pub exchanges: ExchangePair,
}

impl TradingPair {
    pub fn new(symbol: impl Into<String>, exchanges: ExchangePair) -> Self {
        Self {
            symbol: symbol.into(),
            exchanges,
        }
    }

    /// Composite key, e.g. `BTCUSDT_binance_bybit`.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.symbol,
            self.exchanges.exchange_a(),
            self.exchanges.exchange_b()
        )
    }

    /// Inverse of [`TradingPair::key`]. Exchange names may not contain `_`;
    /// the symbol may.
    pub fn parse_key(key: &str) -> Option<Self> {
        let mut parts = key.rsplitn(3, '_');
        let b = parts.next()?;
        let a = parts.next()?;
        let symbol = parts.next()?;
        if symbol.is_empty() || a.is_empty() || b.is_empty() {
            return None;
        }
        let exchanges = ExchangePair::new(a, b)?;
        Some(Self::new(symbol, exchanges))
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
