//! Ranking indicators: named columns of a [`ReturnMetric`].
//!
//! An indicator is addressed either by its field name (`roi_7d`,
//! `return_all`) or by the legacy column spelling (`7d_ROI`,
//! `all_return`). Lookup is case-insensitive.

use crate::domain::returns::{ReturnMetric, ReturnWindow};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Measure {
    Return,
    Roi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Indicator {
    pub measure: Measure,
    pub window: ReturnWindow,
}

impl Indicator {
    pub const fn roi(window: ReturnWindow) -> Self {
        Self {
            measure: Measure::Roi,
            window,
        }
    }

    pub const fn ret(window: ReturnWindow) -> Self {
        Self {
            measure: Measure::Return,
            window,
        }
    }

    /// All twelve `ReturnMetric` columns.
    pub fn all() -> Vec<Indicator> {
        ReturnWindow::ALL
            .iter()
            .flat_map(|w| [Indicator::ret(*w), Indicator::roi(*w)])
            .collect()
    }

    pub fn value(&self, metric: &ReturnMetric) -> f64 {
        let (ret, roi) = metric.window(self.window);
        match self.measure {
            Measure::Return => ret,
            Measure::Roi => roi,
        }
    }

    /// Field name on [`ReturnMetric`], e.g. `roi_7d`.
    pub fn field_name(&self) -> String {
        let prefix = match self.measure {
            Measure::Return => "return",
            Measure::Roi => "roi",
        };
        format!("{prefix}_{}", self.window.label())
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown indicator: {0}")]
pub struct UnknownIndicatorName(pub String);

fn window_from_label(label: &str) -> Option<ReturnWindow> {
    ReturnWindow::ALL.into_iter().find(|w| w.label() == label)
}

fn measure_from_label(label: &str) -> Option<Measure> {
    match label {
        "return" => Some(Measure::Return),
        "roi" => Some(Measure::Roi),
        _ => None,
    }
}

impl FromStr for Indicator {
    type Err = UnknownIndicatorName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let unknown = || UnknownIndicatorName(s.trim().to_string());
        let (head, tail) = lower.split_once('_').ok_or_else(unknown)?;

        if let (Some(measure), Some(window)) = (measure_from_label(head), window_from_label(tail)) {
            return Ok(Self { measure, window });
        }
        if let (Some(window), Some(measure)) = (window_from_label(head), measure_from_label(tail)) {
            return Ok(Self { measure, window });
        }
        Err(unknown())
    }
}

impl Serialize for Indicator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.field_name())
    }
}

impl<'de> Deserialize<'de> for Indicator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
