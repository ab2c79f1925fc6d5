//! Incremental range planning for differential refresh.
//!
//! Compares the hour extent of the source observations with the extent
//! already materialised and emits the windows still to compute. Emitted
//! windows never overlap each other or the existing extent, and together
//! with it they form one contiguous range covering the source. Reruns are
//! safe because the store upserts by key.

use crate::domain::hour::{one_hour, HourRange};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Nothing materialised yet.
    Full,
    /// Source starts before the existing result.
    Backfill,
    /// Source ends after the existing result.
    Append,
    /// Caller-supplied window.
    Requested,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindowKind::Full => "full",
            WindowKind::Backfill => "backfill",
            WindowKind::Append => "append",
            WindowKind::Requested => "requested",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanWindow {
    pub kind: WindowKind,
    pub range: HourRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Only what the existing result does not yet cover.
    Incremental,
    /// Recompute the whole source extent.
    Full,
    /// Recompute a caller window, clipped to the source extent and bridged
    /// to the existing result when they are not adjacent.
    Range(HourRange),
}

pub fn plan(source: HourRange, existing: Option<HourRange>) -> Vec<PlanWindow> {
    let Some(existing) = existing else {
        return vec![PlanWindow {
            kind: WindowKind::Full,
            range: source,
        }];
    };

    let mut windows = Vec::with_capacity(2);

    if source.start() < existing.start() {
        if let Some(range) = HourRange::new(source.start(), existing.start() - one_hour()) {
            windows.push(PlanWindow {
                kind: WindowKind::Backfill,
                range,
            });
        }
    }

    if source.end() > existing.end() {
        if let Some(range) = HourRange::new(existing.end() + one_hour(), source.end()) {
            windows.push(PlanWindow {
                kind: WindowKind::Append,
                range,
            });
        }
    }

    windows
}

pub fn plan_refresh(
    mode: RefreshMode,
    source: HourRange,
    existing: Option<HourRange>,
) -> Vec<PlanWindow> {
    match mode {
        RefreshMode::Incremental => plan(source, existing),
        RefreshMode::Full => vec![PlanWindow {
            kind: WindowKind::Full,
            range: source,
        }],
        RefreshMode::Range(requested) => plan_requested(requested, source, existing),
    }
}

/// The requested window clipped to `source`, plus whatever bridges it to
/// `existing` so the materialised extent stays contiguous.
fn plan_requested(requested: HourRange, source: HourRange, existing: Option<HourRange>) -> Vec<PlanWindow> {
    let Some(window) = requested.intersect(&source) else {
        return Vec::new();
    };
    let requested = PlanWindow {
        kind: WindowKind::Requested,
        range: window,
    };
    let Some(existing) = existing else {
        return vec![requested];
    };

    let mut windows = Vec::with_capacity(2);
    if window.end() + one_hour() < existing.start() {
        windows.push(requested);
        if let Some(range) = HourRange::new(window.end() + one_hour(), existing.start() - one_hour()) {
            windows.push(PlanWindow {
                kind: WindowKind::Backfill,
                range,
            });
        }
    } else if existing.end() + one_hour() < window.start() {
        if let Some(range) = HourRange::new(existing.end() + one_hour(), window.start() - one_hour()) {
            windows.push(PlanWindow {
                kind: WindowKind::Append,
                range,
            });
        }
        windows.push(requested);
    } else {
        windows.push(requested);
    }
    windows
}
