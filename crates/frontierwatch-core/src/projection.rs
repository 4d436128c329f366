//! Linear growth projections from the daily history.

use serde::{Deserialize, Serialize};

use crate::estimate::recompute;
use crate::history::HistoryEntry;
use crate::stratum::{Baseline, u64_to_f64};

/// Daily ID growth assumed when history is too short to measure it.
pub const DEFAULT_DAILY_GROWTH: f64 = 400_000.0;

/// Projection horizons, in days.
pub const PROJECTION_HORIZONS_DAYS: [u32; 3] = [30, 90, 365];

/// Milestones are multiples of this many accounts.
pub const MILESTONE_STEP: u64 = 25_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub days: u32,
    pub projected_frontier: u64,
    pub projected_estimate: u64,
    /// Accounts added relative to the current estimate.
    pub growth: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthOutlook {
    pub current_frontier: u64,
    pub current_estimate: u64,
    /// Average new IDs per calendar day.
    pub avg_daily_growth: f64,
    /// Average new valid accounts per day at the frontier validity rate.
    pub avg_daily_accounts: f64,
    pub projections: Vec<Projection>,
    pub next_milestone: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_milestone: Option<u64>,
}

/// Average daily frontier growth across the whole history.
///
/// Measured over calendar days between the first and last entries so that
/// skipped days do not inflate the rate. Falls back to
/// [`DEFAULT_DAILY_GROWTH`] with fewer than two entries.
#[must_use]
pub fn average_daily_growth(entries: &[HistoryEntry]) -> f64 {
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return DEFAULT_DAILY_GROWTH;
    };
    let days = (last.date - first.date).num_days();
    if entries.len() < 2 || days <= 0 {
        return DEFAULT_DAILY_GROWTH;
    }
    #[allow(clippy::cast_precision_loss)]
    let days = days as f64;
    (u64_to_f64(last.frontier) - u64_to_f64(first.frontier)) / days
}

/// Project the latest entry forward. Returns `None` for an empty history.
#[must_use]
pub fn outlook(baseline: &Baseline, entries: &[HistoryEntry]) -> Option<GrowthOutlook> {
    let latest = entries.last()?;
    let avg_daily_growth = average_daily_growth(entries);
    let avg_daily_accounts = avg_daily_growth * baseline.frontier_stratum().p_hat;
    let current_estimate = recompute(baseline, latest.frontier).point_estimate;

    let projections = PROJECTION_HORIZONS_DAYS
        .iter()
        .map(|&days| {
            let advance = f64_to_u64((avg_daily_growth * f64::from(days)).round());
            let projected_frontier = latest.frontier.saturating_add(advance);
            let projected_estimate = recompute(baseline, projected_frontier).point_estimate;
            Projection {
                days,
                projected_frontier,
                projected_estimate,
                growth: projected_estimate.saturating_sub(current_estimate),
            }
        })
        .collect();

    let next_milestone = (current_estimate / MILESTONE_STEP + 1) * MILESTONE_STEP;
    let days_to_milestone = (avg_daily_accounts > 0.0).then(|| {
        let remaining = u64_to_f64(next_milestone - current_estimate);
        f64_to_u64((remaining / avg_daily_accounts).ceil())
    });

    Some(GrowthOutlook {
        current_frontier: latest.frontier,
        current_estimate,
        avg_daily_growth,
        avg_daily_accounts,
        projections,
        next_milestone,
        days_to_milestone,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u64(value: f64) -> u64 {
    if value <= 0.0 { 0 } else { value as u64 }
}
