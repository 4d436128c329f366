//! Population estimate recomputation for a live frontier.
//!
//! Every closed stratum keeps its baseline contribution; the frontier stratum
//! is stretched to `[start, frontier]` and contributes `size * p_hat`. The
//! computation is a pure function of `(baseline, frontier)`.
//!
//! A frontier below `frontier_stratum.start - 1` would yield a negative size.
//! It is clamped to an empty frontier stratum and flagged with a
//! [`FrontierAnomaly`] so callers can surface it instead of trusting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stratum::{Baseline, u64_to_f64};

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.96;

/// Anomalous frontier input detected while recomputing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrontierAnomaly {
    /// The frontier lies below the start of the frontier stratum; its
    /// contribution was clamped to zero.
    BelowFrontierStratum {
        /// Frontier that was supplied.
        frontier: u64,
        /// First ID of the frontier stratum.
        stratum_start: u64,
    },
    /// The frontier is lower than a previously recorded frontier.
    Regressed {
        /// Previously recorded frontier.
        previous: u64,
        /// Newly observed frontier.
        observed: u64,
    },
}

/// Result of [`recompute`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recomputed {
    /// Rounded population estimate.
    pub point_estimate: u64,
    /// Size of the frontier stratum after stretching to the frontier.
    pub frontier_stratum_size: u64,
    /// Unrounded contribution of the frontier stratum.
    pub frontier_contribution: f64,
    /// Set when the frontier had to be clamped.
    pub anomaly: Option<FrontierAnomaly>,
}

/// Analytic confidence interval around a point estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Standard error of the estimate.
    pub standard_error: f64,
    /// Lower bound, rounded and floored at zero.
    pub lower: u64,
    /// Upper bound, rounded.
    pub upper: u64,
}

/// Size of the frontier stratum when stretched to `frontier`, or `None`
/// when the frontier sits below the stratum start.
#[must_use]
pub fn frontier_stratum_size(baseline: &Baseline, frontier: u64) -> Option<u64> {
    let start = baseline.frontier_stratum().start;
    frontier.saturating_add(1).checked_sub(start)
}

/// Recompute the population estimate for `frontier`.
#[must_use]
pub fn recompute(baseline: &Baseline, frontier: u64) -> Recomputed {
    let stratum = baseline.frontier_stratum();
    let (size, anomaly) = match frontier_stratum_size(baseline, frontier) {
        Some(size) => (size, None),
        None => {
            warn!(
                frontier,
                stratum_start = stratum.start,
                "frontier below frontier stratum start; clamping contribution to zero"
            );
            (
                0,
                Some(FrontierAnomaly::BelowFrontierStratum {
                    frontier,
                    stratum_start: stratum.start,
                }),
            )
        }
    };

    let frontier_contribution = u64_to_f64(size) * stratum.p_hat;
    Recomputed {
        point_estimate: round_to_u64(baseline.closed_contribution() + frontier_contribution),
        frontier_stratum_size: size,
        frontier_contribution,
        anomaly,
    }
}

/// Analytic 95% confidence interval for the estimate at `frontier`.
///
/// `SE = sqrt(fixed_variance + size^2 * p(1-p)/n)` for the stretched frontier
/// stratum; the interval is `estimate ± 1.96 * SE`.
#[must_use]
pub fn confidence_interval(baseline: &Baseline, frontier: u64) -> ConfidenceInterval {
    let recomputed = recompute(baseline, frontier);
    let open_variance = baseline
        .frontier_stratum()
        .contribution_variance(recomputed.frontier_stratum_size);
    let standard_error = (baseline.fixed_variance() + open_variance).sqrt();
    let margin = Z_95 * standard_error;
    let estimate = u64_to_f64(recomputed.point_estimate);

    ConfidenceInterval {
        standard_error,
        lower: round_to_u64(estimate - margin),
        upper: round_to_u64(estimate + margin),
    }
}

/// Point-in-time estimate for a frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateSnapshot {
    pub frontier: u64,
    pub point_estimate: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_lower: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_upper: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<FrontierAnomaly>,
    pub timestamp: DateTime<Utc>,
}

impl EstimateSnapshot {
    /// Point estimate only (daily batch variant).
    #[must_use]
    pub fn point(baseline: &Baseline, frontier: u64, timestamp: DateTime<Utc>) -> Self {
        let recomputed = recompute(baseline, frontier);
        Self {
            frontier,
            point_estimate: recomputed.point_estimate,
            ci_lower: None,
            ci_upper: None,
            anomaly: recomputed.anomaly,
            timestamp,
        }
    }

    /// Point estimate plus analytic 95% interval (interactive variant).
    #[must_use]
    pub fn with_interval(baseline: &Baseline, frontier: u64, timestamp: DateTime<Utc>) -> Self {
        let interval = confidence_interval(baseline, frontier);
        let mut snapshot = Self::point(baseline, frontier, timestamp);
        snapshot.ci_lower = Some(interval.lower);
        snapshot.ci_upper = Some(interval.upper);
        snapshot
    }

    /// Flag the snapshot if its frontier is below a previously known one.
    ///
    /// An existing stratum anomaly takes precedence.
    #[must_use]
    pub fn flag_regression(mut self, previous: u64) -> Self {
        if self.anomaly.is_none() && self.frontier < previous {
            warn!(
                previous,
                observed = self.frontier,
                "frontier regressed below previously known value"
            );
            self.anomaly = Some(FrontierAnomaly::Regressed {
                previous,
                observed: self.frontier,
            });
        }
        self
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_u64(value: f64) -> u64 {
    if value <= 0.0 {
        0
    } else {
        value.round() as u64
    }
}
