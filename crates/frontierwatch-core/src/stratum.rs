//! Baseline stratification of the ID space.
//!
//! The baseline is the output of a one-time stratified sampling study: the ID
//! space is cut into contiguous strata, each with an observed validity rate.
//! All strata except the last are immutable facts. The last stratum (the
//! *frontier stratum*) is open-ended and is stretched to the live frontier on
//! every estimate refresh.
//!
//! A [`Baseline`] can only be obtained through validation, so a malformed
//! document (zero sample count, gaps between strata, inconsistent rates)
//! fails at load time instead of at estimate time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FrontierError, FrontierResult};

/// Baseline bundled with the crate (seven strata F1–F7).
const DEFAULT_BASELINE_JSON: &str = include_str!("../data/baseline.json");

/// Published rates carry six decimals; allow that rounding plus float noise.
const P_HAT_TOLERANCE: f64 = 1e-6;

/// Relative slack between `contribution` and `size * p_hat` caused by the
/// six-decimal rounding of `p_hat`.
const CONTRIBUTION_RELATIVE_TOLERANCE: f64 = 5e-7;

#[inline]
#[allow(clippy::cast_precision_loss)]
pub(crate) const fn u64_to_f64(value: u64) -> f64 {
    value as f64
}

/// One contiguous slice of the ID space with its sampled validity rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stratum {
    /// Stratum identifier (e.g. `F3`).
    pub id: String,
    /// Human-readable range label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// First ID of the stratum (inclusive).
    pub start: u64,
    /// Last ID of the stratum (inclusive). `None` only for the frontier stratum.
    #[serde(default)]
    pub end: Option<u64>,
    /// Number of IDs in the stratum at baseline time.
    pub size: u64,
    /// Number of IDs sampled.
    #[serde(rename = "n")]
    pub sample_count: u64,
    /// Number of sampled IDs that were valid accounts.
    #[serde(rename = "k")]
    pub valid_count: u64,
    /// Estimated validity rate, `valid_count / sample_count`.
    pub p_hat: f64,
    /// Estimated valid accounts in the stratum, `size * p_hat`.
    pub contribution: f64,
}

impl Stratum {
    /// Sampling variance of this stratum's contribution when it spans `size` IDs.
    #[must_use]
    pub fn contribution_variance(&self, size: u64) -> f64 {
        let size = u64_to_f64(size);
        size * size * self.p_hat * (1.0 - self.p_hat) / u64_to_f64(self.sample_count)
    }
}

/// Serialized baseline study as it appears on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineDocument {
    /// Frontier (max allocated ID) at the time of the study.
    pub frontier_m: u64,
    /// Overall standard error reported by the study, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_error: Option<f64>,
    /// Strata in ascending ID order; the last one is the frontier stratum.
    pub strata: Vec<Stratum>,
}

/// A validated baseline, ready to drive estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    document: BaselineDocument,
    closed_contribution: f64,
    fixed_variance: f64,
}

impl Baseline {
    /// Validate a baseline document.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::InvalidBaseline`] when any stratum violates
    /// the model invariants.
    pub fn new(document: BaselineDocument) -> FrontierResult<Self> {
        validate(&document)?;

        let (frontier, closed) = document
            .strata
            .split_last()
            .ok_or_else(|| FrontierError::baseline("<baseline>", "no strata defined"))?;

        let closed_contribution = closed.iter().map(|s| s.contribution).sum();
        let closed_variance: f64 = closed
            .iter()
            .map(|s| s.contribution_variance(s.size))
            .sum();

        let fixed_variance = match document.standard_error {
            Some(se) => {
                let original_open = frontier.contribution_variance(frontier.size);
                (se * se - original_open).max(0.0)
            }
            None => closed_variance,
        };

        Ok(Self {
            document,
            closed_contribution,
            fixed_variance,
        })
    }

    /// Parse and validate a baseline from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Serialization`] for malformed JSON and
    /// [`FrontierError::InvalidBaseline`] for invariant violations.
    pub fn from_json(json: &str) -> FrontierResult<Self> {
        let document: BaselineDocument =
            serde_json::from_str(json).map_err(|source| FrontierError::Serialization {
                context: "baseline".into(),
                source,
            })?;
        Self::new(document)
    }

    /// Load and validate a baseline file.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Io`] if the file cannot be read, otherwise as
    /// [`Baseline::from_json`].
    pub fn load(path: &Path) -> FrontierResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The baseline bundled with the crate.
    ///
    /// # Errors
    ///
    /// Only fails if the bundled document itself is invalid.
    pub fn bundled() -> FrontierResult<Self> {
        Self::from_json(DEFAULT_BASELINE_JSON)
    }

    /// All strata, frontier stratum last.
    #[must_use]
    pub fn strata(&self) -> &[Stratum] {
        &self.document.strata
    }

    /// The immutable, closed strata.
    #[must_use]
    pub fn closed_strata(&self) -> &[Stratum] {
        let strata = &self.document.strata;
        &strata[..strata.len() - 1]
    }

    /// The open-ended stratum that tracks the live frontier.
    #[must_use]
    pub fn frontier_stratum(&self) -> &Stratum {
        let strata = &self.document.strata;
        &strata[strata.len() - 1]
    }

    /// Sum of the closed strata contributions.
    #[must_use]
    pub const fn closed_contribution(&self) -> f64 {
        self.closed_contribution
    }

    /// Variance attributed to the closed strata.
    ///
    /// Derived from the study's reported standard error minus the original
    /// frontier-stratum variance when the study reports one, otherwise the
    /// stratified sum over the closed strata.
    #[must_use]
    pub const fn fixed_variance(&self) -> f64 {
        self.fixed_variance
    }

    /// Frontier recorded by the study; fallback seed for the first update.
    #[must_use]
    pub const fn baseline_frontier(&self) -> u64 {
        self.document.frontier_m
    }
}

fn validate(document: &BaselineDocument) -> FrontierResult<()> {
    if document.strata.is_empty() {
        return Err(FrontierError::baseline("<baseline>", "no strata defined"));
    }

    if let Some(se) = document.standard_error
        && !(se.is_finite() && se >= 0.0)
    {
        return Err(FrontierError::baseline(
            "<baseline>",
            format!("standard_error must be a non-negative number, got {se}"),
        ));
    }

    let last_index = document.strata.len() - 1;
    let mut previous_end: Option<u64> = None;

    for (index, stratum) in document.strata.iter().enumerate() {
        let id = stratum.id.as_str();

        if stratum.sample_count == 0 {
            return Err(FrontierError::baseline(id, "sample count n is zero"));
        }
        if stratum.valid_count > stratum.sample_count {
            return Err(FrontierError::baseline(
                id,
                format!(
                    "valid count k={} exceeds sample count n={}",
                    stratum.valid_count, stratum.sample_count
                ),
            ));
        }

        let observed = u64_to_f64(stratum.valid_count) / u64_to_f64(stratum.sample_count);
        if !stratum.p_hat.is_finite() || (stratum.p_hat - observed).abs() > P_HAT_TOLERANCE {
            return Err(FrontierError::baseline(
                id,
                format!("p_hat={} does not match k/n={observed:.6}", stratum.p_hat),
            ));
        }

        if let Some(previous_end) = previous_end
            && previous_end.checked_add(1) != Some(stratum.start)
        {
            return Err(FrontierError::baseline(
                id,
                format!(
                    "start={} is not contiguous with previous end={previous_end}",
                    stratum.start
                ),
            ));
        }

        match stratum.end {
            Some(end) => {
                if end < stratum.start {
                    return Err(FrontierError::baseline(
                        id,
                        format!("end={end} precedes start={}", stratum.start),
                    ));
                }
                let Some(span) = (end - stratum.start).checked_add(1) else {
                    return Err(FrontierError::baseline(
                        id,
                        format!("range {}..={end} overflows the ID space", stratum.start),
                    ));
                };
                if stratum.size != span {
                    return Err(FrontierError::baseline(
                        id,
                        format!("size={} does not match end-start+1={span}", stratum.size),
                    ));
                }
                previous_end = Some(end);
            }
            None if index == last_index => {}
            None => {
                return Err(FrontierError::baseline(
                    id,
                    "only the last (frontier) stratum may be open-ended",
                ));
            }
        }

        let expected = u64_to_f64(stratum.size) * stratum.p_hat;
        let slack = u64_to_f64(stratum.size).mul_add(CONTRIBUTION_RELATIVE_TOLERANCE, 1.0);
        if (stratum.contribution - expected).abs() > slack {
            return Err(FrontierError::baseline(
                id,
                format!(
                    "contribution={} differs from size*p_hat={expected:.1}",
                    stratum.contribution
                ),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stratum(id: &str, start: u64, end: Option<u64>, size: u64, n: u64, k: u64) -> Stratum {
        let p_hat = u64_to_f64(k) / u64_to_f64(n);
        Stratum {
            id: id.into(),
            label: None,
            start,
            end,
            size,
            sample_count: n,
            valid_count: k,
            p_hat,
            contribution: u64_to_f64(size) * p_hat,
        }
    }

    fn two_strata() -> BaselineDocument {
        BaselineDocument {
            frontier_m: 2_000,
            standard_error: None,
            strata: vec![
                stratum("A", 1, Some(1_000), 1_000, 100, 80),
                stratum("B", 1_001, Some(2_000), 1_000, 100, 50),
            ],
        }
    }

    #[test]
    fn bundled_baseline_is_valid() {
        let baseline = Baseline::bundled().expect("bundled baseline");
        assert_eq!(baseline.strata().len(), 7);
        assert_eq!(baseline.frontier_stratum().id, "F7");
        assert_eq!(baseline.frontier_stratum().start, 250_000_001);
        assert_eq!(baseline.frontier_stratum().end, None);
        assert_eq!(baseline.baseline_frontier(), 262_206_000);
        assert!((baseline.closed_contribution() - 204_003_745.0).abs() < 1e-6);
    }

    #[test]
    fn bundled_fixed_variance_excludes_open_stratum() {
        let baseline = Baseline::bundled().unwrap();
        let closed: f64 = baseline
            .closed_strata()
            .iter()
            .map(|s| s.contribution_variance(s.size))
            .sum();
        // Reported SE is the rounded stratified SE, so both derivations agree closely.
        let relative = (baseline.fixed_variance() - closed).abs() / closed;
        assert!(relative < 1e-4, "relative difference {relative}");
    }

    #[test]
    fn fixed_variance_without_reported_se_is_stratified_sum() {
        let baseline = Baseline::new(two_strata()).unwrap();
        let expected = 1_000.0 * 1_000.0 * 0.8 * 0.2 / 100.0;
        assert!((baseline.fixed_variance() - expected).abs() < 1e-9);
    }

    #[test]
    fn fixed_variance_is_floored_at_zero() {
        let mut doc = two_strata();
        doc.standard_error = Some(1.0);
        let baseline = Baseline::new(doc).unwrap();
        assert!(baseline.fixed_variance().abs() < f64::EPSILON);
    }

    #[test]
    fn zero_sample_count_fails_fast() {
        let mut doc = two_strata();
        doc.strata[0].sample_count = 0;
        let err = Baseline::new(doc).unwrap_err();
        assert!(matches!(err, FrontierError::InvalidBaseline { ref stratum, .. } if stratum == "A"));
        assert!(err.to_string().contains("zero"));
    }

    #[test]
    fn valid_count_above_sample_count_is_rejected() {
        let mut doc = two_strata();
        doc.strata[1].valid_count = 101;
        assert!(Baseline::new(doc).is_err());
    }

    #[test]
    fn inconsistent_p_hat_is_rejected() {
        let mut doc = two_strata();
        doc.strata[0].p_hat = 0.7;
        let err = Baseline::new(doc).unwrap_err();
        assert!(err.to_string().contains("p_hat"));
    }

    #[test]
    fn gap_between_strata_is_rejected() {
        let mut doc = two_strata();
        doc.strata[1].start = 1_005;
        doc.strata[1].size = 996;
        let err = Baseline::new(doc).unwrap_err();
        assert!(err.to_string().contains("contiguous"));
    }

    #[test]
    fn open_stratum_must_be_last() {
        let mut doc = two_strata();
        doc.strata[0].end = None;
        let err = Baseline::new(doc).unwrap_err();
        assert!(err.to_string().contains("open-ended"));
    }

    #[test]
    fn open_frontier_stratum_is_accepted() {
        let mut doc = two_strata();
        doc.strata[1].end = None;
        let baseline = Baseline::new(doc).unwrap();
        assert_eq!(baseline.frontier_stratum().end, None);
        assert_eq!(baseline.closed_strata().len(), 1);
    }

    #[test]
    fn size_must_match_range() {
        let mut doc = two_strata();
        doc.strata[0].size = 999;
        doc.strata[0].contribution = 999.0 * 0.8;
        assert!(Baseline::new(doc).is_err());
    }

    #[test]
    fn range_spanning_the_whole_id_space_is_an_error() {
        let mut doc = two_strata();
        doc.strata[0] = stratum("A", 0, Some(u64::MAX), 1_000, 100, 80);
        let err = Baseline::new(doc).unwrap_err();
        assert!(matches!(err, FrontierError::InvalidBaseline { ref stratum, .. } if stratum == "A"));
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn stratum_after_max_end_is_an_error() {
        let mut doc = two_strata();
        doc.strata[0] = stratum("A", 1, Some(u64::MAX), u64::MAX, 100, 80);
        let err = Baseline::new(doc).unwrap_err();
        assert!(matches!(err, FrontierError::InvalidBaseline { ref stratum, .. } if stratum == "B"));
        assert!(err.to_string().contains("contiguous"));
    }

    #[test]
    fn contribution_must_match_rate() {
        let mut doc = two_strata();
        doc.strata[0].contribution += 50.0;
        let err = Baseline::new(doc).unwrap_err();
        assert!(err.to_string().contains("contribution"));
    }

    #[test]
    fn empty_baseline_is_rejected() {
        let doc = BaselineDocument {
            frontier_m: 0,
            standard_error: None,
            strata: Vec::new(),
        };
        assert!(Baseline::new(doc).is_err());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = Baseline::from_json("{ not json").unwrap_err();
        assert!(matches!(err, FrontierError::Serialization { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, serde_json::to_string(&two_strata()).unwrap()).unwrap();
        let baseline = Baseline::load(&path).unwrap();
        assert_eq!(baseline.strata().len(), 2);
    }
}
