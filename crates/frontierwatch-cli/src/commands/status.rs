use std::path::{Path, PathBuf};

use frontierwatch_core::{
    Baseline, FrontierResult, GrowthOutlook, HistoryEntry, HistoryLedger, outlook, recompute,
};
use serde::Serialize;

/// Snapshot of the ledger printed by `frontierwatch status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub history_path: PathBuf,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<HistoryEntry>,
    pub baseline_frontier: u64,
    pub baseline_estimate: u64,
    /// Absent until the first daily update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlook: Option<GrowthOutlook>,
}

#[must_use]
pub fn build_status(baseline: &Baseline, ledger: &HistoryLedger) -> StatusReport {
    let entries = ledger.entries();
    StatusReport {
        history_path: ledger.path().to_path_buf(),
        entries: entries.len(),
        first: entries.first().copied(),
        latest: ledger.latest().copied(),
        baseline_frontier: baseline.baseline_frontier(),
        baseline_estimate: recompute(baseline, baseline.baseline_frontier()).point_estimate,
        outlook: outlook(baseline, entries),
    }
}

/// Read the ledger (without locking) and summarize it.
///
/// # Errors
///
/// Returns `FrontierError::HistoryCorrupted` or `Io` if the ledger cannot be
/// read.
pub fn load_status(baseline: &Baseline, history_path: &Path) -> FrontierResult<StatusReport> {
    let ledger = HistoryLedger::load(history_path)?;
    Ok(build_status(baseline, &ledger))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use frontierwatch_core::{DEFAULT_DAILY_GROWTH, MILESTONE_STEP};
    use tempfile::TempDir;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    #[test]
    fn missing_ledger_reports_baseline_only() {
        let dir = TempDir::new().unwrap();
        let baseline = Baseline::bundled().unwrap();
        let report = load_status(&baseline, &dir.path().join("history.json")).unwrap();

        assert_eq!(report.entries, 0);
        assert!(report.latest.is_none());
        assert!(report.outlook.is_none());
        assert_eq!(report.baseline_frontier, 262_206_000);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("outlook").is_none());
    }

    #[test]
    fn single_entry_projects_with_default_growth() {
        let dir = TempDir::new().unwrap();
        let baseline = Baseline::bundled().unwrap();
        let mut ledger = HistoryLedger::load(&dir.path().join("history.json")).unwrap();
        ledger.upsert(day(1), 262_300_000, 0, 262_206_000).unwrap();

        let report = build_status(&baseline, &ledger);
        let outlook = report.outlook.unwrap();
        assert!((outlook.avg_daily_growth - DEFAULT_DAILY_GROWTH).abs() < f64::EPSILON);
        assert_eq!(outlook.current_frontier, 262_300_000);
        assert_eq!(outlook.projections.len(), 3);
        assert_eq!(outlook.next_milestone % MILESTONE_STEP, 0);
        assert!(outlook.next_milestone > outlook.current_estimate);
    }

    #[test]
    fn growth_is_measured_across_the_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let baseline = Baseline::bundled().unwrap();
        let mut ledger = HistoryLedger::load(&path).unwrap();
        ledger.upsert(day(1), 262_300_000, 0, 262_206_000).unwrap();
        ledger.upsert(day(3), 262_700_000, 0, 262_206_000).unwrap();
        ledger.upsert(day(5), 263_100_000, 0, 262_206_000).unwrap();
        ledger.save().unwrap();

        let report = load_status(&baseline, &path).unwrap();
        assert_eq!(report.entries, 3);
        assert_eq!(report.first.unwrap().date, day(1));
        assert_eq!(report.latest.unwrap().frontier, 263_100_000);
        let outlook = report.outlook.unwrap();
        assert!((outlook.avg_daily_growth - 200_000.0).abs() < 1e-6);
        assert!(outlook.days_to_milestone.is_some());
    }
}
