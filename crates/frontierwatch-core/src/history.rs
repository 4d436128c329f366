//! Append-only daily history of frontier and estimate.
//!
//! The ledger is a JSON array sorted by date with at most one entry per
//! calendar day. A second update on the same day overwrites the last entry;
//! earlier entries are never rewritten or reordered.
//!
//! Read-modify-write cycles must hold a [`LedgerLock`] so two daily runs
//! cannot interleave.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FrontierError, FrontierResult};

/// One day's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Calendar day (UTC) the entry belongs to.
    pub date: NaiveDate,
    /// Frontier found by that day's search.
    #[serde(rename = "frontier_id")]
    pub frontier: u64,
    /// Population estimate at that frontier.
    #[serde(rename = "estimated_total")]
    pub estimate: u64,
    /// Frontier growth relative to the preceding entry.
    #[serde(rename = "daily_new_ids")]
    pub delta: i64,
}

/// Whether an upsert added a day or replaced today's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Appended,
    Replaced,
}

/// Outcome of [`HistoryLedger::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub entry: HistoryEntry,
    pub action: UpsertAction,
}

/// In-memory view of the history file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLedger {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryLedger {
    /// Load the ledger at `path`. A missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::HistoryCorrupted`] if the file is not a valid
    /// ledger, or [`FrontierError::Io`] if it cannot be read.
    pub fn load(path: &Path) -> FrontierResult<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => parse_entries(path, &contents)?,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "history ledger missing; starting empty");
                Vec::new()
            }
            Err(error) => return Err(FrontierError::Io(error)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Frontier of the latest entry, or `fallback` for an empty ledger.
    #[must_use]
    pub fn last_frontier_or(&self, fallback: u64) -> u64 {
        self.latest().map_or(fallback, |entry| entry.frontier)
    }

    /// Record `frontier`/`estimate` for `date`.
    ///
    /// If the newest entry has the same date it is replaced, otherwise a new
    /// entry is appended. `delta` is measured against the entry preceding
    /// the written one, or against `fallback_previous` when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::HistoryOutOfOrder`] if `date` is older than
    /// the newest entry.
    pub fn upsert(
        &mut self,
        date: NaiveDate,
        frontier: u64,
        estimate: u64,
        fallback_previous: u64,
    ) -> FrontierResult<UpsertOutcome> {
        let action = match self.entries.last() {
            Some(last) if last.date == date => UpsertAction::Replaced,
            Some(last) if last.date > date => {
                return Err(FrontierError::HistoryOutOfOrder {
                    last: last.date.to_string(),
                    attempted: date.to_string(),
                });
            }
            _ => UpsertAction::Appended,
        };

        let preceding_index = match action {
            UpsertAction::Replaced => self.entries.len().checked_sub(2),
            UpsertAction::Appended => self.entries.len().checked_sub(1),
        };
        let previous_frontier =
            preceding_index.map_or(fallback_previous, |index| self.entries[index].frontier);

        let entry = HistoryEntry {
            date,
            frontier,
            estimate,
            delta: signed_delta(frontier, previous_frontier),
        };

        match action {
            UpsertAction::Replaced => {
                if let Some(last) = self.entries.last_mut() {
                    *last = entry;
                }
            }
            UpsertAction::Appended => self.entries.push(entry),
        }

        info!(
            date = %entry.date,
            frontier = entry.frontier,
            estimate = entry.estimate,
            delta = entry.delta,
            ?action,
            "history entry recorded"
        );

        Ok(UpsertOutcome { entry, action })
    }

    /// Persist the ledger atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Io`] on write failure.
    pub fn save(&self) -> FrontierResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            FrontierError::Serialization {
                context: "history".into(),
                source,
            }
        })?;
        json.push('\n');

        let tmp_path = sibling_path(&self.path, "tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(json.as_bytes())?;
            tmp.sync_all()?;
        }
        if let Err(error) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(FrontierError::Io(error));
        }

        debug!(path = %self.path.display(), entries = self.entries.len(), "history ledger saved");
        Ok(())
    }
}

/// Exclusive inter-process lock guarding a ledger's read-modify-write cycle.
///
/// Held on a sidecar `<ledger>.lock` file; released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Try to take the lock for the ledger at `ledger_path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::HistoryLocked`] if another process holds it,
    /// or [`FrontierError::Io`] if the lock file cannot be opened.
    pub fn acquire(ledger_path: &Path) -> FrontierResult<Self> {
        let path = sibling_path(ledger_path, "lock");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "ledger lock acquired");
                Ok(Self { file, path })
            }
            Err(error)
                if error.kind() == ErrorKind::WouldBlock
                    || error.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(FrontierError::HistoryLocked { path })
            }
            Err(error) => Err(FrontierError::Io(error)),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn parse_entries(path: &Path, contents: &str) -> FrontierResult<Vec<HistoryEntry>> {
    let entries: Vec<HistoryEntry> =
        serde_json::from_str(contents).map_err(|error| FrontierError::HistoryCorrupted {
            path: path.to_path_buf(),
            detail: error.to_string(),
        })?;

    if let Some(pair) = entries.windows(2).find(|pair| pair[0].date >= pair[1].date) {
        return Err(FrontierError::HistoryCorrupted {
            path: path.to_path_buf(),
            detail: format!(
                "entries not strictly ascending by date ({} then {})",
                pair[0].date, pair[1].date
            ),
        });
    }

    Ok(entries)
}

fn sibling_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[allow(clippy::cast_possible_wrap)]
const fn signed_delta(frontier: u64, previous: u64) -> i64 {
    if frontier >= previous {
        (frontier - previous) as i64
    } else {
        -((previous - frontier) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn ledger_in(dir: &tempfile::TempDir) -> HistoryLedger {
        HistoryLedger::load(&dir.path().join("history.json")).unwrap()
    }

    #[test]
    fn missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert!(ledger.entries().is_empty());
        assert_eq!(ledger.last_frontier_or(42), 42);
    }

    #[test]
    fn first_entry_delta_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger_in(&dir);
        let outcome = ledger.upsert(day(1), 1_500, 900, 1_000).unwrap();
        assert_eq!(outcome.action, UpsertAction::Appended);
        assert_eq!(outcome.entry.delta, 500);
    }

    #[test]
    fn same_day_overwrites_and_keeps_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger_in(&dir);
        ledger.upsert(day(1), 1_000, 800, 900).unwrap();
        ledger.upsert(day(2), 1_400, 1_100, 900).unwrap();
        let second = ledger.upsert(day(2), 1_600, 1_250, 900).unwrap();
        let third = ledger.upsert(day(2), 1_700, 1_300, 900).unwrap();

        assert_eq!(second.action, UpsertAction::Replaced);
        assert_eq!(third.action, UpsertAction::Replaced);
        assert_eq!(ledger.entries().len(), 2);
        let last = ledger.latest().unwrap();
        assert_eq!(last.frontier, 1_700);
        assert_eq!(last.estimate, 1_300);
        // Delta is measured against day 1, not the overwritten run.
        assert_eq!(last.delta, 700);
    }

    #[test]
    fn overwriting_only_entry_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger_in(&dir);
        ledger.upsert(day(1), 1_000, 800, 900).unwrap();
        let replaced = ledger.upsert(day(1), 1_050, 820, 900).unwrap();
        assert_eq!(replaced.entry.delta, 150);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn older_date_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger_in(&dir);
        ledger.upsert(day(5), 1_000, 800, 900).unwrap();
        let err = ledger.upsert(day(4), 1_100, 850, 900).unwrap_err();
        assert!(matches!(err, FrontierError::HistoryOutOfOrder { .. }));
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn negative_delta_is_representable() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ledger_in(&dir);
        ledger.upsert(day(1), 1_000, 800, 900).unwrap();
        let outcome = ledger.upsert(day(2), 990, 795, 900).unwrap();
        assert_eq!(outcome.entry.delta, -10);
    }

    #[test]
    fn save_then_load_preserves_entries_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let mut ledger = HistoryLedger::load(&path).unwrap();
        ledger.upsert(day(1), 262_206_000, 214_556_137, 262_000_000).unwrap();
        ledger.upsert(day(2), 262_606_000, 214_901_947, 262_000_000).unwrap();
        ledger.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"frontier_id\": 262206000"));
        assert!(raw.contains("\"daily_new_ids\": 400000"));
        assert!(raw.contains("\"date\": \"2026-03-01\""));
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = HistoryLedger::load(&path).unwrap();
        assert_eq!(reloaded.entries(), ledger.entries());
    }

    #[test]
    fn corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "[{\"date\": 12}]").unwrap();
        let err = HistoryLedger::load(&path).unwrap_err();
        assert!(matches!(err, FrontierError::HistoryCorrupted { .. }));
    }

    #[test]
    fn unsorted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[
  {"date": "2026-03-02", "frontier_id": 2, "estimated_total": 2, "daily_new_ids": 1},
  {"date": "2026-03-01", "frontier_id": 1, "estimated_total": 1, "daily_new_ids": 1}
]"#,
        )
        .unwrap();
        let err = HistoryLedger::load(&path).unwrap_err();
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn second_lock_is_refused_until_first_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let first = LedgerLock::acquire(&path).unwrap();
        assert!(first.path().ends_with("history.json.lock"));

        let err = LedgerLock::acquire(&path).unwrap_err();
        assert!(matches!(err, FrontierError::HistoryLocked { .. }));

        drop(first);
        assert!(LedgerLock::acquire(&path).is_ok());
    }
}
