//! Leaderboard resets and archive snapshots.
//!
//! A reset drains every row of a leaderboard in one store operation and, when
//! archiving is requested, copies the drained rows into the archive store
//! under a shared label and timestamp. If the archive write fails the drained
//! rows are put back, so a reset is either complete or has no effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::TopCache;
use crate::clock::Clock;
use crate::entry::{ArchiveSummary, ScoreArchive};
use crate::error::{ArchiveError, RankError, Result};
use crate::leaderboard::{self, LeaderboardDirectory, ResetFrequency};
use crate::store::{ArchiveStore, ScoreStore};

/// Outcome of one reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSummary {
    /// Leaderboard slug.
    pub slug: String,
    /// Rows removed from the live leaderboard.
    pub cleared: usize,
    /// Label the rows were archived under; `None` when not archived.
    pub archive_label: Option<String>,
    /// Time of the reset.
    pub reset_at: DateTime<Utc>,
    /// The recomputed next automatic reset.
    pub next_reset_at: Option<DateTime<Utc>>,
}

/// Result of one pass over due leaderboards.
#[derive(Debug, Default)]
pub struct DueResets {
    /// Resets that completed.
    pub completed: Vec<ResetSummary>,
    /// Resets that failed, by slug.
    pub failed: Vec<(String, RankError)>,
}

/// Resets leaderboards and serves archive snapshots.
pub struct ArchiveManager {
    directory: Arc<dyn LeaderboardDirectory>,
    scores: Arc<dyn ScoreStore>,
    archives: Arc<dyn ArchiveStore>,
    cache: Arc<TopCache>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ArchiveManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveManager").finish_non_exhaustive()
    }
}

impl ArchiveManager {
    /// Creates an archive manager.
    pub fn new(
        directory: Arc<dyn LeaderboardDirectory>,
        scores: Arc<dyn ScoreStore>,
        archives: Arc<dyn ArchiveStore>,
        cache: Arc<TopCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            scores,
            archives,
            cache,
            clock,
        }
    }

    /// Clears a leaderboard, optionally archiving its rows first.
    ///
    /// A blank or missing `label` becomes `"Auto-Reset <timestamp>"`. When
    /// the leaderboard has a reset frequency, its next reset is recomputed
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug, or the
    /// storage error that aborted the reset.
    pub fn reset(&self, slug: &str, archive: bool, label: Option<&str>) -> Result<ResetSummary> {
        let leaderboard = leaderboard::require(self.directory.as_ref(), slug)?;
        let now = self.clock.now();

        let rows = self.scores.take_all(slug)?;
        let cleared = rows.len();

        let archive_label = if archive {
            let label = label
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map_or_else(|| default_label(now), str::to_string);

            let archived: Vec<ScoreArchive> = rows
                .iter()
                .map(|entry| ScoreArchive::from_entry(entry.clone(), &label, now))
                .collect();
            if let Err(e) = self.archives.append(archived) {
                warn!(slug, error = %e, "archive write failed; restoring entries");
                self.scores.restore(slug, leaderboard.sort_order, rows)?;
                return Err(e);
            }
            Some(label)
        } else {
            None
        };

        let next_reset_at = leaderboard.reset_frequency.next_reset_after(now);
        if leaderboard.reset_frequency != ResetFrequency::None {
            self.directory.set_next_reset(slug, next_reset_at)?;
        }

        if let Err(e) = self.cache.invalidate(slug) {
            warn!(slug, error = %e, "failed to invalidate top cache after reset");
        }

        info!(
            slug,
            cleared,
            label = archive_label.as_deref().unwrap_or("-"),
            "leaderboard reset"
        );

        Ok(ResetSummary {
            slug: slug.to_string(),
            cleared,
            archive_label,
            reset_at: now,
            next_reset_at,
        })
    }

    /// Resets every leaderboard whose next reset is due.
    ///
    /// Each due leaderboard is reset independently with its
    /// `archive_on_reset` flag and the label
    /// `"Auto-Reset <FREQUENCY> <dd.mm.yyyy>"`. A failure is logged and
    /// recorded without stopping the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due leaderboards cannot be listed.
    pub fn run_due_resets(&self) -> Result<DueResets> {
        let now = self.clock.now();
        let mut outcome = DueResets::default();

        for leaderboard in self.directory.due_for_reset(now)? {
            let label = format!(
                "Auto-Reset {} {}",
                leaderboard.reset_frequency,
                now.format("%d.%m.%Y")
            );
            info!(slug = %leaderboard.slug, "processing automatic reset");

            match self.reset(&leaderboard.slug, leaderboard.archive_on_reset, Some(&label)) {
                Ok(summary) => outcome.completed.push(summary),
                Err(e) => {
                    error!(slug = %leaderboard.slug, error = %e, "automatic reset failed");
                    outcome.failed.push((leaderboard.slug, e));
                }
            }
        }

        Ok(outcome)
    }

    /// Lists archive snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive store cannot be read.
    pub fn archive_summaries(&self, slug: Option<&str>) -> Result<Vec<ArchiveSummary>> {
        self.archives.summaries(slug)
    }

    /// Returns up to `limit` rows of one snapshot, best first under the
    /// leaderboard's ordering.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::MissingLabel` for a blank label and
    /// `LeaderboardError::NotFound` for an unknown slug.
    pub fn archived_scores(&self, slug: &str, label: &str, limit: usize) -> Result<Vec<ScoreArchive>> {
        if label.trim().is_empty() {
            return Err(ArchiveError::MissingLabel.into());
        }
        let leaderboard = leaderboard::require(self.directory.as_ref(), slug)?;
        let order = leaderboard.sort_order;

        let mut rows = self.archives.rows(slug, label)?;
        rows.sort_by(|a, b| {
            order
                .compare_scores(a.score_value, b.score_value)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}

fn default_label(now: DateTime<Utc>) -> String {
    format!("Auto-Reset {}", now.format("%Y-%m-%dT%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ScoreEntry;
    use crate::error::StorageError;
    use crate::leaderboard::{Leaderboard, ScoreStrategy, SortOrder};
    use crate::store::MemoryStore;
    use crate::test_support::Fixture;
    use chrono::TimeZone;

    #[test]
    fn test_reset_with_archive() {
        let fx = Fixture::new();
        fx.board("global", SortOrder::Desc, ScoreStrategy::BestOnly);
        for (alias, value) in [("A", 100.0), ("B", 200.0)] {
            fx.engine.submit("global", alias, value, Some(format!("{alias}-meta"))).unwrap();
        }
        fx.query.top_n("global", 10).unwrap();

        let summary = fx.archive.reset("global", true, Some("S1")).unwrap();
        assert_eq!(summary.cleared, 2);
        assert_eq!(summary.archive_label.as_deref(), Some("S1"));

        assert_eq!(fx.store.count("global").unwrap(), 0);
        assert!(fx.query.top_n("global", 10).unwrap().is_empty());

        let summaries = fx.archive.archive_summaries(Some("global")).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].reset_label, "S1");
        assert_eq!(summaries[0].entry_count, 2);

        let rows = fx.archive.archived_scores("global", "S1", 10).unwrap();
        assert_eq!(rows[0].player_alias, "B");
        assert_eq!(rows[0].metadata.as_deref(), Some("B-meta"));
        assert!(rows.iter().all(|r| r.archived_at == summary.reset_at));
    }

    #[test]
    fn test_reset_without_archive_and_default_label() {
        let fx = Fixture::new();
        fx.board("global", SortOrder::Desc, ScoreStrategy::BestOnly);
        fx.engine.submit("global", "A", 1.0, None).unwrap();

        let summary = fx.archive.reset("global", false, Some("ignored")).unwrap();
        assert_eq!(summary.cleared, 1);
        assert!(summary.archive_label.is_none());
        assert!(fx.archive.archive_summaries(None).unwrap().is_empty());

        fx.engine.submit("global", "A", 1.0, None).unwrap();
        let summary = fx.archive.reset("global", true, Some("  ")).unwrap();
        let label = summary.archive_label.unwrap();
        assert!(label.starts_with("Auto-Reset 2024-"), "unexpected label {label}");
    }

    #[test]
    fn test_reset_unknown_board() {
        let fx = Fixture::new();
        let err = fx.archive.reset("missing", true, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_reset_recomputes_next_reset() {
        let fx = Fixture::new();
        fx.board_with(
            Leaderboard::new("daily", SortOrder::Desc, ScoreStrategy::BestOnly)
                .with_reset(ResetFrequency::Daily, true),
        );
        let summary = fx.archive.reset("daily", false, None).unwrap();
        let expected = ResetFrequency::Daily.next_reset_after(summary.reset_at);
        assert_eq!(summary.next_reset_at, expected);
        assert_eq!(fx.directory.get("daily").unwrap().unwrap().next_reset_at, expected);
    }

    #[test]
    fn test_run_due_resets() {
        let fx = Fixture::new();
        let start = fx.clock.peek();
        let mut due = Leaderboard::new("weekly", SortOrder::Desc, ScoreStrategy::Cumulative)
            .with_reset(ResetFrequency::Weekly, true);
        due.next_reset_at = Some(start);
        fx.board_with(due);
        let mut later = Leaderboard::new("monthly", SortOrder::Desc, ScoreStrategy::BestOnly)
            .with_reset(ResetFrequency::Monthly, true);
        later.next_reset_at = Some(start + chrono::Duration::days(40));
        fx.board_with(later);

        fx.engine.submit("weekly", "A", 5.0, None).unwrap();
        fx.engine.submit("monthly", "A", 5.0, None).unwrap();

        let outcome = fx.archive.run_due_resets().unwrap();
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.completed.len(), 1);
        let label = outcome.completed[0].archive_label.clone().unwrap();
        assert!(label.starts_with("Auto-Reset WEEKLY "), "unexpected label {label}");

        assert_eq!(fx.store.count("weekly").unwrap(), 0);
        assert_eq!(fx.store.count("monthly").unwrap(), 1);

        // Rescheduled into the future, so a second pass does nothing
        let next = fx.directory.get("weekly").unwrap().unwrap().next_reset_at.unwrap();
        assert!(next > start);
        assert!(fx.archive.run_due_resets().unwrap().completed.is_empty());
    }

    /// Archive store that always fails.
    struct BrokenArchive;

    impl ArchiveStore for BrokenArchive {
        fn append(&self, _rows: Vec<ScoreArchive>) -> Result<()> {
            Err(StorageError::Unavailable {
                reason: "disk full".to_string(),
            }
            .into())
        }
        fn summaries(&self, _slug: Option<&str>) -> Result<Vec<ArchiveSummary>> {
            Ok(Vec::new())
        }
        fn rows(&self, _slug: &str, _label: &str) -> Result<Vec<ScoreArchive>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_failed_archive_restores_entries() {
        let fx = Fixture::new();
        fx.board("global", SortOrder::Desc, ScoreStrategy::BestOnly);
        let first = fx.engine.submit("global", "A", 10.0, None).unwrap();
        fx.engine.submit("global", "B", 20.0, None).unwrap();

        let store: Arc<MemoryStore> = Arc::clone(&fx.store);
        let manager = ArchiveManager::new(
            fx.directory.clone(),
            store,
            Arc::new(BrokenArchive),
            Arc::clone(&fx.cache),
            fx.clock.clone(),
        );

        assert!(manager.reset("global", true, Some("S1")).is_err());
        assert_eq!(fx.store.count("global").unwrap(), 2);
        let restored: Option<ScoreEntry> = fx.store.get(first.entry.id).unwrap();
        assert_eq!(restored, Some(first.entry));
    }

    #[test]
    fn test_archived_scores_requires_label() {
        let fx = Fixture::new();
        fx.board("global", SortOrder::Desc, ScoreStrategy::BestOnly);
        assert!(matches!(
            fx.archive.archived_scores("global", " ", 10).unwrap_err(),
            RankError::Archive(ArchiveError::MissingLabel)
        ));
        assert!(fx.archive.archived_scores("global", "S9", 10).unwrap().is_empty());
    }

    #[test]
    fn test_default_label_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap();
        assert_eq!(default_label(now), "Auto-Reset 2024-03-09T07:05:03");
    }
}
