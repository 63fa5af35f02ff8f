//! Score rows and their ranked views.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::leaderboard::SortOrder;

/// Storage identifier of a score entry.
pub type EntryId = u64;

/// A single stored score.
///
/// Entries refer to their leaderboard by slug only; the leaderboard never
/// holds references back to its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    /// Storage identifier, unique across the store.
    pub id: EntryId,
    /// Slug of the owning leaderboard.
    pub leaderboard_slug: String,
    /// Player the score belongs to.
    pub player_alias: String,
    /// The score (or running total for cumulative boards).
    pub score_value: f64,
    /// When the score was last written.
    pub submitted_at: DateTime<Utc>,
    /// Free-form client data attached to the submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl ScoreEntry {
    /// Compares two entries under the leaderboard ordering.
    ///
    /// Better score first; for equal scores the earlier submission first; for
    /// identical timestamps the lower id (earlier insert) first. `Less` means
    /// `self` ranks better than `other`.
    pub fn rank_cmp(&self, other: &Self, order: SortOrder) -> Ordering {
        order
            .compare_scores(self.score_value, other.score_value)
            .then_with(|| self.submitted_at.cmp(&other.submitted_at))
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Returns `true` if `self` ranks strictly better than `other`.
    pub fn ranks_before(&self, other: &Self, order: SortOrder) -> bool {
        self.rank_cmp(other, order) == Ordering::Less
    }
}

/// A score to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    /// Player the score belongs to.
    pub player_alias: String,
    /// The submitted value.
    pub score_value: f64,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Optional client data.
    pub metadata: Option<String>,
}

/// An entry together with its 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// The entry.
    #[serde(flatten)]
    pub entry: ScoreEntry,
    /// 1-based position under the leaderboard ordering.
    pub rank: u64,
}

impl RankedEntry {
    /// Pairs an entry with a rank.
    pub fn new(entry: ScoreEntry, rank: u64) -> Self {
        Self { entry, rank }
    }
}

/// Immutable copy of an entry taken when its leaderboard was reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreArchive {
    /// Slug of the leaderboard the entry was archived from.
    pub leaderboard_slug: String,
    /// Player the score belonged to.
    pub player_alias: String,
    /// The archived score.
    pub score_value: f64,
    /// When the score was last written before the reset.
    pub submitted_at: DateTime<Utc>,
    /// Client data carried over from the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// Label of the reset that produced this row.
    pub reset_label: String,
    /// When the reset happened.
    pub archived_at: DateTime<Utc>,
}

impl ScoreArchive {
    /// Copies `entry` into an archive row.
    pub fn from_entry(entry: ScoreEntry, reset_label: &str, archived_at: DateTime<Utc>) -> Self {
        Self {
            leaderboard_slug: entry.leaderboard_slug,
            player_alias: entry.player_alias,
            score_value: entry.score_value,
            submitted_at: entry.submitted_at,
            metadata: entry.metadata,
            reset_label: reset_label.to_string(),
            archived_at,
        }
    }
}

/// One archive snapshot: all rows sharing slug, label and archive time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    /// Leaderboard slug.
    pub leaderboard_slug: String,
    /// Reset label.
    pub reset_label: String,
    /// When the snapshot was taken.
    pub archived_at: DateTime<Utc>,
    /// Number of archived rows.
    pub entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(id: EntryId, score: f64, offset_secs: i64) -> ScoreEntry {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ScoreEntry {
            id,
            leaderboard_slug: "global".to_string(),
            player_alias: format!("P{id}"),
            score_value: score,
            submitted_at: base + Duration::seconds(offset_secs),
            metadata: None,
        }
    }

    #[test]
    fn test_rank_cmp_score_then_time_then_id() {
        let high = entry(1, 100.0, 10);
        let low = entry(2, 50.0, 0);
        assert!(high.ranks_before(&low, SortOrder::Desc));
        assert!(low.ranks_before(&high, SortOrder::Asc));

        // Equal score: earlier submission wins regardless of direction
        let early = entry(3, 70.0, 1);
        let late = entry(4, 70.0, 2);
        assert!(early.ranks_before(&late, SortOrder::Desc));
        assert!(early.ranks_before(&late, SortOrder::Asc));

        // Identical score and time: insertion order decides
        let first = entry(5, 70.0, 5);
        let second = entry(6, 70.0, 5);
        assert!(first.ranks_before(&second, SortOrder::Desc));
        assert_eq!(first.rank_cmp(&first, SortOrder::Desc), Ordering::Equal);
    }

    #[test]
    fn test_ranked_entry_serializes_flat() {
        let ranked = RankedEntry::new(entry(1, 42.0, 0), 3);
        let json = serde_json::to_value(&ranked).unwrap();
        assert_eq!(json["playerAlias"], "P1");
        assert_eq!(json["scoreValue"], 42.0);
        assert_eq!(json["rank"], 3);
        assert!(json.get("metadata").is_none());
    }
}
