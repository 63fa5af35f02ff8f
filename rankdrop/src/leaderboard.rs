//! Leaderboard configuration types.
//!
//! A [`Leaderboard`] decides how scores are compared ([`SortOrder`]), how a
//! new submission combines with a player's existing entry
//! ([`ScoreStrategy`]), which values are accepted, and when the board is
//! reset. Configuration is owned outside the ranking engine and consulted
//! through the [`LeaderboardDirectory`] trait; [`MemoryLeaderboards`] is the
//! in-process implementation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LeaderboardError, Result, StorageError};

/// Direction in which scores are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    /// Lower values rank better (e.g. speedrun times).
    Asc,
    /// Higher values rank better.
    #[default]
    Desc,
}

impl SortOrder {
    /// Compares two score values, returning `Less` when `a` ranks better.
    ///
    /// Uses IEEE total ordering; `-0.0` and `0.0` compare equal.
    pub fn compare_scores(self, a: f64, b: f64) -> Ordering {
        let (a, b) = (normalize_zero(a), normalize_zero(b));
        match self {
            Self::Asc => a.total_cmp(&b),
            Self::Desc => b.total_cmp(&a),
        }
    }

    /// Returns `true` if `candidate` is strictly better than `current`.
    pub fn is_better(self, candidate: f64, current: f64) -> bool {
        self.compare_scores(candidate, current) == Ordering::Less
    }

    /// Maps a score onto an ascending key where smaller means better.
    pub(crate) fn directed(self, score: f64) -> f64 {
        let score = normalize_zero(score);
        match self {
            Self::Asc => score,
            Self::Desc => -score,
        }
    }
}

fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

/// How a submission combines with the player's existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreStrategy {
    /// One entry per player; replaced only by a strictly better score.
    #[default]
    BestOnly,
    /// Every submission creates a new entry.
    MultipleEntries,
    /// One entry per player; submissions are added to the running total.
    Cumulative,
}

impl ScoreStrategy {
    /// Returns `true` if the strategy keeps at most one entry per player.
    pub fn is_single_entry(self) -> bool {
        !matches!(self, Self::MultipleEntries)
    }
}

/// How often a leaderboard is reset automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetFrequency {
    /// Never reset automatically.
    #[default]
    None,
    /// Reset at every UTC midnight.
    Daily,
    /// Reset every Monday at 00:00 UTC.
    Weekly,
    /// Reset on the first day of every month at 00:00 UTC.
    Monthly,
}

impl ResetFrequency {
    /// Computes the next automatic reset strictly after `now`.
    ///
    /// - `Daily`: the next UTC midnight
    /// - `Weekly`: the next Monday 00:00 UTC (a week ahead when `now` is a Monday)
    /// - `Monthly`: the first day of the next month, 00:00 UTC
    /// - `None`: no further automatic resets
    ///
    /// # Examples
    ///
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use rankdrop::leaderboard::ResetFrequency;
    ///
    /// let now = Utc.with_ymd_and_hms(2024, 1, 31, 15, 30, 0).unwrap();
    /// let next = ResetFrequency::Monthly.next_reset_after(now).unwrap();
    /// assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    /// ```
    pub fn next_reset_after(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let next_day = match self {
            Self::None => return None,
            Self::Daily => today.checked_add_days(Days::new(1))?,
            Self::Weekly => {
                let until_monday = 7 - u64::from(today.weekday().num_days_from_monday());
                today.checked_add_days(Days::new(until_monday))?
            }
            Self::Monthly => {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)?
            }
        };
        Some(next_day.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

impl std::fmt::Display for ResetFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
        };
        f.write_str(name)
    }
}

/// Configuration of a single leaderboard.
///
/// # Example
///
/// ```rust
/// use rankdrop::leaderboard::{Leaderboard, ResetFrequency, ScoreStrategy, SortOrder};
///
/// let board = Leaderboard::new("speedrun-any", SortOrder::Asc, ScoreStrategy::BestOnly)
///     .with_display_name("Any% Speedrun")
///     .with_score_range(Some(0.0), Some(3600.0))
///     .with_reset(ResetFrequency::Weekly, true);
/// assert!(board.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    /// Unique key of the leaderboard.
    pub slug: String,

    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,

    /// Ranking direction.
    #[serde(default)]
    pub sort_order: SortOrder,

    /// Aggregation strategy for submissions.
    #[serde(default)]
    pub score_strategy: ScoreStrategy,

    /// Smallest accepted score, if bounded.
    #[serde(default)]
    pub min_score: Option<f64>,

    /// Largest accepted score, if bounded.
    #[serde(default)]
    pub max_score: Option<f64>,

    /// Automatic reset cadence.
    #[serde(default)]
    pub reset_frequency: ResetFrequency,

    /// Whether automatic resets archive entries before clearing them.
    #[serde(default)]
    pub archive_on_reset: bool,

    /// When the next automatic reset is due.
    #[serde(default)]
    pub next_reset_at: Option<DateTime<Utc>>,
}

impl Leaderboard {
    /// Creates an unbounded, never-resetting leaderboard.
    pub fn new(slug: impl Into<String>, sort_order: SortOrder, score_strategy: ScoreStrategy) -> Self {
        let slug = slug.into();
        Self {
            display_name: slug.clone(),
            slug,
            sort_order,
            score_strategy,
            min_score: None,
            max_score: None,
            reset_frequency: ResetFrequency::None,
            archive_on_reset: false,
            next_reset_at: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the accepted score range.
    #[must_use]
    pub fn with_score_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_score = min;
        self.max_score = max;
        self
    }

    /// Sets the automatic reset cadence and archive behaviour.
    #[must_use]
    pub fn with_reset(mut self, frequency: ResetFrequency, archive_on_reset: bool) -> Self {
        self.reset_frequency = frequency;
        self.archive_on_reset = archive_on_reset;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::InvalidConfig`] if the slug is blank, a
    /// bound is not finite, or the minimum exceeds the maximum.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> crate::error::RankError {
            LeaderboardError::InvalidConfig {
                slug: self.slug.clone(),
                reason: reason.to_string(),
            }
            .into()
        };

        if self.slug.trim().is_empty() {
            return Err(invalid("slug must not be empty"));
        }
        if self.slug.contains(['/', '?', '#', ' ']) {
            return Err(invalid("slug must not contain '/', '?', '#' or spaces"));
        }
        if self.min_score.is_some_and(|v| !v.is_finite())
            || self.max_score.is_some_and(|v| !v.is_finite())
        {
            return Err(invalid("score bounds must be finite"));
        }
        if let (Some(min), Some(max)) = (self.min_score, self.max_score)
            && min > max
        {
            return Err(invalid("min score must not exceed max score"));
        }

        Ok(())
    }
}

/// Read/write access to leaderboard configuration.
pub trait LeaderboardDirectory: Send + Sync {
    /// Looks up a leaderboard by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn get(&self, slug: &str) -> Result<Option<Leaderboard>>;

    /// Lists all leaderboards ordered by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn list(&self) -> Result<Vec<Leaderboard>>;

    /// Registers a new leaderboard.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::AlreadyExists`] for a duplicate slug and
    /// [`LeaderboardError::InvalidConfig`] for an invalid configuration.
    fn create(&self, leaderboard: Leaderboard) -> Result<Leaderboard>;

    /// Returns leaderboards whose next reset is due at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn due_for_reset(&self, now: DateTime<Utc>) -> Result<Vec<Leaderboard>>;

    /// Persists a new `next_reset_at` for a leaderboard.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::NotFound`] if the slug is unknown.
    fn set_next_reset(&self, slug: &str, next_reset_at: Option<DateTime<Utc>>) -> Result<()>;

    /// Changes a leaderboard's display name.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::NotFound`] if the slug is unknown.
    fn rename(&self, slug: &str, display_name: &str) -> Result<Leaderboard>;

    /// Removes a leaderboard's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::NotFound`] if the slug is unknown.
    fn delete(&self, slug: &str) -> Result<Leaderboard>;
}

/// Resolves a slug, failing with [`LeaderboardError::NotFound`] when unknown.
///
/// # Errors
///
/// Returns `NotFound` for an unknown slug or the directory's own error.
pub fn require(directory: &dyn LeaderboardDirectory, slug: &str) -> Result<Leaderboard> {
    directory.get(slug)?.ok_or_else(|| {
        LeaderboardError::NotFound {
            slug: slug.to_string(),
        }
        .into()
    })
}

/// In-process leaderboard directory.
#[derive(Debug, Default)]
pub struct MemoryLeaderboards {
    boards: RwLock<BTreeMap<String, Leaderboard>>,
}

impl MemoryLeaderboards {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from previously saved leaderboards.
    ///
    /// # Errors
    ///
    /// Returns an error if any leaderboard is invalid or slugs repeat.
    pub fn from_leaderboards(leaderboards: Vec<Leaderboard>) -> Result<Self> {
        let directory = Self::new();
        for leaderboard in leaderboards {
            directory.create(leaderboard)?;
        }
        Ok(directory)
    }

    /// Returns a copy of every leaderboard, ordered by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn to_vec(&self) -> Result<Vec<Leaderboard>> {
        self.list()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Leaderboard>>> {
        self.boards
            .read()
            .map_err(|_| StorageError::LockPoisoned { what: "leaderboards" }.into())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Leaderboard>>> {
        self.boards
            .write()
            .map_err(|_| StorageError::LockPoisoned { what: "leaderboards" }.into())
    }
}

impl LeaderboardDirectory for MemoryLeaderboards {
    fn get(&self, slug: &str) -> Result<Option<Leaderboard>> {
        Ok(self.read()?.get(slug).cloned())
    }

    fn list(&self) -> Result<Vec<Leaderboard>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn create(&self, leaderboard: Leaderboard) -> Result<Leaderboard> {
        leaderboard.validate()?;

        let mut boards = self.write()?;
        if boards.contains_key(&leaderboard.slug) {
            return Err(LeaderboardError::AlreadyExists {
                slug: leaderboard.slug,
            }
            .into());
        }
        boards.insert(leaderboard.slug.clone(), leaderboard.clone());
        Ok(leaderboard)
    }

    fn due_for_reset(&self, now: DateTime<Utc>) -> Result<Vec<Leaderboard>> {
        Ok(self
            .read()?
            .values()
            .filter(|lb| lb.next_reset_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }

    fn set_next_reset(&self, slug: &str, next_reset_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut boards = self.write()?;
        let board = boards.get_mut(slug).ok_or_else(|| LeaderboardError::NotFound {
            slug: slug.to_string(),
        })?;
        board.next_reset_at = next_reset_at;
        Ok(())
    }

    fn rename(&self, slug: &str, display_name: &str) -> Result<Leaderboard> {
        let mut boards = self.write()?;
        let board = boards.get_mut(slug).ok_or_else(|| LeaderboardError::NotFound {
            slug: slug.to_string(),
        })?;
        board.display_name = display_name.to_string();
        Ok(board.clone())
    }

    fn delete(&self, slug: &str) -> Result<Leaderboard> {
        self.write()?.remove(slug).ok_or_else(|| {
            LeaderboardError::NotFound {
                slug: slug.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_compare_scores_direction() {
        assert!(SortOrder::Desc.is_better(10.0, 5.0));
        assert!(!SortOrder::Desc.is_better(5.0, 10.0));
        assert!(SortOrder::Asc.is_better(5.0, 10.0));
        assert!(!SortOrder::Asc.is_better(5.0, 5.0));
        assert!(!SortOrder::Desc.is_better(5.0, 5.0));
        assert_eq!(SortOrder::Desc.compare_scores(0.0, -0.0), Ordering::Equal);
    }

    #[test]
    fn test_directed_key_orders_best_first() {
        let mut scores = vec![3.0, 9.0, 1.0];
        scores.sort_by(|a, b| SortOrder::Desc.directed(*a).total_cmp(&SortOrder::Desc.directed(*b)));
        assert_eq!(scores, vec![9.0, 3.0, 1.0]);

        scores.sort_by(|a, b| SortOrder::Asc.directed(*a).total_cmp(&SortOrder::Asc.directed(*b)));
        assert_eq!(scores, vec![1.0, 3.0, 9.0]);
    }

    #[test]
    fn test_next_reset_daily() {
        let now = at(2024, 2, 28, 23, 59);
        assert_eq!(ResetFrequency::Daily.next_reset_after(now), Some(at(2024, 2, 29, 0, 0)));

        let midnight = at(2024, 2, 29, 0, 0);
        assert_eq!(ResetFrequency::Daily.next_reset_after(midnight), Some(at(2024, 3, 1, 0, 0)));
    }

    #[test]
    fn test_next_reset_weekly() {
        // 2024-05-15 is a Wednesday
        let wednesday = at(2024, 5, 15, 10, 0);
        assert_eq!(ResetFrequency::Weekly.next_reset_after(wednesday), Some(at(2024, 5, 20, 0, 0)));

        // On a Monday the next reset is the following Monday
        let monday = at(2024, 5, 20, 0, 0);
        assert_eq!(ResetFrequency::Weekly.next_reset_after(monday), Some(at(2024, 5, 27, 0, 0)));

        let sunday = at(2024, 5, 26, 23, 0);
        assert_eq!(ResetFrequency::Weekly.next_reset_after(sunday), Some(at(2024, 5, 27, 0, 0)));
    }

    #[test]
    fn test_next_reset_monthly() {
        assert_eq!(
            ResetFrequency::Monthly.next_reset_after(at(2024, 12, 31, 22, 0)),
            Some(at(2025, 1, 1, 0, 0))
        );
        assert_eq!(
            ResetFrequency::Monthly.next_reset_after(at(2024, 6, 1, 0, 0)),
            Some(at(2024, 7, 1, 0, 0))
        );
        assert_eq!(ResetFrequency::None.next_reset_after(at(2024, 6, 1, 0, 0)), None);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let ok = Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly);
        assert!(ok.validate().is_ok());

        let blank = Leaderboard::new("  ", SortOrder::Desc, ScoreStrategy::BestOnly);
        assert!(blank.validate().is_err());

        let inverted = ok.clone().with_score_range(Some(10.0), Some(1.0));
        assert!(inverted.validate().is_err());

        let infinite = ok.clone().with_score_range(None, Some(f64::INFINITY));
        assert!(infinite.validate().is_err());

        let slashed = Leaderboard::new("a/b", SortOrder::Desc, ScoreStrategy::BestOnly);
        assert!(slashed.validate().is_err());
    }

    #[test]
    fn test_directory_create_and_conflict() {
        let directory = MemoryLeaderboards::new();
        directory
            .create(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly))
            .unwrap();

        let err = directory
            .create(Leaderboard::new("global", SortOrder::Asc, ScoreStrategy::Cumulative))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::RankError::Leaderboard(LeaderboardError::AlreadyExists { .. })
        ));

        assert_eq!(directory.list().unwrap().len(), 1);
        assert!(require(&directory, "global").is_ok());
        assert!(require(&directory, "missing").is_err());

        let renamed = directory.rename("global", "Season 2").unwrap();
        assert_eq!(renamed.display_name, "Season 2");
        assert!(directory.rename("missing", "x").is_err());

        directory.delete("global").unwrap();
        assert!(directory.delete("global").is_err());
        assert!(directory.list().unwrap().is_empty());
    }

    #[test]
    fn test_due_for_reset() {
        let directory = MemoryLeaderboards::new();
        let mut daily = Leaderboard::new("daily", SortOrder::Desc, ScoreStrategy::BestOnly)
            .with_reset(ResetFrequency::Daily, true);
        daily.next_reset_at = Some(at(2024, 1, 2, 0, 0));
        directory.create(daily).unwrap();
        directory
            .create(Leaderboard::new("forever", SortOrder::Desc, ScoreStrategy::BestOnly))
            .unwrap();

        assert!(directory.due_for_reset(at(2024, 1, 1, 23, 59)).unwrap().is_empty());
        let due = directory.due_for_reset(at(2024, 1, 2, 0, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].slug, "daily");

        directory.set_next_reset("daily", Some(at(2024, 1, 3, 0, 0))).unwrap();
        assert!(directory.due_for_reset(at(2024, 1, 2, 0, 0)).unwrap().is_empty());
        assert!(directory.set_next_reset("missing", None).is_err());
    }

    #[test]
    fn test_serde_wire_names() {
        let board = Leaderboard::new("global", SortOrder::Asc, ScoreStrategy::MultipleEntries);
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["sortOrder"], "ASC");
        assert_eq!(json["scoreStrategy"], "MULTIPLE_ENTRIES");
        assert_eq!(json["resetFrequency"], "NONE");

        let parsed: Leaderboard =
            serde_json::from_str(r#"{"slug":"weekly","scoreStrategy":"CUMULATIVE"}"#).unwrap();
        assert_eq!(parsed.sort_order, SortOrder::Desc);
        assert_eq!(parsed.score_strategy, ScoreStrategy::Cumulative);
    }
}
