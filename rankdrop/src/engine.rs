//! Score submission.
//!
//! [`RankEngine::submit`] resolves the leaderboard's [`ScoreStrategy`] and
//! performs exactly one storage-level write for it:
//!
//! | Strategy           | Write                                              |
//! |--------------------|----------------------------------------------------|
//! | `MultipleEntries`  | append a new row                                   |
//! | `BestOnly`         | conditional replace, insert if the player has none |
//! | `Cumulative`       | conditional add, insert if the player has none     |
//!
//! The engine itself never reads a row, modifies it, and writes it back;
//! conflicting writers for the same player are linearized by the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::TopCache;
use crate::clock::Clock;
use crate::entry::{EntryId, NewEntry, ScoreEntry};
use crate::error::{LeaderboardError, Result, SubmitError};
use crate::leaderboard::{self, Leaderboard, LeaderboardDirectory, ScoreStrategy};
use crate::notify::{NoopNotifier, Notifier, TopScoreEvent};
use crate::players::{OpenGate, PlayerGate};
use crate::store::{InsertMode, InsertOutcome, ScoreStore};

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// The player's stored row after the submission.
    pub entry: ScoreEntry,
    /// The row's rank after the submission.
    pub rank: u64,
    /// `false` when a `BestOnly` submission did not beat the stored score and
    /// nothing was written.
    pub recorded: bool,
}

/// Write path of the ranking engine.
pub struct RankEngine {
    directory: Arc<dyn LeaderboardDirectory>,
    store: Arc<dyn ScoreStore>,
    cache: Arc<TopCache>,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn PlayerGate>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for RankEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankEngine")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl RankEngine {
    /// Creates an engine that admits every player and sends no notifications.
    pub fn new(
        directory: Arc<dyn LeaderboardDirectory>,
        store: Arc<dyn ScoreStore>,
        cache: Arc<TopCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            store,
            cache,
            clock,
            gate: Arc::new(OpenGate),
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Sets the ban gate consulted before every submission.
    #[must_use]
    pub fn with_player_gate(mut self, gate: Arc<dyn PlayerGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Sets the receiver of top-score events.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Submits a score for a player.
    ///
    /// Checks run in this order: the leaderboard exists, the alias is not
    /// empty, the player is not banned, the value is finite and within the
    /// leaderboard's bounds. A submission that can change the cached top rows
    /// invalidates them and emits a [`TopScoreEvent`].
    ///
    /// # Errors
    ///
    /// - `LeaderboardError::NotFound` for an unknown slug
    /// - `SubmitError::PlayerBanned` for a banned player
    /// - `SubmitError::EmptyAlias`, `NonFiniteScore`, `BelowMinimum` or
    ///   `AboveMaximum` for rejected input
    /// - `SubmitError::Contended` if the player's row kept changing under a
    ///   `BestOnly` submission
    /// - any storage error
    pub fn submit(
        &self,
        slug: &str,
        player_alias: &str,
        value: f64,
        metadata: Option<String>,
    ) -> Result<Submission> {
        let leaderboard = leaderboard::require(self.directory.as_ref(), slug)?;

        if player_alias.trim().is_empty() {
            return Err(SubmitError::EmptyAlias.into());
        }
        if self.gate.is_banned(player_alias)? {
            return Err(SubmitError::PlayerBanned {
                alias: player_alias.to_string(),
            }
            .into());
        }
        check_value(&leaderboard, value)?;

        let now = self.clock.now();
        let (entry, recorded) = match leaderboard.score_strategy {
            ScoreStrategy::MultipleEntries => {
                let entry = self
                    .insert(&leaderboard, player_alias, value, now, metadata)?
                    .ok_or_else(|| SubmitError::Contended {
                        alias: player_alias.to_string(),
                    })?;
                (entry, true)
            }
            ScoreStrategy::BestOnly => self.submit_best_only(&leaderboard, player_alias, value, now, metadata)?,
            ScoreStrategy::Cumulative => (self.submit_cumulative(&leaderboard, player_alias, value, now, metadata)?, true),
        };

        // A delete that landed after the existence check has already swept
        // the partition, so the row written here would be orphaned
        if recorded && self.directory.get(slug)?.is_none() {
            self.store.remove(entry.id)?;
            debug!(slug, player = player_alias, "leaderboard deleted during submission");
            return Err(LeaderboardError::NotFound {
                slug: slug.to_string(),
            }
            .into());
        }

        let better = self.store.count_better(slug, leaderboard.sort_order, &entry)?;
        let rank = better + 1;

        if recorded {
            let in_top = better < self.cache.depth() as u64;
            // A cumulative delta that is not an improvement (zero included, it
            // refreshes submitted_at and so loses ties) can push a row out of
            // the cached range
            let may_leave_top = leaderboard.score_strategy == ScoreStrategy::Cumulative
                && !leaderboard.sort_order.is_better(value, 0.0);
            if in_top || may_leave_top {
                self.invalidate(slug);
            }
            if in_top {
                self.notifier.notify_top_score(TopScoreEvent {
                    leaderboard_slug: slug.to_string(),
                    player_alias: entry.player_alias.clone(),
                    score: entry.score_value,
                    rank,
                    timestamp: now,
                });
            }
        }

        debug!(slug, player = player_alias, value, rank, recorded, "score submitted");
        Ok(Submission { entry, rank, recorded })
    }

    /// Deletes a single score row and invalidates its leaderboard's cache.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::EntryNotFound` if no row has this id.
    pub fn remove_score(&self, id: EntryId) -> Result<ScoreEntry> {
        let entry = self
            .store
            .remove(id)?
            .ok_or(SubmitError::EntryNotFound { id })?;
        self.invalidate(&entry.leaderboard_slug);
        debug!(id, slug = %entry.leaderboard_slug, "score removed");
        Ok(entry)
    }

    /// Replace-if-strictly-better with a unique insert for first submissions.
    ///
    /// When a concurrent first submission wins the unique slot, the
    /// conditional update is retried once against the row it created.
    fn submit_best_only(
        &self,
        leaderboard: &Leaderboard,
        alias: &str,
        value: f64,
        now: DateTime<Utc>,
        metadata: Option<String>,
    ) -> Result<(ScoreEntry, bool)> {
        let slug = leaderboard.slug.as_str();
        let order = leaderboard.sort_order;

        for _ in 0..2 {
            let updated = self
                .store
                .update_if_better(slug, order, alias, value, now, metadata.as_deref())?;
            let current = self.store.best_for_player(slug, order, alias)?;

            match (updated, current) {
                (0, Some(existing)) => return Ok((existing, false)),
                (_, Some(entry)) => return Ok((entry, true)),
                (0, None) => {
                    if let Some(entry) =
                        self.insert(leaderboard, alias, value, now, metadata.clone())?
                    {
                        return Ok((entry, true));
                    }
                }
                // Updated, then removed before it could be read back
                (_, None) => break,
            }
        }

        Err(SubmitError::Contended {
            alias: alias.to_string(),
        }
        .into())
    }

    /// Atomic add with an insert for first submissions.
    fn submit_cumulative(
        &self,
        leaderboard: &Leaderboard,
        alias: &str,
        delta: f64,
        now: DateTime<Utc>,
        metadata: Option<String>,
    ) -> Result<ScoreEntry> {
        let slug = leaderboard.slug.as_str();
        let order = leaderboard.sort_order;

        for _ in 0..2 {
            if self.store.add_to_score(slug, order, alias, delta, now)? == 0 {
                if let Some(entry) =
                    self.insert(leaderboard, alias, delta, now, metadata.clone())?
                {
                    return Ok(entry);
                }
                // Lost the unique slot to a concurrent first submission
                continue;
            }
            if let Some(entry) = self.store.best_for_player(slug, order, alias)? {
                return Ok(entry);
            }
        }

        Err(SubmitError::Contended {
            alias: alias.to_string(),
        }
        .into())
    }

    /// Inserts a fresh row. Single-entry strategies insert only if the
    /// player has no row yet and yield `None` otherwise.
    fn insert(
        &self,
        leaderboard: &Leaderboard,
        alias: &str,
        value: f64,
        now: DateTime<Utc>,
        metadata: Option<String>,
    ) -> Result<Option<ScoreEntry>> {
        let mode = if leaderboard.score_strategy.is_single_entry() {
            InsertMode::UniquePerPlayer
        } else {
            InsertMode::Append
        };
        let outcome = self.store.insert(
            &leaderboard.slug,
            leaderboard.sort_order,
            NewEntry {
                player_alias: alias.to_string(),
                score_value: value,
                submitted_at: now,
                metadata,
            },
            mode,
        )?;
        Ok(match outcome {
            InsertOutcome::Inserted(entry) => Some(entry),
            InsertOutcome::PlayerExists => None,
        })
    }

    /// The write has already committed; a cache failure must not turn it
    /// into an error for the caller.
    fn invalidate(&self, slug: &str) {
        if let Err(e) = self.cache.invalidate(slug) {
            warn!(slug, error = %e, "failed to invalidate top cache");
        }
    }
}

/// Rejects non-finite values and values outside the leaderboard's bounds.
fn check_value(leaderboard: &Leaderboard, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SubmitError::NonFiniteScore { value }.into());
    }
    if let Some(min) = leaderboard.min_score
        && value < min
    {
        return Err(SubmitError::BelowMinimum { value, min }.into());
    }
    if let Some(max) = leaderboard.max_score
        && value > max
    {
        return Err(SubmitError::AboveMaximum { value, max }.into());
    }
    Ok(())
}
