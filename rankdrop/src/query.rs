//! Rank queries: top-N, player-centered windows and paginated listings.
//!
//! A player's rank is `1 + number of rows strictly better`, counted by the
//! store. Windows around a player are two bounded range scans anchored at the
//! player's row, so their cost depends on the radius and not on the size of
//! the leaderboard.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::TopCache;
use crate::entry::{RankedEntry, ScoreEntry};
use crate::error::{QueryError, Result};
use crate::leaderboard::{self, Leaderboard, LeaderboardDirectory};
use crate::store::ScoreStore;

/// Rows around one player, best first with contiguous ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWindow {
    /// Rank of the first row.
    pub start_rank: u64,
    /// The rows.
    pub entries: Vec<RankedEntry>,
}

impl PlayerWindow {
    /// Returns the player's own row.
    pub fn center(&self, player_alias: &str) -> Option<&RankedEntry> {
        self.entries
            .iter()
            .find(|row| row.entry.player_alias == player_alias)
    }
}

/// Top rows and a player's window from one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Combined {
    /// Top rows.
    pub top: Vec<RankedEntry>,
    /// The player's window.
    pub player: PlayerWindow,
}

/// One page of a leaderboard's full listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Zero-based page number.
    pub page: usize,
    /// Effective page size after clamping.
    pub size: usize,
    /// Total rows on the leaderboard.
    pub total: u64,
    /// The rows of this page.
    pub entries: Vec<RankedEntry>,
}

/// Read path of the ranking engine.
pub struct RankQuery {
    directory: Arc<dyn LeaderboardDirectory>,
    store: Arc<dyn ScoreStore>,
    cache: Arc<TopCache>,
    max_page_size: usize,
}

impl std::fmt::Debug for RankQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankQuery")
            .field("max_page_size", &self.max_page_size)
            .finish_non_exhaustive()
    }
}

impl RankQuery {
    /// Creates a query service. Page sizes above `max_page_size` are clamped.
    pub fn new(
        directory: Arc<dyn LeaderboardDirectory>,
        store: Arc<dyn ScoreStore>,
        cache: Arc<TopCache>,
        max_page_size: usize,
    ) -> Self {
        Self {
            directory,
            store,
            cache,
            max_page_size,
        }
    }

    /// Returns the first `limit` rows of the cached top list.
    ///
    /// `limit` beyond the cache depth yields at most depth rows; bounds are
    /// enforced by API callers.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug, or a cache
    /// error under the propagate policy.
    pub fn top_n(&self, slug: &str, limit: usize) -> Result<Vec<RankedEntry>> {
        let leaderboard = leaderboard::require(self.directory.as_ref(), slug)?;
        let top = self.cache.get_top(&leaderboard)?;
        Ok(top.iter().take(limit).cloned().collect())
    }

    /// Returns a player's best row with up to `radius` neighbours on each
    /// side.
    ///
    /// The representative row is the player's best under the leaderboard
    /// ordering, for every strategy. With `radius == 0` only that row is
    /// returned. Near the edges of the leaderboard the window is shorter on
    /// the exhausted side.
    ///
    /// # Example
    ///
    /// With seven players scoring 700 down to 100, `P5` at rank 5 and a
    /// radius of 2 yields `P3..=P7` with `start_rank` 3.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug and
    /// `QueryError::PlayerNotFound` if the player has no row.
    pub fn player_window(&self, slug: &str, player_alias: &str, radius: usize) -> Result<PlayerWindow> {
        let leaderboard = leaderboard::require(self.directory.as_ref(), slug)?;
        self.window(&leaderboard, player_alias, radius)
    }

    /// Composition of [`RankQuery::top_n`] and [`RankQuery::player_window`].
    ///
    /// # Errors
    ///
    /// Fails if either part fails.
    pub fn combined(&self, slug: &str, top_limit: usize, player_alias: &str, radius: usize) -> Result<Combined> {
        let top = self.top_n(slug, top_limit)?;
        let player = self.player_window(slug, player_alias, radius)?;
        Ok(Combined { top, player })
    }

    /// Returns page `page` (zero-based) of the full listing.
    ///
    /// `size` is clamped to the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug and
    /// `QueryError::EmptyPage` when `size` is zero.
    pub fn page(&self, slug: &str, page: usize, size: usize) -> Result<Page> {
        let leaderboard = leaderboard::require(self.directory.as_ref(), slug)?;
        if size == 0 {
            return Err(QueryError::EmptyPage.into());
        }
        let size = size.min(self.max_page_size);
        let offset = page.saturating_mul(size);

        let rows = self
            .store
            .scan_ordered(slug, leaderboard.sort_order, offset, size)?;
        let total = self.store.count(slug)?;

        Ok(Page {
            page,
            size,
            total,
            entries: rank_from(rows, offset as u64 + 1),
        })
    }

    fn window(&self, leaderboard: &Leaderboard, player_alias: &str, radius: usize) -> Result<PlayerWindow> {
        let slug = leaderboard.slug.as_str();
        let order = leaderboard.sort_order;

        let center = self
            .store
            .best_for_player(slug, order, player_alias)?
            .ok_or_else(|| QueryError::PlayerNotFound {
                slug: slug.to_string(),
                alias: player_alias.to_string(),
            })?;
        let rank = self.store.count_better(slug, order, &center)? + 1;

        if radius == 0 {
            return Ok(PlayerWindow {
                start_rank: rank,
                entries: vec![RankedEntry::new(center, rank)],
            });
        }

        // Nearest first; flip to best first
        let mut better = self.store.scan_better(slug, order, &center, radius)?;
        better.reverse();
        let worse = self.store.scan_worse(slug, order, &center, radius)?;

        let start_rank = rank - better.len() as u64;
        let rows: Vec<ScoreEntry> = better
            .into_iter()
            .chain(std::iter::once(center))
            .chain(worse)
            .collect();

        Ok(PlayerWindow {
            start_rank,
            entries: rank_from(rows, start_rank),
        })
    }
}

fn rank_from(rows: Vec<ScoreEntry>, first: u64) -> Vec<RankedEntry> {
    rows.into_iter()
        .zip(first..)
        .map(|(entry, rank)| RankedEntry::new(entry, rank))
        .collect()
}
