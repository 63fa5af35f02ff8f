//! Per-leaderboard cache of the top ranked entries.
//!
//! The cache is filled lazily on a miss by a bounded ordered scan and dropped
//! explicitly by writers; there is no TTL. Each slug carries a generation
//! that is replaced with a fresh, never reused value on every invalidation.
//! A fill records the generation it started under and is stored only if it
//! still matches, so a slow fill can never overwrite a newer invalidation
//! with stale rows. Deleted leaderboards are forgotten entirely, which keeps
//! the state bounded by the number of live leaderboards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::config::CacheFailurePolicy;
use crate::entry::RankedEntry;
use crate::error::{ErrorKind, Result, StorageError};
use crate::leaderboard::Leaderboard;
use crate::store::ScoreStore;

/// Ranked top rows of one leaderboard, best first.
pub type TopList = Arc<Vec<RankedEntry>>;

#[derive(Debug, Default)]
struct CacheState {
    lists: HashMap<String, TopList>,
    generations: HashMap<String, u64>,
    last_generation: u64,
}

impl CacheState {
    fn generation(&self, slug: &str) -> Option<u64> {
        self.generations.get(slug).copied()
    }

    fn bump(&mut self, slug: &str) -> u64 {
        self.last_generation += 1;
        self.generations.insert(slug.to_string(), self.last_generation);
        self.last_generation
    }
}

/// Cache-aside store of each leaderboard's top `depth` entries.
pub struct TopCache {
    store: Arc<dyn ScoreStore>,
    depth: usize,
    policy: CacheFailurePolicy,
    state: RwLock<CacheState>,
}

impl std::fmt::Debug for TopCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopCache")
            .field("depth", &self.depth)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TopCache {
    /// Creates an empty cache over `store`.
    pub fn new(store: Arc<dyn ScoreStore>, depth: usize, policy: CacheFailurePolicy) -> Self {
        Self {
            store,
            depth,
            policy,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Number of rows cached per leaderboard.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the top rows of `leaderboard`, filling the cache on a miss.
    ///
    /// Ranks are `1..=n` with no gaps. Repeated calls without an intervening
    /// invalidation return the same list.
    ///
    /// # Errors
    ///
    /// Under [`CacheFailurePolicy::Propagate`] a storage failure is returned.
    /// Under [`CacheFailurePolicy::DegradeToEmpty`] only `NotFound` errors are
    /// returned; other failures yield an empty, uncached list.
    pub fn get_top(&self, leaderboard: &Leaderboard) -> Result<TopList> {
        let slug = leaderboard.slug.as_str();

        let known = {
            let state = self.read_state()?;
            if let Some(list) = state.lists.get(slug) {
                return Ok(Arc::clone(list));
            }
            state.generation(slug)
        };
        // A slug is given a generation before its first fill so that a
        // concurrent forget is detected like any other invalidation
        let generation = match known {
            Some(generation) => generation,
            None => {
                let mut state = self.write_state()?;
                match state.generation(slug) {
                    Some(generation) => generation,
                    None => state.bump(slug),
                }
            }
        };

        let rows = match self
            .store
            .scan_ordered(slug, leaderboard.sort_order, 0, self.depth)
        {
            Ok(rows) => rows,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(e),
            Err(e) => match self.policy {
                CacheFailurePolicy::Propagate => return Err(e),
                CacheFailurePolicy::DegradeToEmpty => {
                    warn!(slug, error = %e, "top cache fill failed; serving empty list");
                    return Ok(Arc::new(Vec::new()));
                }
            },
        };

        let list: TopList = Arc::new(
            rows.into_iter()
                .zip(1u64..)
                .map(|(entry, rank)| RankedEntry::new(entry, rank))
                .collect(),
        );

        let mut state = self.write_state()?;
        if state.generation(slug) == Some(generation) {
            debug!(slug, rows = list.len(), "top cache filled");
            state.lists.insert(slug.to_string(), Arc::clone(&list));
        } else {
            debug!(slug, "discarding top cache fill raced by invalidation");
        }
        Ok(list)
    }

    /// Drops the cached list for `slug`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn invalidate(&self, slug: &str) -> Result<()> {
        let mut state = self.write_state()?;
        state.lists.remove(slug);
        state.bump(slug);
        debug!(slug, "top cache invalidated");
        Ok(())
    }

    /// Drops everything held for `slug`, including its generation. Used when
    /// a leaderboard is deleted; an in-flight fill for it is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn forget(&self, slug: &str) -> Result<()> {
        let mut state = self.write_state()?;
        state.lists.remove(slug);
        state.generations.remove(slug);
        debug!(slug, "top cache forgot leaderboard");
        Ok(())
    }

    /// Returns `true` if a list for `slug` is currently cached.
    pub fn is_cached(&self, slug: &str) -> bool {
        self.state
            .read()
            .map(|state| state.lists.contains_key(slug))
            .unwrap_or(false)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, CacheState>> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned { what: "top cache" }.into())
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, CacheState>> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned { what: "top cache" }.into())
    }
}
