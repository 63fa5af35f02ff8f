//! Score storage for the rankdrop ranking engine.
//!
//! The engine never performs read-modify-write cycles on score rows. Every
//! strategy-dependent write is a single conditional operation of the
//! [`ScoreStore`] trait, executed atomically by the store:
//!
//! - [`ScoreStore::update_if_better`] replaces a player's score only when the
//!   new value is strictly better under the leaderboard's [`SortOrder`]
//! - [`ScoreStore::add_to_score`] adds to a player's running total
//! - [`ScoreStore::insert`] with [`InsertMode::UniquePerPlayer`] inserts only
//!   if the player has no row yet
//!
//! Reads are bounded range scans over an ordered index, so rank windows never
//! sort the whole leaderboard.
//!
//! # Design
//!
//! [`MemoryStore`] keeps one partition per leaderboard:
//! - `entries`: id → row
//! - `index`: ordered set of rank keys, best first
//! - `players`: alias → ids of that player's rows
//!
//! Each partition sits behind its own `RwLock`, which linearizes writes for
//! the same `(slug, alias)` pair while different leaderboards proceed in
//! parallel. Archived rows live in the same store and are persisted with it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{ArchiveSummary, EntryId, NewEntry, ScoreArchive, ScoreEntry};
use crate::error::{Result, StorageError};
use crate::leaderboard::SortOrder;
use crate::persist;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Whether an insert may add a second row for the same player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Always insert a new row.
    Append,
    /// Insert only if the player has no row on the leaderboard.
    UniquePerPlayer,
}

/// Result of [`ScoreStore::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The row was inserted.
    Inserted(ScoreEntry),
    /// A unique insert found an existing row for the player; nothing written.
    PlayerExists,
}

/// Durable keyed storage for score rows.
///
/// All methods take the leaderboard's [`SortOrder`] because ordering is part
/// of the storage contract: conditional updates compare under it and scans
/// return rows in it.
pub trait ScoreStore: Send + Sync {
    /// Inserts a row, assigning a fresh id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn insert(&self, slug: &str, order: SortOrder, entry: NewEntry, mode: InsertMode) -> Result<InsertOutcome>;

    /// Atomically sets `score_value = value` and `submitted_at` on the
    /// player's row(s) whose current score is strictly worse than `value`.
    /// When `metadata` is `Some` it replaces the stored metadata of updated
    /// rows.
    ///
    /// Returns the number of rows affected; zero when the player has no row
    /// or the stored score is already as good or better.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn update_if_better(
        &self,
        slug: &str,
        order: SortOrder,
        player_alias: &str,
        value: f64,
        submitted_at: DateTime<Utc>,
        metadata: Option<&str>,
    ) -> Result<usize>;

    /// Atomically sets `score_value += delta` and `submitted_at` on the
    /// player's row(s). Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn add_to_score(
        &self,
        slug: &str,
        order: SortOrder,
        player_alias: &str,
        delta: f64,
        submitted_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Returns the player's best-ranked row, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn best_for_player(&self, slug: &str, order: SortOrder, player_alias: &str) -> Result<Option<ScoreEntry>>;

    /// Counts rows ranking strictly better than `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn count_better(&self, slug: &str, order: SortOrder, entry: &ScoreEntry) -> Result<u64>;

    /// Returns up to `limit` rows ranking immediately better than `entry`,
    /// nearest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn scan_better(&self, slug: &str, order: SortOrder, entry: &ScoreEntry, limit: usize) -> Result<Vec<ScoreEntry>>;

    /// Returns up to `limit` rows ranking immediately worse than `entry`,
    /// nearest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn scan_worse(&self, slug: &str, order: SortOrder, entry: &ScoreEntry, limit: usize) -> Result<Vec<ScoreEntry>>;

    /// Returns up to `limit` rows in rank order, skipping the first `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn scan_ordered(&self, slug: &str, order: SortOrder, offset: usize, limit: usize) -> Result<Vec<ScoreEntry>>;

    /// Counts the rows of a leaderboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn count(&self, slug: &str) -> Result<u64>;

    /// Looks up a row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn get(&self, id: EntryId) -> Result<Option<ScoreEntry>>;

    /// Deletes a row by id, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn remove(&self, id: EntryId) -> Result<Option<ScoreEntry>>;

    /// Atomically removes and returns every row of a leaderboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn take_all(&self, slug: &str) -> Result<Vec<ScoreEntry>>;

    /// Puts back rows previously returned by [`ScoreStore::take_all`],
    /// keeping their ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn restore(&self, slug: &str, order: SortOrder, entries: Vec<ScoreEntry>) -> Result<()>;
}

/// Storage for archive snapshots.
pub trait ArchiveStore: Send + Sync {
    /// Appends archived rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn append(&self, rows: Vec<ScoreArchive>) -> Result<()>;

    /// Summarizes snapshots, newest first, optionally for one leaderboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn summaries(&self, slug: Option<&str>) -> Result<Vec<ArchiveSummary>>;

    /// Returns every archived row with the given slug and label.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn rows(&self, slug: &str, reset_label: &str) -> Result<Vec<ScoreArchive>>;
}

/// Position of a row in a partition's index; smaller ranks better.
#[derive(Debug, Clone, Copy)]
struct RankKey {
    directed: f64,
    submitted_at: DateTime<Utc>,
    id: EntryId,
}

impl RankKey {
    fn of(entry: &ScoreEntry, order: SortOrder) -> Self {
        Self {
            directed: order.directed(entry.score_value),
            submitted_at: entry.submitted_at,
            id: entry.id,
        }
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.directed
            .total_cmp(&other.directed)
            .then_with(|| self.submitted_at.cmp(&other.submitted_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

/// All rows of one leaderboard.
#[derive(Debug)]
struct Partition {
    order: SortOrder,
    entries: HashMap<EntryId, ScoreEntry>,
    index: BTreeSet<RankKey>,
    players: HashMap<String, Vec<EntryId>>,
}

impl Partition {
    fn new(order: SortOrder) -> Self {
        Self {
            order,
            entries: HashMap::new(),
            index: BTreeSet::new(),
            players: HashMap::new(),
        }
    }

    fn insert(&mut self, entry: ScoreEntry) {
        self.index.insert(RankKey::of(&entry, self.order));
        self.players
            .entry(entry.player_alias.clone())
            .or_default()
            .push(entry.id);
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: EntryId) -> Option<ScoreEntry> {
        let entry = self.entries.remove(&id)?;
        self.index.remove(&RankKey::of(&entry, self.order));
        if let Some(ids) = self.players.get_mut(&entry.player_alias) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.players.remove(&entry.player_alias);
            }
        }
        Some(entry)
    }

    /// Applies `update` to the row, keeping the index in sync. The closure
    /// returns `false` to leave the row untouched.
    fn modify(&mut self, id: EntryId, update: impl FnOnce(&mut ScoreEntry) -> bool) -> bool {
        let order = self.order;
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        let old_key = RankKey::of(entry, order);
        if !update(entry) {
            return false;
        }
        let new_key = RankKey::of(entry, order);
        self.index.remove(&old_key);
        self.index.insert(new_key);
        true
    }

    fn player_ids(&self, alias: &str) -> Vec<EntryId> {
        self.players.get(alias).cloned().unwrap_or_default()
    }

    fn reorder(&mut self, order: SortOrder) {
        if self.order == order {
            return;
        }
        self.order = order;
        self.index = self
            .entries
            .values()
            .map(|entry| RankKey::of(entry, order))
            .collect();
    }

    fn resolve(&self, keys: impl Iterator<Item = RankKey>) -> Vec<ScoreEntry> {
        keys.filter_map(|key| self.entries.get(&key.id).cloned()).collect()
    }
}

/// In-process [`ScoreStore`] and [`ArchiveStore`].
///
/// # Thread Safety
///
/// `MemoryStore` is `Send + Sync`; share it behind an `Arc`. Conditional
/// writes hold the partition's write lock for their whole duration.
#[derive(Debug)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, Arc<RwLock<Partition>>>>,
    archives: RwLock<Vec<ScoreArchive>>,
    next_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version.
    pub version: u32,
    /// Next id to assign.
    pub next_id: u64,
    /// Live rows per leaderboard.
    pub partitions: Vec<PartitionSnapshot>,
    /// Archived rows.
    pub archives: Vec<ScoreArchive>,
}

/// Serialized rows of one leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSnapshot {
    /// Leaderboard slug.
    pub slug: String,
    /// Ordering the rows were indexed with.
    pub sort_order: SortOrder,
    /// The rows.
    pub entries: Vec<ScoreEntry>,
}

fn poisoned(what: &'static str) -> StorageError {
    StorageError::LockPoisoned { what }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            archives: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] for an unsupported snapshot
    /// version.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::Unavailable {
                reason: format!(
                    "unsupported snapshot version: expected {SNAPSHOT_VERSION}, found {}",
                    snapshot.version
                ),
            }
            .into());
        }

        let mut max_id = 0;
        let mut partitions = HashMap::with_capacity(snapshot.partitions.len());
        for part in snapshot.partitions {
            let mut partition = Partition::new(part.sort_order);
            for entry in part.entries {
                max_id = max_id.max(entry.id);
                partition.insert(entry);
            }
            partitions.insert(part.slug, Arc::new(RwLock::new(partition)));
        }

        Ok(Self {
            partitions: RwLock::new(partitions),
            archives: RwLock::new(snapshot.archives),
            next_id: AtomicU64::new(snapshot.next_id.max(max_id + 1)),
        })
    }

    /// Captures the current contents.
    ///
    /// Partitions are copied one at a time; a snapshot taken under
    /// concurrent writes is consistent per leaderboard, not globally.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let handles: Vec<(String, Arc<RwLock<Partition>>)> = self
            .partitions
            .read()
            .map_err(|_| poisoned("partitions"))?
            .iter()
            .map(|(slug, part)| (slug.clone(), Arc::clone(part)))
            .collect();

        let mut partitions = Vec::with_capacity(handles.len());
        for (slug, handle) in handles {
            let part = handle.read().map_err(|_| poisoned("partition"))?;
            let mut entries: Vec<ScoreEntry> = part.resolve(part.index.iter().copied());
            entries.shrink_to_fit();
            partitions.push(PartitionSnapshot {
                slug,
                sort_order: part.order,
                entries,
            });
        }
        partitions.sort_by(|a, b| a.slug.cmp(&b.slug));

        let archives = self.archives.read().map_err(|_| poisoned("archives"))?.clone();

        Ok(StoreSnapshot {
            version: SNAPSHOT_VERSION,
            next_id: self.next_id.load(AtomicOrdering::SeqCst),
            partitions,
            archives,
        })
    }

    /// Loads a store from a JSON snapshot file, or returns an empty store if
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_new<P: AsRef<Path>>(path: P) -> Result<Self> {
        match persist::load_json::<StoreSnapshot>(path.as_ref())? {
            Some(snapshot) => Self::from_snapshot(snapshot),
            None => Ok(Self::new()),
        }
    }

    /// Writes a JSON snapshot to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persist::save_json(path.as_ref(), &self.snapshot()?)
    }

    fn lookup(&self, slug: &str) -> Result<Option<Arc<RwLock<Partition>>>> {
        Ok(self
            .partitions
            .read()
            .map_err(|_| poisoned("partitions"))?
            .get(slug)
            .cloned())
    }

    fn lookup_or_create(&self, slug: &str, order: SortOrder) -> Result<Arc<RwLock<Partition>>> {
        if let Some(part) = self.lookup(slug)? {
            return Ok(part);
        }
        let mut partitions = self.partitions.write().map_err(|_| poisoned("partitions"))?;
        Ok(Arc::clone(
            partitions
                .entry(slug.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Partition::new(order)))),
        ))
    }

    /// Runs `f` against the partition under a read lock, re-indexing first if
    /// the partition was built for another ordering.
    fn read_partition<T>(&self, slug: &str, order: SortOrder, f: impl FnOnce(&Partition) -> T) -> Result<Option<T>> {
        let Some(handle) = self.lookup(slug)? else {
            return Ok(None);
        };
        {
            let part = handle.read().map_err(|_| poisoned("partition"))?;
            if part.order == order {
                return Ok(Some(f(&part)));
            }
        }
        let mut part = handle.write().map_err(|_| poisoned("partition"))?;
        part.reorder(order);
        Ok(Some(f(&part)))
    }

    fn write_partition<T>(&self, slug: &str, order: SortOrder, f: impl FnOnce(&mut Partition) -> T) -> Result<Option<T>> {
        let Some(handle) = self.lookup(slug)? else {
            return Ok(None);
        };
        let mut part = handle.write().map_err(|_| poisoned("partition"))?;
        part.reorder(order);
        Ok(Some(f(&mut part)))
    }

    fn partition_handles(&self) -> Result<Vec<Arc<RwLock<Partition>>>> {
        Ok(self
            .partitions
            .read()
            .map_err(|_| poisoned("partitions"))?
            .values()
            .cloned()
            .collect())
    }
}

impl ScoreStore for MemoryStore {
    fn insert(&self, slug: &str, order: SortOrder, entry: NewEntry, mode: InsertMode) -> Result<InsertOutcome> {
        let handle = self.lookup_or_create(slug, order)?;
        let mut part = handle.write().map_err(|_| poisoned("partition"))?;
        part.reorder(order);

        if mode == InsertMode::UniquePerPlayer && part.players.contains_key(&entry.player_alias) {
            return Ok(InsertOutcome::PlayerExists);
        }

        let stored = ScoreEntry {
            id: self.next_id.fetch_add(1, AtomicOrdering::SeqCst),
            leaderboard_slug: slug.to_string(),
            player_alias: entry.player_alias,
            score_value: entry.score_value,
            submitted_at: entry.submitted_at,
            metadata: entry.metadata,
        };
        part.insert(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    fn update_if_better(
        &self,
        slug: &str,
        order: SortOrder,
        player_alias: &str,
        value: f64,
        submitted_at: DateTime<Utc>,
        metadata: Option<&str>,
    ) -> Result<usize> {
        let affected = self.write_partition(slug, order, |part| {
            part.player_ids(player_alias)
                .into_iter()
                .filter(|&id| {
                    part.modify(id, |entry| {
                        if !order.is_better(value, entry.score_value) {
                            return false;
                        }
                        entry.score_value = value;
                        entry.submitted_at = submitted_at;
                        if let Some(metadata) = metadata {
                            entry.metadata = Some(metadata.to_string());
                        }
                        true
                    })
                })
                .count()
        })?;
        Ok(affected.unwrap_or(0))
    }

    fn add_to_score(
        &self,
        slug: &str,
        order: SortOrder,
        player_alias: &str,
        delta: f64,
        submitted_at: DateTime<Utc>,
    ) -> Result<usize> {
        let affected = self.write_partition(slug, order, |part| {
            part.player_ids(player_alias)
                .into_iter()
                .filter(|&id| {
                    part.modify(id, |entry| {
                        entry.score_value += delta;
                        entry.submitted_at = submitted_at;
                        true
                    })
                })
                .count()
        })?;
        Ok(affected.unwrap_or(0))
    }

    fn best_for_player(&self, slug: &str, order: SortOrder, player_alias: &str) -> Result<Option<ScoreEntry>> {
        let best = self.read_partition(slug, order, |part| {
            part.players
                .get(player_alias)?
                .iter()
                .filter_map(|id| part.entries.get(id))
                .min_by(|a, b| a.rank_cmp(b, order))
                .cloned()
        })?;
        Ok(best.flatten())
    }

    fn count_better(&self, slug: &str, order: SortOrder, entry: &ScoreEntry) -> Result<u64> {
        let key = RankKey::of(entry, order);
        let count = self.read_partition(slug, order, |part| part.index.range(..key).count() as u64)?;
        Ok(count.unwrap_or(0))
    }

    fn scan_better(&self, slug: &str, order: SortOrder, entry: &ScoreEntry, limit: usize) -> Result<Vec<ScoreEntry>> {
        let key = RankKey::of(entry, order);
        let rows = self.read_partition(slug, order, |part| {
            part.resolve(part.index.range(..key).rev().take(limit).copied())
        })?;
        Ok(rows.unwrap_or_default())
    }

    fn scan_worse(&self, slug: &str, order: SortOrder, entry: &ScoreEntry, limit: usize) -> Result<Vec<ScoreEntry>> {
        let key = RankKey::of(entry, order);
        let rows = self.read_partition(slug, order, |part| {
            part.resolve(
                part.index
                    .range((Bound::Excluded(key), Bound::Unbounded))
                    .take(limit)
                    .copied(),
            )
        })?;
        Ok(rows.unwrap_or_default())
    }

    fn scan_ordered(&self, slug: &str, order: SortOrder, offset: usize, limit: usize) -> Result<Vec<ScoreEntry>> {
        let rows = self.read_partition(slug, order, |part| {
            part.resolve(part.index.iter().skip(offset).take(limit).copied())
        })?;
        Ok(rows.unwrap_or_default())
    }

    fn count(&self, slug: &str) -> Result<u64> {
        let Some(handle) = self.lookup(slug)? else {
            return Ok(0);
        };
        let part = handle.read().map_err(|_| poisoned("partition"))?;
        Ok(part.entries.len() as u64)
    }

    fn get(&self, id: EntryId) -> Result<Option<ScoreEntry>> {
        for handle in self.partition_handles()? {
            let part = handle.read().map_err(|_| poisoned("partition"))?;
            if let Some(entry) = part.entries.get(&id) {
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    fn remove(&self, id: EntryId) -> Result<Option<ScoreEntry>> {
        for handle in self.partition_handles()? {
            let mut part = handle.write().map_err(|_| poisoned("partition"))?;
            if let Some(entry) = part.remove(id) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn take_all(&self, slug: &str) -> Result<Vec<ScoreEntry>> {
        let Some(handle) = self.lookup(slug)? else {
            return Ok(Vec::new());
        };
        let mut part = handle.write().map_err(|_| poisoned("partition"))?;
        let taken = part.resolve(part.index.iter().copied());
        let order = part.order;
        *part = Partition::new(order);
        Ok(taken)
    }

    fn restore(&self, slug: &str, order: SortOrder, entries: Vec<ScoreEntry>) -> Result<()> {
        let handle = self.lookup_or_create(slug, order)?;
        let mut part = handle.write().map_err(|_| poisoned("partition"))?;
        part.reorder(order);
        for entry in entries {
            part.remove(entry.id);
            part.insert(entry);
        }
        Ok(())
    }
}

impl ArchiveStore for MemoryStore {
    fn append(&self, rows: Vec<ScoreArchive>) -> Result<()> {
        self.archives
            .write()
            .map_err(|_| poisoned("archives"))?
            .extend(rows);
        Ok(())
    }

    fn summaries(&self, slug: Option<&str>) -> Result<Vec<ArchiveSummary>> {
        let archives = self.archives.read().map_err(|_| poisoned("archives"))?;

        let mut groups: BTreeMap<(DateTime<Utc>, &str, &str), u64> = BTreeMap::new();
        for row in archives.iter() {
            if slug.is_some_and(|s| s != row.leaderboard_slug) {
                continue;
            }
            *groups
                .entry((row.archived_at, &row.leaderboard_slug, &row.reset_label))
                .or_default() += 1;
        }

        // BTreeMap iterates oldest first; summaries are reported newest first
        Ok(groups
            .into_iter()
            .rev()
            .map(|((archived_at, slug, label), entry_count)| ArchiveSummary {
                leaderboard_slug: slug.to_string(),
                reset_label: label.to_string(),
                archived_at,
                entry_count,
            })
            .collect())
    }

    fn rows(&self, slug: &str, reset_label: &str) -> Result<Vec<ScoreArchive>> {
        Ok(self
            .archives
            .read()
            .map_err(|_| poisoned("archives"))?
            .iter()
            .filter(|row| row.leaderboard_slug == slug && row.reset_label == reset_label)
            .cloned()
            .collect())
    }
}
