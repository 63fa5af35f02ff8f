//! Top-level handle wiring the ranking engine to its collaborators.
//!
//! # Design
//!
//! [`Rankdrop`] owns one instance of every component and exposes the
//! operations the binaries need:
//! - [`RankEngine`] for submissions and score removal
//! - [`RankQuery`] for top-N, windows and pages
//! - [`ArchiveManager`] for resets and archive snapshots
//! - leaderboard, player and settings administration
//!
//! # File Layout
//!
//! ```text
//! data_dir/
//! ├── leaderboards.json   <- Leaderboard configuration
//! ├── scores.json         <- Live entries and archive rows
//! ├── players.json        <- Player records and bans
//! └── settings.json       <- System settings (webhook target, cooldown, ...)
//! ```
//!
//! State is held in memory and written back by [`Rankdrop::flush`]. Missing
//! files load as empty, so opening an empty directory creates a fresh
//! instance.
//!
//! # Example
//!
//! ```rust,no_run
//! use rankdrop::config::EngineConfig;
//! use rankdrop::leaderboard::{Leaderboard, ScoreStrategy, SortOrder};
//! use rankdrop::service::Rankdrop;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rankdrop = Rankdrop::open("./rankdrop-data", EngineConfig::default())?;
//! rankdrop.create_leaderboard(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly))?;
//!
//! let submission = rankdrop.engine().submit("global", "PlayerOne", 9500.0, None)?;
//! println!("rank {}", submission.rank);
//!
//! for row in rankdrop.query().top_n("global", 10)? {
//!     println!("{:>3} {} {}", row.rank, row.entry.player_alias, row.entry.score_value);
//! }
//! rankdrop.flush()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::archive::ArchiveManager;
use crate::cache::TopCache;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::engine::RankEngine;
use crate::error::{Result, StorageError};
use crate::leaderboard::{self, Leaderboard, LeaderboardDirectory, MemoryLeaderboards};
use crate::notify::{NoopNotifier, Notifier};
use crate::persist::{self, LEADERBOARDS_FILE, PLAYERS_FILE, SCORES_FILE, SETTINGS_FILE};
use crate::players::{MemoryPlayers, Player};
use crate::query::RankQuery;
use crate::scheduler::ResetScheduler;
use crate::settings::{
    MemorySettings, SettingsStore, WEBHOOK_COOLDOWN_MS, WEBHOOK_TOP_N, WEBHOOK_URL,
};
use crate::store::{MemoryStore, ScoreStore};

/// How notifications are produced.
enum NotifierChoice {
    None,
    Custom(Arc<dyn Notifier>),
    #[cfg(feature = "webhook")]
    Webhook,
}

/// Builder for [`Rankdrop`].
pub struct RankdropBuilder {
    config: EngineConfig,
    data_dir: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    notifier: NotifierChoice,
}

impl std::fmt::Debug for RankdropBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankdropBuilder")
            .field("config", &self.config)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl RankdropBuilder {
    /// Starts a builder for an in-memory instance with the system clock.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            data_dir: None,
            clock: Arc::new(SystemClock),
            notifier: NotifierChoice::None,
        }
    }

    /// Loads from and flushes to `path`.
    #[must_use]
    pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Uses `clock` for every timestamp.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sends top-score events to `notifier`.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = NotifierChoice::Custom(notifier);
        self
    }

    /// Delivers top-score events as webhooks configured in settings.
    #[cfg(feature = "webhook")]
    #[must_use]
    pub fn webhooks(mut self) -> Self {
        self.notifier = NotifierChoice::Webhook;
        self
    }

    /// Validates the configuration, loads persisted state and wires the
    /// components.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the data directory
    /// cannot be created, or a state file is unreadable.
    pub fn build(self) -> Result<Rankdrop> {
        self.config.validate()?;

        if let Some(dir) = &self.data_dir {
            std::fs::create_dir_all(dir).map_err(|e| StorageError::Write {
                path: dir.clone(),
                source: e,
            })?;
        }
        let file = |name: &str| self.data_dir.as_ref().map(|dir| dir.join(name));

        let directory = match file(LEADERBOARDS_FILE) {
            Some(path) => match persist::load_json::<Vec<Leaderboard>>(&path)? {
                Some(boards) => MemoryLeaderboards::from_leaderboards(boards)?,
                None => MemoryLeaderboards::new(),
            },
            None => MemoryLeaderboards::new(),
        };
        let store = match file(SCORES_FILE) {
            Some(path) => MemoryStore::load_or_new(path)?,
            None => MemoryStore::new(),
        };
        let players = match file(PLAYERS_FILE) {
            Some(path) => MemoryPlayers::from_players(persist::load_json(&path)?.unwrap_or_default()),
            None => MemoryPlayers::new(),
        };
        let settings = match file(SETTINGS_FILE) {
            Some(path) => MemorySettings::from_map(
                persist::load_json::<BTreeMap<String, String>>(&path)?.unwrap_or_default(),
            ),
            None => MemorySettings::new(),
        };

        let directory = Arc::new(directory);
        let store = Arc::new(store);
        let players = Arc::new(players);
        let settings = Arc::new(settings);
        let clock = self.clock;

        let notifier: Arc<dyn Notifier> = match self.notifier {
            NotifierChoice::None => Arc::new(NoopNotifier),
            NotifierChoice::Custom(notifier) => notifier,
            #[cfg(feature = "webhook")]
            NotifierChoice::Webhook => Arc::new(crate::webhook::WebhookNotifier::new(
                settings.clone(),
                clock.clone(),
            )?),
        };

        let cache = Arc::new(TopCache::new(
            store.clone(),
            self.config.cache_depth,
            self.config.cache_failure_policy,
        ));
        let engine = RankEngine::new(directory.clone(), store.clone(), cache.clone(), clock.clone())
            .with_player_gate(players.clone())
            .with_notifier(notifier);
        let query = RankQuery::new(
            directory.clone(),
            store.clone(),
            cache.clone(),
            self.config.max_page_size,
        );
        let archive = ArchiveManager::new(
            directory.clone(),
            store.clone(),
            store.clone(),
            cache.clone(),
            clock.clone(),
        );

        if let Some(dir) = &self.data_dir {
            info!(
                data_dir = %dir.display(),
                leaderboards = directory.list()?.len(),
                "rankdrop state loaded"
            );
        }

        Ok(Rankdrop {
            data_dir: self.data_dir,
            config: self.config,
            directory,
            store,
            players,
            settings,
            clock,
            cache,
            engine,
            query,
            archive,
            flush_lock: Mutex::new(()),
        })
    }
}

/// A complete leaderboard service instance.
///
/// # Thread Safety
///
/// `Rankdrop` is `Send + Sync`; share it behind an `Arc` between request
/// threads and the reset scheduler.
pub struct Rankdrop {
    data_dir: Option<PathBuf>,
    config: EngineConfig,
    directory: Arc<MemoryLeaderboards>,
    store: Arc<MemoryStore>,
    players: Arc<MemoryPlayers>,
    settings: Arc<MemorySettings>,
    clock: Arc<dyn Clock>,
    cache: Arc<TopCache>,
    engine: RankEngine,
    query: RankQuery,
    archive: ArchiveManager,
    flush_lock: Mutex<()>,
}

impl std::fmt::Debug for Rankdrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rankdrop")
            .field("data_dir", &self.data_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Rankdrop {
    /// Returns a builder.
    pub fn builder(config: EngineConfig) -> RankdropBuilder {
        RankdropBuilder::new(config)
    }

    /// Opens (or creates) an instance persisted in `data_dir`.
    ///
    /// # Errors
    ///
    /// See [`RankdropBuilder::build`].
    pub fn open(data_dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        RankdropBuilder::new(config).data_dir(data_dir).build()
    }

    /// Creates an instance that is never persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        RankdropBuilder::new(config).build()
    }

    /// The write path.
    pub fn engine(&self) -> &RankEngine {
        &self.engine
    }

    /// The read path.
    pub fn query(&self) -> &RankQuery {
        &self.query
    }

    /// Resets and archives.
    pub fn archive(&self) -> &ArchiveManager {
        &self.archive
    }

    /// The top cache.
    pub fn cache(&self) -> &TopCache {
        &self.cache
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The data directory, if persisted.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Number of live rows on a leaderboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn entry_count(&self, slug: &str) -> Result<u64> {
        self.store.count(slug)
    }

    /// Registers a leaderboard, scheduling its first automatic reset.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::AlreadyExists` or `InvalidConfig`.
    pub fn create_leaderboard(&self, mut leaderboard: Leaderboard) -> Result<Leaderboard> {
        if leaderboard.next_reset_at.is_none() {
            leaderboard.next_reset_at = leaderboard
                .reset_frequency
                .next_reset_after(self.clock.now());
        }
        let created = self.directory.create(leaderboard)?;
        info!(slug = %created.slug, "leaderboard created");
        Ok(created)
    }

    /// Looks up a leaderboard.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug.
    pub fn leaderboard(&self, slug: &str) -> Result<Leaderboard> {
        leaderboard::require(self.directory.as_ref(), slug)
    }

    /// Lists every leaderboard ordered by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn leaderboards(&self) -> Result<Vec<Leaderboard>> {
        self.directory.list()
    }

    /// Changes a leaderboard's display name.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug.
    pub fn rename_leaderboard(&self, slug: &str, display_name: &str) -> Result<Leaderboard> {
        self.directory.rename(slug, display_name)
    }

    /// Deletes a leaderboard together with its live rows and cached state.
    /// Archived rows are kept.
    ///
    /// The directory entry goes first, so a submission still in flight
    /// either lands before the sweep or notices the deletion and backs out.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::NotFound` for an unknown slug.
    pub fn delete_leaderboard(&self, slug: &str) -> Result<Leaderboard> {
        let removed = self.directory.delete(slug)?;
        let dropped = self.store.take_all(slug)?;
        self.cache.forget(slug)?;
        info!(slug, entries = dropped.len(), "leaderboard deleted");
        Ok(removed)
    }

    /// Bans a player from submitting.
    ///
    /// # Errors
    ///
    /// Returns an error if the player registry cannot be written.
    pub fn ban_player(&self, player_alias: &str, reason: Option<&str>) -> Result<Player> {
        let player = self.players.ban(player_alias, reason, self.clock.now())?;
        info!(player = player_alias, "player banned");
        Ok(player)
    }

    /// Lifts a ban.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NotFound` if the player has no record.
    pub fn unban_player(&self, player_alias: &str) -> Result<Player> {
        let player = self.players.unban(player_alias)?;
        info!(player = player_alias, "player unbanned");
        Ok(player)
    }

    /// Looks up a player record.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NotFound` if the player has no record.
    pub fn player(&self, player_alias: &str) -> Result<Player> {
        self.players.get(player_alias)
    }

    /// Reads a system setting.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read.
    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        self.settings.get(key)
    }

    /// Writes a system setting.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be written.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings.set(key, value)
    }

    /// Sets the webhook target and, when given, its rank cutoff and cooldown.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be written.
    pub fn configure_webhook(&self, url: &str, top_n: Option<u64>, cooldown_ms: Option<u64>) -> Result<()> {
        self.settings.set(WEBHOOK_URL, url)?;
        if let Some(top_n) = top_n {
            self.settings.set(WEBHOOK_TOP_N, &top_n.to_string())?;
        }
        if let Some(cooldown_ms) = cooldown_ms {
            self.settings.set(WEBHOOK_COOLDOWN_MS, &cooldown_ms.to_string())?;
        }
        Ok(())
    }

    /// Writes all state to the data directory. A no-op for in-memory
    /// instances.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn flush(&self) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let _guard = self
            .flush_lock
            .lock()
            .map_err(|_| StorageError::LockPoisoned { what: "flush" })?;

        persist::save_json(&dir.join(LEADERBOARDS_FILE), &self.directory.to_vec()?)?;
        self.store.save(dir.join(SCORES_FILE))?;
        persist::save_json(&dir.join(PLAYERS_FILE), &self.players.to_vec()?)?;
        persist::save_json(&dir.join(SETTINGS_FILE), &self.settings.to_map()?)?;
        Ok(())
    }

    /// Starts the background thread that runs due resets every
    /// `reset_poll_interval_secs` and flushes after each pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be started.
    pub fn start_scheduler(self: &Arc<Self>) -> Result<ResetScheduler> {
        let service = Arc::clone(self);
        ResetScheduler::spawn(self.config.reset_poll_interval(), move || service.scheduler_tick())
    }

    fn scheduler_tick(&self) {
        match self.archive.run_due_resets() {
            Ok(outcome) if outcome.completed.is_empty() && outcome.failed.is_empty() => {}
            Ok(outcome) => info!(
                completed = outcome.completed.len(),
                failed = outcome.failed.len(),
                "scheduled resets processed"
            ),
            Err(e) => error!(error = %e, "failed to list due resets"),
        }
        // Also persists submissions made since the last tick
        if let Err(e) = self.flush() {
            error!(error = %e, "periodic flush failed");
        }
    }
}
