//! Shared wiring for unit tests.

use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};

use crate::archive::ArchiveManager;
use crate::cache::TopCache;
use crate::clock::ManualClock;
use crate::config::CacheFailurePolicy;
use crate::engine::RankEngine;
use crate::leaderboard::{Leaderboard, LeaderboardDirectory, MemoryLeaderboards, ScoreStrategy, SortOrder};
use crate::notify::{Notifier, TopScoreEvent};
use crate::players::MemoryPlayers;
use crate::query::RankQuery;
use crate::store::MemoryStore;

/// Notifier that keeps every event.
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<TopScoreEvent>>,
}

impl RecordingNotifier {
    pub(crate) fn events(&self) -> Vec<TopScoreEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_top_score(&self, event: TopScoreEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Engine, query and archive manager over shared in-memory state.
pub(crate) struct Fixture {
    pub directory: Arc<MemoryLeaderboards>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<TopCache>,
    pub players: Arc<MemoryPlayers>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub engine: RankEngine,
    pub query: RankQuery,
    pub archive: ArchiveManager,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::build(100, 1000)
    }

    pub(crate) fn with_depth(depth: usize) -> Self {
        Self::build(depth, 1000)
    }

    pub(crate) fn with_page_size(size: usize) -> Self {
        Self::build(100, size)
    }

    fn build(depth: usize, max_page_size: usize) -> Self {
        let directory = Arc::new(MemoryLeaderboards::new());
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(TopCache::new(store.clone(), depth, CacheFailurePolicy::Propagate));
        let players = Arc::new(MemoryPlayers::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Duration::seconds(1),
        ));

        let engine = RankEngine::new(directory.clone(), store.clone(), cache.clone(), clock.clone())
            .with_player_gate(players.clone())
            .with_notifier(notifier.clone());
        let query = RankQuery::new(directory.clone(), store.clone(), cache.clone(), max_page_size);
        let archive = ArchiveManager::new(
            directory.clone(),
            store.clone(),
            store.clone(),
            cache.clone(),
            clock.clone(),
        );

        Self {
            directory,
            store,
            cache,
            players,
            notifier,
            clock,
            engine,
            query,
            archive,
        }
    }

    pub(crate) fn board(&self, slug: &str, order: SortOrder, strategy: ScoreStrategy) {
        self.board_with(Leaderboard::new(slug, order, strategy));
    }

    pub(crate) fn board_with(&self, leaderboard: Leaderboard) {
        self.directory.create(leaderboard).unwrap();
    }
}
