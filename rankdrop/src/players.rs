//! Player records and the ban gate consulted on submission.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result, StorageError};

/// Boolean gate deciding whether a player may submit scores.
pub trait PlayerGate: Send + Sync {
    /// Returns `true` if the player is banned. Unknown players are not banned.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn is_banned(&self, player_alias: &str) -> Result<bool>;
}

/// Gate that admits every player.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl PlayerGate for OpenGate {
    fn is_banned(&self, _player_alias: &str) -> Result<bool> {
        Ok(false)
    }
}

/// A known player and their ban state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Player alias, unique.
    pub player_alias: String,
    /// Whether submissions are refused.
    pub banned: bool,
    /// When the current ban was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_at: Option<DateTime<Utc>>,
    /// Why the player was banned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_reason: Option<String>,
}

/// In-process player registry.
#[derive(Debug, Default)]
pub struct MemoryPlayers {
    players: RwLock<BTreeMap<String, Player>>,
}

impl MemoryPlayers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from saved records.
    pub fn from_players(players: Vec<Player>) -> Self {
        Self {
            players: RwLock::new(
                players
                    .into_iter()
                    .map(|p| (p.player_alias.clone(), p))
                    .collect(),
            ),
        }
    }

    /// Returns every record ordered by alias.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn to_vec(&self) -> Result<Vec<Player>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Bans a player, creating the record if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn ban(&self, player_alias: &str, reason: Option<&str>, now: DateTime<Utc>) -> Result<Player> {
        let mut players = self.write()?;
        let player = players
            .entry(player_alias.to_string())
            .or_insert_with(|| Player {
                player_alias: player_alias.to_string(),
                banned: false,
                banned_at: None,
                banned_reason: None,
            });
        player.banned = true;
        player.banned_at = Some(now);
        player.banned_reason = reason.map(str::to_string);
        Ok(player.clone())
    }

    /// Lifts a ban.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::NotFound`] if the player has no record.
    pub fn unban(&self, player_alias: &str) -> Result<Player> {
        let mut players = self.write()?;
        let player = players
            .get_mut(player_alias)
            .ok_or_else(|| PlayerError::NotFound {
                alias: player_alias.to_string(),
            })?;
        player.banned = false;
        player.banned_at = None;
        player.banned_reason = None;
        Ok(player.clone())
    }

    /// Looks up a player record.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::NotFound`] if the player has no record.
    pub fn get(&self, player_alias: &str) -> Result<Player> {
        self.read()?
            .get(player_alias)
            .cloned()
            .ok_or_else(|| {
                PlayerError::NotFound {
                    alias: player_alias.to_string(),
                }
                .into()
            })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Player>>> {
        self.players
            .read()
            .map_err(|_| StorageError::LockPoisoned { what: "players" }.into())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Player>>> {
        self.players
            .write()
            .map_err(|_| StorageError::LockPoisoned { what: "players" }.into())
    }
}

impl PlayerGate for MemoryPlayers {
    fn is_banned(&self, player_alias: &str) -> Result<bool> {
        Ok(self.read()?.get(player_alias).is_some_and(|p| p.banned))
    }
}
