//! System key-value settings.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{Result, StorageError};

/// Target URL for top-score webhooks; webhooks are off when unset or blank.
pub const WEBHOOK_URL: &str = "WEBHOOK_URL";
/// Only ranks at or above this number trigger a webhook.
pub const WEBHOOK_TOP_N: &str = "WEBHOOK_TOP_N";
/// Minimum milliseconds between two webhook deliveries.
pub const WEBHOOK_COOLDOWN_MS: &str = "WEBHOOK_COOLDOWN_MS";
/// RFC 3339 timestamp of the last successful delivery.
pub const WEBHOOK_LAST_FIRED: &str = "WEBHOOK_LAST_FIRED";

/// String settings keyed by name.
pub trait SettingsStore: Send + Sync {
    /// Returns the value for `key`, if set.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns the value for `key`, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }
}

/// In-process settings map.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettings {
    /// Creates an empty settings map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds settings from saved values.
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    /// Returns a copy of all values.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn to_map(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .values
            .read()
            .map_err(|_| StorageError::LockPoisoned { what: "settings" })?
            .clone())
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .map_err(|_| StorageError::LockPoisoned { what: "settings" })?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| StorageError::LockPoisoned { what: "settings" })?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
