//! JSON file persistence for the data directory.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, StorageError};

/// Leaderboard configuration file name.
pub const LEADERBOARDS_FILE: &str = "leaderboards.json";
/// Live entries and archive rows file name.
pub const SCORES_FILE: &str = "scores.json";
/// Banned players file name.
pub const PLAYERS_FILE: &str = "players.json";
/// System settings file name.
pub const SETTINGS_FILE: &str = "settings.json";

/// Reads and parses a JSON file, returning `None` if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path).map_err(|e| StorageError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value = serde_json::from_str(&data).map_err(|e| StorageError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Serializes `value` as pretty JSON and writes it to `path`.
///
/// The data is written to a sibling temp file first and renamed over the
/// target, so readers never observe a half-written file.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value).map_err(StorageError::Serialize)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, data).map_err(|e| StorageError::Write {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::Write {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_and_missing() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");

        assert!(load_json::<BTreeMap<String, String>>(&path).unwrap().is_none());

        let mut map = BTreeMap::new();
        map.insert("WEBHOOK_TOP_N".to_string(), "5".to_string());
        save_json(&path, &map).unwrap();

        let loaded: BTreeMap<String, String> = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, map);
        assert!(!temp_dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("players.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_json::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::error::RankError::Storage(StorageError::Parse { .. })
        ));
    }
}
