//! Error types for the rankdrop ranking engine.

use thiserror::Error;

/// The main error type for all rankdrop operations.
///
/// Each variant wraps the error family of one component. Use
/// [`RankError::kind`] to classify an error for callers that only care about
/// the broad outcome (for example to pick an HTTP status).
#[derive(Error, Debug)]
pub enum RankError {
    /// Error resolving or registering a leaderboard.
    #[error("leaderboard error: {0}")]
    Leaderboard(#[from] LeaderboardError),

    /// Error during score submission or removal (write path).
    #[error("submit error: {0}")]
    Submit(#[from] SubmitError),

    /// Error managing a player record.
    #[error("player error: {0}")]
    Player(#[from] PlayerError),

    /// Error during a rank query (read path).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error during reset or archive retrieval.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Error raised by the underlying score store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error loading or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error delivering a webhook notification.
    #[cfg(feature = "webhook")]
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
}

/// Broad classification of a [`RankError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown leaderboard, player without an entry, or unknown entry id.
    NotFound,
    /// A banned player attempted a submission.
    Forbidden,
    /// The request itself is malformed or out of range.
    InvalidInput,
    /// The request collides with existing state.
    Conflict,
    /// Storage or infrastructure failure.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code conventionally associated with this kind.
    pub fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Forbidden => 403,
            Self::InvalidInput => 400,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

impl RankError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Leaderboard(LeaderboardError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Leaderboard(LeaderboardError::AlreadyExists { .. }) => ErrorKind::Conflict,
            Self::Leaderboard(LeaderboardError::InvalidConfig { .. }) => ErrorKind::InvalidInput,
            Self::Submit(SubmitError::PlayerBanned { .. }) => ErrorKind::Forbidden,
            Self::Submit(SubmitError::EntryNotFound { .. }) => ErrorKind::NotFound,
            Self::Submit(SubmitError::Contended { .. }) => ErrorKind::Conflict,
            Self::Submit(_) => ErrorKind::InvalidInput,
            Self::Player(PlayerError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Query(QueryError::PlayerNotFound { .. }) => ErrorKind::NotFound,
            Self::Query(_) => ErrorKind::InvalidInput,
            Self::Archive(ArchiveError::MissingLabel) => ErrorKind::InvalidInput,
            Self::Archive(ArchiveError::SchedulerSpawn { .. }) => ErrorKind::Internal,
            Self::Storage(_) | Self::Config(_) => ErrorKind::Internal,
            #[cfg(feature = "webhook")]
            Self::Notify(_) => ErrorKind::Internal,
        }
    }

    /// Returns a message safe to show to an external caller.
    ///
    /// Internal failures are collapsed to a generic message so storage
    /// details never leak through an API boundary.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Errors concerning leaderboard configuration.
#[derive(Error, Debug)]
pub enum LeaderboardError {
    /// No leaderboard is registered under this slug.
    #[error("leaderboard '{slug}' not found")]
    NotFound {
        /// The unknown slug.
        slug: String,
    },

    /// A leaderboard with this slug already exists.
    #[error("leaderboard '{slug}' already exists")]
    AlreadyExists {
        /// The conflicting slug.
        slug: String,
    },

    /// The leaderboard configuration is invalid.
    #[error("invalid leaderboard '{slug}': {reason}")]
    InvalidConfig {
        /// The slug of the rejected configuration.
        slug: String,
        /// Why the configuration is invalid.
        reason: String,
    },
}

/// Errors that can occur on the write path.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// The player is banned from submitting scores.
    #[error("player '{alias}' is banned")]
    PlayerBanned {
        /// The banned player's alias.
        alias: String,
    },

    /// The player alias is empty.
    #[error("player alias must not be empty")]
    EmptyAlias,

    /// The score is NaN or infinite.
    #[error("score {value} is not a finite number")]
    NonFiniteScore {
        /// The rejected value.
        value: f64,
    },

    /// The score is below the leaderboard's minimum.
    #[error("score {value} is below the minimum allowed value of {min}")]
    BelowMinimum {
        /// The rejected value.
        value: f64,
        /// The configured minimum.
        min: f64,
    },

    /// The score is above the leaderboard's maximum.
    #[error("score {value} exceeds the maximum allowed value of {max}")]
    AboveMaximum {
        /// The rejected value.
        value: f64,
        /// The configured maximum.
        max: f64,
    },

    /// The player's row changed concurrently on every attempt.
    #[error("concurrent updates for player '{alias}', retry the submission")]
    Contended {
        /// The player's alias.
        alias: String,
    },

    /// No score entry exists with this id.
    #[error("score entry {id} not found")]
    EntryNotFound {
        /// The unknown entry id.
        id: u64,
    },
}

/// Errors concerning player records.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// No player record exists for this alias.
    #[error("player '{alias}' not found")]
    NotFound {
        /// The unknown alias.
        alias: String,
    },
}

/// Errors that can occur on the read path.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The player has no entry on the leaderboard.
    #[error("player '{alias}' has no entry on leaderboard '{slug}'")]
    PlayerNotFound {
        /// The leaderboard slug.
        slug: String,
        /// The player's alias.
        alias: String,
    },

    /// The requested top-N limit is outside the supported range.
    #[error("invalid limit {limit}: must be between 1 and {max}")]
    InvalidLimit {
        /// The requested limit.
        limit: usize,
        /// The largest supported limit.
        max: usize,
    },

    /// The requested page size is zero.
    #[error("page size must be greater than zero")]
    EmptyPage,
}

/// Errors that can occur during reset or archive retrieval.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// An archive lookup was made without a usable label.
    #[error("an archive label is required")]
    MissingLabel,

    /// The reset scheduler thread could not be started.
    #[error("failed to start reset scheduler: {source}")]
    SchedulerSpawn {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a score store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("lock poisoned: {what}")]
    LockPoisoned {
        /// Which piece of state the lock guards.
        what: &'static str,
    },

    /// The store cannot serve requests right now.
    #[error("storage unavailable: {reason}")]
    Unavailable {
        /// Description of the outage.
        reason: String,
    },

    /// A persisted file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted file could not be parsed.
    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        /// The file path.
        path: std::path::PathBuf,
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// State could not be written to disk.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// The file path.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// State could not be serialized.
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors that can occur loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be parsed.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: std::path::PathBuf,
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// A config value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of what is invalid.
        reason: String,
    },
}

/// Errors that can occur delivering a webhook.
#[cfg(feature = "webhook")]
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Failed to serialize the webhook payload.
    #[error("failed to serialize webhook payload: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Failed to create the HTTP client.
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP request failed.
    #[error("HTTP request failed: {source}")]
    RequestFailed {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The receiver returned a non-2xx status.
    #[error("webhook returned status {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body text.
        body: String,
    },
}

/// Type alias for `Result<T, RankError>`.
pub type Result<T> = std::result::Result<T, RankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let not_found: RankError = LeaderboardError::NotFound {
            slug: "global".to_string(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.kind().status_code(), 404);

        let banned: RankError = SubmitError::PlayerBanned {
            alias: "cheater".to_string(),
        }
        .into();
        assert_eq!(banned.kind(), ErrorKind::Forbidden);

        let range: RankError = SubmitError::AboveMaximum {
            value: 10.0,
            max: 5.0,
        }
        .into();
        assert_eq!(range.kind(), ErrorKind::InvalidInput);

        let conflict: RankError = LeaderboardError::AlreadyExists {
            slug: "global".to_string(),
        }
        .into();
        assert_eq!(conflict.kind().status_code(), 409);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err: RankError = StorageError::Unavailable {
            reason: "connection refused to 10.0.0.7:5432".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal error");

        let err: RankError = QueryError::PlayerNotFound {
            slug: "global".to_string(),
            alias: "P9".to_string(),
        }
        .into();
        assert!(err.public_message().contains("P9"));
    }
}
