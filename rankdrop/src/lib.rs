//! # rankdrop
//!
//! Leaderboard ranking engine.
//!
//! rankdrop ranks player scores per leaderboard and answers rank-relative
//! queries (top-N, a window around one player, paginated listings) while
//! scores are being written concurrently. Each leaderboard chooses how scores
//! compare and how repeated submissions from one player combine, and can be
//! reset on a schedule with its rows archived.
//!
//! ## Key Properties
//!
//! - Strategy-dependent writes are single atomic store operations; no
//!   read-modify-write in engine code
//! - Total ordering: score, then earlier submission, then insertion order, so
//!   ranks are always contiguous
//! - Player windows use two bounded range scans, never a full sort
//! - Top rows are cached per leaderboard and invalidated only by writes that
//!   can change them
//!
//! ## Quick Start
//!
//! ```rust
//! use rankdrop::{EngineConfig, Leaderboard, Rankdrop, ScoreStrategy, SortOrder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rankdrop = Rankdrop::in_memory(EngineConfig::default())?;
//! rankdrop.create_leaderboard(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly))?;
//!
//! for (player, score) in [("P1", 700.0), ("P2", 600.0), ("P3", 500.0)] {
//!     rankdrop.engine().submit("global", player, score, None)?;
//! }
//!
//! let window = rankdrop.query().player_window("global", "P2", 1)?;
//! assert_eq!(window.start_rank, 1);
//! assert_eq!(window.entries.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Rankdrop`]: Top-level handle; loads a data directory and wires everything
//! - [`RankEngine`]: Submission strategies and score removal
//! - [`RankQuery`]: Top-N, player windows, pagination
//! - [`TopCache`]: Per-leaderboard cache of the top rows
//! - [`ArchiveManager`]: Manual and scheduled resets, archive snapshots
//!
//! ## Modules
//!
//! - [`store`]: Score storage trait and the in-memory ordered store
//! - [`leaderboard`]: Leaderboard configuration and directory
//! - [`entry`]: Score rows and ranked views
//! - [`players`], [`settings`], [`notify`]: Collaborators consulted by the engine
//! - [`scheduler`]: Background reset trigger
//! - [`config`]: Engine configuration
//! - [`error`]: Error types

pub mod archive;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod leaderboard;
pub mod notify;
pub mod persist;
pub mod players;
pub mod query;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod store;
#[cfg(feature = "webhook")]
pub mod webhook;

#[cfg(test)]
mod test_support;

// Re-export primary API types at crate root for convenience.
pub use archive::{ArchiveManager, ResetSummary};
pub use cache::TopCache;
pub use config::{CacheFailurePolicy, EngineConfig};
pub use engine::{RankEngine, Submission};
pub use entry::{RankedEntry, ScoreEntry};
pub use error::{ErrorKind, RankError, Result};
pub use leaderboard::{Leaderboard, ResetFrequency, ScoreStrategy, SortOrder};
pub use query::{PlayerWindow, RankQuery};
pub use service::Rankdrop;
