//! warplog - Warp history tracker
//!
//! Rebuilds a player's complete pull history from the game's history API
//! without asking for credentials: the signed history link is recovered from
//! local game files, every banner is paged through, new pulls are merged into
//! a local store and pity statistics are derived from the result.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`discovery`] - History link recovery from registry, logs and web cache
//! - [`api`] - History API client, link validation and pagination
//! - [`storage`] - Persisted store and record merging
//! - [`stats`] - Rarity, pity and interval statistics
//! - [`orchestrator`] - Run sequencing and progress events
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use warplog::config::Config;
//! use warplog::orchestrator::{Orchestrator, RunOutcome};
//! use warplog::storage::PersistedStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = PersistedStore::load(&config.storage.store_path)?;
//!     let orchestrator = Orchestrator::new(config, store)?;
//!
//!     if let Some(run) = orchestrator.trigger() {
//!         if let RunOutcome::Completed(report) = run.await? {
//!             println!("{}", report.summary);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod stats;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BannerSpec, Config};
    pub use crate::discovery::{DiscoveryCandidate, LinkDiscoverer, SourceKind};
    pub use crate::error::{Error, ErrorCategory, Result, WarplogErrorTrait};
    pub use crate::models::PullRecord;
    pub use crate::orchestrator::{AbortReason, Orchestrator, RunEvent, RunOutcome, RunState};
    pub use crate::stats::{Stats, Summary};
    pub use crate::storage::{CategoryHistory, PersistedStore, RecordMerger};
}

// Direct re-exports for convenience
pub use models::{IdentityKey, PullRecord};
