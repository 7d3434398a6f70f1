//! Persisted pull history
//!
//! The store is a single pretty-printed JSON document mapping banner ids to
//! their history:
//!
//! ```json
//! { "11": { "name": "Limited character", "records": [ ... ], "stats": { ... } } }
//! ```
//!
//! It is rewritten in full on every save. Writes go to a temporary file in the
//! same directory which is then renamed over the old document.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use warplog::storage::PersistedStore;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut store = PersistedStore::load(Path::new("gacha_records.json"))?;
//! let accepted = store.merge("11", "Limited character", Vec::new());
//! store.save(Path::new("gacha_records.json"))?;
//! # Ok(())
//! # }
//! ```

pub mod merge;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::BannerSpec;
use crate::models::PullRecord;
use crate::stats::{self, Stats, Summary};

pub use self::merge::RecordMerger;

// ============================================================================
// Category History
// ============================================================================

/// One banner's pulls, newest first, with cached statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryHistory {
    #[serde(default)]
    name: String,

    /// Older store files call this list `data`
    #[serde(default, alias = "data")]
    records: Vec<PullRecord>,

    #[serde(default)]
    stats: Stats,
}

impl CategoryHistory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records sorted newest first, unique by identity key
    pub fn records(&self) -> &[PullRecord] {
        &self.records
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge `incoming` and refresh the statistics; returns the accepted count
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = PullRecord>) -> usize {
        let accepted = RecordMerger::merge(&mut self.records, incoming);
        self.refresh_stats();
        accepted
    }

    pub fn refresh_stats(&mut self) {
        self.stats = stats::compute(&self.records);
    }

    /// Records whose time does not follow `YYYY-MM-DD HH:MM:SS`
    ///
    /// They still merge and count, but sort by their raw string.
    pub fn malformed_times(&self) -> usize {
        self.records.iter().filter(|r| r.timestamp().is_none()).count()
    }

    /// Rebuild from possibly hand-edited contents: dedup, sort, recompute
    fn normalized(self) -> Self {
        let mut history = Self::new(self.name);
        history.merge(self.records);
        history
    }
}

// ============================================================================
// Persisted Store
// ============================================================================

/// All banner histories, keyed by banner id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedStore {
    categories: BTreeMap<String, CategoryHistory>,
}

impl PersistedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store, or start empty when the file does not exist
    ///
    /// Loaded histories are re-sorted, deduplicated and their statistics
    /// recomputed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No store file, starting empty");
            return Ok(Self::new());
        }

        let file = File::open(path)
            .with_context(|| format!("Failed to open store file: {}", path.display()))?;
        let store: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse store file: {}", path.display()))?;

        let store = store.normalized();
        tracing::info!(
            path = %path.display(),
            categories = store.categories.len(),
            records = store.total_records(),
            "Store loaded"
        );
        Ok(store)
    }

    /// Write the whole store to `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        // Write to temp file first, then rename (atomic)
        let temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize store")?;
            writer.flush().context("Failed to write store")?;
        }

        temp.persist(path)
            .with_context(|| format!("Failed to replace store file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), records = self.total_records(), "Store saved");
        Ok(())
    }

    /// Merge `records` into `banner`, creating its history when absent
    pub fn merge(&mut self, banner: &str, name: &str, records: Vec<PullRecord>) -> usize {
        let history = self
            .categories
            .entry(banner.to_string())
            .or_insert_with(|| CategoryHistory::new(name));
        if history.name.is_empty() {
            history.name = name.to_string();
        }
        history.merge(records)
    }

    /// Merge every history of `other` into this store; returns records accepted
    pub fn import(&mut self, other: PersistedStore) -> usize {
        other
            .categories
            .into_iter()
            .map(|(banner, history)| {
                let accepted = self.merge(&banner, &history.name, history.records);
                tracing::info!(banner = %banner, accepted, "Imported records");
                accepted
            })
            .sum()
    }

    pub fn history(&self, banner: &str) -> Option<&CategoryHistory> {
        self.categories.get(banner)
    }

    /// Banner ids present in the store
    pub fn banners(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn total_records(&self) -> usize {
        self.categories.values().map(CategoryHistory::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Cross-banner summary in `order`, followed by any banner not listed there
    pub fn summary(&self, order: &[BannerSpec]) -> Summary {
        let listed = order
            .iter()
            .filter_map(|spec| self.categories.get_key_value(spec.id.as_str()));
        let rest = self
            .categories
            .iter()
            .filter(|(id, _)| !order.iter().any(|spec| &spec.id == *id));

        Summary::from_stats(
            listed
                .chain(rest)
                .map(|(id, history)| (id.as_str(), history.name.as_str(), &history.stats)),
        )
    }

    fn normalized(self) -> Self {
        Self {
            categories: self
                .categories
                .into_iter()
                .map(|(banner, history)| {
                    let history = history.normalized();
                    let malformed = history.malformed_times();
                    if malformed > 0 {
                        tracing::warn!(banner = %banner, malformed, "Store records with unparsable times");
                    }
                    (banner, history)
                })
                .collect(),
        }
    }
}
