//! Link discovery from local game artifacts
//!
//! The game client writes its signed history link into several places on
//! disk. This module tries them in a fixed priority order and returns the
//! first link found:
//!
//! 1. [`registry`] - string values under the client's registry keys
//! 2. [`log`] - the client's `Player.log` files
//! 3. [`cache`] - the embedded browser's web cache, with a [`copy`] fallback
//!    when the cache file is locked
//!
//! Discovery never fails with an error: a source that cannot be read simply
//! yields nothing and the next one is tried.
//!
//! # Example
//!
//! ```no_run
//! use warplog::config::DiscoveryConfig;
//! use warplog::discovery::LinkDiscoverer;
//!
//! let discoverer = LinkDiscoverer::from_config(&DiscoveryConfig::default());
//! if let Some(candidate) = discoverer.discover() {
//!     println!("found a link in the {}", candidate.source);
//! }
//! ```

pub mod cache;
pub mod copy;
pub mod log;
pub mod registry;

use std::fmt;

use serde::Serialize;

use crate::config::DiscoveryConfig;
use crate::utils::redact_link;

use self::cache::CacheSource;
use self::copy::CopyChain;
use self::log::LogSource;
use self::registry::{RegQuery, RegistrySource};

/// Where a candidate link was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    Registry,
    LogFile,
    CacheFile,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::LogFile => "log file",
            Self::CacheFile => "web cache",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link found in one artifact; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryCandidate {
    pub source: SourceKind,
    pub url: String,
}

/// One artifact that may hold the history link
pub trait LinkSource: Send + Sync {
    /// Kind reported for links found by this source
    fn kind(&self) -> SourceKind;

    /// Search the artifact; `None` when nothing usable was found
    fn find(&self) -> Option<String>;
}

/// Ordered chain of link sources
pub struct LinkDiscoverer {
    sources: Vec<Box<dyn LinkSource>>,
}

impl LinkDiscoverer {
    /// Create a discoverer trying `sources` in the given order
    pub fn new(sources: Vec<Box<dyn LinkSource>>) -> Self {
        Self { sources }
    }

    /// Registry, log and cache sources configured from `config`
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let log_paths = config.resolved_log_paths();

        let registry = RegistrySource::new(
            Box::new(RegQuery::from_path()),
            config.registry_keys.clone(),
            &config.endpoint_marker,
        );
        let log = LogSource::new(log_paths.clone(), &config.endpoint_marker);
        let copy = config.copy_fallback.then(CopyChain::system);
        let cache = CacheSource::new(
            log_paths,
            config.header_scan_lines,
            &config.cache_delimiter,
            config.cache_markers.clone(),
            copy,
        );

        Self::new(vec![Box::new(registry), Box::new(log), Box::new(cache)])
    }

    /// Return the first non-empty link, trying sources in priority order
    pub fn discover(&self) -> Option<DiscoveryCandidate> {
        for source in &self.sources {
            let kind = source.kind();
            tracing::debug!(source = %kind, "Searching for history link");

            match source.find() {
                Some(url) if !url.trim().is_empty() => {
                    tracing::info!(
                        source = %kind,
                        link = %redact_link(url.trim()),
                        "History link found"
                    );
                    return Some(DiscoveryCandidate {
                        source: kind,
                        url: url.trim().to_string(),
                    });
                }
                _ => tracing::debug!(source = %kind, "No link in source"),
            }
        }

        tracing::warn!(sources = self.sources.len(), "No history link found");
        None
    }
}
