//! Web cache scan
//!
//! The client's embedded browser caches every page it opens, including the
//! history page, under `<install>/webCaches/<version>/Cache/Cache_Data/data_2`.
//! Entries are appended, so the newest link is the last one in the file.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::copy::CopyChain;
use super::log::install_path_from_log;
use super::{LinkSource, SourceKind};
use crate::utils::format_bytes;

/// Location of the data file inside a cache folder
const CACHE_DATA_FILE: [&str; 3] = ["Cache", "Cache_Data", "data_2"];

/// Version of a `webCaches` subfolder, e.g. `2.3.0.0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl CacheVersion {
    /// Parse a `major.minor.patch.build` folder name
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split('.').map(|p| p.parse::<u32>().ok());
        let version = Self {
            major: parts.next()??,
            minor: parts.next()??,
            patch: parts.next()??,
            build: parts.next()??,
        };
        parts.next().is_none().then_some(version)
    }
}

fn data_file(folder: &Path) -> PathBuf {
    CACHE_DATA_FILE.iter().fold(folder.to_path_buf(), |p, part| p.join(part))
}

/// Data file of the newest versioned cache folder under `<install>/webCaches`
///
/// Versions compare numerically; on ties the folder enumerated later wins.
/// Without any versioned folder the unversioned cache is used.
pub fn newest_cache_file(install: &Path) -> Option<PathBuf> {
    let base = install.join("webCaches");
    if !base.is_dir() {
        return None;
    }

    let mut newest: Option<(CacheVersion, PathBuf)> = None;
    if let Ok(entries) = fs::read_dir(&base) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(version) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(CacheVersion::parse)
            else {
                continue;
            };

            let newer = newest
                .as_ref()
                .map_or(true, |(best, _)| version.cmp(best) != Ordering::Less);
            if newer {
                newest = Some((version, path));
            }
        }
    }

    let file = match newest {
        Some((version, folder)) => {
            tracing::debug!(?version, "Newest web cache folder");
            data_file(&folder)
        }
        None => data_file(&base),
    };

    file.is_file().then_some(file)
}

/// Find the last cached history link in raw cache bytes
///
/// Invalid UTF-8 is dropped, the text is split on `delimiter` and the parts
/// are scanned from the end. The matching part is cut at its first NUL.
pub fn extract_link_from_cache(bytes: &[u8], delimiter: &str, markers: &[String]) -> Option<String> {
    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();

    text.rsplit(delimiter)
        .filter(|part| part.starts_with("http"))
        .find(|part| markers.iter().any(|m| part.contains(m.as_str())))
        .and_then(|part| part.split('\0').next())
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Read the cache file, copying it aside when it is locked
fn read_cache_bytes(path: &Path, copy: Option<&CopyChain>) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cache file unreadable, trying copies");
            copy?
                .read_via_copy(path)
                .map_err(|e| tracing::debug!(error = %e, "Cache copy fallback failed"))
                .ok()
        }
    }
}

/// Link source scanning the embedded browser's web cache
pub struct CacheSource {
    log_paths: Vec<PathBuf>,
    header_lines: usize,
    delimiter: String,
    markers: Vec<String>,
    copy: Option<CopyChain>,
}

impl CacheSource {
    pub fn new(
        log_paths: Vec<PathBuf>,
        header_lines: usize,
        delimiter: &str,
        markers: Vec<String>,
        copy: Option<CopyChain>,
    ) -> Self {
        Self {
            log_paths,
            header_lines,
            delimiter: delimiter.to_string(),
            markers,
            copy,
        }
    }

    fn install_path(&self) -> Option<PathBuf> {
        self.log_paths
            .iter()
            .find_map(|log| install_path_from_log(log, self.header_lines))
    }
}

impl LinkSource for CacheSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CacheFile
    }

    fn find(&self) -> Option<String> {
        let Some(install) = self.install_path() else {
            tracing::debug!("Game install path not found in logs");
            return None;
        };

        let Some(file) = newest_cache_file(&install) else {
            tracing::debug!(install = %install.display(), "No web cache data file");
            return None;
        };

        let bytes = read_cache_bytes(&file, self.copy.as_ref())?;
        tracing::debug!(
            path = %file.display(),
            size = %format_bytes(bytes.len() as u64),
            "Scanning web cache"
        );

        extract_link_from_cache(&bytes, &self.delimiter, &self.markers)
    }
}
