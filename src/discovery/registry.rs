//! Registry scan
//!
//! The client keeps a copy of the history link as a string value under its
//! application key. Values are read through [`RegistryReader`]; the default
//! reader runs the OS `reg query` utility and parses its listing.

use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use super::{LinkSource, SourceKind};

/// Enumerates string values stored under a registry key
pub trait RegistryReader: Send + Sync {
    /// All string values under `key`; empty when the key is missing or unreadable
    fn string_values(&self, key: &str) -> Vec<String>;
}

/// Reader backed by the `reg` command line utility
pub struct RegQuery {
    binary: Option<PathBuf>,
}

impl RegQuery {
    /// Create a reader with an explicit `reg` binary
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary: Some(binary),
        }
    }

    /// Locate `reg` in PATH; on non-Windows hosts the reader yields nothing
    pub fn from_path() -> Self {
        let binary = if cfg!(windows) {
            which::which("reg").ok()
        } else {
            None
        };
        Self { binary }
    }
}

impl RegistryReader for RegQuery {
    fn string_values(&self, key: &str) -> Vec<String> {
        let Some(binary) = &self.binary else {
            return Vec::new();
        };

        let output = match Command::new(binary).arg("query").arg(key).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(key, error = %e, "Failed to run reg query");
                return Vec::new();
            }
        };

        if !output.status.success() {
            tracing::debug!(key, "Registry key not present");
            return Vec::new();
        }

        parse_reg_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract the data of every string-typed value from `reg query` output
///
/// Value lines look like `    <name>    REG_SZ    <data>`; names may contain
/// single spaces, columns are separated by four.
pub fn parse_reg_query_output(output: &str) -> Vec<String> {
    static VALUE_RE: OnceLock<Regex> = OnceLock::new();

    let re = VALUE_RE.get_or_init(|| {
        Regex::new(r"^\s+(.*?)\s{4}(REG_SZ|REG_EXPAND_SZ|REG_MULTI_SZ)\s{4}(.*)$")
            .expect("Invalid regex pattern")
    });

    output
        .lines()
        .filter_map(|line| re.captures(line.trim_end_matches('\r')))
        .filter_map(|caps| caps.get(3).map(|m| m.as_str().to_string()))
        .collect()
}

/// Link source scanning a fixed list of registry keys
pub struct RegistrySource {
    reader: Box<dyn RegistryReader>,
    keys: Vec<String>,
    marker: String,
}

impl RegistrySource {
    pub fn new(reader: Box<dyn RegistryReader>, keys: Vec<String>, marker: &str) -> Self {
        Self {
            reader,
            keys,
            marker: marker.to_string(),
        }
    }
}

impl LinkSource for RegistrySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn find(&self) -> Option<String> {
        for key in &self.keys {
            let values = self.reader.string_values(key);
            tracing::trace!(key = %key, values = values.len(), "Scanned registry key");

            if let Some(value) = values.into_iter().find(|v| v.contains(&self.marker)) {
                return Some(value.trim().to_string());
            }
        }
        None
    }
}
