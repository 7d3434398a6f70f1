//! Game log scan
//!
//! The client prints the history link to `Player.log` whenever the in-game
//! history page is opened. The log's text encoding depends on the client
//! build and locale, so decoding is an ordered list of attempts, each of which
//! yields a [`Decoded`] value.
//!
//! Link extraction tries host-specific patterns before the generic one and
//! keeps the last match of a pattern, which is the most recent occurrence.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use encoding_rs::{Encoding, EUC_KR, UTF_16LE, UTF_8, WINDOWS_1252};
use regex::{Regex, RegexBuilder};

use super::{LinkSource, SourceKind};

/// Encodings tried in order when reading a log file
pub const LOG_ENCODINGS: &[&Encoding] = &[UTF_8, UTF_16LE, EUC_KR, WINDOWS_1252];

/// Host fragments of the known history API deployments, most specific first
const HOST_HINTS: &[&str] = &[
    "public-operation-hkrpg",
    "hkrpg-api",
    "api-os-takumi",
    "hoyoverse",
    "mihoyo",
];

/// Characters that never belong to a URL copied out of log text
const URL_CHARS: &str = r#"[^\s"'<>\[\]{}|\\^`]"#;

/// Characters stripped from both ends of an extracted link
const WRAPPING: &[char] = &['"', ',', '\'', '(', ')', '[', ']', '{', '}'];

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Text(String),
    Failed(&'static str),
}

/// Decode `bytes` strictly with `encoding`; a BOM does not switch encodings
pub fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> Decoded {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        Decoded::Failed(encoding.name())
    } else {
        Decoded::Text(text.into_owned())
    }
}

/// All decode attempts for `bytes`, in [`LOG_ENCODINGS`] order
pub fn decode_attempts(bytes: &[u8]) -> impl Iterator<Item = Decoded> + '_ {
    LOG_ENCODINGS.iter().map(move |encoding| decode_with(encoding, bytes))
}

/// Ordered link patterns for `marker`: host-specific first, generic last
pub fn link_patterns(marker: &str) -> Vec<Regex> {
    let marker = regex::escape(marker);

    let mut sources: Vec<String> = HOST_HINTS
        .iter()
        .map(|host| format!(r"https://\S*?{}\S*?{marker}\S*", regex::escape(host)))
        .collect();
    sources.push(format!("https://{URL_CHARS}*{marker}{URL_CHARS}*"));

    sources
        .iter()
        .filter_map(|source| {
            RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .map_err(|e| tracing::warn!(pattern = %source, error = %e, "Skipping link pattern"))
                .ok()
        })
        .collect()
}

fn strip_wrapping(link: &str) -> &str {
    link.trim_matches(WRAPPING)
}

/// Extract the most recent history link from log text
///
/// Falls back to a line-by-line scan when no pattern matches.
pub fn extract_link(content: &str, marker: &str, patterns: &[Regex]) -> Option<String> {
    for pattern in patterns {
        if let Some(last) = pattern.find_iter(content).last() {
            let link = strip_wrapping(last.as_str());
            if !link.is_empty() && link.contains(marker) {
                return Some(link.to_string());
            }
        }
    }

    manual_scan(content, marker)
}

fn manual_scan(content: &str, marker: &str) -> Option<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();

    let re = URL_RE
        .get_or_init(|| Regex::new(&format!("https://{URL_CHARS}*")).expect("Invalid regex pattern"));

    content
        .lines()
        .filter(|line| line.contains(marker) && line.contains("https://"))
        .filter_map(|line| re.find(line))
        .map(|m| strip_wrapping(m.as_str()))
        .find(|link| !link.is_empty() && link.contains(marker))
        .map(str::to_string)
}

/// Read the install path printed near the top of a log file
///
/// Only the first `max_lines` lines are read; the path must exist on disk.
pub fn install_path_from_log(path: &Path, max_lines: usize) -> Option<PathBuf> {
    const PREFIX: &str = "Loading player data from ";

    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    for _ in 0..max_lines {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let line = String::from_utf8_lossy(&buf);
        if let Some(rest) = line.trim().strip_prefix(PREFIX) {
            let install = rest.replace("data.unity3d", "");
            let install = PathBuf::from(install.trim());
            if !install.as_os_str().is_empty() && install.exists() {
                tracing::debug!(path = %install.display(), "Game install path found");
                return Some(install);
            }
        }
    }

    None
}

/// Link source scanning the client's log files
pub struct LogSource {
    paths: Vec<PathBuf>,
    marker: String,
    patterns: Vec<Regex>,
}

impl LogSource {
    pub fn new(paths: Vec<PathBuf>, marker: &str) -> Self {
        Self {
            paths,
            marker: marker.to_string(),
            patterns: link_patterns(marker),
        }
    }

    fn scan_file(&self, path: &Path) -> Option<String> {
        let bytes = fs::read(path)
            .map_err(|e| tracing::debug!(path = %path.display(), error = %e, "Failed to read log"))
            .ok()?;

        for attempt in decode_attempts(&bytes) {
            let text = match attempt {
                Decoded::Text(text) => text,
                Decoded::Failed(encoding) => {
                    tracing::trace!(path = %path.display(), encoding, "Decode failed");
                    continue;
                }
            };

            if !text.contains(&self.marker) {
                continue;
            }

            if let Some(link) = extract_link(&text, &self.marker, &self.patterns) {
                return Some(link);
            }
        }

        None
    }
}

impl LinkSource for LogSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LogFile
    }

    fn find(&self) -> Option<String> {
        for path in &self.paths {
            let size = match fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => continue,
            };
            if size == 0 {
                continue;
            }

            tracing::debug!(path = %path.display(), size, "Scanning game log");
            if let Some(link) = self.scan_file(path) {
                return Some(link);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MARKER: &str = "getGachaLog";

    #[test]
    fn test_last_match_wins() {
        let content = "\
[info] open https://public-operation-hkrpg-sg.hoyoverse.com/common/gacha_record/api/getGachaLog?authkey=OLD&lang=en
[info] something else
[info] open https://public-operation-hkrpg-sg.hoyoverse.com/common/gacha_record/api/getGachaLog?authkey=NEW&lang=en
";
        let link = extract_link(content, MARKER, &link_patterns(MARKER)).unwrap();
        assert!(link.ends_with("authkey=NEW&lang=en"));
    }

    #[test]
    fn test_wrapping_characters_stripped() {
        let content = r#"OnGetWebViewPageFinish:("https://api-os-takumi.mihoyo.com/common/api/getGachaLog?authkey=A")"#;
        let link = extract_link(content, MARKER, &link_patterns(MARKER)).unwrap();
        assert_eq!(link, "https://api-os-takumi.mihoyo.com/common/api/getGachaLog?authkey=A");
    }

    #[test]
    fn test_generic_pattern_catches_unknown_host() {
        let content = "url: 'https://example.org/api/getGachaLog?authkey=Z' done";
        let link = extract_link(content, MARKER, &link_patterns(MARKER)).unwrap();
        assert_eq!(link, "https://example.org/api/getGachaLog?authkey=Z");
    }

    #[test]
    fn test_no_link() {
        let content = "getGachaLog was mentioned but http://insecure.example/getGachaLog is not https";
        assert!(extract_link(content, MARKER, &link_patterns(MARKER)).is_none());
    }

    #[test]
    fn test_decode_attempts_order() {
        let attempts: Vec<Decoded> = decode_attempts(&[0xff, 0xfe, 0x41]).collect();
        assert_eq!(attempts.len(), LOG_ENCODINGS.len());
        assert!(matches!(attempts[0], Decoded::Failed(_)));
        assert!(matches!(attempts.last(), Some(Decoded::Text(_))));
    }

    #[test]
    fn test_log_source_reads_utf16_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Player.log");
        let text = "boot\nhttps://public-operation-hkrpg.mihoyo.com/common/gacha_record/api/getGachaLog?authkey=U16\n";
        let mut bytes = Vec::new();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&path, bytes).unwrap();

        let source = LogSource::new(vec![dir.path().join("missing.log"), path], MARKER);
        assert_eq!(
            source.find().as_deref(),
            Some("https://public-operation-hkrpg.mihoyo.com/common/gacha_record/api/getGachaLog?authkey=U16")
        );
    }

    #[test]
    fn test_log_source_skips_empty_files() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("Player.log");
        fs::write(&empty, b"").unwrap();
        let prev = dir.path().join("Player-prev.log");
        fs::write(&prev, "https://hkrpg-api.example.com/getGachaLog?authkey=P\n").unwrap();

        let source = LogSource::new(vec![empty, prev], MARKER);
        assert_eq!(
            source.find().as_deref(),
            Some("https://hkrpg-api.example.com/getGachaLog?authkey=P")
        );
    }

    #[test]
    fn test_install_path_from_log() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("StarRail_Data");
        fs::create_dir_all(&data_dir).unwrap();

        let log = dir.path().join("Player.log");
        let line = format!(
            "Mono path[0] = 'x'\nLoading player data from {}/data.unity3d\n",
            data_dir.display()
        );
        fs::write(&log, line).unwrap();

        let found = install_path_from_log(&log, 11).unwrap();
        assert_eq!(found.canonicalize().unwrap(), data_dir.canonicalize().unwrap());
    }

    #[test]
    fn test_install_path_outside_scan_window() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("Player.log");
        let mut text = "filler\n".repeat(11);
        text.push_str(&format!("Loading player data from {}/data.unity3d\n", dir.path().display()));
        fs::write(&log, text).unwrap();

        assert!(install_path_from_log(&log, 11).is_none());
    }
}
