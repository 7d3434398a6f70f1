//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use url::Url;

/// Render a discovered link for logs without leaking its authkey
///
/// Keeps scheme, host and path; the query string is replaced by `?…`.
/// Strings that do not parse as URLs are truncated instead.
pub fn redact_link(link: &str) -> String {
    match Url::parse(link) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            let suffix = if parsed.query().is_some() { "?…" } else { "" };
            format!("{}://{}{}{suffix}", parsed.scheme(), host, parsed.path())
        }
        Err(_) => truncate_text(link, 48),
    }
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Format byte size as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return String::from("0 B");
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes as f64 / base.powi(exponent as i32);

    format!("{value:.2} {}", UNITS[exponent])
}
