//! History API client
//!
//! Thin wrapper around `reqwest` for the pull history endpoint:
//! - Endpoint variant switching on the discovered link
//! - Page query construction on top of the link's own parameters
//! - Response envelope decoding and `retcode` checking
//!
//! Higher-level behavior lives in [`fetcher`] (pagination) and
//! [`validator`] (link probing).

pub mod fetcher;
pub mod validator;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::config::{ApiConfig, COLLABORATION_ENDPOINT, DEFAULT_ENDPOINT};
use crate::models::{PullRecord, DEFAULT_RANK};
use crate::utils::error::FetchError;

/// Query parameters owned by the client; any copies in the link are replaced
const PAGE_PARAMS: &[&str] = &["gacha_type", "page", "size", "end_id", "lang"];

/// Endpoint variants the client knows how to swap between
const KNOWN_ENDPOINTS: &[&str] = &[DEFAULT_ENDPOINT, COLLABORATION_ENDPOINT];

// ============================================================================
// Wire types
// ============================================================================

/// Response envelope shared by every history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub retcode: i64,

    #[serde(default)]
    pub message: String,

    /// Absent or `null` on API errors
    #[serde(default)]
    pub data: Option<PageData>,
}

/// One page of history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageData {
    #[serde(default)]
    pub list: Vec<RawRecord>,
}

/// A pull exactly as the API returns it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Usually a numeric string; occasionally a bare number
    #[serde(default)]
    pub rank_type: Option<serde_json::Value>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub gacha_type: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
}

impl RawRecord {
    /// Rank parsed from `rank_type`, [`DEFAULT_RANK`] when missing or garbled
    pub fn rank(&self) -> u8 {
        let parsed = match &self.rank_type {
            Some(serde_json::Value::String(s)) => s.trim().parse::<u8>().ok(),
            Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
            _ => None,
        };
        parsed.unwrap_or(DEFAULT_RANK)
    }

    /// Convert into a [`PullRecord`]; `banner` fills a missing `gacha_type`
    pub fn into_record(self, banner: &str) -> PullRecord {
        let rank = self.rank();
        let gacha_type = self
            .gacha_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| banner.to_string());

        PullRecord::new(
            self.id.unwrap_or_default(),
            self.name.unwrap_or_default(),
            rank,
            self.time.unwrap_or_default(),
            gacha_type,
        )
        .with_item_type(self.item_type.unwrap_or_default())
        .with_uid(self.uid.unwrap_or_default())
    }
}

// ============================================================================
// Query construction
// ============================================================================

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery<'a> {
    pub gacha_type: &'a str,
    pub page: u32,
    pub size: u32,
    pub end_id: &'a str,
    /// `None` keeps the link's own `lang`
    pub lang: Option<&'a str>,
}

/// Point `link` at `endpoint` by replacing its final path segment
///
/// Links whose path does not end in a known endpoint are left untouched.
pub fn with_endpoint(link: &Url, endpoint: &str) -> Url {
    let mut url = link.clone();
    let path = url.path().to_string();

    match path.rsplit_once('/') {
        Some((head, last)) if KNOWN_ENDPOINTS.contains(&last) => {
            url.set_path(&format!("{head}/{endpoint}"));
        }
        _ => tracing::debug!(path = %path, "Link path has no known endpoint"),
    }

    url
}

/// Build the request URL for one page
///
/// The link's own parameters (authkey and friends) are kept in their original
/// order; page parameters are appended after them and override duplicates.
pub fn page_url(link: &Url, endpoint: &str, query: &PageQuery<'_>) -> Url {
    let mut url = with_endpoint(link, endpoint);

    let skip: &[&str] = if query.lang.is_some() {
        PAGE_PARAMS
    } else {
        &PAGE_PARAMS[..PAGE_PARAMS.len() - 1]
    };
    let kept: Vec<(String, String)> = link
        .query_pairs()
        .filter(|(k, _)| !skip.contains(&&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs
            .append_pair("gacha_type", query.gacha_type)
            .append_pair("page", &query.page.to_string())
            .append_pair("size", &query.size.to_string())
            .append_pair("end_id", query.end_id);
        if let Some(lang) = query.lang {
            pairs.append_pair("lang", lang);
        }
    }

    url
}

/// Parse a discovered link
///
/// # Errors
///
/// Returns `FetchError::InvalidUrl` unless the link is an absolute http(s) URL
pub fn parse_link(link: &str) -> Result<Url, FetchError> {
    let url = Url::parse(link.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the history API
#[derive(Clone)]
pub struct GachaClient {
    client: Client,
}

impl GachaClient {
    /// Create a client with the configured request timeout and user agent
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    /// Request one page and return its raw records
    ///
    /// `timeout` overrides the client-wide timeout for this request.
    ///
    /// # Errors
    ///
    /// - `FetchError::ServerError` on any status other than 200
    /// - `FetchError::Api` on a non-zero `retcode`
    /// - `FetchError::Decode` when the body is not a valid envelope
    /// - `FetchError::Timeout` / `FetchError::Http` on transport failures
    pub async fn get_page(&self, url: Url, timeout: Option<Duration>) -> Result<Vec<RawRecord>, FetchError> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(FetchError::from_transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(FetchError::from_transport)?;
        let envelope: ApiResponse =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;

        if envelope.retcode != 0 {
            return Err(FetchError::Api {
                retcode: envelope.retcode,
                message: envelope.message,
            });
        }

        Ok(envelope.data.map(|d| d.list).unwrap_or_default())
    }
}
