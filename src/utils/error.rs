//! Error types for the warplog pipeline
//!
//! This module defines the domain errors raised by the API client, the
//! history fetcher and the cache copy fallback.

use thiserror::Error;

/// Errors that can occur while requesting one page of history
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-200 HTTP status
    #[error("Server error: {0}")]
    ServerError(u16),

    /// The API answered with a non-zero retcode
    #[error("API error: retcode={retcode}, message={message}")]
    Api {
        /// Raw response code
        retcode: i64,
        /// Message returned alongside the code
        message: String,
    },

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// The discovered link is not a usable URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Classify a reqwest error, separating timeouts from other transport failures
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Raw API response code, when the failure came from the API itself
    pub fn retcode(&self) -> Option<i64> {
        match self {
            Self::Api { retcode, .. } => Some(*retcode),
            _ => None,
        }
    }
}

/// Why a discovered link was rejected by the probe request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The embedded authkey is past its lifetime (retcode -101)
    #[error("authkey expired")]
    AuthExpired,

    /// The link carries wrong or missing parameters (retcode -111)
    #[error("malformed link parameters")]
    MalformedParameters,

    /// The probe did not answer in time
    #[error("probe request timed out")]
    Timeout,

    /// Any other rejection
    #[error("link rejected (status={status:?}, retcode={retcode:?}): {message}")]
    Unknown {
        /// HTTP status, if a response arrived
        status: Option<u16>,
        /// API retcode, if the body parsed
        retcode: Option<i64>,
        /// Server message or transport error text
        message: String,
    },
}

/// Errors from the locked-cache copy fallback
#[derive(Error, Debug)]
pub enum CopyError {
    /// Temporary file could not be created
    #[error("failed to create temporary copy target: {0}")]
    TempFile(#[source] std::io::Error),

    /// Every copy strategy failed or produced an empty file
    #[error("all {attempted} copy strategies failed for {path}")]
    Exhausted {
        /// Source path that could not be copied
        path: String,
        /// Number of strategies attempted
        attempted: usize,
    },
}
