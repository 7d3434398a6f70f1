//! Unified error handling for the warplog crate
//!
//! Domain errors live in [`crate::utils::error`]; this module gathers the ones
//! that end a run into a single [`Error`] enum for callers that cross module
//! boundaries.
//!
//! # Architecture
//!
//! - [`WarplogErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Why a fetch run could not produce any history
//!
//! # Usage
//!
//! ```rust
//! use warplog::error::{Error, ErrorCategory, WarplogErrorTrait};
//! use warplog::utils::error::FetchError;
//!
//! let err = Error::from(FetchError::Timeout);
//! assert_eq!(err.category(), ErrorCategory::Network);
//! assert!(err.is_recoverable());
//! ```

use thiserror::Error;

pub use crate::utils::error::{FetchError, ValidationError};

/// Common trait for all warplog error types
pub trait WarplogErrorTrait: std::error::Error {
    /// Whether trying again later may succeed
    fn is_recoverable(&self) -> bool;

    /// The error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP, timeout and API errors
    Network,
    /// Malformed responses and documents
    Parsing,
    /// Link discovery and validation errors
    Discovery,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Discovery => "discovery",
        }
    }
}

impl WarplogErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::ServerError(status) => *status == 429 || *status >= 500,
            // -110: requests too frequent
            Self::Api { retcode, .. } => *retcode == -110,
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::ServerError(_) | Self::Api { .. } | Self::Timeout => {
                ErrorCategory::Network
            }
            Self::Decode(_) => ErrorCategory::Parsing,
            Self::InvalidUrl(_) => ErrorCategory::Discovery,
        }
    }
}

impl WarplogErrorTrait for ValidationError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout => ErrorCategory::Network,
            _ => ErrorCategory::Discovery,
        }
    }
}

/// Unified error type for the warplog crate
#[derive(Error, Debug)]
pub enum Error {
    /// History request errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Link rejected by the probe request
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No history link in any local artifact
    #[error("No history link found")]
    NoLinkFound,
}

impl WarplogErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Validation(e) => e.is_recoverable(),
            Self::NoLinkFound => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Validation(e) => e.category(),
            Self::NoLinkFound => ErrorCategory::Discovery,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
