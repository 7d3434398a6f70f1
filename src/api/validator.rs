//! Link validation
//!
//! A discovered link is only worth a full run if its authkey is still
//! accepted. The probe asks for a handful of standard-banner pulls and
//! reports the raw outcome; callers that only need a yes/no use
//! [`LinkValidator::validate`].

use std::time::Duration;

use super::{page_url, parse_link, GachaClient, PageQuery};
use crate::config::ApiConfig;
use crate::utils::error::{FetchError, ValidationError};
use crate::utils::redact_link;

/// API code for an expired authkey
pub const RETCODE_AUTH_EXPIRED: i64 = -101;

/// API code for wrong or missing link parameters
pub const RETCODE_MALFORMED: i64 = -111;

/// Raw result of one probe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// HTTP 200 with `retcode` 0
    Valid,
    /// The server answered but refused the link
    Rejected {
        status: Option<u16>,
        retcode: Option<i64>,
        message: String,
    },
    /// No answer within the probe timeout
    TimedOut,
    /// The request never produced a response
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Classify a failed probe; `None` for [`ProbeOutcome::Valid`]
    pub fn error(&self) -> Option<ValidationError> {
        match self {
            Self::Valid => None,
            Self::Rejected {
                retcode: Some(RETCODE_AUTH_EXPIRED),
                ..
            } => Some(ValidationError::AuthExpired),
            Self::Rejected {
                retcode: Some(RETCODE_MALFORMED),
                ..
            } => Some(ValidationError::MalformedParameters),
            Self::Rejected {
                status,
                retcode,
                message,
            } => Some(ValidationError::Unknown {
                status: *status,
                retcode: *retcode,
                message: message.clone(),
            }),
            Self::TimedOut => Some(ValidationError::Timeout),
            Self::Unreachable(message) => Some(ValidationError::Unknown {
                status: None,
                retcode: None,
                message: message.clone(),
            }),
        }
    }

    fn from_fetch_error(err: FetchError) -> Self {
        match err {
            FetchError::ServerError(status) => Self::Rejected {
                status: Some(status),
                retcode: None,
                message: format!("HTTP {status}"),
            },
            FetchError::Api { retcode, message } => Self::Rejected {
                status: Some(200),
                retcode: Some(retcode),
                message,
            },
            FetchError::Decode(message) => Self::Rejected {
                status: Some(200),
                retcode: None,
                message,
            },
            FetchError::Timeout => Self::TimedOut,
            FetchError::InvalidUrl(message) => Self::Rejected {
                status: None,
                retcode: None,
                message,
            },
            FetchError::Http(e) => Self::Unreachable(e.to_string()),
        }
    }
}

/// Probes discovered links against the history API
pub struct LinkValidator {
    client: GachaClient,
    endpoint: String,
    gacha_type: String,
    page_size: u32,
    timeout: Duration,
}

impl LinkValidator {
    pub fn new(client: GachaClient, config: &ApiConfig) -> Self {
        Self {
            client,
            endpoint: config.default_endpoint.clone(),
            gacha_type: config.probe_gacha_type.clone(),
            page_size: config.probe_page_size,
            timeout: config.probe_timeout(),
        }
    }

    /// Send the probe request and report what came back
    pub async fn probe(&self, link: &str) -> ProbeOutcome {
        let base = match parse_link(link) {
            Ok(url) => url,
            Err(e) => return ProbeOutcome::from_fetch_error(e),
        };

        let query = PageQuery {
            gacha_type: &self.gacha_type,
            page: 1,
            size: self.page_size,
            end_id: "0",
            lang: None,
        };
        let url = page_url(&base, &self.endpoint, &query);

        let outcome = match self.client.get_page(url, Some(self.timeout)).await {
            Ok(_) => ProbeOutcome::Valid,
            Err(e) => ProbeOutcome::from_fetch_error(e),
        };

        match &outcome {
            ProbeOutcome::Valid => tracing::info!(link = %redact_link(link), "Link accepted"),
            other => tracing::warn!(link = %redact_link(link), outcome = ?other, "Link rejected"),
        }

        outcome
    }

    /// Whether the link is currently accepted; never errors
    pub async fn validate(&self, link: &str) -> bool {
        self.probe(link).await.is_valid()
    }
}
