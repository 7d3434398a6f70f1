//! Fetch run orchestration
//!
//! A run walks through
//! `Idle → Discovering → Validating → FetchingCategory(i) → Done | Aborted`:
//!
//! 1. Discover a history link (skipped when a link is supplied)
//! 2. Probe it once; a rejected link aborts the run
//! 3. Fetch, merge and recompute statistics banner by banner
//! 4. Save the store and build the summary
//!
//! Runs execute on their own tokio task. Only one run may be active at a time;
//! [`Orchestrator::trigger`] returns `None` while one is in progress. Progress
//! is published as [`RunEvent`] values on a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::api::fetcher::HistoryFetcher;
use crate::api::validator::LinkValidator;
use crate::api::GachaClient;
use crate::config::{BannerSpec, Config};
use crate::discovery::{LinkDiscoverer, SourceKind};
use crate::error::{Error, Result, WarplogErrorTrait};
use crate::models::PullRecord;
use crate::stats::Summary;
use crate::storage::PersistedStore;
use crate::utils::error::ValidationError;

// ============================================================================
// Run State and Events
// ============================================================================

/// Why a run stopped before fetching anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    NoLinkFound,
    AuthExpired,
    MalformedParameters,
    Timeout,
    Unknown {
        status: Option<u16>,
        retcode: Option<i64>,
        message: String,
    },
}

impl AbortReason {
    /// What the user can do about it
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::NoLinkFound => {
                "Open the in-game warp history page once, then run the fetch again."
            }
            Self::AuthExpired => {
                "The history link has expired. Reopen the warp history page in game to refresh it."
            }
            Self::MalformedParameters => {
                "The history link is incomplete. Reopen the warp history page in game, or pass a full link with --url."
            }
            Self::Timeout => "The history server did not answer in time. Check the connection and try again.",
            Self::Unknown { .. } => "The history server rejected the link. Try again later.",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLinkFound => f.write_str("no history link found"),
            Self::AuthExpired => f.write_str("authkey expired"),
            Self::MalformedParameters => f.write_str("malformed link parameters"),
            Self::Timeout => f.write_str("validation timed out"),
            Self::Unknown {
                status,
                retcode,
                message,
            } => write!(f, "link rejected (status={status:?}, retcode={retcode:?}): {message}"),
        }
    }
}

impl From<ValidationError> for AbortReason {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::AuthExpired => Self::AuthExpired,
            ValidationError::MalformedParameters => Self::MalformedParameters,
            ValidationError::Timeout => Self::Timeout,
            ValidationError::Unknown {
                status,
                retcode,
                message,
            } => Self::Unknown {
                status,
                retcode,
                message,
            },
        }
    }
}

impl From<AbortReason> for Error {
    fn from(reason: AbortReason) -> Self {
        match reason {
            AbortReason::NoLinkFound => Self::NoLinkFound,
            AbortReason::AuthExpired => Self::Validation(ValidationError::AuthExpired),
            AbortReason::MalformedParameters => Self::Validation(ValidationError::MalformedParameters),
            AbortReason::Timeout => Self::Validation(ValidationError::Timeout),
            AbortReason::Unknown {
                status,
                retcode,
                message,
            } => Self::Validation(ValidationError::Unknown {
                status,
                retcode,
                message,
            }),
        }
    }
}

/// Current stage of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Discovering,
    Validating,
    FetchingCategory { index: usize, banner: String },
    Done,
    Aborted(AbortReason),
}

/// What happened to one banner during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CategoryStatus {
    Merged {
        fetched: usize,
        accepted: usize,
        endpoint: String,
        pages: u32,
    },
    NoData,
    /// The run stopped early; pages read before the failure are still merged
    Failed {
        error: String,
        page: u32,
        fetched: usize,
        accepted: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub banner: String,
    pub name: String,
    pub status: CategoryStatus,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Where the link came from; `None` when it was supplied
    pub source: Option<SourceKind>,
    pub categories: Vec<CategoryReport>,
    pub summary: Summary,
    /// Set when the store could not be written
    pub save_error: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    /// New records merged, including those kept from failed banners
    pub fn accepted(&self) -> usize {
        self.categories
            .iter()
            .map(|c| match c.status {
                CategoryStatus::Merged { accepted, .. } | CategoryStatus::Failed { accepted, .. } => accepted,
                CategoryStatus::NoData => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.categories
            .iter()
            .filter(|c| matches!(c.status, CategoryStatus::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunOutcome {
    Completed(RunReport),
    Aborted(AbortReason),
}

/// Progress notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunEvent {
    StateChanged(RunState),
    CategoryFinished(CategoryReport),
    Finished(RunOutcome),
}

// ============================================================================
// Run Guard
// ============================================================================

/// Marks a run as active until dropped
///
/// Dropping happens on every exit of the worker task, including a panic.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

struct Shared {
    config: Config,
    discoverer: Arc<LinkDiscoverer>,
    validator: LinkValidator,
    fetcher: HistoryFetcher,
    store: Arc<RwLock<PersistedStore>>,
    state: RwLock<RunState>,
    events: broadcast::Sender<RunEvent>,
}

/// Owns the store and sequences fetch runs
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Create an orchestrator discovering links from local game files
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` if the HTTP client cannot be created
    pub fn new(config: Config, store: PersistedStore) -> Result<Self> {
        let discoverer = LinkDiscoverer::from_config(&config.discovery);
        Self::with_discoverer(config, store, discoverer)
    }

    /// Create an orchestrator with a custom discovery chain
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` if the HTTP client cannot be created
    pub fn with_discoverer(
        config: Config,
        store: PersistedStore,
        discoverer: LinkDiscoverer,
    ) -> Result<Self> {
        let client = GachaClient::new(&config.api)?;
        let validator = LinkValidator::new(client.clone(), &config.api);
        let fetcher = HistoryFetcher::new(client, &config.api);
        let (events, _) = broadcast::channel(100);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                discoverer: Arc::new(discoverer),
                validator,
                fetcher,
                store: Arc::new(RwLock::new(store)),
                state: RwLock::new(RunState::Idle),
                events,
            }),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn state(&self) -> RunState {
        self.shared.state.read().await.clone()
    }

    /// Copy of the current store
    pub async fn snapshot(&self) -> PersistedStore {
        self.shared.store.read().await.clone()
    }

    /// Start a run that discovers its link; `None` if a run is already active
    pub fn trigger(&self) -> Option<JoinHandle<RunOutcome>> {
        self.trigger_with_link(None)
    }

    /// Start a run, using `link` instead of discovery when given
    pub fn trigger_with_link(&self, link: Option<String>) -> Option<JoinHandle<RunOutcome>> {
        let Some(guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("Run already in progress");
            return None;
        };

        let shared = Arc::clone(&self.shared);
        Some(tokio::spawn(async move {
            let _guard = guard;
            shared.run(link).await
        }))
    }
}

impl Shared {
    async fn set_state(&self, state: RunState) {
        *self.state.write().await = state.clone();
        tracing::debug!(?state, "Run state changed");
        let _ = self.events.send(RunEvent::StateChanged(state));
    }

    async fn finish(&self, outcome: RunOutcome) -> RunOutcome {
        let _ = self.events.send(RunEvent::Finished(outcome.clone()));
        outcome
    }

    async fn abort(&self, reason: AbortReason) -> RunOutcome {
        tracing::warn!(reason = %reason, "Run aborted");
        self.set_state(RunState::Aborted(reason.clone())).await;
        self.finish(RunOutcome::Aborted(reason)).await
    }

    async fn discover(&self) -> Option<(String, SourceKind)> {
        let discoverer = Arc::clone(&self.discoverer);
        match tokio::task::spawn_blocking(move || discoverer.discover()).await {
            Ok(candidate) => candidate.map(|c| (c.url, c.source)),
            Err(e) => {
                tracing::error!(error = %e, "Discovery task failed");
                None
            }
        }
    }

    async fn run(&self, link: Option<String>) -> RunOutcome {
        let started = Instant::now();

        let (link, source) = match link {
            Some(link) => (link, None),
            None => {
                self.set_state(RunState::Discovering).await;
                match self.discover().await {
                    Some((link, source)) => (link, Some(source)),
                    None => return self.abort(AbortReason::NoLinkFound).await,
                }
            }
        };

        self.set_state(RunState::Validating).await;
        if let Some(err) = self.validator.probe(&link).await.error() {
            return self.abort(err.into()).await;
        }

        let banners = &self.config.banners;
        let mut categories = Vec::with_capacity(banners.len());
        for (index, banner) in banners.iter().enumerate() {
            self.set_state(RunState::FetchingCategory {
                index,
                banner: banner.id.clone(),
            })
            .await;

            let report = self.fetch_category(&link, banner).await;
            let _ = self.events.send(RunEvent::CategoryFinished(report.clone()));
            categories.push(report);

            if index + 1 < banners.len() {
                tokio::time::sleep(self.config.api.category_delay()).await;
            }
        }

        let snapshot = self.store.read().await.clone();
        let summary = snapshot.summary(banners);
        let save_error = self.save(snapshot).await;

        let report = RunReport {
            source,
            categories,
            summary,
            save_error,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            accepted = report.accepted(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Run complete"
        );

        self.set_state(RunState::Done).await;
        self.finish(RunOutcome::Completed(report)).await
    }

    async fn fetch_category(&self, link: &str, banner: &BannerSpec) -> CategoryReport {
        let status = match self.fetcher.fetch(link, banner, &self.config.api.lang).await {
            Ok(fetched) if fetched.records.is_empty() => {
                tracing::info!(banner = %banner.id, "No data available");
                CategoryStatus::NoData
            }
            Ok(fetched) => {
                let count = fetched.records.len();
                let accepted = self.merge(banner, fetched.records).await;
                tracing::info!(banner = %banner.id, fetched = count, accepted, "Banner merged");
                CategoryStatus::Merged {
                    fetched: count,
                    accepted,
                    endpoint: fetched.endpoint,
                    pages: fetched.pages,
                }
            }
            Err(failure) => {
                let fetched = failure.partial.len();
                tracing::warn!(
                    banner = %banner.id,
                    error = %failure,
                    category = failure.error.category().as_str(),
                    recoverable = failure.error.is_recoverable(),
                    fetched,
                    "Banner failed, keeping records read so far"
                );
                let accepted = self.merge(banner, failure.partial).await;
                CategoryStatus::Failed {
                    error: failure.error.to_string(),
                    page: failure.page,
                    fetched,
                    accepted,
                }
            }
        };

        CategoryReport {
            banner: banner.id.clone(),
            name: banner.name.clone(),
            status,
        }
    }

    async fn merge(&self, banner: &BannerSpec, records: Vec<PullRecord>) -> usize {
        if records.is_empty() {
            return 0;
        }
        self.store
            .write()
            .await
            .merge(&banner.id, &banner.name, records)
    }

    async fn save(&self, snapshot: PersistedStore) -> Option<String> {
        let path = self.config.storage.store_path.clone();
        let result = tokio::task::spawn_blocking(move || snapshot.save(&path)).await;

        match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::error!(error = %format!("{e:#}"), "Failed to save store");
                Some(format!("{e:#}"))
            }
            Err(e) => {
                tracing::error!(error = %e, "Save task failed");
                Some(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_rearms_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));

        let guard = RunGuard::acquire(&flag).unwrap();
        assert!(RunGuard::acquire(&flag).is_none());
        drop(guard);

        assert!(RunGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_guard_rearms_after_panic() {
        let flag = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&flag);

        let result = std::panic::catch_unwind(move || {
            let _guard = RunGuard::acquire(&inner).unwrap();
            panic!("worker panicked");
        });

        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_abort_reason_from_validation() {
        assert_eq!(AbortReason::from(ValidationError::AuthExpired), AbortReason::AuthExpired);
        assert_eq!(AbortReason::from(ValidationError::Timeout), AbortReason::Timeout);
        assert!(!AbortReason::AuthExpired.remediation().is_empty());
        assert_eq!(AbortReason::NoLinkFound.to_string(), "no history link found");
    }

    #[test]
    fn test_abort_reason_into_error() {
        let err = Error::from(AbortReason::NoLinkFound);
        assert!(matches!(err, Error::NoLinkFound));
        assert_eq!(err.category().as_str(), "discovery");

        let err = Error::from(AbortReason::Timeout);
        assert!(matches!(err, Error::Validation(ValidationError::Timeout)));
        assert!(err.is_recoverable());

        let reason = AbortReason::Unknown {
            status: Some(403),
            retcode: None,
            message: "HTTP 403".into(),
        };
        assert_eq!(Error::from(reason.clone()).to_string(), format!("Validation error: {reason}"));
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            source: None,
            categories: vec![
                CategoryReport {
                    banner: "11".into(),
                    name: "Limited".into(),
                    status: CategoryStatus::Merged {
                        fetched: 5,
                        accepted: 3,
                        endpoint: "getGachaLog".into(),
                        pages: 1,
                    },
                },
                CategoryReport {
                    banner: "12".into(),
                    name: "Light cone".into(),
                    status: CategoryStatus::Failed {
                        error: "Request timeout".into(),
                        page: 2,
                        fetched: 20,
                        accepted: 4,
                    },
                },
            ],
            summary: Summary::default(),
            save_error: None,
            duration_ms: 0,
        };

        assert_eq!(report.accepted(), 7);
        assert_eq!(report.failed(), 1);
    }
}
