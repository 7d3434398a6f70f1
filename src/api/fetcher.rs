//! Paginated history fetcher
//!
//! Walks one banner's history page by page using the `end_id` cursor:
//! - Cursor starts at `"0"` and advances to the last id of each page
//! - An empty page, or a page whose last record has no id, ends the run
//! - Fixed delay between pages
//! - One retry against the default endpoint for alternate-eligible banners
//!   whose primary endpoint yields nothing

use std::time::Duration;

use thiserror::Error;
use url::Url;

use super::{page_url, parse_link, GachaClient, PageQuery};
use crate::config::{ApiConfig, BannerSpec};
use crate::models::PullRecord;
use crate::utils::error::FetchError;

/// Everything one banner produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedCategory {
    /// Records newest first, as served
    pub records: Vec<PullRecord>,

    /// Endpoint variant that produced `records`
    pub endpoint: String,

    /// Pages that returned records
    pub pages: u32,

    /// No endpoint variant had any record for this banner
    pub no_data: bool,
}

/// A run that stopped on an error
#[derive(Debug, Error)]
#[error("{endpoint} failed on page {page}: {error}")]
pub struct FetchFailure {
    #[source]
    pub error: FetchError,

    /// Endpoint variant in use when the error happened
    pub endpoint: String,

    /// Page number that failed, starting at 1
    pub page: u32,

    /// Records collected before the failure
    pub partial: Vec<PullRecord>,
}

impl FetchFailure {
    fn new(error: FetchError, endpoint: &str, page: u32, partial: Vec<PullRecord>) -> Self {
        Self {
            error,
            endpoint: endpoint.to_string(),
            page,
            partial,
        }
    }
}

/// Fetches complete banner histories
pub struct HistoryFetcher {
    client: GachaClient,
    page_size: u32,
    page_delay: Duration,
    default_endpoint: String,
}

impl HistoryFetcher {
    pub fn new(client: GachaClient, config: &ApiConfig) -> Self {
        Self {
            client,
            page_size: config.page_size,
            page_delay: config.page_delay(),
            default_endpoint: config.default_endpoint.clone(),
        }
    }

    /// Override the pause between pages
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Fetch the whole history of `banner`
    ///
    /// # Errors
    ///
    /// Returns `FetchFailure` when a request fails, except on alternate-eligible
    /// banners where no endpoint variant produced any record
    pub async fn fetch(
        &self,
        link: &str,
        banner: &BannerSpec,
        lang: &str,
    ) -> Result<FetchedCategory, FetchFailure> {
        let primary = banner.primary_endpoint(&self.default_endpoint);
        let base = parse_link(link).map_err(|e| FetchFailure::new(e, primary, 1, Vec::new()))?;

        let first = self.run(&base, banner, lang, primary).await;

        let retry = banner.alternate_eligible && primary != self.default_endpoint && yielded_nothing(&first);
        if !retry {
            return first;
        }

        match &first {
            Ok(_) => tracing::info!(banner = %banner.id, endpoint = primary, "No records, trying default endpoint"),
            Err(e) => tracing::warn!(banner = %banner.id, error = %e, "Primary endpoint failed, trying default endpoint"),
        }

        let second = self.run(&base, banner, lang, &self.default_endpoint).await;
        if !yielded_nothing(&second) {
            return second;
        }

        if let Err(e) = &second {
            tracing::warn!(banner = %banner.id, error = %e, "Default endpoint failed");
        }
        tracing::info!(banner = %banner.id, "No data on any endpoint");

        Ok(FetchedCategory {
            records: Vec::new(),
            endpoint: self.default_endpoint.clone(),
            pages: 0,
            no_data: true,
        })
    }

    /// One complete pagination run against a single endpoint variant
    async fn run(
        &self,
        base: &Url,
        banner: &BannerSpec,
        lang: &str,
        endpoint: &str,
    ) -> Result<FetchedCategory, FetchFailure> {
        let mut records: Vec<PullRecord> = Vec::new();
        let mut cursor = String::from("0");
        let mut page: u32 = 1;

        loop {
            let query = PageQuery {
                gacha_type: &banner.id,
                page,
                size: self.page_size,
                end_id: &cursor,
                lang: Some(lang),
            };
            let url = page_url(base, endpoint, &query);

            let batch = match self.client.get_page(url, None).await {
                Ok(batch) => batch,
                Err(error) => {
                    tracing::warn!(
                        banner = %banner.id,
                        endpoint,
                        page,
                        collected = records.len(),
                        error = %error,
                        "Page request failed"
                    );
                    return Err(FetchFailure::new(error, endpoint, page, records));
                }
            };

            if batch.is_empty() {
                break;
            }

            let count = batch.len();
            records.extend(batch.into_iter().map(|raw| raw.into_record(&banner.id)));

            tracing::debug!(
                banner = %banner.id,
                endpoint,
                page,
                count,
                total = records.len(),
                "Fetched page"
            );
            page += 1;

            // the API pages by id; without one the next request would restart at the newest page
            match records.last().map(PullRecord::id).filter(|id| !id.is_empty()) {
                Some(id) => cursor = id.to_string(),
                None => {
                    tracing::warn!(banner = %banner.id, endpoint, pages = page - 1, "Last record has no id, stopping");
                    break;
                }
            }

            tokio::time::sleep(self.page_delay).await;
        }

        let pages = page - 1;
        tracing::info!(
            banner = %banner.id,
            endpoint,
            pages,
            records = records.len(),
            "Banner fetch complete"
        );

        Ok(FetchedCategory {
            no_data: records.is_empty(),
            records,
            endpoint: endpoint.to_string(),
            pages,
        })
    }
}

fn yielded_nothing(result: &Result<FetchedCategory, FetchFailure>) -> bool {
    match result {
        Ok(fetched) => fetched.records.is_empty(),
        Err(failure) => failure.partial.is_empty(),
    }
}
