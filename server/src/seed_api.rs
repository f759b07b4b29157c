//! HTTP client for the filtered-seed service.
//!
//! The service is queried once per wanted seed at `<base url><filter name>`
//! and answers with a small JSON document carrying a `"seed":"<n>"` field.

use crate::seeds::{parse_seed_response, SeedCategory, SeedFetchOutcome, SeedFetchRequest};
use log::{debug, warn};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SeedApiError {
    #[error("seed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("seed service answered with HTTP {0}")]
    Status(u16),

    #[error("seed service response carried no seed")]
    MissingSeed,
}

#[derive(Debug, Clone)]
pub struct SeedApi {
    http: reqwest::Client,
    base_url: String,
}

impl SeedApi {
    pub fn new(base_url: &str) -> Result<Self, SeedApiError> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, SeedApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn url_for(&self, category: SeedCategory) -> String {
        format!("{}{}", self.base_url, category.filter_name())
    }

    pub async fn fetch_one(&self, category: SeedCategory) -> Result<i64, SeedApiError> {
        let url = self.url_for(category);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeedApiError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("Seed service answered {} bytes for {}", body.len(), url);
        parse_seed_response(&body).ok_or(SeedApiError::MissingSeed)
    }

    /// Asks for `request.count` seeds one at a time. Failed lookups are
    /// logged and skipped, so the outcome may hold fewer seeds.
    pub async fn fetch(&self, request: SeedFetchRequest) -> SeedFetchOutcome {
        let mut seeds = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            match self.fetch_one(request.category).await {
                Ok(seed) => seeds.push(seed),
                Err(e) => warn!("Failed to fetch a {} seed: {}", request.category, e),
            }
        }
        SeedFetchOutcome { request, seeds }
    }
}
