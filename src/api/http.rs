use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::fetcher::{CursorPage, PageFetcher};
use crate::config::ApiConfig;
use crate::error::{AppError, Result};
use crate::filtering::IncidentQuery;
use crate::models::Incident;

const USER_AGENT: &str = concat!("incident-sync/", env!("CARGO_PKG_VERSION"));

/// [`PageFetcher`] backed by the incidents list endpoint of the REST API.
///
/// Authentication is the caller's business: pass a `Client` that already
/// carries whatever default headers or cookies the API expects.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HttpPageFetcher {
    pub fn new(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            endpoint: config.incidents_url(),
            timeout_secs: config.request_timeout_secs,
        }
    }

    /// Build a fetcher with its own client using the configured timeout
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::new(client, config))
    }

    /// Full URL of the incidents list endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, request: reqwest::RequestBuilder) -> Result<CursorPage<Incident>> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Network(format!(
                        "Incident list request timed out after {} seconds",
                        self.timeout_secs
                    ))
                } else if e.is_connect() {
                    AppError::Network(format!("Failed to connect to incident API: {}", e))
                } else {
                    AppError::from(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let message = match response.text().await {
                Ok(body) if !body.is_empty() => body,
                _ => "No response body".to_string(),
            };
            return Err(AppError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(
        &self,
        query: &IncidentQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CursorPage<Incident>> {
        let request = match cursor {
            Some(url) => {
                debug!(url = url, "Fetching incident page by cursor");
                self.client.get(url)
            }
            None => {
                let params = query.to_pairs(page_size);
                debug!(endpoint = %self.endpoint, params = ?params, "Fetching first incident page");
                self.client.get(&self.endpoint).query(&params)
            }
        };

        let started = Instant::now();
        let result = self.get(request).await;

        match &result {
            Ok(page) => debug!(
                count = page.results.len(),
                has_next = page.next.is_some(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Incident page received"
            ),
            Err(e) => error!(error = %e, code = e.error_code(), "Incident page request failed"),
        }

        result
    }
}
