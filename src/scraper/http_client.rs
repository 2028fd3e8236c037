use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header::{HeaderMap, HeaderValue}, Client};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{ScrapeError, ScrapeResult};

/// Fetches listing markup; the harvester's view of the network
#[async_trait]
pub trait ListingTransport: Send + Sync {
    /// Return the body of a successful GET, or `ScrapeError::ListingFetch`
    async fn fetch_listing(&self, url: &Url) -> ScrapeResult<String>;
}

/// HTTP client wrapper with retry logic and request counters
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
    success_count: AtomicU64,
    error_count: AtomicU64,
}

/// Request counters for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStats {
    pub success_count: u64,
    pub error_count: u64,
}

impl HttpClient {
    /// Create new HTTP client
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"));
        headers.insert("Accept-Language", HeaderValue::from_static("es-CL,es;q=0.9,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        info!("HTTP client initialized");

        Ok(Self {
            client,
            config: config.clone(),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> HttpStats {
        HttpStats {
            success_count: self.success_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }

    /// GET with retry on transport errors and server errors
    pub async fn get_text(&self, url: &Url) -> ScrapeResult<String> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            debug!("HTTP GET attempt {} for: {}", attempt, url);

            match self.client.get(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text().await.map_err(|e| self.fetch_error(url, e.to_string()))?;
                        self.success_count.fetch_add(1, Ordering::Relaxed);
                        debug!("HTTP GET successful for: {} ({} bytes)", url, body.len());
                        return Ok(body);
                    }

                    if status.is_server_error() && attempt < self.config.max_retries {
                        warn!("Server error {} for {}, retrying...", status, url);
                        last_error = Some(format!("HTTP {}", status));
                    } else {
                        return Err(self.fetch_error(url, format!("HTTP {}", status)));
                    }
                }
                Err(e) => {
                    warn!("HTTP request failed for {} (attempt {}): {}", url, attempt, e);
                    last_error = Some(e.to_string());
                }
            }

            if attempt < self.config.max_retries {
                let delay = Duration::from_secs(self.config.retry_delay_seconds * attempt as u64);
                tokio::time::sleep(delay).await;
            }
        }

        Err(self.fetch_error(
            url,
            last_error.unwrap_or_else(|| "All retry attempts failed".to_string()),
        ))
    }

    fn fetch_error(&self, url: &Url, reason: String) -> ScrapeError {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        ScrapeError::ListingFetch {
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ListingTransport for HttpClient {
    async fn fetch_listing(&self, url: &Url) -> ScrapeResult<String> {
        self.get_text(url).await
    }
}
