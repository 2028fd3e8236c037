use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::http_client::ListingTransport;
use crate::config::{SelectorConfig, SiteConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::logging::LogContext;
use crate::{log_info, log_warn};

/// Insertion-ordered, deduplicated set of product URLs bounded by a maximum size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductUrlSet {
    urls: Vec<Url>,
    seen: HashSet<String>,
    max: usize,
}

impl ProductUrlSet {
    pub fn new(max: usize) -> Self {
        Self {
            urls: Vec::new(),
            seen: HashSet::new(),
            max,
        }
    }

    /// Insert unless already present or full; returns whether the URL was added
    pub fn insert(&mut self, url: Url) -> bool {
        if self.is_full() || !self.seen.insert(url.as_str().to_string()) {
            return false;
        }
        self.urls.push(url);
        true
    }

    pub fn is_full(&self) -> bool {
        self.urls.len() >= self.max
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.urls.iter()
    }
}

impl IntoIterator for ProductUrlSet {
    type Item = Url;
    type IntoIter = std::vec::IntoIter<Url>;

    fn into_iter(self) -> Self::IntoIter {
        self.urls.into_iter()
    }
}

/// Discovers product detail URLs from a single search listing page
pub struct UrlHarvester {
    origin: Url,
    search_path: String,
    query_param: String,
    grid: Selector,
    link: Selector,
    transport: Arc<dyn ListingTransport>,
}

impl UrlHarvester {
    pub fn new(
        site: &SiteConfig,
        selectors: &SelectorConfig,
        transport: Arc<dyn ListingTransport>,
    ) -> ScrapeResult<Self> {
        let origin = Url::parse(&site.origin)
            .map_err(|e| ScrapeError::config(format!("Invalid site origin '{}': {}", site.origin, e)))?;
        let grid = Selector::parse(&selectors.product_grid)
            .map_err(|e| ScrapeError::config(format!("Invalid grid selector: {}", e)))?;
        let link = Selector::parse(&selectors.product_link)
            .map_err(|e| ScrapeError::config(format!("Invalid link selector: {}", e)))?;

        Ok(Self {
            origin,
            search_path: site.search_path.clone(),
            query_param: site.query_param.clone(),
            grid,
            link,
            transport,
        })
    }

    /// Listing URL for a query; the query is form-encoded into the configured parameter
    pub fn listing_url(&self, query: &str) -> ScrapeResult<Url> {
        let mut url = self
            .origin
            .join(&self.search_path)
            .map_err(|e| ScrapeError::config(format!("Invalid search path '{}': {}", self.search_path, e)))?;
        url.query_pairs_mut().append_pair(&self.query_param, query);
        Ok(url)
    }

    /// Harvest product URLs, logging and swallowing listing failures
    pub async fn harvest(&self, query: &str, max_count: usize) -> ProductUrlSet {
        match self.try_harvest(query, max_count).await {
            Ok(urls) => urls,
            Err(e) => {
                let context = LogContext::new("harvester", "harvest")
                    .with_query(query)
                    .with_error_category(e.category());
                log_warn!(context, e, "Listing harvest failed; continuing with no products");
                ProductUrlSet::new(max_count)
            }
        }
    }

    /// Harvest product URLs, returning the failure reason instead of an empty set
    pub async fn try_harvest(&self, query: &str, max_count: usize) -> ScrapeResult<ProductUrlSet> {
        let listing_url = self.listing_url(query)?;
        debug!("Fetching listing: {}", listing_url);

        let html = self.transport.fetch_listing(&listing_url).await?;
        let urls = self.harvest_from_html(&html, &listing_url, max_count)?;

        let context = LogContext::new("harvester", "harvest")
            .with_query(query)
            .with_url(listing_url.as_str())
            .with_number_field("harvested", urls.len() as i64);
        log_info!(context, format!("Harvested {} product URLs", urls.len()));

        Ok(urls)
    }

    /// Collect same-origin product links from listing markup already in hand
    pub fn harvest_from_html(
        &self,
        html: &str,
        listing_url: &Url,
        max_count: usize,
    ) -> ScrapeResult<ProductUrlSet> {
        let document = Html::parse_document(html);
        let grid = document
            .select(&self.grid)
            .next()
            .ok_or_else(|| ScrapeError::ListingStructure {
                url: listing_url.to_string(),
            })?;

        let mut urls = ProductUrlSet::new(max_count);
        for anchor in grid.select(&self.link) {
            if urls.is_full() {
                break;
            }

            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if !is_root_relative(href) {
                continue;
            }

            match self.origin.join(href) {
                Ok(url) => {
                    if !urls.insert(url) {
                        debug!("Skipping duplicate product link: {}", href);
                    }
                }
                Err(e) => debug!("Skipping unresolvable product link '{}': {}", href, e),
            }
        }

        if urls.is_empty() {
            info!("Product grid on {} held no usable links", listing_url);
        }
        Ok(urls)
    }
}

fn is_root_relative(href: &str) -> bool {
    href.starts_with('/') && !href.starts_with("//")
}
