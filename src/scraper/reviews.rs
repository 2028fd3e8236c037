use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::browser::Renderer;
use super::Locator;
use crate::config::{ExclusionMatch, RenderConfig, ReviewConfig, SelectorConfig, SettleMode};
use crate::error::{ScrapeError, ScrapeResult};

/// Decides whether a trimmed review text belongs in the sample
pub trait ReviewFilter: Send + Sync {
    fn admit(&self, text: &str) -> bool;
}

/// Length threshold plus a list of excluded section labels
#[derive(Debug, Clone)]
pub struct ReviewHeuristic {
    min_length: usize,
    excluded_texts: Vec<String>,
    exclusion_match: ExclusionMatch,
}

impl ReviewHeuristic {
    pub fn new(min_length: usize, excluded_texts: Vec<String>, exclusion_match: ExclusionMatch) -> Self {
        Self {
            min_length,
            excluded_texts,
            exclusion_match,
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(
            config.min_length,
            config.excluded_texts.clone(),
            config.exclusion_match,
        )
    }

    fn is_excluded(&self, text: &str) -> bool {
        self.excluded_texts.iter().any(|excluded| match self.exclusion_match {
            ExclusionMatch::Exact => text == excluded,
            ExclusionMatch::Contains => text.contains(excluded.as_str()),
        })
    }
}

impl ReviewFilter for ReviewHeuristic {
    fn admit(&self, text: &str) -> bool {
        text.chars().count() > self.min_length && !self.is_excluded(text)
    }
}

/// Filters a product's reviews to five stars and collects a bounded sample
pub struct ReviewSampler {
    five_star_filter: Locator,
    review_text: Locator,
    filter: Arc<dyn ReviewFilter>,
    max_reviews: usize,
    wait_timeout: Duration,
    scroll_settle: Duration,
    filter_settle: Duration,
    poll_interval: Duration,
    settle_mode: SettleMode,
}

impl ReviewSampler {
    pub fn new(render: &RenderConfig, reviews: &ReviewConfig, selectors: &SelectorConfig) -> Self {
        Self {
            five_star_filter: selectors.five_star_filter.clone(),
            review_text: selectors.review_text.clone(),
            filter: Arc::new(ReviewHeuristic::from_config(reviews)),
            max_reviews: reviews.max_reviews,
            wait_timeout: render.wait_timeout(),
            scroll_settle: Duration::from_millis(render.scroll_settle_ms),
            filter_settle: Duration::from_millis(render.filter_settle_ms),
            poll_interval: Duration::from_millis(render.settle_poll_interval_ms.max(1)),
            settle_mode: render.settle_mode,
        }
    }

    /// Replace the admission predicate
    pub fn with_filter(mut self, filter: Arc<dyn ReviewFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Five-star review sample; any failure along the way yields an empty list
    pub async fn sample_five_star_reviews(&self, renderer: &dyn Renderer) -> Vec<String> {
        match self.try_sample(renderer).await {
            Ok(reviews) => reviews,
            Err(e) => {
                debug!("No five-star reviews sampled: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_sample(&self, renderer: &dyn Renderer) -> ScrapeResult<Vec<String>> {
        renderer
            .wait_for_clickable(&self.five_star_filter, self.wait_timeout)
            .await
            .map_err(|e| ScrapeError::review(format!("five-star control unavailable: {}", e)))?;

        renderer
            .scroll_into_view(&self.five_star_filter)
            .await
            .map_err(|e| ScrapeError::review(e.to_string()))?;
        tokio::time::sleep(self.scroll_settle).await;

        let before = match self.settle_mode {
            SettleMode::Poll => renderer.texts(&self.review_text).await.unwrap_or_default(),
            SettleMode::Fixed => Vec::new(),
        };

        renderer
            .click(&self.five_star_filter)
            .await
            .map_err(|e| ScrapeError::review(e.to_string()))?;
        self.settle_after_click(renderer, &before).await;

        let texts = renderer
            .texts(&self.review_text)
            .await
            .map_err(|e| ScrapeError::review(e.to_string()))?;
        Ok(self.select_reviews(&texts))
    }

    /// Settled means a non-empty list, different from `before`, read identically on two
    /// consecutive polls. Otherwise polling runs to the deadline.
    async fn settle_after_click(&self, renderer: &dyn Renderer, before: &[String]) {
        match self.settle_mode {
            SettleMode::Fixed => tokio::time::sleep(self.filter_settle).await,
            SettleMode::Poll => {
                let deadline = Instant::now() + self.filter_settle;
                let mut candidate: Option<Vec<String>> = None;
                while Instant::now() < deadline {
                    tokio::time::sleep(self.poll_interval).await;
                    match renderer.texts(&self.review_text).await {
                        Ok(current) if !current.is_empty() && current.as_slice() != before => {
                            if candidate.as_ref() == Some(&current) {
                                debug!("Review list settled after filter click");
                                return;
                            }
                            candidate = Some(current);
                        }
                        Ok(_) => candidate = None,
                        Err(e) => {
                            debug!("Review poll failed: {}", e);
                            candidate = None;
                        }
                    }
                }
                debug!("Review list did not settle within {:?}", self.filter_settle);
            }
        }
    }

    /// Trim, admit and cap review texts in the order given
    pub fn select_reviews(&self, texts: &[String]) -> Vec<String> {
        texts
            .iter()
            .map(|text| text.trim())
            .filter(|text| self.filter.admit(text))
            .take(self.max_reviews)
            .map(str::to_string)
            .collect()
    }
}
