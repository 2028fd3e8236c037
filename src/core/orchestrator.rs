use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::record::ProductRecord;
use crate::error::ScrapeError;
use crate::logging::{LogContext, RunIdGenerator};
use crate::scraper::{ExtractionOutcome, ProductExtractor, UrlHarvester};
use crate::{log_debug, log_info, log_warn};

/// Sequential harvest-then-extract loop for one search query
pub struct BatchOrchestrator {
    harvester: Arc<UrlHarvester>,
    extractor: Arc<ProductExtractor>,
    inter_product_delay: Duration,
}

/// A product URL that produced no record, with the reason
#[derive(Debug, Clone)]
pub struct ProductFailure {
    pub url: String,
    pub reason: String,
    pub category: &'static str,
}

/// Batch state tracker
struct BatchExecution {
    run_id: String,
    query: String,
    harvested: usize,
    records: Vec<ProductRecord>,
    failures: Vec<ProductFailure>,
    started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: String,
    pub query: String,
    pub harvested: usize,
    pub records: Vec<ProductRecord>,
    pub failures: Vec<ProductFailure>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl BatchOrchestrator {
    pub fn new(
        harvester: Arc<UrlHarvester>,
        extractor: Arc<ProductExtractor>,
        inter_product_delay: Duration,
    ) -> Self {
        Self {
            harvester,
            extractor,
            inter_product_delay,
        }
    }

    /// Harvest up to `max_products` URLs and extract each; only assembled records are returned
    pub async fn run(&self, query: &str, max_products: usize) -> Vec<ProductRecord> {
        self.run_with_report(query, max_products).await.records
    }

    pub async fn run_with_report(&self, query: &str, max_products: usize) -> BatchReport {
        let mut batch = BatchExecution::new(query);
        let context = LogContext::new("orchestrator", "run")
            .with_run_id(&batch.run_id)
            .with_query(query);
        log_info!(context, format!("Starting batch for '{}' (max {} products)", query, max_products));

        let urls = self.harvester.harvest(query, max_products).await;
        batch.harvested = urls.len();

        if urls.is_empty() {
            log_info!(context, "No product URLs found; nothing to extract");
            return batch.into_report();
        }

        let total = urls.len();
        for (idx, url) in urls.into_iter().enumerate() {
            let item = context
                .clone()
                .with_url(url.as_str())
                .with_number_field("position", (idx + 1) as i64);
            log_debug!(item, format!("Extracting product {}/{}", idx + 1, total));
            let outcome = self.extractor.extract(&url).await;
            batch.record_outcome(&url, outcome, &context);

            if idx + 1 < total && !self.inter_product_delay.is_zero() {
                tokio::time::sleep(self.inter_product_delay).await;
            }
        }

        let summary = context
            .with_number_field("harvested", batch.harvested as i64)
            .with_number_field("extracted", batch.records.len() as i64)
            .with_number_field("skipped", batch.failures.len() as i64)
            .with_status("completed");
        log_info!(
            summary,
            format!("Batch finished: {} of {} products extracted", batch.records.len(), total)
        );

        batch.into_report()
    }
}

impl BatchExecution {
    fn new(query: &str) -> Self {
        Self {
            run_id: RunIdGenerator::generate(),
            query: query.to_string(),
            harvested: 0,
            records: Vec::new(),
            failures: Vec::new(),
            started_at: chrono::Utc::now(),
        }
    }

    fn record_outcome(&mut self, url: &Url, outcome: ExtractionOutcome, context: &LogContext) {
        match outcome {
            ExtractionOutcome::Assembled(record) => self.records.push(record),
            ExtractionOutcome::Void(reason) => self.add_failure(url, &reason, context),
        }
    }

    fn add_failure(&mut self, url: &Url, reason: &ScrapeError, context: &LogContext) {
        let context = context
            .clone()
            .with_url(url.as_str())
            .with_error_category(reason.category());
        log_warn!(context, reason, "Product skipped");

        self.failures.push(ProductFailure {
            url: url.to_string(),
            reason: reason.to_string(),
            category: reason.category(),
        });
    }

    fn into_report(self) -> BatchReport {
        BatchReport {
            run_id: self.run_id,
            query: self.query,
            harvested: self.harvested,
            records: self.records,
            failures: self.failures,
            started_at: self.started_at,
            completed_at: chrono::Utc::now(),
        }
    }
}

impl BatchReport {
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn success_rate(&self) -> f64 {
        if self.harvested == 0 {
            0.0
        } else {
            self.records.len() as f64 / self.harvested as f64
        }
    }
}
