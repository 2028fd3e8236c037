use futures::FutureExt;
use scraper::Selector;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::browser::{RenderSession, Renderer, RendererFactory};
use super::extractors::{extract_identifier, parse_price, read_rating_and_count, read_required};
use super::reviews::{ReviewFilter, ReviewSampler};
use crate::config::{AppConfig, SelectorConfig};
use crate::core::record::ProductRecord;
use crate::error::{RequiredField, ScrapeError, ScrapeResult};
use crate::logging::{LogContext, PerformanceLogger};
use crate::log_error;

/// Where a product extraction currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Navigate,
    RequiredFields,
    OptionalFields,
    ReviewSample,
    Assemble,
    Release,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStage::Navigate => write!(f, "NAVIGATE"),
            ExtractionStage::RequiredFields => write!(f, "REQUIRED_FIELDS"),
            ExtractionStage::OptionalFields => write!(f, "OPTIONAL_FIELDS"),
            ExtractionStage::ReviewSample => write!(f, "REVIEW_SAMPLE"),
            ExtractionStage::Assemble => write!(f, "ASSEMBLE"),
            ExtractionStage::Release => write!(f, "RELEASE"),
        }
    }
}

/// Result of extracting one product page
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Assembled(ProductRecord),
    Void(ScrapeError),
}

impl ExtractionOutcome {
    pub fn is_assembled(&self) -> bool {
        matches!(self, ExtractionOutcome::Assembled(_))
    }

    pub fn void_reason(&self) -> Option<&ScrapeError> {
        match self {
            ExtractionOutcome::Assembled(_) => None,
            ExtractionOutcome::Void(reason) => Some(reason),
        }
    }

    pub fn into_record(self) -> Option<ProductRecord> {
        match self {
            ExtractionOutcome::Assembled(record) => Some(record),
            ExtractionOutcome::Void(_) => None,
        }
    }
}

/// Drives one renderer session per product through the extraction stages
pub struct ProductExtractor {
    factory: Arc<dyn RendererFactory>,
    selectors: SelectorConfig,
    structured_data: Selector,
    sampler: ReviewSampler,
    wait_timeout: Duration,
}

impl ProductExtractor {
    pub fn new(config: &AppConfig, factory: Arc<dyn RendererFactory>) -> ScrapeResult<Self> {
        let structured_data = Selector::parse(&config.selectors.structured_data)
            .map_err(|e| ScrapeError::config(format!("Invalid structured data selector: {}", e)))?;

        Ok(Self {
            factory,
            selectors: config.selectors.clone(),
            structured_data,
            sampler: ReviewSampler::new(&config.render, &config.reviews, &config.selectors),
            wait_timeout: config.render.wait_timeout(),
        })
    }

    pub fn with_review_filter(mut self, filter: Arc<dyn ReviewFilter>) -> Self {
        self.sampler = self.sampler.with_filter(filter);
        self
    }

    /// Extract one product; the renderer session is released on every path
    pub async fn extract(&self, url: &Url) -> ExtractionOutcome {
        let performance = PerformanceLogger::new(
            LogContext::new("product_extractor", "extract").with_url(url.as_str()),
        );

        let renderer = match self.factory.open().await {
            Ok(renderer) => renderer,
            Err(e) => {
                performance.finish_with_error("Renderer session could not be opened", &e);
                return ExtractionOutcome::Void(e);
            }
        };
        let session = RenderSession::new(renderer);

        let mut stage = ExtractionStage::Navigate;
        let result = match session.renderer() {
            Some(renderer) => {
                let caught = AssertUnwindSafe(self.run_stages(renderer, url, &mut stage))
                    .catch_unwind()
                    .await;
                caught.unwrap_or_else(|panic| {
                    let error = ScrapeError::UnexpectedExtraction {
                        url: url.to_string(),
                        message: format!("panic during {}: {}", stage, panic_message(&*panic)),
                    };
                    let context = LogContext::new("product_extractor", "extract")
                        .with_url(url.as_str())
                        .with_string_field("stage", stage.to_string())
                        .with_error_category(error.category());
                    log_error!(context, error, "Extraction panicked");
                    Err(error)
                })
            }
            None => Err(ScrapeError::UnexpectedExtraction {
                url: url.to_string(),
                message: "renderer session already released".to_string(),
            }),
        };

        debug!("{} for {} (last stage {})", ExtractionStage::Release, url, stage);
        session.release().await;

        match result {
            Ok(record) => {
                performance.finish_with_status("Product extracted", "assembled");
                ExtractionOutcome::Assembled(record)
            }
            Err(e) => {
                let e = at_product_boundary(e, url, stage);
                performance.finish_with_error("Product skipped", &e);
                ExtractionOutcome::Void(e)
            }
        }
    }

    async fn run_stages(
        &self,
        renderer: &dyn Renderer,
        url: &Url,
        stage: &mut ExtractionStage,
    ) -> ScrapeResult<ProductRecord> {
        *stage = ExtractionStage::Navigate;
        renderer.navigate(url).await?;

        *stage = ExtractionStage::RequiredFields;
        let name = read_required(renderer, &self.selectors.title, RequiredField::Name, url, self.wait_timeout).await?;
        let brand = read_required(renderer, &self.selectors.brand, RequiredField::Brand, url, self.wait_timeout).await?;
        let price_text = read_required(renderer, &self.selectors.price, RequiredField::Price, url, self.wait_timeout).await?;
        let price = parse_price(&price_text, url)?;

        *stage = ExtractionStage::OptionalFields;
        let product_id = match renderer.page_source().await {
            Ok(html) => extract_identifier(&html, &self.structured_data, &self.selectors.identifier_key),
            Err(e) => {
                debug!("Rendered markup unavailable for {}: {}", url, e);
                None
            }
        };
        let (rating, num_reviews) = read_rating_and_count(
            renderer,
            &self.selectors.rating,
            &self.selectors.review_count,
            self.wait_timeout,
        )
        .await;

        *stage = ExtractionStage::ReviewSample;
        let best_reviews = self.sampler.sample_five_star_reviews(renderer).await;

        *stage = ExtractionStage::Assemble;
        Ok(ProductRecord {
            product_id,
            brand,
            name,
            price,
            rating,
            num_reviews,
            best_reviews,
            source_url: url.to_string(),
        })
    }
}

/// Renderer-level failures outside the field taxonomy become unexpected failures
fn at_product_boundary(error: ScrapeError, url: &Url, stage: ExtractionStage) -> ScrapeError {
    match error {
        ScrapeError::Renderer { .. } | ScrapeError::WaitTimeout { .. } => {
            ScrapeError::UnexpectedExtraction {
                url: url.to_string(),
                message: format!("{} during {}", error, stage),
            }
        }
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderConfig, SettleMode};
    use crate::scraper::mock::{ScriptedFactory, ScriptedPage};

    const URL: &str = "https://www.paris.cl/parlante-jbl-flip-6-805071999.html";

    fn config() -> AppConfig {
        AppConfig {
            render: RenderConfig {
                wait_timeout_seconds: 1,
                scroll_settle_ms: 0,
                filter_settle_ms: 20,
                settle_poll_interval_ms: 5,
                settle_mode: SettleMode::Poll,
                ..RenderConfig::default()
            },
            ..AppConfig::default()
        }
    }

    fn complete_page() -> ScriptedPage {
        let s = SelectorConfig::default();
        ScriptedPage::new()
            .text(s.title.clone(), " Parlante Bluetooth Flip 6 ")
            .text(s.brand.clone(), "JBL")
            .text(s.price.clone(), "$49.990")
            .text(s.rating.clone(), "4.8")
            .text(s.review_count.clone(), "(57)")
            .source(r#"<html><head><script type="application/ld+json">{"@type":"Product","sku":"805071999"}</script></head></html>"#)
            .clickable(s.five_star_filter.clone())
            .on_click(
                s.five_star_filter.clone(),
                s.review_text.clone(),
                &[
                    "Resumen de opiniones",
                    "Excelente sonido, muy buena batería",
                    "Ok",
                    "Lo uso en la ducha y funciona perfecto",
                ],
            )
    }

    fn extractor(factory: Arc<ScriptedFactory>) -> ProductExtractor {
        ProductExtractor::new(&config(), factory).unwrap()
    }

    #[tokio::test]
    async fn test_complete_page_is_assembled() {
        let factory = Arc::new(ScriptedFactory::new(vec![(URL, complete_page())]));
        let outcome = extractor(factory.clone()).extract(&Url::parse(URL).unwrap()).await;

        assert!(outcome.is_assembled());
        let record = outcome.into_record().unwrap();
        assert_eq!(record.name, "Parlante Bluetooth Flip 6");
        assert_eq!(record.brand, "JBL");
        assert_eq!(record.price, 49990);
        assert_eq!(record.product_id.as_deref(), Some("805071999"));
        assert_eq!(record.rating.as_deref(), Some("4.8"));
        assert_eq!(record.num_reviews, 57);
        assert_eq!(
            record.best_reviews,
            vec![
                "Excelente sonido, muy buena batería",
                "Lo uso en la ducha y funciona perfecto",
            ]
        );
        assert_eq!(record.source_url, URL);
        assert_eq!(factory.opened_count(), 1);
        assert_eq!(factory.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_review_filter_replaces_heuristic() {
        struct AdmitAll;
        impl ReviewFilter for AdmitAll {
            fn admit(&self, _text: &str) -> bool {
                true
            }
        }

        let factory = Arc::new(ScriptedFactory::new(vec![(URL, complete_page())]));
        let record = extractor(factory)
            .with_review_filter(Arc::new(AdmitAll))
            .extract(&Url::parse(URL).unwrap())
            .await
            .into_record()
            .unwrap();

        assert_eq!(
            record.best_reviews,
            vec![
                "Resumen de opiniones",
                "Excelente sonido, muy buena batería",
                "Ok",
                "Lo uso en la ducha y funciona perfecto",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_title_voids_record() {
        let s = SelectorConfig::default();
        let page = ScriptedPage::new()
            .text(s.brand.clone(), "JBL")
            .text(s.price.clone(), "$49.990");
        let factory = Arc::new(ScriptedFactory::new(vec![(URL, page)]));

        let outcome = extractor(factory.clone()).extract(&Url::parse(URL).unwrap()).await;
        assert!(matches!(
            outcome.void_reason(),
            Some(ScrapeError::RequiredFieldTimeout { field: RequiredField::Name, .. })
        ));
        assert!(!outcome.is_assembled());
        assert_eq!(factory.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_rating_defaults_without_voiding() {
        let s = SelectorConfig::default();
        let page = ScriptedPage::new()
            .text(s.title.clone(), "Audífonos WH-1000XM5")
            .text(s.brand.clone(), "SONY")
            .text(s.price.clone(), "$329.990")
            .text(s.review_count.clone(), "(3)");
        let factory = Arc::new(ScriptedFactory::new(vec![(URL, page)]));

        let record = extractor(factory)
            .extract(&Url::parse(URL).unwrap())
            .await
            .into_record()
            .unwrap();
        assert_eq!(record.rating, None);
        assert_eq!(record.rating_or_sentinel(), "N/A");
        assert_eq!(record.num_reviews, 0);
        assert_eq!(record.product_id_or_sentinel(), "N/A");
        assert!(record.best_reviews.is_empty());
    }

    #[tokio::test]
    async fn test_price_without_digits_voids_record() {
        let s = SelectorConfig::default();
        let page = complete_page().text(s.price.clone(), "Agotado");
        let factory = Arc::new(ScriptedFactory::new(vec![(URL, page)]));

        let outcome = extractor(factory).extract(&Url::parse(URL).unwrap()).await;
        assert!(matches!(
            outcome.void_reason(),
            Some(ScrapeError::RequiredFieldInvalid { field: RequiredField::Price, .. })
        ));
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_session_closed() {
        let s = SelectorConfig::default();
        let page = complete_page().panic_on(s.rating.clone());
        let factory = Arc::new(ScriptedFactory::new(vec![(URL, page)]));

        let outcome = extractor(factory.clone()).extract(&Url::parse(URL).unwrap()).await;
        match outcome {
            ExtractionOutcome::Void(ScrapeError::UnexpectedExtraction { message, .. }) => {
                assert!(message.contains("OPTIONAL_FIELDS"));
                assert!(message.contains("scripted panic"));
            }
            other => panic!("expected unexpected-extraction void, got {:?}", other),
        }
        assert_eq!(factory.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_voids_record() {
        let page = complete_page().fail_navigation("net::ERR_NAME_NOT_RESOLVED");
        let factory = Arc::new(ScriptedFactory::new(vec![(URL, page)]));

        let outcome = extractor(factory.clone()).extract(&Url::parse(URL).unwrap()).await;
        assert!(matches!(outcome.void_reason(), Some(ScrapeError::Navigation { .. })));
        assert_eq!(factory.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_session_start_failure_voids_record() {
        let factory = Arc::new(ScriptedFactory::failing());
        let outcome = extractor(factory.clone()).extract(&Url::parse(URL).unwrap()).await;

        assert!(matches!(outcome.void_reason(), Some(ScrapeError::SessionStart { .. })));
        assert_eq!(factory.opened_count(), 0);
    }
}
