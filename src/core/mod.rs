use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod orchestrator;
pub mod record;

use crate::config::AppConfig;
use crate::export::{ExportFormat, ExportManager, ExportStats};
use crate::scraper::{
    HttpClient, ListingTransport, ProductExtractor, ProductUrlSet, RendererFactory, UrlHarvester,
    WebDriverFactory,
};
use orchestrator::{BatchOrchestrator, BatchReport};
use record::ProductRecord;

/// Core application state wiring transport, renderer, pipeline and export
pub struct CatalogHarvester {
    config: AppConfig,
    harvester: Arc<UrlHarvester>,
    orchestrator: BatchOrchestrator,
    export_manager: ExportManager,
}

impl CatalogHarvester {
    /// Initialize with the HTTP listing transport and a WebDriver renderer
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing catalog harvester");

        let transport = Arc::new(HttpClient::new(&config.http)?);
        let factory = Arc::new(WebDriverFactory::new(&config.render));
        Self::with_components(config, transport, factory)
    }

    /// Initialize with caller-supplied collaborators
    pub fn with_components(
        config: AppConfig,
        transport: Arc<dyn ListingTransport>,
        factory: Arc<dyn RendererFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let harvester = Arc::new(UrlHarvester::new(&config.site, &config.selectors, transport)?);
        let extractor = Arc::new(ProductExtractor::new(&config, factory)?);
        let orchestrator = BatchOrchestrator::new(
            harvester.clone(),
            extractor,
            Duration::from_millis(config.batch.inter_product_delay_ms),
        );
        let export_manager = ExportManager::new(&config.export);

        info!("Catalog harvester initialized for {}", config.site.origin);

        Ok(Self {
            config,
            harvester,
            orchestrator,
            export_manager,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Product URLs for a query without visiting them
    pub async fn harvest_urls(&self, query: &str, max_products: usize) -> ProductUrlSet {
        self.harvester.harvest(query, max_products).await
    }

    /// Harvest and extract, returning the full run report
    pub async fn scrape(&self, query: &str, max_products: usize) -> BatchReport {
        self.orchestrator.run_with_report(query, max_products).await
    }

    /// Export records to `output` (or the configured default path) in `format` (or the configured default)
    pub async fn export(
        &self,
        records: &[ProductRecord],
        output: Option<&Path>,
        format: Option<ExportFormat>,
    ) -> Result<Option<ExportStats>> {
        let format = match format {
            Some(format) => format,
            None => self.export_manager.default_format()?,
        };
        let path = match output {
            Some(path) => path.to_path_buf(),
            None => self.export_manager.default_output_path(format),
        };
        self.export_manager.export(records, &path, format).await
    }
}
