//! Catalog Harvester - product data extraction for a single e-commerce catalog
//!
//! This library provides:
//! - Search listing discovery with same-origin URL deduplication
//! - Per-product extraction from a browser-rendered detail page
//! - Five-star review sampling behind an injectable admission filter
//! - CSV and JSON export of the assembled records

pub mod core;
pub mod config;
pub mod scraper;
pub mod export;
pub mod utils;
pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use crate::config::AppConfig;
pub use crate::core::orchestrator::{BatchOrchestrator, BatchReport};
pub use crate::core::record::ProductRecord;
pub use crate::core::CatalogHarvester;
pub use crate::error::{ScrapeError, ScrapeResult};
pub use crate::scraper::ExtractionOutcome;
