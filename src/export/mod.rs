use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod csv_exporter;
pub mod json_exporter;

use crate::config::ExportConfig;
use crate::core::record::ProductRecord;

/// Column order shared by every output format
pub const EXPORT_COLUMNS: [&str; 7] = [
    "product_id",
    "brand",
    "product_name",
    "price",
    "rating",
    "num_reviews",
    "best_reviews",
];

/// Export manager for handling different output formats
pub struct ExportManager {
    config: ExportConfig,
}

/// Export format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid export format: {}", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Export statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStats {
    pub format: ExportFormat,
    pub file_path: PathBuf,
    pub record_count: usize,
    pub file_size_bytes: u64,
    pub export_duration_ms: u64,
}

/// Internal export result
#[derive(Debug)]
pub(crate) struct InternalExportStats {
    pub file_size_bytes: u64,
}

impl ExportManager {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn default_format(&self) -> Result<ExportFormat> {
        self.config.default_format.parse()
    }

    /// Configured output directory and file name, with the extension matching `format`
    pub fn default_output_path(&self, format: ExportFormat) -> PathBuf {
        self.config
            .output_directory
            .join(&self.config.filename)
            .with_extension(format.extension())
    }

    /// Write records to `output_path`; an empty batch writes nothing and returns `None`
    pub async fn export(
        &self,
        records: &[ProductRecord],
        output_path: &Path,
        format: ExportFormat,
    ) -> Result<Option<ExportStats>> {
        if records.is_empty() {
            info!("No records to export; {} left untouched", output_path.display());
            return Ok(None);
        }

        info!("Exporting {} records to {} as {}", records.len(), output_path.display(), format);
        let start_time = std::time::Instant::now();

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let stats = match format {
            ExportFormat::Csv => csv_exporter::export_csv(records, output_path).await?,
            ExportFormat::Json => json_exporter::export_json(records, output_path).await?,
        };

        let final_stats = ExportStats {
            format,
            file_path: output_path.to_path_buf(),
            record_count: records.len(),
            file_size_bytes: stats.file_size_bytes,
            export_duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Export completed: {} records in {}ms, file size: {} bytes",
            final_stats.record_count, final_stats.export_duration_ms, final_stats.file_size_bytes
        );

        Ok(Some(final_stats))
    }
}

#[cfg(test)]
pub(crate) fn sample_records() -> Vec<ProductRecord> {
    vec![
        ProductRecord {
            product_id: Some("805071999".to_string()),
            brand: "JBL".to_string(),
            name: "Parlante Bluetooth Flip 6".to_string(),
            price: 89990,
            rating: Some("4.8".to_string()),
            num_reviews: 57,
            best_reviews: vec![
                "Excelente sonido, muy buena batería".to_string(),
                "Lo uso en la ducha y funciona perfecto".to_string(),
            ],
            source_url: "https://www.paris.cl/flip-6.html".to_string(),
        },
        ProductRecord {
            product_id: None,
            brand: "SONY".to_string(),
            name: "Audífonos WH-1000XM5, \"Negro\"".to_string(),
            price: 329990,
            rating: None,
            num_reviews: 0,
            best_reviews: Vec::new(),
            source_url: "https://www.paris.cl/wh-1000xm5.html".to_string(),
        },
    ]
}
