use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use super::InternalExportStats;
use crate::core::record::ProductRecord;

/// Flat row; field order is the header order
#[derive(Serialize)]
struct CsvRow<'a> {
    product_id: &'a str,
    brand: &'a str,
    product_name: &'a str,
    price: u64,
    rating: &'a str,
    num_reviews: u64,
    best_reviews: String,
}

impl<'a> From<&'a ProductRecord> for CsvRow<'a> {
    fn from(record: &'a ProductRecord) -> Self {
        Self {
            product_id: record.product_id_or_sentinel(),
            brand: &record.brand,
            product_name: &record.name,
            price: record.price,
            rating: record.rating_or_sentinel(),
            num_reviews: record.num_reviews,
            best_reviews: record.joined_reviews(),
        }
    }
}

/// Export records to CSV with a header row
pub(crate) async fn export_csv(records: &[ProductRecord], output_path: &Path) -> Result<InternalExportStats> {
    debug!("Exporting {} records to CSV: {}", records.len(), output_path.display());

    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(output_path)?;

    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }

    writer.flush()?;
    drop(writer);

    let file_size = tokio::fs::metadata(output_path).await?.len();

    info!("CSV export completed: {} records, {} bytes", records.len(), file_size);

    Ok(InternalExportStats {
        file_size_bytes: file_size,
    })
}
