use anyhow::Result;
use serde::Serialize;
use serde_json::to_writer_pretty;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::InternalExportStats;
use crate::core::record::ProductRecord;

#[derive(Serialize)]
struct JsonRow<'a> {
    product_id: &'a str,
    brand: &'a str,
    product_name: &'a str,
    price: u64,
    rating: &'a str,
    num_reviews: u64,
    best_reviews: &'a [String],
}

impl<'a> From<&'a ProductRecord> for JsonRow<'a> {
    fn from(record: &'a ProductRecord) -> Self {
        Self {
            product_id: record.product_id_or_sentinel(),
            brand: &record.brand,
            product_name: &record.name,
            price: record.price,
            rating: record.rating_or_sentinel(),
            num_reviews: record.num_reviews,
            best_reviews: &record.best_reviews,
        }
    }
}

/// Export records as a pretty-printed JSON array
pub(crate) async fn export_json(records: &[ProductRecord], output_path: &Path) -> Result<InternalExportStats> {
    debug!("Exporting {} records to JSON: {}", records.len(), output_path.display());

    let rows: Vec<JsonRow<'_>> = records.iter().map(JsonRow::from).collect();
    let mut writer = BufWriter::new(File::create(output_path)?);
    to_writer_pretty(&mut writer, &rows)?;
    writer.flush()?;
    drop(writer);

    let file_size = tokio::fs::metadata(output_path).await?.len();

    info!("JSON export completed: {} records, {} bytes", records.len(), file_size);

    Ok(InternalExportStats {
        file_size_bytes: file_size,
    })
}
