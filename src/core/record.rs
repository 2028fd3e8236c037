use serde::{Deserialize, Serialize};

/// Export value for an absent optional field
pub const NOT_AVAILABLE: &str = "N/A";

/// Separator between reviews in flat output formats
pub const REVIEW_SEPARATOR: &str = " || ";

/// One fully extracted product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: Option<String>,
    pub brand: String,
    pub name: String,
    pub price: u64,
    pub rating: Option<String>,
    pub num_reviews: u64,
    pub best_reviews: Vec<String>,
    pub source_url: String,
}

impl ProductRecord {
    pub fn product_id_or_sentinel(&self) -> &str {
        self.product_id.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn rating_or_sentinel(&self) -> &str {
        self.rating.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn joined_reviews(&self) -> String {
        self.best_reviews.join(REVIEW_SEPARATOR)
    }
}
