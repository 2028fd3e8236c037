use std::fmt;
use thiserror::Error;

/// Fields whose absence voids a product record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Name,
    Brand,
    Price,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredField::Name => write!(f, "product_name"),
            RequiredField::Brand => write!(f, "brand"),
            RequiredField::Price => write!(f, "price"),
        }
    }
}

/// Fields that fall back to a documented default when missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalField {
    Identifier,
    Rating,
    ReviewCount,
}

impl fmt::Display for OptionalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionalField::Identifier => write!(f, "product_id"),
            OptionalField::Rating => write!(f, "rating"),
            OptionalField::ReviewCount => write!(f, "num_reviews"),
        }
    }
}

/// Error taxonomy for listing discovery and product extraction
#[derive(Error, Debug, Clone)]
pub enum ScrapeError {
    // Listing errors
    #[error("Listing fetch failed for {url}: {reason}")]
    ListingFetch { url: String, reason: String },

    #[error("Product grid not found on listing page: {url}")]
    ListingStructure { url: String },

    // Product page errors
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Required field '{field}' not found within {timeout_secs}s on {url}")]
    RequiredFieldTimeout {
        field: RequiredField,
        url: String,
        timeout_secs: u64,
    },

    #[error("Required field '{field}' has unusable value '{value}' on {url}")]
    RequiredFieldInvalid {
        field: RequiredField,
        url: String,
        value: String,
    },

    #[error("Optional field '{field}' unavailable: {reason}")]
    OptionalFieldTimeout { field: OptionalField, reason: String },

    #[error("Review interaction failed: {reason}")]
    ReviewInteraction { reason: String },

    #[error("Unexpected extraction failure on {url}: {message}")]
    UnexpectedExtraction { url: String, message: String },

    // Renderer errors
    #[error("Timed out after {timeout_ms}ms waiting for {locator}")]
    WaitTimeout { locator: String, timeout_ms: u64 },

    #[error("Renderer error: {message}")]
    Renderer { message: String },

    #[error("Renderer session could not be started: {message}")]
    SessionStart { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ScrapeError {
    /// Create a renderer error
    pub fn renderer(message: impl Into<String>) -> Self {
        Self::Renderer { message: message.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a review interaction error
    pub fn review(reason: impl Into<String>) -> Self {
        Self::ReviewInteraction { reason: reason.into() }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::ListingFetch { .. } => "listing_fetch",
            Self::ListingStructure { .. } => "listing_structure",
            Self::Navigation { .. } => "navigation",
            Self::RequiredFieldTimeout { .. } | Self::RequiredFieldInvalid { .. } => "required_field",
            Self::OptionalFieldTimeout { .. } => "optional_field",
            Self::ReviewInteraction { .. } => "review_interaction",
            Self::UnexpectedExtraction { .. } => "unexpected",
            Self::WaitTimeout { .. } | Self::Renderer { .. } | Self::SessionStart { .. } => "renderer",
            Self::Configuration { .. } => "configuration",
        }
    }
}

/// Result type alias for scraping operations
pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;
