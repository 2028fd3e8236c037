//! Listing discovery and product page extraction.
//!
//! The listing side fetches static markup through a [`ListingTransport`] and parses it with the
//! `scraper` crate. The product side drives a [`Renderer`] session per product and reconciles the
//! live DOM, a static snapshot of the rendered markup, and the post-interaction review state into
//! one [`ExtractionOutcome`].

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod browser;
pub mod extractors;
pub mod harvester;
pub mod http_client;
pub mod product;
pub mod reviews;

#[cfg(test)]
pub(crate) mod mock;

pub use browser::{RenderSession, Renderer, RendererFactory, WebDriverFactory};
pub use harvester::{ProductUrlSet, UrlHarvester};
pub use http_client::{HttpClient, ListingTransport};
pub use product::{ExtractionOutcome, ProductExtractor};
pub use reviews::{ReviewFilter, ReviewHeuristic, ReviewSampler};

/// How a renderer finds an element on the live page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css:{}", selector),
            Locator::XPath(expression) => write!(f, "xpath:{}", expression),
        }
    }
}
