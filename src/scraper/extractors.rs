//! Per-field extraction procedures for a product detail page.
//!
//! Required fields read from the live DOM and fail the record; optional fields
//! degrade to `None` or zero. The identifier comes from a static parse of the
//! rendered markup rather than the live DOM.

use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::browser::Renderer;
use super::Locator;
use crate::error::{OptionalField, RequiredField, ScrapeError, ScrapeResult};
use crate::utils::parse_digits;

/// Strip every non-digit and parse the remainder as the price
pub fn parse_price(text: &str, url: &Url) -> ScrapeResult<u64> {
    parse_digits(text).ok_or_else(|| ScrapeError::RequiredFieldInvalid {
        field: RequiredField::Price,
        url: url.to_string(),
        value: text.to_string(),
    })
}

/// Bounded wait for a required field's trimmed text; blank text counts as missing
pub async fn read_required(
    renderer: &dyn Renderer,
    locator: &Locator,
    field: RequiredField,
    url: &Url,
    timeout: Duration,
) -> ScrapeResult<String> {
    let text = match renderer.wait_for_text(locator, timeout).await {
        Ok(text) => text,
        Err(ScrapeError::WaitTimeout { .. }) => {
            return Err(ScrapeError::RequiredFieldTimeout {
                field,
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
        Err(e) => return Err(e),
    };

    if text.is_empty() {
        return Err(ScrapeError::RequiredFieldInvalid {
            field,
            url: url.to_string(),
            value: text,
        });
    }
    Ok(text)
}

/// Rating and review count, read together.
///
/// The count is only waited for once the rating is present; a miss on either
/// yields `(None, 0)`.
pub async fn read_rating_and_count(
    renderer: &dyn Renderer,
    rating: &Locator,
    review_count: &Locator,
    timeout: Duration,
) -> (Option<String>, u64) {
    match try_rating_and_count(renderer, rating, review_count, timeout).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!("Rating unavailable, using defaults: {}", e);
            (None, 0)
        }
    }
}

async fn try_rating_and_count(
    renderer: &dyn Renderer,
    rating: &Locator,
    review_count: &Locator,
    timeout: Duration,
) -> ScrapeResult<(Option<String>, u64)> {
    let rating_text = renderer
        .wait_for_text(rating, timeout)
        .await
        .map_err(|e| ScrapeError::OptionalFieldTimeout {
            field: OptionalField::Rating,
            reason: e.to_string(),
        })?;
    let count_text = renderer
        .wait_for_text(review_count, timeout)
        .await
        .map_err(|e| ScrapeError::OptionalFieldTimeout {
            field: OptionalField::ReviewCount,
            reason: e.to_string(),
        })?;

    let rating = Some(rating_text).filter(|r| !r.is_empty());
    Ok((rating, parse_digits(&count_text).unwrap_or(0)))
}

/// Product identifier from embedded structured data.
///
/// Scans every matching script in document order and returns the first
/// non-empty value under `key` found on the top-level object, on any object of
/// a top-level array, or on any node of an `@graph` array.
pub fn extract_identifier(html: &str, script_selector: &Selector, key: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for script in document.select(script_selector) {
        let payload: String = script.text().collect();
        let value: Value = match serde_json::from_str(payload.trim()) {
            Ok(value) => value,
            Err(e) => {
                debug!("Skipping unparsable structured data block: {}", e);
                continue;
            }
        };

        if let Some(id) = identifier_in(&value, key) {
            return Some(id);
        }
    }

    None
}

fn identifier_in(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(|item| identifier_in(item, key)),
        Value::Object(map) => map
            .get(key)
            .and_then(scalar_text)
            .or_else(|| match map.get("@graph") {
                Some(Value::Array(nodes)) => nodes.iter().find_map(|node| identifier_in(node, key)),
                _ => None,
            }),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(text).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;
    use crate::scraper::browser::RendererFactory;
    use crate::scraper::mock::{ScriptedFactory, ScriptedPage};

    const URL: &str = "https://www.paris.cl/parlante-jbl-flip-6.html";

    fn url() -> Url {
        Url::parse(URL).unwrap()
    }

    fn script_selector() -> Selector {
        Selector::parse(&SelectorConfig::default().structured_data).unwrap()
    }

    fn ld_json(body: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
            body
        )
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$49.990", &url()).unwrap(), 49990);
        assert_eq!(parse_price("$ 1.299.990", &url()).unwrap(), 1299990);

        let error = parse_price("Precio no disponible", &url()).unwrap_err();
        assert!(matches!(
            error,
            ScrapeError::RequiredFieldInvalid { field: RequiredField::Price, .. }
        ));
    }

    #[test]
    fn test_identifier_from_top_level_object() {
        let html = ld_json(r#"{"@type": "Product", "sku": "  MKSRN1YA6S "}"#);
        assert_eq!(
            extract_identifier(&html, &script_selector(), "sku"),
            Some("MKSRN1YA6S".to_string())
        );
    }

    #[test]
    fn test_identifier_numeric_value() {
        let html = ld_json(r#"{"sku": 805071}"#);
        assert_eq!(
            extract_identifier(&html, &script_selector(), "sku"),
            Some("805071".to_string())
        );
    }

    #[test]
    fn test_identifier_from_array_and_graph() {
        let array = ld_json(r#"[{"@type": "BreadcrumbList"}, {"@type": "Product", "sku": "A1"}]"#);
        assert_eq!(extract_identifier(&array, &script_selector(), "sku"), Some("A1".to_string()));

        let graph = ld_json(r#"{"@context": "https://schema.org", "@graph": [{"@type": "Organization"}, {"sku": "G7"}]}"#);
        assert_eq!(extract_identifier(&graph, &script_selector(), "sku"), Some("G7".to_string()));
    }

    #[test]
    fn test_identifier_skips_bad_blocks_in_order() {
        let html = r#"<html><head>
            <script type="application/ld+json">{ not json</script>
            <script type="application/ld+json">{"@type": "Organization", "sku": ""}</script>
            <script type="application/json">{"sku": "WRONG-TYPE"}</script>
            <script type="application/ld+json">{"sku": "SECOND"}</script>
            <script type="application/ld+json">{"sku": "THIRD"}</script>
        </head></html>"#;
        assert_eq!(
            extract_identifier(html, &script_selector(), "sku"),
            Some("SECOND".to_string())
        );
    }

    #[test]
    fn test_identifier_absent() {
        assert_eq!(extract_identifier("<html></html>", &script_selector(), "sku"), None);
        let html = ld_json(r#"{"@type": "Product", "name": "Parlante"}"#);
        assert_eq!(extract_identifier(&html, &script_selector(), "sku"), None);
    }

    #[tokio::test]
    async fn test_required_field_timeout() {
        let selectors = SelectorConfig::default();
        let factory = ScriptedFactory::new(vec![(URL, ScriptedPage::new())]);
        let renderer = factory.open().await.unwrap();
        renderer.navigate(&url()).await.unwrap();

        let error = read_required(
            renderer.as_ref(),
            &selectors.brand,
            RequiredField::Brand,
            &url(),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            error,
            ScrapeError::RequiredFieldTimeout { field: RequiredField::Brand, .. }
        ));
    }

    #[tokio::test]
    async fn test_rating_and_count_are_one_unit() {
        let selectors = SelectorConfig::default();
        let timeout = Duration::from_millis(10);

        let only_count = ScriptedPage::new().text(selectors.review_count.clone(), "(12)");
        let complete = ScriptedPage::new()
            .text(selectors.rating.clone(), " 4.7 ")
            .text(selectors.review_count.clone(), "(128 opiniones)");
        let only_rating = ScriptedPage::new().text(selectors.rating.clone(), "4.2");

        let factory = ScriptedFactory::new(vec![
            ("https://www.paris.cl/a.html", only_count),
            ("https://www.paris.cl/b.html", complete),
            ("https://www.paris.cl/c.html", only_rating),
        ]);
        let renderer = factory.open().await.unwrap();

        let mut results = Vec::new();
        for page in ["a", "b", "c"] {
            let page_url = Url::parse(&format!("https://www.paris.cl/{}.html", page)).unwrap();
            renderer.navigate(&page_url).await.unwrap();
            results.push(
                read_rating_and_count(renderer.as_ref(), &selectors.rating, &selectors.review_count, timeout)
                    .await,
            );
        }

        assert_eq!(
            results,
            vec![(None, 0), (Some("4.7".to_string()), 128), (None, 0)]
        );
    }
}
