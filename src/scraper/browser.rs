use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::Locator;
use crate::error::ScrapeResult;

/// A live browser page the product pipeline can drive
///
/// Every wait is bounded by the timeout passed in; expiry surfaces as
/// `ScrapeError::WaitTimeout` so callers decide whether it voids the record.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn navigate(&self, url: &Url) -> ScrapeResult<()>;

    /// Wait until the element is present and return its trimmed visible text
    async fn wait_for_text(&self, locator: &Locator, timeout: Duration) -> ScrapeResult<String>;

    /// Wait until the element is present, displayed and enabled
    async fn wait_for_clickable(&self, locator: &Locator, timeout: Duration) -> ScrapeResult<()>;

    async fn scroll_into_view(&self, locator: &Locator) -> ScrapeResult<()>;

    async fn click(&self, locator: &Locator) -> ScrapeResult<()>;

    /// Visible text of every matching element, in document order
    async fn texts(&self, locator: &Locator) -> ScrapeResult<Vec<String>>;

    /// Serialized markup of the rendered document
    async fn page_source(&self) -> ScrapeResult<String>;

    async fn close(&self) -> ScrapeResult<()>;
}

/// Opens a fresh renderer per product
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn open(&self) -> ScrapeResult<Box<dyn Renderer>>;
}

/// Exclusive ownership of one renderer for the span of a single extraction.
///
/// `release` closes the session explicitly. If the guard is dropped without a release (the
/// owning future was cancelled) the close is handed to the runtime instead.
pub struct RenderSession {
    renderer: Option<Box<dyn Renderer>>,
}

impl RenderSession {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            renderer: Some(renderer),
        }
    }

    pub fn renderer(&self) -> Option<&dyn Renderer> {
        self.renderer.as_deref()
    }

    /// Close the underlying session; close failures are logged, not returned
    pub async fn release(mut self) {
        if let Some(renderer) = self.renderer.take() {
            match renderer.close().await {
                Ok(()) => debug!("Renderer session released"),
                Err(e) => warn!("Failed to close renderer session: {}", e),
            }
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = renderer.close().await {
                            warn!("Failed to close abandoned renderer session: {}", e);
                        }
                    });
                }
                Err(_) => warn!("Renderer session dropped outside a runtime; it could not be closed"),
            }
        }
    }
}

#[cfg(feature = "browser")]
pub use webdriver::{WebDriverFactory, WebDriverRenderer};

#[cfg(feature = "browser")]
mod webdriver {
    use async_trait::async_trait;
    use fantoccini::{Client, ClientBuilder};
    use serde_json::json;
    use std::time::Duration;
    use tracing::{debug, info};
    use url::Url;

    use super::{Renderer, RendererFactory};
    use crate::config::RenderConfig;
    use crate::error::{ScrapeError, ScrapeResult};
    use crate::scraper::Locator;

    fn to_fantoccini(locator: &Locator) -> fantoccini::Locator<'_> {
        match locator {
            Locator::Css(selector) => fantoccini::Locator::Css(selector),
            Locator::XPath(expression) => fantoccini::Locator::XPath(expression),
        }
    }

    fn cmd_error(e: fantoccini::error::CmdError) -> ScrapeError {
        ScrapeError::renderer(e.to_string())
    }

    /// Renderer backed by a WebDriver session (chromedriver, geckodriver)
    pub struct WebDriverRenderer {
        client: Client,
        poll_interval: Duration,
    }

    impl WebDriverRenderer {
        async fn find(&self, locator: &Locator) -> ScrapeResult<fantoccini::elements::Element> {
            self.client
                .find(to_fantoccini(locator))
                .await
                .map_err(cmd_error)
        }

        async fn wait_for_element(
            &self,
            locator: &Locator,
            timeout: Duration,
        ) -> ScrapeResult<fantoccini::elements::Element> {
            self.client
                .wait()
                .at_most(timeout)
                .every(self.poll_interval)
                .for_element(to_fantoccini(locator))
                .await
                .map_err(|e| {
                    debug!("Wait for {} ended without element: {}", locator, e);
                    ScrapeError::WaitTimeout {
                        locator: locator.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }
                })
        }
    }

    #[async_trait]
    impl Renderer for WebDriverRenderer {
        async fn navigate(&self, url: &Url) -> ScrapeResult<()> {
            self.client
                .goto(url.as_str())
                .await
                .map_err(|e| ScrapeError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
        }

        async fn wait_for_text(&self, locator: &Locator, timeout: Duration) -> ScrapeResult<String> {
            let element = self.wait_for_element(locator, timeout).await?;
            let text = element.text().await.map_err(cmd_error)?;
            Ok(text.trim().to_string())
        }

        async fn wait_for_clickable(&self, locator: &Locator, timeout: Duration) -> ScrapeResult<()> {
            let deadline = tokio::time::Instant::now() + timeout;
            let element = self.wait_for_element(locator, timeout).await?;

            loop {
                let displayed = element.is_displayed().await.map_err(cmd_error)?;
                let enabled = element.is_enabled().await.map_err(cmd_error)?;
                if displayed && enabled {
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(ScrapeError::WaitTimeout {
                        locator: locator.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        async fn scroll_into_view(&self, locator: &Locator) -> ScrapeResult<()> {
            let element = self.find(locator).await?;
            let argument = serde_json::to_value(&element)
                .map_err(|e| ScrapeError::renderer(e.to_string()))?;
            self.client
                .execute("arguments[0].scrollIntoView(true);", vec![argument])
                .await
                .map_err(cmd_error)?;
            Ok(())
        }

        async fn click(&self, locator: &Locator) -> ScrapeResult<()> {
            let element = self.find(locator).await?;
            element.click().await.map_err(cmd_error)?;
            Ok(())
        }

        async fn texts(&self, locator: &Locator) -> ScrapeResult<Vec<String>> {
            let elements = self
                .client
                .find_all(to_fantoccini(locator))
                .await
                .map_err(cmd_error)?;

            let mut texts = Vec::with_capacity(elements.len());
            for element in elements {
                texts.push(element.text().await.map_err(cmd_error)?);
            }
            Ok(texts)
        }

        async fn page_source(&self) -> ScrapeResult<String> {
            self.client.source().await.map_err(cmd_error)
        }

        async fn close(&self) -> ScrapeResult<()> {
            self.client.clone().close().await.map_err(cmd_error)
        }
    }

    /// Connects a new WebDriver session per product
    pub struct WebDriverFactory {
        config: RenderConfig,
    }

    impl WebDriverFactory {
        pub fn new(config: &RenderConfig) -> Self {
            Self {
                config: config.clone(),
            }
        }

        fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
            let mut args = self.config.browser_args.clone();
            if self.config.headless {
                args.push("--headless=new".to_string());
            }
            if let Some(user_agent) = &self.config.user_agent {
                args.push(format!("--user-agent={}", user_agent));
            }

            let mut capabilities = serde_json::Map::new();
            capabilities.insert("browserName".to_string(), json!("chrome"));
            capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            capabilities
        }
    }

    #[async_trait]
    impl RendererFactory for WebDriverFactory {
        async fn open(&self) -> ScrapeResult<Box<dyn Renderer>> {
            debug!("Connecting to WebDriver at {}", self.config.webdriver_url);

            let client = ClientBuilder::native()
                .capabilities(self.capabilities())
                .connect(&self.config.webdriver_url)
                .await
                .map_err(|e| ScrapeError::SessionStart {
                    message: e.to_string(),
                })?;

            info!("WebDriver session opened");
            Ok(Box::new(WebDriverRenderer {
                client,
                poll_interval: Duration::from_millis(self.config.settle_poll_interval_ms.max(50)),
            }))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_capabilities_carry_headless_and_user_agent() {
            let config = RenderConfig {
                user_agent: Some("harvester-test".to_string()),
                ..RenderConfig::default()
            };
            let capabilities = WebDriverFactory::new(&config).capabilities();
            let args = capabilities["goog:chromeOptions"]["args"].as_array().unwrap();

            assert!(args.iter().any(|a| a == "--headless=new"));
            assert!(args.iter().any(|a| a == "--user-agent=harvester-test"));
            assert!(args.iter().any(|a| a == "--no-sandbox"));
        }
    }
}

// Stub implementation when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct WebDriverFactory;

#[cfg(not(feature = "browser"))]
impl WebDriverFactory {
    pub fn new(_config: &crate::config::RenderConfig) -> Self {
        Self
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl RendererFactory for WebDriverFactory {
    async fn open(&self) -> ScrapeResult<Box<dyn Renderer>> {
        Err(crate::error::ScrapeError::SessionStart {
            message: "Browser feature not enabled".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::mock::{ScriptedFactory, ScriptedPage};

    #[tokio::test]
    async fn test_release_closes_session() {
        let factory = ScriptedFactory::new(vec![("https://www.paris.cl/p-1.html", ScriptedPage::new())]);
        let session = RenderSession::new(factory.open().await.unwrap());

        assert!(session.renderer().is_some());
        session.release().await;
        assert_eq!(factory.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_release_still_closes() {
        let factory = ScriptedFactory::new(vec![("https://www.paris.cl/p-1.html", ScriptedPage::new())]);
        {
            let _session = RenderSession::new(factory.open().await.unwrap());
        }
        // the close runs on the runtime after the guard is dropped
        for _ in 0..10 {
            if factory.closed_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(factory.closed_count(), 1);
    }
}
