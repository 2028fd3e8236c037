use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::logging::LoggingConfig;
use crate::scraper::Locator;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub http: HttpConfig,
    pub render: RenderConfig,
    pub reviews: ReviewConfig,
    pub selectors: SelectorConfig,
    pub batch: BatchConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Catalog site addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub origin: String,
    pub search_path: String,
    pub query_param: String,
}

/// Listing transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_seconds: u64,
}

/// How the review sampler waits for the five-star filter to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// Sleep for the whole settle window
    Fixed,
    /// Poll review text until it changes, bounded by the settle window
    Poll,
}

/// Browser session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub browser_args: Vec<String>,
    pub user_agent: Option<String>,
    pub wait_timeout_seconds: u64,
    pub scroll_settle_ms: u64,
    pub filter_settle_ms: u64,
    pub settle_poll_interval_ms: u64,
    pub settle_mode: SettleMode,
}

/// How excluded review texts are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionMatch {
    Exact,
    Contains,
}

/// Review admission heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_reviews: usize,
    pub min_length: usize,
    pub excluded_texts: Vec<String>,
    pub exclusion_match: ExclusionMatch,
}

/// Page structure the extractors rely on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub product_grid: String,
    pub product_link: String,
    pub structured_data: String,
    pub identifier_key: String,
    pub title: Locator,
    pub brand: Locator,
    pub price: Locator,
    pub rating: Locator,
    pub review_count: Locator,
    pub five_star_filter: Locator,
    pub review_text: Locator,
}

/// Batch run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_products: usize,
    pub inter_product_delay_ms: u64,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub default_format: String,
    pub output_directory: PathBuf,
    pub filename: String,
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.paris.cl".to_string(),
            search_path: "/search/".to_string(),
            query_param: "q".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            browser_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            wait_timeout_seconds: 10,
            scroll_settle_ms: 1000,
            filter_settle_ms: 2000,
            settle_poll_interval_ms: 250,
            settle_mode: SettleMode::Poll,
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_reviews: 4,
            min_length: 20,
            excluded_texts: vec!["Resumen de opiniones".to_string()],
            exclusion_match: ExclusionMatch::Exact,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            product_grid: "div[data-testid='product-list-grid']".to_string(),
            product_link: "a[href]".to_string(),
            structured_data: "script[type='application/ld+json']".to_string(),
            identifier_key: "sku".to_string(),
            title: Locator::css("h1[data-testid='paris-text']"),
            brand: Locator::xpath("//h1[@data-testid='paris-text']/preceding-sibling::span[1]"),
            price: Locator::css("h2[data-testid='paris-text']"),
            rating: Locator::css("button[data-testid='star-rating-rating-value']"),
            review_count: Locator::css("button[data-testid='star-rating-total-rating']"),
            five_star_filter: Locator::xpath("//button[.//span[text()='5']]"),
            review_text: Locator::css(
                "span[data-testid='paris-text'].ui-text-neutral-900.ui-font-regular",
            ),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_products: 5,
            inter_product_delay_ms: 0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: "csv".to_string(),
            output_directory: PathBuf::from("data"),
            filename: "paris_products.csv".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn wait_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.wait_timeout_seconds)
    }
}

impl AppConfig {
    /// Load configuration from the default location, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: AppConfig = toml::from_str(&content)?;

        config.validate()?;

        info!("Configuration loaded from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = get_config_path();
        self.save_to(&config_path).await?;
        Ok(config_path)
    }

    /// Save configuration to specific file
    pub async fn save_to<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let origin = url::Url::parse(&self.site.origin)
            .map_err(|e| anyhow::anyhow!("Site origin '{}' is not a URL: {}", self.site.origin, e))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("Site origin must use http or https"));
        }

        if !self.site.search_path.starts_with('/') {
            return Err(anyhow::anyhow!("Site search_path must start with '/'"));
        }

        if self.site.query_param.is_empty() {
            return Err(anyhow::anyhow!("Site query_param must not be empty"));
        }

        if self.http.user_agent.trim().is_empty() {
            return Err(anyhow::anyhow!("HTTP user_agent must not be empty"));
        }

        if self.http.max_retries == 0 {
            return Err(anyhow::anyhow!("HTTP max_retries must be > 0"));
        }

        if self.render.wait_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Render wait_timeout_seconds must be > 0"));
        }

        if self.render.settle_mode == SettleMode::Poll && self.render.settle_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Render settle_poll_interval_ms must be > 0 in poll mode"));
        }

        if self.reviews.max_reviews == 0 {
            return Err(anyhow::anyhow!("Reviews max_reviews must be > 0"));
        }

        if self.batch.max_products == 0 {
            return Err(anyhow::anyhow!("Batch max_products must be > 0"));
        }

        for (name, selector) in [
            ("product_grid", &self.selectors.product_grid),
            ("product_link", &self.selectors.product_link),
            ("structured_data", &self.selectors.structured_data),
        ] {
            scraper::Selector::parse(selector)
                .map_err(|e| anyhow::anyhow!("Invalid {} selector '{}': {:?}", name, selector, e))?;
        }

        if self.selectors.identifier_key.is_empty() {
            return Err(anyhow::anyhow!("Selectors identifier_key must not be empty"));
        }

        Ok(())
    }
}

/// Get the configuration file path
pub fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "catalog", "harvester")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_from<F>(config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(webdriver_url) = lookup("HARVESTER_WEBDRIVER_URL") {
            config.render.webdriver_url = webdriver_url;
        }

        if let Some(timeout) = lookup("HARVESTER_WAIT_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            config.render.wait_timeout_seconds = timeout;
        }

        if let Some(max) = lookup("HARVESTER_MAX_PRODUCTS").and_then(|v| v.parse::<usize>().ok()) {
            config.batch.max_products = max;
        }

        if let Some(dir) = lookup("HARVESTER_OUTPUT_DIR") {
            config.export.output_directory = PathBuf::from(dir);
        }

        if let Some(level) = lookup("HARVESTER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}
