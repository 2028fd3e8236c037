use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub max_files: usize,
    pub log_directory: PathBuf,
    pub include_spans: bool,
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            console_enabled: true,
            max_files: 5,
            log_directory: PathBuf::from("logs"),
            include_spans: false,
            include_targets: true,
        }
    }
}

/// Initialize logging system
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.include_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    if config.console_enabled {
        let console_layer = fmt::layer()
            .with_target(config.include_targets)
            .with_span_events(span_events.clone())
            .with_writer(std::io::stderr)
            .boxed();

        layers.push(console_layer);
    }

    if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("catalog-harvester")
            .filename_suffix("log")
            .max_log_files(config.max_files)
            .build(&config.log_directory)?;

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(config.include_targets)
            .with_span_events(span_events)
            .with_writer(file_appender)
            .boxed();

        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_enabled {
        info!("Log directory: {}", config.log_directory.display());
    }

    Ok(())
}

/// Structured logging context
#[derive(Debug, Clone, Serialize)]
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub run_id: Option<String>,
    pub query: Option<String>,
    pub url: Option<String>,
    pub duration_ms: Option<u64>,
    pub status: Option<String>,
    pub error_category: Option<String>,
    pub additional_fields: HashMap<String, serde_json::Value>,
}

impl LogContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            run_id: None,
            query: None,
            url: None,
            duration_ms: None,
            status: None,
            error_category: None,
            additional_fields: HashMap::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_error_category(mut self, category: impl Into<String>) -> Self {
        self.error_category = Some(category.into());
        self
    }

    pub fn with_string_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_fields
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    pub fn with_number_field(mut self, key: impl Into<String>, value: impl Into<i64>) -> Self {
        self.additional_fields.insert(
            key.into(),
            serde_json::Value::Number(serde_json::Number::from(value.into())),
        );
        self
    }
}

/// Structured logging macros
#[macro_export]
macro_rules! log_info {
    ($context:expr, $message:expr) => {
        tracing::info!(
            component = $context.component,
            operation = $context.operation,
            run_id = $context.run_id,
            query = $context.query,
            url = $context.url,
            duration_ms = $context.duration_ms,
            status = $context.status,
            additional_fields = ?$context.additional_fields,
            "{}", $message
        );
    };
}

#[macro_export]
macro_rules! log_warn {
    ($context:expr, $message:expr) => {
        tracing::warn!(
            component = $context.component,
            operation = $context.operation,
            run_id = $context.run_id,
            query = $context.query,
            url = $context.url,
            duration_ms = $context.duration_ms,
            status = $context.status,
            error_category = $context.error_category,
            additional_fields = ?$context.additional_fields,
            "{}", $message
        );
    };

    ($context:expr, $error:expr, $message:expr) => {
        tracing::warn!(
            component = $context.component,
            operation = $context.operation,
            run_id = $context.run_id,
            query = $context.query,
            url = $context.url,
            duration_ms = $context.duration_ms,
            status = $context.status,
            error_category = $context.error_category,
            additional_fields = ?$context.additional_fields,
            error = %$error,
            "{}", $message
        );
    };
}

#[macro_export]
macro_rules! log_error {
    ($context:expr, $error:expr, $message:expr) => {
        tracing::error!(
            component = $context.component,
            operation = $context.operation,
            run_id = $context.run_id,
            query = $context.query,
            url = $context.url,
            duration_ms = $context.duration_ms,
            status = $context.status,
            error_category = $context.error_category,
            additional_fields = ?$context.additional_fields,
            error = %$error,
            "{}", $message
        );
    };
}

#[macro_export]
macro_rules! log_debug {
    ($context:expr, $message:expr) => {
        tracing::debug!(
            component = $context.component,
            operation = $context.operation,
            run_id = $context.run_id,
            url = $context.url,
            additional_fields = ?$context.additional_fields,
            "{}", $message
        );
    };
}

/// Stamps elapsed time onto a context when an operation finishes
pub struct PerformanceLogger {
    context: LogContext,
    start_time: std::time::Instant,
}

impl PerformanceLogger {
    pub fn new(context: LogContext) -> Self {
        Self {
            context,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn finish_with_status(self, message: &str, status: impl Into<String>) {
        let duration = self.start_time.elapsed();
        let context = self.context.with_duration(duration).with_status(status);
        log_info!(context, message);
    }

    pub fn finish_with_error(self, message: &str, error: &crate::error::ScrapeError) {
        let duration = self.start_time.elapsed();
        let context = self
            .context
            .with_duration(duration)
            .with_status("void")
            .with_error_category(error.category());
        log_warn!(context, error, message);
    }
}

/// Run identifier generation
pub struct RunIdGenerator;

impl RunIdGenerator {
    pub fn generate() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let timestamp = chrono::Utc::now().timestamp_millis();
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

        format!("run-{}-{:04}", timestamp, counter % 10000)
    }
}
