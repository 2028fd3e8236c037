use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use catalog_harvester::config::{get_config_path, ConfigOverrides};
use catalog_harvester::export::ExportFormat;
use catalog_harvester::logging::{init_logging, LogContext, RunIdGenerator};
use catalog_harvester::utils::{format_duration, truncate_string};
use catalog_harvester::{log_info, AppConfig, CatalogHarvester};

#[derive(Parser)]
#[command(name = "catalog-harvester")]
#[command(about = "Harvest product records from a catalog search")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "WebDriver endpoint URL")]
    webdriver: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest product URLs for a query, extract each product and export the records
    Scrape {
        #[arg(help = "Search query")]
        query: String,

        #[arg(short, long, help = "Maximum number of products")]
        max_products: Option<usize>,

        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Output format", value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the product URLs a query would visit
    Urls {
        #[arg(help = "Search query")]
        query: String,

        #[arg(short, long, help = "Maximum number of products")]
        max_products: Option<usize>,
    },

    /// Write the default configuration file
    InitConfig {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum OutputFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { force } = cli.command {
        return init_config(cli.config, force).await;
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path).await?,
        None => AppConfig::load().await?,
    };
    ConfigOverrides::apply(&mut config);
    if let Some(webdriver) = cli.webdriver {
        config.render.webdriver_url = webdriver;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;

    let context = LogContext::new("main", "startup")
        .with_run_id(RunIdGenerator::generate())
        .with_string_field("version", env!("CARGO_PKG_VERSION"));
    log_info!(context, "Catalog harvester starting up");

    let default_max = config.batch.max_products;
    let app = CatalogHarvester::new(config)?;

    match cli.command {
        Commands::Scrape {
            query,
            max_products,
            output,
            format,
        } => {
            execute_scrape(&app, &query, max_products.unwrap_or(default_max), output, format).await?;
        }
        Commands::Urls { query, max_products } => {
            list_urls(&app, &query, max_products.unwrap_or(default_max)).await;
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

async fn execute_scrape(
    app: &CatalogHarvester,
    query: &str,
    max_products: usize,
    output: Option<PathBuf>,
    format: Option<OutputFormat>,
) -> Result<()> {
    info!("Starting scraping for query: '{}'", query);

    let report = app.scrape(query, max_products).await;

    println!("\n--- Scraping Summary ---");
    println!("Run: {}", report.run_id);
    println!("URLs harvested: {}", report.harvested);
    println!("Products extracted: {}", report.records.len());
    println!("Duration: {}", format_duration(report.duration()));
    for failure in &report.failures {
        println!("  skipped {} ({})", failure.url, truncate_string(&failure.reason, 100));
    }
    println!("------------------------");

    if report.records.is_empty() {
        println!("Scraping finished with no data.");
        return Ok(());
    }

    let stats = app
        .export(&report.records, output.as_deref(), format.map(convert_format))
        .await?;
    if let Some(stats) = stats {
        println!(
            "Data saved to {} ({} records, {} bytes)",
            stats.file_path.display(),
            stats.record_count,
            stats.file_size_bytes
        );
    }

    Ok(())
}

async fn list_urls(app: &CatalogHarvester, query: &str, max_products: usize) {
    let urls = app.harvest_urls(query, max_products).await;

    if urls.is_empty() {
        println!("No product URLs were found.");
        return;
    }

    println!("--- Found {} Product URLs ---", urls.len());
    for (i, url) in urls.iter().enumerate() {
        println!("{}: {}", i + 1, url);
    }
}

async fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(get_config_path);
    if path.exists() && !force {
        println!("Configuration already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    AppConfig::default().save_to(&path).await?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}

fn convert_format(format: OutputFormat) -> ExportFormat {
    match format {
        OutputFormat::Csv => ExportFormat::Csv,
        OutputFormat::Json => ExportFormat::Json,
    }
}
