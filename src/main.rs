use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pagepool::api;
use pagepool::models::{AppConfig, DocumentInput, PageFormat, PdfOptions};
use pagepool::rendering::ChromeFactory;
use pagepool::server;
use pagepool::services::{PdfGenerator, PoolConfig};

#[derive(Parser)]
#[command(name = "pagepool")]
#[command(about = "Pooled headless-browser HTML/URL to PDF rendering")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Render a single document to a PDF file
    Render {
        /// HTML file to render, or an http(s)/file URL
        #[arg(short, long)]
        input: String,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Paper format (e.g. A4, Letter); defaults to the configured render options
        #[arg(short, long)]
        format: Option<String>,

        /// Landscape orientation
        #[arg(long)]
        landscape: bool,

        /// Write the PDF chunk by chunk through a stream session
        #[arg(long)]
        stream: bool,
    },
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pagepool API",
        description = "Pooled headless-browser HTML/URL to PDF rendering",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(api::handle_pdf, api::handle_pool_stats),
    components(schemas(api::PdfRequest, api::PoolStatsResponse)),
    tags(
        (name = "PDF", description = "Document conversion"),
        (name = "Pool", description = "Renderer pool status")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Render {
            input,
            output,
            format,
            landscape,
            stream,
        }) => run_render_command(&input, &output, format.as_deref(), landscape, stream).await,
        Some(Commands::Serve) => run_server().await,
        None => {
            run_status_command();
            Ok(())
        }
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::var("CONFIG_FILE").ok().map(PathBuf::from)
}

/// Treat URL-looking input as an address, anything else as a markup file
async fn read_input(input: &str) -> anyhow::Result<DocumentInput> {
    if let Ok(url) = Url::parse(input) {
        if matches!(url.scheme(), "http" | "https" | "file") {
            return Ok(DocumentInput::Address(url));
        }
    }

    let html = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {input}: {e}"))?;
    Ok(DocumentInput::Markup(html))
}

fn parse_format(format: &str) -> anyhow::Result<PageFormat> {
    serde_json::from_value(serde_json::Value::String(format.to_string()))
        .map_err(|_| anyhow::anyhow!("Unknown page format: {format}"))
}

/// Render one document through a single-renderer pool (no server needed)
async fn run_render_command(
    input: &str,
    output: &Path,
    format: Option<&str>,
    landscape: bool,
    stream: bool,
) -> anyhow::Result<()> {
    // Minimal logging for CLI
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagepool=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = AppConfig::load(config_path().as_deref());
    let factory = ChromeFactory::from_config(&config.chrome)?;
    let generator = PdfGenerator::new(
        factory,
        PoolConfig {
            min: 1,
            max: 1,
            eviction_interval_ms: 0,
            ..config.pool.clone()
        },
    )?;

    let mut options: PdfOptions = config.render.clone();
    if let Some(format) = format {
        options.format = Some(parse_format(format)?);
    }
    if landscape {
        options.landscape = Some(true);
    }

    let document = read_input(input).await?;
    let result = render_to_file(&generator, document, options, output, stream).await;
    generator.shutdown().await;

    let written = result?;
    println!("Rendered {} ({} bytes)", output.display(), written);
    Ok(())
}

async fn render_to_file(
    generator: &PdfGenerator<ChromeFactory>,
    document: DocumentInput,
    options: PdfOptions,
    output: &Path,
    stream: bool,
) -> anyhow::Result<usize> {
    if !stream {
        let pdf = generator.render_buffer(document, Some(options)).await?;
        tokio::fs::write(output, &pdf).await?;
        return Ok(pdf.len());
    }

    let mut pdf = generator.render_stream(document, Some(options)).await?;
    let mut file = tokio::fs::File::create(output).await?;
    let mut written = 0;
    while let Some(chunk) = pdf.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

/// Display status and configuration information
fn run_status_command() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let bind_addr = std::env::var("BIND_ADDR").ok();
    let config_file = std::env::var("CONFIG_FILE").ok();
    let chrome_path = std::env::var("CHROME_PATH").ok();

    println!("Pagepool v{VERSION}");
    println!("Pooled HTML/URL to PDF rendering\n");

    println!("Environment Variables:");
    println!(
        "  BIND_ADDR   = {}",
        bind_addr.as_deref().unwrap_or("0.0.0.0:3000 (default)")
    );
    println!(
        "  CONFIG_FILE = {}",
        config_file.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  CHROME_PATH = {}",
        chrome_path.as_deref().unwrap_or("(not set)")
    );

    let config = AppConfig::load(config_path().as_deref());
    println!("\nRenderer Pool:");
    println!("  min = {}, max = {}", config.pool.min, config.pool.max);
    println!(
        "  eviction interval = {}ms, validate on return = {}",
        config.pool.eviction_interval_ms, config.pool.validate_on_return
    );

    println!("\nBrowser:");
    match ChromeFactory::from_config(&config.chrome) {
        Ok(factory) => println!("  {}", factory.binary().display()),
        Err(e) => println!("  {e}"),
    }

    println!("\nCommands:");
    println!("  pagepool serve    Start the HTTP server");
    println!("  pagepool render   Render a document to a PDF file");
    println!("\nRun 'pagepool --help' for more details.");
}

/// Run the HTTP server
async fn run_server() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagepool=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let config = AppConfig::load(config_path().as_deref());

    let state = server::create_app_state(&config)?;
    let generator = state.generator.clone();
    // Renderers are created on demand if the initial provisioning fails
    if let Err(e) = generator.await_ready().await {
        tracing::warn!(error = %e, "Renderer pool not ready at startup");
    }

    let app = server::build_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Pagepool server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    generator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(%e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested");
}
