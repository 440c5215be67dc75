use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod mcp;
mod pipeline;
mod tools;

use config::ServerConfig;
use mcp::server::{McpServer, ServerContext};
use pipeline::{PdfiumRasterizer, Pipeline};

/// Startup banner on stderr; stdout belongs to JSON-RPC.
fn print_banner(config: &ServerConfig) {
    const WIDTH: usize = 56;
    let rule = "═".repeat(WIDTH);
    let lines = [
        format!("MCP-PDF2PNG v{}", env!("CARGO_PKG_VERSION")),
        "PDF → PNG conversion over the Model Context Protocol".to_string(),
        format!("render resolution: {} dpi", config.dpi),
    ];

    eprintln!("\n\x1b[36m╔{}╗", rule);
    for line in &lines {
        let pad = WIDTH.saturating_sub(line.chars().count());
        let left = pad / 2;
        eprintln!("║{}{}{}║", " ".repeat(left), line, " ".repeat(pad - left));
    }
    eprintln!("╚{}╝\x1b[0m\n", rule);
}

fn init_tracing(quiet: bool) {
    // RUST_LOG wins; otherwise info, or error only in quiet mode.
    let default_level = if quiet { "error" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let matches = config::command().get_matches();
    let config = ServerConfig::from_matches(&matches);

    init_tracing(config.quiet);

    match &config.pdfium_lib_path {
        Some(path) if !Path::new(path).exists() => {
            warn!(
                "pdfium library path {} does not exist - falling back to ./ and system paths",
                path.display()
            );
        }
        Some(path) => info!("Using pdfium from {}", path.display()),
        None => info!("PDFIUM_LIB_PATH not set - binding pdfium from ./ or system paths"),
    }

    if let Some(dir) = &config.temp_dir {
        info!("Downloads will be staged in {}", dir.display());
    }

    let client = match config.http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            process::exit(1);
        }
    };

    let rasterizer = Arc::new(PdfiumRasterizer::new(
        config.dpi,
        config.pdfium_lib_path.clone(),
    ));
    let pipeline = Pipeline::new(client, rasterizer, config.temp_dir.clone());

    if !config.quiet {
        print_banner(&config);
    }

    info!("Starting MCP server...");

    let mut server = McpServer::new(ServerContext::new(pipeline));
    if let Err(e) = server.start().await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
