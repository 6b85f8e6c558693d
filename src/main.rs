mod cache;
mod config;
mod display;
mod error;
mod exif_extract;
mod icc;
mod iptc;
mod metadata;
mod photography;
mod provenance;
mod provenance_source;
mod provenance_sources;
mod resolver;
#[cfg(test)]
mod test_fixtures;
mod web_server;

use crate::config::AppConfig;
use crate::provenance_source::ProvenanceSource;
use crate::provenance_sources::{c2pa_library::C2paLibrary, exiftool::Exiftool};
use crate::resolver::HttpFetcher;
use crate::web_server::AppState;
use anyhow::Result;
use clap::Parser;
use log::info;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "Serves EXIF and Content Credentials metadata for images")]
struct Cli {
    /// Port to listen on, overrides `web_port`
    #[arg(short, long)]
    port: Option<u16>,

    /// Provenance backend: `c2pa` or `exiftool`
    #[arg(short, long)]
    engine: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::new()?;
    if let Some(port) = cli.port {
        config.web_port = port;
    }
    if let Some(engine) = cli.engine {
        config.provenance_engine = engine;
    }

    // Initialize env_logger based on config.log_level
    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting c2pa-viewer");

    let provenance: Arc<dyn ProvenanceSource> = if config.provenance_engine == "exiftool" {
        Arc::new(Exiftool::new(&config))
    } else {
        Arc::new(C2paLibrary::new())
    };
    info!("Using provenance engine: {}", config.provenance_engine);

    let state = AppState::new(Arc::new(config), provenance, Arc::new(HttpFetcher::new()?));

    if let Err(e) = web_server::start_web_server(state).await {
        log::error!("Web server error: {}", e);
    }

    info!("c2pa-viewer finished");

    Ok(())
}
