use std::sync::Arc;

use clap::Parser;
use tokio::signal;

use bachpan_core::catalog;
use bachpan_core::embedding::local::LocalImageEmbedder;
use bachpan_core::embedding::ImageEmbedder;
use bachpan_core::MatchService;

mod api;
mod config;

use api::AppState;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = config::Cli::parse();
    let config = cli.load_config().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let items = catalog::resolve(&config.catalog).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let embedder = tokio::task::spawn_blocking(LocalImageEmbedder::new)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: embedding model loader crashed: {e}");
            std::process::exit(1);
        })
        .unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        });
    let embedder: Arc<dyn ImageEmbedder> = Arc::new(embedder);

    let service = Arc::new(MatchService::new(
        Arc::clone(&embedder),
        config.matching.options(),
    ));
    let state = Arc::new(AppState {
        service: Arc::clone(&service),
        catalog: config.catalog.clone(),
    });

    // Build the reference set in the background; requests observe the
    // Initializing state until it completes.
    let catalog_size = items.len();
    tokio::spawn(async move {
        match service.initialize(items).await {
            Ok(report) => log::info!(
                "reference set ready: {}/{} entries loaded",
                report.loaded,
                report.total
            ),
            Err(e) => log::error!("reference set unavailable: {e}"),
        }
    });

    let addr = config.bind_address();
    let app = api::router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to bind to {addr}: {e}");
            std::process::exit(1);
        });

    println!("bachpan server started");
    println!("  address:   http://{addr}");
    println!("  embedder:  {} ({})", embedder.model_name(), embedder.provider_type());
    println!("  catalog:   {catalog_size} images");
    println!("  readiness: {:?}", config.matching.readiness);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Error: server error: {e}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        log::error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
