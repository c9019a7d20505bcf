use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pollboothd starting");

    let config = config::Config::from_env();
    tracing::info!(
        model = %config.verify.model,
        detector = %config.verify.detector,
        threshold = config.verify.threshold,
        bind = %config.bind_addr,
        port = config.port,
        max_body_bytes = config.max_body_bytes,
        "configuration loaded"
    );

    // Model load failures degrade the service instead of stopping it.
    let (comparator, models_loaded) = engine::load_comparator(&config);
    let engine = engine::spawn_engine(comparator)?;

    let state = web::Data::new(http::AppState {
        engine,
        verify: Arc::new(config.verify.clone()),
        models_loaded,
    });
    let body_limit = config.max_body_bytes;

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| http::configure(cfg, body_limit))
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    let server = server
        .bind((config.bind_addr.as_str(), config.port))
        .with_context(|| format!("failed to bind {}:{}", config.bind_addr, config.port))?;

    tracing::info!(models_loaded, "pollboothd ready");
    server.run().await?;

    tracing::info!("pollboothd shutting down");
    Ok(())
}
