//! Folio Server - WebSocket host for the portfolio demo worker

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod settings;
mod state;

use settings::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_server=debug,folio_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Folio worker server");

    let config = AppConfig::load()?;
    info!("Intent model source: {:?}", folio_core::IntentSource::from_config(&config.worker));

    let addr = config.server.bind_addr();
    let state = AppState::new(config)?;
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
