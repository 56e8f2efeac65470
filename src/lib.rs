pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers::{AppContext, AppState, SessionSettings};
pub use api::routes;

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use std::sync::Arc;
use tokio::net::TcpListener;

/// Serves the application for `store` on an already bound listener.
pub async fn serve<S: Store + 'static>(
    listener: TcpListener,
    store: S,
    config: &config::AppConfig,
) -> anyhow::Result<()> {
    let state = Arc::new(AppContext::new(store, SessionSettings::from(&config.session)));
    let app = routes::create_router::<S>(&config.server.static_dir).with_state(state);

    axum::serve(listener, app).await?;

    Ok(())
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = crate::config::AppConfig::load()?;

    let postgres_store =
        PostgresStore::new(&config.database_url(), config.max_connections()).await?;
    postgres_store.migrate().await?;

    let listener = TcpListener::bind(&config.server_address()).await?;
    serve(listener, postgres_store, &config).await
}
