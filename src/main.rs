use gesture_lab::config::AppConfig;
use gesture_lab::seed;
use gesture_lab::store::PostgresStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    log::info!("Gesture lab: motor-learning experiment server");

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    log::info!("Connecting to PostgreSQL...");
    let store = PostgresStore::new(&config.database_url(), config.max_connections()).await?;
    store.migrate().await?;

    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        seed::load_seed_data(&store).await?;
    }

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Server running on http://{}", bind_address);

    gesture_lab::serve(listener, store, &config).await
}
