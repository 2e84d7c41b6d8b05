use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_weather::config::Config;
use region_weather::database::Database;
use region_weather::forecast::BmkgClient;
use region_weather::regions::RegionStore;
use region_weather::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "region_weather=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let database = Database::connect(&config.database_url).await?;
    database.init_tables().await?;
    let store = Arc::new(RegionStore::new(database));

    let weather = Arc::new(BmkgClient::new(&config)?);
    tracing::info!(
        "Weather provider {} (cache ttl {}s, timezone {})",
        config.bmkg_base_url,
        config.weather_cache_ttl_secs,
        weather.timezone()
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        store,
        weather,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
