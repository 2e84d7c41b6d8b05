use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_weather::config::Config;
use region_weather::database::Database;
use region_weather::migration::migrate_file;
use region_weather::regions::RegionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "region_weather=info,migrate_regions=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let database = Database::connect(&config.database_url).await?;
    database.init_tables().await?;
    let store = RegionStore::new(database);

    let report = migrate_file(
        &config.regions_csv_path,
        &store,
        config.migration_batch_size,
    )
    .await?;

    tracing::info!(
        "Read {} rows: {} inserted, {} already present, {} skipped, {} failed batches",
        report.rows_read,
        report.inserted,
        report.duplicates,
        report.skipped,
        report.failed_batches
    );

    for (level, count) in store.count_by_level().await? {
        tracing::info!("{}: {}", level.label(), count);
    }

    Ok(())
}
