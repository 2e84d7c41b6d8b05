use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database operation failed: {0}")]
    Query(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database with the schema applied.
    ///
    /// Pinned to a single connection that never idles out, since every
    /// SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let database = Self::new(pool);
        database.init_tables().await?;
        Ok(database)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS regions (
                id TEXT NOT NULL UNIQUE,
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 4),
                province_code TEXT,
                province_name TEXT,
                regency_code TEXT,
                regency_name TEXT,
                district_code TEXT,
                district_name TEXT,
                village_code TEXT,
                village_name TEXT,
                latitude REAL,
                longitude REAL,
                timezone TEXT,
                has_weather_data INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_regions_level ON regions(level)",
            "CREATE INDEX IF NOT EXISTS idx_regions_province_code ON regions(province_code)",
            "CREATE INDEX IF NOT EXISTS idx_regions_regency_code ON regions(regency_code)",
            "CREATE INDEX IF NOT EXISTS idx_regions_district_code ON regions(district_code)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
