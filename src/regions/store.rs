use super::directory::{
    sort_search_results, DirectoryError, PageRequest, RegionDirectory, RegionFilter, SearchQuery,
};
use super::types::{Region, RegionLevel, RegionPage};
use crate::database::{Database, DatabaseError};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

const REGION_COLUMNS: &str = "id, code, name, level, \
    province_code, province_name, regency_code, regency_name, \
    district_code, district_name, village_code, village_name, \
    latitude, longitude, timezone, has_weather_data, is_active";

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER`.
const SQLITE_MAX_BINDS: usize = 32766;
/// Bound values per inserted row: the region columns plus two timestamps.
const INSERT_BINDS_PER_ROW: usize = 19;
const INSERT_CHUNK_ROWS: usize = SQLITE_MAX_BINDS / INSERT_BINDS_PER_ROW;

/// Escapes LIKE wildcards and wraps the text for a substring match.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &RegionFilter) {
    qb.push(" WHERE is_active = 1");
    if let Some(level) = filter.level {
        qb.push(" AND level = ").push_bind(i64::from(level));
    }
    if let Some(code) = &filter.province_code {
        qb.push(" AND province_code = ").push_bind(code.clone());
    }
    if let Some(code) = &filter.regency_code {
        qb.push(" AND regency_code = ").push_bind(code.clone());
    }
    if let Some(code) = &filter.district_code {
        qb.push(" AND district_code = ").push_bind(code.clone());
    }
    if let Some(search) = filter.search.as_ref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND LOWER(name) LIKE ")
            .push_bind(like_pattern(search))
            .push(" ESCAPE '\\'");
    }
}

/// Region directory backed by the relational `regions` table.
#[derive(Clone)]
pub struct RegionStore {
    database: Database,
}

impl RegionStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Inserts a batch, silently skipping codes that already exist.
    /// Returns the number of rows actually inserted.
    ///
    /// Large batches are split to stay under the bind limit; the batch as a
    /// whole commits or rolls back.
    pub async fn insert_batch(&self, regions: &[Region]) -> Result<u64, DatabaseError> {
        if regions.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now();
        let mut tx = self.database.pool().begin().await?;
        let mut inserted = 0;

        for chunk in regions.chunks(INSERT_CHUNK_ROWS) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO regions ({}, created_at, updated_at) ",
                REGION_COLUMNS
            ));
            qb.push_values(chunk, |mut row, region| {
                row.push_bind(region.id.clone())
                    .push_bind(region.code.clone())
                    .push_bind(region.name.clone())
                    .push_bind(i64::from(region.level))
                    .push_bind(region.province_code.clone())
                    .push_bind(region.province_name.clone())
                    .push_bind(region.regency_code.clone())
                    .push_bind(region.regency_name.clone())
                    .push_bind(region.district_code.clone())
                    .push_bind(region.district_name.clone())
                    .push_bind(region.village_code.clone())
                    .push_bind(region.village_name.clone())
                    .push_bind(region.latitude)
                    .push_bind(region.longitude)
                    .push_bind(region.timezone.clone())
                    .push_bind(region.has_weather_data)
                    .push_bind(region.is_active)
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.push(" ON CONFLICT(code) DO NOTHING");

            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Region>, DirectoryError> {
        let region = sqlx::query_as::<_, Region>(&format!(
            "SELECT {} FROM regions WHERE code = ? AND is_active = 1",
            REGION_COLUMNS
        ))
        .bind(code.trim())
        .fetch_optional(self.database.pool())
        .await?;
        Ok(region)
    }

    pub async fn list_regions(
        &self,
        filter: &RegionFilter,
        page: PageRequest,
    ) -> Result<RegionPage, DirectoryError> {
        let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM regions");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(self.database.pool())
            .await?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM regions", REGION_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY name ASC, code ASC LIMIT ")
            .push_bind(i64::from(page.page_size()))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let data = qb
            .build_query_as::<Region>()
            .fetch_all(self.database.pool())
            .await?;

        Ok(page.envelope(data, total.max(0) as u64))
    }

    /// Every matching row, unpaginated.
    pub async fn list_all(&self, filter: &RegionFilter) -> Result<Vec<Region>, DirectoryError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM regions", REGION_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY name ASC, code ASC");

        let regions = qb
            .build_query_as::<Region>()
            .fetch_all(self.database.pool())
            .await?;
        Ok(regions)
    }

    /// Active regions that carry weather data.
    pub async fn list_popular(&self, limit: u32) -> Result<Vec<Region>, DirectoryError> {
        let regions = sqlx::query_as::<_, Region>(&format!(
            "SELECT {} FROM regions WHERE has_weather_data = 1 AND is_active = 1 \
             ORDER BY name ASC LIMIT ?",
            REGION_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(self.database.pool())
        .await?;
        Ok(regions)
    }

    pub async fn count_by_level(&self) -> Result<Vec<(RegionLevel, u64)>, DatabaseError> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT level, COUNT(*) FROM regions GROUP BY level ORDER BY level")
                .fetch_all(self.database.pool())
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(level, count)| {
                RegionLevel::try_from(level)
                    .ok()
                    .map(|level| (level, count.max(0) as u64))
            })
            .collect())
    }
}

#[async_trait]
impl RegionDirectory for RegionStore {
    async fn list_provinces(&self) -> Result<Vec<Region>, DirectoryError> {
        let provinces = sqlx::query_as::<_, Region>(&format!(
            "SELECT {} FROM regions WHERE level = 1 AND is_active = 1 ORDER BY name ASC",
            REGION_COLUMNS
        ))
        .fetch_all(self.database.pool())
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch provinces: {:?}", e);
            DirectoryError::Database(e)
        })?;
        Ok(provinces)
    }

    async fn list_children(
        &self,
        parent_code: &str,
        level: RegionLevel,
        page: PageRequest,
    ) -> Result<RegionPage, DirectoryError> {
        let filter = RegionFilter::children_of(parent_code, level)?;
        self.list_regions(&filter, page).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Region>, DirectoryError> {
        let text = query.normalized_text()?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM regions WHERE is_active = 1 AND LOWER(name) LIKE ",
            REGION_COLUMNS
        ));
        qb.push_bind(like_pattern(text)).push(" ESCAPE '\\'");
        if let Some(level) = query.level {
            qb.push(" AND level = ").push_bind(i64::from(level));
        }
        qb.push(" ORDER BY has_weather_data DESC, level DESC, name ASC LIMIT ")
            .push_bind(i64::from(query.limit()));

        let mut regions = qb
            .build_query_as::<Region>()
            .fetch_all(self.database.pool())
            .await
            .map_err(|e| {
                tracing::error!("Failed to search regions for '{}': {:?}", text, e);
                DirectoryError::Database(e)
            })?;
        sort_search_results(&mut regions);
        Ok(regions)
    }
}
