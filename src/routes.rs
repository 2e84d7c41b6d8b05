use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    config::Config,
    forecast::{
        batch::{batch_fetch, BatchSummary},
        bmkg::BmkgClient,
        types::{CacheStats, CurrentWeather, Sourced, WeatherResponse},
    },
    regions::{
        directory::MAX_SEARCH_LIMIT,
        DirectoryError, PageRequest, Region, RegionDirectory, RegionFilter, RegionLevel,
        RegionList, RegionPage, RegionStore, SearchQuery,
    },
};

pub const MAX_BATCH_CODES: usize = 20;
const DEFAULT_POPULAR_LIMIT: u32 = 10;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RegionStore>,
    pub weather: Arc<BmkgClient>,
}

// Request/Response types
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionsQuery {
    pub level: Option<u8>,
    pub province_code: Option<String>,
    pub regency_code: Option<String>,
    pub district_code: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub level: Option<u8>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub codes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub regions: Vec<Region>,
    /// Keyed by region id.
    pub results: HashMap<String, Sourced<CurrentWeather>>,
    pub summary: BatchSummary,
    pub unknown_codes: Vec<String>,
}

/// Search hit: the region plus its hierarchical label.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub region: Region,
    pub display_name: String,
}

impl From<Region> for SearchHit {
    fn from(region: Region) -> Self {
        let display_name = region.display_name();
        Self {
            region,
            display_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub data: Vec<SearchHit>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

fn parse_level(level: Option<u8>) -> Result<Option<RegionLevel>, StatusCode> {
    level
        .map(RegionLevel::try_from)
        .transpose()
        .map_err(|e| {
            tracing::warn!("Rejected level parameter: {}", e);
            StatusCode::BAD_REQUEST
        })
}

fn directory_status(error: DirectoryError) -> StatusCode {
    match error {
        DirectoryError::InvalidQuery(_) | DirectoryError::InvalidCode(_) => {
            tracing::warn!("Rejected region request: {}", error);
            StatusCode::BAD_REQUEST
        }
        other => {
            tracing::error!("Region lookup failed: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn find_region(state: &AppState, code: &str) -> Result<Region, StatusCode> {
    state
        .store
        .find_by_code(code)
        .await
        .map_err(directory_status)?
        .ok_or(StatusCode::NOT_FOUND)
}

// Route handlers
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn list_regions(
    State(state): State<AppState>,
    Query(params): Query<RegionsQuery>,
) -> Result<Json<RegionPage>, StatusCode> {
    let filter = RegionFilter {
        level: parse_level(params.level)?,
        province_code: params.province_code,
        regency_code: params.regency_code,
        district_code: params.district_code,
        search: params.search,
    };
    let page = PageRequest::new(params.page, params.limit);

    let result = state
        .store
        .list_regions(&filter, page)
        .await
        .map_err(directory_status)?;
    Ok(Json(result))
}

pub async fn list_provinces(
    State(state): State<AppState>,
) -> Result<Json<RegionList>, StatusCode> {
    let provinces = state
        .store
        .list_provinces()
        .await
        .map_err(directory_status)?;
    Ok(Json(provinces.into()))
}

pub async fn list_regencies(
    State(state): State<AppState>,
    Path(province_code): Path<String>,
) -> Result<Json<RegionList>, StatusCode> {
    let filter = RegionFilter::children_of(&province_code, RegionLevel::Regency)
        .map_err(directory_status)?;
    let regencies = state
        .store
        .list_all(&filter)
        .await
        .map_err(directory_status)?;
    Ok(Json(regencies.into()))
}

pub async fn list_villages(
    State(state): State<AppState>,
    Path(regency_code): Path<String>,
    Query(params): Query<PageQuery>,
) -> Result<Json<RegionPage>, StatusCode> {
    let page = PageRequest::new(params.page, params.limit);
    let villages = state
        .store
        .list_children(&regency_code, RegionLevel::Village, page)
        .await
        .map_err(directory_status)?;
    Ok(Json(villages))
}

pub async fn search_regions(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, StatusCode> {
    let text = params.q.unwrap_or_default();
    let query = SearchQuery::new(text, parse_level(params.level)?, params.limit);
    let results = state
        .store
        .search(&query)
        .await
        .map_err(directory_status)?;
    let data: Vec<SearchHit> = results.into_iter().map(SearchHit::from).collect();
    Ok(Json(SearchResponse {
        total: data.len() as u64,
        data,
    }))
}

pub async fn popular_regions(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<RegionList>, StatusCode> {
    let limit = match params.limit {
        Some(0) | None => DEFAULT_POPULAR_LIMIT,
        Some(limit) => limit.min(MAX_SEARCH_LIMIT),
    };
    let regions = state
        .store
        .list_popular(limit)
        .await
        .map_err(directory_status)?;
    Ok(Json(regions.into()))
}

pub async fn get_region(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Region>, StatusCode> {
    Ok(Json(find_region(&state, &code).await?))
}

pub async fn current_weather(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<WeatherResponse>, StatusCode> {
    let region = find_region(&state, &code).await?;
    let current = state.weather.current_or_fallback(&region).await;
    Ok(Json(WeatherResponse {
        region,
        current: Some(current),
        forecast: Vec::new(),
    }))
}

pub async fn weather_forecast(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<WeatherResponse>, StatusCode> {
    let region = find_region(&state, &code).await?;
    Ok(Json(state.weather.weather_for_region(&region).await))
}

pub async fn batch_weather(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, StatusCode> {
    if request.codes.is_empty() || request.codes.len() > MAX_BATCH_CODES {
        tracing::warn!(
            "Rejected batch of {} codes (limit {})",
            request.codes.len(),
            MAX_BATCH_CODES
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut regions = Vec::with_capacity(request.codes.len());
    let mut unknown_codes = Vec::new();
    for code in &request.codes {
        match state.store.find_by_code(code).await.map_err(directory_status)? {
            Some(region) if !regions.iter().any(|r: &Region| r.code == region.code) => {
                regions.push(region)
            }
            Some(_) => {}
            None => unknown_codes.push(code.clone()),
        }
    }

    let results = batch_fetch(&state.weather, &regions, state.config.batch_delay()).await;
    let summary = BatchSummary::from_results(&results);

    Ok(Json(BatchResponse {
        regions,
        results,
        summary,
        unknown_codes,
    }))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.weather.cache_stats().await)
}

pub async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.weather.clear_cache();
    StatusCode::NO_CONTENT
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/regions", get(list_regions))
        .route("/regions/provinces", get(list_provinces))
        .route("/regions/regencies/:code", get(list_regencies))
        .route("/regions/villages/:code", get(list_villages))
        .route("/regions/search", get(search_regions))
        .route("/regions/popular", get(popular_regions))
        .route("/regions/:code", get(get_region))
        .route("/weather/current/:code", get(current_weather))
        .route("/weather/forecast/:code", get(weather_forecast))
        .route("/weather/batch", post(batch_weather))
        .route("/weather/cache", get(cache_stats).delete(clear_cache));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}
