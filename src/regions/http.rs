use super::directory::{
    DirectoryError, PageRequest, RegionDirectory, RegionFilter, SearchQuery,
};
use super::types::{Region, RegionLevel, RegionList, RegionPage};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Drops rows outside the requested subtree, shrinking the envelope's counts
/// by the same amount.
fn retain_page(mut result: RegionPage, page: PageRequest, keep: impl Fn(&Region) -> bool) -> RegionPage {
    let before = result.data.len();
    result.data.retain(|r| keep(r));
    let dropped = (before - result.data.len()) as u64;
    if dropped > 0 {
        tracing::warn!("Region service returned {} rows outside the requested subtree", dropped);
        result.total = result.total.saturating_sub(dropped);
        result.total_pages = Some(page.total_pages(result.total));
    }
    result
}

/// Client for the region lookup service (`/regions/...` endpoints).
pub struct RegionApiClient {
    client: Client,
    base_url: String,
}

impl RegionApiClient {
    pub fn new(config: &Config) -> Result<Self, DirectoryError> {
        Self::with_base_url(&config.region_api_base_url)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .user_agent("RegionWeather/1.0")
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn list_regencies(&self, province_code: &str) -> Result<RegionList, DirectoryError> {
        self.get_json(&format!("/regions/regencies/{}", province_code), &[])
            .await
    }

    pub async fn list_villages(
        &self,
        regency_code: &str,
        page: PageRequest,
    ) -> Result<RegionPage, DirectoryError> {
        self.get_json(
            &format!("/regions/villages/{}", regency_code),
            &[
                ("page", page.page().to_string()),
                ("limit", page.page_size().to_string()),
            ],
        )
        .await
    }

    pub async fn list_regions(
        &self,
        filter: &RegionFilter,
        page: PageRequest,
    ) -> Result<RegionPage, DirectoryError> {
        let mut params = filter.query_params();
        params.push(("page", page.page().to_string()));
        params.push(("limit", page.page_size().to_string()));
        self.get_json("/regions", &params).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, DirectoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServiceErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            tracing::error!("Region service {} returned {}: {}", path, status, message);
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RegionDirectory for RegionApiClient {
    async fn list_provinces(&self) -> Result<Vec<Region>, DirectoryError> {
        let list: RegionList = self.get_json("/regions/provinces", &[]).await?;
        Ok(list
            .data
            .into_iter()
            .filter(|r| r.level == RegionLevel::Province)
            .collect())
    }

    async fn list_children(
        &self,
        parent_code: &str,
        level: RegionLevel,
        page: PageRequest,
    ) -> Result<RegionPage, DirectoryError> {
        let filter = RegionFilter::children_of(parent_code, level)?;
        let parent_code = parent_code.trim();
        let keep = |r: &Region| r.level == level && r.is_descendant_of(parent_code);

        match (RegionLevel::from_code(parent_code)?, level) {
            (RegionLevel::Province, RegionLevel::Regency) => {
                // unpaginated endpoint; slice locally
                let all: Vec<Region> = self
                    .list_regencies(parent_code)
                    .await?
                    .data
                    .into_iter()
                    .filter(|r| keep(r))
                    .collect();
                let total = all.len() as u64;
                let data = all
                    .into_iter()
                    .skip(page.offset() as usize)
                    .take(page.page_size() as usize)
                    .collect();
                Ok(page.envelope(data, total))
            }
            (RegionLevel::Regency, RegionLevel::Village) => {
                let result = self.list_villages(parent_code, page).await?;
                Ok(retain_page(result, page, keep))
            }
            _ => {
                let result = self.list_regions(&filter, page).await?;
                Ok(retain_page(result, page, keep))
            }
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Region>, DirectoryError> {
        let text = query.normalized_text()?;
        let mut params = vec![("q", text.to_string())];
        if let Some(level) = query.level {
            params.push(("level", level.to_string()));
        }
        params.push(("limit", query.limit().to_string()));

        let list: RegionList = self.get_json("/regions/search", &params).await?;
        let mut regions: Vec<Region> = list
            .data
            .into_iter()
            .filter(|r| query.level.map_or(true, |level| r.level == level))
            .collect();
        regions.truncate(query.limit() as usize);
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn region_json(code: &str, name: &str) -> serde_json::Value {
        let region = Region::from_code(code, name).unwrap();
        serde_json::to_value(region).unwrap()
    }

    #[tokio::test]
    async fn test_list_provinces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/provinces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [region_json("31", "DKI Jakarta"), region_json("32", "Jawa Barat")],
                "total": 2
            })))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let provinces = client.list_provinces().await.unwrap();

        assert_eq!(provinces.len(), 2);
        assert_eq!(provinces[0].name, "DKI Jakarta");
    }

    #[tokio::test]
    async fn test_list_villages_paginated_and_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/villages/31.71"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    region_json("31.71.01.1001", "Gambir"),
                    region_json("32.01.01.1001", "Elsewhere")
                ],
                "total": 60,
                "page": 2,
                "pageSize": 50,
                "totalPages": 2
            })))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let page = client
            .list_children(
                "31.71",
                RegionLevel::Village,
                PageRequest::new(Some(2), Some(200)),
            )
            .await
            .unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].code, "31.71.01.1001");
        assert_eq!(page.total, 59);
        assert_eq!(page.total_pages, Some(2));
    }

    #[tokio::test]
    async fn test_clean_page_keeps_service_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions"))
            .and(query_param("level", "3"))
            .and(query_param("regencyCode", "31.71"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [region_json("31.71.01", "Gambir")],
                "total": 8,
                "page": 1,
                "pageSize": 1,
                "totalPages": 8
            })))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let page = client
            .list_children("31.71", RegionLevel::District, PageRequest::new(Some(1), Some(1)))
            .await
            .unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.total, 8);
        assert_eq!(page.total_pages, Some(8));
    }

    #[tokio::test]
    async fn test_list_regencies_sliced_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/regencies/31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    region_json("31.71", "Jakarta Pusat"),
                    region_json("31.72", "Jakarta Utara"),
                    region_json("31.73", "Jakarta Barat")
                ],
                "total": 3
            })))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let page = client
            .list_children("31", RegionLevel::Regency, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, Some(2));
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "Jakarta Barat");
    }

    #[tokio::test]
    async fn test_search_sends_query_and_level() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/search"))
            .and(query_param("q", "jaka"))
            .and(query_param("level", "2"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [region_json("31.71", "Jakarta Pusat")],
                "total": 1
            })))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let results = client
            .search(&SearchQuery::new(" jaka ", Some(RegionLevel::Regency), None))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Jakarta Pusat");
    }

    #[tokio::test]
    async fn test_search_without_matches_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [], "total": 0})),
            )
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let results = client
            .search(&SearchQuery::new("xyzxyz", None, None))
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_service_failure_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/provinces"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": "Failed to fetch provinces",
                "details": "connection reset"
            })))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let err = client.list_provinces().await.unwrap_err();

        match &err {
            DirectoryError::Status { status, message } => {
                assert_eq!(*status, 500);
                assert_eq!(message, "Failed to fetch provinces");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("Failed to fetch provinces"));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/regions/provinces"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = RegionApiClient::with_base_url(&server.uri()).unwrap();
        let err = client.list_provinces().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Decode(_)));
    }
}
