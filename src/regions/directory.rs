use super::types::{Region, RegionCodeError, RegionLevel, RegionPage};
use async_trait::async_trait;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
pub const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Region service request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Region service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected region service response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Region database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid region code: {0}")]
    InvalidCode(#[from] RegionCodeError),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// 1-based page request. Sizes above `MAX_PAGE_SIZE` are capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let page_size = match page_size {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(size) => size.min(MAX_PAGE_SIZE),
        };
        Self { page, page_size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn total_pages(&self, total: u64) -> u32 {
        let size = u64::from(self.page_size);
        ((total + size - 1) / size) as u32
    }

    /// Wraps one page of rows in the service envelope.
    pub fn envelope(&self, data: Vec<Region>, total: u64) -> RegionPage {
        RegionPage {
            data,
            total,
            page: Some(self.page),
            page_size: Some(self.page_size),
            total_pages: Some(self.total_pages(total)),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub level: Option<RegionLevel>,
    limit: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, level: Option<RegionLevel>, limit: Option<u32>) -> Self {
        let limit = match limit {
            Some(0) | None => DEFAULT_SEARCH_LIMIT,
            Some(limit) => limit.min(MAX_SEARCH_LIMIT),
        };
        Self {
            text: text.into(),
            level,
            limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Trimmed query text; blank queries are rejected.
    pub fn normalized_text(&self) -> Result<&str, DirectoryError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(DirectoryError::InvalidQuery(
                "search text must not be empty".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Filter accepted by the generic `/regions` listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter {
    pub level: Option<RegionLevel>,
    pub province_code: Option<String>,
    pub regency_code: Option<String>,
    pub district_code: Option<String>,
    pub search: Option<String>,
}

impl RegionFilter {
    /// Filter selecting regions at `level` below `parent_code`.
    pub fn children_of(parent_code: &str, level: RegionLevel) -> Result<Self, DirectoryError> {
        let parent_code = parent_code.trim();
        let parent_level = RegionLevel::from_code(parent_code)?;
        if level <= parent_level {
            return Err(DirectoryError::InvalidQuery(format!(
                "level {} is not below parent '{}'",
                level, parent_code
            )));
        }

        let mut filter = RegionFilter {
            level: Some(level),
            ..Default::default()
        };
        let code = Some(parent_code.to_string());
        match parent_level {
            RegionLevel::Province => filter.province_code = code,
            RegionLevel::Regency => filter.regency_code = code,
            // checked above: nothing sits below a village
            RegionLevel::District | RegionLevel::Village => filter.district_code = code,
        }
        Ok(filter)
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(level) = self.level {
            params.push(("level", level.to_string()));
        }
        if let Some(code) = &self.province_code {
            params.push(("provinceCode", code.clone()));
        }
        if let Some(code) = &self.regency_code {
            params.push(("regencyCode", code.clone()));
        }
        if let Some(code) = &self.district_code {
            params.push(("districtCode", code.clone()));
        }
        if let Some(search) = self.search.as_ref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.trim().to_string()));
        }
        params
    }
}

/// Read access to the region hierarchy.
///
/// An empty result is never an error. Failures carry a message suitable for
/// showing next to a retry action.
#[async_trait]
pub trait RegionDirectory: Send + Sync {
    async fn list_provinces(&self) -> Result<Vec<Region>, DirectoryError>;

    async fn list_children(
        &self,
        parent_code: &str,
        level: RegionLevel,
        page: PageRequest,
    ) -> Result<RegionPage, DirectoryError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Region>, DirectoryError>;
}

/// Search ordering: regions with weather first, then deeper levels, then by name.
pub fn sort_search_results(regions: &mut [Region]) {
    regions.sort_by(|a, b| {
        b.has_weather_data
            .cmp(&a.has_weather_data)
            .then(b.level.cmp(&a.level))
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_caps_size() {
        let page = PageRequest::new(Some(0), Some(500));
        assert_eq!(page.page(), 1);
        assert_eq!(page.page_size(), MAX_PAGE_SIZE);

        let page = PageRequest::new(Some(3), Some(0));
        assert_eq!(page.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(page.offset(), 40);
        assert_eq!(page.total_pages(41), 3);
        assert_eq!(page.total_pages(0), 0);
    }

    #[test]
    fn test_search_limit_defaults_and_caps() {
        assert_eq!(SearchQuery::new("a", None, None).limit(), 20);
        assert_eq!(SearchQuery::new("a", None, Some(7)).limit(), 7);
        assert_eq!(SearchQuery::new("a", None, Some(999)).limit(), 50);
    }

    #[test]
    fn test_blank_query_rejected() {
        let query = SearchQuery::new("   ", None, None);
        assert!(matches!(
            query.normalized_text(),
            Err(DirectoryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_children_filter() {
        let filter = RegionFilter::children_of("31.71", RegionLevel::Village).unwrap();
        assert_eq!(filter.regency_code.as_deref(), Some("31.71"));
        assert_eq!(filter.level, Some(RegionLevel::Village));
        assert_eq!(
            filter.query_params(),
            vec![("level", "4".to_string()), ("regencyCode", "31.71".to_string())]
        );

        assert!(matches!(
            RegionFilter::children_of("31.71", RegionLevel::Province),
            Err(DirectoryError::InvalidQuery(_))
        ));
        assert!(matches!(
            RegionFilter::children_of("", RegionLevel::Regency),
            Err(DirectoryError::InvalidCode(_))
        ));
    }

    #[test]
    fn test_sort_search_results() {
        let mut regions = vec![
            Region::from_code("31", "Jakarta").unwrap(),
            Region::from_code("31.71.01.1001", "Jakarta Village").unwrap(),
            Region::from_code("31.71", "Jakarta Pusat").unwrap(),
            Region::from_code("31.72", "Jakarta Barat").unwrap(),
        ];
        sort_search_results(&mut regions);
        let names: Vec<_> = regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Jakarta Village", "Jakarta Barat", "Jakarta Pusat", "Jakarta"]
        );
    }
}
