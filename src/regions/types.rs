use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const CODE_SEPARATOR: char = '.';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionCodeError {
    #[error("Region code is empty")]
    Empty,
    #[error("Region code '{0}' contains an empty segment")]
    EmptySegment(String),
    #[error("Region code '{0}' has more than 4 segments")]
    TooDeep(String),
    #[error("Invalid region level: {0}")]
    InvalidLevel(i64),
}

/// Administrative level, equal to the number of segments in a region code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RegionLevel {
    Province = 1,
    Regency = 2,
    District = 3,
    Village = 4,
}

impl RegionLevel {
    pub fn from_code(code: &str) -> Result<Self, RegionCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RegionCodeError::Empty);
        }

        let segments: Vec<&str> = code.split(CODE_SEPARATOR).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(RegionCodeError::EmptySegment(code.to_string()));
        }

        match segments.len() {
            1 => Ok(RegionLevel::Province),
            2 => Ok(RegionLevel::Regency),
            3 => Ok(RegionLevel::District),
            4 => Ok(RegionLevel::Village),
            _ => Err(RegionCodeError::TooDeep(code.to_string())),
        }
    }

    pub fn depth(self) -> usize {
        self as usize
    }

    pub fn parent(self) -> Option<RegionLevel> {
        match self {
            RegionLevel::Province => None,
            RegionLevel::Regency => Some(RegionLevel::Province),
            RegionLevel::District => Some(RegionLevel::Regency),
            RegionLevel::Village => Some(RegionLevel::District),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RegionLevel::Province => "Provinces",
            RegionLevel::Regency => "Regencies/Cities",
            RegionLevel::District => "Districts",
            RegionLevel::Village => "Villages",
        }
    }
}

impl TryFrom<i64> for RegionLevel {
    type Error = RegionCodeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RegionLevel::Province),
            2 => Ok(RegionLevel::Regency),
            3 => Ok(RegionLevel::District),
            4 => Ok(RegionLevel::Village),
            other => Err(RegionCodeError::InvalidLevel(other)),
        }
    }
}

impl TryFrom<u8> for RegionLevel {
    type Error = RegionCodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        RegionLevel::try_from(i64::from(value))
    }
}

impl From<RegionLevel> for u8 {
    fn from(level: RegionLevel) -> Self {
        level as u8
    }
}

impl From<RegionLevel> for i64 {
    fn from(level: RegionLevel) -> Self {
        level as i64
    }
}

impl fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Returns the first `depth` segments of `code`, or `None` when the code is shallower.
pub fn truncate_code(code: &str, depth: usize) -> Option<&str> {
    if depth == 0 {
        return None;
    }

    let mut seen = 0;
    for (idx, ch) in code.char_indices() {
        if ch == CODE_SEPARATOR {
            seen += 1;
            if seen == depth {
                return Some(&code[..idx]);
            }
        }
    }

    if seen + 1 == depth {
        Some(code)
    } else {
        None
    }
}

fn default_active() -> bool {
    true
}

/// One node of the province > regency > district > village hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub code: String,
    pub name: String,
    #[sqlx(try_from = "i64")]
    pub level: RegionLevel,
    #[serde(default)]
    pub province_code: Option<String>,
    #[serde(default)]
    pub province_name: Option<String>,
    #[serde(default)]
    pub regency_code: Option<String>,
    #[serde(default)]
    pub regency_name: Option<String>,
    #[serde(default)]
    pub district_code: Option<String>,
    #[serde(default)]
    pub district_name: Option<String>,
    #[serde(default)]
    pub village_code: Option<String>,
    #[serde(default)]
    pub village_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub has_weather_data: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl Region {
    /// Builds a region record from a raw `code,name` pair.
    ///
    /// Ancestor codes are derived from the code prefixes. Only the region's
    /// own level receives a name; ancestor names are left unset because a
    /// single row does not carry them.
    pub fn from_code(code: &str, name: &str) -> Result<Self, RegionCodeError> {
        let code = code.trim();
        let name = name.trim();
        let level = RegionLevel::from_code(code)?;

        let prefix = |depth: usize| truncate_code(code, depth).map(str::to_string);
        let own_name = |at: RegionLevel| (at == level).then(|| name.to_string());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            level,
            province_code: prefix(1),
            province_name: own_name(RegionLevel::Province),
            regency_code: prefix(2),
            regency_name: own_name(RegionLevel::Regency),
            district_code: prefix(3),
            district_name: own_name(RegionLevel::District),
            village_code: prefix(4),
            village_name: own_name(RegionLevel::Village),
            latitude: None,
            longitude: None,
            timezone: None,
            has_weather_data: level == RegionLevel::Village,
            is_active: true,
        })
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn parent_code(&self) -> Option<&str> {
        self.level
            .parent()
            .and_then(|parent| truncate_code(&self.code, parent.depth()))
    }

    /// True when this region sits somewhere below `ancestor_code`.
    pub fn is_descendant_of(&self, ancestor_code: &str) -> bool {
        self.code.len() > ancestor_code.len()
            && self.code.starts_with(ancestor_code)
            && self.code[ancestor_code.len()..].starts_with(CODE_SEPARATOR)
    }

    /// Hierarchical label, e.g. `Gambir, Kec. Gambir, Jakarta Pusat, DKI Jakarta`.
    pub fn display_name(&self) -> String {
        let province = non_empty(&self.province_name);
        let regency = non_empty(&self.regency_name);
        let district = non_empty(&self.district_name);

        let parts: Vec<String> = match self.level {
            RegionLevel::Province => vec![],
            RegionLevel::Regency => province.into_iter().map(str::to_string).collect(),
            RegionLevel::District => match (regency, province) {
                (Some(r), Some(p)) => vec![r.to_string(), p.to_string()],
                (None, Some(p)) => vec![p.to_string()],
                _ => vec![],
            },
            RegionLevel::Village => match (district, regency, province) {
                (Some(d), Some(r), Some(p)) => {
                    vec![format!("Kec. {}", d), r.to_string(), p.to_string()]
                }
                (_, Some(r), Some(p)) => vec![r.to_string(), p.to_string()],
                (_, _, Some(p)) => vec![p.to_string()],
                _ => vec![],
            },
        };

        std::iter::once(self.name.clone())
            .chain(parts)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Pagination envelope returned by the region lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPage {
    pub data: Vec<Region>,
    pub total: u64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Unpaginated envelope (`{ data, total }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionList {
    pub data: Vec<Region>,
    pub total: u64,
}

impl From<Vec<Region>> for RegionList {
    fn from(data: Vec<Region>) -> Self {
        let total = data.len() as u64;
        Self { data, total }
    }
}
