pub mod directory;
pub mod http;
pub mod store;
pub mod types;

pub use directory::{DirectoryError, PageRequest, RegionDirectory, RegionFilter, SearchQuery};
pub use http::RegionApiClient;
pub use store::RegionStore;
pub use types::{Region, RegionCodeError, RegionLevel, RegionList, RegionPage};
