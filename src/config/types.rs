use chrono::NaiveDate;
use serde::Deserialize;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub output: OutputConfig,
}

/// Which upstream listing to walk, and how to paginate it
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum SourceConfig {
    /// OCDS search listing walked by page count
    #[serde(rename = "ocds-search")]
    OcdsSearch(OcdsSearchConfig),

    /// Notice search walked one publication day at a time, with a detail
    /// request per notice
    #[serde(rename = "notice-search")]
    NoticeSearch(NoticeSearchConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OcdsSearch(_) => "ocds-search",
            Self::NoticeSearch(_) => "notice-search",
        }
    }
}

/// Page-count deployment settings
#[derive(Debug, Clone, Deserialize)]
pub struct OcdsSearchConfig {
    /// Discovery URL; its response carries the page count
    #[serde(rename = "seed-url", default = "default_seed_url")]
    pub seed_url: String,

    /// Field of the discovery payload holding the number of pages
    #[serde(rename = "page-count-field", default = "default_page_count_field")]
    pub page_count_field: String,

    /// Query parameter carrying the 1-indexed page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,
}

/// Date-range deployment settings
#[derive(Debug, Clone, Deserialize)]
pub struct NoticeSearchConfig {
    /// Search endpoint receiving one POST per publication day
    #[serde(rename = "search-url", default = "default_search_url")]
    pub search_url: String,

    /// Detail endpoint prefix; the notice id is appended
    #[serde(rename = "detail-url", default = "default_detail_url")]
    pub detail_url: String,

    /// Public notice page prefix used for the `noticeURL` column
    #[serde(rename = "notice-url", default = "default_notice_url")]
    pub notice_url: String,

    /// First publication day to request
    #[serde(rename = "start-date", default = "default_start_date")]
    pub start_date: NaiveDate,

    /// Maximum number of notices per search response
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Notice status filter sent with each search
    #[serde(default = "default_status")]
    pub status: String,
}

/// What happens to the run when one request exhausts its retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop issuing requests, drain in-flight ones, and fail the run
    Abort,

    /// Log the failure and keep going
    Skip,
}

/// Network behavior of the fetcher
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Wall-clock bound on each attempt (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Requests allowed per rate window
    #[serde(rename = "max-requests")]
    pub max_requests: u32,

    /// Length of the rate window (milliseconds)
    #[serde(rename = "per-ms")]
    pub per_ms: u64,

    /// Requests allowed in flight at once
    #[serde(rename = "max-in-flight")]
    pub max_in_flight: usize,

    /// Statuses the provider uses to signal throttling; retried
    #[serde(rename = "throttle-statuses")]
    pub throttle_statuses: Vec<u16>,

    /// Top-level key that must not be an empty array; empty disables the check
    #[serde(rename = "empty-collection")]
    pub empty_collection: String,

    #[serde(rename = "on-failure")]
    pub on_failure: FailurePolicy,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay_ms: 5_000,
            timeout_ms: 30_000,
            max_requests: 5,
            per_ms: 1_000,
            max_in_flight: 5,
            throttle_statuses: vec![429],
            empty_collection: "awards".to_string(),
            on_failure: FailurePolicy::Abort,
            user_agent: format!("award-harvester/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Local response cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: ".scrape-cache".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the CSV export; truncated at the start of each run
    pub path: String,
}

fn default_seed_url() -> String {
    "https://www.contractsfinder.service.gov.uk/Published/Notices/OCDS/Search?stages=award"
        .to_string()
}

fn default_page_count_field() -> String {
    "maxPage".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_search_url() -> String {
    "https://www.contractsfinder.service.gov.uk/api/rest/2/search_notices/json".to_string()
}

fn default_detail_url() -> String {
    "https://www.contractsfinder.service.gov.uk/api/rest/2/get_published_notice/json/".to_string()
}

fn default_notice_url() -> String {
    "https://www.contractsfinder.service.gov.uk/notice/".to_string()
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_page_size() -> u32 {
    1000
}

fn default_status() -> String {
    "Awarded".to_string()
}
