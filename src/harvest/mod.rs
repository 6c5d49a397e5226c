//! Harvest pipeline
//!
//! This module handles:
//! - Resilient fetching under retry, timeout, rate-limit, and cache policy
//! - Pagination planning (page count or date range)
//! - Detail fan-out for summary-only listings
//! - Run orchestration, failure policy, and cancellation

mod coordinator;
mod detail;
mod fetcher;
mod pagination;
mod rate_limit;
mod transport;

pub use coordinator::{run_harvest, Coordinator};
pub use detail::DetailExpander;
pub use fetcher::{FetchCounts, FetchPolicy, Fetcher};
pub use pagination::{
    read_page_count, DateRequests, PageRequests, PaginationPlan, PaginationStrategy, PlanRequests,
    SearchTemplate,
};
pub use rate_limit::RateLimiter;
pub use transport::{build_http_client, HttpTransport, RawResponse, Transport, TransportError};
