//! Pagination planning
//!
//! A plan is fixed before any follow-up request is issued. Both strategies
//! produce lazy, finite, restartable request sequences in a deterministic
//! order.

use crate::config::SourceConfig;
use crate::harvest::fetcher::Fetcher;
use crate::model::{Passthrough, Request};
use crate::{HarvestError, Result};
use chrono::NaiveDate;
use serde_json::{json, Value};
use url::Url;

/// Reads a page count from a discovery payload
///
/// Accepts a non-negative integer or a string holding one.
pub fn read_page_count(payload: &Value, field: &str) -> Option<u32> {
    match payload.get(field)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Follow-up requests of a page-count plan: pages `1..=count`
#[derive(Debug, Clone)]
pub struct PageRequests {
    seed: Request,
    param: String,
    next: u64,
    count: u32,
}

impl PageRequests {
    pub fn new(seed: Request, param: impl Into<String>, count: u32) -> Self {
        Self {
            seed,
            param: param.into(),
            next: 1,
            count,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Iterator for PageRequests {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        let page = u32::try_from(self.next)
            .ok()
            .filter(|page| *page <= self.count)?;
        self.next += 1;

        Some(
            self.seed
                .with_query_param(&self.param, &page.to_string())
                .with_passthrough(Passthrough::Page(page)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (u64::from(self.count) + 1).saturating_sub(self.next);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Builds the single-day search request of a date-range plan
#[derive(Debug, Clone)]
pub struct SearchTemplate {
    pub url: Url,
    pub status: String,
    pub page_size: u32,
}

impl SearchTemplate {
    pub fn request_for(&self, date: NaiveDate) -> Request {
        let day = date.format("%Y-%m-%d").to_string();
        let body = json!({
            "searchCriteria": {
                "statuses": self.status,
                "publishedFrom": day,
                "publishedTo": day,
            },
            "size": self.page_size,
        });

        Request::post_json(self.url.clone(), body).with_passthrough(Passthrough::Date(date))
    }
}

/// Follow-up requests of a date-range plan: one per day in `[start, stop)`
#[derive(Debug, Clone)]
pub struct DateRequests {
    search: SearchTemplate,
    next: NaiveDate,
    stop: NaiveDate,
}

impl DateRequests {
    pub fn new(search: SearchTemplate, start: NaiveDate, stop: NaiveDate) -> Self {
        Self {
            search,
            next: start,
            stop,
        }
    }
}

impl Iterator for DateRequests {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        if self.next >= self.stop {
            return None;
        }
        let date = self.next;
        // The last representable date ends the walk
        self.next = date.succ_opt().unwrap_or(self.stop);

        Some(self.search.request_for(date))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.stop - self.next).num_days().max(0) as usize;
        (remaining, Some(remaining))
    }
}

/// A fully determined pagination plan
#[derive(Debug, Clone)]
pub enum PaginationPlan {
    Pages(PageRequests),
    Dates(DateRequests),
}

impl PaginationPlan {
    /// Number of follow-up requests
    pub fn len(&self) -> usize {
        self.requests().size_hint().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh iterator over the plan's requests
    pub fn requests(&self) -> PlanRequests {
        match self {
            Self::Pages(pages) => PlanRequests::Pages(pages.clone()),
            Self::Dates(dates) => PlanRequests::Dates(dates.clone()),
        }
    }
}

/// Iterator over a [`PaginationPlan`]
#[derive(Debug, Clone)]
pub enum PlanRequests {
    Pages(PageRequests),
    Dates(DateRequests),
}

impl Iterator for PlanRequests {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        match self {
            Self::Pages(pages) => pages.next(),
            Self::Dates(dates) => dates.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Pages(pages) => pages.size_hint(),
            Self::Dates(dates) => dates.size_hint(),
        }
    }
}

/// How the listing is walked
#[derive(Debug, Clone)]
pub enum PaginationStrategy {
    /// Fetch the seed for a page count, then request pages `1..=count`
    PageCount {
        seed: Request,
        count_field: String,
        page_param: String,
    },

    /// Request one publication day at a time from `start` up to today
    DateRange {
        start: NaiveDate,
        search: SearchTemplate,
    },
}

impl PaginationStrategy {
    /// Builds the strategy bound to a source deployment
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        match source {
            SourceConfig::OcdsSearch(ocds) => Ok(Self::PageCount {
                seed: Request::get(Url::parse(&ocds.seed_url)?),
                count_field: ocds.page_count_field.clone(),
                page_param: ocds.page_param.clone(),
            }),
            SourceConfig::NoticeSearch(notices) => Ok(Self::DateRange {
                start: notices.start_date,
                search: SearchTemplate {
                    url: Url::parse(&notices.search_url)?,
                    status: notices.status.clone(),
                    page_size: notices.page_size,
                },
            }),
        }
    }

    /// Determines the full plan
    ///
    /// The page-count strategy fetches the seed once for discovery;
    /// its own records are not emitted. `today` bounds the date range and is
    /// fixed for the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery fetch fails or carries no usable page count.
    pub async fn plan(&self, fetcher: &Fetcher, today: NaiveDate) -> Result<PaginationPlan> {
        match self {
            Self::PageCount {
                seed,
                count_field,
                page_param,
            } => {
                let discovery = fetcher.fetch(seed.clone()).await?;
                let count = read_page_count(&discovery.payload, count_field).ok_or_else(|| {
                    HarvestError::Discovery {
                        url: seed.url().to_string(),
                        message: format!("'{}' is missing or not a page count", count_field),
                    }
                })?;

                tracing::info!("Discovered {} page(s) from {}", count, seed.url());
                Ok(PaginationPlan::Pages(PageRequests::new(
                    seed.clone(),
                    page_param.clone(),
                    count,
                )))
            }

            Self::DateRange { start, search } => {
                let plan = PaginationPlan::Dates(DateRequests::new(search.clone(), *start, today));
                tracing::info!(
                    "Planned {} day(s) from {} to {} (exclusive)",
                    plan.len(),
                    start,
                    today
                );
                Ok(plan)
            }
        }
    }
}
