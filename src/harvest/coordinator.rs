//! Harvest coordinator - main pipeline orchestration logic
//!
//! This module contains the run loop that drives one harvest:
//! - Determining the pagination plan
//! - Streaming plan requests through the fetcher with bounded concurrency
//! - Fanning out detail requests where the source needs them
//! - Extracting records and writing them to the sink as they arrive
//! - Applying the failure policy and honoring cancellation

use crate::cache::open_cache;
use crate::config::{Config, FailurePolicy, SourceConfig};
use crate::extract::{extractor_for, Extractor};
use crate::harvest::detail::DetailExpander;
use crate::harvest::fetcher::{FetchPolicy, Fetcher};
use crate::harvest::pagination::PaginationStrategy;
use crate::harvest::rate_limit::RateLimiter;
use crate::harvest::transport::{build_http_client, HttpTransport};
use crate::model::{Request, ResponseEnvelope};
use crate::output::{CsvSink, HarvestStats, RecordSink};
use crate::{FetchError, FetchErrorKind, Result};
use chrono::NaiveDate;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Main harvest coordinator structure
pub struct Coordinator<S: RecordSink> {
    fetcher: Arc<Fetcher>,
    strategy: PaginationStrategy,
    details: Option<DetailExpander>,
    extractor: Box<dyn Extractor>,
    sink: S,
    max_in_flight: usize,
    on_failure: FailurePolicy,
}

impl Coordinator<CsvSink<BufWriter<File>>> {
    /// Creates a coordinator wired to the network, the cache, and a CSV file
    ///
    /// The output file is truncated here.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated harvest configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Failed to build the client, open the cache,
    ///   or create the output file
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(&config.fetcher)?;
        let limiter = Arc::new(RateLimiter::new(
            config.fetcher.max_requests,
            Duration::from_millis(config.fetcher.per_ms),
        ));

        let mut fetcher = Fetcher::new(
            Arc::new(HttpTransport::new(client)),
            limiter,
            FetchPolicy::from_config(&config.fetcher),
        );
        if config.cache.enabled {
            fetcher = fetcher.with_cache(open_cache(Path::new(&config.cache.directory))?);
        } else {
            tracing::info!("Response cache disabled");
        }

        let sink = CsvSink::create(Path::new(&config.output.path))?;
        Self::new(config, fetcher, sink)
    }
}

impl<S: RecordSink> Coordinator<S> {
    /// Creates a coordinator from its collaborators
    pub fn new(config: &Config, fetcher: Fetcher, sink: S) -> Result<Self> {
        let strategy = PaginationStrategy::from_source(&config.source)?;
        let details = match &config.source {
            SourceConfig::NoticeSearch(notices) => {
                Some(DetailExpander::new(notices.detail_url.clone()))
            }
            SourceConfig::OcdsSearch(_) => None,
        };

        Ok(Self {
            fetcher: Arc::new(fetcher),
            strategy,
            details,
            extractor: extractor_for(&config.source),
            sink,
            max_in_flight: config.fetcher.max_in_flight.max(1),
            on_failure: config.fetcher.on_failure,
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs one harvest
    ///
    /// Responses are consumed in plan order. Each response's records are
    /// written and flushed before the next response is handled.
    ///
    /// # Arguments
    ///
    /// * `today` - Exclusive end of a date-range plan, fixed for the run
    /// * `cancel` - Cancelling stops new requests; in-flight ones finish and
    ///   their records are written
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestStats)` - The plan completed, possibly with skipped
    ///   failures, or the run was cancelled
    /// * `Err(HarvestError)` - Discovery failed, the sink failed, or a
    ///   request failed under the `abort` policy
    pub async fn run(&mut self, today: NaiveDate, cancel: CancellationToken) -> Result<HarvestStats> {
        let started = Instant::now();
        let mut stats = HarvestStats::default();
        let mut first_error: Option<FetchError> = None;

        // Aborting cancels this child only; `cancel` reports outside interrupts
        let stop = cancel.child_token();

        let plan = self.strategy.plan(&self.fetcher, today).await?;
        stats.requests_planned = plan.len() as u64;
        if plan.is_empty() {
            tracing::warn!("Pagination plan is empty, nothing to harvest");
        }

        let details = self.details.clone();
        let mut listings = fetch_all(&self.fetcher, plan.requests(), &stop, self.max_in_flight);

        while let Some(result) = listings.next().await {
            let listing = match result {
                Ok(listing) => listing,
                Err(e) => {
                    self.record_failure(e, &mut stats, &mut first_error, &stop);
                    continue;
                }
            };
            stats.listings_fetched += 1;

            if let Some(passthrough) = listing.passthrough() {
                tracing::info!("Processing {}...", passthrough);
            }

            let Some(expander) = &details else {
                self.emit(&listing, &mut stats)?;
                continue;
            };

            let requests = expander.expand(&listing);
            tracing::debug!("Expanded {} detail request(s)", requests.len());

            let mut notices = fetch_all(&self.fetcher, requests, &stop, self.max_in_flight);
            while let Some(result) = notices.next().await {
                match result {
                    Ok(notice) => {
                        stats.details_fetched += 1;
                        self.emit(&notice, &mut stats)?;
                    }
                    Err(e) => self.record_failure(e, &mut stats, &mut first_error, &stop),
                }
            }
        }

        self.sink.flush()?;

        let counts = self.fetcher.counts();
        stats.cache_hits = counts.cache_hits;
        stats.attempts = counts.attempts;
        stats.retries = counts.retries;
        stats.interrupted = cancel.is_cancelled();
        stats.elapsed = started.elapsed();

        tracing::info!(
            "Harvest finished: {} record(s) from {} listing(s) and {} detail(s), {} failure(s) in {:.1}s",
            stats.records_written,
            stats.listings_fetched,
            stats.details_fetched,
            stats.failures,
            stats.elapsed.as_secs_f64()
        );

        if let Some(error) = first_error {
            return Err(error.into());
        }
        if stats.interrupted {
            tracing::warn!("Harvest interrupted, output holds the records fetched so far");
        }

        Ok(stats)
    }

    /// Extracts one response and writes its records
    fn emit(&mut self, response: &ResponseEnvelope, stats: &mut HarvestStats) -> Result<()> {
        let records = self.extractor.extract(response);
        if records.is_empty() {
            tracing::debug!("No records in {}", response.request.label());
            return Ok(());
        }

        self.sink.write_batch(&records)?;
        stats.records_written += records.len() as u64;
        Ok(())
    }

    /// Applies the failure policy to a terminal fetch failure
    fn record_failure(
        &self,
        error: FetchError,
        stats: &mut HarvestStats,
        first_error: &mut Option<FetchError>,
        stop: &CancellationToken,
    ) {
        stats.failures += 1;

        match self.on_failure {
            FailurePolicy::Skip => {
                tracing::error!(url = %error.url, attempts = error.attempts, "Skipping: {}", error);
            }
            FailurePolicy::Abort => {
                tracing::error!(url = %error.url, attempts = error.attempts, "Aborting: {}", error);
                if first_error.is_none() {
                    *first_error = Some(error);
                }
                stop.cancel();
            }
        }
    }
}

/// Streams fetch results for `requests` in order, at most `in_flight` at once
///
/// Each fetch runs as its own task so it keeps making progress while the
/// consumer is busy. Once `stop` is cancelled no further request is started;
/// those already started still complete and are yielded.
fn fetch_all<I>(
    fetcher: &Arc<Fetcher>,
    requests: I,
    stop: &CancellationToken,
    in_flight: usize,
) -> BoxStream<'static, std::result::Result<ResponseEnvelope, FetchError>>
where
    I: IntoIterator<Item = Request>,
    I::IntoIter: Send + 'static,
{
    let fetcher = Arc::clone(fetcher);
    let stop = stop.clone();

    stream::iter(requests)
        .take_while(move |_| future::ready(!stop.is_cancelled()))
        .map(move |request| {
            let fetcher = Arc::clone(&fetcher);
            let url = request.label();
            async move {
                match tokio::spawn(async move { fetcher.fetch(request).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(FetchError {
                        kind: FetchErrorKind::Network,
                        url,
                        last_status: None,
                        attempts: 0,
                        message: format!("fetch task failed: {}", e),
                    }),
                }
            }
        })
        .buffered(in_flight.max(1))
        .boxed()
}

/// Runs a harvest as configured, writing to the configured CSV file
///
/// # Arguments
///
/// * `config` - The validated harvest configuration
/// * `cancel` - Run-level cancellation, typically wired to Ctrl-C
pub async fn run_harvest(config: &Config, cancel: CancellationToken) -> Result<HarvestStats> {
    let mut coordinator = Coordinator::from_config(config)?;
    let today = chrono::Local::now().date_naive();

    tracing::info!(
        "Harvesting {} into {}",
        config.source.kind(),
        config.output.path
    );
    coordinator.run(today, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::parse_config;
    use crate::harvest::transport::{RawResponse, Transport, TransportError};
    use crate::HarvestError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers by URL; unknown URLs get a 500
    struct RoutedTransport {
        routes: HashMap<String, (u16, String, Duration)>,
        calls: AtomicU32,
    }

    impl RoutedTransport {
        fn new() -> Self {
            Self {
                routes: HashMap::new(),
                calls: AtomicU32::new(0),
            }
        }

        fn route(mut self, url: &str, status: u16, body: Value) -> Self {
            self.routes
                .insert(url.to_string(), (status, body.to_string(), Duration::ZERO));
            self
        }

        fn slow_route(mut self, url: &str, body: Value, delay: Duration) -> Self {
            self.routes
                .insert(url.to_string(), (200, body.to_string(), delay));
            self
        }
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn send(&self, request: &Request) -> std::result::Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.routes.get(request.url().as_str()) {
                Some((status, body, delay)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(RawResponse::new(*status, body.clone()))
                }
                None => Ok(RawResponse::new(500, "")),
            }
        }
    }

    const SEED: &str = "https://api.example.com/ocds?stages=award";

    fn ocds_config(on_failure: &str) -> Config {
        parse_config(&format!(
            r#"
[source]
kind = "ocds-search"
seed-url = "{}"

[fetcher]
max-retries = 1
retry-delay-ms = 1
max-requests = 1000
per-ms = 1
on-failure = "{}"

[cache]
enabled = false

[output]
path = "unused.csv"
"#,
            SEED, on_failure
        ))
        .unwrap()
    }

    fn page_url(page: u32) -> String {
        format!("{}&page={}", SEED, page)
    }

    fn page(supplier: &str) -> Value {
        json!({
            "results": [{
                "releases": [{
                    "ocid": format!("ocid-{}", supplier),
                    "awards": [{"suppliers": [{"name": supplier}]}]
                }]
            }]
        })
    }

    fn coordinator(config: &Config, transport: RoutedTransport) -> Coordinator<CsvSink<Vec<u8>>> {
        let policy = FetchPolicy::from_config(&config.fetcher);
        let limiter = Arc::new(RateLimiter::new(1000, Duration::from_millis(1)));
        let fetcher = Fetcher::new(Arc::new(transport), limiter, policy)
            .with_cache(Arc::new(MemoryCache::new()));
        Coordinator::new(config, fetcher, CsvSink::new(Vec::new())).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn output(coordinator: Coordinator<CsvSink<Vec<u8>>>) -> String {
        String::from_utf8(coordinator.into_sink().into_inner().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_rows_follow_plan_order_despite_latency() {
        let transport = RoutedTransport::new()
            .route(SEED, 200, json!({"maxPage": 3}))
            .slow_route(&page_url(1), page("first"), Duration::from_millis(150))
            .route(&page_url(2), 200, page("second"))
            .route(&page_url(3), 200, page("third"));
        let config = ocds_config("abort");
        let mut coordinator = coordinator(&config, transport);

        let stats = coordinator.run(today(), CancellationToken::new()).await.unwrap();

        assert_eq!(stats.requests_planned, 3);
        assert_eq!(stats.listings_fetched, 3);
        assert_eq!(stats.records_written, 3);
        assert!(!stats.interrupted);

        let csv = output(coordinator);
        let names: Vec<&str> = csv
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_skip_policy_continues_past_failures() {
        let transport = RoutedTransport::new()
            .route(SEED, 200, json!({"maxPage": 3}))
            .route(&page_url(1), 200, page("first"))
            .route(&page_url(3), 200, page("third"));
        let config = ocds_config("skip");
        let mut coordinator = coordinator(&config, transport);

        let stats = coordinator.run(today(), CancellationToken::new()).await.unwrap();

        assert_eq!(stats.failures, 1);
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_run_and_keeps_written_rows() {
        let transport = RoutedTransport::new()
            .route(SEED, 200, json!({"maxPage": 3}))
            .route(&page_url(1), 200, page("first"))
            .route(&page_url(2), 404, json!({}));
        let mut config = ocds_config("abort");
        config.fetcher.max_in_flight = 1;
        let mut coordinator = coordinator(&config, transport);

        let error = coordinator
            .run(today(), CancellationToken::new())
            .await
            .unwrap_err();

        match error {
            HarvestError::Fetch(e) => {
                assert_eq!(e.kind, FetchErrorKind::Client);
                assert_eq!(e.last_status, Some(404));
            }
            other => panic!("unexpected error: {}", other),
        }

        let csv = output(coordinator);
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("first"));
    }

    #[tokio::test]
    async fn test_missing_page_count_is_fatal() {
        let transport = RoutedTransport::new().route(SEED, 200, json!({"results": []}));
        let config = ocds_config("skip");
        let mut coordinator = coordinator(&config, transport);

        let error = coordinator
            .run(today(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, HarvestError::Discovery { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_run_issues_no_follow_ups() {
        let transport = RoutedTransport::new()
            .route(SEED, 200, json!({"maxPage": 5}))
            .route(&page_url(1), 200, page("first"));
        let config = ocds_config("abort");
        let mut coordinator = coordinator(&config, transport);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = coordinator.run(today(), cancel).await.unwrap();

        assert!(stats.interrupted);
        assert_eq!(stats.requests_planned, 5);
        assert_eq!(stats.listings_fetched, 0);
        assert_eq!(coordinator.fetcher().counts().attempts, 1);
    }

    /// Cancels the run as soon as the first record is written
    struct InterruptingSink {
        inner: CsvSink<Vec<u8>>,
        cancel: CancellationToken,
    }

    impl RecordSink for InterruptingSink {
        fn write_record(&mut self, record: &crate::model::OutputRecord) -> crate::output::OutputResult<()> {
            self.cancel.cancel();
            self.inner.write_record(record)
        }

        fn flush(&mut self) -> crate::output::OutputResult<()> {
            self.inner.flush()
        }

        fn rows_written(&self) -> u64 {
            self.inner.rows_written()
        }
    }

    #[tokio::test]
    async fn test_interrupt_drains_in_flight_pages() {
        let transport = RoutedTransport::new()
            .route(SEED, 200, json!({"maxPage": 5}))
            .route(&page_url(1), 200, page("first"))
            .slow_route(&page_url(2), page("second"), Duration::from_millis(200))
            .route(&page_url(3), 200, page("third"))
            .route(&page_url(4), 200, page("fourth"))
            .route(&page_url(5), 200, page("fifth"));
        let mut config = ocds_config("abort");
        config.fetcher.max_in_flight = 2;

        let cancel = CancellationToken::new();
        let policy = FetchPolicy::from_config(&config.fetcher);
        let limiter = Arc::new(RateLimiter::new(1000, Duration::from_millis(1)));
        let fetcher = Fetcher::new(Arc::new(transport), limiter, policy);
        let sink = InterruptingSink {
            inner: CsvSink::new(Vec::new()),
            cancel: cancel.clone(),
        };
        let mut coordinator = Coordinator::new(&config, fetcher, sink).unwrap();

        let stats = coordinator.run(today(), cancel).await.unwrap();

        assert!(stats.interrupted);
        assert_eq!(stats.requests_planned, 5);
        assert_eq!(stats.listings_fetched, 2);
        assert_eq!(stats.records_written, 2);
        // Seed plus the two pages that were in flight when the run stopped
        assert_eq!(coordinator.fetcher().counts().attempts, 3);

        let csv = String::from_utf8(coordinator.into_sink().inner.into_inner().unwrap()).unwrap();
        assert!(csv.contains("first"));
        assert!(csv.contains("second"));
        assert!(!csv.contains("third"));
    }

    #[tokio::test]
    async fn test_date_range_expands_details() {
        let config = parse_config(
            r#"
[source]
kind = "notice-search"
search-url = "https://api.example.com/search"
detail-url = "https://api.example.com/notice/"
notice-url = "https://www.example.com/notice/"
start-date = "2019-12-30"

[fetcher]
empty-collection = ""
max-requests = 1000
per-ms = 1

[cache]
enabled = false

[output]
path = "unused.csv"
"#,
        )
        .unwrap();

        // Both days hit the same search URL; the body differs but the
        // routed transport only looks at the URL
        let transport = RoutedTransport::new()
            .route(
                "https://api.example.com/search",
                200,
                json!({"noticeList": [{"item": {"id": "n1"}}]}),
            )
            .route(
                "https://api.example.com/notice/n1",
                200,
                json!({
                    "notice": {"id": "n1", "title": "Gritting"},
                    "awards": [{"id": "a1"}, {"id": "a2"}]
                }),
            );
        let mut coordinator = coordinator(&config, transport);

        let stats = coordinator.run(today(), CancellationToken::new()).await.unwrap();

        assert_eq!(stats.requests_planned, 2);
        assert_eq!(stats.listings_fetched, 2);
        assert_eq!(stats.details_fetched, 2);
        assert_eq!(stats.records_written, 4);
        // The second day's detail request is served from the memory cache
        assert_eq!(stats.cache_hits, 1);

        let csv = output(coordinator);
        assert!(csv.starts_with("noticeURL,noticeFrom,noticeTitle,"));
        assert_eq!(csv.lines().count(), 5);
    }
}
