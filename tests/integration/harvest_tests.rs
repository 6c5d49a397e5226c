//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full harvest cycle end-to-end, from discovery to the CSV file.

use award_harvester::config::{parse_config, Config};
use award_harvester::extract::{NOTICE_COLUMNS, OCDS_COLUMNS};
use award_harvester::{Coordinator, HarvestError};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests without a `page` query parameter (the discovery fetch)
struct NoPageParam;

impl Match for NoPageParam {
    fn matches(&self, request: &Request) -> bool {
        !request.url.query_pairs().any(|(key, _)| key == "page")
    }
}

/// Creates an OCDS configuration against the mock server
fn ocds_config(base_url: &str, output: &Path, extra_fetcher: &str, cache_dir: Option<&Path>) -> Config {
    let cache = match cache_dir {
        Some(dir) => format!("enabled = true\ndirectory = \"{}\"", dir.display()),
        None => "enabled = false".to_string(),
    };

    parse_config(&format!(
        r#"
[source]
kind = "ocds-search"
seed-url = "{base}/ocds?stages=award"

[fetcher]
retry-delay-ms = 10
max-requests = 100
per-ms = 100
{extra}

[cache]
{cache}

[output]
path = "{output}"
"#,
        base = base_url,
        extra = extra_fetcher,
        cache = cache,
        output = output.display()
    ))
    .expect("Failed to parse test config")
}

/// One OCDS search page holding a single award to a single supplier
fn ocds_page(max_page: u32, supplier: &str, amount: u64) -> Value {
    json!({
        "maxPage": max_page,
        "results": [{
            "publishedDate": "2020-06-01T00:00:00Z",
            "releases": [{
                "ocid": format!("ocds-{}", supplier),
                "buyer": {
                    "name": "Example Council",
                    "address": {"streetAddress": "1 Town Hall", "locality": "Leeds", "postalCode": "LS1 1UR"},
                    "contactPoint": {"name": "Procurement", "email": "buy@example.com"}
                },
                "tender": {"title": "Widgets", "description": "Supply of\nwidgets"},
                "awards": [{
                    "value": {"amount": amount},
                    "date": "2020-05-01",
                    "suppliers": [{"name": supplier, "identifier": {"id": "00000000"}}]
                }]
            }]
        }]
    })
}

async fn mount_ocds_pages(server: &MockServer, pages: &[(u32, Value)]) {
    for (page, body) in pages {
        Mock::given(method("GET"))
            .and(path("/ocds"))
            .and(query_param("page", page.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(server)
            .await;
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()
}

#[tokio::test]
async fn test_two_page_harvest_end_to_end() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("contracts.csv");
    std::fs::write(&output, "left over from a previous run\n").unwrap();

    // The seed reports the page count and carries page 1's data
    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(query_param("stages", "award"))
        .and(NoPageParam)
        .respond_with(ResponseTemplate::new(200).set_body_json(ocds_page(2, "Alpha Ltd", 100)))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_ocds_pages(
        &mock_server,
        &[(1, ocds_page(2, "Alpha Ltd", 100)), (2, ocds_page(2, "Beta Ltd", 200))],
    )
    .await;

    let config = ocds_config(&mock_server.uri(), &output, "", None);
    let mut coordinator = Coordinator::from_config(&config).unwrap();
    let stats = coordinator
        .run(today(), CancellationToken::new())
        .await
        .unwrap();
    drop(coordinator);

    assert_eq!(stats.requests_planned, 2);
    assert_eq!(stats.records_written, 2);
    assert_eq!(stats.failures, 0);

    let csv = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3, "header plus two rows: {}", csv);
    assert_eq!(lines[0], OCDS_COLUMNS.join(","));
    assert!(lines[1].starts_with("ocds-Alpha Ltd,Alpha Ltd,,"));
    assert!(lines[2].starts_with("ocds-Beta Ltd,Beta Ltd,,"));
    assert!(lines[1].contains("\"1 Town Hall, Leeds, LS1 1UR\""));
    assert!(lines[1].contains(",Supply of widgets,"));
    assert!(!csv.contains("left over"));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("contracts.csv");

    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(NoPageParam)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"maxPage": 1})))
        .mount(&mock_server)
        .await;

    // First attempt fails with 503, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_ocds_pages(&mock_server, &[(1, ocds_page(1, "Gamma Ltd", 300))]).await;

    let config = ocds_config(&mock_server.uri(), &output, "max-retries = 3", None);
    let mut coordinator = Coordinator::from_config(&config).unwrap();
    let stats = coordinator
        .run(today(), CancellationToken::new())
        .await
        .unwrap();
    drop(coordinator);

    assert_eq!(stats.retries, 1);
    assert_eq!(stats.records_written, 1);
    assert!(std::fs::read_to_string(&output).unwrap().contains("Gamma Ltd"));
}

#[tokio::test]
async fn test_abort_policy_stops_after_failure() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("contracts.csv");

    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(NoPageParam)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"maxPage": 3})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ocds_page(3, "Never Ltd", 1)))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_ocds_pages(&mock_server, &[(1, ocds_page(3, "Alpha Ltd", 100))]).await;

    let config = ocds_config(
        &mock_server.uri(),
        &output,
        "max-in-flight = 1\non-failure = \"abort\"",
        None,
    );
    let mut coordinator = Coordinator::from_config(&config).unwrap();
    let error = coordinator
        .run(today(), CancellationToken::new())
        .await
        .unwrap_err();
    drop(coordinator);

    assert!(matches!(error, HarvestError::Fetch(ref e) if e.last_status == Some(404)));

    // Rows written before the failure are flushed
    let csv = std::fs::read_to_string(&output).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("Alpha Ltd"));
}

#[tokio::test]
async fn test_skip_policy_continues_after_failure() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("contracts.csv");

    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(NoPageParam)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"maxPage": 3})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_ocds_pages(
        &mock_server,
        &[(1, ocds_page(3, "Alpha Ltd", 100)), (3, ocds_page(3, "Gamma Ltd", 300))],
    )
    .await;

    let config = ocds_config(
        &mock_server.uri(),
        &output,
        "max-retries = 1\non-failure = \"skip\"",
        None,
    );
    let mut coordinator = Coordinator::from_config(&config).unwrap();
    let stats = coordinator
        .run(today(), CancellationToken::new())
        .await
        .unwrap();
    drop(coordinator);

    assert_eq!(stats.failures, 1);
    assert_eq!(stats.records_written, 2);

    let csv = std::fs::read_to_string(&output).unwrap();
    assert!(csv.contains("Alpha Ltd"));
    assert!(csv.contains("Gamma Ltd"));
}

#[tokio::test]
async fn test_second_run_is_served_from_disk_cache() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join(".scrape-cache");
    let first_output = dir.path().join("first.csv");
    let second_output = dir.path().join("second.csv");

    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(NoPageParam)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"maxPage": 2})))
        .expect(1)
        .mount(&mock_server)
        .await;
    for (page, supplier) in [(1, "Alpha Ltd"), (2, "Beta Ltd")] {
        Mock::given(method("GET"))
            .and(path("/ocds"))
            .and(query_param("page", page.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(ocds_page(2, supplier, 10)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let config = ocds_config(&mock_server.uri(), &first_output, "", Some(&cache_dir));
    let first = Coordinator::from_config(&config)
        .unwrap()
        .run(today(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.cache_hits, 0);

    let config = ocds_config(&mock_server.uri(), &second_output, "", Some(&cache_dir));
    let second = Coordinator::from_config(&config)
        .unwrap()
        .run(today(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.cache_hits, 3);
    assert_eq!(second.attempts, 0);

    assert_eq!(
        std::fs::read_to_string(&first_output).unwrap(),
        std::fs::read_to_string(&second_output).unwrap()
    );
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 3);
}

#[tokio::test]
async fn test_date_range_harvest_with_detail_requests() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("contracts-finder.csv");
    let base = mock_server.uri();

    let search_body = |day: &str| {
        json!({
            "searchCriteria": {"statuses": "Awarded", "publishedFrom": day, "publishedTo": day},
            "size": 1000
        })
    };

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_json(search_body("2021-02-27")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "noticeList": [{"item": {"id": "n-1"}}, {"item": {"id": "n-2"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_json(search_body("2021-02-28")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"noticeList": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The provider throttles with 403; the first detail fetch is retried
    Mock::given(method("GET"))
        .and(path("/notice/n-1"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notice/n-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notice": {
                "id": "n-1",
                "organisationName": "Example &amp; District Council",
                "title": "Gritting",
                "isFrameworkAgreement": true,
                "cpvCodes": ["34927100", "90620000"]
            },
            "awards": [
                {"id": "a-1", "value": 5000, "supplierName": "Grit Co", "dunsNumber": "000000000"},
                {"id": "a-2", "value": 2500, "supplierName": "Salt Co", "dunsNumber": "123456789",
                 "supplierAddress": "Unit 4\nDepot Lane.\tLeeds"}
            ]
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notice/n-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notice": {"id": "n-2", "title": "Cones"},
            "awards": [{"id": "a-3", "value": 10}]
        })))
        .mount(&mock_server)
        .await;

    let config = parse_config(&format!(
        r#"
[source]
kind = "notice-search"
search-url = "{base}/search"
detail-url = "{base}/notice/"
notice-url = "https://www.example.com/notice/"
start-date = "2021-02-27"

[fetcher]
retry-delay-ms = 10
max-requests = 100
per-ms = 100
throttle-statuses = [403, 429]

[cache]
enabled = false

[output]
path = "{output}"
"#,
        base = base,
        output = output.display()
    ))
    .unwrap();

    let mut coordinator = Coordinator::from_config(&config).unwrap();
    let stats = coordinator
        .run(today(), CancellationToken::new())
        .await
        .unwrap();
    drop(coordinator);

    assert_eq!(stats.requests_planned, 2);
    assert_eq!(stats.listings_fetched, 2);
    assert_eq!(stats.details_fetched, 2);
    assert_eq!(stats.records_written, 3);
    assert_eq!(stats.retries, 1);

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(headers, NOTICE_COLUMNS);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);

    let column = |name: &str| NOTICE_COLUMNS.iter().position(|c| *c == name).unwrap();
    assert_eq!(&rows[0][column("noticeURL")], "https://www.example.com/notice/n-1");
    assert_eq!(&rows[0][column("noticeFrom")], "Example & District Council");
    assert_eq!(&rows[0][column("noticeIsFrameworkAgreement")], "true");
    assert_eq!(&rows[0][column("noticeCPVs")], "34927100; 90620000");
    assert_eq!(&rows[0][column("awardSupplierCompanyDunsNumber")], "");
    assert_eq!(&rows[1][column("awardSupplierCompanyDunsNumber")], "123456789");
    assert_eq!(&rows[1][column("awardSupplierAddress")], "Unit 4, Depot Lane, Leeds");
    assert_eq!(&rows[2][column("awardID")], "a-3");
}

#[tokio::test]
async fn test_persistently_empty_result_is_accepted() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("contracts.csv");
    let cache_dir = dir.path().join("cache");

    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(NoPageParam)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"maxPage": 1})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ocds"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"awards": [], "results": []})))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = ocds_config(&mock_server.uri(), &output, "max-retries = 2", Some(&cache_dir));
    let stats = Coordinator::from_config(&config)
        .unwrap()
        .run(today(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.failures, 0);
    assert_eq!(stats.listings_fetched, 1);
    assert_eq!(stats.records_written, 0);

    // Only the seed was cached; the empty page was not
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 1);
}
