//! Tests for the reqwest-backed page fetcher against a mock incident API

mod common;

use common::*;
use incident_sync::api::{HttpPageFetcher, PageFetcher};
use incident_sync::config::ApiConfig;
use incident_sync::error::AppError;
use incident_sync::filtering::IncidentQuery;
use incident_sync::models::{Filter, ShowState};
use incident_sync::realtime::InMemoryTransport;
use incident_sync::{IncidentView, ViewConfig};
use mockito::Matcher;
use std::sync::Arc;

const INCIDENTS_PATH: &str = "/api/v1/incidents/";

fn api_config(base_url: String) -> ApiConfig {
    ApiConfig {
        base_url,
        incidents_path: INCIDENTS_PATH.to_string(),
        request_timeout_secs: 5,
    }
}

fn page_body(pks: std::ops::Range<i64>, next: Option<String>, previous: Option<String>) -> String {
    let results: Vec<_> = pks.map(incident).collect();
    serde_json::json!({
        "next": next,
        "previous": previous,
        "results": results,
    })
    .to_string()
}

#[tokio::test]
async fn test_first_page_sends_filter_parameters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("open".into(), "true".into()),
            Matcher::UrlEncoded("acked".into(), "false".into()),
            Matcher::UrlEncoded("tags".into(), "host=a,env=prod".into()),
            Matcher::UrlEncoded("source__id__in".into(), "1,4".into()),
            Matcher::UrlEncoded("page_size".into(), "25".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page_body(1..3, None, None))
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let filter = Filter::default()
        .with_tags(["host=a", "env=prod"])
        .with_sources(vec![1, 4]);

    let page = fetcher
        .fetch_page(&IncidentQuery::from_filter(&filter), None, 25)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(pks(&page.results), vec![1, 2]);
    assert!(page.is_last());
}

#[tokio::test]
async fn test_stateful_and_timeframe_parameters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("stateful".into(), "true".into()),
            Matcher::Regex(r"start_time__gte=\d{4}-\d{2}-\d{2}T".into()),
        ]))
        .with_status(200)
        .with_body(page_body(1..2, None, None))
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let filter = Filter::default().with_stateful(true).with_timeframe_hours(24);

    fetcher
        .fetch_page(&IncidentQuery::from_filter(&filter), None, 10)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_cursor_overrides_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::Exact("cursor=cD0y".to_string()))
        .with_status(200)
        .with_body(page_body(11..12, None, None))
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let cursor = format!("{}{}?cursor=cD0y", server.url(), INCIDENTS_PATH);
    let query = IncidentQuery::from_filter(&Filter::default().with_show(ShowState::Closed));

    let page = fetcher.fetch_page(&query, Some(&cursor), 10).await.unwrap();

    mock.assert_async().await;
    assert_eq!(pks(&page.results), vec![11]);
}

#[tokio::test]
async fn test_ongoing_end_time_decodes() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"{
        "next": null,
        "previous": null,
        "results": [{
            "pk": 5,
            "start_time": "2024-03-01T10:00:00Z",
            "end_time": "infinity",
            "stateful": true,
            "details_url": "",
            "description": "Port down",
            "ticket_url": "",
            "open": true,
            "acked": false,
            "level": 1,
            "source": {"pk": 2, "name": "zabbix", "type": "zabbix"},
            "source_incident_id": "77",
            "tags": []
        }]
    }"#;
    server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let page = fetcher
        .fetch_page(&IncidentQuery::default(), None, 10)
        .await
        .unwrap();

    let incident = &page.results[0];
    assert!(incident.is_ongoing());
    assert_eq!(incident.source.name, "zabbix");
}

#[tokio::test]
async fn test_error_status_maps_to_http_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let error = fetcher
        .fetch_page(&IncidentQuery::default(), None, 10)
        .await
        .unwrap_err();

    match &error {
        AppError::Http { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_forbidden_is_not_retryable() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let error = fetcher
        .fetch_page(&IncidentQuery::default(), None, 10)
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::Http { status: 403, .. }));
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_serialization_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"results": "nope"}"#)
        .create_async()
        .await;

    let fetcher = HttpPageFetcher::from_config(&api_config(server.url())).unwrap();
    let error = fetcher
        .fetch_page(&IncidentQuery::default(), None, 10)
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::Serialization(_)));
}

#[tokio::test]
async fn test_truncated_body_is_network_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Promises more body than it sends, then hangs up
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n{\"results\": [")
            .await;
        let _ = socket.shutdown().await;
    });

    let fetcher = HttpPageFetcher::from_config(&api_config(format!("http://{}", address))).unwrap();
    let error = fetcher
        .fetch_page(&IncidentQuery::default(), None, 10)
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::Network(_)), "got {:?}", error);
    assert!(error.is_retryable());
    server.await.unwrap();
}

#[tokio::test]
async fn test_view_pages_through_api() {
    let mut server = mockito::Server::new_async().await;
    let next = format!("{}{}?cursor=p2", server.url(), INCIDENTS_PATH);
    let previous = format!("{}{}?cursor=p1", server.url(), INCIDENTS_PATH);

    let first = server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::UrlEncoded("page_size".into(), "10".into()))
        .with_status(200)
        .with_body(page_body(1..11, Some(next.clone()), None))
        .create_async()
        .await;
    let second = server
        .mock("GET", INCIDENTS_PATH)
        .match_query(Matcher::Exact("cursor=p2".to_string()))
        .with_status(200)
        .with_body(page_body(11..15, None, Some(previous)))
        .create_async()
        .await;

    let fetcher = Arc::new(HttpPageFetcher::from_config(&api_config(server.url())).unwrap());
    let view = IncidentView::new(
        fetcher,
        Arc::new(InMemoryTransport::new()),
        Filter::default(),
        ViewConfig::default(),
    );

    view.refresh().await.unwrap();
    view.next_page().await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(pks(&view.incidents()), vec![11, 12, 13, 14]);
    assert_eq!(view.total_elements(), 14);
}
