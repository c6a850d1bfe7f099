//! Integration tests for [`WarApiClient`] against a local fake War API.
//!
//! A small Axum app bound to an ephemeral loopback port stands in for the
//! live service, so conditional requests, missing regions, and timeouts
//! can be exercised end to end.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use frontline_core::config::SourceConfig;
use frontline_core::source::{SourceError, WarSource};
use frontline_source::WarApiClient;
use frontline_types::RegionId;

const REGION_ETAG: &str = "\"v27\"";

#[derive(Default)]
struct Hits {
    full: AtomicUsize,
    not_modified: AtomicUsize,
}

async fn war() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"warId":"abc","warNumber":118,"winner":"NONE","requiredVictoryTowns":32}"#,
    )
}

async fn maps() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"["TheFingersHex","MissingHex","BrokenHex","SlowHex"]"#,
    )
}

async fn dynamic(
    State(hits): State<Arc<Hits>>,
    Path(region): Path<String>,
    headers: HeaderMap,
) -> Response {
    match region.as_str() {
        "MissingHex" => StatusCode::NOT_FOUND.into_response(),
        "BrokenHex" => (StatusCode::OK, "{not json").into_response(),
        "SlowHex" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
        _ => {
            let conditional = headers
                .get(header::IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok());
            if conditional == Some(REGION_ETAG) {
                hits.not_modified.fetch_add(1, Ordering::SeqCst);
                return StatusCode::NOT_MODIFIED.into_response();
            }
            hits.full.fetch_add(1, Ordering::SeqCst);
            (
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::ETAG, REGION_ETAG),
                ],
                r#"{"regionId":3,"mapItems":[{"teamId":"WARDENS","iconType":56,"x":0.43,"y":0.61,"flags":0}],"version":27}"#,
            )
                .into_response()
        }
    }
}

async fn spawn_fake_api() -> (String, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/api/worldconquest/war", get(war))
        .route("/api/worldconquest/maps", get(maps))
        .route("/api/worldconquest/maps/{region}/dynamic/public", get(dynamic))
        .with_state(Arc::clone(&hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), hits)
}

fn client(base_url: String) -> WarApiClient {
    WarApiClient::new(&SourceConfig {
        base_url,
        request_timeout_ms: 500,
        ..SourceConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn fetches_war_and_regions() {
    let (base, _) = spawn_fake_api().await;
    let client = client(base);

    assert_eq!(client.war().await.unwrap().war_number, 118);
    let regions = client.regions().await.unwrap();
    assert_eq!(regions.len(), 4);
    assert_eq!(regions.first(), Some(&RegionId::new("TheFingersHex")));
}

#[tokio::test]
async fn second_fetch_reuses_cached_snapshot_on_304() {
    let (base, hits) = spawn_fake_api().await;
    let client = client(base);
    let region = RegionId::new("TheFingersHex");

    let first = client.region_snapshot(&region).await.unwrap().unwrap();
    let second = client.region_snapshot(&region).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(second.entities.len(), 1);
    assert_eq!(hits.full.load(Ordering::SeqCst), 1);
    assert_eq!(hits.not_modified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_region_is_none() {
    let (base, _) = spawn_fake_api().await;
    let client = client(base);
    let snapshot = client.region_snapshot(&RegionId::new("MissingHex")).await.unwrap();
    assert!(snapshot.is_none());
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (base, _) = spawn_fake_api().await;
    let client = client(base);
    let err = client
        .region_snapshot(&RegionId::new("BrokenHex"))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Decode { .. }));
}

#[tokio::test]
async fn slow_region_times_out() {
    let (base, _) = spawn_fake_api().await;
    let client = client(base);
    let err = client
        .region_snapshot(&RegionId::new("SlowHex"))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Timeout { .. }));
}

#[tokio::test]
async fn unknown_path_is_a_status_error() {
    let (base, _) = spawn_fake_api().await;
    let client = client(format!("{base}/v2"));
    let err = client.war().await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 404, .. }));
}
