mod common;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chart_sentinel::error::DataFetchError;
use chart_sentinel::{BinanceKlines, CandleSource, KlineRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn client(base: &str) -> BinanceKlines {
    BinanceKlines::new(format!("{base}/api/v3/klines"), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn fetches_and_parses_recent_candles() {
    let seen: Arc<Mutex<HashMap<String, String>>> = Arc::default();
    let seen_in_handler = seen.clone();
    let closes: Vec<f64> = (0..60).map(|i| 42_000.0 + i as f64).collect();
    let body = common::kline_rows(&closes);

    let router = Router::new().route(
        "/api/v3/klines",
        get(move |Query(params): Query<HashMap<String, String>>| {
            *seen_in_handler.lock().unwrap() = params;
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    let base = common::serve(router).await;

    let series = client(&base).fetch(&KlineRequest::default()).await.unwrap();

    assert_eq!(series.len(), 60);
    assert_eq!(series.candles()[0].close, 42_000.0);
    assert_eq!(series.last().unwrap().close, 42_059.0);
    assert_eq!(series.candles()[0].open_time.timestamp(), 1_700_000_000);

    let params = seen.lock().unwrap().clone();
    assert_eq!(params.get("symbol").map(String::as_str), Some("BTCUSDT"));
    assert_eq!(params.get("interval").map(String::as_str), Some("1m"));
    assert_eq!(params.get("limit").map(String::as_str), Some("60"));
}

#[tokio::test]
async fn service_unavailable_is_a_fetch_error() {
    let router = Router::new().route(
        "/api/v3/klines",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
    );
    let base = common::serve(router).await;

    let err = client(&base).fetch(&KlineRequest::default()).await.unwrap_err();
    assert!(
        matches!(&err, DataFetchError::Status { status: 503, body } if body == "maintenance"),
        "{err:?}"
    );
}

#[tokio::test]
async fn rate_limit_reports_ban_expiry() {
    let router = Router::new().route(
        "/api/v3/klines",
        get(|| async {
            (
                StatusCode::IM_A_TEAPOT,
                r#"{"code":-1003,"msg":"Way too much request weight used; IP banned until 1700000600000."}"#,
            )
        }),
    );
    let base = common::serve(router).await;

    match client(&base).fetch(&KlineRequest::default()).await {
        Err(DataFetchError::RateLimited { status, until }) => {
            assert_eq!(status, 418);
            assert_eq!(until.unwrap().timestamp(), 1_700_000_600);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn non_array_payload_is_malformed() {
    let router = Router::new().route(
        "/api/v3/klines",
        get(|| async { Json(serde_json::json!({"code": -1121, "msg": "Invalid symbol."})) }),
    );
    let base = common::serve(router).await;

    let err = client(&base).fetch(&KlineRequest::default()).await.unwrap_err();
    assert!(matches!(err, DataFetchError::Malformed(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_api_is_a_transport_error() {
    let url = common::refused_url();
    let source = BinanceKlines::new(url, Duration::from_secs(5)).unwrap();
    let err = source.fetch(&KlineRequest::default()).await.unwrap_err();
    assert!(matches!(err, DataFetchError::Transport(_)), "{err:?}");
}
