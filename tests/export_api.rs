//! CSV export and service routes.

mod common;

use axum::http::StatusCode;
use common::Harness;
use serde_json::{json, Value};

#[tokio::test]
async fn export_writes_configured_columns() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.get("/vehicles/export").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-type"), "text/csv");
    let disposition = response.header("content-disposition");
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=export_"));
    assert!(disposition.ends_with(".csv"));

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "VIN,Brand,Price,Owner",
            "VIN001,Ford,15000.50,Ana",
            "VIN002,Ford,12000.00,Bruno",
            "VIN003,Fiat,8000.00,Ana",
        ]
    );
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn export_honours_filters() {
    let h = Harness::new();
    h.seed_fleet();

    let text = h
        .server
        .get("/vehicles/export")
        .add_query_param("brand", "Fiat")
        .await
        .text();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("VIN003,Fiat,8000.00,Ana"));
}

#[tokio::test]
async fn export_of_nothing_is_a_bad_request() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.get("/vehicles/export").add_query_param("brand", "Kia").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>(), json!({"message": "No data provided"}));
}

#[tokio::test]
async fn export_failure_reports_the_error() {
    let h = Harness::new();
    h.seed_fleet();
    h.store.fail_on("fetch_page");

    let response = h.server.get("/vehicles/export").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.json::<Value>()["error"].is_string());
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn service_routes_answer() {
    let h = Harness::new();

    let health: Value = h.server.get("/health").await.json();
    assert_eq!(health, json!({"status": "ok"}));

    let ready = h.server.get("/ready").await;
    assert_eq!(ready.status_code(), StatusCode::OK);
    assert_eq!(ready.json::<Value>()["connections"]["default"], json!("ok"));

    let version: Value = h.server.get("/version").await.json();
    assert_eq!(version["version"], json!(env!("CARGO_PKG_VERSION")));
}
