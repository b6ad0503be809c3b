//! End-to-end CRUD through the router over the in-memory store.

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use common::Harness;
use serde_json::{json, Value};
use serverless_crud::query::QuerySpec;
use serverless_crud::Store;

#[tokio::test]
async fn index_hides_soft_deleted_rows_and_builds_links() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.get("/vehicles").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["current_page"], json!(1));
    assert_eq!(body["per_page"], json!(50));
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"][0]["serial_number"], json!("VIN001"));
    assert_eq!(body["data"][0]["price"], json!(15000.5));
    assert_eq!(body["data"][1]["price"], json!(12000));
    assert_eq!(
        body["first_page_url"],
        json!("https://api.example.com/vehicles?page=1&per_page=50")
    );
    assert_eq!(body["next_page_url"], Value::Null);
    assert_eq!(body["prev_page_url"], Value::Null);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn index_pages_through_results() {
    let h = Harness::new();
    h.seed_fleet();

    let body: Value = h
        .server
        .get("/vehicles")
        .add_query_param("page", "2")
        .add_query_param("per_page", "2")
        .await
        .json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], json!(3));
    assert_eq!(body["last_page_url"], json!("https://api.example.com/vehicles?page=2&per_page=2"));
    assert_eq!(body["prev_page_url"], json!("https://api.example.com/vehicles?page=1&per_page=2"));
    assert_eq!(body["next_page_url"], Value::Null);
}

#[tokio::test]
async fn page_past_the_end_returns_empty_envelope() {
    let h = Harness::new();
    h.seed_fleet();

    let body: Value = h.server.get("/vehicles").add_query_param("page", "9").await.json();
    assert_eq!(
        body,
        json!({
            "data": [], "first_page_url": null, "last_page_url": null, "next_page_url": null,
            "prev_page_url": null, "current_page": 0, "per_page": 0, "total": 0
        })
    );
}

#[tokio::test]
async fn host_prefix_header_is_prepended_to_links() {
    let h = Harness::new();
    h.seed_fleet();

    let body: Value = h
        .server
        .get("/vehicles")
        .add_header(
            HeaderName::from_static("er-company-request"),
            HeaderValue::from_static("acme"),
        )
        .await
        .json();
    assert_eq!(
        body["first_page_url"],
        json!("https://acme.api.example.com/vehicles?page=1&per_page=50")
    );
}

#[tokio::test]
async fn filters_apply_only_to_declared_columns() {
    let h = Harness::new();
    h.seed_fleet();

    let fords: Value = h.server.get("/vehicles").add_query_param("brand", "Ford").await.json();
    assert_eq!(fords["total"], json!(2));

    let both: Value = h
        .server
        .get("/vehicles")
        .add_query_param("brand", "Ford")
        .add_query_param("year", "2019")
        .await
        .json();
    assert_eq!(both["total"], json!(1));
    assert_eq!(both["data"][0]["id"], json!(1));

    let undeclared: Value = h.server.get("/vehicles").add_query_param("model", "Uno").await.json();
    assert_eq!(undeclared["total"], json!(3));
}

#[tokio::test]
async fn search_combines_with_and_or_or() {
    let h = Harness::new();
    h.seed_fleet();

    let and: Value = h
        .server
        .get("/vehicles")
        .add_query_param("search_model", "fi")
        .await
        .json();
    assert_eq!(and["total"], json!(1));
    assert_eq!(and["data"][0]["model"], json!("Fiesta"));

    let or: Value = h
        .server
        .get("/vehicles")
        .add_query_param("search_model", "fiesta")
        .add_query_param("search_vin", "vin003")
        .add_query_param("searchmethod", "or")
        .await
        .json();
    assert_eq!(or["total"], json!(2));
}

#[tokio::test]
async fn numeric_search_is_exact_on_typed_columns() {
    let h = Harness::new();
    h.seed_fleet();

    let exact: Value = h.server.get("/vehicles").add_query_param("search_year", "2019").await.json();
    assert_eq!(exact["total"], json!(2));

    let partial: Value = h.server.get("/vehicles").add_query_param("search_year", "201").await.json();
    assert_eq!(partial["total"], json!(0));
    assert_eq!(partial["data"], json!([]));
}

#[tokio::test]
async fn unparsable_filter_value_is_answered_generically() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.get("/vehicles").add_query_param("year", "abc").await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>(), json!({"message": "Cannot make the request"}));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn concurrent_read_does_not_undo_a_committed_store() {
    let h = Harness::new();
    h.seed_fleet();
    let vehicles = h.entity("vehicles");

    let mut reader = h.store.open().await.unwrap();
    let created = h.server.post("/vehicles").json(&json!({"vin": "NEW1"})).await;
    assert_eq!(created.status_code(), StatusCode::OK);

    reader.count(vehicles, &QuerySpec::default()).await.unwrap();
    reader.commit().await.unwrap();

    assert_eq!(h.store.rows(vehicles).len(), 5);
    let listed: Value = h.server.get("/vehicles").await.json();
    assert_eq!(listed["total"], json!(4));
}

#[tokio::test]
async fn order_by_sorts_descending() {
    let h = Harness::new();
    h.seed_fleet();

    let body: Value = h
        .server
        .get("/vehicles")
        .add_query_param("order_by", "year")
        .add_query_param("order_dir", "desc")
        .await
        .json();
    assert_eq!(body["data"][0]["year"], json!(2021));
}

#[tokio::test]
async fn find_expands_requested_relationships() {
    let h = Harness::new();
    h.seed_fleet();

    let vehicle: Value = h
        .server
        .get("/vehicles/1")
        .add_query_param("relationships", "owner,vehicles")
        .await
        .json();
    assert_eq!(vehicle["serial_number"], json!("VIN001"));
    assert_eq!(vehicle["owner"]["name"], json!("Ana"));
    assert_eq!(vehicle["owner"]["vehicles"], json!([1, 3, 4]));

    let owner: Value = h
        .server
        .get("/owners/1")
        .add_query_param("relationships", "vehicles")
        .await
        .json();
    assert_eq!(owner["vehicles"].as_array().unwrap().len(), 3);
    assert_eq!(owner["vehicles"][0]["serial_number"], json!("VIN001"));
}

#[tokio::test]
async fn find_without_relationships_is_flat() {
    let h = Harness::new();
    h.seed_fleet();

    let vehicle: Value = h.server.get("/vehicles/2").await.json();
    assert_eq!(vehicle["owner_id"], json!(2));
    assert!(vehicle.get("owner").is_none());
}

#[tokio::test]
async fn find_rejects_missing_and_malformed_ids() {
    let h = Harness::new();
    h.seed_fleet();

    assert_eq!(h.server.get("/vehicles/99").await.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.server.get("/vehicles/4").await.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.server.get("/vehicles/abc").await.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let h = Harness::new();

    let response = h.server.get("/trucks").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>(), json!({"message": "unknown resource 'trucks'"}));
    assert_eq!(h.store.sessions_opened(), 0);
}

#[tokio::test]
async fn store_inserts_and_returns_flat_record() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h
        .server
        .post("/vehicles")
        .json(&json!({"vin": "VIN010", "brand": "Kia", "year": 2020, "owner_id": 2}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["id"], json!(5));
    assert_eq!(body["serial_number"], json!("VIN010"));
    assert_eq!(h.store.rows(h.entity("vehicles")).len(), 5);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn store_validation_failure_writes_nothing() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.post("/vehicles").json(&json!({"brand": "Kia"})).await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>(), json!({"message": "vin is required"}));

    let response = h.server.post("/vehicles").json(&json!({"vin": "VIN011", "year": 1800})).await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(h.store.rows(h.entity("vehicles")).len(), 4);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn store_rejects_body_that_is_not_json() {
    let h = Harness::new();

    let response = h.server.post("/vehicles").text("vin=VIN010").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(h.store.sessions_opened(), 0);
}

#[tokio::test]
async fn store_failure_is_answered_generically_and_rolled_back() {
    let h = Harness::new();
    h.seed_fleet();
    h.store.fail_on("insert");

    let response = h.server.post("/vehicles").json(&json!({"vin": "VIN010"})).await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>(), json!({"message": "Cannot make the request"}));
    assert_eq!(h.store.rows(h.entity("vehicles")).len(), 4);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn index_failure_closes_the_session() {
    let h = Harness::new();
    h.seed_fleet();
    h.store.fail_on("count");

    let response = h.server.get("/vehicles").await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["message"], json!("Cannot make the request"));
    assert_eq!(h.store.sessions_opened(), 1);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn update_applies_present_fields() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.put("/vehicles/1").json(&json!({"year": 2020})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["year"], json!(2020));
    assert_eq!(body["serial_number"], json!("VIN001"));

    let patched = h.server.patch("/vehicles/1").json(&json!({"model": "Mondeo"})).await;
    assert_eq!(patched.json::<Value>()["model"], json!("Mondeo"));
}

#[tokio::test]
async fn update_rejects_invalid_fields_and_deleted_rows() {
    let h = Harness::new();
    h.seed_fleet();

    let invalid = h.server.put("/vehicles/1").json(&json!({"year": 1800})).await;
    assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let deleted = h.server.put("/vehicles/4").json(&json!({"year": 2020})).await;
    assert_eq!(deleted.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let unchanged: Value = h.server.get("/vehicles/1").await.json();
    assert_eq!(unchanged["year"], json!(2019));
}

#[tokio::test]
async fn delete_soft_deletes_when_declared() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.delete("/vehicles/2").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({"id": "2"}));

    assert_eq!(h.server.get("/vehicles/2").await.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let listed: Value = h.server.get("/vehicles").await.json();
    assert_eq!(listed["total"], json!(2));

    let rows = h.store.rows(h.entity("vehicles"));
    assert_eq!(rows.len(), 4);
    let deleted = rows
        .iter()
        .find(|r| r["id"].to_text().as_deref() == Some("2"))
        .unwrap();
    assert!(!deleted["deleted_at"].is_null());
}

#[tokio::test]
async fn delete_removes_rows_without_soft_delete_column() {
    let h = Harness::new();
    h.seed_fleet();

    let response = h.server.delete("/owners/2").await;
    assert_eq!(response.json::<Value>(), json!({"id": "2"}));
    assert_eq!(h.store.rows(h.entity("owners")).len(), 1);

    let again = h.server.delete("/owners/2").await;
    assert_eq!(again.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let h = Harness::with_settings(serverless_crud::Settings {
        body_limit_bytes: 32,
        ..Default::default()
    });

    let response = h
        .server
        .post("/vehicles")
        .json(&json!({"vin": "VIN010", "model": "a long enough model name to pass the limit"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.store.sessions_opened(), 0);
}
