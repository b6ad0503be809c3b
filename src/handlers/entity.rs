//! Entity handlers: adapt axum extractors to the proxy-shaped controller.

use crate::controller;
use crate::request::ApiRequest;
use crate::response::ApiResponse;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde_json::Value;
use std::collections::HashMap;

fn api_request(
    params: HashMap<String, String>,
    headers: &HeaderMap,
    id: Option<&str>,
    body: Option<Bytes>,
) -> ApiRequest {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let mut req = ApiRequest::default().with_query(params).with_headers(headers);
    if let Some(id) = id {
        req = req.with_path_param("id", id);
    }
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        req = req.with_body(Value::String(String::from_utf8_lossy(&body).into_owned()));
    }
    req
}

pub async fn index(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResponse {
    let req = api_request(params, &headers, None, None);
    controller::index(&state, &path_segment, &req).await
}

pub async fn export(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResponse {
    let req = api_request(params, &headers, None, None);
    controller::export(&state, &path_segment, &req).await
}

pub async fn store(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    let req = api_request(params, &headers, None, Some(body));
    controller::store(&state, &path_segment, &req).await
}

pub async fn find(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResponse {
    let req = api_request(params, &headers, Some(&id), None);
    controller::find(&state, &path_segment, &req).await
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    let req = api_request(params, &headers, Some(&id), Some(body));
    controller::update(&state, &path_segment, &req).await
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResponse {
    let req = api_request(params, &headers, Some(&id), None);
    controller::delete(&state, &path_segment, &req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn builds_proxy_request_from_parts() {
        let mut headers = HeaderMap::new();
        headers.insert("er-company-request", HeaderValue::from_static("acme"));
        let params = HashMap::from([("page".to_string(), "2".to_string())]);
        let req = api_request(params, &headers, Some("5"), Some(Bytes::from_static(b"{\"vin\":\"A\"}")));
        assert_eq!(req.query().get("page").map(String::as_str), Some("2"));
        assert_eq!(req.header("ER-Company-Request"), Some("acme"));
        assert_eq!(req.path_param("id"), Some("5"));
        assert_eq!(req.body_object().unwrap()["vin"], "A");
    }

    #[test]
    fn empty_body_is_absent() {
        let req = api_request(HashMap::new(), &HeaderMap::new(), None, Some(Bytes::new()));
        assert!(req.body.is_none());
    }
}
