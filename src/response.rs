//! Proxy-style response: status code, string body and headers. Answers over HTTP too.

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const GENERIC_ERROR: &str = "Cannot make the request";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub is_base64_encoded: bool,
}

fn default_headers(content_type: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("content-type".to_string(), content_type.to_string()),
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
    ])
}

impl ApiResponse {
    /// JSON response with the default content type and CORS headers.
    pub fn json(status: StatusCode, body: &Value) -> Self {
        ApiResponse {
            status_code: status.as_u16(),
            body: body.to_string(),
            headers: default_headers("application/json"),
            is_base64_encoded: false,
        }
    }

    /// `{"message": ...}` body.
    pub fn message(status: StatusCode, message: &str) -> Self {
        Self::json(status, &json!({ "message": message }))
    }

    pub fn csv(filename: &str, content: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/csv".to_string());
        headers.insert(
            "Content-Disposition".to_string(),
            format!("attachment; filename={}", filename),
        );
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());
        ApiResponse {
            status_code: StatusCode::OK.as_u16(),
            body: content,
            headers,
            is_base64_encoded: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Body parsed as JSON; `Value::Null` when it is not JSON.
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (k, v) in &self.headers {
            match (HeaderName::try_from(k.as_str()), HeaderValue::from_str(v)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %k, "dropping invalid response header"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_proxy_shape() {
        let r = ApiResponse::message(StatusCode::UNPROCESSABLE_ENTITY, GENERIC_ERROR);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["statusCode"], json!(422));
        assert_eq!(v["isBase64Encoded"], json!(false));
        assert_eq!(v["headers"]["content-type"], json!("application/json"));
        assert_eq!(v["headers"]["Access-Control-Allow-Origin"], json!("*"));
        assert_eq!(r.json_body(), json!({"message": "Cannot make the request"}));
    }

    #[test]
    fn converts_to_http_response() {
        let r = ApiResponse::csv("export_20240101000000.csv", "a,b\n1,2\n".into()).into_response();
        assert_eq!(r.status(), StatusCode::OK);
        assert_eq!(r.headers()["content-type"], "text/csv");
        assert_eq!(
            r.headers()["content-disposition"],
            "attachment; filename=export_20240101000000.csv"
        );
    }
}
