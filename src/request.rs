//! Proxy-style request: query string, path parameters, headers and a body that may arrive
//! as a JSON string or as an already-decoded object.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

static EMPTY: std::sync::OnceLock<HashMap<String, String>> = std::sync::OnceLock::new();

impl ApiRequest {
    pub fn query(&self) -> &HashMap<String, String> {
        self.query_string_parameters
            .as_ref()
            .unwrap_or_else(|| EMPTY.get_or_init(HashMap::new))
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_parameters.as_ref()?.get(name).map(String::as_str)
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as a JSON object. A missing body is an empty object; a string body is parsed.
    pub fn body_object(&self) -> Result<Map<String, Value>, AppError> {
        let parsed;
        let value = match &self.body {
            None | Some(Value::Null) => return Ok(Map::new()),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(Map::new()),
            Some(Value::String(s)) => {
                parsed = serde_json::from_str::<Value>(s)
                    .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?;
                &parsed
            }
            Some(v) => v,
        };
        match value {
            Value::Object(m) => Ok(m.clone()),
            _ => Err(AppError::BadRequest("body must be a JSON object".into())),
        }
    }

    pub fn with_query(mut self, params: HashMap<String, String>) -> Self {
        self.query_string_parameters = Some(params);
        self
    }

    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        self.path_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}
