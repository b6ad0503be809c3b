//! Offset pagination envelope with navigation links.

use serde::Serialize;
use serde_json::Value;

/// Where page links point: `{scheme}://{prefix.}{host}/{path}`.
#[derive(Clone, Debug)]
pub struct LinkBase {
    base: String,
}

impl LinkBase {
    pub fn new(scheme: &str, host: &str, prefix: Option<&str>, path: &str) -> Self {
        let host = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => format!("{}.{}", p, host),
            None => host.to_string(),
        };
        LinkBase {
            base: format!("{}://{}/{}", scheme, host, path),
        }
    }

    pub fn page_url(&self, page: u64, per_page: u32) -> String {
        format!("{}?page={}&per_page={}", self.base, page, per_page)
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Page {
    pub data: Vec<Value>,
    pub first_page_url: Option<String>,
    pub last_page_url: Option<String>,
    pub next_page_url: Option<String>,
    pub prev_page_url: Option<String>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl Page {
    /// An empty page reports zeros and no links, whatever was requested.
    pub fn new(data: Vec<Value>, page: u32, per_page: u32, total: u64, links: &LinkBase) -> Self {
        if data.is_empty() || per_page == 0 {
            return Page::empty();
        }
        let current = page as u64;
        let last = total.div_ceil(per_page as u64);
        Page {
            data,
            first_page_url: Some(links.page_url(1, per_page)),
            last_page_url: Some(links.page_url(last, per_page)),
            next_page_url: (current * (per_page as u64) < total)
                .then(|| links.page_url(current + 1, per_page)),
            prev_page_url: (page > 1).then(|| links.page_url(current - 1, per_page)),
            current_page: page,
            per_page,
            total,
        }
    }

    pub fn into_json(self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn empty() -> Self {
        Page {
            data: Vec::new(),
            first_page_url: None,
            last_page_url: None,
            next_page_url: None,
            prev_page_url: None,
            current_page: 0,
            per_page: 0,
            total: 0,
        }
    }
}
