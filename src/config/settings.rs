//! Process settings from the environment (`.env` is loaded by the binary).

use crate::error::ConfigError;
use crate::serializer::DEFAULT_MAX_DEPTH;
use std::time::Duration;

/// Pool settings for one named connection, read from `{NAME}_DATABASE_*`.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub name: String,
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_recycle: Duration,
    pub pre_ping: bool,
    pub debug: bool,
}

impl ConnectionSettings {
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub app_name: String,
    pub environment: String,
    pub listen_addr: String,
    pub app_scheme: String,
    pub app_host: String,
    /// Header whose value is prepended to the host in pagination links.
    pub host_prefix_header: String,
    pub entities_path: String,
    pub max_depth: u32,
    pub body_limit_bytes: usize,
    pub connections: Vec<ConnectionSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_name: "App".into(),
            environment: "dev".into(),
            listen_addr: "0.0.0.0:3000".into(),
            app_scheme: "https".into(),
            app_host: "localhost".into(),
            host_prefix_header: "er-company-request".into(),
            entities_path: "sample/entities.json".into(),
            max_depth: DEFAULT_MAX_DEPTH,
            body_limit_bytes: 1024 * 1024,
            connections: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup; unset or unparsable values take defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Settings::default();
        let text = |k: &str, default: String| get(k).filter(|s| !s.is_empty()).unwrap_or(default);

        let names = text("DATABASE_CONNECTIONS", "default".into());
        let mut connections = Vec::new();
        for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let prefix = name.to_uppercase();
            let key = |suffix: &str| format!("{}_DATABASE_{}", prefix, suffix);
            let url = get(&key("CONNECTION_STRING"))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::Load(format!("{} is not set", key("CONNECTION_STRING"))))?;
            connections.push(ConnectionSettings {
                name: name.to_string(),
                url,
                pool_size: parse_or(get(&key("POOL_SIZE")), 20),
                max_overflow: parse_or(get(&key("MAX_OVERFLOW")), 5),
                pool_recycle: Duration::from_secs(parse_or(get(&key("POOL_RECYCLE")), 3600)),
                pre_ping: flag_or(get(&key("POOL_PRE_PING")), true),
                debug: flag_or(get(&key("DEBUG_MODE")), false),
            });
        }

        Ok(Settings {
            app_name: text("APP_NAME", d.app_name),
            environment: text("ENVIRONMENT", d.environment),
            listen_addr: text("LISTEN_ADDR", d.listen_addr),
            app_scheme: text("APP_SCHEME", d.app_scheme),
            app_host: text("APP_HOST", d.app_host),
            host_prefix_header: text("HOST_PREFIX_HEADER", d.host_prefix_header),
            entities_path: text("ENTITIES_PATH", d.entities_path),
            max_depth: parse_or(get("SERIALIZER_MAX_DEPTH"), d.max_depth),
            body_limit_bytes: parse_or(get("BODY_LIMIT_BYTES"), d.body_limit_bytes),
            connections,
        })
    }
}

fn parse_or<T: std::str::FromStr>(v: Option<String>, default: T) -> T {
    v.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn flag_or(v: Option<String>, default: bool) -> bool {
    match v.map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "true" || s == "1" => true,
        Some(s) if s == "false" || s == "0" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn named_connections_read_prefixed_keys() {
        let s = Settings::from_lookup(lookup(&[
            ("DATABASE_CONNECTIONS", "default, reporting"),
            ("DEFAULT_DATABASE_CONNECTION_STRING", "postgres://localhost/app"),
            ("REPORTING_DATABASE_CONNECTION_STRING", "postgres://localhost/rep"),
            ("REPORTING_DATABASE_POOL_SIZE", "3"),
            ("REPORTING_DATABASE_POOL_PRE_PING", "false"),
            ("APP_HOST", "api.example.com"),
        ]))
        .unwrap();
        assert_eq!(s.connections.len(), 2);
        assert_eq!(s.connections[0].max_connections(), 25);
        assert_eq!(s.connections[1].name, "reporting");
        assert_eq!(s.connections[1].pool_size, 3);
        assert!(!s.connections[1].pre_ping);
        assert_eq!(s.app_host, "api.example.com");
        assert_eq!(s.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("DEFAULT_DATABASE_CONNECTION_STRING", "postgres://localhost/app"),
            ("DEFAULT_DATABASE_POOL_SIZE", "many"),
            ("SERIALIZER_MAX_DEPTH", "-1"),
        ]))
        .unwrap();
        assert_eq!(s.connections[0].pool_size, 20);
        assert_eq!(s.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn missing_connection_string_is_an_error() {
        assert!(Settings::from_lookup(lookup(&[])).is_err());
    }
}
