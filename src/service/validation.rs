//! Body validation against an entity's configured rules.

use crate::config::ValidationRule;
use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct RequestValidator<'a> {
    rules: &'a HashMap<String, ValidationRule>,
}

impl<'a> RequestValidator<'a> {
    pub fn new(rules: &'a HashMap<String, ValidationRule>) -> Self {
        RequestValidator { rules }
    }

    /// Check every rule; `required` fields must be present and non-null.
    /// Columns are checked in name order so the first reported failure is stable.
    pub fn validate(&self, body: &Map<String, Value>) -> Result<(), AppError> {
        for (col, rule) in self.sorted() {
            match body.get(col) {
                None | Some(Value::Null) if rule.required == Some(true) => {
                    return Err(AppError::Validation(format!("{} is required", col)));
                }
                Some(v) => check(col, v, rule)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Check only fields present in the body; absent fields are never required.
    pub fn validate_partial(&self, body: &Map<String, Value>) -> Result<(), AppError> {
        for (col, rule) in self.sorted() {
            if let Some(v) = body.get(col) {
                check(col, v, rule)?;
            }
        }
        Ok(())
    }

    fn sorted(&self) -> Vec<(&'a str, &'a ValidationRule)> {
        let mut rules: Vec<_> = self.rules.iter().map(|(k, v)| (k.as_str(), v)).collect();
        rules.sort_by_key(|(k, _)| *k);
        rules
    }
}

fn invalid(msg: String) -> AppError {
    AppError::Validation(msg)
}

fn check(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let (Some(format), Some(s)) = (&rule.format, v.as_str()) {
        check_format(col, s, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length.filter(|m| len > *m as usize) {
            return Err(invalid(format!("{} must be at most {} characters", col, max)));
        }
        if let Some(min) = rule.min_length.filter(|m| len < *m as usize) {
            return Err(invalid(format!("{} must be at least {} characters", col, min)));
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| invalid(format!("invalid pattern for {}", col)))?;
            if !re.is_match(s) {
                return Err(invalid(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| same_value(v, a)) {
            return Err(invalid(format!(
                "{} must be one of: {}",
                col,
                allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum.filter(|m| n < *m) {
            return Err(invalid(format!("{} must be at least {}", col, min)));
        }
        if let Some(max) = rule.maximum.filter(|m| n > *m) {
            return Err(invalid(format!("{} must be at most {}", col, max)));
        }
    }
    Ok(())
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(col: &str, s: &str, format: &str) -> Result<(), AppError> {
    let ok = match format.to_lowercase().as_str() {
        "email" => s.len() >= 3 && s.split_once('@').is_some_and(|(user, host)| !user.is_empty() && !host.is_empty()),
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(invalid(format!("{} must be a valid {}", col, format.to_lowercase())))
    }
}
