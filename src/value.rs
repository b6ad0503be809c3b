//! Column kinds and the scalar values rows are made of, with JSON coercion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

/// Storage kind of a column, inferred from its SQL type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Decimal,
    Text,
    Bool,
    Timestamp,
    DateTime,
    Date,
    Time,
    Uuid,
    Binary,
    Json,
}

impl ColumnKind {
    /// Infer the kind from a PostgreSQL type name such as `varchar(128)` or `numeric(10,2)`.
    pub fn from_sql_type(ty: &str) -> Self {
        let lower = ty.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();
        match base {
            "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "serial"
            | "bigserial" | "smallserial" => ColumnKind::Int,
            "real" | "float4" | "float8" | "double precision" | "float" => ColumnKind::Float,
            "numeric" | "decimal" | "money" => ColumnKind::Decimal,
            "boolean" | "bool" => ColumnKind::Bool,
            "timestamptz" | "timestamp with time zone" => ColumnKind::Timestamp,
            "timestamp" | "timestamp without time zone" => ColumnKind::DateTime,
            "date" => ColumnKind::Date,
            "time" | "time without time zone" => ColumnKind::Time,
            "uuid" => ColumnKind::Uuid,
            "bytea" => ColumnKind::Binary,
            "json" | "jsonb" => ColumnKind::Json,
            _ => ColumnKind::Text,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ColumnKind::Timestamp | ColumnKind::DateTime | ColumnKind::Date
        )
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ValueError {
    #[error("'{value}' is not a valid {kind:?}")]
    Parse { kind: ColumnKind, value: String },
    #[error("value is not representable as JSON")]
    Unrepresentable,
}

/// One cell of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(uuid::Uuid),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Parse query-string or path text into a value of the given kind.
    pub fn parse(kind: ColumnKind, s: &str) -> Result<Scalar, ValueError> {
        let err = || ValueError::Parse {
            kind,
            value: s.to_string(),
        };
        Ok(match kind {
            ColumnKind::Int => Scalar::Int(s.trim().parse().map_err(|_| err())?),
            ColumnKind::Float => Scalar::Float(s.trim().parse().map_err(|_| err())?),
            ColumnKind::Decimal => Scalar::Decimal(Decimal::from_str(s.trim()).map_err(|_| err())?),
            ColumnKind::Text => Scalar::Text(s.to_string()),
            ColumnKind::Bool => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "t" => Scalar::Bool(true),
                "false" | "0" | "f" => Scalar::Bool(false),
                _ => return Err(err()),
            },
            ColumnKind::Timestamp => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                    Scalar::Timestamp(dt.with_timezone(&Utc))
                } else {
                    Scalar::Timestamp(parse_naive_datetime(s).ok_or_else(err)?.and_utc())
                }
            }
            ColumnKind::DateTime => Scalar::DateTime(parse_naive_datetime(s).ok_or_else(err)?),
            ColumnKind::Date => {
                Scalar::Date(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| err())?)
            }
            ColumnKind::Time => {
                Scalar::Time(NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").map_err(|_| err())?)
            }
            ColumnKind::Uuid => Scalar::Uuid(uuid::Uuid::parse_str(s.trim()).map_err(|_| err())?),
            ColumnKind::Binary => Scalar::Bytes(s.as_bytes().to_vec()),
            ColumnKind::Json => {
                Scalar::Json(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
            }
        })
    }

    /// Convert a request-body value into a value of the given kind.
    pub fn from_json(kind: ColumnKind, v: &Value) -> Result<Scalar, ValueError> {
        match (kind, v) {
            (_, Value::Null) => Ok(Scalar::Null),
            (ColumnKind::Json, v) => Ok(Scalar::Json(v.clone())),
            (ColumnKind::Bool, Value::Bool(b)) => Ok(Scalar::Bool(*b)),
            (ColumnKind::Int, Value::Number(n)) => n.as_i64().map(Scalar::Int).ok_or(ValueError::Parse {
                kind,
                value: n.to_string(),
            }),
            (ColumnKind::Float, Value::Number(n)) => n.as_f64().map(Scalar::Float).ok_or(ValueError::Parse {
                kind,
                value: n.to_string(),
            }),
            (ColumnKind::Text, Value::Number(n)) => Ok(Scalar::Text(n.to_string())),
            (ColumnKind::Text, Value::Bool(b)) => Ok(Scalar::Text(b.to_string())),
            (_, Value::String(s)) => Scalar::parse(kind, s),
            (_, Value::Number(n)) => Scalar::parse(kind, &n.to_string()),
            (_, other) => Err(ValueError::Parse {
                kind,
                value: other.to_string(),
            }),
        }
    }

    /// JSON form used by the serializer.
    pub fn to_json(&self) -> Result<Value, ValueError> {
        Ok(match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(n) => Value::Number((*n).into()),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or(ValueError::Unrepresentable)?,
            Scalar::Decimal(d) => decimal_to_json(d)?,
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Timestamp(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
            Scalar::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Scalar::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Scalar::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            Scalar::Uuid(u) => Value::String(u.to_string()),
            Scalar::Bytes(b) => Value::String(
                String::from_utf8(b.clone()).map_err(|_| ValueError::Unrepresentable)?,
            ),
            Scalar::Json(v) => v.clone(),
        })
    }

    /// Plain text form; `None` for null. Used for comparisons, keys and CSV cells.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            Scalar::Null => return None,
            Scalar::Text(s) => s.clone(),
            Scalar::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Scalar::Json(v) => v.to_string(),
            other => match other.to_json() {
                Ok(Value::String(s)) => s,
                Ok(v) => v.to_string(),
                Err(_) => return None,
            },
        })
    }
}

fn decimal_to_json(d: &Decimal) -> Result<Value, ValueError> {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Ok(Value::Number(i.into()));
        }
    }
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or(ValueError::Unrepresentable)
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
