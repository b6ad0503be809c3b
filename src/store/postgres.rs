//! PostgreSQL store: one pool per named connection, one transaction per session.

use super::{Row, Session, Store, StoreError};
use crate::config::{ColumnInfo, ConnectionSettings, ResolvedEntity};
use crate::query::QuerySpec;
use crate::sql::{self, QueryBuf};
use crate::value::{ColumnKind, Scalar};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgConnection, PgPool, Postgres, Row as _, Transaction};
use std::str::FromStr;

pub struct PgStore {
    name: String,
    pool: PgPool,
}

impl PgStore {
    /// Build the pool for one connection. Connections are established on first use.
    pub fn connect(settings: &ConnectionSettings) -> Result<Self, StoreError> {
        let mut opts = PgConnectOptions::from_str(&settings.url)?;
        if !settings.debug {
            opts = opts.disable_statement_logging();
        }
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections())
            .max_lifetime(settings.pool_recycle)
            .test_before_acquire(settings.pre_ping)
            .connect_lazy_with(opts);
        tracing::info!(
            connection = %settings.name,
            max_connections = settings.max_connections(),
            "database pool configured"
        );
        Ok(Self::from_pool(settings.name.clone(), pool))
    }

    pub fn from_pool(name: impl Into<String>, pool: PgPool) -> Self {
        PgStore {
            name: name.into(),
            pool,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn open(&self) -> Result<Box<dyn Session>, StoreError> {
        let tx = self.pool.begin().await?;
        tracing::debug!(connection = %self.name, "session opened");
        Ok(Box::new(PgSession { tx: Some(tx) }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Dropping an open session rolls its transaction back.
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::Closed)
    }

    async fn rows(&mut self, entity: &ResolvedEntity, q: &QueryBuf) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(self.conn()?).await?;
        Ok(rows.iter().map(|r| decode_row(entity, r)).collect())
    }

    async fn optional_row(&mut self, entity: &ResolvedEntity, q: &QueryBuf) -> Result<Option<Row>, StoreError> {
        Ok(self.rows(entity, q).await?.into_iter().next())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn fetch_page(&mut self, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<Vec<Row>, StoreError> {
        let q = sql::select_page(entity, spec);
        self.rows(entity, &q).await
    }

    async fn count(&mut self, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<u64, StoreError> {
        let q = sql::count(entity, spec);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let n = query.fetch_one(self.conn()?).await?;
        Ok(n.max(0) as u64)
    }

    async fn find(
        &mut self,
        entity: &ResolvedEntity,
        id: &Scalar,
        exclude_soft_deleted: bool,
    ) -> Result<Option<Row>, StoreError> {
        let q = sql::select_by_id(entity, id, exclude_soft_deleted);
        self.optional_row(entity, &q).await
    }

    async fn fetch_where_in(
        &mut self,
        entity: &ResolvedEntity,
        column: &str,
        values: &[Scalar],
    ) -> Result<Vec<Row>, StoreError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        if entity.column(column).is_none() {
            return Err(StoreError::UnknownColumn(column.to_string()));
        }
        let q = sql::select_by_column_in(entity, column, values);
        self.rows(entity, &q).await
    }

    async fn insert(&mut self, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Row, StoreError> {
        let q = sql::insert(entity, body);
        self.optional_row(entity, &q)
            .await?
            .ok_or_else(|| StoreError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(
        &mut self,
        entity: &ResolvedEntity,
        id: &Scalar,
        body: &Map<String, Value>,
    ) -> Result<Option<Row>, StoreError> {
        let q = sql::update(entity, id, body);
        self.optional_row(entity, &q).await
    }

    async fn soft_delete(&mut self, entity: &ResolvedEntity, id: &Scalar) -> Result<Option<Row>, StoreError> {
        let q = sql::soft_delete(entity, id);
        self.optional_row(entity, &q).await
    }

    async fn delete(&mut self, entity: &ResolvedEntity, id: &Scalar) -> Result<Option<Row>, StoreError> {
        let q = sql::delete(entity, id);
        self.optional_row(entity, &q).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.rollback().await?;
        Ok(())
    }
}

fn decode_row(entity: &ResolvedEntity, row: &PgRow) -> Row {
    entity
        .columns
        .iter()
        .map(|c| (c.name.clone(), decode_cell(entity, row, c)))
        .collect()
}

fn or_null<T>(v: Option<T>, f: impl FnOnce(T) -> Scalar) -> Scalar {
    v.map(f).unwrap_or(Scalar::Null)
}

/// Decode by declared kind; a cell that cannot be decoded becomes null.
fn decode_cell(entity: &ResolvedEntity, row: &PgRow, col: &ColumnInfo) -> Scalar {
    let name = col.name.as_str();
    let decoded: Result<Scalar, sqlx::Error> = match col.kind {
        ColumnKind::Int => row
            .try_get::<Option<i64>, _>(name)
            .or_else(|_| row.try_get::<Option<i32>, _>(name).map(|v| v.map(i64::from)))
            .or_else(|_| row.try_get::<Option<i16>, _>(name).map(|v| v.map(i64::from)))
            .map(|v| or_null(v, Scalar::Int)),
        ColumnKind::Float => row
            .try_get::<Option<f64>, _>(name)
            .or_else(|_| row.try_get::<Option<f32>, _>(name).map(|v| v.map(f64::from)))
            .map(|v| or_null(v, Scalar::Float)),
        ColumnKind::Decimal => row
            .try_get::<Option<Decimal>, _>(name)
            .map(|v| or_null(v, Scalar::Decimal)),
        ColumnKind::Text => row
            .try_get::<Option<String>, _>(name)
            .map(|v| or_null(v, Scalar::Text)),
        ColumnKind::Bool => row.try_get::<Option<bool>, _>(name).map(|v| or_null(v, Scalar::Bool)),
        ColumnKind::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .map(|v| or_null(v, Scalar::Timestamp)),
        ColumnKind::DateTime => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)
            .map(|v| or_null(v, Scalar::DateTime)),
        ColumnKind::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .map(|v| or_null(v, Scalar::Date)),
        ColumnKind::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(name)
            .map(|v| or_null(v, Scalar::Time)),
        ColumnKind::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| or_null(v, Scalar::Uuid)),
        ColumnKind::Binary => row
            .try_get::<Option<Vec<u8>>, _>(name)
            .map(|v| or_null(v, Scalar::Bytes)),
        ColumnKind::Json => row
            .try_get::<Option<Value>, _>(name)
            .map(|v| or_null(v, Scalar::Json)),
    };
    decoded.unwrap_or_else(|e| {
        tracing::warn!(entity = %entity.name, column = %name, error = %e, "column could not be decoded");
        Scalar::Null
    })
}
