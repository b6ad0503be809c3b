//! Storage seam: named stores open sessions; a session is one unit of work that ends in
//! commit or rollback.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::ResolvedEntity;
use crate::query::QuerySpec;
use crate::value::Scalar;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// One row keyed by column name.
pub type Row = BTreeMap<String, Scalar>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("conversion: {0}")]
    Conversion(String),
    #[error("session is closed")]
    Closed,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Session>, StoreError>;

    /// Cheap connectivity check used by readiness.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Operations available inside one unit of work. After `commit` or `rollback` every
/// call returns `StoreError::Closed`.
#[async_trait]
pub trait Session: Send {
    async fn fetch_page(&mut self, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<Vec<Row>, StoreError>;

    async fn count(&mut self, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<u64, StoreError>;

    async fn find(
        &mut self,
        entity: &ResolvedEntity,
        id: &Scalar,
        exclude_soft_deleted: bool,
    ) -> Result<Option<Row>, StoreError>;

    async fn fetch_where_in(
        &mut self,
        entity: &ResolvedEntity,
        column: &str,
        values: &[Scalar],
    ) -> Result<Vec<Row>, StoreError>;

    async fn insert(&mut self, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Row, StoreError>;

    async fn update(
        &mut self,
        entity: &ResolvedEntity,
        id: &Scalar,
        body: &Map<String, Value>,
    ) -> Result<Option<Row>, StoreError>;

    async fn soft_delete(&mut self, entity: &ResolvedEntity, id: &Scalar) -> Result<Option<Row>, StoreError>;

    async fn delete(&mut self, entity: &ResolvedEntity, id: &Scalar) -> Result<Option<Row>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Stores by connection name.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn Store>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, store: Arc<dyn Store>) {
        self.stores.insert(name.into(), store);
    }

    pub fn with(mut self, name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        self.insert(name, store);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Store>> {
        self.stores.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Store>)> {
        self.stores.iter().map(|(k, v)| (k.as_str(), v))
    }
}
