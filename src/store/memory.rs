//! In-memory store. Each session reads and writes a copy of the tables; commit applies only
//! the rows the session touched to the committed tables and rollback discards the copy.
//! Open sessions are counted so callers can check every one was closed.

use super::{Row, Session, Store, StoreError};
use crate::config::{ColumnInfo, ResolvedEntity};
use crate::query::{Filter, QuerySpec, SearchMethod, SearchPattern};
use crate::value::{ColumnKind, Scalar};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    open: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    failing: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed committed rows from JSON objects. Missing integer or uuid keys are generated.
    pub fn seed(&self, entity: &ResolvedEntity, rows: Value) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let items = match rows {
            Value::Array(items) => items,
            other => vec![other],
        };
        for item in items {
            let body = match item {
                Value::Object(m) => m,
                other => return Err(StoreError::Conversion(format!("seed row is not an object: {}", other))),
            };
            insert_row(&mut tables, entity, &body)?;
        }
        Ok(())
    }

    /// Committed rows of an entity.
    pub fn rows(&self, entity: &ResolvedEntity) -> Vec<Row> {
        self.lock().rows.get(&entity.path_segment).cloned().unwrap_or_default()
    }

    /// Sessions opened and not yet committed, rolled back or dropped.
    pub fn open_sessions(&self) -> usize {
        self.open.load(AtomicOrdering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(AtomicOrdering::SeqCst)
    }

    /// Make the named session operation (`insert`, `fetch_page`, ...) fail from now on.
    pub fn fail_on(&self, operation: &str) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = Some(operation.to_string());
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn open(&self) -> Result<Box<dyn Session>, StoreError> {
        let working = self.lock().clone();
        self.open.fetch_add(1, AtomicOrdering::SeqCst);
        self.opened.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(MemorySession {
            store: self.clone(),
            working: Some(working),
            touched: BTreeMap::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Touch {
    Inserted,
    Changed,
}

/// Rows a session wrote in one table, by primary key text.
#[derive(Debug)]
struct Touched {
    pk_column: String,
    keys: BTreeMap<String, Touch>,
}

pub struct MemorySession {
    store: MemoryStore,
    working: Option<Tables>,
    touched: BTreeMap<String, Touched>,
}

impl MemorySession {
    fn tables(&mut self, operation: &str) -> Result<&mut Tables, StoreError> {
        let failing = self.store.failing.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if failing.as_deref() == Some(operation) {
            return Err(StoreError::Db(sqlx::Error::Protocol(format!("{} failed", operation))));
        }
        self.working.as_mut().ok_or(StoreError::Closed)
    }

    fn mark(&mut self, entity: &ResolvedEntity, row: &Row, touch: Touch) {
        let key = cell(row, &entity.pk_column).to_text().unwrap_or_default();
        let touched = self
            .touched
            .entry(entity.path_segment.clone())
            .or_insert_with(|| Touched {
                pk_column: entity.pk_column.clone(),
                keys: BTreeMap::new(),
            });
        touched.keys.entry(key).or_insert(touch);
    }

    fn close(&mut self) -> Result<Tables, StoreError> {
        let tables = self.working.take().ok_or(StoreError::Closed)?;
        self.store.open.fetch_sub(1, AtomicOrdering::SeqCst);
        Ok(tables)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.working.take().is_some() {
            self.store.open.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn fetch_page(&mut self, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables("fetch_page")?;
        let mut rows = matching(tables, entity, spec)?;
        let (column, desc) = match &spec.order {
            Some(o) => {
                if entity.column(&o.column).is_none() {
                    return Err(StoreError::UnknownColumn(o.column.clone()));
                }
                (o.column.as_str(), o.direction == crate::query::Direction::Desc)
            }
            None => (entity.pk_column.as_str(), false),
        };
        rows.sort_by(|a, b| {
            let ord = compare(cell(a, column), cell(b, column));
            if desc {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(rows
            .into_iter()
            .skip(spec.offset() as usize)
            .take(spec.per_page as usize)
            .collect())
    }

    async fn count(&mut self, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<u64, StoreError> {
        let tables = self.tables("count")?;
        Ok(matching(tables, entity, spec)?.len() as u64)
    }

    async fn find(
        &mut self,
        entity: &ResolvedEntity,
        id: &Scalar,
        exclude_soft_deleted: bool,
    ) -> Result<Option<Row>, StoreError> {
        let tables = self.tables("find")?;
        Ok(position(tables, entity, id, exclude_soft_deleted)
            .and_then(|i| tables.rows.get(&entity.path_segment).map(|rows| rows[i].clone())))
    }

    async fn fetch_where_in(
        &mut self,
        entity: &ResolvedEntity,
        column: &str,
        values: &[Scalar],
    ) -> Result<Vec<Row>, StoreError> {
        if entity.column(column).is_none() {
            return Err(StoreError::UnknownColumn(column.to_string()));
        }
        let tables = self.tables("fetch_where_in")?;
        let wanted: Vec<String> = values.iter().filter_map(Scalar::to_text).collect();
        let mut rows: Vec<Row> = tables
            .rows
            .get(&entity.path_segment)
            .map(|rows| {
                rows.iter()
                    .filter(|r| cell(r, column).to_text().is_some_and(|t| wanted.contains(&t)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| compare(cell(a, &entity.pk_column), cell(b, &entity.pk_column)));
        Ok(rows)
    }

    async fn insert(&mut self, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Row, StoreError> {
        let tables = self.tables("insert")?;
        let row = insert_row(tables, entity, body)?;
        self.mark(entity, &row, Touch::Inserted);
        Ok(row)
    }

    async fn update(
        &mut self,
        entity: &ResolvedEntity,
        id: &Scalar,
        body: &Map<String, Value>,
    ) -> Result<Option<Row>, StoreError> {
        let tables = self.tables("update")?;
        let Some(i) = position(tables, entity, id, true) else {
            return Ok(None);
        };
        let mut updated = Vec::new();
        for c in entity.columns.iter().filter(|c| !c.is_pk) {
            if let Some(v) = body.get(&c.name) {
                updated.push((c.name.clone(), to_scalar(c, v)?));
            }
        }
        let Some(row) = tables.rows.get_mut(&entity.path_segment).and_then(|rows| rows.get_mut(i)) else {
            return Ok(None);
        };
        row.extend(updated);
        let row = row.clone();
        self.mark(entity, &row, Touch::Changed);
        Ok(Some(row))
    }

    async fn soft_delete(&mut self, entity: &ResolvedEntity, id: &Scalar) -> Result<Option<Row>, StoreError> {
        let tables = self.tables("soft_delete")?;
        let Some(column) = entity.soft_delete_column.as_deref().and_then(|c| entity.column(c)) else {
            return Err(StoreError::UnknownColumn(String::from("soft delete column")));
        };
        let Some(i) = position(tables, entity, id, true) else {
            return Ok(None);
        };
        let now = Utc::now();
        let stamp = match column.kind {
            ColumnKind::Date => Scalar::Date(now.date_naive()),
            ColumnKind::DateTime => Scalar::DateTime(now.naive_utc()),
            _ => Scalar::Timestamp(now),
        };
        let Some(row) = tables.rows.get_mut(&entity.path_segment).and_then(|rows| rows.get_mut(i)) else {
            return Ok(None);
        };
        row.insert(column.name.clone(), stamp);
        let row = row.clone();
        self.mark(entity, &row, Touch::Changed);
        Ok(Some(row))
    }

    async fn delete(&mut self, entity: &ResolvedEntity, id: &Scalar) -> Result<Option<Row>, StoreError> {
        let tables = self.tables("delete")?;
        let Some(i) = position(tables, entity, id, false) else {
            return Ok(None);
        };
        let removed = tables.rows.get_mut(&entity.path_segment).map(|rows| rows.remove(i));
        if let Some(row) = &removed {
            self.mark(entity, row, Touch::Changed);
        }
        Ok(removed)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let working = self.close()?;
        let touched = std::mem::take(&mut self.touched);
        if touched.is_empty() {
            return Ok(());
        }
        let mut committed = self.store.lock();
        publish(&mut committed, &working, &touched)
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.touched.clear();
        self.close().map(|_| ())
    }
}

static NULL: Scalar = Scalar::Null;

fn find_key(rows: &[Row], pk_column: &str, key: &str) -> Option<usize> {
    rows.iter()
        .position(|r| cell(r, pk_column).to_text().as_deref() == Some(key))
}

/// Apply the touched rows of `working` to `committed`. Inserts whose key was committed by
/// another session in the meantime fail the whole commit.
fn publish(
    committed: &mut Tables,
    working: &Tables,
    touched: &BTreeMap<String, Touched>,
) -> Result<(), StoreError> {
    for (table, t) in touched {
        let current = committed.rows.get(table).map(Vec::as_slice).unwrap_or_default();
        let source = working.rows.get(table).map(Vec::as_slice).unwrap_or_default();
        for (key, touch) in &t.keys {
            if *touch == Touch::Inserted
                && find_key(source, &t.pk_column, key).is_some()
                && find_key(current, &t.pk_column, key).is_some()
            {
                return Err(StoreError::Db(sqlx::Error::Protocol(format!(
                    "duplicate key {} in {}",
                    key, table
                ))));
            }
        }
    }
    for (table, t) in touched {
        let source = working.rows.get(table).map(Vec::as_slice).unwrap_or_default();
        let target = committed.rows.entry(table.clone()).or_default();
        for key in t.keys.keys() {
            let written = find_key(source, &t.pk_column, key).map(|i| source[i].clone());
            match (find_key(target, &t.pk_column, key), written) {
                (Some(i), Some(row)) => target[i] = row,
                (Some(i), None) => {
                    target.remove(i);
                }
                (None, Some(row)) => target.push(row),
                (None, None) => {}
            }
        }
    }
    Ok(())
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Scalar {
    row.get(column).unwrap_or(&NULL)
}

fn to_scalar(col: &ColumnInfo, v: &Value) -> Result<Scalar, StoreError> {
    Scalar::from_json(col.kind, v).map_err(|e| StoreError::Conversion(format!("{}: {}", col.name, e)))
}

fn insert_row(tables: &mut Tables, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Row, StoreError> {
    let rows = tables.rows.entry(entity.path_segment.clone()).or_default();
    let mut row = Row::new();
    for c in &entity.columns {
        let value = match body.get(&c.name) {
            Some(v) => to_scalar(c, v)?,
            None if c.is_pk => next_key(rows, c)?,
            None => Scalar::Null,
        };
        row.insert(c.name.clone(), value);
    }
    let key = cell(&row, &entity.pk_column).clone();
    if rows.iter().any(|r| cell(r, &entity.pk_column) == &key) {
        return Err(StoreError::Db(sqlx::Error::Protocol(format!(
            "duplicate key {:?} in {}",
            key, entity.table_name
        ))));
    }
    rows.push(row.clone());
    Ok(row)
}

fn next_key(rows: &[Row], pk: &ColumnInfo) -> Result<Scalar, StoreError> {
    match pk.kind {
        ColumnKind::Int => {
            let max = rows
                .iter()
                .filter_map(|r| match r.get(&pk.name) {
                    Some(Scalar::Int(n)) => Some(*n),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            Ok(Scalar::Int(max + 1))
        }
        ColumnKind::Uuid => Ok(Scalar::Uuid(uuid::Uuid::new_v4())),
        _ => Err(StoreError::Conversion(format!("{} is required", pk.name))),
    }
}

fn position(tables: &Tables, entity: &ResolvedEntity, id: &Scalar, exclude_soft_deleted: bool) -> Option<usize> {
    let rows = tables.rows.get(&entity.path_segment)?;
    rows.iter().position(|r| {
        let live = !exclude_soft_deleted
            || entity
                .soft_delete_column
                .as_deref()
                .map_or(true, |c| cell(r, c).is_null());
        live && cell(r, &entity.pk_column).to_text() == id.to_text()
    })
}

/// Filter values and exact search terms are parsed by column kind first; text that does not
/// parse is a conversion error, as a failed cast is in SQL.
fn matching(tables: &Tables, entity: &ResolvedEntity, spec: &QuerySpec) -> Result<Vec<Row>, StoreError> {
    let typed = |column: &str, text: &str| -> Result<Scalar, StoreError> {
        let col = entity
            .column(column)
            .ok_or_else(|| StoreError::UnknownColumn(column.to_string()))?;
        Scalar::parse(col.kind, text).map_err(|e| StoreError::Conversion(format!("{}: {}", column, e)))
    };

    let mut equals = Vec::new();
    let mut null_columns = Vec::new();
    for f in &spec.filters {
        match f {
            Filter::Equals { column, value } => equals.push((column.as_str(), typed(column, value)?)),
            Filter::IsNull { column } => null_columns.push(column.as_str()),
        }
    }
    let mut search = Vec::new();
    for p in &spec.search {
        let term = match &p.pattern {
            SearchPattern::Like(pattern) => Term::Like(pattern.as_str()),
            SearchPattern::Exact(text) => Term::Exact(typed(&p.column, text)?),
        };
        search.push((p.column.as_str(), term));
    }

    let Some(rows) = tables.rows.get(&entity.path_segment) else {
        return Ok(Vec::new());
    };
    Ok(rows
        .iter()
        .filter(|r| {
            equals.iter().all(|(column, value)| !value.is_null() && cell(r, column) == value)
                && null_columns.iter().all(|column| cell(r, column).is_null())
        })
        .filter(|r| {
            if search.is_empty() {
                return true;
            }
            let mut hits = search.iter().map(|(column, term)| {
                let value = cell(r, column);
                match term {
                    Term::Like(pattern) => value.to_text().is_some_and(|t| like(&t, pattern)),
                    Term::Exact(exact) => !exact.is_null() && value == exact,
                }
            });
            match spec.search_method {
                SearchMethod::And => hits.all(|h| h),
                SearchMethod::Or => hits.any(|h| h),
            }
        })
        .cloned()
        .collect())
}

enum Term<'a> {
    Like(&'a str),
    Exact(Scalar),
}

/// Nulls first, numbers numerically, everything else by text.
fn compare(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Null, Scalar::Null) => Ordering::Equal,
        (Scalar::Null, _) => Ordering::Less,
        (_, Scalar::Null) => Ordering::Greater,
        (Scalar::Int(x), Scalar::Int(y)) => x.cmp(y),
        (Scalar::Decimal(x), Scalar::Decimal(y)) => x.cmp(y),
        (Scalar::Float(x), Scalar::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Scalar::Timestamp(x), Scalar::Timestamp(y)) => x.cmp(y),
        _ => a.to_text().cmp(&b.to_text()),
    }
}

/// Case-insensitive SQL LIKE with `%` and `_`.
fn like(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    // dp[j]: pattern prefix of length j matches the text prefix consumed so far
    let mut dp = vec![false; p.len() + 1];
    dp[0] = true;
    for j in 1..=p.len() {
        dp[j] = dp[j - 1] && p[j - 1] == '%';
    }
    for c in &t {
        let mut next = vec![false; p.len() + 1];
        for j in 1..=p.len() {
            next[j] = match p[j - 1] {
                '%' => next[j - 1] || dp[j],
                '_' => dp[j - 1],
                pc => dp[j - 1] && pc == *c,
            };
        }
        dp = next;
    }
    dp[p.len()]
}
