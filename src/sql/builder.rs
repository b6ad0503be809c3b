//! Builds parameterized SELECT/COUNT/INSERT/UPDATE/DELETE from a resolved entity and a query spec.

use crate::config::{ColumnInfo, ResolvedEntity};
use crate::query::{Filter, QuerySpec, SearchPattern};
use crate::sql::{json_bind_text, scalar_bind_text};
use crate::value::{ColumnKind, Scalar};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (identifiers come from metadata or are quoted verbatim).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

/// Parameters are bound as text and cast in SQL to the column type.
#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Option<String>) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }

    /// `$n::type` placeholder for a column.
    fn push_cast(&mut self, v: Option<String>, col: Option<&ColumnInfo>) -> String {
        let n = self.push_param(v);
        match col {
            Some(c) => format!("${}::{}", n, c.pg_type),
            None => format!("${}", n),
        }
    }
}

/// SELECT list: custom enum types (schema.typename) come back as text.
fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            if c.pg_type.contains('.') {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// WHERE clause: filters joined by AND, search predicates grouped with the search method.
fn where_clause(q: &mut QueryBuf, entity: &ResolvedEntity, spec: &QuerySpec) -> String {
    let mut parts = Vec::new();
    for f in &spec.filters {
        match f {
            Filter::Equals { column, value } => {
                let ph = q.push_cast(Some(value.clone()), entity.column(column));
                parts.push(format!("{} = {}", quoted(column), ph));
            }
            Filter::IsNull { column } => parts.push(format!("{} IS NULL", quoted(column))),
        }
    }

    let search: Vec<String> = spec
        .search
        .iter()
        .map(|p| match &p.pattern {
            SearchPattern::Like(pattern) => {
                let n = q.push_param(Some(pattern.clone()));
                format!("CAST({} AS TEXT) ILIKE ${}", quoted(&p.column), n)
            }
            SearchPattern::Exact(value) => {
                let ph = q.push_cast(Some(value.clone()), entity.column(&p.column));
                format!("{} = {}", quoted(&p.column), ph)
            }
        })
        .collect();
    match search.len() {
        0 => {}
        1 => parts.extend(search),
        _ => parts.push(format!(
            "({})",
            search.join(&format!(" {} ", spec.search_method.as_sql()))
        )),
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// One page: filters, search, ORDER BY (requested column or pk), LIMIT/OFFSET.
pub fn select_page(entity: &ResolvedEntity, spec: &QuerySpec) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_clause = where_clause(&mut q, entity, spec);
    let order_clause = match &spec.order {
        Some(o) => format!(" ORDER BY {} {}", quoted(&o.column), o.direction.as_sql()),
        None => format!(" ORDER BY {}", quoted(&entity.pk_column)),
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_column_list(entity),
        qualified_table(entity),
        where_clause,
        order_clause,
        spec.per_page,
        spec.offset()
    );
    q
}

/// Total rows matching the same predicates, without paging.
pub fn count(entity: &ResolvedEntity, spec: &QuerySpec) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_clause = where_clause(&mut q, entity, spec);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(entity), where_clause);
    q
}

fn soft_delete_guard(entity: &ResolvedEntity) -> String {
    entity
        .soft_delete_column
        .as_ref()
        .map(|c| format!(" AND {} IS NULL", quoted(c)))
        .unwrap_or_default()
}

/// SELECT by primary key, optionally hiding soft-deleted rows.
pub fn select_by_id(entity: &ResolvedEntity, id: &Scalar, exclude_soft_deleted: bool) -> QueryBuf {
    let mut q = QueryBuf::default();
    let ph = q.push_cast(scalar_bind_text(id), Some(entity.pk()));
    let guard = if exclude_soft_deleted {
        soft_delete_guard(entity)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}{}",
        select_column_list(entity),
        qualified_table(entity),
        quoted(&entity.pk_column),
        ph,
        guard
    );
    q
}

/// SELECT rows WHERE column IN (...) ORDER BY pk. Used for batch-fetching related rows.
pub fn select_by_column_in(entity: &ResolvedEntity, column_name: &str, values: &[Scalar]) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(entity);
    let cols = select_column_list(entity);
    if values.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, table);
        return q;
    }
    let col = entity.column(column_name);
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| q.push_cast(scalar_bind_text(v), col))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        cols,
        table,
        quoted(column_name),
        placeholders.join(", "),
        quoted(&entity.pk_column)
    );
    q
}

/// INSERT: every column, except a pk or defaulted column the body leaves out.
pub fn insert(entity: &ResolvedEntity, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = body.get(&c.name);
        if val.is_none() && (c.has_default || c.is_pk) {
            continue;
        }
        let ph = q.push_cast(val.and_then(json_bind_text), Some(c));
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let table = qualified_table(entity);
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only declared, non-pk columns present in body. Soft-deleted rows are untouched.
pub fn update(entity: &ResolvedEntity, id: &Scalar, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.is_pk {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let rhs = q.push_cast(json_bind_text(v), Some(c));
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    if sets.is_empty() {
        return select_by_id(entity, id, true);
    }
    let id_ph = q.push_cast(scalar_bind_text(id), Some(entity.pk()));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}{} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(&entity.pk_column),
        id_ph,
        soft_delete_guard(entity),
        select_column_list(entity)
    );
    q
}

/// Mark a row deleted by setting its soft-delete column. Callers check `has_soft_delete` first.
pub fn soft_delete(entity: &ResolvedEntity, id: &Scalar) -> QueryBuf {
    let mut q = QueryBuf::default();
    let column = entity.soft_delete_column.as_deref().unwrap_or_default();
    let now = match entity.column(column).map(|c| c.kind) {
        Some(ColumnKind::Date) => "CURRENT_DATE",
        _ => "NOW()",
    };
    let id_ph = q.push_cast(scalar_bind_text(id), Some(entity.pk()));
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {} = {}{} RETURNING {}",
        qualified_table(entity),
        quoted(column),
        now,
        quoted(&entity.pk_column),
        id_ph,
        soft_delete_guard(entity),
        select_column_list(entity)
    );
    q
}

/// DELETE by id.
pub fn delete(entity: &ResolvedEntity, id: &Scalar) -> QueryBuf {
    let mut q = QueryBuf::default();
    let id_ph = q.push_cast(scalar_bind_text(id), Some(entity.pk()));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        quoted(&entity.pk_column),
        id_ph,
        select_column_list(entity)
    );
    q
}
