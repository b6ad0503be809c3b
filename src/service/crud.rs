//! Generic CRUD over a store session.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::query::QuerySpec;
use crate::service::RequestValidator;
use crate::store::{Row, Session};
use crate::value::Scalar;
use serde_json::{Map, Value};

pub struct CrudService;

impl CrudService {
    /// One page of rows and the total matching the same predicates.
    pub async fn list(
        session: &mut dyn Session,
        entity: &ResolvedEntity,
        spec: &QuerySpec,
    ) -> Result<(Vec<Row>, u64), AppError> {
        let rows = session.fetch_page(entity, spec).await?;
        let total = session.count(entity, spec).await?;
        Ok((rows, total))
    }

    /// Fetch one live row by primary key.
    pub async fn get_one(
        session: &mut dyn Session,
        entity: &ResolvedEntity,
        id: &Scalar,
    ) -> Result<Row, AppError> {
        session
            .find(entity, id, true)
            .await?
            .ok_or_else(|| not_found(entity, id))
    }

    /// Validate against the store rules, then insert. Returns the created row.
    pub async fn create(
        session: &mut dyn Session,
        entity: &ResolvedEntity,
        body: &Map<String, Value>,
    ) -> Result<Row, AppError> {
        RequestValidator::new(&entity.rules_for_store).validate(body)?;
        check_not_null(entity, body, false)?;
        Ok(session.insert(entity, body).await?)
    }

    /// Validate present fields against the update rules, then apply them. Returns the updated row.
    pub async fn update(
        session: &mut dyn Session,
        entity: &ResolvedEntity,
        id: &Scalar,
        body: &Map<String, Value>,
    ) -> Result<Row, AppError> {
        RequestValidator::new(&entity.rules_for_update).validate_partial(body)?;
        check_not_null(entity, body, true)?;
        session
            .update(entity, id, body)
            .await?
            .ok_or_else(|| not_found(entity, id))
    }

    /// Soft delete when the entity declares a soft-delete column, otherwise remove the row.
    pub async fn remove(
        session: &mut dyn Session,
        entity: &ResolvedEntity,
        id: &Scalar,
    ) -> Result<Row, AppError> {
        let removed = if entity.has_soft_delete() {
            session.soft_delete(entity, id).await?
        } else {
            session.delete(entity, id).await?
        };
        removed.ok_or_else(|| not_found(entity, id))
    }

    /// Parse a path id by the primary key's kind.
    pub fn parse_id(entity: &ResolvedEntity, raw: &str) -> Result<Scalar, AppError> {
        Scalar::parse(entity.pk().kind, raw)
            .map_err(|_| AppError::Validation(format!("invalid {} '{}'", entity.pk_column, raw)))
    }
}

/// NOT NULL columns without a default must be given on insert and never set to null.
fn check_not_null(entity: &ResolvedEntity, body: &Map<String, Value>, partial: bool) -> Result<(), AppError> {
    for c in entity.columns.iter().filter(|c| !c.nullable && !c.has_default) {
        match body.get(&c.name) {
            Some(Value::Null) => return Err(AppError::Validation(format!("{} cannot be null", c.name))),
            None if !partial => return Err(AppError::Validation(format!("{} is required", c.name))),
            _ => {}
        }
    }
    Ok(())
}

fn not_found(entity: &ResolvedEntity, id: &Scalar) -> AppError {
    AppError::NotFound(format!(
        "{} {} not found",
        entity.name,
        id.to_text().unwrap_or_default()
    ))
}
