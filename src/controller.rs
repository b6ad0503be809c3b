//! Request handlers in proxy form: each takes an [`ApiRequest`] for one entity path and
//! always answers with an [`ApiResponse`]. Every store session opened here is committed on
//! success and rolled back on failure before the response is built.

use crate::config::ResolvedEntity;
use crate::error::{AppError, ConfigError};
use crate::graph::EntityGraph;
use crate::pagination::{LinkBase, Page};
use crate::query::QuerySpec;
use crate::request::ApiRequest;
use crate::response::{ApiResponse, GENERIC_ERROR};
use crate::serializer::{encode_flat, RelationEncoder};
use crate::service::{export_csv, export_filename, CrudService};
use crate::state::AppState;
use crate::store::{Row, Session};
use axum::http::StatusCode;
use serde_json::{json, Value};

/// `GET /{path}`: one page of rows in the pagination envelope.
pub async fn index(state: &AppState, path: &str, request: &ApiRequest) -> ApiResponse {
    let entity = match lookup(state, path) {
        Ok(e) => e,
        Err(r) => return r,
    };
    let spec = QuerySpec::from_params(entity, request.query());
    let settings = &state.settings;
    let links = LinkBase::new(
        &settings.app_scheme,
        &settings.app_host,
        request.header(&settings.host_prefix_header),
        &entity.path_segment,
    );
    respond(entity, "index", run_index(state, entity, &spec, &links).await)
}

/// `GET /{path}/{id}`.
pub async fn find(state: &AppState, path: &str, request: &ApiRequest) -> ApiResponse {
    let entity = match lookup(state, path) {
        Ok(e) => e,
        Err(r) => return r,
    };
    let spec = QuerySpec::from_params(entity, request.query());
    respond(entity, "find", run_find(state, entity, &spec, request).await)
}

/// `POST /{path}`: validate against the store rules, then insert.
pub async fn store(state: &AppState, path: &str, request: &ApiRequest) -> ApiResponse {
    let entity = match lookup(state, path) {
        Ok(e) => e,
        Err(r) => return r,
    };
    respond(entity, "store", run_store(state, entity, request).await)
}

/// `PUT|PATCH /{path}/{id}`.
pub async fn update(state: &AppState, path: &str, request: &ApiRequest) -> ApiResponse {
    let entity = match lookup(state, path) {
        Ok(e) => e,
        Err(r) => return r,
    };
    respond(entity, "update", run_update(state, entity, request).await)
}

/// `DELETE /{path}/{id}`: soft delete when declared; answers `{"id": <path id>}`.
pub async fn delete(state: &AppState, path: &str, request: &ApiRequest) -> ApiResponse {
    let entity = match lookup(state, path) {
        Ok(e) => e,
        Err(r) => return r,
    };
    respond(entity, "delete", run_delete(state, entity, request).await)
}

/// `GET /{path}/export`: the filtered page as CSV.
pub async fn export(state: &AppState, path: &str, request: &ApiRequest) -> ApiResponse {
    let entity = match lookup(state, path) {
        Ok(e) => e,
        Err(r) => return r,
    };
    let spec = QuerySpec::from_params(entity, request.query());
    match run_export(state, entity, &spec).await {
        Ok(Some(csv)) => ApiResponse::csv(&export_filename(chrono::Utc::now()), csv),
        Ok(None) => ApiResponse::message(StatusCode::BAD_REQUEST, "No data provided"),
        Err(e) => {
            tracing::error!(entity = %entity.name, error = %e, "csv export failed");
            ApiResponse::json(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "error": e.to_string() }))
        }
    }
}

fn lookup<'a>(state: &'a AppState, path: &str) -> Result<&'a ResolvedEntity, ApiResponse> {
    state.model.entity_by_path(path).ok_or_else(|| {
        ApiResponse::message(StatusCode::NOT_FOUND, &format!("unknown resource '{}'", path))
    })
}

fn respond(entity: &ResolvedEntity, operation: &str, result: Result<Value, AppError>) -> ApiResponse {
    match result {
        Ok(body) => ApiResponse::json(StatusCode::OK, &body),
        Err(e) => error_response(entity, operation, e),
    }
}

/// Domain errors keep their status and message; everything else is logged and answered
/// with the generic 422.
pub fn error_response(entity: &ResolvedEntity, operation: &str, e: AppError) -> ApiResponse {
    match e.domain_status() {
        Some(status) => {
            tracing::warn!(entity = %entity.name, operation, status = status.as_u16(), error = %e, "request rejected");
            ApiResponse::message(status, &e.client_message())
        }
        None => {
            tracing::error!(entity = %entity.name, operation, error = %e, "{}", GENERIC_ERROR);
            ApiResponse::message(StatusCode::UNPROCESSABLE_ENTITY, GENERIC_ERROR)
        }
    }
}

async fn open(state: &AppState, entity: &ResolvedEntity) -> Result<Box<dyn Session>, AppError> {
    let store = state.stores.get(&entity.connection).ok_or_else(|| {
        AppError::Config(ConfigError::MissingReference {
            kind: "connection",
            id: entity.connection.clone(),
        })
    })?;
    Ok(store.open().await?)
}

/// Close the session: commit when the work succeeded, roll back otherwise.
async fn finish<T>(mut session: Box<dyn Session>, result: Result<T, AppError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = session.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn id_param<'a>(request: &'a ApiRequest) -> Result<&'a str, AppError> {
    request
        .path_param("id")
        .ok_or_else(|| AppError::Validation("id is required".into()))
}

async fn run_index(
    state: &AppState,
    entity: &ResolvedEntity,
    spec: &QuerySpec,
    links: &LinkBase,
) -> Result<Value, AppError> {
    let mut session = open(state, entity).await?;
    let result = async {
        let (rows, total) = CrudService::list(session.as_mut(), entity, spec).await?;
        let data = encode_rows(session.as_mut(), state, entity, spec, rows).await?;
        Ok::<_, AppError>(Page::new(data, spec.page, spec.per_page, total, links).into_json())
    }
    .await;
    finish(session, result).await
}

async fn run_find(
    state: &AppState,
    entity: &ResolvedEntity,
    spec: &QuerySpec,
    request: &ApiRequest,
) -> Result<Value, AppError> {
    let id = CrudService::parse_id(entity, id_param(request)?)?;
    let mut session = open(state, entity).await?;
    let result = async {
        let row = CrudService::get_one(session.as_mut(), entity, &id).await?;
        let mut encoded = encode_rows(session.as_mut(), state, entity, spec, vec![row]).await?;
        Ok::<_, AppError>(encoded.pop().unwrap_or(Value::Null))
    }
    .await;
    finish(session, result).await
}

async fn run_store(state: &AppState, entity: &ResolvedEntity, request: &ApiRequest) -> Result<Value, AppError> {
    let body = request.body_object()?;
    let mut session = open(state, entity).await?;
    let result = CrudService::create(session.as_mut(), entity, &body).await;
    let row = finish(session, result).await?;
    tracing::info!(entity = %entity.name, "record stored");
    Ok(encode_flat(entity, &row))
}

async fn run_update(state: &AppState, entity: &ResolvedEntity, request: &ApiRequest) -> Result<Value, AppError> {
    let id = CrudService::parse_id(entity, id_param(request)?)?;
    let body = request.body_object()?;
    let mut session = open(state, entity).await?;
    let result = CrudService::update(session.as_mut(), entity, &id, &body).await;
    let row = finish(session, result).await?;
    Ok(encode_flat(entity, &row))
}

async fn run_delete(state: &AppState, entity: &ResolvedEntity, request: &ApiRequest) -> Result<Value, AppError> {
    let raw = id_param(request)?;
    let id = CrudService::parse_id(entity, raw)?;
    let mut session = open(state, entity).await?;
    let result = CrudService::remove(session.as_mut(), entity, &id).await;
    finish(session, result).await?;
    tracing::info!(entity = %entity.name, id = %raw, soft = entity.has_soft_delete(), "record deleted");
    Ok(json!({ "id": raw }))
}

async fn run_export(
    state: &AppState,
    entity: &ResolvedEntity,
    spec: &QuerySpec,
) -> Result<Option<String>, AppError> {
    let mut session = open(state, entity).await?;
    let result = export_csv(session.as_mut(), &state.model, entity, spec).await;
    finish(session, result).await
}

/// Flat encoding unless the request carried `relationships`.
async fn encode_rows(
    session: &mut dyn Session,
    state: &AppState,
    entity: &ResolvedEntity,
    spec: &QuerySpec,
    rows: Vec<Row>,
) -> Result<Vec<Value>, AppError> {
    if !spec.wants_relationships() {
        return Ok(rows.iter().map(|r| encode_flat(entity, r)).collect());
    }
    let names = spec.relationship_names();
    let depth = state.settings.max_depth;
    let graph = EntityGraph::load(session, &state.model, entity, rows, &names, depth).await?;
    Ok(RelationEncoder::new(&state.model, &graph, &names, depth).encode_roots())
}
