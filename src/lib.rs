//! Metadata-driven REST CRUD: filtering, search, offset pagination and relationship-aware
//! serialization for entities declared in JSON, served over PostgreSQL.

pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod pagination;
pub mod query;
pub mod request;
pub mod response;
pub mod routes;
pub mod serializer;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;
pub mod value;

pub use config::{load_from_path, resolve, FullConfig, ResolvedEntity, ResolvedModel, Settings};
pub use error::{AppError, ConfigError};
pub use request::ApiRequest;
pub use response::ApiResponse;
pub use routes::{app_router, common_routes, entity_routes};
pub use service::CrudService;
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Session, Store, StoreError, StoreRegistry};
