//! Entity routes. Handlers resolve the entity from the path segment; unknown segments answer 404.

use crate::handlers::entity::{delete, export, find, index, store, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(index).post(store))
        .route("/:path_segment/export", get(export))
        .route(
            "/:path_segment/:id",
            get(find).put(update).patch(update).delete(delete),
        )
        .with_state(state)
}
