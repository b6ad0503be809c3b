//! Shared application state for all routes. Read-only after start-up.

use crate::config::{ResolvedModel, Settings};
use crate::store::StoreRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub stores: Arc<StoreRegistry>,
    pub model: Arc<ResolvedModel>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(stores: StoreRegistry, model: ResolvedModel, settings: Settings) -> Self {
        AppState {
            stores: Arc::new(stores),
            model: Arc::new(model),
            settings: Arc::new(settings),
        }
    }
}
