//! Integration test harness: an in-memory store behind the full router.

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};
use serverless_crud::{
    app_router, resolve, AppState, FullConfig, MemoryStore, ResolvedEntity, ResolvedModel, Settings, StoreRegistry,
};

pub fn model() -> ResolvedModel {
    let full = FullConfig {
        entities: serde_json::from_value(json!([
            {
                "name": "Owner", "table": "owners", "path": "owners", "primary_key": "id",
                "columns": [
                    {"name": "id", "type": "integer", "nullable": false, "has_default": true},
                    {"name": "name", "type": "text"}
                ],
                "relationships": [
                    {"name": "vehicles", "entity": "vehicles", "kind": "to_many", "local_column": "id", "remote_column": "owner_id"}
                ]
            },
            {
                "name": "Vehicle", "table": "vehicles", "path": "vehicles", "primary_key": "id",
                "columns": [
                    {"name": "id", "type": "integer", "nullable": false, "has_default": true},
                    {"name": "vin", "type": "text"},
                    {"name": "brand", "type": "text"},
                    {"name": "model", "type": "text"},
                    {"name": "year", "type": "integer"},
                    {"name": "price", "type": "numeric(10,2)"},
                    {"name": "owner_id", "type": "integer"},
                    {"name": "deleted_at", "type": "timestamptz"}
                ],
                "filter_columns": ["brand", "year"],
                "search_columns": ["model", "vin", "year"],
                "soft_delete_column": "deleted_at",
                "property_map": {"vin": "serial_number"},
                "display_members": ["id", "vin", "brand", "model", "year", "price", "owner_id"],
                "relationships": [
                    {"name": "owner", "entity": "owners", "kind": "to_one", "local_column": "owner_id", "remote_column": "id"}
                ],
                "rules_for_store": {
                    "vin": {"required": true, "min_length": 3, "max_length": 17},
                    "year": {"minimum": 1900}
                },
                "rules_for_update": {"year": {"minimum": 1900}},
                "export_columns": [
                    {"alias": "VIN", "field": "vin"},
                    {"alias": "Brand", "field": "brand"},
                    {"alias": "Price", "field": "price"},
                    {"alias": "Owner", "relation": "owner", "attr": "name"}
                ]
            }
        ]))
        .unwrap(),
    };
    resolve(&full).unwrap()
}

pub struct Harness {
    pub server: TestServer,
    pub store: MemoryStore,
    pub model: Arc<ResolvedModel>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(Settings {
            app_host: "api.example.com".into(),
            ..Settings::default()
        })
    }

    pub fn with_settings(settings: Settings) -> Self {
        let model = model();
        let store = MemoryStore::new();
        let stores = StoreRegistry::new().with("default", Arc::new(store.clone()));
        let state = AppState::new(stores, model.clone(), settings);
        let server = TestServer::new(app_router(state)).unwrap();
        Harness {
            server,
            store,
            model: Arc::new(model),
        }
    }

    pub fn entity(&self, path: &str) -> &ResolvedEntity {
        self.model.entity_by_path(path).unwrap()
    }

    pub fn seed(&self, path: &str, rows: Value) {
        self.store.seed(self.entity(path), rows).unwrap();
    }

    /// Two owners and three vehicles, one of them soft-deleted.
    pub fn seed_fleet(&self) {
        self.seed("owners", json!([{"id": 1, "name": "Ana"}, {"id": 2, "name": "Bruno"}]));
        self.seed(
            "vehicles",
            json!([
                {"id": 1, "vin": "VIN001", "brand": "Ford", "model": "Focus", "year": 2019, "price": "15000.50", "owner_id": 1},
                {"id": 2, "vin": "VIN002", "brand": "Ford", "model": "Fiesta", "year": 2021, "price": "12000.00", "owner_id": 2},
                {"id": 3, "vin": "VIN003", "brand": "Fiat", "model": "Uno", "year": 2019, "price": "8000.00", "owner_id": 1},
                {"id": 4, "vin": "VIN004", "brand": "Ford", "model": "Ka", "year": 2015, "price": "5000.00",
                 "owner_id": 1, "deleted_at": "2024-01-01T00:00:00Z"}
            ]),
        );
    }
}
