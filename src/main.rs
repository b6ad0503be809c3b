//! HTTP server: loads settings and entity metadata, builds one store per named connection
//! and serves the CRUD routes.

use serverless_crud::{app_router, load_from_path, resolve, AppState, ConfigError, PgStore, Settings, StoreRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("serverless_crud=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = load_from_path(&settings.entities_path).await?;
    let model = resolve(&config)?;
    tracing::info!(entities = model.entities.len(), path = %settings.entities_path, "entity metadata loaded");

    let mut stores = StoreRegistry::new();
    for conn in &settings.connections {
        stores.insert(conn.name.clone(), Arc::new(PgStore::connect(conn)?));
    }
    for name in model.connections() {
        if stores.get(name).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "connection",
                id: name.to_string(),
            }
            .into());
        }
    }

    let listen_addr = settings.listen_addr.clone();
    let app = app_router(AppState::new(stores, model, settings));
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
