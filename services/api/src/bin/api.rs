//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{fallback::FallbackStore, file::FileStore, pg::PgStore},
    config::{Config, Environment},
    error::ApiError,
    web::{
        get_data_handler, rest::ApiDoc, state::AppState, summary_handler, sync,
        test_archive_handler, update_data_handler, ws_handler,
    },
    scheduler,
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use foyer_core::domain::AppData;
use foyer_core::ports::StateStore;
use foyer_core::week;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Build the Persistence Chain ---
    let local = FileStore::new(config.data_file.clone(), config.backup_dir.clone());
    let primary: Option<Arc<dyn StateStore>> = match &config.database_url {
        Some(url) => match PgStore::connect(url, config.connect_timeout).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                // Degradation is permanent for the process lifetime.
                warn!("Primary store unreachable: {} - using the local file store", e);
                None
            }
        },
        None => {
            info!("No DATABASE_URL configured, using the local file store");
            None
        }
    };
    let store: Arc<dyn StateStore> = Arc::new(FallbackStore::new(primary, local));

    // --- 3. Load or Materialize the Document ---
    let mut doc = match store.load_app_data().await? {
        Some(doc) => {
            info!("Document loaded from storage");
            doc
        }
        None => {
            info!("No stored document found, materializing defaults");
            AppData::default()
        }
    };
    // The stored week is advisory only; the wall clock decides.
    doc.current_week = week::week_key(Utc::now());
    store.save_app_data(&doc).await?;

    // --- 4. Spawn the Canonical-State Task & Scheduler ---
    let sync_handle = sync::spawn(store, doc);
    scheduler::spawn(sync_handle.clone(), config.backup_interval);

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        sync: sync_handle,
        config: config.clone(),
    });

    let cors = match config.environment {
        Environment::Production => CorsLayer::new()
            .allow_origin(
                config
                    .allowed_origin
                    .parse::<HeaderValue>()
                    .map_err(|e| ApiError::Internal(format!("invalid ALLOWED_ORIGIN: {}", e)))?,
            )
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]),
        Environment::Development => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route("/api/data", get(get_data_handler).post(update_data_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/test-archive", post(test_archive_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Any unmatched path serves the client application shell.
    let spa = ServeDir::new(&config.static_dir)
        .not_found_service(ServeFile::new(config.static_dir.join("index.html")));

    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback_service(spa);

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
