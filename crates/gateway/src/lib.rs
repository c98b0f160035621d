//! HTTP API gateway for Intervet.
//!
//! Exposes the REST surface over the interview engine: catalog CRUD for
//! roles, scenarios, SQL scenarios and RAG corpora; session lifecycle and
//! transcript access; sandbox submissions; and the chat endpoints with
//! SSE token streaming.
//!
//! Built on Axum for high performance async HTTP.

mod catalog;
mod sessions;
#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use intervet_config::AppConfig;
use intervet_core::Error;
use intervet_engine::TurnRunner;
use intervet_providers::LmClient;
use intervet_sandbox::SandboxClient;
use intervet_store::{SqliteStore, seed_defaults};
use intervet_tools::{Dispatcher, WebSearchClient};

/// Shared application state for all handlers.
pub struct AppState {
    pub store: SqliteStore,
    pub runner: TurnRunner,
    pub sandbox: SandboxClient,
    pub web: WebSearchClient,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(catalog::router())
        .merge(sessions::router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Builds the store, model client, dispatcher and turn runner once and
/// shares them across handlers via [`AppState`].
pub async fn start(config: AppConfig, seed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::new(&config.database_url).await?;
    if seed {
        seed_defaults(&store).await?;
    }

    let backend = LmClient::new(&config.lm)?;
    let web = WebSearchClient::new(&config.web_search);
    let dispatcher = Dispatcher::new(store.clone(), web.clone());
    let runner = TurnRunner::new(store.clone(), Arc::new(backend), dispatcher);
    let sandbox = SandboxClient::new(&config.sandbox);

    let state = Arc::new(AppState {
        store,
        runner,
        sandbox,
        web,
    });
    let app = build_router(state).layer(cors_layer(&config.server.allow_origins));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// CORS policy from the configured comma-separated origin list.
fn cors_layer(allow_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);
    if allow_origins.trim() == "*" {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = allow_origins
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

// --- Error mapping ---

/// Wrapper mapping domain errors onto HTTP responses.
///
/// Validation failures are client mistakes (400), lookups that found
/// nothing are 404, everything else surfaces as 500 with the detail kept
/// in the body and the operator log.
pub(crate) struct ApiError(Error);

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } | Error::Tool(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
