use anyhow::{anyhow, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    ethereum::{abi::EtherscanFetcher, cache::CachedAbiFetcher},
    orchestrator::{ApiError, GenerateRequest, Orchestrator},
};

pub struct Erc7730Server {
    orchestrator: Arc<Orchestrator>,
    config: Arc<Config>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::InvalidAbi(_)
            | ApiError::InvalidAddress(_)
            | ApiError::UnsupportedChain(_) => StatusCode::BAD_REQUEST,
            ApiError::AbiUnavailable(_) | ApiError::NetworkError(_) => StatusCode::BAD_GATEWAY,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Every failure is returned as `{"message": ...}` with the kind's status.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", self.kind(), self);
        } else {
            warn!("Request rejected ({}): {}", self.kind(), self);
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

impl Erc7730Server {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = EtherscanFetcher::from_config(&config)?;
        info!("Explorer lookups enabled for chains: {:?}", fetcher.supported_chains());

        let cached = CachedAbiFetcher::new(
            fetcher,
            config.fetcher.cache_ttl(),
            config.fetcher.cache_capacity,
        );
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(cached)));

        Ok(Self {
            orchestrator,
            config: Arc::new(config),
        })
    }

    pub async fn run(&self) -> Result<()> {
        let address = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| anyhow!("Failed to bind {}: {}", address, e))?;

        info!("ERC7730 API listening on {}", address);

        axum::serve(listener, router(self.orchestrator.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow!("Server error: {}", e))?;

        info!("ERC7730 API stopped");
        Ok(())
    }
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let generate_routes = Router::new()
        .route("/generateERC7730", post(generate).options(preflight))
        .route("/api/py/generateERC7730", post(generate).options(preflight))
        .layer(cors);

    Router::new()
        .route("/api/healthcheck", get(healthcheck))
        .route("/", get(root))
        .route("/api/py", get(root))
        .merge(generate_routes)
        .with_state(orchestrator)
}

async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "API is running" }))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "API is running" }))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn generate(
    State(orchestrator): State<Arc<Orchestrator>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload
        .map_err(|e| ApiError::InvalidInput(format!("Invalid JSON payload: {}", e.body_text())))?;

    let descriptor = orchestrator.generate(request).await?;

    let body = serde_json::to_value(&descriptor)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize descriptor: {}", e)))?;

    Ok(Json(body))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
