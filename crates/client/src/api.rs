//! HTTP presentation boundary
//!
//! Thin JSON wrapper over `SessionManager`: reads render the session state,
//! posts forward user intents.

use crate::database::MutationRecord;
use crate::error::{ClientError, ClientResult};
use crate::gateway::FaucetInfo;
use crate::identity::Identity;
use crate::mutation::Confirmation;
use crate::session::SessionManager;
use crate::snapshot::AllowanceSnapshot;
use crate::state::SessionState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Withdrawal request body. `amount` is a decimal token amount.
#[derive(Debug, Deserialize)]
pub struct RequestTokensBody {
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

impl<T> SuccessResponse<T> {
    fn json(data: T) -> Json<Self> {
        Json(Self {
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

type ApiResult<T> = ClientResult<Json<SuccessResponse<T>>>;

#[derive(Clone)]
struct ApiState {
    session: Arc<SessionManager>,
    metrics_enabled: bool,
}

/// HTTP server over one session.
pub struct ApiServer {
    session: Arc<SessionManager>,
    metrics_enabled: bool,
    cors_enabled: bool,
}

impl ApiServer {
    pub fn new(session: Arc<SessionManager>, metrics_enabled: bool, cors_enabled: bool) -> Self {
        Self {
            session,
            metrics_enabled,
            cors_enabled,
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/state", get(state_handler))
            .route("/api/connect", post(connect_handler))
            .route("/api/refresh", post(refresh_handler))
            .route("/api/request", post(request_handler))
            .route("/api/auto-mint", post(auto_mint_handler))
            .route("/api/force-auto-mint", post(force_auto_mint_handler))
            .route("/api/disconnect", post(disconnect_handler))
            .route("/api/info", get(info_handler))
            .route("/api/history", get(history_handler))
            .with_state(ApiState {
                session: self.session.clone(),
                metrics_enabled: self.metrics_enabled,
            })
            .layer(TraceLayer::new_for_http());

        if self.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, address: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(address).await?;
        info!("API server listening on {}", address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("API server stopped");
        Ok(())
    }
}

async fn state_handler(State(state): State<ApiState>) -> Json<SuccessResponse<SessionState>> {
    SuccessResponse::json(state.session.state())
}

async fn connect_handler(State(state): State<ApiState>) -> ApiResult<Identity> {
    Ok(SuccessResponse::json(state.session.connect().await?))
}

async fn refresh_handler(State(state): State<ApiState>) -> ApiResult<AllowanceSnapshot> {
    Ok(SuccessResponse::json(state.session.refresh().await?))
}

async fn request_handler(
    State(state): State<ApiState>,
    Json(body): Json<RequestTokensBody>,
) -> ApiResult<Confirmation> {
    info!("Withdrawal requested: {}", body.amount);
    Ok(SuccessResponse::json(state.session.request_tokens(&body.amount).await?))
}

async fn auto_mint_handler(State(state): State<ApiState>) -> ApiResult<Confirmation> {
    Ok(SuccessResponse::json(state.session.trigger_replenishment().await?))
}

async fn force_auto_mint_handler(State(state): State<ApiState>) -> ApiResult<Confirmation> {
    Ok(SuccessResponse::json(state.session.force_replenishment().await?))
}

async fn disconnect_handler(State(state): State<ApiState>) -> Json<SuccessResponse<SessionState>> {
    state.session.disconnect();
    SuccessResponse::json(state.session.state())
}

async fn info_handler(State(state): State<ApiState>) -> ApiResult<FaucetInfo> {
    Ok(SuccessResponse::json(state.session.faucet_info().await?))
}

async fn history_handler(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<MutationRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(SuccessResponse::json(state.session.history(limit)?))
}

async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, String::new()).into_response();
    }
    match state.session.metrics().gather() {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            ClientError::Internal(e.to_string()).into_response()
        }
    }
}

/// Health check handler
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "phase": state.session.state().phase,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with info
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Spout",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Session client for a rate-limited token faucet",
        "endpoints": {
            "GET /api/state": "Current session state",
            "POST /api/connect": "Bind the signing identity",
            "POST /api/refresh": "Re-read faucet state",
            "POST /api/request": "Withdraw tokens ({\"amount\": \"20\"})",
            "POST /api/auto-mint": "Trigger faucet replenishment",
            "POST /api/force-auto-mint": "Replenish ignoring the cooldown (owner only)",
            "POST /api/disconnect": "Unbind the session",
            "GET /api/info": "Faucet parameters",
            "GET /api/history": "Journaled mutations",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}
