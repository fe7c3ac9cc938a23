//! HTTP API for faucet service

use crate::error::{error_response, FaucetError, FaucetResult};
use crate::model::FundingResult;
use crate::service::{FaucetService, FaucetStatus};
use crate::stats::FundingStats;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Longest accepted wallet address: `0x` plus 40 hex digits.
pub const MAX_WALLET_ADDRESS_LEN: usize = 42;

/// Fund request
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub wallet_address: Option<String>,
}

/// Fund response
#[derive(Debug, Serialize, Deserialize)]
pub struct FundResponse {
    pub transaction_id: String,
    /// Amount sent (in wei)
    pub amount: String,
}

/// Success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

/// Shape checks only; address semantics are the orchestrator's job.
pub fn validate_fund_request(request: &FundRequest) -> FaucetResult<String> {
    let wallet = request
        .wallet_address
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    if wallet.is_empty() {
        return Err(FaucetError::Validation("wallet_address is required".to_string()));
    }
    if wallet.len() > MAX_WALLET_ADDRESS_LEN {
        return Err(FaucetError::Validation(format!(
            "wallet_address must be at most {} characters",
            MAX_WALLET_ADDRESS_LEN
        )));
    }
    Ok(wallet.to_string())
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Fund handler
pub async fn fund_handler(
    State(service): State<Arc<FaucetService>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<FundRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            error!("Invalid request data: {}", rejection.body_text());
            return FaucetError::Validation(rejection.body_text()).into_response();
        }
    };

    let wallet = match validate_fund_request(&request) {
        Ok(wallet) => wallet,
        Err(e) => {
            error!("Invalid request data: {}", e);
            return e.into_response();
        }
    };

    let ip = client_ip(&headers, peer);
    info!("Request validated. Wallet: {}, IP: {}", wallet, ip);

    match service.fund(&wallet, &ip).await {
        Ok(FundingResult::Funded {
            transaction_id,
            amount,
        }) => (
            StatusCode::OK,
            Json(FundResponse {
                transaction_id,
                amount: amount.to_string(),
            }),
        )
            .into_response(),
        Ok(FundingResult::RateLimited { retry_after }) => {
            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Rate limit exceeded. Please wait before requesting again.".to_string(),
            );
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            response
        }
        Ok(FundingResult::ChainError(message)) => error_response(
            StatusCode::BAD_REQUEST,
            "TRANSACTION_FAILED",
            format!("Transaction failed: {}", message),
        ),
        Err(e) => {
            error!("Fund error: {:?}", e);
            e.into_response()
        }
    }
}

/// Stats handler: trailing 24 hours
pub async fn stats_handler(State(service): State<Arc<FaucetService>>) -> FaucetResult<Json<FundingStats>> {
    match service.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            error!("Error fetching stats: {}", e);
            Err(e)
        }
    }
}

/// Status handler
pub async fn status_handler(
    State(service): State<Arc<FaucetService>>,
) -> FaucetResult<Json<SuccessResponse<FaucetStatus>>> {
    let status = service.status().await?;
    Ok(Json(SuccessResponse {
        data: status,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// Prometheus metrics handler
pub async fn metrics_handler(State(service): State<Arc<FaucetService>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.metrics().render(),
    )
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Drip Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Testnet faucet with per-wallet cooldown and audited payouts",
        "endpoints": {
            "POST /api/fund": "Request funds",
            "GET /api/stats": "Success / failure counts for the last 24 hours",
            "GET /api/status": "Get faucet status",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}

/// Build the router over a shared service.
pub fn router(service: Arc<FaucetService>, cors_enabled: bool, metrics_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/fund", post(fund_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/status", get(status_handler));

    if metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    let mut app = app.with_state(service).layer(TraceLayer::new_for_http());

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        app = app.layer(cors);
        info!("CORS enabled");
    }

    app
}
