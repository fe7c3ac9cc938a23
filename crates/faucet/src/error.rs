//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failures of the durable attempt log.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Transaction aborted: {0}")]
    Transaction(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

/// Failures while building, signing or submitting a transfer.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("RPC request failed: {0}")]
    Transport(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Chain submission timed out after {0:?}")]
    Timeout(Duration),
}

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for FaucetError {
    fn from(err: config::ConfigError) -> Self {
        FaucetError::Config(err.to_string())
    }
}

/// Builds the JSON error body shared by every endpoint.
pub fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(json!({
        "error": code,
        "message": message,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }));

    (status, body).into_response()
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            FaucetError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            FaucetError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            FaucetError::Chain(_) => (StatusCode::BAD_GATEWAY, "RPC_ERROR"),
            FaucetError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            FaucetError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        error_response(status, code, self.to_string())
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
