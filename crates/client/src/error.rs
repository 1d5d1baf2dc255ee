//! Error types for the faucet client

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use spout_common::{Address, TxHash};
use std::fmt;
use thiserror::Error;

/// Which faucet read a `LedgerRead` error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    Balance,
    Allowance,
    Cooldown,
    ChainId,
    FaucetInfo,
}

impl fmt::Display for ReadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadKind::Balance => "balance",
            ReadKind::Allowance => "allowance",
            ReadKind::Cooldown => "cooldown",
            ReadKind::ChainId => "chain id",
            ReadKind::FaucetInfo => "faucet info",
        };
        f.write_str(name)
    }
}

/// Faucet client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Wrong network: expected chain {expected}, provider is on chain {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("Failed to read {read}: {message}")]
    LedgerRead {
        read: ReadKind,
        message: String,
        fatal: bool,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Request rejected by faucet: {0}")]
    MutationRejected(String),

    #[error("Transaction {tx_hash} reverted: {message}")]
    TransactionReverted { tx_hash: TxHash, message: String },

    #[error("Already processing a request")]
    Busy,

    #[error("Auto-mint is not available yet{}", .cooldown_remaining.map(|s| format!(" ({}s remaining)", s)).unwrap_or_default())]
    AutoMintUnavailable { cooldown_remaining: Option<u64> },

    #[error("No identity connected")]
    NotConnected,

    #[error("{caller} is not the faucet owner ({owner})")]
    NotOwner { caller: Address, owner: Address },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse category of a [`ClientError`], stable enough to render or match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    WrongNetwork,
    LedgerRead,
    InvalidAmount,
    MutationRejected,
    TransactionReverted,
    Busy,
    AutoMintUnavailable,
    NotConnected,
    NotOwner,
    Transport,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::WrongNetwork => "WRONG_NETWORK",
            ErrorKind::LedgerRead => "LEDGER_READ",
            ErrorKind::InvalidAmount => "INVALID_AMOUNT",
            ErrorKind::MutationRejected => "MUTATION_REJECTED",
            ErrorKind::TransactionReverted => "TRANSACTION_REVERTED",
            ErrorKind::Busy => "BUSY",
            ErrorKind::AutoMintUnavailable => "AUTO_MINT_UNAVAILABLE",
            ErrorKind::NotConnected => "NOT_CONNECTED",
            ErrorKind::NotOwner => "NOT_OWNER",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ErrorKind::AccessDenied | ErrorKind::NotOwner => StatusCode::FORBIDDEN,
            ErrorKind::WrongNetwork => StatusCode::CONFLICT,
            ErrorKind::LedgerRead | ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            ErrorKind::InvalidAmount => StatusCode::BAD_REQUEST,
            ErrorKind::MutationRejected | ErrorKind::TransactionReverted => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::Busy => StatusCode::CONFLICT,
            ErrorKind::AutoMintUnavailable => StatusCode::PRECONDITION_FAILED,
            ErrorKind::NotConnected => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The most recent error as kept in session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::AccessDenied(_) => ErrorKind::AccessDenied,
            ClientError::WrongNetwork { .. } => ErrorKind::WrongNetwork,
            ClientError::LedgerRead { .. } => ErrorKind::LedgerRead,
            ClientError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            ClientError::MutationRejected(_) => ErrorKind::MutationRejected,
            ClientError::TransactionReverted { .. } => ErrorKind::TransactionReverted,
            ClientError::Busy => ErrorKind::Busy,
            ClientError::AutoMintUnavailable { .. } => ErrorKind::AutoMintUnavailable,
            ClientError::NotConnected => ErrorKind::NotConnected,
            ClientError::NotOwner { .. } => ErrorKind::NotOwner,
            ClientError::Transport(_) | ClientError::Rpc { .. } => ErrorKind::Transport,
            ClientError::Signing(_)
            | ClientError::Database(_)
            | ClientError::Config(_)
            | ClientError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// A read failure that invalidates the connection rather than one poll.
    pub fn is_fatal_read(&self) -> bool {
        matches!(self, ClientError::LedgerRead { fatal: true, .. })
    }

    /// JSON-RPC error reporting an EVM revert during call or gas estimation.
    pub fn is_execution_revert(&self) -> bool {
        match self {
            ClientError::Rpc { code, message, .. } => {
                *code == 3 || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    pub fn to_session_error(&self) -> SessionError {
        SessionError {
            kind: self.kind(),
            message: self.to_string(),
            at: Utc::now(),
        }
    }
}

impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = Json(json!({
            "error": kind.code(),
            "message": self.to_string(),
            "timestamp": Utc::now().to_rfc3339()
        }));

        (kind.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ClientError::Busy.kind(), ErrorKind::Busy);
        assert_eq!(
            ClientError::Rpc { code: -32000, message: "boom".into(), data: None }.kind(),
            ErrorKind::Transport
        );
        assert_eq!(ClientError::Signing("bad key".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_revert_detection() {
        let revert = ClientError::Rpc {
            code: -32000,
            message: "execution reverted: Exceeds daily limit".into(),
            data: None,
        };
        assert!(revert.is_execution_revert());
        let code_three = ClientError::Rpc { code: 3, message: "".into(), data: None };
        assert!(code_three.is_execution_revert());
        assert!(!ClientError::Transport("connection refused".into()).is_execution_revert());
    }

    #[test]
    fn test_auto_mint_message() {
        let err = ClientError::AutoMintUnavailable { cooldown_remaining: Some(3600) };
        assert_eq!(err.to_string(), "Auto-mint is not available yet (3600s remaining)");
        let err = ClientError::AutoMintUnavailable { cooldown_remaining: None };
        assert_eq!(err.to_string(), "Auto-mint is not available yet");
    }

    #[test]
    fn test_session_error_keeps_message() {
        let err = ClientError::LedgerRead {
            read: ReadKind::Cooldown,
            message: "timeout".into(),
            fatal: false,
        };
        let recorded = err.to_session_error();
        assert_eq!(recorded.kind, ErrorKind::LedgerRead);
        assert_eq!(recorded.message, "Failed to read cooldown: timeout");
        assert!(!err.is_fatal_read());
    }

    #[test]
    fn test_into_response_status() {
        let response = ClientError::InvalidAmount("zero".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = ClientError::Busy.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let response = ClientError::NotOwner {
            caller: Address([0xaa; 20]),
            owner: Address([0x01; 20]),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
