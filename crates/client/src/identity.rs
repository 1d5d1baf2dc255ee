//! Signing identity collaborator

use crate::error::ClientResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spout_common::{Address, TxHash};

/// The signing account bound to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: Address,
    pub granted_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            granted_at: Utc::now(),
        }
    }
}

/// A state-changing contract invocation to be signed by the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Vec<u8>,
}

/// A transaction accepted by the node but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub tx_hash: TxHash,
    pub from: Address,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: ReceiptStatus,
}

/// Access to the user's signing identity.
///
/// Implementations own the identity; the session only keeps a copy of the
/// bound address.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Asks for access to an account. Fails with `AccessDenied` when refused
    /// or when no signer is available.
    async fn request_access(&self) -> ClientResult<Identity>;

    /// The already-authorized account, if any. Never prompts.
    async fn active_identity(&self) -> ClientResult<Option<Identity>>;

    /// Signs `call` and hands it to the network.
    async fn sign_and_submit(&self, call: ContractCall) -> ClientResult<PendingTransaction>;

    /// Waits until `pending` is mined. Fails with `TransactionReverted` when
    /// the receipt reports failure.
    async fn await_confirmation(&self, pending: &PendingTransaction) -> ClientResult<TransactionReceipt>;
}
