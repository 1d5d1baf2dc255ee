//! Session and synchronization client for a rate-limited token faucet
//!
//! Binds a signing identity, keeps a snapshot of the faucet's balance,
//! caller allowance and auto-mint cooldown in sync with the chain, and
//! serializes withdrawals and replenishment triggers so that at most one is
//! in flight.

pub mod abi;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod keystore;
pub mod mutation;
pub mod queue;
pub mod rpc;
pub mod session;
pub mod snapshot;
pub mod state;

pub use config::ClientConfig;
pub use database::{AccessGrant, MutationRecord, SessionDatabase};
pub use error::{ClientError, ClientResult, ErrorKind, ReadKind, SessionError};
pub use gateway::{FaucetInfo, LedgerGateway, RpcLedgerGateway};
pub use identity::{ContractCall, Identity, IdentityProvider, PendingTransaction, ReceiptStatus, TransactionReceipt};
pub use keystore::{GasSettings, LocalIdentityProvider};
pub use mutation::{Confirmation, MutationKind, MutationOutcome, MutationReceipt, MutationRequest, PendingMutation};
pub use queue::ActionQueue;
pub use rpc::BlockchainRpcClient;
pub use session::{SessionManager, SessionSettings};
pub use snapshot::AllowanceSnapshot;
pub use state::{ConnectionPhase, SessionState};
