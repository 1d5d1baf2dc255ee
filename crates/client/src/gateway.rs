//! Typed access to the faucet contract
//!
//! `LedgerGateway` is the seam between the session and the chain. It never
//! caches: every call is a fresh read or a fresh submission.

use crate::abi::{decode_address, decode_revert_reason, decode_uint, AbiError, FaucetCall};
use crate::error::{ClientError, ClientResult, ReadKind};
use crate::identity::{ContractCall, Identity, IdentityProvider, TransactionReceipt};
use crate::mutation::{MutationKind, MutationOutcome, MutationReceipt};
use crate::rpc::BlockchainRpcClient;
use crate::snapshot::AllowanceSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use spout_common::utils::converter::from_hex;
use spout_common::{Address, TokenAmount};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Static parameters of the deployed faucet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaucetInfo {
    pub faucet: Address,
    pub owner: Address,
    pub token: Address,
    pub max_tokens_per_day: TokenAmount,
    /// `None` before the first replenishment
    pub last_auto_mint: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Chain the gateway talks to.
    async fn chain_id(&self) -> ClientResult<u64>;

    /// Balance, caller allowance and cooldown, read together. Any failed
    /// sub-read fails the whole snapshot.
    async fn fetch_snapshot(&self, identity: &Identity) -> ClientResult<AllowanceSnapshot>;

    /// Seconds until auto-mint becomes available.
    async fn fetch_cooldown(&self) -> ClientResult<u64>;

    /// Withdraws `amount` to the bound identity and waits for confirmation.
    async fn submit_withdrawal(&self, amount: TokenAmount) -> ClientResult<MutationReceipt>;

    /// Triggers replenishment and waits for confirmation.
    async fn submit_auto_mint(&self) -> ClientResult<MutationReceipt>;

    /// Owner-only replenishment regardless of cooldown. The ledger refuses
    /// it for anyone else.
    async fn submit_force_auto_mint(&self) -> ClientResult<MutationReceipt>;

    async fn faucet_info(&self) -> ClientResult<FaucetInfo>;
}

/// Gateway over JSON-RPC reads and identity-signed writes.
pub struct RpcLedgerGateway {
    rpc: Arc<BlockchainRpcClient>,
    identity: Arc<dyn IdentityProvider>,
    faucet: Address,
}

impl RpcLedgerGateway {
    pub fn new(rpc: Arc<BlockchainRpcClient>, identity: Arc<dyn IdentityProvider>, faucet: Address) -> Self {
        Self { rpc, identity, faucet }
    }

    pub fn faucet_address(&self) -> Address {
        self.faucet
    }

    async fn read(&self, read: ReadKind, call: FaucetCall, from: Option<&Address>) -> ClientResult<Vec<u8>> {
        debug!("Reading {} via {}", read, call.name());
        self.rpc
            .eth_call(from, &self.faucet, &call.encode())
            .await
            .map_err(|e| ClientError::LedgerRead {
                read,
                message: e.to_string(),
                fatal: false,
            })
    }

    fn decode_failure(read: ReadKind, err: AbiError) -> ClientError {
        ClientError::LedgerRead {
            read,
            // No code at the faucet address; retrying cannot help.
            fatal: err == AbiError::EmptyReturn,
            message: err.to_string(),
        }
    }

    async fn read_uint(&self, read: ReadKind, call: FaucetCall, from: Option<&Address>) -> ClientResult<u128> {
        let data = self.read(read, call, from).await?;
        decode_uint(&data).map_err(|e| Self::decode_failure(read, e))
    }

    async fn read_address(&self, call: FaucetCall) -> ClientResult<Address> {
        let data = self.read(ReadKind::FaucetInfo, call, None).await?;
        decode_address(&data).map_err(|e| Self::decode_failure(ReadKind::FaucetInfo, e))
    }

    /// Maps a refusal during submission onto `MutationRejected`.
    fn rejection(err: ClientError) -> ClientError {
        if !err.is_execution_revert() {
            return err;
        }
        match err {
            ClientError::Rpc { message, data, .. } => {
                let reason = data
                    .as_deref()
                    .and_then(|d| from_hex(d).ok())
                    .and_then(|bytes| decode_revert_reason(&bytes))
                    .unwrap_or_else(|| {
                        message
                            .strip_prefix("execution reverted: ")
                            .unwrap_or(&message)
                            .to_string()
                    });
                ClientError::MutationRejected(reason)
            }
            other => other,
        }
    }

    async fn submit(&self, call: FaucetCall) -> ClientResult<TransactionReceipt> {
        info!("Submitting {}", call.name());
        let pending = self
            .identity
            .sign_and_submit(ContractCall {
                to: self.faucet,
                data: call.encode(),
            })
            .await
            .map_err(Self::rejection)?;
        self.identity.await_confirmation(&pending).await
    }
}

#[async_trait]
impl LedgerGateway for RpcLedgerGateway {
    async fn chain_id(&self) -> ClientResult<u64> {
        self.rpc.chain_id().await.map_err(|e| ClientError::LedgerRead {
            read: ReadKind::ChainId,
            message: e.to_string(),
            fatal: false,
        })
    }

    async fn fetch_snapshot(&self, identity: &Identity) -> ClientResult<AllowanceSnapshot> {
        let (balance, allowance, cooldown) = futures::future::try_join3(
            self.read_uint(ReadKind::Balance, FaucetCall::GetFaucetBalance, None),
            self.read_uint(
                ReadKind::Allowance,
                FaucetCall::GetRemainingAllowance(identity.address),
                Some(&identity.address),
            ),
            self.fetch_cooldown(),
        )
        .await?;

        Ok(AllowanceSnapshot::new(
            TokenAmount::from_base_units(balance),
            TokenAmount::from_base_units(allowance),
            cooldown,
        ))
    }

    async fn fetch_cooldown(&self) -> ClientResult<u64> {
        let seconds = self
            .read_uint(ReadKind::Cooldown, FaucetCall::TimeUntilNextAutoMint, None)
            .await?;
        Ok(u64::try_from(seconds).unwrap_or(u64::MAX))
    }

    async fn submit_withdrawal(&self, amount: TokenAmount) -> ClientResult<MutationReceipt> {
        if amount.is_zero() {
            return Err(ClientError::InvalidAmount("amount must be greater than zero".to_string()));
        }

        let receipt = self.submit(FaucetCall::RequestTokens(amount)).await?;
        info!("Withdrawal of {} confirmed in block {}", amount, receipt.block_number);
        Ok(MutationReceipt {
            kind: MutationKind::Withdraw,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            outcome: MutationOutcome::Applied,
        })
    }

    async fn submit_auto_mint(&self) -> ClientResult<MutationReceipt> {
        match self.submit(FaucetCall::TryAutoMint).await {
            Ok(receipt) => Ok(MutationReceipt {
                kind: MutationKind::AutoMint,
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
                outcome: MutationOutcome::Applied,
            }),
            Err(ClientError::TransactionReverted { tx_hash, message }) => {
                // Someone else may have replenished between our read and our
                // transaction; a restarted cooldown means the goal was met.
                match self.fetch_cooldown().await {
                    Ok(cooldown) if cooldown > 0 => {
                        info!("Auto-mint {} reverted but faucet was already replenished", tx_hash);
                        let block_number = match self.rpc.transaction_receipt(&tx_hash).await {
                            Ok(Some(receipt)) => receipt.block_number,
                            _ => 0,
                        };
                        Ok(MutationReceipt {
                            kind: MutationKind::AutoMint,
                            tx_hash,
                            block_number,
                            outcome: MutationOutcome::AlreadyReplenished,
                        })
                    }
                    Ok(_) => Err(ClientError::TransactionReverted { tx_hash, message }),
                    Err(e) => {
                        warn!("Could not re-read cooldown after reverted auto-mint: {}", e);
                        Err(ClientError::TransactionReverted { tx_hash, message })
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_force_auto_mint(&self) -> ClientResult<MutationReceipt> {
        let receipt = self.submit(FaucetCall::ForceAutoMint).await?;
        info!("Forced auto-mint confirmed in block {}", receipt.block_number);
        Ok(MutationReceipt {
            kind: MutationKind::ForceAutoMint,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            outcome: MutationOutcome::Applied,
        })
    }

    async fn faucet_info(&self) -> ClientResult<FaucetInfo> {
        let (owner, token, cap, last) = futures::future::try_join4(
            self.read_address(FaucetCall::Owner),
            self.read_address(FaucetCall::UsdcToken),
            self.read_uint(ReadKind::FaucetInfo, FaucetCall::MaxTokensPerDay, None),
            self.read_uint(ReadKind::FaucetInfo, FaucetCall::LastAutoMintTime, None),
        )
        .await?;

        let last_auto_mint = i64::try_from(last)
            .ok()
            .filter(|ts| *ts > 0)
            .and_then(|ts| DateTime::from_timestamp(ts, 0));

        Ok(FaucetInfo {
            faucet: self.faucet,
            owner,
            token,
            max_tokens_per_day: TokenAmount::from_base_units(cap),
            last_auto_mint,
        })
    }
}
