//! Local key-backed signing identity
//!
//! Stands in for a wallet: access is granted once and persisted in the
//! session database, transactions are signed with a secp256k1 key held by
//! this process and broadcast through the JSON-RPC endpoint.

use crate::database::{AccessGrant, SessionDatabase};
use crate::error::{ClientError, ClientResult};
use crate::identity::{
    ContractCall, Identity, IdentityProvider, PendingTransaction, ReceiptStatus, TransactionReceipt,
};
use crate::rpc::BlockchainRpcClient;
use async_trait::async_trait;
use chrono::Utc;
pub use k256::ecdsa::SigningKey;
use rlp::RlpStream;
use spout_common::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Parse a hex-encoded (optionally `0x`-prefixed) secp256k1 private key.
pub fn signing_key_from_hex(key: &str) -> ClientResult<SigningKey> {
    let trimmed = key.trim();
    let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_key).map_err(|e| ClientError::Signing(format!("Invalid private key: {}", e)))?;
    SigningKey::from_slice(&bytes).map_err(|e| ClientError::Signing(format!("Invalid signing key: {}", e)))
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::random(&mut rand::rngs::OsRng)
}

/// Hex encoding of the key's 32-byte scalar, `0x`-prefixed.
pub fn signing_key_to_hex(key: &SigningKey) -> String {
    format!("0x{}", hex::encode(key.to_bytes()))
}

/// Ethereum address of a signing key.
pub fn address_of(key: &SigningKey) -> Address {
    let public_key = key.verifying_key().to_encoded_point(false);
    let hash = keccak_hash::keccak(&public_key.as_bytes()[1..]); // Skip the 0x04 tag
    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&hash.0[12..]);
    Address(addr_bytes)
}

/// Fields of a pre-EIP-2718 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.0.to_vec());
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// EIP-155 signing hash.
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        keccak_hash::keccak(stream.out()).0
    }

    /// RLP-encoded signed transaction, ready for `eth_sendRawTransaction`.
    pub fn sign(&self, key: &SigningKey, chain_id: u64) -> ClientResult<Vec<u8>> {
        let sighash = self.signing_hash(chain_id);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&sighash)
            .map_err(|e| ClientError::Signing(e.to_string()))?;

        let v = recovery_id.to_byte() as u64 + chain_id * 2 + 35;
        let r = signature.r().to_bytes();
        let s = signature.s().to_bytes();

        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(&r));
        stream.append(&trim_leading_zeros(&s));
        Ok(stream.out().to_vec())
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Gas parameters for locally signed transactions.
#[derive(Debug, Clone)]
pub struct GasSettings {
    /// Fixed price in wei; the node's `eth_gasPrice` is used when unset.
    pub gas_price: Option<u128>,
    /// Used when estimation fails for reasons other than a revert.
    pub fallback_gas_limit: u64,
}

/// Identity provider backed by a local private key.
pub struct LocalIdentityProvider {
    signing_key: Option<SigningKey>,
    address: Option<Address>,
    rpc: Arc<BlockchainRpcClient>,
    database: Arc<SessionDatabase>,
    gas: GasSettings,
    receipt_poll_interval: Duration,
    chain_id: OnceCell<u64>,
    /// Held from nonce lookup until broadcast
    submit_lock: Mutex<()>,
}

impl LocalIdentityProvider {
    pub fn new(
        signing_key: Option<SigningKey>,
        rpc: Arc<BlockchainRpcClient>,
        database: Arc<SessionDatabase>,
        gas: GasSettings,
        receipt_poll_interval: Duration,
    ) -> Self {
        let address = signing_key.as_ref().map(address_of);
        if let Some(address) = &address {
            info!("Local signing identity: {}", address);
        } else {
            warn!("No signing key configured; connect requests will be denied");
        }

        Self {
            signing_key,
            address,
            rpc,
            database,
            gas,
            receipt_poll_interval,
            chain_id: OnceCell::new(),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// Withdraw this client's authorization. The next `active_identity`
    /// check reports no identity.
    pub fn revoke_access(&self) -> ClientResult<bool> {
        match &self.address {
            Some(address) => self.database.revoke_grant(address),
            None => Ok(false),
        }
    }

    fn authorized_key(&self) -> ClientResult<(&SigningKey, Address)> {
        let (key, address) = match (&self.signing_key, self.address) {
            (Some(key), Some(address)) => (key, address),
            _ => return Err(ClientError::AccessDenied("no signing key configured".to_string())),
        };
        if self.database.get_grant(&address)?.is_none() {
            return Err(ClientError::AccessDenied(format!("access for {} has been revoked", address)));
        }
        Ok((key, address))
    }

    async fn chain_id(&self) -> ClientResult<u64> {
        self.chain_id
            .get_or_try_init(|| self.rpc.chain_id())
            .await
            .copied()
    }

    async fn gas_price(&self) -> ClientResult<u128> {
        match self.gas.gas_price {
            Some(price) => Ok(price),
            None => self.rpc.gas_price().await,
        }
    }

    async fn gas_limit(&self, from: &Address, call: &ContractCall) -> ClientResult<u64> {
        match self.rpc.estimate_gas(from, &call.to, &call.data).await {
            // 20% headroom over the estimate
            Ok(estimate) => Ok(estimate.saturating_add(estimate / 5)),
            Err(e) if e.is_execution_revert() => Err(e),
            Err(e) => {
                warn!("Gas estimation failed, using fallback limit: {}", e);
                Ok(self.gas.fallback_gas_limit)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn request_access(&self) -> ClientResult<Identity> {
        let address = self
            .address
            .ok_or_else(|| ClientError::AccessDenied("no signing key configured".to_string()))?;

        let grant = match self.database.get_grant(&address)? {
            Some(grant) => grant,
            None => {
                let grant = AccessGrant {
                    address,
                    granted_at: Utc::now().timestamp(),
                };
                self.database.record_grant(&grant)?;
                grant
            }
        };

        Ok(Identity {
            address,
            granted_at: grant.datetime(),
        })
    }

    async fn active_identity(&self) -> ClientResult<Option<Identity>> {
        let Some(address) = self.address else {
            return Ok(None);
        };
        Ok(self.database.get_grant(&address)?.map(|grant| Identity {
            address,
            granted_at: grant.datetime(),
        }))
    }

    async fn sign_and_submit(&self, call: ContractCall) -> ClientResult<PendingTransaction> {
        let (key, from) = self.authorized_key()?;
        let chain_id = self.chain_id().await?;

        let _guard = self.submit_lock.lock().await;
        let gas_limit = self.gas_limit(&from, &call).await?;
        let tx = LegacyTransaction {
            nonce: self.rpc.transaction_count(&from).await?,
            gas_price: self.gas_price().await?,
            gas_limit,
            to: call.to,
            value: 0,
            data: call.data,
        };
        debug!(nonce = tx.nonce, gas_limit, "Signing transaction");

        let raw = tx.sign(key, chain_id)?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
        info!("Transaction submitted: {}", tx_hash);

        Ok(PendingTransaction {
            tx_hash,
            from,
            submitted_at: Utc::now(),
        })
    }

    async fn await_confirmation(&self, pending: &PendingTransaction) -> ClientResult<TransactionReceipt> {
        loop {
            match self.rpc.transaction_receipt(&pending.tx_hash).await? {
                Some(receipt) if receipt.status == ReceiptStatus::Success => {
                    info!("Transaction {} confirmed in block {}", receipt.tx_hash, receipt.block_number);
                    return Ok(receipt);
                }
                Some(receipt) => {
                    warn!("Transaction {} reverted in block {}", receipt.tx_hash, receipt.block_number);
                    return Err(ClientError::TransactionReverted {
                        tx_hash: receipt.tx_hash,
                        message: format!("execution failed in block {}", receipt.block_number),
                    });
                }
                None => tokio::time::sleep(self.receipt_poll_interval).await,
            }
        }
    }
}
