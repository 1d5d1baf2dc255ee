//! JSON-RPC transport to the chain hosting the faucet

use crate::error::{ClientError, ClientResult};
use crate::identity::{ReceiptStatus, TransactionReceipt};
use serde_json::{json, Value};
use spout_common::utils::converter::{from_hex, parse_quantity, parse_quantity_u64, to_hex};
use spout_common::{Address, TxHash};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// RPC client for interacting with blockchain
pub struct BlockchainRpcClient {
    rpc_url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl BlockchainRpcClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });
        trace!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("{} request failed: {}", method, e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("{} returned invalid JSON: {}", method, e)))?;

        if let Some(error) = body.get("error") {
            let data = error.get("data").map(|d| match d.as_str() {
                Some(s) => s.to_string(),
                None => d.to_string(),
            });
            return Err(ClientError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data,
            });
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    fn expect_str<'a>(method: &str, value: &'a Value) -> ClientResult<&'a str> {
        value
            .as_str()
            .ok_or_else(|| ClientError::Transport(format!("{} returned {} instead of a string", method, value)))
    }

    fn malformed(method: &str, err: anyhow::Error) -> ClientError {
        ClientError::Transport(format!("{} returned a malformed value: {}", method, err))
    }

    fn receipt_field<'a>(receipt: &'a Value, name: &str) -> ClientResult<&'a str> {
        receipt
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Transport(format!("eth_getTransactionReceipt is missing {}", name)))
    }

    fn call_object(from: Option<&Address>, to: &Address, data: &[u8]) -> Value {
        let mut object = json!({
            "to": format!("{}", to),
            "data": to_hex(data),
        });
        if let Some(from) = from {
            object["from"] = json!(format!("{}", from));
        }
        object
    }

    /// Read-only contract call against the latest block.
    pub async fn eth_call(
        &self,
        from: Option<&Address>,
        to: &Address,
        data: &[u8],
    ) -> ClientResult<Vec<u8>> {
        let result = self
            .call("eth_call", json!([Self::call_object(from, to, data), "latest"]))
            .await?;
        let hex_data = Self::expect_str("eth_call", &result)?;
        from_hex(hex_data).map_err(|e| Self::malformed("eth_call", e))
    }

    pub async fn chain_id(&self) -> ClientResult<u64> {
        let result = self.call("eth_chainId", json!([])).await?;
        parse_quantity_u64(Self::expect_str("eth_chainId", &result)?)
            .map_err(|e| Self::malformed("eth_chainId", e))
    }

    /// Next nonce for `address`, counting transactions still in the pool.
    pub async fn transaction_count(&self, address: &Address) -> ClientResult<u64> {
        let result = self
            .call("eth_getTransactionCount", json!([format!("{}", address), "pending"]))
            .await?;
        parse_quantity_u64(Self::expect_str("eth_getTransactionCount", &result)?)
            .map_err(|e| Self::malformed("eth_getTransactionCount", e))
    }

    pub async fn gas_price(&self) -> ClientResult<u128> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity(Self::expect_str("eth_gasPrice", &result)?)
            .map_err(|e| Self::malformed("eth_gasPrice", e))
    }

    /// Gas estimate for a call. A revert here means the contract refuses it.
    pub async fn estimate_gas(&self, from: &Address, to: &Address, data: &[u8]) -> ClientResult<u64> {
        let result = self
            .call("eth_estimateGas", json!([Self::call_object(Some(from), to, data)]))
            .await?;
        parse_quantity_u64(Self::expect_str("eth_estimateGas", &result)?)
            .map_err(|e| Self::malformed("eth_estimateGas", e))
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> ClientResult<TxHash> {
        let result = self
            .call("eth_sendRawTransaction", json!([to_hex(raw)]))
            .await?;
        let hash = Self::expect_str("eth_sendRawTransaction", &result)?;
        debug!("Transaction sent: {}", hash);
        hash.parse()
            .map_err(|e| ClientError::Transport(format!("eth_sendRawTransaction returned bad hash: {}", e)))
    }

    /// Receipt of a mined transaction, `None` while still pending.
    pub async fn transaction_receipt(&self, hash: &TxHash) -> ClientResult<Option<TransactionReceipt>> {
        const METHOD: &str = "eth_getTransactionReceipt";
        let result = self.call(METHOD, json!([hash.to_string()])).await?;
        if result.is_null() {
            return Ok(None);
        }

        let block_number = parse_quantity_u64(Self::receipt_field(&result, "blockNumber")?)
            .map_err(|e| Self::malformed(METHOD, e))?;
        let gas_used = parse_quantity_u64(Self::receipt_field(&result, "gasUsed")?)
            .map_err(|e| Self::malformed(METHOD, e))?;
        // Pre-Byzantium receipts carry no status; treat them as success.
        let status_code = match result.get("status").and_then(Value::as_str) {
            Some(s) => parse_quantity(s).map_err(|e| Self::malformed(METHOD, e))?,
            None => 1,
        };
        let status = if status_code == 0 {
            ReceiptStatus::Reverted
        } else {
            ReceiptStatus::Success
        };

        Ok(Some(TransactionReceipt {
            tx_hash: *hash,
            block_number,
            gas_used,
            status,
        }))
    }
}
