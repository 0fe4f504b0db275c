//! JSON-RPC transport.
//!
//! A deliberately small HTTP client covering exactly the node calls this
//! client needs. The [`ChainRpc`] trait is the seam that lets sequence,
//! finalization and listener logic run against a mock in tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use crate::error::{ChainError, ChainResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// One log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
}

/// Node operations used by this client.
pub trait ChainRpc: Send + Sync {
    /// `eth_getTransactionCount` for `address` at the latest block.
    fn transaction_count(&self, address: Address) -> BoxFuture<'_, ChainResult<u64>>;

    /// `eth_sendRawTransaction`; returns the transaction hash.
    fn send_raw_transaction(&self, raw: Vec<u8>) -> BoxFuture<'_, ChainResult<B256>>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is not
    /// mined, otherwise the execution status (`false` = reverted).
    fn transaction_receipt(&self, hash: B256) -> BoxFuture<'_, ChainResult<Option<bool>>>;

    /// `eth_call` against `to` with `data` (read-only simulation).
    fn call(&self, to: Address, data: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>>;

    /// `eth_getLogs` for `address` over the inclusive block range.
    fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'_, ChainResult<Vec<LogEntry>>>;

    /// `eth_blockNumber`.
    fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>>;

    /// `eth_chainId`.
    fn chain_id(&self) -> BoxFuture<'_, ChainResult<u64>>;
}

/// Default timeout for node requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// JSON-RPC-over-HTTP client.
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for the given node endpoint.
    ///
    /// # Errors
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>) -> ChainResult<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> ChainResult<Value> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!(method, "rpc request");
        let resp: RpcResponse = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.error {
            // Nodes put the revert payload in `data` as hex; decode the
            // standard Error(string) shape when present.
            let detail = err
                .data
                .as_ref()
                .and_then(|d| d.as_str())
                .map(|s| {
                    hex::decode(s.strip_prefix("0x").unwrap_or(s))
                        .ok()
                        .and_then(|bytes| decode_revert_reason(&bytes))
                        .unwrap_or_else(|| s.to_string())
                })
                .unwrap_or_default();
            return Err(ChainError::Rpc(format!(
                "{} (code {}){}{}",
                err.message,
                err.code,
                if detail.is_empty() { "" } else { ": " },
                detail
            )));
        }
        // A null result is meaningful for some methods (pending receipt
        // lookups); callers that need a value reject it when parsing.
        Ok(resp.result.unwrap_or(Value::Null))
    }

    async fn quantity(&self, method: &str, params: Value) -> ChainResult<u64> {
        let value = self.request(method, params).await?;
        let s = value
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("{method}: expected hex quantity")))?;
        parse_quantity(s)
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(s: &str) -> ChainResult<u64> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(hex, 16).map_err(|e| ChainError::Decode(format!("bad quantity {s}: {e}")))
}

fn parse_bytes(value: &Value, what: &str) -> ChainResult<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("{what}: expected hex bytes")))?;
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| ChainError::Decode(format!("{what}: {e}")))
}

fn parse_log(value: &Value) -> ChainResult<LogEntry> {
    let address: Address = value
        .get("address")
        .and_then(|a| a.as_str())
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| ChainError::Decode("log: bad address".to_string()))?;
    let topics = value
        .get("topics")
        .and_then(|t| t.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.as_str())
                .filter_map(|t| t.parse().ok())
                .collect::<Vec<B256>>()
        })
        .unwrap_or_default();
    let data = value
        .get("data")
        .map(|d| parse_bytes(d, "log data"))
        .transpose()?
        .unwrap_or_default();
    let block_number = value
        .get("blockNumber")
        .and_then(|b| b.as_str())
        .map(parse_quantity)
        .transpose()?
        .unwrap_or_default();
    Ok(LogEntry {
        address,
        topics,
        data,
        block_number,
    })
}

impl ChainRpc for RpcClient {
    fn transaction_count(&self, address: Address) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move {
            self.quantity(
                "eth_getTransactionCount",
                json!([format!("{address:?}"), "latest"]),
            )
            .await
        })
    }

    fn send_raw_transaction(&self, raw: Vec<u8>) -> BoxFuture<'_, ChainResult<B256>> {
        Box::pin(async move {
            let value = self
                .request(
                    "eth_sendRawTransaction",
                    json!([format!("0x{}", hex::encode(raw))]),
                )
                .await?;
            value
                .as_str()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ChainError::Decode("bad transaction hash".to_string()))
        })
    }

    fn transaction_receipt(&self, hash: B256) -> BoxFuture<'_, ChainResult<Option<bool>>> {
        Box::pin(async move {
            let value = self
                .request("eth_getTransactionReceipt", json!([format!("{hash:?}")]))
                .await?;
            if value.is_null() {
                return Ok(None);
            }
            let succeeded = value
                .get("status")
                .and_then(|s| s.as_str())
                .map(parse_quantity)
                .transpose()?
                .map_or(true, |status| status == 1);
            Ok(Some(succeeded))
        })
    }

    fn call(&self, to: Address, data: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>> {
        Box::pin(async move {
            let value = self
                .request(
                    "eth_call",
                    json!([
                        {"to": format!("{to:?}"), "data": format!("0x{}", hex::encode(data))},
                        "latest"
                    ]),
                )
                .await?;
            parse_bytes(&value, "eth_call result")
        })
    }

    fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'_, ChainResult<Vec<LogEntry>>> {
        Box::pin(async move {
            let value = self
                .request(
                    "eth_getLogs",
                    json!([{
                        "address": format!("{address:?}"),
                        "fromBlock": format!("0x{from_block:x}"),
                        "toBlock": format!("0x{to_block:x}"),
                    }]),
                )
                .await?;
            value
                .as_array()
                .ok_or_else(|| ChainError::Decode("eth_getLogs: expected array".to_string()))?
                .iter()
                .map(parse_log)
                .collect()
        })
    }

    fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move { self.quantity("eth_blockNumber", json!([])).await })
    }

    fn chain_id(&self) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move { self.quantity("eth_chainId", json!([])).await })
    }
}

/// Decode a standard `Error(string)` revert payload.
#[must_use]
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    // 0x08c379a0 selector, then abi-encoded (offset, length, bytes)
    const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
    if data.len() < 4 + 64 || data[..4] != ERROR_SELECTOR {
        return None;
    }
    let body = &data[4..];
    // The length word is attacker-controlled; reject anything the
    // payload cannot actually hold before narrowing to usize.
    let len_word = U256::from_be_slice(&body[32..64]);
    if len_word > U256::from(body.len()) {
        return None;
    }
    let len = len_word.to::<usize>();
    let start = 64;
    if body.len() < start + len {
        return None;
    }
    String::from_utf8(body[start..start + len].to_vec()).ok()
}
