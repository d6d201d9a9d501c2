//! Ethereum JSON-RPC client helpers for the ephemeral chain.
//!
//! Only the `result` member of a response is ever consumed; an `error` member
//! or a missing `result` is a failure.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// JSON-RPC transport. Returns the `result` member of the response envelope.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value>;
}

/// Extract `result` from a JSON-RPC 2.0 response envelope.
pub fn parse_envelope(method: &str, response: Value) -> Result<Value> {
    if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(anyhow!("{} returned error: {}", method, message));
    }
    match response.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(anyhow!("{} response missing result field", method)),
    }
}

/// HTTP JSON-RPC client. Blocking `ureq` calls run on the blocking pool.
#[derive(Debug, Clone)]
pub struct HttpRpc {
    url: String,
}

impl HttpRpc {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let url = self.url.clone();
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let method_owned = method.to_string();
        let response = tokio::task::spawn_blocking(move || -> Result<Value> {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            let resp = agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_json(body)
                .with_context(|| format!("POST {} ({})", url, method_owned))?;
            resp.into_json::<Value>()
                .with_context(|| format!("decode {} response", method_owned))
        })
        .await
        .context("rpc task panicked")??;

        parse_envelope(method, response)
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &Value) -> Result<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| anyhow!("expected hex quantity string, got {}", value))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("hex quantity missing 0x prefix: {}", s))?;
    if digits.is_empty() {
        return Err(anyhow!("empty hex quantity"));
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity {}", s))
}

/// Liveness probe: `eth_blockNumber` must return a well-formed quantity.
pub async fn block_number(rpc: &dyn ChainRpc, timeout: Duration) -> Result<u64> {
    let result = rpc.call("eth_blockNumber", json!([]), timeout).await?;
    parse_quantity(&result)
}

pub async fn transaction_count(rpc: &dyn ChainRpc, address: &str, timeout: Duration) -> Result<u64> {
    let result = rpc
        .call(
            "eth_getTransactionCount",
            json!([address, "latest"]),
            timeout,
        )
        .await?;
    parse_quantity(&result)
}

/// `contractAddress` from a transaction receipt, if the receipt exists and has one.
pub async fn receipt_contract_address(
    rpc: &dyn ChainRpc,
    tx_hash: &str,
    timeout: Duration,
) -> Result<Option<String>> {
    let receipt = rpc
        .call("eth_getTransactionReceipt", json!([tx_hash]), timeout)
        .await?;
    Ok(receipt
        .get("contractAddress")
        .and_then(Value::as_str)
        .map(str::to_string))
}
