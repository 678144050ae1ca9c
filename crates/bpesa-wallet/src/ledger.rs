//! Ledger collaborator: permit nonce and token balance of an account.
//!
//! Responses are untrusted for freshness. The wallet core fetches the
//! nonce immediately before every signature and never caches it; any
//! failure fails the authorize call instead of guessing.

use alloy_primitives::utils::format_units;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use bpesa_types::config::NetworkConfig;
use bpesa_types::{Address, BpesaError, Result, U256};
use serde::Deserialize;

sol! {
    function nonces(address owner) external view returns (uint256);
    function balanceOf(address account) external view returns (uint256);
}

/// Read access to the token contract on the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current permit nonce of `owner`.
    async fn nonce(&self, owner: Address) -> Result<U256>;

    /// Token balance of `owner` as a whole-token decimal string.
    async fn balance(&self, owner: Address) -> Result<String>;
}

// ---------------------------------------------------------------------------
// JsonRpcLedger
// ---------------------------------------------------------------------------

/// [`LedgerClient`] backed by an EVM JSON-RPC endpoint (`eth_call`).
#[derive(Clone, Debug)]
pub struct JsonRpcLedger {
    http_client: reqwest::Client,
    rpc_url: String,
    token_contract: Address,
    decimals: u8,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl JsonRpcLedger {
    /// Creates a client for the network's RPC endpoint and token.
    ///
    /// Timeouts are applied by the caller around each call.
    pub fn new(network: &NetworkConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            rpc_url: network.rpc_url.clone(),
            token_contract: network.token_contract,
            decimals: network.decimals,
        }
    }

    async fn eth_call(&self, calldata: Vec<u8>) -> Result<U256> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {
                    "to": self.token_contract.to_checksum(None),
                    "data": format!("0x{}", hex::encode(calldata)),
                },
                "latest"
            ],
        });

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BpesaError::LedgerUnavailable {
                reason: format!("RPC request failed: {e}"),
            })?;

        let response: RpcResponse = response.json().await.map_err(|e| BpesaError::LedgerUnavailable {
            reason: format!("RPC response is not JSON-RPC: {e}"),
        })?;

        if let Some(error) = response.error {
            return Err(BpesaError::LedgerUnavailable {
                reason: format!("RPC error {}: {}", error.code, error.message),
            });
        }

        let result = response.result.ok_or_else(|| BpesaError::LedgerUnavailable {
            reason: "RPC response has neither result nor error".into(),
        })?;
        decode_uint256_word(&result)
    }
}

/// Decodes the first 32-byte word of a `0x`-prefixed `eth_call` result.
fn decode_uint256_word(result: &str) -> Result<U256> {
    let hex_data = result.strip_prefix("0x").unwrap_or(result);
    let bytes = hex::decode(hex_data).map_err(|e| BpesaError::LedgerUnavailable {
        reason: format!("eth_call result is not hex: {e}"),
    })?;

    if bytes.len() < 32 {
        return Err(BpesaError::LedgerUnavailable {
            reason: format!("eth_call returned {} bytes, expected a uint256", bytes.len()),
        });
    }

    Ok(U256::from_be_slice(&bytes[..32]))
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn nonce(&self, owner: Address) -> Result<U256> {
        let nonce = self.eth_call(noncesCall { owner }.abi_encode()).await?;
        tracing::debug!(%owner, %nonce, "permit nonce fetched");
        Ok(nonce)
    }

    async fn balance(&self, owner: Address) -> Result<String> {
        let raw = self.eth_call(balanceOfCall { account: owner }.abi_encode()).await?;
        format_units(raw, self.decimals).map_err(|e| BpesaError::LedgerUnavailable {
            reason: format!("balance cannot be formatted: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
