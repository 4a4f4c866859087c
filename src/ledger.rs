use crate::config::WalletdConfig;
use crate::error::{Error, Result};
use crate::wallet::WalletAddress;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// Bad address application code returned by the wallet daemon.
const BAD_ADDRESS_CODE: i64 = 7;

/// The custodial service holding and moving the pooled funds.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether the daemon recognizes the address as well-formed and live.
    async fn check_liveness(&self, address: &str) -> Result<bool>;

    /// The bot's own pool address (the first address of the container).
    async fn primary_address(&self) -> Result<String>;

    async fn balance(&self, address: &WalletAddress) -> Result<u64>;

    /// Single best-effort batched transfer. Never retried: a second attempt
    /// after a timeout risks paying everyone twice.
    async fn transfer(
        &self,
        per_wallet: u64,
        fee: u64,
        addresses: &[WalletAddress],
    ) -> Result<String>;
}

/// JSON-RPC 2.0 client for the wallet daemon.
pub struct WalletdClient {
    http: Client,
    endpoint: Url,
    request_id: AtomicU64,
}

impl WalletdClient {
    pub fn setup(config: &WalletdConfig, timeout: Option<u64>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout.unwrap_or(30)))
            .build()?;
        let endpoint = Url::parse(&format!(
            "http://{}:{}/json_rpc",
            config.service_address, config.service_port
        ))
        .map_err(|e| Error::Setup(format!("bad walletd endpoint: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            request_id: AtomicU64::new(0),
        })
    }

    /// Sends one request and returns the raw response object, error body
    /// included. Callers that only care about `result` go through
    /// [`Self::result`].
    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!("walletd <- {} (id {})", method, id);

        let response = self.http.post(self.endpoint.clone()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::BadResponse(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        Ok(response.json::<Value>().await?)
    }

    fn result(response: Value) -> Result<Value> {
        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string();
            return Err(Error::Ledger { code, message });
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| Error::BadResponse("missing result field".to_string()))
    }
}

#[async_trait]
impl LedgerClient for WalletdClient {
    async fn check_liveness(&self, address: &str) -> Result<bool> {
        let response = self.rpc("getBalance", json!({ "address": address })).await?;

        // No error value means it is one of our own addresses, which is valid.
        let error = match response.get("error") {
            None => return Ok(true),
            Some(error) => error,
        };
        let application_code = error
            .pointer("/data/application_code")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::BadResponse("missing application_code".to_string()))?;

        Ok(application_code != BAD_ADDRESS_CODE)
    }

    async fn primary_address(&self) -> Result<String> {
        let result = Self::result(self.rpc("getAddresses", json!({})).await?)?;
        result
            .pointer("/addresses/0")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::BadResponse("wallet has no addresses".to_string()))
    }

    async fn balance(&self, address: &WalletAddress) -> Result<u64> {
        let result = Self::result(
            self.rpc("getBalance", json!({ "address": address.as_str() })).await?,
        )?;
        result
            .get("availableBalance")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::BadResponse("missing availableBalance".to_string()))
    }

    async fn transfer(
        &self,
        per_wallet: u64,
        fee: u64,
        addresses: &[WalletAddress],
    ) -> Result<String> {
        let transfers: Vec<Value> = addresses
            .iter()
            .map(|address| json!({ "amount": per_wallet, "address": address.as_str() }))
            .collect();
        let params = json!({
            "fee": fee,
            "anonymity": 0,
            "transfers": transfers,
        });

        let result = Self::result(self.rpc("sendTransaction", params).await?)?;
        result
            .get("transactionHash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::BadResponse("missing transactionHash".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_unwraps_the_result_field() {
        let response = json!({ "result": { "availableBalance": 1500 } });
        let result = WalletdClient::result(response).unwrap();
        assert_eq!(result["availableBalance"], 1500);
    }

    #[test]
    fn result_surfaces_ledger_errors() {
        let response = json!({
            "error": { "code": -32000, "message": "busy", "data": { "application_code": 3 } }
        });
        match WalletdClient::result(response) {
            Err(Error::Ledger { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "busy");
            }
            other => panic!("expected ledger error, got {:?}", other),
        }
    }
}
