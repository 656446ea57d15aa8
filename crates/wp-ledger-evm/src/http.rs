use async_trait::async_trait;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, warn};
use wp_ledger_client::{ProviderError, Timer};

use crate::Transport;

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// JSON-RPC 2.0 over HTTP to an Ethereum node.
///
/// Reads `WAVE_PORTAL_RPC_URL` from the environment when no endpoint is
/// given (default: `http://localhost:8545`). Accounts must be unlocked on
/// the node for `eth_sendTransaction` to succeed.
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
    next_id: Cell<u64>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpTransport {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("WAVE_PORTAL_RPC_URL").ok())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            next_id: Cell::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// ── JSON-RPC envelope ──

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, ProviderError> {
        if let Some(err) = self.error {
            return Err(ProviderError::rpc(err.code, err.message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

impl Timer for HttpTransport {
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed_local()
    }
}

#[async_trait(?Send)]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        debug!(method, id, "json-rpc request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("{method}: HTTP {status}: {text}")));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("{method}: {err}")))?;
        body.into_result()
    }

    fn notify(&self, method: &'static str, params: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(method, "no tokio runtime; notification dropped");
            return;
        };
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        debug!(method, id, "json-rpc notification");

        let request = self.http.post(&self.endpoint).json(&RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        });
        runtime.spawn(async move {
            if let Err(err) = request.send().await {
                warn!(method, error = %err, "json-rpc notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_endpoint_wins_and_is_trimmed() {
        let transport = HttpTransport::new(Some("http://node:8545/".to_owned()));
        assert_eq!(transport.endpoint(), "http://node:8545");
    }

    #[test]
    fn error_body_maps_to_provider_error() -> anyhow::Result<()> {
        let rejected: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected"}}"#,
        )?;
        assert_eq!(rejected.into_result(), Err(ProviderError::UserRejected));

        let ok: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":2,"result":"0x2a"}"#)?;
        assert_eq!(ok.into_result()?, Value::String("0x2a".to_owned()));

        let null: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":null}"#)?;
        assert_eq!(null.into_result()?, Value::Null);
        Ok(())
    }

    #[test]
    fn notification_outside_a_runtime_is_dropped_quietly() {
        let transport = HttpTransport::new(Some("http://127.0.0.1:9".to_owned()));
        transport.notify("eth_uninstallFilter", serde_json::json!(["0x1"]));
        assert_eq!(transport.next_id.get(), 1);
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        let transport = HttpTransport::new(Some("http://127.0.0.1:9".to_owned()));
        assert!(matches!(
            transport.request("eth_blockNumber", Value::Array(Vec::new())).await,
            Err(ProviderError::Transport(_))
        ));
    }
}
