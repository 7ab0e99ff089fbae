use super::{RpcError, RpcTransport};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

const JSONRPC_VERSION: &str = "2.0";
const REQUEST_ID: u64 = 0;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 over HTTP POST
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    client: Client,
}

impl HttpRpcClient {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn call(&self, endpoint: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        trace!("POST {} method={}", endpoint, method);
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: REQUEST_ID,
        };

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        match rpc_response.result {
            Some(Value::Null) | None => Err(RpcError::EmptyResult),
            Some(result) => Ok(result),
        }
    }
}
