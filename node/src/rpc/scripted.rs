//! In-process transport answering from scripted per-endpoint state.

use super::{methods, RpcError, RpcTransport};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// What one scripted endpoint answers
#[derive(Debug, Clone, Default)]
pub struct ScriptedEndpoint {
    /// Answer to `getblockcount`; `None` makes the call fail
    pub height: Option<u64>,
    /// Every call fails as if the peer were unreachable
    pub unreachable: bool,
    /// Delay applied before answering
    pub latency: Duration,
    /// Explicit block payloads; heights up to `height` not listed here are synthesized
    pub blocks: HashMap<u64, Value>,
    /// Heights for which `getblock` fails even though they are below the tip
    pub failing_blocks: Vec<u64>,
}

impl ScriptedEndpoint {
    pub fn at_height(height: u64) -> Self {
        Self {
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    endpoints: RwLock<HashMap<String, ScriptedEndpoint>>,
    calls: RwLock<HashMap<(String, String), usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(self, endpoint: &str, script: ScriptedEndpoint) -> Self {
        self.endpoints.write().insert(endpoint.to_string(), script);
        self
    }

    pub fn set_endpoint(&self, endpoint: &str, script: ScriptedEndpoint) {
        self.endpoints.write().insert(endpoint.to_string(), script);
    }

    pub fn set_height(&self, endpoint: &str, height: Option<u64>) {
        self.endpoints
            .write()
            .entry(endpoint.to_string())
            .or_default()
            .height = height;
    }

    pub fn set_unreachable(&self, endpoint: &str, unreachable: bool) {
        self.endpoints
            .write()
            .entry(endpoint.to_string())
            .or_default()
            .unreachable = unreachable;
    }

    pub fn call_count(&self, endpoint: &str, method: &str) -> usize {
        self.calls
            .read()
            .get(&(endpoint.to_string(), method.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Payload synthesized for heights without an explicit block
    pub fn synthetic_block(height: u64) -> Value {
        json!({
            "index": height,
            "hash": format!("0x{:064x}", height),
            "tx": [],
        })
    }

    fn answer(script: &ScriptedEndpoint, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            methods::GET_BLOCK_COUNT => script.height.map(Value::from).ok_or(RpcError::Remote {
                code: -32603,
                message: "height unavailable".to_string(),
            }),
            methods::GET_BLOCK => {
                let height = params
                    .get(0)
                    .and_then(Value::as_u64)
                    .ok_or_else(|| RpcError::InvalidResponse("missing height param".to_string()))?;
                if script.failing_blocks.contains(&height) {
                    return Err(RpcError::Remote {
                        code: -100,
                        message: "Unknown block".to_string(),
                    });
                }
                if let Some(block) = script.blocks.get(&height) {
                    return Ok(block.clone());
                }
                match script.height {
                    Some(tip) if height <= tip => Ok(Self::synthetic_block(height)),
                    _ => Err(RpcError::Remote {
                        code: -100,
                        message: "Unknown block".to_string(),
                    }),
                }
            }
            methods::GET_VERSION => Ok(json!({
                "port": 0,
                "nonce": 0,
                "useragent": "/scripted:0.1.0/",
            })),
            other => Err(RpcError::Remote {
                code: -32601,
                message: format!("Method not found: {other}"),
            }),
        }
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(&self, endpoint: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        *self
            .calls
            .write()
            .entry((endpoint.to_string(), method.to_string()))
            .or_insert(0) += 1;

        let script = self.endpoints.read().get(endpoint).cloned();
        let script = match script {
            Some(script) if !script.unreachable => script,
            _ => return Err(RpcError::Transport(format!("{endpoint} unreachable"))),
        };

        if !script.latency.is_zero() {
            tokio::time::sleep(script.latency).await;
        }

        Self::answer(&script, method, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_height_and_blocks_below_tip() {
        let transport =
            ScriptedTransport::new().with_endpoint("http://a", ScriptedEndpoint::at_height(10));

        let height = transport
            .call("http://a", methods::GET_BLOCK_COUNT, json!([]))
            .await
            .unwrap();
        assert_eq!(height, json!(10));

        let block = transport
            .call("http://a", methods::GET_BLOCK, json!([7, 1]))
            .await
            .unwrap();
        assert_eq!(block["index"], json!(7));

        assert!(transport
            .call("http://a", methods::GET_BLOCK, json!([11, 1]))
            .await
            .is_err());
        assert_eq!(transport.call_count("http://a", methods::GET_BLOCK), 2);
    }

    #[tokio::test]
    async fn unknown_and_unreachable_endpoints_fail() {
        let transport =
            ScriptedTransport::new().with_endpoint("http://down", ScriptedEndpoint::unreachable());

        assert!(matches!(
            transport.call("http://down", methods::GET_VERSION, json!([])).await,
            Err(RpcError::Transport(_))
        ));
        assert!(matches!(
            transport.call("http://nowhere", methods::GET_VERSION, json!([])).await,
            Err(RpcError::Transport(_))
        ));
    }
}
