//! Peer RPC plumbing.
//!
//! The sync engine only ever talks to peers through [`RpcTransport`], a single
//! `call(endpoint, method, params)` operation. [`HttpRpcClient`] is the JSON-RPC
//! over HTTP implementation used in production. With the
//! `dev-context-only-utils` feature, `ScriptedTransport` answers from
//! in-process state for the test suites.

pub mod client;
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod scripted;

pub use client::HttpRpcClient;
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub use scripted::{ScriptedEndpoint, ScriptedTransport};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Method names understood by chain RPC peers
pub mod methods {
    pub const GET_BLOCK: &str = "getblock";
    pub const GET_BLOCK_COUNT: &str = "getblockcount";
    pub const GET_VERSION: &str = "getversion";
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("Empty RPC response")]
    EmptyResult,
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

/// Turns a method name into a call against one peer endpoint.
///
/// Timeouts are the transport's concern; callers never wrap calls in their own.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, endpoint: &str, method: &str, params: Value) -> Result<Value, RpcError>;
}
