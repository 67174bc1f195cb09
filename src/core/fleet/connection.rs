//! Boundary to the transport layer.
//!
//! The control plane never manages connection lifecycle, reconnection or
//! heartbeats; it only sends one operation payload to one connected agent
//! and awaits a typed response or a typed failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::dispatch::OperationKind;

/// What a connected agent sends back for an accepted operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub message: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The agent's protocol version predates this operation kind.
    #[error("agent error: unknown request")]
    UnknownRequest,
    #[error("agent disconnected")]
    Disconnected,
    #[error("agent rejected the request: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait AgentConnection: Send + Sync {
    async fn send_request(
        &self,
        kind: OperationKind,
        payload: serde_json::Value,
    ) -> Result<AgentResponse, ConnectionError>;
}
