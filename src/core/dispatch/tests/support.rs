use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::dispatch::OperationKind;
use crate::core::fleet::{Agent, AgentConnection, AgentResponse, ConnectionError};

/// How a scripted test agent reacts to a request.
pub enum Behavior {
    Succeed(&'static str),
    SucceedAfter(Duration, &'static str),
    UnknownRequest,
    Disconnect,
    Reject(&'static str),
}

pub struct ScriptedConnection {
    behavior: Behavior,
    pub calls: AtomicUsize,
}

impl ScriptedConnection {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AgentConnection for ScriptedConnection {
    async fn send_request(
        &self,
        _kind: OperationKind,
        _payload: serde_json::Value,
    ) -> Result<AgentResponse, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed(msg) => Ok(AgentResponse {
                message: msg.to_string(),
                payload: serde_json::json!({}),
            }),
            Behavior::SucceedAfter(delay, msg) => {
                tokio::time::sleep(*delay).await;
                Ok(AgentResponse {
                    message: msg.to_string(),
                    payload: serde_json::json!({}),
                })
            }
            Behavior::UnknownRequest => Err(ConnectionError::UnknownRequest),
            Behavior::Disconnect => Err(ConnectionError::Disconnected),
            Behavior::Reject(reason) => Err(ConnectionError::Rejected(reason.to_string())),
        }
    }
}

pub fn scripted_agent(id: &str, connection: Arc<ScriptedConnection>) -> Arc<Agent> {
    Arc::new(Agent {
        id: id.to_string(),
        groups: Vec::new(),
        push_enabled: true,
        connection,
    })
}

pub fn no_push_agent(id: &str, connection: Arc<ScriptedConnection>) -> Arc<Agent> {
    Arc::new(Agent {
        id: id.to_string(),
        groups: Vec::new(),
        push_enabled: false,
        connection,
    })
}
