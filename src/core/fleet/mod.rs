//! Registry of currently-connected agents and target resolution.

pub mod connection;

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub use connection::{AgentConnection, AgentResponse, ConnectionError};

/// One connected remote endpoint. The registry holds it only while the
/// transport reports the connection alive.
pub struct Agent {
    pub id: String,
    pub groups: Vec<String>,
    /// Whether this agent accepts file pushes (agent-local policy).
    pub push_enabled: bool,
    pub connection: Arc<dyn AgentConnection>,
}

impl Agent {
    pub fn in_any_group(&self, group_ids: &[String]) -> bool {
        self.groups.iter().any(|g| group_ids.contains(g))
    }
}

pub struct FleetRegistry {
    agents: Mutex<HashMap<String, Arc<Agent>>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, agent: Agent) -> Arc<Agent> {
        let agent = Arc::new(agent);
        info!("Agent [{}] connected", agent.id);
        self.agents
            .lock()
            .await
            .insert(agent.id.clone(), agent.clone());
        agent
    }

    pub async fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.agents.lock().await.remove(agent_id).is_some();
        if removed {
            info!("Agent [{}] disconnected", agent_id);
        }
        removed
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.lock().await.get(agent_id).cloned()
    }

    /// All connected agents, ordered by id.
    pub async fn list(&self) -> Vec<Arc<Agent>> {
        let agents = self.agents.lock().await;
        let mut out: Vec<Arc<Agent>> = agents.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Resolves explicit agent ids plus group ids into a deduplicated,
    /// ordered target list. Unknown or disconnected ids are silently dropped;
    /// callers run [`validate_targets`] on the result before dispatching.
    ///
    /// Returns the targets and how many of them were reached only through
    /// group membership.
    pub async fn resolve_targets(
        &self,
        client_ids: &[String],
        group_ids: &[String],
    ) -> (Vec<Arc<Agent>>, usize) {
        let agents = self.agents.lock().await;

        let mut resolved: Vec<Arc<Agent>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for id in client_ids {
            if let Some(agent) = agents.get(id)
                && seen.insert(agent.id.clone())
            {
                resolved.push(agent.clone());
            }
        }

        let mut group_members: Vec<Arc<Agent>> = agents
            .values()
            .filter(|a| a.in_any_group(group_ids))
            .cloned()
            .collect();
        group_members.sort_by(|a, b| a.id.cmp(&b.id));

        let mut from_groups = 0;
        for agent in group_members {
            if seen.insert(agent.id.clone()) {
                from_groups += 1;
                resolved.push(agent);
            }
        }

        (resolved, from_groups)
    }
}

impl Default for FleetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects empty target sets with a message naming what went wrong, so a
/// dispatch never starts against zero agents.
pub fn validate_targets(
    client_ids: &[String],
    group_ids: &[String],
    resolved: &[Arc<Agent>],
    from_groups: usize,
) -> Result<()> {
    if !group_ids.is_empty() && from_groups == 0 && client_ids.is_empty() {
        bail!("no active agents belong to the selected group(s)");
    }
    if client_ids.is_empty() && group_ids.is_empty() {
        bail!("at least 1 agent should be specified");
    }
    if resolved.is_empty() {
        bail!("no active agents found for the provided criteria");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::OperationKind;
    use async_trait::async_trait;

    struct NullConnection;

    #[async_trait]
    impl AgentConnection for NullConnection {
        async fn send_request(
            &self,
            _kind: OperationKind,
            _payload: serde_json::Value,
        ) -> Result<AgentResponse, ConnectionError> {
            Err(ConnectionError::Disconnected)
        }
    }

    fn agent(id: &str, groups: &[&str]) -> Agent {
        Agent {
            id: id.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            push_enabled: true,
            connection: Arc::new(NullConnection),
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn resolves_explicit_ids_in_request_order() {
        let fleet = FleetRegistry::new();
        fleet.register(agent("b", &[])).await;
        fleet.register(agent("a", &[])).await;

        let (resolved, from_groups) =
            fleet.resolve_targets(&ids(&["a", "b"]), &[]).await;
        let resolved_ids: Vec<&str> = resolved.iter().map(|a| a.id.as_str()).collect();

        assert_eq!(resolved_ids, vec!["a", "b"]);
        assert_eq!(from_groups, 0);
        assert!(validate_targets(&ids(&["a", "b"]), &[], &resolved, from_groups).is_ok());
    }

    #[tokio::test]
    async fn unknown_ids_are_dropped_silently() {
        let fleet = FleetRegistry::new();
        fleet.register(agent("a", &[])).await;

        let (resolved, _) = fleet.resolve_targets(&ids(&["a", "ghost"]), &[]).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "a");
    }

    #[tokio::test]
    async fn group_members_are_deduplicated_against_explicit_ids() {
        let fleet = FleetRegistry::new();
        fleet.register(agent("a", &["web"])).await;
        fleet.register(agent("b", &["web"])).await;
        fleet.register(agent("c", &["db"])).await;

        let (resolved, from_groups) = fleet
            .resolve_targets(&ids(&["a"]), &ids(&["web"]))
            .await;
        let resolved_ids: Vec<&str> = resolved.iter().map(|a| a.id.as_str()).collect();

        // "a" counts as explicit, only "b" is reached via the group.
        assert_eq!(resolved_ids, vec!["a", "b"]);
        assert_eq!(from_groups, 1);
    }

    #[tokio::test]
    async fn empty_group_resolution_fails_validation() {
        let fleet = FleetRegistry::new();
        fleet.register(agent("a", &["web"])).await;

        let group_ids = ids(&["g1"]);
        let (resolved, from_groups) = fleet.resolve_targets(&[], &group_ids).await;

        assert!(resolved.is_empty());
        let err = validate_targets(&[], &group_ids, &resolved, from_groups)
            .unwrap_err()
            .to_string();
        assert_eq!(err, "no active agents belong to the selected group(s)");
    }

    #[tokio::test]
    async fn no_criteria_at_all_fails_validation() {
        let err = validate_targets(&[], &[], &[], 0).unwrap_err().to_string();
        assert_eq!(err, "at least 1 agent should be specified");
    }

    #[tokio::test]
    async fn all_explicit_ids_unreachable_fails_validation() {
        let fleet = FleetRegistry::new();
        let client_ids = ids(&["ghost"]);
        let (resolved, from_groups) = fleet.resolve_targets(&client_ids, &[]).await;

        let err = validate_targets(&client_ids, &[], &resolved, from_groups)
            .unwrap_err()
            .to_string();
        assert_eq!(err, "no active agents found for the provided criteria");
    }

    #[tokio::test]
    async fn disconnect_removes_the_agent_from_resolution() {
        let fleet = FleetRegistry::new();
        fleet.register(agent("a", &[])).await;
        assert!(fleet.unregister("a").await);

        let (resolved, _) = fleet.resolve_targets(&ids(&["a"]), &[]).await;
        assert!(resolved.is_empty());
    }
}
