use std::collections::HashMap;
use std::sync::Arc;
use troupe_agent::StreamingResponder;
use troupe_core::{AgentRole, TroupeError, TroupeResult};

/// Pure lookup table from `(role, agent_id)` to the worker capability that
/// can execute a task of that role.
///
/// Carries no business logic: registration builds the table, dispatch reads
/// it. Unregistered pairs are [`TroupeError::WorkerUnavailable`]; role codes
/// outside the six defined values are rejected as
/// [`TroupeError::UnknownRole`] before any table lookup.
#[derive(Default)]
pub struct RoleDispatcher {
    workers: HashMap<(AgentRole, String), Arc<dyn StreamingResponder>>,
    roles: HashMap<String, AgentRole>,
}

impl RoleDispatcher {
    /// Empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker capability for a role/agent pair.
    pub fn register(
        &mut self,
        role: AgentRole,
        agent_id: impl Into<String>,
        responder: Arc<dyn StreamingResponder>,
    ) {
        let agent_id = agent_id.into();
        self.roles.insert(agent_id.clone(), role);
        self.workers.insert((role, agent_id), responder);
    }

    /// Resolve a worker by role and agent id.
    pub fn dispatch(
        &self,
        role: AgentRole,
        agent_id: &str,
    ) -> TroupeResult<Arc<dyn StreamingResponder>> {
        self.workers
            .get(&(role, agent_id.to_string()))
            .cloned()
            .ok_or_else(|| TroupeError::WorkerUnavailable {
                role: role.to_string(),
                agent_id: agent_id.to_string(),
            })
    }

    /// Resolve a worker by integer role code and agent id.
    pub fn dispatch_code(
        &self,
        code: u8,
        agent_id: &str,
    ) -> TroupeResult<Arc<dyn StreamingResponder>> {
        let role = AgentRole::from_code(code)?;
        self.dispatch(role, agent_id)
    }

    /// The role an agent id was registered under.
    pub fn role_of(&self, agent_id: &str) -> Option<AgentRole> {
        self.roles.get(agent_id).copied()
    }

    /// Resolve an agent id to its role and worker in one step.
    pub fn lookup(&self, agent_id: &str) -> TroupeResult<(AgentRole, Arc<dyn StreamingResponder>)> {
        let role = self
            .role_of(agent_id)
            .ok_or_else(|| TroupeError::WorkerUnavailable {
                role: "unregistered".to_string(),
                agent_id: agent_id.to_string(),
            })?;
        Ok((role, self.dispatch(role, agent_id)?))
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_agent::ScriptedResponder;

    fn dispatcher() -> RoleDispatcher {
        let mut dispatcher = RoleDispatcher::new();
        dispatcher.register(
            AgentRole::Researcher,
            "researcher-1",
            Arc::new(ScriptedResponder::replying("findings")),
        );
        dispatcher.register(
            AgentRole::Writer,
            "writer-1",
            Arc::new(ScriptedResponder::replying("draft")),
        );
        dispatcher
    }

    #[test]
    fn test_dispatch_registered() {
        let dispatcher = dispatcher();
        assert!(dispatcher
            .dispatch(AgentRole::Researcher, "researcher-1")
            .is_ok());
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn test_dispatch_unregistered_pair() {
        let dispatcher = dispatcher();
        // Wrong role for a known agent id is still unavailable.
        let err = dispatcher
            .dispatch(AgentRole::Reviewer, "researcher-1")
            .err()
            .unwrap();
        assert!(matches!(err, TroupeError::WorkerUnavailable { .. }));

        let err = dispatcher.dispatch(AgentRole::Writer, "ghost").err().unwrap();
        assert!(matches!(err, TroupeError::WorkerUnavailable { .. }));
    }

    #[test]
    fn test_dispatch_by_code() {
        let dispatcher = dispatcher();
        assert!(dispatcher.dispatch_code(4, "researcher-1").is_ok());
        assert!(matches!(
            dispatcher.dispatch_code(9, "researcher-1"),
            Err(TroupeError::UnknownRole(9))
        ));
    }

    #[test]
    fn test_lookup() {
        let dispatcher = dispatcher();
        let (role, _) = dispatcher.lookup("writer-1").unwrap();
        assert_eq!(role, AgentRole::Writer);
        assert!(dispatcher.lookup("ghost").is_err());
    }
}
