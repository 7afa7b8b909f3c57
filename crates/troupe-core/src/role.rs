use crate::{TroupeError, TroupeResult};
use serde::{Deserialize, Serialize};

/// Role of each agent in the multi-agent system.
///
/// The set is closed: exactly these six roles exist, each with a stable
/// integer code used on the wire. [`AgentRole::from_code`] is total over the
/// codes 1–6 and rejects everything else explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentRole {
    /// Produces the plan a run executes.
    Supervisor,
    /// Breaks problems down and interprets intermediate results.
    Analyst,
    /// General-purpose task execution.
    Worker,
    /// Gathers information and sources.
    Researcher,
    /// Produces prose output.
    Writer,
    /// Critiques and validates other workers' output.
    Reviewer,
}

impl AgentRole {
    /// All six roles, in code order.
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Supervisor,
        AgentRole::Analyst,
        AgentRole::Worker,
        AgentRole::Researcher,
        AgentRole::Writer,
        AgentRole::Reviewer,
    ];

    /// The stable integer code for this role.
    pub fn code(self) -> u8 {
        match self {
            AgentRole::Supervisor => 1,
            AgentRole::Analyst => 2,
            AgentRole::Worker => 3,
            AgentRole::Researcher => 4,
            AgentRole::Writer => 5,
            AgentRole::Reviewer => 6,
        }
    }

    /// Resolve a wire code back to a role.
    ///
    /// Defined only for the six known codes; anything else is
    /// [`TroupeError::UnknownRole`], never a silent default.
    pub fn from_code(code: u8) -> TroupeResult<Self> {
        match code {
            1 => Ok(AgentRole::Supervisor),
            2 => Ok(AgentRole::Analyst),
            3 => Ok(AgentRole::Worker),
            4 => Ok(AgentRole::Researcher),
            5 => Ok(AgentRole::Writer),
            6 => Ok(AgentRole::Reviewer),
            other => Err(TroupeError::UnknownRole(other)),
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            AgentRole::Supervisor => "Supervisor",
            AgentRole::Analyst => "Analyst",
            AgentRole::Worker => "Worker",
            AgentRole::Researcher => "Researcher",
            AgentRole::Writer => "Writer",
            AgentRole::Reviewer => "Reviewer",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Supervisor => write!(f, "supervisor"),
            AgentRole::Analyst => write!(f, "analyst"),
            AgentRole::Worker => write!(f, "worker"),
            AgentRole::Researcher => write!(f, "researcher"),
            AgentRole::Writer => write!(f, "writer"),
            AgentRole::Reviewer => write!(f, "reviewer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for role in AgentRole::ALL {
            assert_eq!(AgentRole::from_code(role.code()).unwrap(), role);
        }
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AgentRole::Supervisor.code(), 1);
        assert_eq!(AgentRole::Analyst.code(), 2);
        assert_eq!(AgentRole::Worker.code(), 3);
        assert_eq!(AgentRole::Researcher.code(), 4);
        assert_eq!(AgentRole::Writer.code(), 5);
        assert_eq!(AgentRole::Reviewer.code(), 6);
    }

    #[test]
    fn test_unknown_codes_rejected() {
        for code in [0u8, 7, 42, 255] {
            assert!(matches!(
                AgentRole::from_code(code),
                Err(TroupeError::UnknownRole(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_display_and_label() {
        assert_eq!(AgentRole::Researcher.to_string(), "researcher");
        assert_eq!(AgentRole::Researcher.label(), "Researcher");
    }

    #[test]
    fn test_serde_uppercase() {
        let json = serde_json::to_string(&AgentRole::Writer).unwrap();
        assert_eq!(json, "\"WRITER\"");
        let parsed: AgentRole = serde_json::from_str("\"REVIEWER\"").unwrap();
        assert_eq!(parsed, AgentRole::Reviewer);
    }
}
