pub mod command;
pub mod port;
pub mod response;

pub use command::CommandAgent;
pub use port::{FixAgentPort, FixProposal, QaProposal, QaTask, RemediationTask};

/// Which job an agent invocation is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Fix,
    Qa,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Fix => "fix",
            AgentRole::Qa => "qa",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
