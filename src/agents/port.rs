use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::VulnfixError;
use crate::feed::VulnerabilityCandidate;

/// Everything the fix agent is told about one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationTask {
    pub candidate: VulnerabilityCandidate,
    pub narrative: String,
    pub reproduction_request: String,
    pub vulnerability_url: Option<String>,
    pub build_command: Option<String>,
    pub write_security_test: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixProposal {
    /// Narrative used as the pull request body.
    pub summary: String,
    pub changed_files: Vec<String>,
}

/// A request to repair a failing build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaTask {
    pub vuln_id: String,
    pub build_command: String,
    pub build_output: String,
    pub changed_files: Vec<String>,
    pub formatting_command: Option<String>,
    /// Summaries returned by earlier QA invocations, oldest first.
    pub history: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaProposal {
    pub summary: String,
    pub requested_command: Option<String>,
    pub changed_files: Vec<String>,
}

/// Boundary to the external code-editing agent.
///
/// Both calls block until the agent has finished editing the working tree.
/// `VulnfixError::AgentFatal` means no agent can run at all; any other error
/// is a failed invocation.
#[async_trait]
pub trait FixAgentPort: Send + Sync {
    async fn propose_fix(&self, task: &RemediationTask) -> Result<FixProposal, VulnfixError>;

    async fn propose_qa_fix(&self, task: &QaTask) -> Result<QaProposal, VulnfixError>;
}
