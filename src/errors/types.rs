use thiserror::Error;

#[derive(Debug, Error)]
pub enum VulnfixError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Feed API error: {0}")]
    Feed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Agent error: {0}")]
    Agent(String),

    /// The agent could not be constructed or invoked at all.
    #[error("FATAL agent error: {0}")]
    AgentFatal(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("GitHub error: {0}")]
    GitHub(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("libgit2 error: {0}")]
    Libgit2(#[from] git2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VulnfixError {
    /// True for agent failures that mean no agent can run at all, so no
    /// branch work should be attempted for the candidate.
    pub fn is_fatal_agent_error(&self) -> bool {
        matches!(self, VulnfixError::AgentFatal(_))
    }
}
