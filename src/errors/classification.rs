use super::types::VulnfixError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl VulnfixError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        let (error_type, retryable) = match self {
            // Transient external-call failures
            VulnfixError::RateLimit(_) => ("RateLimitError", true),
            VulnfixError::Network(_) => ("NetworkError", true),
            VulnfixError::Timeout(_) => ("TimeoutError", true),
            VulnfixError::Feed(_) => ("FeedError", true),

            // Never retried: either the caller is misconfigured or the
            // failure is owned by the QA loop / pipeline policy.
            VulnfixError::Config(_) => ("ConfigError", false),
            VulnfixError::Authentication(_) => ("AuthenticationError", false),
            VulnfixError::Agent(_) => ("AgentError", false),
            VulnfixError::AgentFatal(_) => ("AgentFatalError", false),
            VulnfixError::Build(_) => ("BuildError", false),
            VulnfixError::Prompt(_) => ("PromptError", false),
            VulnfixError::Json(_) => ("JsonError", false),
            VulnfixError::Yaml(_) => ("YamlError", false),

            VulnfixError::Git(_) => ("GitError", false),
            VulnfixError::Libgit2(_) => ("GitError", false),
            VulnfixError::GitHub(_) => ("GitHubError", true),
            VulnfixError::Io(_) => ("IoError", true),
            VulnfixError::Internal(_) => ("InternalError", false),
        };
        ErrorClassification { error_type, retryable }
    }
}
