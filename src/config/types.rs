use serde::{Deserialize, Serialize};

/// On-disk YAML configuration. Every section is optional; CLI flags and
/// environment variables take precedence over values found here.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct VulnfixConfig {
    pub feed: Option<FeedConfig>,
    pub build: Option<BuildConfig>,
    pub agent: Option<AgentConfig>,
    pub github: Option<GitHubConfig>,
    pub git: Option<GitConfig>,
    pub run: Option<RunConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FeedConfig {
    pub host: Option<String>,
    pub org_id: Option<String>,
    pub app_id: Option<String>,
    pub authorization_key: Option<String>,
    pub api_key: Option<String>,
    pub severities: Option<Vec<Severity>>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BuildConfig {
    pub command: Option<String>,
    pub formatting_command: Option<String>,
    pub max_attempts: Option<i64>,
    pub timeout_secs: Option<u64>,
    pub skip_qa_review: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AgentConfig {
    pub command: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub prompts_dir: Option<String>,
    pub write_security_test: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GitHubConfig {
    pub base_branch: Option<String>,
    pub max_open_prs: Option<i64>,
    pub skip_comments: Option<bool>,
    pub keep_failed_branches: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GitConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RunConfig {
    pub max_runtime_minutes: Option<u64>,
    pub output_dir: Option<String>,
}

/// Feed severity levels, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Note,
}

impl Severity {
    /// Lower values indicate higher severity.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Note => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Note => "NOTE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            "NOTE" => Some(Severity::Note),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
