use std::path::PathBuf;
use std::time::Duration;

use super::types::Severity;

pub const DEFAULT_BUILD_ATTEMPTS: u32 = 3;
pub const MIN_BUILD_ATTEMPTS: u32 = 1;
pub const MAX_BUILD_ATTEMPTS_CEILING: u32 = 6;
pub const DEFAULT_MAX_OPEN_PRS: u32 = 5;
pub const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(3 * 60 * 60);
pub const DEFAULT_CANDIDATE_LIMIT: u32 = 10;
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(45 * 60);
pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_OUTPUT_DIR: &str = ".vulnfix";

/// Fully resolved, immutable settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub repo_root: PathBuf,
    pub output_dir: PathBuf,
    pub base_branch: String,
    pub build: BuildSettings,
    pub max_open_prs: u32,
    pub max_runtime: Duration,
    pub skip_comments: bool,
    pub keep_failed_branches: bool,
    pub feed: FeedSettings,
    pub agent: AgentSettings,
    pub git: GitIdentity,
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub command: Option<String>,
    pub formatting_command: Option<String>,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub skip_qa_review: bool,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub host: String,
    pub org_id: String,
    pub app_id: String,
    pub authorization_key: String,
    pub api_key: String,
    pub severities: Vec<Severity>,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub command: String,
    pub model: Option<String>,
    pub timeout: Duration,
    pub prompts_dir: Option<PathBuf>,
    pub write_security_test: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Settings {
    /// Secret values that must never reach logs or the audit trail.
    pub fn secrets(&self) -> Vec<&str> {
        vec![self.feed.authorization_key.as_str(), self.feed.api_key.as_str()]
    }

    /// True when the QA loop will actually run.
    pub fn qa_enabled(&self) -> bool {
        !self.build.skip_qa_review && self.build.command.is_some()
    }
}

/// Clamp a configured attempt count into `[1, 6]`; absent means the default.
pub fn clamp_build_attempts(configured: Option<i64>) -> u32 {
    match configured {
        None => DEFAULT_BUILD_ATTEMPTS,
        Some(n) => n.clamp(MIN_BUILD_ATTEMPTS as i64, MAX_BUILD_ATTEMPTS_CEILING as i64) as u32,
    }
}

/// Absent or negative caps fall back to the default.
pub fn resolve_max_open_prs(configured: Option<i64>) -> u32 {
    match configured {
        None => DEFAULT_MAX_OPEN_PRS,
        Some(n) if n < 0 => DEFAULT_MAX_OPEN_PRS,
        Some(n) => n.min(u32::MAX as i64) as u32,
    }
}

/// Blank strings count as "not configured".
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    })
}

/// Parse a comma-separated severity list, ignoring unknown entries.
pub fn parse_severities(value: &str) -> Vec<Severity> {
    value.split(',').filter_map(Severity::parse).collect()
}

pub fn default_severities() -> Vec<Severity> {
    vec![Severity::Critical, Severity::High]
}
