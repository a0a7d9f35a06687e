use serde::{Deserialize, Serialize};

/// One open finding eligible for remediation. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityCandidate {
    pub id: String,
    pub title: String,
    pub rule: String,
    pub severity: String,
    pub status: String,
}

impl VulnerabilityCandidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            rule: String::new(),
            severity: String::new(),
            status: "Reported".to_string(),
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }
}

pub const STORY_PLACEHOLDER: &str = "(Could not retrieve vulnerability story)";
pub const EVENTS_PLACEHOLDER: &str = "(Could not retrieve event details)";
pub const HTTP_REQUEST_PLACEHOLDER: &str = "(Could not retrieve HTTP request details)";

/// Supporting text gathered for a candidate before the fix agent runs.
/// Each field falls back to a placeholder when its fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityDetails {
    pub story: String,
    pub events: String,
    pub http_request: String,
}

impl Default for VulnerabilityDetails {
    fn default() -> Self {
        Self {
            story: STORY_PLACEHOLDER.to_string(),
            events: EVENTS_PLACEHOLDER.to_string(),
            http_request: HTTP_REQUEST_PLACEHOLDER.to_string(),
        }
    }
}

impl VulnerabilityDetails {
    /// Narrative text handed to the fix agent: story followed by event details.
    pub fn narrative(&self) -> String {
        format!(
            "Vulnerability story:\n{}\n\nEvent details:\n{}",
            self.story, self.events
        )
    }
}
