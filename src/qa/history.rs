use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaOutcome {
    BuildPassed,
    BuildFailed,
    /// The agent asked for the configured formatter, which was run directly.
    FormatCommandRequested,
}

/// One build run inside the QA loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaAttempt {
    /// 1-based.
    pub attempt: u32,
    pub build_output: String,
    pub outcome: QaOutcome,
    /// What the QA agent reported after this build, if it was asked.
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaHistory {
    attempts: Vec<QaAttempt>,
}

impl QaHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attempt: QaAttempt) {
        self.attempts.push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn attempts(&self) -> &[QaAttempt] {
        &self.attempts
    }

    pub fn last(&self) -> Option<&QaAttempt> {
        self.attempts.last()
    }

    /// Agent summaries in order, one per agent invocation.
    pub fn summaries(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter_map(|a| a.summary.clone())
            .collect()
    }
}
