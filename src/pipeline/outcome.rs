use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::formatting::format_duration;

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateOutcome {
    /// An open PR already carries the candidate's label.
    AlreadyOpen,
    /// The PR host could not be asked about the label.
    DedupUnavailable { error: String },
    AgentFatal { error: String },
    AgentFailed { error: String },
    /// The fix agent left the working tree untouched.
    NoChanges,
    QaFailed { attempts: u32 },
    QaAgentError { error: String },
    /// The branch was pushed but the PR could not be opened.
    PublishFailed { branch: String, error: String },
    Published { branch: String, url: String },
    Errored { stage: String, error: String },
}

impl CandidateOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyOpen => "already open",
            Self::DedupUnavailable { .. } => "dedup unavailable",
            Self::AgentFatal { .. } => "agent unavailable",
            Self::AgentFailed { .. } => "agent failed",
            Self::NoChanges => "no changes",
            Self::QaFailed { .. } => "failed QA",
            Self::QaAgentError { .. } => "QA agent error",
            Self::PublishFailed { .. } => "publish failed",
            Self::Published { .. } => "published",
            Self::Errored { .. } => "errored",
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub vuln_id: String,
    pub title: String,
    pub outcome: CandidateOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    PrCapReached { open: usize, cap: u32 },
    NoCandidates,
    Remediated,
    TimeBudgetExceeded,
    /// Every candidate was tried without a publish.
    QueueExhausted,
    /// Cancelled between candidates (Ctrl-C).
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub open_prs: usize,
    pub records: Vec<CandidateRecord>,
    pub stop_reason: StopReason,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn published(&self) -> Option<&CandidateRecord> {
        self.records.iter().find(|r| r.outcome.is_published())
    }

    pub fn pr_url(&self) -> Option<&str> {
        self.records.iter().find_map(|r| match &r.outcome {
            CandidateOutcome::Published { url, .. } => Some(url.as_str()),
            _ => None,
        })
    }

    /// Counts per outcome label, in a stable order.
    pub fn outcome_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.outcome.label()).or_insert(0) += 1;
        }
        counts
    }

    /// The final summary line of a run.
    pub fn headline(&self) -> String {
        let runtime = format_duration(Duration::from_millis(self.elapsed_ms));
        if let Some(record) = self.published() {
            let url = self.pr_url().unwrap_or_default();
            return format!(
                "Remediated 1 vulnerability ({}): {}. Total runtime: {}",
                record.vuln_id, url, runtime
            );
        }
        format!(
            "No vulnerabilities were remediated: {}. Total runtime: {}",
            self.reason_text(),
            runtime
        )
    }

    fn reason_text(&self) -> String {
        match &self.stop_reason {
            StopReason::PrCapReached { open, cap } => {
                format!("open remediation PR limit reached ({}/{})", open, cap)
            }
            StopReason::NoCandidates => "no candidates found".to_string(),
            StopReason::TimeBudgetExceeded => format!(
                "time budget exceeded after {} candidate(s)",
                self.records.len()
            ),
            StopReason::Remediated => "run stopped after publishing".to_string(),
            StopReason::Interrupted => "run interrupted".to_string(),
            StopReason::QueueExhausted => {
                let counts = self.outcome_counts();
                if counts.len() == 1 {
                    if let Some(count) = counts.get("already open") {
                        return format!("all {} candidate(s) already have open PRs", count);
                    }
                    if let Some(count) = counts.get("failed QA") {
                        return format!("all {} candidate(s) failed QA", count);
                    }
                }
                let parts: Vec<String> = counts
                    .iter()
                    .map(|(label, count)| format!("{} {}", count, label))
                    .collect();
                format!(
                    "all {} candidate(s) were skipped or failed ({})",
                    self.records.len(),
                    parts.join(", ")
                )
            }
        }
    }
}
