use std::time::Duration;

use chrono::{DateTime, Utc};

use super::outcome::{CandidateRecord, RunSummary, StopReason};
use crate::config::settings::{
    Settings, DEFAULT_BASE_BRANCH, DEFAULT_BUILD_ATTEMPTS, DEFAULT_CANDIDATE_LIMIT,
    DEFAULT_MAX_OPEN_PRS, DEFAULT_MAX_RUNTIME,
};
use crate::config::Severity;

/// The part of `Settings` the controller acts on.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_branch: String,
    pub build_command: Option<String>,
    pub formatting_command: Option<String>,
    pub max_build_attempts: u32,
    pub skip_qa_review: bool,
    pub max_open_prs: u32,
    pub max_runtime: Duration,
    pub candidate_limit: u32,
    pub severities: Vec<Severity>,
    pub skip_comments: bool,
    pub keep_failed_branches: bool,
    pub write_security_test: bool,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_branch: settings.base_branch.clone(),
            build_command: settings.build.command.clone(),
            formatting_command: settings.build.formatting_command.clone(),
            max_build_attempts: settings.build.max_attempts,
            skip_qa_review: settings.build.skip_qa_review,
            max_open_prs: settings.max_open_prs,
            max_runtime: settings.max_runtime,
            candidate_limit: settings.feed.limit,
            severities: settings.feed.severities.clone(),
            skip_comments: settings.skip_comments,
            keep_failed_branches: settings.keep_failed_branches,
            write_security_test: settings.agent.write_security_test,
        }
    }

    pub fn qa_enabled(&self) -> bool {
        !self.skip_qa_review && self.build_command.is_some()
    }

    /// Why no build will run, for the PR review section.
    pub fn qa_skip_reason(&self) -> Option<&'static str> {
        if self.build_command.is_none() {
            Some("no build command configured")
        } else if self.skip_qa_review {
            Some("QA review skipped by configuration")
        } else {
            None
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            build_command: None,
            formatting_command: None,
            max_build_attempts: DEFAULT_BUILD_ATTEMPTS,
            skip_qa_review: false,
            max_open_prs: DEFAULT_MAX_OPEN_PRS,
            max_runtime: DEFAULT_MAX_RUNTIME,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            severities: vec![Severity::Critical, Severity::High],
            skip_comments: false,
            keep_failed_branches: false,
            write_security_test: false,
        }
    }
}

/// Source of wall-clock time for the run budget.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-invocation state threaded through the controller. Never persisted.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub open_prs: usize,
    pub max_open_prs: u32,
    pub max_qa_attempts: u32,
    pub processed: bool,
    records: Vec<CandidateRecord>,
}

impl RunState {
    pub fn new(run_id: &str, started_at: DateTime<Utc>, config: &PipelineConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            started_at,
            open_prs: 0,
            max_open_prs: config.max_open_prs,
            max_qa_attempts: config.max_build_attempts,
            processed: false,
            records: Vec::new(),
        }
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// True once strictly more than `budget` has passed.
    pub fn budget_exceeded(&self, now: DateTime<Utc>, budget: Duration) -> bool {
        self.elapsed(now) > budget
    }

    pub fn cap_reached(&self) -> bool {
        self.open_prs >= self.max_open_prs as usize
    }

    pub fn record(&mut self, record: CandidateRecord) {
        if record.outcome.is_published() {
            self.processed = true;
        }
        self.records.push(record);
    }

    pub fn into_summary(self, stop_reason: StopReason, now: DateTime<Utc>) -> RunSummary {
        let elapsed_ms = self.elapsed(now).as_millis() as u64;
        RunSummary {
            run_id: self.run_id,
            open_prs: self.open_prs,
            records: self.records,
            stop_reason,
            elapsed_ms,
        }
    }
}
