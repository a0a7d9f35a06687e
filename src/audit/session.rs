use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::agent_logger::AgentLogger;
use super::run_tracker::RunTracker;
use super::workflow_logger::WorkflowLogger;
use crate::agents::AgentRole;
use crate::errors::VulnfixError;
use crate::pipeline::outcome::{CandidateRecord, RunSummary};

/// On-disk audit trail of one pipeline run:
///
/// ```text
/// <output_dir>/<run_id>/
///   workflow.log
///   run.json
///   agents/<timestamp>_<role>_<vuln>.jsonl
/// ```
pub struct AuditSession {
    base_dir: PathBuf,
    run_id: String,
    tracker: Arc<Mutex<RunTracker>>,
    workflow_logger: Arc<Mutex<WorkflowLogger>>,
}

impl AuditSession {
    pub async fn initialize(
        output_dir: &Path,
        run_id: &str,
        repo_root: &Path,
    ) -> Result<Self, VulnfixError> {
        let base_dir = output_dir.join(run_id);
        tokio::fs::create_dir_all(base_dir.join("agents")).await?;

        let tracker = RunTracker::new(&base_dir, run_id);
        let workflow_logger = WorkflowLogger::new(&base_dir);
        workflow_logger.initialize(run_id, repo_root).await?;

        Ok(Self {
            base_dir,
            run_id: run_id.to_string(),
            tracker: Arc::new(Mutex::new(tracker)),
            workflow_logger: Arc::new(Mutex::new(workflow_logger)),
        })
    }

    pub async fn log_event(&self, message: &str) -> Result<(), VulnfixError> {
        self.workflow_logger.lock().await.log_event(message).await
    }

    pub async fn start_agent(
        &self,
        role: AgentRole,
        vuln_id: &str,
    ) -> Result<AgentLogger, VulnfixError> {
        self.log_event(&format!("{} agent started for {}", role.as_str(), vuln_id))
            .await?;
        AgentLogger::new(&self.base_dir, role, vuln_id).await
    }

    pub async fn record_candidate(&self, record: &CandidateRecord) -> Result<(), VulnfixError> {
        self.tracker.lock().await.record_candidate(record).await?;
        self.log_event(&format!(
            "Candidate {} finished: {} ({}ms)",
            record.vuln_id,
            record.outcome.label(),
            record.duration_ms
        ))
        .await
    }

    pub async fn finish(&self, summary: &RunSummary) -> Result<(), VulnfixError> {
        self.tracker.lock().await.finish(summary).await?;
        self.log_event(&summary.headline()).await
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}
