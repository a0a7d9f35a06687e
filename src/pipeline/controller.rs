use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::outcome::{CandidateOutcome, CandidateRecord, RunSummary, StopReason};
use super::phase::Stage;
use super::review::pr_body;
use super::state::{Clock, PipelineConfig, RunState, SystemClock};
use crate::agents::{FixAgentPort, FixProposal, RemediationTask};
use crate::audit::AuditSession;
use crate::errors::VulnfixError;
use crate::feed::{gather_details, VulnerabilityCandidate, VulnerabilityFeed};
use crate::git::naming::{branch_for, commit_message, label_for, pr_note, pr_title, LABEL_PREFIX};
use crate::git::{PrStatus, PullRequestHost, PullRequestSpec, Workspace};
use crate::qa::{BuildRunner, QaController, QaRequest, QaResult, QaState};

/// External systems the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn VulnerabilityFeed>,
    pub agent: Arc<dyn FixAgentPort>,
    pub runner: Arc<dyn BuildRunner>,
    pub workspace: Arc<dyn Workspace>,
    pub host: Arc<dyn PullRequestHost>,
}

/// How to leave the working tree after abandoning a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchCleanup {
    /// No branch was created yet.
    None,
    /// Delete the branch unless failed branches are kept.
    Abandon,
    /// Always delete the branch.
    Delete,
}

/// Runs candidates one at a time until one fix is published, the budget
/// runs out or the queue is empty.
///
/// Every abandoned candidate is rolled back before the next starts: the
/// working tree is reset and the base branch checked out.
pub struct PipelineController {
    config: PipelineConfig,
    feed: Arc<dyn VulnerabilityFeed>,
    agent: Arc<dyn FixAgentPort>,
    runner: Arc<dyn BuildRunner>,
    workspace: Arc<dyn Workspace>,
    host: Arc<dyn PullRequestHost>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<AuditSession>>,
    cancel_token: CancellationToken,
    run_id: String,
}

impl PipelineController {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            feed: collaborators.feed,
            agent: collaborators.agent,
            runner: collaborators.runner,
            workspace: collaborators.workspace,
            host: collaborators.host,
            clock: Arc::new(SystemClock),
            audit: None,
            cancel_token: CancellationToken::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditSession>) -> Self {
        self.run_id = audit.run_id().to_string();
        self.audit = Some(audit);
        self
    }

    /// Checked between candidates; a candidate in progress always finishes.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// One pipeline invocation.
    ///
    /// Only failures before the first candidate (the open-PR query) are
    /// returned as errors; everything after that is recorded in the summary.
    pub async fn run(&self) -> Result<RunSummary, VulnfixError> {
        let mut state = RunState::new(&self.run_id, self.clock.now(), &self.config);
        info!(run_id = %self.run_id, "Starting remediation run");

        state.open_prs = self.host.count_open_prs(LABEL_PREFIX).await?;
        if state.cap_reached() {
            info!(
                open = state.open_prs,
                cap = state.max_open_prs,
                "Open remediation PR limit reached, nothing to do"
            );
            let stop = StopReason::PrCapReached {
                open: state.open_prs,
                cap: state.max_open_prs,
            };
            return Ok(self.finish(state, stop).await);
        }
        debug!(open = state.open_prs, cap = state.max_open_prs, "Below open PR limit");

        let candidates = match self
            .feed
            .list_candidates(self.config.candidate_limit, &self.config.severities)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Could not fetch candidates from the vulnerability feed");
                Vec::new()
            }
        };
        if candidates.is_empty() {
            info!("No candidates to remediate");
            return Ok(self.finish(state, StopReason::NoCandidates).await);
        }
        info!(count = candidates.len(), "Fetched candidates");
        self.audit_event(&format!("Fetched {} candidate(s)", candidates.len())).await;

        let mut stop = StopReason::QueueExhausted;
        for candidate in &candidates {
            if self.cancel_token.is_cancelled() {
                warn!("Run interrupted, not starting further candidates");
                stop = StopReason::Interrupted;
                break;
            }
            if state.budget_exceeded(self.clock.now(), self.config.max_runtime) {
                warn!(
                    max_runtime_secs = self.config.max_runtime.as_secs(),
                    "Time budget exceeded, stopping"
                );
                stop = StopReason::TimeBudgetExceeded;
                break;
            }

            let started = Instant::now();
            let span = info_span!("candidate", vuln_id = %candidate.id);
            let outcome = self.process_candidate(candidate).instrument(span).await;
            let record = CandidateRecord {
                vuln_id: candidate.id.clone(),
                title: candidate.title.clone(),
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            info!(vuln_id = %record.vuln_id, outcome = record.outcome.label(), "Candidate finished");
            if let Some(audit) = &self.audit {
                if let Err(e) = audit.record_candidate(&record).await {
                    warn!(error = %e, "Failed to record candidate outcome");
                }
            }

            let published = record.outcome.is_published();
            state.record(record);
            if published {
                stop = StopReason::Remediated;
                break;
            }
        }

        Ok(self.finish(state, stop).await)
    }

    async fn finish(&self, state: RunState, stop: StopReason) -> RunSummary {
        let summary = state.into_summary(stop, self.clock.now());
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.finish(&summary).await {
                warn!(error = %e, "Failed to write run summary");
            }
        }
        info!("{}", summary.headline());
        summary
    }

    async fn process_candidate(&self, candidate: &VulnerabilityCandidate) -> CandidateOutcome {
        let id = candidate.id.as_str();
        info!(title = %candidate.title, severity = %candidate.severity, "Processing candidate");

        let label = label_for(id);
        match self.host.pr_status(&label).await {
            Ok(PrStatus::Open) => {
                info!(label = %label, "Open PR already exists, skipping");
                return CandidateOutcome::AlreadyOpen;
            }
            Ok(status) => debug!(label = %label, ?status, "No open PR for label"),
            Err(e) => {
                warn!(label = %label, error = %e, "Could not check existing PRs, skipping");
                return CandidateOutcome::DedupUnavailable { error: e.to_string() };
            }
        }

        if let Err(e) = self.prepare().await {
            error!(error = %e, "Could not prepare working tree");
            self.rollback(None, BranchCleanup::None).await;
            return errored(Stage::Prepare, &e);
        }

        let proposal = match self.fix(candidate).instrument(info_span!("fix")).await {
            Ok(proposal) => proposal,
            Err(e) if e.is_fatal_agent_error() => {
                error!(error = %e, "Fix agent cannot run, skipping candidate");
                self.rollback(None, BranchCleanup::None).await;
                return CandidateOutcome::AgentFatal { error: e.to_string() };
            }
            Err(e) => {
                warn!(error = %e, "Fix agent failed");
                self.rollback(None, BranchCleanup::None).await;
                return CandidateOutcome::AgentFailed { error: e.to_string() };
            }
        };

        let branch = branch_for(id);
        let fix_files = match self.commit_fix(candidate, &branch).await {
            Ok(Some(files)) => files,
            Ok(None) => {
                info!(branch = %branch, "Fix agent made no changes");
                self.rollback(Some(&branch), BranchCleanup::Delete).await;
                return CandidateOutcome::NoChanges;
            }
            Err(e) => {
                error!(branch = %branch, error = %e, "Could not commit fix");
                self.rollback(Some(&branch), BranchCleanup::Abandon).await;
                return errored(Stage::Commit, &e);
            }
        };

        let qa = match self.verify(candidate, fix_files).await {
            Ok(qa) => qa,
            Err(e) => {
                error!(error = %e, "QA could not run");
                self.rollback(Some(&branch), BranchCleanup::Abandon).await;
                return errored(Stage::Qa, &e);
            }
        };
        if qa.state == QaState::Fatal {
            let error = qa.agent_error.clone().unwrap_or_default();
            warn!(error = %error, "QA agent failed, abandoning candidate");
            self.rollback(Some(&branch), BranchCleanup::Abandon).await;
            return CandidateOutcome::QaAgentError { error };
        }
        if !qa.success {
            warn!(attempts = qa.attempts, "Build still failing, abandoning candidate");
            self.rollback(Some(&branch), BranchCleanup::Abandon).await;
            return CandidateOutcome::QaFailed { attempts: qa.attempts };
        }

        if let Err(e) = self.fold_qa_changes(&qa).await {
            error!(error = %e, "Could not amend the fix commit");
            self.rollback(Some(&branch), BranchCleanup::Abandon).await;
            return errored(Stage::Commit, &e);
        }

        self.publish(candidate, &branch, &proposal, &qa)
            .instrument(info_span!("publish"))
            .await
    }

    async fn prepare(&self) -> Result<(), VulnfixError> {
        self.workspace.reset_clean().await?;
        self.workspace.checkout_base().await
    }

    async fn fix(&self, candidate: &VulnerabilityCandidate) -> Result<FixProposal, VulnfixError> {
        let details = gather_details(self.feed.as_ref(), &candidate.id).await;
        let task = RemediationTask {
            candidate: candidate.clone(),
            narrative: details.narrative(),
            reproduction_request: details.http_request.clone(),
            vulnerability_url: self.feed.vulnerability_url(&candidate.id),
            build_command: self.config.build_command.clone(),
            write_security_test: self.config.write_security_test,
        };
        self.audit_event(&format!("Fix agent invoked for {}", candidate.id)).await;
        let proposal = self.agent.propose_fix(&task).await?;
        info!(files = proposal.changed_files.len(), "Fix agent finished");
        Ok(proposal)
    }

    /// Create the candidate branch and commit the agent's edits.
    /// `None` when there was nothing to commit.
    async fn commit_fix(
        &self,
        candidate: &VulnerabilityCandidate,
        branch: &str,
    ) -> Result<Option<Vec<String>>, VulnfixError> {
        self.workspace.create_branch(branch).await?;
        self.workspace.stage_all().await?;
        if !self.workspace.is_dirty().await? {
            return Ok(None);
        }
        let commit = self
            .workspace
            .commit(&commit_message(&candidate.title, &candidate.id))
            .await?;
        let files = self.workspace.head_commit_files().await?;
        info!(branch = %branch, commit = %commit, files = files.len(), "Committed fix");
        Ok(Some(files))
    }

    async fn verify(
        &self,
        candidate: &VulnerabilityCandidate,
        changed_files: Vec<String>,
    ) -> Result<QaResult, VulnfixError> {
        let build_command = if self.config.qa_enabled() {
            self.config.build_command.clone()
        } else {
            if let Some(reason) = self.config.qa_skip_reason() {
                info!(reason, "Skipping QA");
            }
            None
        };
        let request = QaRequest {
            vuln_id: candidate.id.clone(),
            build_command,
            formatting_command: self.config.formatting_command.clone(),
            max_attempts: self.config.max_build_attempts,
            changed_files,
        };
        QaController::new(self.agent.clone(), self.runner.clone())
            .run(request)
            .await
    }

    /// QA edits go into the fix commit, never a second commit.
    async fn fold_qa_changes(&self, qa: &QaResult) -> Result<(), VulnfixError> {
        if !qa.build_ran() {
            return Ok(());
        }
        self.workspace.stage_all().await?;
        if self.workspace.is_dirty().await? {
            self.workspace.amend().await?;
            info!("Amended fix commit with QA changes");
        }
        Ok(())
    }

    async fn publish(
        &self,
        candidate: &VulnerabilityCandidate,
        branch: &str,
        proposal: &FixProposal,
        qa: &QaResult,
    ) -> CandidateOutcome {
        if let Err(e) = self.workspace.push(branch).await {
            error!(branch = %branch, error = %e, "Push failed");
            self.rollback(Some(branch), BranchCleanup::Abandon).await;
            return errored(Stage::Publish, &e);
        }

        let label = label_for(&candidate.id);
        let label = match self.host.ensure_label(&label).await {
            Ok(()) => Some(label),
            Err(e) => {
                warn!(label = %label, error = %e, "Could not create label, opening PR without it");
                None
            }
        };

        let spec = PullRequestSpec {
            title: pr_title(&candidate.title),
            body: pr_body(&proposal.summary, qa, self.config.qa_skip_reason()),
            head: branch.to_string(),
            base: self.config.base_branch.clone(),
            label,
        };

        let outcome = match self.host.create_pr(&spec).await {
            Ok(url) => {
                info!(url = %url, "Opened pull request");
                self.audit_event(&format!("Opened {} for {}", url, candidate.id)).await;
                if self.config.skip_comments {
                    debug!("Skipping feed note");
                } else if let Err(e) = self.feed.add_note(&candidate.id, &pr_note(&url)).await {
                    warn!(error = %e, "Could not add note to the vulnerability");
                }
                CandidateOutcome::Published { branch: branch.to_string(), url }
            }
            Err(e) => {
                error!(
                    branch = %branch,
                    error = %e,
                    "Could not open pull request; the branch stays pushed for manual recovery"
                );
                CandidateOutcome::PublishFailed {
                    branch: branch.to_string(),
                    error: e.to_string(),
                }
            }
        };

        let cleanup = if outcome.is_published() {
            BranchCleanup::None
        } else {
            BranchCleanup::Delete
        };
        self.rollback(Some(branch), cleanup).await;
        outcome
    }

    /// Return to a clean base branch. Failures are logged; the next
    /// candidate starts with its own reset.
    async fn rollback(&self, branch: Option<&str>, cleanup: BranchCleanup) {
        if let Err(e) = self.workspace.reset_clean().await {
            error!(error = %e, "Failed to reset working tree");
        }
        if let Err(e) = self.workspace.checkout_base().await {
            error!(error = %e, "Failed to check out base branch");
            return;
        }

        let Some(branch) = branch else { return };
        let delete = match cleanup {
            BranchCleanup::None => false,
            BranchCleanup::Abandon => !self.config.keep_failed_branches,
            BranchCleanup::Delete => true,
        };
        if !delete {
            if cleanup == BranchCleanup::Abandon {
                info!(branch = %branch, "Keeping failed branch");
            }
            return;
        }
        match self.workspace.delete_branch(branch).await {
            Ok(()) => debug!(branch = %branch, "Deleted branch"),
            Err(e) => warn!(branch = %branch, error = %e, "Failed to delete branch"),
        }
    }

    async fn audit_event(&self, message: &str) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_event(message).await {
                warn!(error = %e, "Failed to write workflow log");
            }
        }
    }
}

fn errored(stage: Stage, error: &VulnfixError) -> CandidateOutcome {
    CandidateOutcome::Errored {
        stage: stage.as_str().to_string(),
        error: error.to_string(),
    }
}
