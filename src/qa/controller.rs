use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use super::build::BuildRunner;
use super::history::{QaAttempt, QaHistory, QaOutcome};
use crate::agents::response::parse_command_request;
use crate::agents::{FixAgentPort, QaTask};
use crate::config::settings::{MAX_BUILD_ATTEMPTS_CEILING, MIN_BUILD_ATTEMPTS};
use crate::errors::VulnfixError;
use crate::utils::truncation::log_tail;

/// Prefix of the history entry recorded when the QA agent itself fails.
pub const QA_AGENT_ERROR_PREFIX: &str = "Error during QA agent execution: ";

/// Where the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaState {
    /// No build command, nothing was run.
    Skipped,
    Converged,
    Exhausted,
    /// The QA agent failed and the loop stopped early.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct QaRequest {
    pub vuln_id: String,
    pub build_command: Option<String>,
    pub formatting_command: Option<String>,
    pub max_attempts: u32,
    /// Files changed by the fix commit.
    pub changed_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QaResult {
    pub success: bool,
    pub state: QaState,
    /// Number of builds run.
    pub attempts: u32,
    pub changed_files: Vec<String>,
    pub build_command: Option<String>,
    pub history: QaHistory,
    pub agent_error: Option<String>,
}

impl QaResult {
    pub fn build_ran(&self) -> bool {
        self.state != QaState::Skipped
    }

    fn skipped(changed_files: Vec<String>) -> Self {
        Self {
            success: true,
            state: QaState::Skipped,
            attempts: 0,
            changed_files,
            build_command: None,
            history: QaHistory::new(),
            agent_error: None,
        }
    }
}

/// Bounded build / QA-agent retry loop.
///
/// Runs the build; on failure hands the output and the history of earlier
/// attempts to the QA agent, then builds again. The working tree is edited
/// but never committed here.
pub struct QaController {
    agent: Arc<dyn FixAgentPort>,
    runner: Arc<dyn BuildRunner>,
}

impl QaController {
    pub fn new(agent: Arc<dyn FixAgentPort>, runner: Arc<dyn BuildRunner>) -> Self {
        Self { agent, runner }
    }

    pub async fn run(&self, request: QaRequest) -> Result<QaResult, VulnfixError> {
        let Some(build_command) = request.build_command.clone() else {
            info!(vuln_id = %request.vuln_id, "No build command, skipping QA");
            return Ok(QaResult::skipped(request.changed_files));
        };
        let span = info_span!("qa", vuln_id = %request.vuln_id);
        self.run_loop(request, build_command).instrument(span).await
    }

    async fn run_loop(
        &self,
        request: QaRequest,
        build_command: String,
    ) -> Result<QaResult, VulnfixError> {
        let max_attempts = request
            .max_attempts
            .clamp(MIN_BUILD_ATTEMPTS, MAX_BUILD_ATTEMPTS_CEILING);
        let formatting_command = request
            .formatting_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let mut changed: BTreeSet<String> = request.changed_files.iter().cloned().collect();
        let mut history = QaHistory::new();
        let mut agent_error = None;
        let mut state = QaState::Exhausted;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            info!(attempt, max_attempts, command = %build_command, "Running build");
            let build = self.runner.run(&build_command).await?;

            if build.success {
                info!(attempt, "Build passed");
                history.push(QaAttempt {
                    attempt,
                    build_output: build.output,
                    outcome: QaOutcome::BuildPassed,
                    summary: None,
                });
                state = QaState::Converged;
                break;
            }

            warn!(attempt, exit_code = ?build.exit_code, "Build failed");
            debug!(output = %log_tail(&build.output), "Build output tail");

            if attempt == max_attempts {
                history.push(QaAttempt {
                    attempt,
                    build_output: build.output,
                    outcome: QaOutcome::BuildFailed,
                    summary: None,
                });
                break;
            }

            let task = QaTask {
                vuln_id: request.vuln_id.clone(),
                build_command: build_command.clone(),
                build_output: build.output.clone(),
                changed_files: changed.iter().cloned().collect(),
                formatting_command: formatting_command.map(str::to_string),
                history: history.summaries(),
            };

            let proposal = match self.agent.propose_qa_fix(&task).await {
                Ok(proposal) => proposal,
                Err(e) => {
                    warn!(attempt, error = %e, "QA agent failed, stopping QA loop");
                    let entry = format!("{}{}", QA_AGENT_ERROR_PREFIX, e);
                    history.push(QaAttempt {
                        attempt,
                        build_output: build.output,
                        outcome: QaOutcome::BuildFailed,
                        summary: Some(entry),
                    });
                    agent_error = Some(e.to_string());
                    state = QaState::Fatal;
                    break;
                }
            };
            changed.extend(proposal.changed_files.iter().cloned());

            let requested = proposal
                .requested_command
                .clone()
                .or_else(|| parse_command_request(&proposal.summary));
            let format_match = match (requested.as_deref(), formatting_command) {
                (Some(requested), Some(configured)) => requested.trim() == configured,
                _ => false,
            };

            if let (true, Some(formatter)) = (format_match, formatting_command) {
                info!(attempt, command = %formatter, "Agent requested the formatting command");
                let formatted = self.runner.run(formatter).await?;
                if !formatted.success {
                    warn!(attempt, exit_code = ?formatted.exit_code, "Formatting command failed");
                }
                let status = match formatted.exit_code {
                    Some(code) => format!("exit status {}", code),
                    None => "terminated".to_string(),
                };
                history.push(QaAttempt {
                    attempt,
                    build_output: build.output,
                    outcome: QaOutcome::FormatCommandRequested,
                    summary: Some(format!(
                        "{}\n(Ran formatting command `{}`: {})",
                        proposal.summary, formatter, status
                    )),
                });
            } else {
                if let Some(requested) = requested {
                    debug!(attempt, requested = %requested, "Ignoring command request that is not the formatting command");
                }
                history.push(QaAttempt {
                    attempt,
                    build_output: build.output,
                    outcome: QaOutcome::BuildFailed,
                    summary: Some(proposal.summary),
                });
            }
        }

        let success = state == QaState::Converged;
        if state == QaState::Exhausted {
            warn!(attempts, "Build still failing after all QA attempts");
        }

        Ok(QaResult {
            success,
            state,
            attempts,
            changed_files: changed.into_iter().collect(),
            build_command: Some(build_command),
            history,
            agent_error,
        })
    }
}
