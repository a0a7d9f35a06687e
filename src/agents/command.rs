use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::port::{FixAgentPort, FixProposal, QaProposal, QaTask, RemediationTask};
use super::response::{extract_pr_body, is_fatal_response, parse_command_request};
use super::AgentRole;
use crate::audit::{AgentLogger, AuditSession};
use crate::config::credentials::redact_credentials;
use crate::config::settings::AgentSettings;
use crate::errors::VulnfixError;
use crate::git::Workspace;
use crate::prompts::templates::{
    fix_task_prompt, qa_task_prompt, DEFAULT_FIX_SYSTEM, DEFAULT_QA_SYSTEM, FIX_SYSTEM_PROMPT,
    QA_SYSTEM_PROMPT,
};
use crate::prompts::{PromptLoader, PromptVariables};
use crate::utils::truncation::{log_tail, truncate_output};

/// Exit statuses `sh` uses for "not executable" and "not found".
const SHELL_CANNOT_EXECUTE: i32 = 126;
const SHELL_NOT_FOUND: i32 = 127;

/// Runs an external coding agent CLI in the repository root.
///
/// The prompt goes to the agent's stdin and its stdout is the response.
/// Whatever the agent changed in the working tree is read back from git.
pub struct CommandAgent {
    settings: AgentSettings,
    repo_root: PathBuf,
    workspace: Arc<dyn Workspace>,
    prompts: PromptLoader,
    audit: Option<Arc<AuditSession>>,
    secrets: Vec<String>,
}

struct AgentOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
}

impl CommandAgent {
    pub fn new(settings: AgentSettings, repo_root: PathBuf, workspace: Arc<dyn Workspace>) -> Self {
        let prompts = PromptLoader::new(settings.prompts_dir.clone());
        Self {
            settings,
            repo_root,
            workspace,
            prompts,
            audit: None,
            secrets: Vec::new(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditSession>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Values scrubbed from agent stderr before it is logged or returned.
    pub fn with_secrets(mut self, secrets: Vec<String>) -> Self {
        self.secrets = secrets;
        self
    }

    fn system_prompt(&self, role: AgentRole, vars: &PromptVariables) -> Result<String, VulnfixError> {
        let (name, default) = match role {
            AgentRole::Fix => (FIX_SYSTEM_PROMPT, DEFAULT_FIX_SYSTEM),
            AgentRole::Qa => (QA_SYSTEM_PROMPT, DEFAULT_QA_SYSTEM),
        };
        let template = self.prompts.load_or(name, default)?;
        Ok(self.prompts.interpolate(&template, vars))
    }

    async fn invoke(
        &self,
        role: AgentRole,
        vuln_id: &str,
        vars: &PromptVariables,
        task_prompt: String,
    ) -> Result<String, VulnfixError> {
        let system = self.system_prompt(role, vars)?;
        let prompt = format!("{}\n\n{}", system.trim_end(), task_prompt);

        let mut transcript = self.open_transcript(role, vuln_id).await;
        record(&mut transcript, "prompt", serde_json::json!({ "text": prompt })).await;

        let start = Instant::now();
        info!(role = role.as_str(), vuln_id = %vuln_id, "Invoking agent");
        let output = self.run(role, &prompt).await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                record(&mut transcript, "error", serde_json::json!({ "error": e.to_string() })).await;
                return Err(e);
            }
        };

        let stderr = redact_credentials(
            log_tail(&output.stderr),
            &self.secrets.iter().map(String::as_str).collect::<Vec<_>>(),
        );
        record(
            &mut transcript,
            "response",
            serde_json::json!({
                "exit_code": output.exit_code,
                "duration_ms": start.elapsed().as_millis() as u64,
                "stdout": truncate_output(&output.stdout),
                "stderr": stderr,
            }),
        )
        .await;

        if is_fatal_response(&output.stdout) {
            return Err(VulnfixError::AgentFatal(format!(
                "{} agent reported it cannot edit the repository: {}",
                role.as_str(),
                output.stdout.lines().next().unwrap_or_default().trim()
            )));
        }

        match output.exit_code {
            Some(0) => {}
            Some(code) if code == SHELL_CANNOT_EXECUTE || code == SHELL_NOT_FOUND => {
                return Err(VulnfixError::AgentFatal(format!(
                    "agent command could not be executed (exit {}): {}",
                    code,
                    stderr.trim()
                )));
            }
            Some(code) => {
                return Err(VulnfixError::Agent(format!(
                    "{} agent exited with status {}: {}",
                    role.as_str(),
                    code,
                    stderr.trim()
                )));
            }
            None => {
                return Err(VulnfixError::Agent(format!(
                    "{} agent was terminated by a signal",
                    role.as_str()
                )));
            }
        }

        info!(
            role = role.as_str(),
            vuln_id = %vuln_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Agent finished"
        );
        Ok(output.stdout)
    }

    async fn run(&self, role: AgentRole, prompt: &str) -> Result<AgentOutput, VulnfixError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.settings.command)
            .current_dir(&self.repo_root)
            .env("VULNFIX_AGENT_ROLE", role.as_str())
            .env("VULNFIX_REPO_ROOT", &self.repo_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(model) = &self.settings.model {
            command.env("VULNFIX_AGENT_MODEL", model);
        }

        let mut child = command.spawn().map_err(|e| {
            VulnfixError::AgentFatal(format!(
                "failed to spawn agent command '{}': {}",
                self.settings.command, e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = prompt.as_bytes().to_vec();
            // Agents that never read stdin close the pipe early; that is not an error.
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!(error = %e, "Agent closed stdin before reading the full prompt");
                }
            });
        }

        let output = tokio::time::timeout(self.settings.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VulnfixError::Agent(format!(
                    "{} agent timed out after {}s",
                    role.as_str(),
                    self.settings.timeout.as_secs()
                ))
            })??;

        Ok(AgentOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn open_transcript(&self, role: AgentRole, vuln_id: &str) -> Option<AgentLogger> {
        let audit = self.audit.as_ref()?;
        match audit.start_agent(role, vuln_id).await {
            Ok(logger) => Some(logger),
            Err(e) => {
                warn!(error = %e, "Could not open agent transcript");
                None
            }
        }
    }

    async fn changed_files(&self) -> Result<Vec<String>, VulnfixError> {
        self.workspace.changed_files().await
    }
}

async fn record(transcript: &mut Option<AgentLogger>, event: &str, data: serde_json::Value) {
    if let Some(logger) = transcript.as_mut() {
        if let Err(e) = logger.log_event(event, &data).await {
            warn!(event, error = %e, "Failed to write agent transcript");
        }
    }
}

#[async_trait]
impl FixAgentPort for CommandAgent {
    async fn propose_fix(&self, task: &RemediationTask) -> Result<FixProposal, VulnfixError> {
        let candidate = &task.candidate;
        let vars = PromptVariables {
            repo_root: self.repo_root.display().to_string(),
            vuln_id: Some(candidate.id.clone()),
            vuln_title: Some(candidate.title.clone()),
            rule: Some(candidate.rule.clone()),
            build_command: task.build_command.clone(),
            formatting_command: None,
        };
        let response = self
            .invoke(
                AgentRole::Fix,
                &candidate.id,
                &vars,
                fix_task_prompt(task, &self.repo_root),
            )
            .await?;
        let changed_files = self.changed_files().await?;
        debug!(vuln_id = %candidate.id, files = changed_files.len(), "Fix agent changed files");

        Ok(FixProposal {
            summary: extract_pr_body(&response),
            changed_files,
        })
    }

    async fn propose_qa_fix(&self, task: &QaTask) -> Result<QaProposal, VulnfixError> {
        let vars = PromptVariables {
            repo_root: self.repo_root.display().to_string(),
            vuln_id: Some(task.vuln_id.clone()),
            build_command: Some(task.build_command.clone()),
            formatting_command: task.formatting_command.clone(),
            ..Default::default()
        };
        let response = self
            .invoke(AgentRole::Qa, &task.vuln_id, &vars, qa_task_prompt(task))
            .await?;
        let changed_files = self.changed_files().await?;

        Ok(QaProposal {
            requested_command: parse_command_request(&response),
            summary: response.trim().to_string(),
            changed_files,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::feed::VulnerabilityCandidate;
    use crate::git::GitWorkspace;
    use std::time::Duration;

    fn init_repo(dir: &std::path::Path) -> Arc<dyn Workspace> {
        let repo = git2::Repository::init(dir).unwrap();
        std::fs::write(dir.join("App.java"), "class App {}\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("App.java")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
        let head = repo.head().unwrap().shorthand().unwrap().to_string();
        Arc::new(GitWorkspace::open(dir, &head).unwrap())
    }

    fn agent(dir: &std::path::Path, command: &str, timeout: Duration) -> CommandAgent {
        let settings = AgentSettings {
            command: command.to_string(),
            model: Some("test-model".into()),
            timeout,
            prompts_dir: None,
            write_security_test: false,
        };
        CommandAgent::new(settings, dir.to_path_buf(), init_repo(dir))
    }

    fn task() -> RemediationTask {
        RemediationTask {
            candidate: VulnerabilityCandidate::new("V1", "SQL Injection").with_rule("sql-injection"),
            narrative: "story".into(),
            reproduction_request: "GET /".into(),
            vulnerability_url: None,
            build_command: Some("true".into()),
            write_security_test: false,
        }
    }

    fn qa_task() -> QaTask {
        QaTask {
            vuln_id: "V1".into(),
            build_command: "make".into(),
            build_output: "boom".into(),
            changed_files: vec!["App.java".into()],
            formatting_command: Some("make fmt".into()),
            history: vec![],
        }
    }

    #[tokio::test]
    async fn test_fix_reads_pr_body_and_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let script = "cat > /dev/null; echo 'class App { int x; }' > App.java; \
                      printf 'noise\\n<pr_body>Fixed [$VULNFIX_AGENT_ROLE/$VULNFIX_AGENT_MODEL]</pr_body>\\n'";
        let agent = agent(dir.path(), script, Duration::from_secs(30));

        let proposal = agent.propose_fix(&task()).await.unwrap();
        assert_eq!(proposal.summary, "Fixed [fix/test-model]");
        assert_eq!(proposal.changed_files, vec!["App.java".to_string()]);
    }

    #[tokio::test]
    async fn test_prompt_is_delivered_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), "grep -c 'SQL Injection' || true", Duration::from_secs(30));

        let proposal = agent.propose_fix(&task()).await.unwrap();
        assert_ne!(proposal.summary.trim(), "0");
    }

    #[tokio::test]
    async fn test_qa_parses_requested_command() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(
            dir.path(),
            "cat > /dev/null; echo 'Formatting only. Please run `make fmt`.'",
            Duration::from_secs(30),
        );

        let proposal = agent.propose_qa_fix(&qa_task()).await.unwrap();
        assert_eq!(proposal.requested_command.as_deref(), Some("make fmt"));
        assert!(proposal.changed_files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), "definitely-not-an-agent-binary-xyz", Duration::from_secs(30));

        let err = agent.propose_fix(&task()).await.unwrap_err();
        assert!(err.is_fatal_agent_error(), "got {err}");
    }

    #[tokio::test]
    async fn test_fatal_response_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), "cat > /dev/null; echo 'FATAL: no filesystem tools'", Duration::from_secs(30));

        let err = agent.propose_fix(&task()).await.unwrap_err();
        assert!(err.is_fatal_agent_error());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), "cat > /dev/null; echo oops >&2; exit 3", Duration::from_secs(30));

        let err = agent.propose_fix(&task()).await.unwrap_err();
        assert!(matches!(err, VulnfixError::Agent(ref msg) if msg.contains("status 3") && msg.contains("oops")));
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path(), "sleep 5", Duration::from_millis(200));

        let err = agent.propose_fix(&task()).await.unwrap_err();
        assert!(matches!(err, VulnfixError::Agent(ref msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_transcript_written_when_audited() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let audit = Arc::new(
            AuditSession::initialize(out.path(), "run", dir.path()).await.unwrap(),
        );
        let agent = agent(dir.path(), "cat > /dev/null; echo done", Duration::from_secs(30))
            .with_audit(audit.clone());

        agent.propose_fix(&task()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(audit.base_dir().join("agents"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let content = std::fs::read_to_string(&entries[0]).unwrap();
        assert!(content.contains("\"event\":\"prompt\""));
        assert!(content.contains("\"event\":\"response\""));
    }
}
