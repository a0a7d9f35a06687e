//! In-memory fakes of every collaborator the pipeline drives.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use vulnfix::agents::{FixAgentPort, FixProposal, QaProposal, QaTask, RemediationTask};
use vulnfix::config::Severity;
use vulnfix::errors::VulnfixError;
use vulnfix::feed::{VulnerabilityCandidate, VulnerabilityFeed};
use vulnfix::git::{PrStatus, PullRequestHost, PullRequestSpec, Workspace};
use vulnfix::pipeline::{Clock, Collaborators, PipelineConfig, PipelineController};
use vulnfix::qa::{BuildResult, BuildRunner};

pub const BASE: &str = "main";

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

pub struct FakeFeed {
    candidates: Mutex<Option<Vec<VulnerabilityCandidate>>>,
    pub list_calls: AtomicUsize,
    pub notes: Mutex<Vec<(String, String)>>,
}

impl FakeFeed {
    pub fn with(candidates: Vec<VulnerabilityCandidate>) -> Arc<Self> {
        Arc::new(Self {
            candidates: Mutex::new(Some(candidates)),
            list_calls: AtomicUsize::new(0),
            notes: Mutex::new(Vec::new()),
        })
    }

    /// A feed whose list call always fails.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            candidates: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            notes: Mutex::new(Vec::new()),
        })
    }

    pub fn notes(&self) -> Vec<(String, String)> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VulnerabilityFeed for FakeFeed {
    async fn list_candidates(
        &self,
        limit: u32,
        _severities: &[Severity],
    ) -> Result<Vec<VulnerabilityCandidate>, VulnfixError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.candidates.lock().unwrap() {
            Some(list) => Ok(list.iter().take(limit as usize).cloned().collect()),
            None => Err(VulnfixError::Network("connection refused".into())),
        }
    }

    async fn story(&self, id: &str) -> Result<String, VulnfixError> {
        Ok(format!("Story of {}", id))
    }

    async fn events(&self, id: &str) -> Result<String, VulnfixError> {
        Ok(format!("Events of {}", id))
    }

    async fn http_request(&self, _id: &str) -> Result<String, VulnfixError> {
        Err(VulnfixError::Feed("404".into()))
    }

    async fn add_note(&self, id: &str, note: &str) -> Result<(), VulnfixError> {
        self.notes.lock().unwrap().push((id.to_string(), note.to_string()));
        Ok(())
    }

    fn vulnerability_url(&self, id: &str) -> Option<String> {
        Some(format!("https://feed.example/vulns/{}", id))
    }
}

pub fn candidate(id: &str, title: &str) -> VulnerabilityCandidate {
    VulnerabilityCandidate::new(id, title)
        .with_rule("sql-injection")
        .with_severity("CRITICAL")
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RepoModel {
    pub current: String,
    pub branches: HashSet<String>,
    /// Uncommitted edits in the working tree.
    pub pending: BTreeSet<String>,
    pub head_files: Vec<String>,
    pub commits: Vec<(String, String)>,
    pub amends: usize,
    pub pushed: Vec<String>,
    pub deleted: Vec<String>,
    pub resets: usize,
}

pub struct FakeWorkspace {
    pub model: Mutex<RepoModel>,
    pub fail_push: bool,
}

impl FakeWorkspace {
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    pub fn failing_push() -> Arc<Self> {
        Self::build(true)
    }

    fn build(fail_push: bool) -> Arc<Self> {
        let mut branches = HashSet::new();
        branches.insert(BASE.to_string());
        Arc::new(Self {
            model: Mutex::new(RepoModel {
                current: BASE.to_string(),
                branches,
                ..Default::default()
            }),
            fail_push,
        })
    }

    /// Simulate an agent editing a file.
    pub fn touch(&self, file: &str) {
        self.model.lock().unwrap().pending.insert(file.to_string());
    }

    pub fn current(&self) -> String {
        self.model.lock().unwrap().current.clone()
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.model.lock().unwrap().branches.contains(name)
    }

    pub fn commits(&self) -> Vec<(String, String)> {
        self.model.lock().unwrap().commits.clone()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.model.lock().unwrap().pushed.clone()
    }

    pub fn amends(&self) -> usize {
        self.model.lock().unwrap().amends
    }
}

#[async_trait]
impl Workspace for FakeWorkspace {
    async fn reset_clean(&self) -> Result<(), VulnfixError> {
        let mut model = self.model.lock().unwrap();
        model.pending.clear();
        model.resets += 1;
        Ok(())
    }

    async fn checkout_base(&self) -> Result<(), VulnfixError> {
        self.model.lock().unwrap().current = BASE.to_string();
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<(), VulnfixError> {
        let mut model = self.model.lock().unwrap();
        model.branches.insert(name.to_string());
        model.current = name.to_string();
        Ok(())
    }

    async fn stage_all(&self) -> Result<(), VulnfixError> {
        Ok(())
    }

    async fn is_dirty(&self) -> Result<bool, VulnfixError> {
        Ok(!self.model.lock().unwrap().pending.is_empty())
    }

    async fn commit(&self, message: &str) -> Result<String, VulnfixError> {
        let mut model = self.model.lock().unwrap();
        let branch = model.current.clone();
        model.commits.push((branch, message.to_string()));
        model.head_files = std::mem::take(&mut model.pending).into_iter().collect();
        Ok(format!("c{}", model.commits.len()))
    }

    async fn amend(&self) -> Result<(), VulnfixError> {
        let mut model = self.model.lock().unwrap();
        let pending: Vec<String> = std::mem::take(&mut model.pending).into_iter().collect();
        model.head_files.extend(pending);
        model.amends += 1;
        Ok(())
    }

    async fn head_commit_files(&self) -> Result<Vec<String>, VulnfixError> {
        Ok(self.model.lock().unwrap().head_files.clone())
    }

    async fn changed_files(&self) -> Result<Vec<String>, VulnfixError> {
        Ok(self.model.lock().unwrap().pending.iter().cloned().collect())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), VulnfixError> {
        let mut model = self.model.lock().unwrap();
        if model.current == name {
            return Err(VulnfixError::Git(format!("cannot delete checked out branch {}", name)));
        }
        model.branches.remove(name);
        model.deleted.push(name.to_string());
        Ok(())
    }

    async fn push(&self, name: &str) -> Result<(), VulnfixError> {
        if self.fail_push {
            return Err(VulnfixError::Git("remote rejected".into()));
        }
        self.model.lock().unwrap().pushed.push(name.to_string());
        Ok(())
    }

    async fn current_branch(&self) -> Result<Option<String>, VulnfixError> {
        Ok(Some(self.current()))
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub enum FixBehavior {
    Edit(Vec<&'static str>),
    NoChanges,
    Fatal,
    Fail,
}

pub enum QaBehavior {
    Edit(&'static str, Vec<&'static str>),
    Request(&'static str),
    Fail,
}

pub struct FakeAgent {
    workspace: Arc<FakeWorkspace>,
    fixes: Mutex<VecDeque<FixBehavior>>,
    qa: Mutex<VecDeque<QaBehavior>>,
    pub fix_tasks: Mutex<Vec<RemediationTask>>,
    pub qa_tasks: Mutex<Vec<QaTask>>,
}

impl FakeAgent {
    pub fn new(
        workspace: Arc<FakeWorkspace>,
        fixes: Vec<FixBehavior>,
        qa: Vec<QaBehavior>,
    ) -> Arc<Self> {
        Arc::new(Self {
            workspace,
            fixes: Mutex::new(fixes.into()),
            qa: Mutex::new(qa.into()),
            fix_tasks: Mutex::new(Vec::new()),
            qa_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn fix_calls(&self) -> usize {
        self.fix_tasks.lock().unwrap().len()
    }

    pub fn qa_calls(&self) -> usize {
        self.qa_tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl FixAgentPort for FakeAgent {
    async fn propose_fix(&self, task: &RemediationTask) -> Result<FixProposal, VulnfixError> {
        self.fix_tasks.lock().unwrap().push(task.clone());
        let behavior = self
            .fixes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FixBehavior::NoChanges);
        match behavior {
            FixBehavior::Edit(files) => {
                for file in &files {
                    self.workspace.touch(file);
                }
                Ok(FixProposal {
                    summary: format!("## Fix\nRemediated {}.", task.candidate.id),
                    changed_files: files.iter().map(|f| f.to_string()).collect(),
                })
            }
            FixBehavior::NoChanges => Ok(FixProposal {
                summary: "Nothing to change".into(),
                changed_files: vec![],
            }),
            FixBehavior::Fatal => Err(VulnfixError::AgentFatal("no filesystem tools".into())),
            FixBehavior::Fail => Err(VulnfixError::Agent("agent exited with status 1".into())),
        }
    }

    async fn propose_qa_fix(&self, task: &QaTask) -> Result<QaProposal, VulnfixError> {
        self.qa_tasks.lock().unwrap().push(task.clone());
        let behavior = self
            .qa
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(QaBehavior::Edit("tried again", vec![]));
        match behavior {
            QaBehavior::Edit(summary, files) => {
                for file in &files {
                    self.workspace.touch(file);
                }
                Ok(QaProposal {
                    summary: summary.into(),
                    requested_command: None,
                    changed_files: files.iter().map(|f| f.to_string()).collect(),
                })
            }
            QaBehavior::Request(command) => Ok(QaProposal {
                summary: format!("Please run `{}`", command),
                requested_command: Some(command.into()),
                changed_files: vec![],
            }),
            QaBehavior::Fail => Err(VulnfixError::Agent("qa agent crashed".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Build runner
// ---------------------------------------------------------------------------

pub struct FakeRunner {
    results: Mutex<VecDeque<BuildResult>>,
    pub commands: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new(results: Vec<BuildResult>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub fn always_passing() -> Arc<Self> {
        Self::new(vec![BuildResult::success("BUILD SUCCESS"); 16])
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildRunner for FakeRunner {
    async fn run(&self, command: &str) -> Result<BuildResult, VulnfixError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| BuildResult::failure("BUILD FAILURE", 1)))
    }
}

// ---------------------------------------------------------------------------
// Pull request host
// ---------------------------------------------------------------------------

pub struct FakeHost {
    pub open_prs: Option<usize>,
    pub statuses: HashMap<String, PrStatus>,
    pub status_errors: HashSet<String>,
    pub fail_label: bool,
    /// Titles for which PR creation fails.
    pub fail_pr_for: HashSet<String>,
    pub created: Mutex<Vec<PullRequestSpec>>,
    pub count_calls: AtomicUsize,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            open_prs: Some(0),
            statuses: HashMap::new(),
            status_errors: HashSet::new(),
            fail_label: false,
            fail_pr_for: HashSet::new(),
            created: Mutex::new(Vec::new()),
            count_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeHost {
    pub fn created(&self) -> Vec<PullRequestSpec> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestHost for FakeHost {
    async fn count_open_prs(&self, _label_prefix: &str) -> Result<usize, VulnfixError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.open_prs
            .ok_or_else(|| VulnfixError::Authentication("gh auth login required".into()))
    }

    async fn pr_status(&self, label: &str) -> Result<PrStatus, VulnfixError> {
        if self.status_errors.contains(label) {
            return Err(VulnfixError::GitHub("api unavailable".into()));
        }
        Ok(self.statuses.get(label).copied().unwrap_or(PrStatus::None))
    }

    async fn ensure_label(&self, label: &str) -> Result<(), VulnfixError> {
        if self.fail_label {
            return Err(VulnfixError::GitHub(format!("cannot create {}", label)));
        }
        Ok(())
    }

    async fn create_pr(&self, spec: &PullRequestSpec) -> Result<String, VulnfixError> {
        if self.fail_pr_for.contains(&spec.title) {
            return Err(VulnfixError::GitHub("validation failed".into()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(spec.clone());
        Ok(format!("https://github.com/acme/app/pull/{}", created.len()))
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Advances by `step` every time it is read.
pub struct SteppingClock {
    now: Mutex<DateTime<Utc>>,
    step: chrono::Duration,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()),
            step: chrono::Duration::from_std(step).unwrap(),
        })
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now = current + self.step;
        current
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub feed: Arc<FakeFeed>,
    pub workspace: Arc<FakeWorkspace>,
    pub agent: Arc<FakeAgent>,
    pub runner: Arc<FakeRunner>,
    pub host: Arc<FakeHost>,
}

impl Harness {
    pub fn new(
        feed: Arc<FakeFeed>,
        workspace: Arc<FakeWorkspace>,
        fixes: Vec<FixBehavior>,
        qa: Vec<QaBehavior>,
        runner: Arc<FakeRunner>,
        host: FakeHost,
    ) -> Self {
        let agent = FakeAgent::new(workspace.clone(), fixes, qa);
        Self {
            feed,
            workspace,
            agent,
            runner,
            host: Arc::new(host),
        }
    }

    pub fn controller(&self, config: PipelineConfig) -> PipelineController {
        let collaborators = Collaborators {
            feed: self.feed.clone(),
            agent: self.agent.clone(),
            runner: self.runner.clone(),
            workspace: self.workspace.clone(),
            host: self.host.clone(),
        };
        PipelineController::new(config, collaborators)
            .with_clock(SteppingClock::new(Duration::from_secs(1)))
            .with_run_id("test-run")
    }
}

pub fn config_with_build() -> PipelineConfig {
    PipelineConfig {
        build_command: Some("mvn -q test".into()),
        formatting_command: Some("mvn spotless:apply".into()),
        ..Default::default()
    }
}
