use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::VulnfixError;
use crate::utils::truncation::truncate_chars;
use super::naming::{LABEL_COLOR, LABEL_DESCRIPTION};
use super::{PrStatus, PullRequestHost, PullRequestSpec};

/// GitHub's limit on pull request body length.
pub const MAX_PR_BODY_CHARS: usize = 65_536;
const PR_LIST_LIMIT: &str = "500";

/// `PullRequestHost` backed by the GitHub CLI, run inside the repository.
pub struct GhCli {
    repo_root: PathBuf,
    program: String,
}

#[derive(Debug, Deserialize)]
struct PrEntry {
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    name: String,
}

impl GhCli {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            program: "gh".to_string(),
        }
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn gh(&self, args: &[&str]) -> Result<String, VulnfixError> {
        debug!(program = %self.program, args = ?args.iter().take(3).collect::<Vec<_>>(), "Running gh");
        let output = tokio::process::Command::new(&self.program)
            .current_dir(&self.repo_root)
            .args(args)
            .output()
            .await
            .map_err(|e| VulnfixError::GitHub(format!("Failed to execute {}: {}", self.program, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("auth login") || stderr.contains("authentication") {
                return Err(VulnfixError::Authentication(format!("gh is not authenticated: {}", stderr.trim())));
            }
            Err(VulnfixError::GitHub(format!(
                "gh {} failed: {}",
                args.first().copied().unwrap_or(""),
                stderr.trim()
            )))
        }
    }
}

/// Count PRs whose labels include one starting with `prefix`.
pub fn count_with_label_prefix(json: &str, prefix: &str) -> Result<usize, VulnfixError> {
    let prs: Vec<PrEntry> = serde_json::from_str(json)?;
    Ok(prs
        .iter()
        .filter(|pr| pr.labels.iter().any(|l| l.name.starts_with(prefix)))
        .count())
}

/// Strongest status among PRs: an open PR wins over a merged one, which wins
/// over a closed one.
pub fn strongest_status(json: &str) -> Result<PrStatus, VulnfixError> {
    let prs: Vec<PrEntry> = serde_json::from_str(json)?;
    let has = |state: &str| prs.iter().any(|pr| pr.state.eq_ignore_ascii_case(state));
    Ok(if has("OPEN") {
        PrStatus::Open
    } else if has("MERGED") {
        PrStatus::Merged
    } else if has("CLOSED") {
        PrStatus::Closed
    } else {
        PrStatus::None
    })
}

#[async_trait]
impl PullRequestHost for GhCli {
    async fn count_open_prs(&self, label_prefix: &str) -> Result<usize, VulnfixError> {
        let json = self
            .gh(&["pr", "list", "--state", "open", "--limit", PR_LIST_LIMIT, "--json", "number,labels"])
            .await?;
        let count = count_with_label_prefix(&json, label_prefix)?;
        debug!(count, prefix = %label_prefix, "Counted open remediation PRs");
        Ok(count)
    }

    async fn pr_status(&self, label: &str) -> Result<PrStatus, VulnfixError> {
        let json = self
            .gh(&["pr", "list", "--state", "all", "--label", label, "--limit", "20", "--json", "number,state"])
            .await?;
        strongest_status(&json)
    }

    async fn ensure_label(&self, label: &str) -> Result<(), VulnfixError> {
        self.gh(&[
            "label", "create", label,
            "--description", LABEL_DESCRIPTION,
            "--color", LABEL_COLOR,
            "--force",
        ])
        .await?;
        debug!(label = %label, "Label ensured");
        Ok(())
    }

    async fn create_pr(&self, spec: &PullRequestSpec) -> Result<String, VulnfixError> {
        let body = truncate_chars(&spec.body, MAX_PR_BODY_CHARS - 3);
        let mut args = vec![
            "pr", "create",
            "--title", spec.title.as_str(),
            "--body", body.as_str(),
            "--base", spec.base.as_str(),
            "--head", spec.head.as_str(),
        ];
        if let Some(label) = spec.label.as_deref() {
            args.push("--label");
            args.push(label);
        }

        let stdout = self.gh(&args).await?;
        let url = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| line.starts_with("http"))
            .map(str::to_string)
            .ok_or_else(|| VulnfixError::GitHub("gh pr create returned no URL".into()))?;

        info!(url = %url, branch = %spec.head, "Pull request created");
        Ok(url)
    }
}
