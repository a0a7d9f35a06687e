pub mod github;
pub mod ignore;
pub mod naming;
pub mod workspace;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::VulnfixError;

pub use github::GhCli;
pub use workspace::GitWorkspace;

/// The single working tree the pipeline owns while processing a candidate.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Discard all uncommitted changes and untracked (non-ignored) files.
    async fn reset_clean(&self) -> Result<(), VulnfixError>;

    async fn checkout_base(&self) -> Result<(), VulnfixError>;

    /// Create (or recreate) `name` at HEAD and switch to it, keeping the
    /// working tree as is.
    async fn create_branch(&self, name: &str) -> Result<(), VulnfixError>;

    async fn stage_all(&self) -> Result<(), VulnfixError>;

    /// True when the index or the working tree differs from HEAD.
    async fn is_dirty(&self) -> Result<bool, VulnfixError>;

    /// Commit everything staged; returns the new commit id.
    async fn commit(&self, message: &str) -> Result<String, VulnfixError>;

    /// Fold all current changes into the HEAD commit, keeping its message.
    async fn amend(&self) -> Result<(), VulnfixError>;

    /// Paths touched by the HEAD commit.
    async fn head_commit_files(&self) -> Result<Vec<String>, VulnfixError>;

    /// Paths that differ from HEAD in the index or working tree.
    async fn changed_files(&self) -> Result<Vec<String>, VulnfixError>;

    async fn delete_branch(&self, name: &str) -> Result<(), VulnfixError>;

    async fn push(&self, name: &str) -> Result<(), VulnfixError>;

    async fn current_branch(&self) -> Result<Option<String>, VulnfixError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSpec {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub label: Option<String>,
}

/// Code host operations used for dedup, the open-PR cap and publishing.
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// Number of open PRs carrying any label that starts with `label_prefix`.
    async fn count_open_prs(&self, label_prefix: &str) -> Result<usize, VulnfixError>;

    async fn pr_status(&self, label: &str) -> Result<PrStatus, VulnfixError>;

    /// Create the label, or update it if it already exists.
    async fn ensure_label(&self, label: &str) -> Result<(), VulnfixError>;

    /// Open a pull request and return its URL.
    async fn create_pr(&self, spec: &PullRequestSpec) -> Result<String, VulnfixError>;
}
