use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{BranchType, IndexAddOption, Repository, ResetType, Signature, StatusOptions};
use tracing::{debug, info, warn};

use crate::config::credentials::redact_url_userinfo;
use crate::config::settings::GitIdentity;
use crate::errors::VulnfixError;
use super::ignore::ensure_ignored;
use super::Workspace;

const FALLBACK_NAME: &str = "vulnfix";
const FALLBACK_EMAIL: &str = "vulnfix@localhost";

/// `Workspace` over a local repository via libgit2. Pushing shells out to
/// `git` so the user's credential helpers apply.
pub struct GitWorkspace {
    repo_root: PathBuf,
    base_branch: String,
    identity: GitIdentity,
}

impl GitWorkspace {
    pub fn open(repo_root: &Path, base_branch: &str) -> Result<Self, VulnfixError> {
        let repo = Repository::open(repo_root)
            .map_err(|e| VulnfixError::Git(format!("Failed to open repo {}: {}", repo_root.display(), e)))?;
        let root = repo
            .workdir()
            .ok_or_else(|| VulnfixError::Git("Bare repositories are not supported".into()))?
            .to_path_buf();
        Ok(Self {
            repo_root: root,
            base_branch: base_branch.to_string(),
            identity: GitIdentity::default(),
        })
    }

    pub fn with_identity(mut self, identity: GitIdentity) -> Self {
        self.identity = identity;
        self
    }

    fn repo(&self) -> Result<Repository, VulnfixError> {
        Repository::open(&self.repo_root)
            .map_err(|e| VulnfixError::Git(format!("Failed to open repo: {}", e)))
    }

    /// Keep `dir` out of every status check and commit.
    pub fn exclude_dir(&self, dir: &Path) -> Result<bool, VulnfixError> {
        let repo = self.repo()?;
        let exclude = repo.path().join("info").join("exclude");
        ensure_ignored(&exclude, &self.repo_root, dir)
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, VulnfixError> {
        let config = repo.config().ok();
        let name = self.identity.name.clone()
            .or_else(|| config.as_ref().and_then(|c| c.get_string("user.name").ok()))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let email = self.identity.email.clone()
            .or_else(|| config.as_ref().and_then(|c| c.get_string("user.email").ok()))
            .unwrap_or_else(|| FALLBACK_EMAIL.to_string());
        Signature::now(&name, &email)
            .map_err(|e| VulnfixError::Git(format!("Invalid commit identity: {}", e)))
    }

    fn status_paths(repo: &Repository, recurse: bool) -> Result<Vec<String>, VulnfixError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(recurse)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))
            .map_err(|e| VulnfixError::Git(format!("Failed to read status: {}", e)))?;
        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn stage_all_in(repo: &Repository) -> Result<(), VulnfixError> {
        let mut index = repo.index()
            .map_err(|e| VulnfixError::Git(format!("Failed to get index: {}", e)))?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(|e| VulnfixError::Git(format!("Failed to add files: {}", e)))?;
        index.update_all(["*"].iter(), None)
            .map_err(|e| VulnfixError::Git(format!("Failed to stage deletions: {}", e)))?;
        index.write()
            .map_err(|e| VulnfixError::Git(format!("Failed to write index: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Workspace for GitWorkspace {
    async fn reset_clean(&self) -> Result<(), VulnfixError> {
        let repo = self.repo()?;
        let head = repo.head()
            .map_err(|e| VulnfixError::Git(format!("No HEAD: {}", e)))?
            .peel_to_commit()
            .map_err(|e| VulnfixError::Git(format!("HEAD not a commit: {}", e)))?;
        repo.reset(head.as_object(), ResetType::Hard, None)
            .map_err(|e| VulnfixError::Git(format!("Failed to reset: {}", e)))?;

        for path in Self::status_paths(&repo, false)? {
            let full = self.repo_root.join(&path);
            let removed = if path.ends_with('/') || full.is_dir() {
                std::fs::remove_dir_all(&full)
            } else {
                std::fs::remove_file(&full)
            };
            match removed {
                Ok(()) => debug!(path = %path, "Removed untracked path"),
                Err(e) => warn!(path = %path, error = %e, "Could not remove untracked path"),
            }
        }
        Ok(())
    }

    async fn checkout_base(&self) -> Result<(), VulnfixError> {
        let repo = self.repo()?;
        let refname = format!("refs/heads/{}", self.base_branch);
        let target = repo.revparse_single(&refname)
            .map_err(|e| VulnfixError::Git(format!("Base branch '{}' not found: {}", self.base_branch, e)))?;
        repo.checkout_tree(&target, Some(CheckoutBuilder::new().force()))
            .map_err(|e| VulnfixError::Git(format!("Failed to check out {}: {}", self.base_branch, e)))?;
        repo.set_head(&refname)
            .map_err(|e| VulnfixError::Git(format!("Failed to switch to {}: {}", self.base_branch, e)))?;
        debug!(branch = %self.base_branch, "Checked out base branch");
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<(), VulnfixError> {
        let repo = self.repo()?;
        let head = repo.head()
            .map_err(|e| VulnfixError::Git(format!("No HEAD: {}", e)))?
            .peel_to_commit()
            .map_err(|e| VulnfixError::Git(format!("HEAD not a commit: {}", e)))?;
        repo.branch(name, &head, true)
            .map_err(|e| VulnfixError::Git(format!("Failed to create branch '{}': {}", name, e)))?;
        repo.set_head(&format!("refs/heads/{}", name))
            .map_err(|e| VulnfixError::Git(format!("Failed to switch to '{}': {}", name, e)))?;
        info!(branch = %name, "Created branch");
        Ok(())
    }

    async fn stage_all(&self) -> Result<(), VulnfixError> {
        let repo = self.repo()?;
        Self::stage_all_in(&repo)
    }

    async fn is_dirty(&self) -> Result<bool, VulnfixError> {
        let repo = self.repo()?;
        Ok(!Self::status_paths(&repo, false)?.is_empty())
    }

    async fn commit(&self, message: &str) -> Result<String, VulnfixError> {
        let repo = self.repo()?;
        let mut index = repo.index()
            .map_err(|e| VulnfixError::Git(format!("Failed to get index: {}", e)))?;
        let tree_oid = index.write_tree()
            .map_err(|e| VulnfixError::Git(format!("Failed to write tree: {}", e)))?;
        let tree = repo.find_tree(tree_oid)
            .map_err(|e| VulnfixError::Git(format!("Failed to find tree: {}", e)))?;
        let parent = repo.head()
            .map_err(|e| VulnfixError::Git(format!("No HEAD: {}", e)))?
            .peel_to_commit()
            .map_err(|e| VulnfixError::Git(format!("HEAD not a commit: {}", e)))?;

        let sig = self.signature(&repo)?;
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
            .map_err(|e| VulnfixError::Git(format!("Failed to commit: {}", e)))?;

        info!(commit = %oid, "Committed changes");
        Ok(oid.to_string())
    }

    async fn amend(&self) -> Result<(), VulnfixError> {
        let repo = self.repo()?;
        Self::stage_all_in(&repo)?;
        let mut index = repo.index()
            .map_err(|e| VulnfixError::Git(format!("Failed to get index: {}", e)))?;
        let tree_oid = index.write_tree()
            .map_err(|e| VulnfixError::Git(format!("Failed to write tree: {}", e)))?;
        let tree = repo.find_tree(tree_oid)
            .map_err(|e| VulnfixError::Git(format!("Failed to find tree: {}", e)))?;
        let head = repo.head()
            .map_err(|e| VulnfixError::Git(format!("No HEAD: {}", e)))?
            .peel_to_commit()
            .map_err(|e| VulnfixError::Git(format!("HEAD not a commit: {}", e)))?;

        let oid = head.amend(Some("HEAD"), None, None, None, None, Some(&tree))
            .map_err(|e| VulnfixError::Git(format!("Failed to amend commit: {}", e)))?;
        info!(commit = %oid, "Amended commit with QA changes");
        Ok(())
    }

    async fn head_commit_files(&self) -> Result<Vec<String>, VulnfixError> {
        let repo = self.repo()?;
        let head = repo.head()
            .map_err(|e| VulnfixError::Git(format!("No HEAD: {}", e)))?
            .peel_to_commit()
            .map_err(|e| VulnfixError::Git(format!("HEAD not a commit: {}", e)))?;
        let tree = head.tree()?;
        let parent_tree = match head.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .map_err(|e| VulnfixError::Git(format!("Failed to diff commit: {}", e)))?;

        let mut files: Vec<String> = diff
            .deltas()
            .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()).map(|p| p.to_string_lossy().into_owned()))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    async fn changed_files(&self) -> Result<Vec<String>, VulnfixError> {
        let repo = self.repo()?;
        Self::status_paths(&repo, true)
    }

    async fn delete_branch(&self, name: &str) -> Result<(), VulnfixError> {
        let repo = self.repo()?;
        let mut branch = match repo.find_branch(name, BranchType::Local) {
            Ok(branch) => branch,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                debug!(branch = %name, "Branch already gone");
                return Ok(());
            }
            Err(e) => return Err(VulnfixError::Git(format!("Failed to find branch '{}': {}", name, e))),
        };
        if branch.is_head() {
            return Err(VulnfixError::Git(format!("Refusing to delete checked-out branch '{}'", name)));
        }
        branch.delete()
            .map_err(|e| VulnfixError::Git(format!("Failed to delete branch '{}': {}", name, e)))?;
        info!(branch = %name, "Deleted branch");
        Ok(())
    }

    async fn push(&self, name: &str) -> Result<(), VulnfixError> {
        // Force: the branch is owned by this tool and may exist remotely from
        // an earlier run whose PR creation failed.
        let output = tokio::process::Command::new("git")
            .current_dir(&self.repo_root)
            .args(["push", "--force", "-u", "origin", name])
            .output()
            .await
            .map_err(|e| VulnfixError::Git(format!("Failed to execute git push: {}", e)))?;

        if output.status.success() {
            info!(branch = %name, "Pushed branch");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(VulnfixError::Git(format!("git push failed: {}", redact_url_userinfo(stderr.trim()))))
        }
    }

    async fn current_branch(&self) -> Result<Option<String>, VulnfixError> {
        let repo = self.repo()?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(_) => return Ok(None),
        };
        if head.is_branch() {
            Ok(head.shorthand().map(str::to_string))
        } else {
            Ok(None)
        }
    }
}
