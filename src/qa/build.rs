use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::VulnfixError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl BuildResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), exit_code: Some(0), duration_ms: 0 }
    }

    pub fn failure(output: impl Into<String>, exit_code: i32) -> Self {
        Self { success: false, output: output.into(), exit_code: Some(exit_code), duration_ms: 0 }
    }
}

/// Runs build, test and formatter commands against the working tree.
///
/// A non-zero exit is a normal `BuildResult`; `Err` means the command could
/// not be run to completion at all.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<BuildResult, VulnfixError>;
}

/// `sh -c <command>` in the repository root.
pub struct ShellBuildRunner {
    repo_root: PathBuf,
    timeout: Duration,
}

impl ShellBuildRunner {
    pub fn new(repo_root: PathBuf, timeout: Duration) -> Self {
        Self { repo_root, timeout }
    }
}

#[async_trait]
impl BuildRunner for ShellBuildRunner {
    async fn run(&self, command: &str) -> Result<BuildResult, VulnfixError> {
        let start = Instant::now();
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VulnfixError::Build(format!("failed to run `{}`: {}", command, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VulnfixError::Timeout(format!(
                    "`{}` did not finish within {}s",
                    command,
                    self.timeout.as_secs()
                ))
            })??;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        let result = BuildResult {
            success: output.status.success(),
            output: combined,
            exit_code: output.status.code(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(command, exit_code = ?result.exit_code, duration_ms = result.duration_ms, "Command finished");
        Ok(result)
    }
}
