use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::errors::VulnfixError;

/// Human-readable, timestamped event log for one run.
pub struct WorkflowLogger {
    path: PathBuf,
}

impl WorkflowLogger {
    pub fn new(base_dir: &Path) -> Self {
        Self { path: base_dir.join("workflow.log") }
    }

    pub async fn initialize(&self, run_id: &str, repo_root: &Path) -> Result<(), VulnfixError> {
        let header = format!(
            "# vulnfix Workflow Log\n# Run: {}\n# Repository: {}\n# Started: {}\n\n",
            run_id,
            repo_root.display(),
            Utc::now().to_rfc3339()
        );
        tokio::fs::write(&self.path, &header).await?;
        Ok(())
    }

    pub async fn log_event(&self, message: &str) -> Result<(), VulnfixError> {
        let line = format!("[{}] {}\n", Utc::now().format("%H:%M:%S"), message);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
