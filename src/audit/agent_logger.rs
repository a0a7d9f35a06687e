use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::agents::AgentRole;
use crate::errors::VulnfixError;

/// JSON-lines transcript of a single agent invocation.
pub struct AgentLogger {
    path: PathBuf,
    file: tokio::fs::File,
}

impl AgentLogger {
    pub async fn new(base_dir: &Path, role: AgentRole, vuln_id: &str) -> Result<Self, VulnfixError> {
        let filename = format!(
            "{}_{}_{}.jsonl",
            Utc::now().format("%Y%m%d_%H%M%S%.3f"),
            role.as_str(),
            file_safe(vuln_id),
        );
        let path = base_dir.join("agents").join(&filename);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    pub async fn log_event(
        &mut self,
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<(), VulnfixError> {
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event_type,
            "data": data,
        });
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
