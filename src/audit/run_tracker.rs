use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::utils::atomic_write;
use crate::errors::VulnfixError;
use crate::pipeline::outcome::{CandidateRecord, RunSummary, StopReason};

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RunData {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub candidates: Vec<CandidateRecord>,
    pub stop_reason: Option<StopReason>,
    pub headline: Option<String>,
}

/// Keeps `run.json` in step with the candidates processed so far.
pub struct RunTracker {
    path: PathBuf,
    data: RunData,
}

impl RunTracker {
    pub fn new(base_dir: &Path, run_id: &str) -> Self {
        Self {
            path: base_dir.join("run.json"),
            data: RunData {
                run_id: run_id.to_string(),
                started_at: Utc::now().to_rfc3339(),
                ..Default::default()
            },
        }
    }

    pub async fn record_candidate(&mut self, record: &CandidateRecord) -> Result<(), VulnfixError> {
        self.data.candidates.push(record.clone());
        self.save().await
    }

    pub async fn finish(&mut self, summary: &RunSummary) -> Result<(), VulnfixError> {
        self.data.finished_at = Some(Utc::now().to_rfc3339());
        self.data.stop_reason = Some(summary.stop_reason.clone());
        self.data.headline = Some(summary.headline());
        self.save().await
    }

    pub fn data(&self) -> &RunData {
        &self.data
    }

    async fn save(&self) -> Result<(), VulnfixError> {
        let json = serde_json::to_string_pretty(&self.data)?;
        atomic_write(&self.path, &json).await
    }
}
