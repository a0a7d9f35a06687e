pub mod client;
pub mod events;
pub mod models;
pub mod story;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Severity;
use crate::errors::VulnfixError;

pub use client::ContrastClient;
pub use models::{VulnerabilityCandidate, VulnerabilityDetails};

/// Source of vulnerability findings and sink for audit notes.
#[async_trait]
pub trait VulnerabilityFeed: Send + Sync {
    /// Open candidates in feed priority order (severity descending).
    async fn list_candidates(
        &self,
        limit: u32,
        severities: &[Severity],
    ) -> Result<Vec<VulnerabilityCandidate>, VulnfixError>;

    async fn story(&self, id: &str) -> Result<String, VulnfixError>;

    async fn events(&self, id: &str) -> Result<String, VulnfixError>;

    async fn http_request(&self, id: &str) -> Result<String, VulnfixError>;

    async fn add_note(&self, id: &str, note: &str) -> Result<(), VulnfixError>;

    /// Link to the finding in the feed's UI, if the feed has one.
    fn vulnerability_url(&self, _id: &str) -> Option<String> {
        None
    }
}

/// Fetch story, events and the triggering request for a candidate.
/// Failures are logged and replaced by placeholder text.
pub async fn gather_details(feed: &dyn VulnerabilityFeed, id: &str) -> VulnerabilityDetails {
    let mut details = VulnerabilityDetails::default();

    match feed.story(id).await {
        Ok(story) => details.story = story,
        Err(e) => warn!(vuln_id = %id, error = %e, "Could not retrieve vulnerability story"),
    }
    match feed.events(id).await {
        Ok(events) => details.events = events,
        Err(e) => warn!(vuln_id = %id, error = %e, "Could not retrieve event details"),
    }
    match feed.http_request(id).await {
        Ok(request) => details.http_request = request,
        Err(e) => warn!(vuln_id = %id, error = %e, "Could not retrieve HTTP request details"),
    }

    details
}
