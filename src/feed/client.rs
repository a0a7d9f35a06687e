use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::settings::FeedSettings;
use crate::config::Severity;
use crate::errors::{with_retry, RetryConfig, VulnfixError};
use super::events::{render_event, render_stacktraces};
use super::models::VulnerabilityCandidate;
use super::story::render_story;
use super::VulnerabilityFeed;

const CLOSED_STATUSES: &[&str] = &["NotAProblem", "Remediated", "Fixed", "AutoRemediated"];

/// Client for the Contrast-style vulnerability API.
pub struct ContrastClient {
    client: Client,
    base_url: String,
    org_id: String,
    app_id: String,
    authorization_key: String,
    api_key: String,
    retry: RetryConfig,
}

impl ContrastClient {
    pub fn new(settings: &FeedSettings) -> Result<Self, VulnfixError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VulnfixError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url_for(&settings.host),
            org_id: settings.org_id.clone(),
            app_id: settings.app_id.clone(),
            authorization_key: settings.authorization_key.clone(),
            api_key: settings.api_key.clone(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn api(&self, path: &str) -> String {
        format!("{}/Contrast/api/ng/{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", &self.authorization_key)
            .header("API-Key", &self.api_key)
            .header("Accept", "application/json")
    }

    async fn get_json(&self, url: &str) -> Result<Value, VulnfixError> {
        with_retry("feed_get", &self.retry, || {
            debug!(url = %url, "GET");
            let request = self.authorized(self.client.get(url));
            async move {
                let resp = request.send().await
                    .map_err(|e| VulnfixError::Network(format!("Feed request failed: {}", e)))?;
                parse_response(resp).await
            }
        })
        .await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, VulnfixError> {
        with_retry("feed_post", &self.retry, || {
            debug!(url = %url, "POST");
            let request = self.authorized(self.client.post(url)).json(body);
            async move {
                let resp = request.send().await
                    .map_err(|e| VulnfixError::Network(format!("Feed request failed: {}", e)))?;
                parse_response(resp).await
            }
        })
        .await
    }
}

/// Hosts may be configured bare (`app.contrastsecurity.com`) or with a scheme.
pub fn base_url_for(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn parse_response(resp: Response) -> Result<Value, VulnfixError> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(VulnfixError::RateLimit("Feed API rate limit exceeded".into()));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(VulnfixError::Authentication(format!("Feed API rejected credentials ({})", status)));
    }
    if !status.is_success() {
        return Err(VulnfixError::Feed(format!("Feed API returned {}", status)));
    }
    resp.json::<Value>().await
        .map_err(|e| VulnfixError::Feed(format!("Failed to parse feed response: {}", e)))
}

fn api_messages(data: &Value) -> String {
    data.get("messages")
        .and_then(Value::as_array)
        .and_then(|m| m.first())
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string()
}

/// Extract open candidates from an `orgtraces/ui` response, preserving order.
pub fn parse_candidates(data: &Value) -> Vec<VulnerabilityCandidate> {
    if !data.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return Vec::new();
    }
    let Some(items) = data.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for item in items {
        let vuln = item.get("vulnerability").unwrap_or(&Value::Null);
        let status = vuln.get("status").and_then(Value::as_str).unwrap_or("");
        if CLOSED_STATUSES.contains(&status) {
            continue;
        }
        let id = vuln.get("uuid").and_then(Value::as_str).unwrap_or("");
        let title = vuln.get("title").and_then(Value::as_str).unwrap_or("");
        if id.is_empty() || title.is_empty() {
            warn!(status = %status, "Skipping open vulnerability without id or title");
            continue;
        }
        candidates.push(VulnerabilityCandidate {
            id: id.to_string(),
            title: title.to_string(),
            rule: vuln.get("ruleName").and_then(Value::as_str).unwrap_or("").to_string(),
            severity: vuln.get("severity").and_then(Value::as_str).unwrap_or("").to_string(),
            status: status.to_string(),
        });
    }
    candidates
}

#[async_trait]
impl VulnerabilityFeed for ContrastClient {
    async fn list_candidates(
        &self,
        limit: u32,
        severities: &[Severity],
    ) -> Result<Vec<VulnerabilityCandidate>, VulnfixError> {
        let url = format!(
            "{}/Contrast/api/ng/organizations/{}/orgtraces/ui?expand=application,session_metadata&offset=0&limit={}&sort=-severity",
            self.base_url, self.org_id, limit
        );
        let severities: Vec<&str> = severities.iter().map(Severity::as_str).collect();
        let body = json!({
            "quickFilter": "OPEN",
            "modules": [self.app_id],
            "servers": [],
            "filterTags": [],
            "severities": severities,
            "status": [],
            "substatus": [],
            "vulnTypes": [],
            "environments": [],
            "urls": [],
            "sinks": [],
            "securityStandards": [],
            "appVersionTags": [],
            "routes": [],
            "tracked": false,
            "untracked": false,
            "technologies": [],
            "applicationTags": [],
            "applicationImportances": [],
            "languages": [],
            "protectStatuses": [],
            "metadataFilters": []
        });

        let data = self.post_json(&url, &body).await?;
        let candidates = parse_candidates(&data);
        info!(count = candidates.len(), "Fetched open vulnerabilities");
        Ok(candidates)
    }

    async fn story(&self, id: &str) -> Result<String, VulnfixError> {
        let data = self.get_json(&self.api(&format!("{}/traces/{}/story", self.org_id, id))).await?;
        if !data.get("success").and_then(Value::as_bool).unwrap_or(false) {
            return Err(VulnfixError::Feed(format!("Story request failed: {}", api_messages(&data))));
        }
        let story = data.get("story")
            .ok_or_else(|| VulnfixError::Feed("Story missing from response".into()))?;
        Ok(render_story(story))
    }

    async fn events(&self, id: &str) -> Result<String, VulnfixError> {
        let summary_url = self.api(&format!(
            "{}/traces/{}/events/summary?expand=skip_links&legacy=false",
            self.org_id, id
        ));
        let data = self.get_json(&summary_url).await?;
        if !data.get("success").and_then(Value::as_bool).unwrap_or(true) {
            return Err(VulnfixError::Feed(format!("Events request failed: {}", api_messages(&data))));
        }

        let mut out = String::new();
        for event in data.get("events").and_then(Value::as_array).into_iter().flatten() {
            out.push_str(&render_event(event));
            if let Some(event_id) = event.get("id").and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string()))) {
                let details_url = self.api(&format!(
                    "{}/traces/{}/events/{}/details?expand=skip_links",
                    self.org_id, id, event_id
                ));
                match self.get_json(&details_url).await {
                    Ok(details) => out.push_str(&render_stacktraces(&details)),
                    Err(e) => warn!(event_id = %event_id, error = %e, "Could not fetch stack trace"),
                }
            }
            out.push('\n');
        }
        Ok(out.trim().to_string())
    }

    async fn http_request(&self, id: &str) -> Result<String, VulnfixError> {
        let url = self.api(&format!("{}/traces/{}/httprequest?expand=skip_links", self.org_id, id));
        let data = self.get_json(&url).await?;
        let text = data.get("success").and_then(Value::as_bool).unwrap_or(false)
            .then(|| data.get("http_request").and_then(|r| r.get("text")).and_then(Value::as_str))
            .flatten();
        match text {
            Some(t) => Ok(t.to_string()),
            None => Err(VulnfixError::Feed(format!("HTTP request unavailable: {}", api_messages(&data)))),
        }
    }

    async fn add_note(&self, id: &str, note: &str) -> Result<(), VulnfixError> {
        let url = self.api(&format!(
            "{}/applications/{}/traces/{}/notes?expand=skip_links",
            self.org_id, self.app_id, id
        ));
        let data = self.post_json(&url, &json!({ "note": note })).await?;
        if data.get("success").and_then(Value::as_bool).unwrap_or(false) {
            info!(vuln_id = %id, "Added note to vulnerability");
            Ok(())
        } else {
            Err(VulnfixError::Feed(format!("Failed to add note: {}", api_messages(&data))))
        }
    }

    fn vulnerability_url(&self, id: &str) -> Option<String> {
        Some(format!(
            "{}/Contrast/static/ng/index.html#/{}/applications/{}/vulns/{}",
            self.base_url, self.org_id, self.app_id, id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ContrastClient {
        let settings = FeedSettings {
            host: server.uri(),
            org_id: "org-1".into(),
            app_id: "app-1".into(),
            authorization_key: "auth-key".into(),
            api_key: "api-key".into(),
            severities: vec![Severity::Critical],
            limit: 10,
        };
        ContrastClient::new(&settings)
            .unwrap()
            .with_retry_config(RetryConfig { max_retries: 1, backoff: false })
    }

    #[test]
    fn test_base_url_for() {
        assert_eq!(base_url_for("app.example.com"), "https://app.example.com");
        assert_eq!(base_url_for("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_parse_candidates_filters_closed_and_incomplete() {
        let data = json!({
            "success": true,
            "items": [
                {"vulnerability": {"uuid": "A", "title": "SQL Injection", "ruleName": "sql-injection", "severity": "CRITICAL", "status": "Reported"}},
                {"vulnerability": {"uuid": "B", "title": "XSS", "status": "Remediated"}},
                {"vulnerability": {"uuid": "", "title": "No id", "status": "Reported"}},
                {"vulnerability": {"uuid": "C", "title": "Path Traversal", "status": "Confirmed"}}
            ]
        });
        let ids: Vec<String> = parse_candidates(&data).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_parse_candidates_unsuccessful_response() {
        assert!(parse_candidates(&json!({"success": false, "items": []})).is_empty());
    }

    #[tokio::test]
    async fn test_list_candidates_sends_filters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Contrast/api/ng/organizations/org-1/orgtraces/ui"))
            .and(header("API-Key", "api-key"))
            .and(body_partial_json(json!({"quickFilter": "OPEN", "modules": ["app-1"], "severities": ["CRITICAL"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "items": [{"vulnerability": {"uuid": "V1", "title": "SQLi", "ruleName": "sql-injection", "severity": "CRITICAL", "status": "Reported"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let candidates = client.list_candidates(10, &[Severity::Critical]).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "V1");
        assert_eq!(candidates[0].rule, "sql-injection");
    }

    #[tokio::test]
    async fn test_story_is_rendered_and_redacted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Contrast/api/ng/org-1/traces/V1/story"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "story": {"chapters": [{"introTextFormat": "Input {{taintedInput}} reached {{sink}}", "introTextVariables": {"taintedInput": "x", "sink": "executeQuery"}}]}
            })))
            .mount(&server)
            .await;

        let story = client_for(&server).story("V1").await.unwrap();
        assert_eq!(story, "Input [REDACTED] reached executeQuery");
    }

    #[tokio::test]
    async fn test_events_include_stack_traces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Contrast/api/ng/org-1/traces/V1/events/summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "events": [{"id": "7", "description": "Query executed"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Contrast/api/ng/org-1/traces/V1/events/7/details"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "event": {"stacktraces": [{"description": "com.acme.Dao.find(Dao.java:10)"}]}
            })))
            .mount(&server)
            .await;

        let events = client_for(&server).events("V1").await.unwrap();
        assert_eq!(events, "Query executed\n  at com.acme.Dao.find(Dao.java:10)");
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Contrast/api/ng/org-1/traces/V1/httprequest"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server).http_request("V1").await.unwrap_err();
        assert!(matches!(err, VulnfixError::Feed(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Contrast/api/ng/org-1/applications/app-1/traces/V1/notes"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).add_note("V1", "PR opened").await.unwrap_err();
        assert!(matches!(err, VulnfixError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_add_note_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Contrast/api/ng/org-1/applications/app-1/traces/V1/notes"))
            .and(body_partial_json(json!({"note": "PR opened"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).add_note("V1", "PR opened").await.unwrap();
    }
}
