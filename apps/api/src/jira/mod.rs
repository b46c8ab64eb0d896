/// Optional Jira Cloud integration: approved rules become Jira tasks.
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::config::JiraConfig;

/// Jira rejects summaries longer than this.
pub const MAX_SUMMARY_CHARS: usize = 255;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Jira API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

#[derive(Clone)]
pub struct JiraClient {
    client: Client,
    config: JiraConfig,
}

impl JiraClient {
    /// `None` unless every Jira setting is configured.
    pub fn from_config(config: Option<&JiraConfig>) -> anyhow::Result<Option<Self>> {
        let Some(config) = config else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            config: config.clone(),
        }))
    }

    fn issue_url(&self) -> String {
        format!("https://{}.atlassian.net/rest/api/3/issue", self.config.domain)
    }

    /// Creates a Task in the configured project and returns its issue key.
    pub async fn create_task(&self, summary: &str, description: &str) -> Result<String, JiraError> {
        let body = issue_payload(&self.config.project_key, summary, description);

        let response = self
            .client
            .post(self.issue_url())
            .basic_auth(&self.config.email, Some(&self.config.api_token))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JiraError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let issue: CreatedIssue = response.json().await?;
        info!("Created Jira task {}", issue.key);
        Ok(issue.key)
    }
}

pub fn truncate_summary(summary: &str) -> String {
    let summary = summary.trim();
    if summary.chars().count() <= MAX_SUMMARY_CHARS {
        return summary.to_string();
    }
    let mut out: String = summary.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Issue body with the description in Atlassian document format.
pub fn issue_payload(project_key: &str, summary: &str, description: &str) -> Value {
    let mut fields = json!({
        "project": { "key": project_key },
        "summary": truncate_summary(summary),
        "issuetype": { "name": "Task" },
    });
    if !description.trim().is_empty() {
        fields["description"] = json!({
            "type": "doc",
            "version": 1,
            "content": [{
                "type": "paragraph",
                "content": [{ "type": "text", "text": description }]
            }]
        });
    }
    json!({ "fields": fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_truncated_to_limit() {
        let long = "r".repeat(400);
        let out = truncate_summary(&long);
        assert_eq!(out.chars().count(), MAX_SUMMARY_CHARS);
        assert!(out.ends_with("..."));
        assert_eq!(truncate_summary("  short  "), "short");
    }

    #[test]
    fn test_issue_payload_shape() {
        let payload = issue_payload("JAM", "If tantrum, then stay calm.", "Source: interview");
        assert_eq!(payload["fields"]["project"]["key"], "JAM");
        assert_eq!(payload["fields"]["issuetype"]["name"], "Task");
        assert_eq!(payload["fields"]["description"]["type"], "doc");
        assert_eq!(
            payload["fields"]["description"]["content"][0]["content"][0]["text"],
            "Source: interview"
        );
    }

    #[test]
    fn test_issue_payload_without_description() {
        let payload = issue_payload("JAM", "Summary", "  ");
        assert!(payload["fields"].get("description").is_none());
    }

    #[test]
    fn test_from_config_none_when_unconfigured() {
        assert!(JiraClient::from_config(None).unwrap().is_none());
    }
}
