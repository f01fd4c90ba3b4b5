use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::tracker::{IssueDraft, IssueTracker, LinkOutcome};
use crate::config::TrackerSection;
use crate::errors::TrackerError;

/// Jira Cloud REST v3 client.
pub struct JiraTracker {
    client: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
    project: String,
    skip_search: bool,
}

#[derive(Deserialize)]
struct CreatedIssue {
    key: Option<String>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    issues: Vec<CreatedIssue>,
}

impl JiraTracker {
    /// Build a client from configuration. Fails with [`TrackerError::Config`]
    /// naming every missing setting.
    pub fn new(config: &TrackerSection, token: Option<&str>) -> Result<Self, TrackerError> {
        let token = token.unwrap_or_default();
        let missing: Vec<&str> = [
            ("JIRA_URL", config.base_url.as_str()),
            ("JIRA_USER/JIRA_EMAIL", config.user.as_str()),
            ("JIRA_API_TOKEN/JIRA_TOKEN", token),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(TrackerError::Config(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(TrackerError::Transport)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            token: token.to_string(),
            project: config.project.clone(),
            skip_search: config.skip_search,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn fields(&self, draft: &IssueDraft) -> Value {
        json!({
            "summary": draft.summary,
            "issuetype": {"name": draft.issue_type},
            "labels": draft.labels(),
            "description": draft.description,
        })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, TrackerError> {
        let resp = req
            .basic_auth(&self.user, Some(&self.token))
            .send()
            .await
            .map_err(TrackerError::Transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TrackerError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IssueTracker for JiraTracker {
    async fn update_issue(&self, key: &str, draft: &IssueDraft) -> Result<(), TrackerError> {
        let req = self
            .client
            .put(self.url(&format!("/rest/api/3/issue/{}", key)))
            .json(&json!({ "fields": self.fields(draft) }));
        self.send(req).await?;
        Ok(())
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<String, TrackerError> {
        let mut fields = self.fields(draft);
        fields["project"] = json!({ "key": self.project });
        let req = self
            .client
            .post(self.url("/rest/api/3/issue"))
            .json(&json!({ "fields": fields }));
        let created: CreatedIssue = self
            .send(req)
            .await?
            .json()
            .await
            .map_err(TrackerError::Transport)?;
        created
            .key
            .filter(|k| !k.is_empty())
            .ok_or(TrackerError::MissingKey)
    }

    async fn search_by_label(&self, label: &str) -> Result<Option<String>, TrackerError> {
        let jql = format!("project = {} AND labels = \"{}\"", self.project, label);
        let req = self
            .client
            .post(self.url("/rest/api/3/search"))
            .json(&json!({ "jql": jql, "maxResults": 2 }));
        let result: SearchResult = self
            .send(req)
            .await?
            .json()
            .await
            .map_err(TrackerError::Transport)?;
        Ok(result.issues.into_iter().find_map(|i| i.key))
    }

    async fn link_issues(
        &self,
        inward: &str,
        outward: &str,
        link_type: &str,
    ) -> Result<LinkOutcome, TrackerError> {
        let req = self.client.post(self.url("/rest/api/3/issueLink")).json(&json!({
            "type": {"name": link_type},
            "inwardIssue": {"key": inward},
            "outwardIssue": {"key": outward},
        }));
        match self.send(req).await {
            Ok(_) => Ok(LinkOutcome::Linked),
            Err(TrackerError::Status { status, body })
                if matches!(status, 400 | 409) && body.to_lowercase().contains("already") =>
            {
                Ok(LinkOutcome::AlreadyLinked)
            }
            Err(e) => Err(e),
        }
    }

    fn label_search_enabled(&self) -> bool {
        !self.skip_search
    }
}
