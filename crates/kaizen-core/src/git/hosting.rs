use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::remote::RemoteRepo;

#[derive(Debug, Error)]
pub enum HostingError {
    #[error("transport error calling the hosting API: {0}")]
    Transport(String),
    #[error("hosting API returned an error: {0}")]
    Api(String),
}

/// Everything one pull request needs (spec §4.12, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestSpec {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}

#[derive(Serialize)]
struct CreatePullRequestRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Deserialize)]
struct CreatePullRequestResponse {
    html_url: String,
}

/// Thin client over the hosting provider's REST API, used only for PR
/// creation — branch/commit/push go through `git` directly (spec §6: "the
/// composer invokes `git` for branch create/checkout/add/commit/push and
/// uses the hosting provider's REST API for PR creation").
pub struct HostingClient {
    http: reqwest::Client,
    token: String,
}

impl HostingClient {
    pub fn new(token: String) -> Self {
        Self { http: reqwest::Client::new(), token }
    }

    #[cfg(test)]
    pub fn with_http(token: String, http: reqwest::Client) -> Self {
        Self { http, token }
    }

    /// Create a PR against `repo` using `spec`; returns the PR's web URL.
    pub async fn create_pull_request(&self, api_base: &str, repo: &RemoteRepo, spec: &PullRequestSpec) -> Result<String, HostingError> {
        let url = format!("{api_base}/repos/{}/{}/pulls", repo.owner, repo.repo);
        let body = CreatePullRequestRequest { title: &spec.title, body: &spec.body, head: &spec.head_branch, base: &spec.base_branch };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "kaizen-agent")
            .json(&body)
            .send()
            .await
            .map_err(|e| HostingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HostingError::Api(format!("{status}: {text}")));
        }

        let parsed: CreatePullRequestResponse = response.json().await.map_err(|e| HostingError::Transport(e.to_string()))?;
        Ok(parsed.html_url)
    }
}
