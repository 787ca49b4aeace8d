#![doc = "Repository client for CLI and core: bridges the RepoClient trait to the GitHub contents API."]
//
//! # Repository client (GitHub contents API)
//!
//! Implements [`RepoClient`] against `GET`/`PUT
//! /repos/{owner}/{repo}/contents/{path}`: the existence probe that yields
//! the optimistic-concurrency `sha`, and the create-or-update write. All
//! transport, serialization, and error handling are encapsulated here; the
//! publish flow only sees the trait.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use blog_sync_core::contract::{ClientError, PutContent, RepoClient, RepoFile, WriteStatus};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "blog-sync";

pub struct GithubClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl GithubClient {
    pub fn new(token: String) -> Self {
        Self::with_base(token, DEFAULT_API_BASE.to_string())
    }

    /// Same client against another API root; integration environments point
    /// this at a local stub.
    pub fn with_base(token: String, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> String {
        format!("{}/repos/{}/{}/contents/{}", self.api_base, owner, repo, path)
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[async_trait]
impl RepoClient for GithubClient {
    async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<RepoFile>, ClientError> {
        let url = self.contents_url(owner, repo, path);
        info!(url = %url, "Probing repository content");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = ?e, "Content probe request failed");
                Box::new(e) as ClientError
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!(url = %url, "Content probe: file absent");
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Content probe returned an error status");
            return Err(format!("content probe failed with status {status}").into());
        }
        let body: ContentsResponse = response.json().await.map_err(|e| {
            error!(url = %url, error = ?e, "Content probe response was not the expected JSON");
            Box::new(e) as ClientError
        })?;
        info!(url = %url, sha = %body.sha, "Content probe: file exists");
        Ok(Some(RepoFile { sha: body.sha }))
    }

    async fn put_content<'a>(&self, req: PutContent<'a>) -> Result<WriteStatus, ClientError> {
        let url = self.contents_url(req.owner, req.repo, req.path);
        info!(url = %url, branch = %req.branch, sha = ?req.sha, "Writing repository content");

        let mut payload = serde_json::json!({
            "message": req.message,
            "content": req.content,
            "branch": req.branch,
        });
        if let Some(sha) = req.sha {
            payload["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = ?e, "Content write request failed");
                Box::new(e) as ClientError
            })?;

        let status = response.status();
        match status.as_u16() {
            200 | 201 => {
                info!(url = %url, status = %status, "Content write committed");
                Ok(WriteStatus::Committed(status.as_u16()))
            }
            code if status.is_success() => {
                info!(url = %url, status = %status, "Content write accepted with an unexpected status");
                Ok(WriteStatus::Uncertain(code))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                error!(url = %url, status = %status, body = %body, "Content write rejected");
                Err(format!("content write failed with status {status}: {body}").into())
            }
        }
    }
}
