//! Remote object-store capability: create-or-update a file in a content
//! repository, and derive the public raw URL it will be served from.

use crate::config::UploadConfig;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use std::{fmt, time::Duration};
use thiserror::Error;

/// One create-or-update request against `{repository}/contents/{path}`.
#[derive(Debug, Clone)]
pub struct ContentPut {
    pub repository: String,
    pub path: String,
    pub message: String,
    /// Base64 encoded payload.
    pub content: String,
    pub branch: String,
}

/// Error body returned by the remote API, kept as JSON when it parses.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteErrorBody {
    Structured(Value),
    Text(String),
}

impl RemoteErrorBody {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) if value.is_object() => Self::Structured(value),
            _ => Self::Text(raw.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Structured(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for RemoteErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(value) => write!(f, "{}", value),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("remote store rejected upload (HTTP {status}): {body}")]
    Rejected { status: u16, body: RemoteErrorBody },
    #[error("remote store request failed: {0}")]
    Transport(String),
}

impl RemoteStoreError {
    /// What the client is shown: the remote body when there is one.
    pub fn client_detail(&self) -> Value {
        match self {
            Self::Rejected { body, .. } => body.to_value(),
            Self::Transport(msg) => Value::String(msg.clone()),
        }
    }
}

/// Everything but unreserved characters and `/` is escaped in object paths.
const PATH_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, &PATH_ENCODE_SET).to_string()
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Issue the PUT. Only the HTTP status is consulted on success.
    async fn put_contents(&self, request: &ContentPut) -> Result<(), RemoteStoreError>;

    /// Public URL of `path`, derived without asking the store.
    fn raw_url(&self, repository: &str, branch: &str, path: &str) -> String;
}

#[derive(Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: &'a str,
    branch: &'a str,
}

/// GitHub contents API backend.
pub struct GithubContentsStore {
    client: reqwest::Client,
    owner: String,
    api_base: String,
    raw_base: String,
}

impl GithubContentsStore {
    pub fn new(cfg: &UploadConfig) -> anyhow::Result<Self> {
        let token = cfg
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("GITHUB_TOKEN is required to upload"))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {}", token))
            .context("GITHUB_TOKEN is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("image-relay/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .context("building HTTP client")?;

        tracing::info!(
            "Content store initialized: owner={} api_base={}",
            cfg.owner,
            cfg.api_base
        );

        Ok(Self {
            client,
            owner: cfg.owner.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            raw_base: cfg.raw_base.trim_end_matches('/').to_string(),
        })
    }

    fn contents_url(&self, repository: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            repository,
            encode_path(path)
        )
    }
}

#[async_trait]
impl ObjectStore for GithubContentsStore {
    async fn put_contents(&self, request: &ContentPut) -> Result<(), RemoteStoreError> {
        let url = self.contents_url(&request.repository, &request.path);
        let body = PutContentsBody {
            message: &request.message,
            content: &request.content,
            branch: &request.branch,
        };

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(RemoteStoreError::Rejected {
                status,
                body: RemoteErrorBody::parse(&text),
            });
        }

        Ok(())
    }

    fn raw_url(&self, repository: &str, branch: &str, path: &str) -> String {
        raw_content_url(&self.raw_base, &self.owner, repository, branch, path)
    }
}

/// `{raw_base}/{owner}/{repository}/{branch}/{path}`, with `path` escaped.
pub fn raw_content_url(
    raw_base: &str,
    owner: &str,
    repository: &str,
    branch: &str,
    path: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        raw_base.trim_end_matches('/'),
        owner,
        repository,
        branch,
        encode_path(path)
    )
}
