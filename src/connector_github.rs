//! GitHub repository connector.
//!
//! Loads the text files of one branch through the GitHub REST API:
//!
//! 1. `GET /user` checks the access token (skipped when no token is set).
//! 2. `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1` lists every blob.
//! 3. Blobs that pass the [`FileFilter`] are fetched one at a time from
//!    `{raw_url}/{owner}/{repo}/{branch}/{path}`.
//!
//! Files whose fetch fails or whose body is not UTF-8 are skipped with a
//! warning. Excluded paths are never requested.
//!
//! # Configuration
//!
//! ```toml
//! [github]
//! token_env = "GITHUB_TOKEN"
//! max_file_size = 1000000
//! extensions = [".py", ".md", ".rs"]
//! skip_dirs = ["node_modules", ".git"]
//! ```

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

use crate::config::GitHubConfig;
use crate::error::GitHubError;
use crate::filter::FileFilter;
use crate::models::{SourceFile, SourceSet};

/// An `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Parse `https://github.com/owner/repo[.git][/...]`, `github.com/owner/repo`
    /// or plain `owner/repo`.
    pub fn parse(input: &str) -> Result<Self, GitHubError> {
        let trimmed = input.trim().trim_end_matches('/');
        let path = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let path = path
            .strip_prefix("www.github.com/")
            .or_else(|| path.strip_prefix("github.com/"))
            .unwrap_or(path);

        if path.contains("://") || path.contains(':') {
            return Err(GitHubError::InvalidUrl(input.to_string()));
        }

        let mut parts = path.split('/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git");

        // GitHub owner names never contain dots; a dotted owner is some other host.
        if owner.is_empty() || repo.is_empty() || owner.contains('.') {
            return Err(GitHubError::InvalidUrl(input.to_string()));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Browser URL of `path` on `branch`.
    pub fn blob_url(&self, branch: &str, path: &str) -> String {
        format!(
            "https://github.com/{}/{}/blob/{}/{}",
            self.owner, self.repo, branch, path
        )
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// One blob from the recursive tree listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    pub path: String,
    pub size: Option<u64>,
}

/// The GitHub operations the loader needs.
///
/// [`GitHubClient`] talks to the real API; tests substitute a recording stub.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Fail with [`GitHubError::Unauthorized`] if a configured token is rejected.
    async fn validate_token(&self) -> Result<(), GitHubError>;

    async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<String>, GitHubError>;

    /// Every blob on `branch`, recursively.
    async fn list_tree(&self, repo: &RepoRef, branch: &str) -> Result<Vec<TreeEntry>, GitHubError>;

    /// Raw bytes of one file.
    async fn fetch_file(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Result<Vec<u8>, GitHubError>;
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct BranchItem {
    name: String,
}

/// reqwest-backed [`GitHubApi`].
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    raw_url: String,
    token: Option<String>,
    token_env: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            raw_url: config.raw_url.trim_end_matches('/').to_string(),
            token: config.token(),
            token_env: config.token_env.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("codevo/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Map a non-success response to a [`GitHubError`].
    async fn check(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN
                && response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .map(|v| v == "0")
                    .unwrap_or(false));

        if rate_limited {
            return Err(GitHubError::RateLimited);
        }
        match status {
            StatusCode::UNAUTHORIZED => Err(GitHubError::Unauthorized(self.token_env.clone())),
            StatusCode::NOT_FOUND => Err(GitHubError::NotFound(what.to_string())),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(GitHubError::Http { status, message })
            }
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn validate_token(&self) -> Result<(), GitHubError> {
        if self.token.is_none() {
            tracing::warn!(
                token_env = %self.token_env,
                "no GitHub token set; using unauthenticated requests (low rate limit)"
            );
            return Ok(());
        }

        let response = self.get(&format!("{}/user", self.api_url)).send().await?;
        self.check(response, "user").await?;
        tracing::debug!("GitHub token accepted");
        Ok(())
    }

    async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<String>, GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/branches?per_page=100",
            self.api_url, repo.owner, repo.repo
        );
        let response = self.get(&url).send().await?;
        let response = self.check(response, &repo.to_string()).await?;
        let branches: Vec<BranchItem> = response.json().await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_tree(&self, repo: &RepoRef, branch: &str) -> Result<Vec<TreeEntry>, GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_url, repo.owner, repo.repo, branch
        );
        let response = self.get(&url).send().await?;
        let response = self.check(response, &format!("{}@{}", repo, branch)).await?;
        let tree: TreeResponse = response.json().await?;

        if tree.truncated {
            tracing::warn!(repo = %repo, branch, "GitHub truncated the tree listing; some files are missing");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| TreeEntry {
                path: item.path,
                size: item.size,
            })
            .collect())
    }

    async fn fetch_file(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Result<Vec<u8>, GitHubError> {
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_url, repo.owner, repo.repo, branch, path
        );
        let response = self.get(&url).send().await?;
        let response = self.check(response, path).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Load the filtered text files of `repo` at `branch`.
///
/// # Errors
///
/// Token, tree listing and not-found failures are returned. Per-file
/// fetch or decode failures are logged and the file is skipped.
pub async fn load_repository(
    api: &dyn GitHubApi,
    repo: &RepoRef,
    branch: &str,
    filter: &FileFilter,
) -> Result<SourceSet, GitHubError> {
    api.validate_token().await?;

    let entries = api.list_tree(repo, branch).await?;
    let total = entries.len();
    let mut files = Vec::new();

    for entry in entries {
        if !filter.accepts(&entry.path, entry.size) {
            continue;
        }

        let bytes = match api.fetch_file(repo, branch, &entry.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %entry.path, error = %e, "skipping file: fetch failed");
                continue;
            }
        };

        if bytes.len() as u64 > filter.max_file_size() {
            tracing::debug!(path = %entry.path, size = bytes.len(), "skipping file: over size cap");
            continue;
        }

        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(path = %entry.path, "skipping file: not valid UTF-8");
                continue;
            }
        };

        let mut file = SourceFile::new(entry.path.clone(), content);
        file.url = Some(repo.blob_url(branch, &entry.path));
        files.push(file);
    }

    tracing::info!(
        repo = %repo,
        branch,
        tree_entries = total,
        loaded = files.len(),
        "loaded repository"
    );

    Ok(SourceSet::new(format!("{}@{}", repo, branch), files))
}
