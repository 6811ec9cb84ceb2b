use crate::archive::ArchiveReport;
use crate::config::RemoteConfig;
use crate::error::{AppError, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use std::fmt;

/// A repository archive to fetch: owner, repository name and branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoRef {
    /// Parses `https://<host>/<owner>/<repo>` (optionally `/tree/<branch>`).
    ///
    /// A trailing `/` or `.git` is tolerated. Without a `tree` segment the
    /// branch is `default_branch`.
    pub fn parse_url(url: &str, default_branch: &str) -> Result<Self> {
        let trimmed = url.trim();
        let without_scheme = trimmed
            .split_once("://")
            .map_or(trimmed, |(_, rest)| rest);
        let segments: Vec<&str> = without_scheme
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let (owner, repo) = match segments.as_slice() {
            [_host, owner, repo, ..] => (*owner, repo.trim_end_matches(".git")),
            _ => {
                return Err(AppError::InvalidArgument(format!(
                    "Expected a repository URL like https://github.com/<owner>/<repo>, got '{}'",
                    url
                )));
            }
        };
        if repo.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "Repository name missing in '{}'",
                url
            )));
        }

        let branch = match segments.get(3..) {
            Some(["tree", branch @ ..]) if !branch.is_empty() => branch.join("/"),
            _ => default_branch.to_string(),
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch,
        })
    }

    pub fn zipball_path(&self) -> String {
        format!(
            "/repos/{}/{}/zipball/{}",
            self.owner, self.repo, self.branch
        )
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

/// Blocking client for repository zipballs.
pub struct ArchiveFetcher {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl ArchiveFetcher {
    pub fn new(remote: &RemoteConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder().user_agent(&remote.user_agent).build()?;
        Ok(Self::with_client(client, &remote.api_base, token))
    }

    /// Builds a fetcher whose token comes from `remote.token_env`.
    pub fn from_config(remote: &RemoteConfig) -> Result<Self> {
        let token = remote.resolve_token();
        if token.is_none() {
            log::debug!(
                "No token found in ${}; fetching unauthenticated.",
                remote.token_env
            );
        }
        Self::new(remote, token)
    }

    pub fn with_client(client: Client, api_base: &str, token: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn zipball_url(&self, repo: &RepoRef) -> String {
        format!("{}{}", self.api_base, repo.zipball_path())
    }

    /// Downloads the archive; any status other than 200 is a [`AppError::Fetch`].
    pub fn fetch(&self, repo: &RepoRef) -> Result<Vec<u8>> {
        let url = self.zipball_url(repo);
        log::info!("Fetching repository archive: {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }
        let response = request.send()?;

        let status = response.status();
        if status != StatusCode::OK {
            log::error!("Fetch of {} failed with HTTP {}", repo, status);
            return Err(AppError::Fetch {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes()?;
        log::info!("Downloaded {} bytes for {}", bytes.len(), repo);
        Ok(bytes.to_vec())
    }

    pub fn fetch_report(&self, repo: &RepoRef, extensions: &[&str]) -> Result<ArchiveReport> {
        let bytes = self.fetch(repo)?;
        ArchiveReport::from_bytes(&bytes, extensions)
    }
}
