use crate::error::{AppError, Result};
use crate::fetch::RepoRef;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILENAME: &str = "ctxpack.toml";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_USER_AGENT: &str = concat!("ctxpack/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_INDENT: usize = crate::document::DEFAULT_INDENT;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default)]
    pub project_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_indent")]
    pub indent: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}
fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_indent() -> usize {
    DEFAULT_INDENT
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            default_branch: default_branch(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
        }
    }
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
        }
    }
}

impl RemoteConfig {
    /// Reads the access token from the configured environment variable.
    pub fn resolve_token(&self) -> Option<String> {
        env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

impl RepositoryConfig {
    pub fn to_repo_ref(&self, default_branch: &str) -> RepoRef {
        RepoRef {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: self
                .branch
                .clone()
                .unwrap_or_else(|| default_branch.to_string()),
        }
    }
}

impl Config {
    pub fn resolve_config_path(
        base_dir: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        match cli_config_file {
            Some(p_str) => {
                let path = PathBuf::from(shellexpand::tilde(p_str).as_ref());
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Specified config file not found at path: {}",
                        path.display()
                    )));
                }
                log::debug!("Using specified config file path: {}", path.display());
                Ok(Some(path))
            }
            None => {
                let default_path = base_dir.join(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    log::debug!("Using default config file path: {}", default_path.display());
                    Ok(Some(default_path))
                } else {
                    log::debug!(
                        "No config file specified and default not found at: {}",
                        default_path.display()
                    );
                    Ok(None)
                }
            }
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content =
            fs::read_to_string(config_path).map_err(|e| AppError::FilesystemAccess {
                path: config_path.to_path_buf(),
                source: e,
            })?;
        Self::from_toml_str(&toml_content).map_err(|e| {
            AppError::TomlParse(format!(
                "Error parsing config file '{}': {}. Check TOML syntax and structure.",
                config_path.display(),
                e
            ))
        })
    }

    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_content).map_err(|e| AppError::TomlParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves and loads the config file, falling back to defaults when none exists.
    pub fn load(
        base_dir: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Self> {
        match Self::resolve_config_path(base_dir, cli_config_file, cli_disable_config)? {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.remote.api_base.trim().is_empty() {
            return Err(AppError::Config("remote.api_base must not be empty".into()));
        }
        if self.remote.default_branch.trim().is_empty() {
            return Err(AppError::Config(
                "remote.default_branch must not be empty".into(),
            ));
        }
        for repo in &self.repositories {
            if repo.owner.trim().is_empty() || repo.repo.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "repository entry '{}/{}' needs both owner and repo",
                    repo.owner, repo.repo
                )));
            }
        }
        Ok(())
    }

    pub fn batch_repositories(&self) -> Vec<RepoRef> {
        self.repositories
            .iter()
            .map(|r| r.to_repo_ref(&self.remote.default_branch))
            .collect()
    }
}
