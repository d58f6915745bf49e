//! Configuration loading for the notification engine
//!
//! Everything lives in the Lantern config directory:
//! - `settings.json`: polling settings (all fields optional)
//! - `github-token.json`: personal access token, unless set in the environment
//! - `scopes.json`: user-defined scopes

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::github::{DEFAULT_MAX_PAGES, FetchOptions, GitHubClient};
use crate::models::{DEFAULT_POLL_INTERVAL_SECS, Scope};
use crate::sync::CredentialProvider;

const SETTINGS_FILE: &str = "settings.json";
const TOKEN_FILE: &str = "github-token.json";
const SCOPES_FILE: &str = "scopes.json";
const DATABASE_FILE: &str = "inbox.sqlite";

/// Environment variables checked for a token, in order
const TOKEN_ENV_VARS: [&str; 2] = ["LANTERN_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local account identifier the cache and cursor are keyed by
    pub account_id: String,
    pub api_base_url: String,
    /// Poll interval until GitHub advises one
    pub default_poll_interval_secs: u64,
    pub include_read: bool,
    pub participating_only: bool,
    pub max_pages: usize,
    pub request_timeout_secs: u64,
    /// Database location; defaults to the data directory
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_id: "default".to_string(),
            api_base_url: GitHubClient::BASE_URL.to_string(),
            default_poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            include_read: false,
            participating_only: false,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout_secs: 30,
            database_path: None,
        }
    }
}

impl Settings {
    /// Load `settings.json`, falling back to defaults when it does not exist
    pub fn load() -> Result<Self> {
        config::load_json_or_default(SETTINGS_FILE)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    pub fn save(&self) -> Result<()> {
        config::save_json(SETTINGS_FILE, self)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            include_read: self.include_read,
            participating_only: self.participating_only,
        }
    }

    /// Where the notification cache lives
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => config::data_path(DATABASE_FILE).context("Could not determine data directory"),
        }
    }
}

/// GitHub personal access token
#[derive(Clone)]
pub struct GitHubCredentials {
    pub token: String,
}

// Never print the token
impl std::fmt::Debug for GitHubCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// `github-token.json` format
#[derive(Deserialize)]
struct TokenFile {
    token: String,
}

impl GitHubCredentials {
    /// Load the token using the following priority:
    /// 1. `LANTERN_GITHUB_TOKEN`, then `GITHUB_TOKEN`
    /// 2. JSON file (~/.config/lantern/github-token.json)
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_env() {
            return Ok(creds);
        }

        if config::config_exists(TOKEN_FILE) {
            let file: TokenFile = config::load_json(TOKEN_FILE)?;
            return Self::from_token_file(file);
        }

        bail!(
            "No GitHub token: set {} or create {}",
            TOKEN_ENV_VARS.join(" / "),
            Self::default_token_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| TOKEN_FILE.to_string())
        )
    }

    /// Read the token from the environment
    pub fn from_env() -> Option<Self> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|token| token.trim().to_string())
            .find(|token| !token.is_empty())
            .map(|token| Self { token })
    }

    /// Load the token from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: TokenFile = config::load_json_file(path)?;
        Self::from_token_file(file)
    }

    /// Parse the token from JSON (`{"token": "..."}`)
    pub fn from_json(json: &str) -> Result<Self> {
        let file: TokenFile = serde_json::from_str(json).context("Failed to parse token JSON")?;
        Self::from_token_file(file)
    }

    fn from_token_file(file: TokenFile) -> Result<Self> {
        let token = file.token.trim();
        if token.is_empty() {
            bail!("Token file contains an empty token");
        }
        Ok(Self {
            token: token.to_string(),
        })
    }

    /// Get the default token file path (~/.config/lantern/github-token.json)
    pub fn default_token_path() -> Option<PathBuf> {
        config::config_path(TOKEN_FILE)
    }

    /// Check if a token is available (env vars or file)
    pub fn is_available() -> bool {
        Self::from_env().is_some() || config::config_exists(TOKEN_FILE)
    }
}

impl CredentialProvider for GitHubCredentials {
    fn access_token(&self, _account_id: &str) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Load `scopes.json`; no file means no scopes
pub fn load_scopes() -> Result<Vec<Scope>> {
    config::load_json_or_default(SCOPES_FILE)
}

/// Load scopes from a specific JSON file
pub fn load_scopes_file(path: &Path) -> Result<Vec<Scope>> {
    config::load_json_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings: Settings =
            serde_json::from_str(r#"{ "account_id": "octocat", "include_read": true }"#).unwrap();
        assert_eq!(settings.account_id, "octocat");
        assert!(settings.include_read);
        assert_eq!(settings.api_base_url, "https://api.github.com");
        assert_eq!(settings.default_poll_interval_secs, 60);
        assert_eq!(settings.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(
            settings.fetch_options(),
            FetchOptions {
                include_read: true,
                participating_only: false
            }
        );
    }

    #[test]
    fn test_explicit_database_path() {
        let settings = Settings {
            database_path: Some(PathBuf::from("/tmp/inbox.sqlite")),
            ..Settings::default()
        };
        assert_eq!(settings.database_path().unwrap(), PathBuf::from("/tmp/inbox.sqlite"));
    }

    #[test]
    fn test_parse_token_json() {
        let creds = GitHubCredentials::from_json(r#"{ "token": " ghp_abc \n" }"#).unwrap();
        assert_eq!(creds.token, "ghp_abc");
        assert_eq!(creds.access_token("any").as_deref(), Some("ghp_abc"));
        assert!(!format!("{:?}", creds).contains("ghp_abc"));
    }

    #[test]
    fn test_invalid_token_json() {
        assert!(GitHubCredentials::from_json(r#"{ "other": 1 }"#).is_err());
        assert!(GitHubCredentials::from_json(r#"{ "token": "  " }"#).is_err());
    }

    #[test]
    fn test_scopes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.json");
        std::fs::write(
            &path,
            r#"[{ "name": "All", "is_default": true }, { "name": "Work", "rules": [{ "organization_pattern": "myorg" }] }]"#,
        )
        .unwrap();

        let scopes = load_scopes_file(&path).unwrap();
        assert_eq!(scopes.len(), 2);
        assert!(scopes[0].is_default);
        assert_eq!(scopes[1].rules[0].organization_pattern.as_deref(), Some("myorg"));
    }
}
