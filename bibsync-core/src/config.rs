//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::bibliography::ParseMode;
use crate::report::default_report_path;
use crate::vcs::Credentials;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct matching the bibsync.yml schema
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// URL returning the current bibliography export
    #[serde(default)]
    pub api_endpoint: Option<String>,

    /// Working copy of the document repository
    #[serde(default)]
    pub repo_path: Option<PathBuf>,

    /// Export file name, relative to `repo_path`
    #[serde(default)]
    pub export_filename: Option<String>,

    #[serde(default)]
    pub credential_username: Option<String>,

    #[serde(default, skip_serializing)]
    pub credential_password: Option<String>,

    #[serde(default)]
    pub parse_mode: ParseMode,

    #[serde(default = "default_push_attempts")]
    pub max_push_attempts: u32,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Commit removal-only deltas too
    #[serde(default)]
    pub publish_removals: bool,

    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,

    #[serde(default = "default_extensions")]
    pub source_extensions: Vec<String>,

    #[serde(default)]
    pub report_path: Option<PathBuf>,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_push_attempts() -> u32 {
    3
}

fn default_remote() -> String {
    String::from("origin")
}

fn default_extensions() -> Vec<String> {
    vec![String::from("tex")]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            repo_path: None,
            export_filename: None,
            credential_username: None,
            credential_password: None,
            parse_mode: ParseMode::default(),
            max_push_attempts: default_push_attempts(),
            remote: default_remote(),
            publish_removals: false,
            fetch_timeout_secs: None,
            source_extensions: default_extensions(),
            report_path: None,
            config_path: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_endpoint", &self.api_endpoint.as_ref().map(|_| "<set>"))
            .field("repo_path", &self.repo_path)
            .field("export_filename", &self.export_filename)
            .field("credential_username", &self.credential_username)
            .field(
                "credential_password",
                &self.credential_password.as_ref().map(|_| "<redacted>"),
            )
            .field("parse_mode", &self.parse_mode)
            .field("max_push_attempts", &self.max_push_attempts)
            .field("remote", &self.remote)
            .field("publish_removals", &self.publish_removals)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("source_extensions", &self.source_extensions)
            .field("report_path", &self.report_path)
            .finish()
    }
}

/// Values supplied on the command line or through the environment; each
/// one that is set replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_endpoint: Option<String>,
    pub repo_path: Option<PathBuf>,
    pub export_filename: Option<String>,
    pub credential_username: Option<String>,
    pub credential_password: Option<String>,
    pub parse_mode: Option<ParseMode>,
    pub max_push_attempts: Option<u32>,
    pub publish_removals: Option<bool>,
    pub report_path: Option<PathBuf>,
}

/// Validated settings for one publish cycle.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub api_endpoint: String,
    pub repo_path: PathBuf,
    pub export_filename: String,
    pub credentials: Option<Credentials>,
    pub parse_mode: ParseMode,
    pub max_push_attempts: u32,
    pub remote: String,
    pub publish_removals: bool,
    pub fetch_timeout: Option<Duration>,
}

impl SyncSettings {
    /// The export file inside the repository.
    pub fn export_path(&self) -> PathBuf {
        self.repo_path.join(&self.export_filename)
    }

    /// Where the previous export is kept while diffing.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.export_path().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());
        let repo_path = config.repo_path.take().map(|p| config.resolve_path(&p));
        let report_path = config.report_path.take().map(|p| config.resolve_path(&p));
        config.repo_path = repo_path;
        config.report_path = report_path;

        Ok(config)
    }

    /// Replace file values with every override that is set.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(v) = overrides.api_endpoint {
            self.api_endpoint = Some(v);
        }
        if let Some(v) = overrides.repo_path {
            self.repo_path = Some(v);
        }
        if let Some(v) = overrides.export_filename {
            self.export_filename = Some(v);
        }
        if let Some(v) = overrides.credential_username {
            self.credential_username = Some(v);
        }
        if let Some(v) = overrides.credential_password {
            self.credential_password = Some(v);
        }
        if let Some(v) = overrides.parse_mode {
            self.parse_mode = v;
        }
        if let Some(v) = overrides.max_push_attempts {
            self.max_push_attempts = v;
        }
        if let Some(v) = overrides.publish_removals {
            self.publish_removals = v;
        }
        if let Some(v) = overrides.report_path {
            self.report_path = Some(v);
        }
    }

    /// Health report location (defaults to `temp/bib_health_report.json`)
    pub fn report_path(&self) -> PathBuf {
        self.report_path.clone().unwrap_or_else(default_report_path)
    }

    /// Validate and extract what a publish cycle needs.
    pub fn sync_settings(&self) -> Result<SyncSettings, ConfigError> {
        let api_endpoint = non_empty(&self.api_endpoint)
            .ok_or_else(|| ConfigError::MissingField("api_endpoint".into()))?;
        let repo_path = self
            .repo_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ConfigError::MissingField("repo_path".into()))?;
        let export_filename = non_empty(&self.export_filename)
            .ok_or_else(|| ConfigError::MissingField("export_filename".into()))?;

        if Path::new(&export_filename).is_absolute() {
            return Err(ConfigError::Invalid(
                "export_filename must be relative to repo_path".into(),
            ));
        }
        if self.max_push_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_push_attempts must be at least 1".into(),
            ));
        }

        let credentials = match (
            non_empty(&self.credential_username),
            non_empty(&self.credential_password),
        ) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "credential_username and credential_password must be set together".into(),
                ))
            }
        };

        Ok(SyncSettings {
            api_endpoint,
            repo_path,
            export_filename,
            credentials,
            parse_mode: self.parse_mode,
            max_push_attempts: self.max_push_attempts,
            remote: self.remote.clone(),
            publish_removals: self.publish_removals,
            fetch_timeout: self.fetch_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(parent) = self.config_path.as_deref().and_then(Path::parent) {
            parent.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
