use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_ONEAPI_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 100;
pub const DEFAULT_ONEAPI_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

pub const BASE_URL_ENV: &str = "CHATFRONT_BASE_URL";
pub const ONEAPI_URL_ENV: &str = "CHATFRONT_ONEAPI_URL";

/// Settings read from `config.toml`. Every field is optional; the accessors
/// fill in defaults.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Primary chat backend, e.g. "http://localhost:8080"
    pub base_url: Option<String>,
    /// OneAPI token service
    pub oneapi_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub oneapi_timeout_secs: Option<u64>,
    /// How often `watch` refreshes the token list
    pub refresh_interval_secs: Option<u64>,
    /// Where session and token snapshots are kept
    pub storage_dir: Option<PathBuf>,
}

impl Config {
    pub fn base_url(&self) -> String {
        env_override(BASE_URL_ENV)
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn oneapi_base_url(&self) -> String {
        env_override(ONEAPI_URL_ENV)
            .or_else(|| self.oneapi_base_url.clone())
            .unwrap_or_else(|| DEFAULT_ONEAPI_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn oneapi_timeout(&self) -> Duration {
        Duration::from_secs(self.oneapi_timeout_secs.unwrap_or(DEFAULT_ONEAPI_TIMEOUT_SECS))
    }

    /// Zero is treated as unset.
    pub fn refresh_interval(&self) -> Duration {
        let secs = self
            .refresh_interval_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .or_else(default_storage_dir)
            .unwrap_or_else(|| PathBuf::from(".chatfront"))
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "chatfront", "chatfront")
}

fn default_storage_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
