//! Configuration loading and resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`GALSYNC_CONFIG`)
//! 3. Per-user config file (`<config_dir>/galsync/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing or malformed config file never aborts startup; it logs a
//! warning and the compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "GALSYNC_CONFIG";

/// Environment variable overriding the OAuth client secret
pub const CLIENT_SECRET_ENV_VAR: &str = "GALSYNC_CLIENT_SECRET";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub matching: MatchingConfig,
    pub files: FilesConfig,
    pub columns: ColumnsConfig,
    pub align: AlignConfig,
}

/// Target catalog API access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the catalog (token, search and archive endpoints hang off it)
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.ymgal.games".to_string(),
            client_id: "ymgal".to_string(),
            client_secret: "luna0327".to_string(),
            scope: "public".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Matching loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Candidates kept per search when no candidate clears the threshold
    pub top_k: usize,
    /// Score at which the top candidate is treated as certain
    pub threshold: f64,
    /// Pause after every processed source record
    pub request_delay_ms: u64,
    /// Total search attempts per call, counting the first (401 refresh cycle)
    pub auth_attempts: u32,
    /// Organization lookups allowed per id while its record stays incomplete
    pub org_retry_limit: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            threshold: 0.8,
            request_delay_ms: 50,
            auth_attempts: 4,
            org_retry_limit: 3,
        }
    }
}

/// Input and output tables of the matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub source: PathBuf,
    pub matched: PathBuf,
    pub unmatched: PathBuf,
    pub organizations: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("bgm_archive.csv"),
            matched: PathBuf::from("ymgames_matched.csv"),
            unmatched: PathBuf::from("ymgames_unmatched.csv"),
            organizations: PathBuf::from("organizations_info.csv"),
        }
    }
}

/// Column names read from the source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    /// Optional id column; rows without it get `ROW_<index>`
    pub id: String,
    /// First name variant (searched first, wins ties)
    pub name_a: String,
    /// Second name variant
    pub name_b: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            name_a: "日文名".to_string(),
            name_b: "中文名".to_string(),
        }
    }
}

/// Secondary alignment job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Matched table produced by the matching run
    pub matched: PathBuf,
    /// Third catalog table to align against
    pub catalog: PathBuf,
    pub output: PathBuf,
    pub threshold: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            matched: PathBuf::from("ymgames_matched.csv"),
            catalog: PathBuf::from("processed_games.csv"),
            output: PathBuf::from("ym_bangumi_matched.csv"),
            threshold: 0.8,
        }
    }
}

impl AppConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Resolve and load configuration, falling back to defaults
    ///
    /// The client secret is finally overridden by `GALSYNC_CLIENT_SECRET`
    /// when that variable is set and non-blank.
    pub fn load(cli_path: Option<&Path>) -> Self {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) => match Self::from_file(&path) {
                Ok(config) => {
                    info!("Configuration loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{}; using compiled defaults", e);
                    Self::default()
                }
            },
            None => {
                info!("No config file found; using compiled defaults");
                Self::default()
            }
        };

        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV_VAR) {
            if !secret.trim().is_empty() {
                info!("Client secret loaded from environment variable");
                config.api.client_secret = secret;
            }
        }

        config
    }

    /// Serialize to TOML (used to print an annotated starting config)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Locate the config file to read, if any
///
/// An explicit CLI or environment path is returned even when it does not
/// exist so the caller reports the problem instead of silently ignoring it.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|p| p.exists())
}

/// `<config_dir>/galsync/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("galsync").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_catalog_contract() {
        let config = AppConfig::default();
        assert_eq!(config.matching.top_k, 3);
        assert_eq!(config.matching.threshold, 0.8);
        assert_eq!(config.matching.auth_attempts, 4);
        assert_eq!(config.matching.org_retry_limit, 3);
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.columns.name_a, "日文名");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [matching]
            request_delay_ms = 0

            [files]
            source = "games.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.matching.request_delay_ms, 0);
        assert_eq!(config.matching.top_k, 3);
        assert_eq!(config.files.source, PathBuf::from("games.csv"));
        assert_eq!(config.files.matched, PathBuf::from("ymgames_matched.csv"));
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_cli_path_wins() {
        let path = Path::new("/tmp/explicit-galsync.toml");
        assert_eq!(resolve_config_path(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = AppConfig::default().to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }
}
