//! Configuration for tally, read from `~/.tally/config.toml`.
//!
//! Every section and key is optional. [`TallyConfig::resolve`] fills the gaps
//! with defaults and produces the [`Settings`] the binary runs with. String
//! values may reference environment variables as `${VAR}`.
//!
//! ```toml
//! [api]
//! base_url = "https://api.mangacollec.com"
//! timeout_secs = 30
//!
//! [credentials]
//! token_file = "${HOME}/.tally/token.json"
//! poll_interval_ms = 2000
//! wait_timeout_secs = 300
//!
//! [cache]
//! file = "${HOME}/.tally/offers.json"
//!
//! [run]
//! on_item_error = "skip"
//! ```

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tally_engine::ItemErrorPolicy;
use tally_providers::DEFAULT_API_BASE_URL;
use tally_providers::token::DEFAULT_POLL_INTERVAL;
use thiserror::Error;
use url::Url;

const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    pub api: Option<ApiConfig>,
    pub credentials: Option<CredentialsConfig>,
    pub cache: Option<CacheConfig>,
    pub run: Option<RunConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    /// Whole-request timeout. Unset means requests may take as long as they take.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// JSON file holding `{"access_token": ..., "token_type": ...}`.
    pub token_file: Option<String>,
    pub poll_interval_ms: Option<u64>,
    /// Give up waiting for a token after this long. Unset waits forever.
    pub wait_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Persist offers to disk. When false, offers are only cached for the current run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub file: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub on_item_error: Option<ItemErrorPolicy>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {error}", .path.display())]
    Read { path: PathBuf, error: io::Error },
    #[error("failed to parse config at {}: {error}", .path.display())]
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("no home directory; set {key} explicitly")]
    NoHomeDir { key: &'static str },
}

/// Command-line values that take precedence over the config file.
///
/// Applied before any home-relative default is computed, so explicit paths work
/// without a home directory.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token_file: Option<PathBuf>,
    pub wait_timeout_secs: Option<u64>,
    pub cache_file: Option<PathBuf>,
    pub no_cache: bool,
    pub on_item_error: Option<ItemErrorPolicy>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: Url,
    pub http_timeout: Option<Duration>,
    /// `None` when neither a path nor a home directory is available.
    pub token_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub wait_timeout: Option<Duration>,
    /// `None` keeps the offer cache in memory only.
    pub cache_file: Option<PathBuf>,
    pub on_item_error: ItemErrorPolicy,
}

impl Settings {
    /// The token file, required once no token was supplied directly.
    pub fn require_token_file(&self) -> Result<&Path, ConfigError> {
        self.token_file.as_deref().ok_or(ConfigError::NoHomeDir {
            key: "credentials.token_file",
        })
    }
}

impl TallyConfig {
    /// Load the config from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|error| {
            tracing::warn!("Failed to read config at {}: {error}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                error,
            }
        })?;

        toml::from_str(&content).map_err(|error| {
            tracing::warn!("Failed to parse config at {}: {error}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            }
        })
    }

    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings, ConfigError> {
        self.resolve_with_home(overrides, tally_dir().as_deref())
    }

    fn resolve_with_home(
        &self,
        overrides: &Overrides,
        tally_dir: Option<&Path>,
    ) -> Result<Settings, ConfigError> {
        let api = self.api.as_ref();
        let credentials = self.credentials.as_ref();
        let default_cache = CacheConfig::default();
        let cache = self.cache.as_ref().unwrap_or(&default_cache);

        let raw_base_url = match &overrides.base_url {
            Some(raw) => raw.clone(),
            None => api
                .and_then(|api| api.base_url.as_deref())
                .map_or_else(|| DEFAULT_API_BASE_URL.to_string(), expand_env_vars),
        };
        let base_url = parse_base_url(&raw_base_url)?;

        let http_timeout = api
            .and_then(|api| api.timeout_secs)
            .map(|secs| positive_secs("api.timeout_secs", secs))
            .transpose()?;

        let token_file = match (
            &overrides.token_file,
            credentials.and_then(|c| c.token_file.as_deref()),
        ) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(raw)) => Some(PathBuf::from(expand_env_vars(raw))),
            (None, None) => tally_dir.map(|dir| dir.join("token.json")),
        };

        let poll_interval = match credentials.and_then(|c| c.poll_interval_ms) {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    key: "credentials.poll_interval_ms",
                    reason: "must be greater than zero".to_string(),
                });
            }
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };

        let wait_timeout = match overrides.wait_timeout_secs {
            Some(secs) => Some(positive_secs("--wait-timeout", secs)?),
            None => credentials
                .and_then(|c| c.wait_timeout_secs)
                .map(|secs| positive_secs("credentials.wait_timeout_secs", secs))
                .transpose()?,
        };

        let cache_file = if overrides.no_cache {
            None
        } else if let Some(path) = &overrides.cache_file {
            Some(path.clone())
        } else if cache.enabled {
            match cache.file.as_deref() {
                Some(raw) => Some(PathBuf::from(expand_env_vars(raw))),
                None => Some(
                    tally_dir
                        .map(|dir| dir.join("offers.json"))
                        .ok_or(ConfigError::NoHomeDir { key: "cache.file" })?,
                ),
            }
        } else {
            None
        };

        Ok(Settings {
            base_url,
            http_timeout,
            token_file,
            poll_interval,
            wait_timeout,
            cache_file,
            on_item_error: overrides
                .on_item_error
                .or_else(|| self.run.as_ref().and_then(|run| run.on_item_error))
                .unwrap_or_default(),
        })
    }
}

/// Parse an API base URL, insisting on an absolute http(s) URL.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key: "api.base_url",
        reason: format!("{raw:?}: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            key: "api.base_url",
            reason: format!("{raw:?} is not an http(s) URL"),
        });
    }
    Ok(url)
}

/// A non-zero number of seconds; zero is rejected for `key`.
pub fn positive_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Replace each `${VAR}` with the variable's value (empty when unset).
///
/// An unclosed `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// `~/.tally`, where the config, token and offer cache live by default.
#[must_use]
pub fn tally_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tally"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    tally_dir().map(|dir| dir.join("config.toml"))
}
