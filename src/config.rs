//! Client configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! environment variables, then CLI flags (applied by the caller through
//! [`Overrides`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ChatError;
use crate::typing::DEFAULT_SPEED_MS;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const ENV_API_URL: &str = "JBC_API_URL";
pub const ENV_TYPING_SPEED: &str = "JBC_TYPING_SPEED_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the chat backend, without a trailing slash.
    pub api_url: String,
    pub typing_speed_ms: u64,
    pub connect_timeout: Duration,
    /// Covers the whole `/api/chat` round trip, which waits on the model.
    pub request_timeout: Duration,
    pub token_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            typing_speed_ms: DEFAULT_SPEED_MS,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            token_path: crate::session::FileTokenStore::default_path(),
        }
    }
}

/// On-disk shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_url: Option<String>,
    typing_speed_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    token_path: Option<PathBuf>,
}

/// Values supplied on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub typing_speed_ms: Option<u64>,
}

impl Config {
    /// `<config dir>/jbc-chat/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("jbc-chat").join("config.toml"))
    }

    /// Build the effective config.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<Self, ChatError> {
        let mut cfg = Config::default();

        match explicit {
            Some(path) => cfg.apply_file(path)?,
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.exists()) {
                    cfg.apply_file(&path)?;
                }
            }
        }

        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        debug!(api_url = %cfg.api_url, speed_ms = cfg.typing_speed_ms, "config loaded");
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ChatError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("{}: {e}", path.display())))?;
        self.apply_toml(&raw)
    }

    pub fn apply_toml(&mut self, raw: &str) -> Result<(), ChatError> {
        let file: ConfigFile = toml::from_str(raw)?;
        if let Some(url) = file.api_url {
            self.api_url = url;
        }
        if let Some(speed) = file.typing_speed_ms {
            self.typing_speed_ms = speed;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = file.token_path {
            self.token_path = path;
        }
        Ok(())
    }

    /// Apply environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ChatError> {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.is_empty()) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_TYPING_SPEED) {
            self.typing_speed_ms = raw.trim().parse().map_err(|_| {
                ChatError::Config(format!("{ENV_TYPING_SPEED}={raw:?} is not a number"))
            })?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, o: &Overrides) {
        if let Some(url) = &o.api_url {
            self.api_url = url.clone();
        }
        if let Some(speed) = o.typing_speed_ms {
            self.typing_speed_ms = speed;
        }
    }

    pub fn validate(&mut self) -> Result<(), ChatError> {
        let trimmed = self.api_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "api_url must start with http:// or https://, got {:?}",
                self.api_url
            )));
        }
        self.api_url = trimmed.to_string();
        if self.typing_speed_ms == 0 {
            return Err(ChatError::InvalidArgument(
                "typing_speed_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
