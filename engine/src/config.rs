//! Configuration for an [`Odm`](crate::Odm) session.

use std::env;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Remote path every collection lives under (`None` for the store root)
    pub root: Option<String>,
    /// Whether `Model::cache_default` keeps the cache live
    pub cache_listen: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            cache_listen: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place every collection under `root`.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        let root = root.into();
        self.root = (!crate::path::slashed(&root).is_empty()).then_some(root);
        self
    }

    pub fn with_cache_listen(mut self, listen: bool) -> Self {
        self.cache_listen = listen;
        self
    }

    /// Load configuration from environment variables (and `.env`, if present).
    ///
    /// - `FIRESYNC_ROOT`: remote root path, unset or empty for the store root
    /// - `FIRESYNC_CACHE_LISTEN`: `true`/`false`/`1`/`0`, defaults to `true`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(root) = env::var("FIRESYNC_ROOT") {
            config = config.with_root(root);
        }

        if let Ok(value) = env::var("FIRESYNC_CACHE_LISTEN") {
            config.cache_listen = parse_bool(&value)
                .ok_or_else(|| ConfigError::InvalidCacheListen(value.clone()))?;
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid FIRESYNC_CACHE_LISTEN value: {0:?}")]
    InvalidCacheListen(String),
}
