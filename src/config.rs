//! Configuration
//!
//! Settings are merged in this order (later sources override earlier):
//! 1. Built-in defaults
//! 2. TOML file: `$CONTENT_SYNC_CONFIG`, else `content-sync.toml` in the
//!    working directory if it exists
//! 3. Environment variables prefixed `CONTENT_SYNC_`, with `__` between
//!    nested keys (e.g. `CONTENT_SYNC_STORE__PROJECT_ID`)

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{FileStorage, StorageError};
use crate::store::client::DEFAULT_BASE_URL;
use crate::store::{FirestoreClient, StoreError};
use crate::sync::SyncSettings;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CONTENT_SYNC_";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_VAR: &str = "CONTENT_SYNC_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILENAME: &str = "content-sync.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub cache: CacheSettings,
}

/// Document store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Project holding the database
    pub project_id: String,
    /// Web API key, if the database requires one
    pub api_key: Option<String>,
    /// REST API root; point at an emulator for local work
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Local cache behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Explicit storage directory; defaults to the user cache dir
    pub dir: Option<PathBuf>,
    /// Subdirectory of the user cache dir when `dir` is unset
    pub namespace: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            fetch_timeout_secs: 10,
            dir: None,
            namespace: "default".to_string(),
        }
    }
}

impl Settings {
    /// Load from defaults, the config file and the environment
    pub fn load() -> Result<Self, figment::Error> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILENAME);
                default.exists().then_some(default)
            });
        Self::figment(path).extract()
    }

    /// The layered provider chain, for callers that add their own layers
    pub fn figment(config_path: Option<PathBuf>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = config_path {
            tracing::debug!(path = %path.display(), "Loading config file");
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
    }

    /// Synchronizer timing derived from the cache section
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            fetch_timeout: Duration::from_secs(self.cache.fetch_timeout_secs),
        }
    }

    /// Client for the configured document store
    pub fn store_client(&self) -> Result<FirestoreClient, StoreError> {
        if self.store.project_id.is_empty() {
            return Err(StoreError::Request(
                "store.project_id is not configured".to_string(),
            ));
        }
        FirestoreClient::with_base_url(
            &self.store.base_url,
            &self.store.project_id,
            self.store.api_key.clone(),
            Duration::from_secs(self.store.request_timeout_secs),
        )
    }

    /// Disk storage for cache entries
    pub fn storage(&self) -> Result<FileStorage, StorageError> {
        match &self.cache.dir {
            Some(dir) => FileStorage::with_dir(dir.clone()),
            None => FileStorage::new(&self.cache.namespace),
        }
    }
}
