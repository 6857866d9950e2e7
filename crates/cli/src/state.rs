use std::str::FromStr;
use std::{fs, path::PathBuf};

use common::bucket::{BucketConfig, ConfigError};
use common::crypto::{KeyError, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

pub const APP_NAME: &str = "bucket-ledger";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tunables for buckets created by this operator
    #[serde(default)]
    pub bucket: BucketConfig,
    /// Per-action limit granted to accounts the ledger has not seen yet
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    /// Default tracing level; `RUST_LOG` still takes precedence
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_limit() -> u64 {
    common::access::DEFAULT_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bucket: BucketConfig::default(),
            default_limit: default_limit(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), StateError> {
        self.bucket.validate()?;
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, StateError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.bucket-ledger)
    pub state_dir: PathBuf,
    /// Path to the operator key PEM file
    pub key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.bucket-ledger)
    pub fn state_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory with a fresh operator key
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;

        if state_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        fs::create_dir_all(&state_dir)?;

        let key = SecretKey::generate()?;
        let key_path = state_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, key.to_pem())?;

        let config_path = state_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        tracing::debug!(path = %state_dir.display(), "initialized state directory");

        Ok(Self {
            state_dir,
            key_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;

        if !state_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = state_dir.join(KEY_FILE_NAME);
        let config_path = state_dir.join(CONFIG_FILE_NAME);

        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config.validate()?;

        Ok(Self {
            state_dir,
            key_path,
            config_path,
            config,
        })
    }

    /// Load the operator key from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        Ok(SecretKey::from_pem(&pem)?)
    }

    /// The account buckets replayed by this operator are charged to
    pub fn account(&self) -> Result<PublicKey, StateError> {
        Ok(self.load_key()?.public())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no home directory found")]
    NoHomeDirectory,
    #[error("state directory already initialized")]
    AlreadyInitialized,
    #[error("state directory not initialized, run `bucket-ledger init` first")]
    NotInitialized,
    #[error("missing file: {0}")]
    MissingFile(String),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}
