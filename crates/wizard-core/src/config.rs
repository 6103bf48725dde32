use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WizardConfig {
    pub storage: StorageConfig,
    pub timeouts: TimeoutConfig,
    pub server: ServerConfig,
}

impl WizardConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("WIZARD")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("WIZARD")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("storage.backend", "memory")?
            .set_default("storage.path", default_storage_path().to_string_lossy().to_string())?
            .set_default("storage.max_connections", 5)?
            .set_default("timeouts.hook_ms", 5_000)?
            .set_default("timeouts.storage_ms", 10_000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)
    }
}

/// Which storage backend holds wizard contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map, lost on restart
    Memory,
    /// One JSON document per context in a local directory
    File,
    /// Postgres table, falls back to memory when unreachable
    Postgres,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: default_storage_path(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::File,
            path: path.into(),
            ..Self::memory()
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Postgres,
            database_url: Some(url.into()),
            ..Self::memory()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/wizards")
}

fn default_max_connections() -> u32 {
    5
}

/// Deadlines applied to hooks and storage calls
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_hook_ms")]
    pub hook_ms: u64,
    #[serde(default = "default_storage_ms")]
    pub storage_ms: u64,
}

impl TimeoutConfig {
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            hook_ms: default_hook_ms(),
            storage_ms: default_storage_ms(),
        }
    }
}

fn default_hook_ms() -> u64 {
    5_000
}

fn default_storage_ms() -> u64 {
    10_000
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}
