//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Media library location and folder conventions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Root directory holding one folder per show (the CLI argument wins)
    pub root: Option<PathBuf>,
    /// Name prefix marking files and folders as hidden
    #[serde(default = "default_hidden_prefix")]
    pub hidden_prefix: String,
}

fn default_hidden_prefix() -> String {
    ".".to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: None,
            hidden_prefix: default_hidden_prefix(),
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address the API listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Metadata provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_url")]
    pub base_url: String,
}

fn default_metadata_url() -> String {
    "https://api.tvmaze.com".to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_url(),
        }
    }
}

/// Torrent-index provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinksConfig {
    #[serde(default = "default_links_url")]
    pub base_url: String,
}

fn default_links_url() -> String {
    "https://eztvapi.re".to_string()
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            base_url: default_links_url(),
        }
    }
}

/// aria2 download daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aria2Config {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// RPC secret sent as `token:<secret>` (none = no auth)
    #[serde(default)]
    pub secret: Option<String>,
    /// Directory aria2 downloads into before files are moved into the library
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:6800/jsonrpc".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            secret: None,
            download_dir: default_download_dir(),
        }
    }
}

/// Completion watcher polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    /// Interval between status polls (default 10 seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Ceiling for the backoff applied after failed polls (default 300 seconds)
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    300
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Library scan configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScanConfig {
    /// Maximum concurrent series reconciliations (0 = auto-derive)
    #[serde(default)]
    pub max_concurrent: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "tvsync=info,tower_http=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub aria2: Aria2Config,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - TVSYNC_LIBRARY_ROOT -> library.root
    /// - TVSYNC_BIND -> server.bind
    /// - TVSYNC_METADATA_URL -> metadata.base_url
    /// - TVSYNC_LINKS_URL -> links.base_url
    /// - ARIA2_RPC_URL -> aria2.rpc_url
    /// - ARIA2_SECRET -> aria2.secret
    /// - ARIA2_DOWNLOAD_DIR -> aria2.download_dir
    /// - WATCHER_POLL_INTERVAL_SECS -> watcher.poll_interval_secs
    /// - WATCHER_MAX_BACKOFF_SECS -> watcher.max_backoff_secs
    /// - SCAN_MAX_CONCURRENT -> scan.max_concurrent
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TVSYNC_LIBRARY_ROOT") {
            if !val.is_empty() {
                self.library.root = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("TVSYNC_BIND") {
            if !val.is_empty() {
                self.server.bind = val;
            }
        }

        if let Ok(val) = env::var("TVSYNC_METADATA_URL") {
            if !val.is_empty() {
                self.metadata.base_url = val;
            }
        }

        if let Ok(val) = env::var("TVSYNC_LINKS_URL") {
            if !val.is_empty() {
                self.links.base_url = val;
            }
        }

        if let Ok(val) = env::var("ARIA2_RPC_URL") {
            if !val.is_empty() {
                self.aria2.rpc_url = val;
            }
        }

        // An empty secret explicitly disables token auth
        if let Ok(val) = env::var("ARIA2_SECRET") {
            self.aria2.secret = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = env::var("ARIA2_DOWNLOAD_DIR") {
            if !val.is_empty() {
                self.aria2.download_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("WATCHER_POLL_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.watcher.poll_interval_secs = secs;
            }
        }

        if let Ok(val) = env::var("WATCHER_MAX_BACKOFF_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.watcher.max_backoff_secs = secs;
            }
        }

        if let Ok(val) = env::var("SCAN_MAX_CONCURRENT") {
            if let Ok(max) = val.parse::<u32>() {
                self.scan.max_concurrent = max;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    ///
    /// Used when no config file is given on the command line.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }
}
