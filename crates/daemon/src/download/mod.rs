//! Download daemon interface for tvsync

pub mod aria2;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

pub use aria2::Aria2Client;

/// Error type for download daemon operations
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Transport failure reaching the daemon
    #[error("Download daemon unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The daemon answered with an RPC error object
    #[error("Download daemon error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The daemon answered with something we cannot interpret
    #[error("Unexpected download daemon response: {0}")]
    Protocol(String),
}

/// Options sent with every new download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    /// Directory the daemon writes into
    pub dir: PathBuf,
}

/// Transfer state as reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
    #[serde(other)]
    Unknown,
}

/// Status snapshot for one handle
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub dir: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    /// Handles spawned by this one (a magnet's metadata download is followed by the real transfer)
    pub followed_by: Vec<String>,
}

impl TaskStatus {
    /// Reported file paths, with relative entries joined onto `dir`.
    pub fn resolved_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|file| match &self.dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            })
            .collect()
    }
}

/// Operations the lifecycle controller needs from a download daemon
#[async_trait]
pub trait DownloadDaemon: Send + Sync {
    /// Submit a URL, returning the daemon's handle for the transfer
    async fn add(&self, url: &str, options: &DownloadOptions) -> Result<String, DownloadError>;

    async fn pause(&self, handle: &str) -> Result<(), DownloadError>;

    async fn resume(&self, handle: &str) -> Result<(), DownloadError>;

    async fn remove(&self, handle: &str) -> Result<(), DownloadError>;

    async fn status(&self, handle: &str) -> Result<TaskStatus, DownloadError>;

    /// Daemon version string, used as a liveness check at startup
    async fn version(&self) -> Result<String, DownloadError>;
}
