//! Startup checks for tvsync
//!
//! Preflight checks run before the first scan:
//! - The library root is a readable directory
//! - The download daemon answers a version request

use crate::download::{DownloadDaemon, DownloadError};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Library root {0} is not a directory")]
    NotADirectory(String),

    #[error("Library root {path} is not readable: {source}")]
    UnreadableRoot {
        path: String,
        source: std::io::Error,
    },

    #[error("Download daemon not available: {0}; is aria2c running with --enable-rpc?")]
    DaemonUnavailable(#[from] DownloadError),
}

/// Verify that `root` exists, is a directory and can be listed
pub fn check_library_root(root: &Path) -> Result<(), StartupError> {
    let display = root.display().to_string();
    let metadata = fs::metadata(root).map_err(|source| StartupError::UnreadableRoot {
        path: display.clone(),
        source,
    })?;

    if !metadata.is_dir() {
        return Err(StartupError::NotADirectory(display));
    }

    fs::read_dir(root).map_err(|source| StartupError::UnreadableRoot {
        path: display,
        source,
    })?;

    Ok(())
}

/// Verify that the download daemon answers, returning its version
pub async fn check_download_daemon(daemon: &dyn DownloadDaemon) -> Result<String, StartupError> {
    let version = daemon.version().await?;
    info!(version = %version, "Download daemon reachable");
    Ok(version)
}

/// Run all startup checks
///
/// Checks are run in the following order:
/// 1. Library root readable
/// 2. Download daemon reachable (unless `skip_daemon` is set)
pub async fn run_startup_checks(
    root: &Path,
    daemon: &dyn DownloadDaemon,
    skip_daemon: bool,
) -> Result<(), StartupError> {
    check_library_root(root)?;
    if !skip_daemon {
        check_download_daemon(daemon).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDaemon;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_existing_directory_passes() {
        let dir = TempDir::new().unwrap();
        assert!(check_library_root(dir.path()).is_ok());
    }

    #[test]
    fn test_missing_root_fails() {
        let result = check_library_root(Path::new("/nonexistent/tvsync/library"));
        assert!(matches!(result, Err(StartupError::UnreadableRoot { .. })));
    }

    #[test]
    fn test_file_root_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        File::create(&file).unwrap();

        let result = check_library_root(&file);
        assert!(matches!(result, Err(StartupError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_daemon_version_check() {
        let daemon = FakeDaemon::default();
        assert_eq!(check_download_daemon(&daemon).await.unwrap(), "1.37.0");

        daemon.fail_on("version");
        assert!(matches!(
            check_download_daemon(&daemon).await,
            Err(StartupError::DaemonUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_skip_daemon_check() {
        let dir = TempDir::new().unwrap();
        let daemon = FakeDaemon::default();
        daemon.fail_on("version");

        assert!(run_startup_checks(dir.path(), &daemon, true).await.is_ok());
        assert!(run_startup_checks(dir.path(), &daemon, false).await.is_err());
        // root check runs first and is never skipped
        assert!(run_startup_checks(Path::new("/nonexistent"), &daemon, true).await.is_err());
    }
}
