//! Application wiring for tvsync
//!
//! Builds every component from configuration, runs the startup checks and
//! the initial library scan, then serves the HTTP API.

use crate::concurrency::{derive_plan, ScanPlan};
use crate::config::{Config, ConfigError};
use crate::directory::{new_shared_directory, SharedDirectory};
use crate::download::{Aria2Client, DownloadDaemon, DownloadError, DownloadOptions};
use crate::lifecycle::DownloadController;
use crate::matcher::FilenameMatcher;
use crate::providers::{EztvClient, LinkResolver, MetadataResolver, ProviderError, TvMazeClient};
use crate::reconcile::Reconciler;
use crate::scan::{LibraryScanner, ScanError, ScanReport};
use crate::server::{run_server, AppState, ServerError};
use crate::startup::{run_startup_checks, StartupError};
use crate::watcher::WatchSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Error type for application startup and runtime
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Initial scan failed
    #[error("Library scan failed: {0}")]
    Scan(#[from] ScanError),

    /// Could not build a provider client
    #[error("Provider client error: {0}")]
    Provider(#[from] ProviderError),

    /// Could not build the download daemon client
    #[error("Download client error: {0}")]
    Download(#[from] DownloadError),

    /// HTTP server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Runtime components of one tvsync instance
pub struct App {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Library root being reconciled
    pub root: PathBuf,
    pub plan: ScanPlan,
    pub directory: SharedDirectory,
    pub controller: DownloadController,
    pub reconciler: Reconciler,
    daemon: Arc<dyn DownloadDaemon>,
    scanner: LibraryScanner,
}

impl App {
    /// Build the application with the HTTP clients named in `config`
    pub fn new(config: Config, root: PathBuf) -> Result<Self, AppError> {
        let metadata = Arc::new(TvMazeClient::new(config.metadata.base_url.clone())?);
        let links = Arc::new(EztvClient::new(config.links.base_url.clone())?);
        let daemon = Arc::new(Aria2Client::new(
            config.aria2.rpc_url.clone(),
            config.aria2.secret.clone(),
        )?);
        Ok(Self::with_collaborators(config, root, metadata, links, daemon))
    }

    /// Build the application around explicit collaborators
    pub fn with_collaborators(
        config: Config,
        root: PathBuf,
        metadata: Arc<dyn MetadataResolver>,
        links: Arc<dyn LinkResolver>,
        daemon: Arc<dyn DownloadDaemon>,
    ) -> Self {
        let plan = derive_plan(&config);
        let directory = new_shared_directory();
        let matcher = FilenameMatcher::with_hidden_prefix(&config.library.hidden_prefix);
        let reconciler = Reconciler::new(metadata, links, matcher);

        let controller = DownloadController::new(
            directory.clone(),
            daemon.clone(),
            DownloadOptions {
                dir: config.aria2.download_dir.clone(),
            },
            WatchSettings::from(&config.watcher),
        );
        let scanner = LibraryScanner::new(reconciler.clone(), directory.clone(), plan.clone());

        Self {
            config,
            root,
            plan,
            directory,
            controller,
            reconciler,
            daemon,
            scanner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Verify the library root and, unless skipped, the download daemon
    pub async fn startup_checks(&self, skip_daemon: bool) -> Result<(), AppError> {
        run_startup_checks(&self.root, self.daemon.as_ref(), skip_daemon).await?;
        Ok(())
    }

    /// Scan the library and log a summary line per stored series
    pub async fn initial_scan(&self) -> Result<ScanReport, AppError> {
        let report = self.scanner.scan(&self.root).await?;

        for series in self.directory.get_all().await {
            let summary = series.summary();
            info!(
                series_id = series.id,
                name = %series.display_name(),
                episodes = summary.episodes,
                aired = summary.aired,
                local = summary.local,
                missing = summary.missing,
                downloadable = summary.downloadable,
                "Series summary"
            );
        }
        Ok(report)
    }

    /// Handler state for the HTTP surface
    pub fn state(&self) -> AppState {
        AppState {
            directory: self.directory.clone(),
            controller: self.controller.clone(),
            reconciler: self.reconciler.clone(),
        }
    }

    /// Run checks, scan, then serve until the server stops
    pub async fn run(&self, skip_daemon_check: bool) -> Result<(), AppError> {
        self.startup_checks(skip_daemon_check).await?;
        self.initial_scan().await?;
        run_server(self.state(), &self.config.server.bind).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::episode::{EpisodeKey, EpisodeStatus};
    use crate::testing::{listing_entry, show, FakeDaemon, FakeLinks, FakeMetadata};
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn app(root: &Path, daemon: Arc<FakeDaemon>) -> App {
        let config = Config {
            scan: ScanConfig { max_concurrent: 2 },
            ..Default::default()
        };
        let metadata = FakeMetadata::default().with_show(
            "ShowA",
            show(101, "Show A", Some("tt0000101")),
            vec![listing_entry(1, 1, 1, Some("2020-01-01")), listing_entry(2, 1, 2, Some("2020-01-08"))],
        );
        App::with_collaborators(
            config,
            root.to_path_buf(),
            Arc::new(metadata),
            Arc::new(FakeLinks::default()),
            daemon,
        )
    }

    #[test]
    fn test_new_builds_http_clients() {
        let app = App::new(Config::default(), PathBuf::from("/tv")).unwrap();
        assert_eq!(app.root(), Path::new("/tv"));
        assert!(app.plan.max_concurrent >= 4);
    }

    #[tokio::test]
    async fn test_startup_checks_use_daemon() {
        let root = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::default());
        let app = app(root.path(), daemon.clone());

        app.startup_checks(false).await.unwrap();
        assert_eq!(daemon.calls(), vec!["version "]);

        daemon.fail_on("version");
        assert!(matches!(app.startup_checks(false).await, Err(AppError::Startup(_))));
        assert!(app.startup_checks(true).await.is_ok());
    }

    #[tokio::test]
    async fn test_initial_scan_populates_directory() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("ShowA")).unwrap();
        File::create(root.path().join("ShowA").join("ShowA.S01E02.mkv")).unwrap();

        let app = app(root.path(), Arc::new(FakeDaemon::default()));
        let report = app.initial_scan().await.unwrap();
        assert_eq!(report.matched, 1);

        let ep = app.directory.episode(101, EpisodeKey::new(1, 2)).await.unwrap();
        assert_eq!(ep.status, EpisodeStatus::Exists);
        assert_eq!(app.plan.max_concurrent, 2);
    }
}
