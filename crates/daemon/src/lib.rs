//! tvsync
//!
//! Reconciles a local TV library against episode metadata and torrent
//! availability, and drives per-episode downloads through aria2.

pub mod app;
pub mod concurrency;
pub mod directory;
pub mod download;
pub mod episode;
pub mod lifecycle;
pub mod matcher;
pub mod providers;
pub mod reconcile;
pub mod relocate;
pub mod scan;
pub mod series;
pub mod server;
pub mod startup;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{App, AppError};
pub use concurrency::{derive_plan, ScanPlan};
pub use directory::{new_shared_directory, SeriesDirectory, SharedDirectory};
pub use download::{Aria2Client, DownloadDaemon, DownloadError, DownloadOptions, TaskState, TaskStatus};
pub use episode::{Episode, EpisodeKey, EpisodeStatus, ParseKeyError, Quality};
pub use lifecycle::{DownloadController, LifecycleError, RecordId};
pub use matcher::FilenameMatcher;
pub use providers::{
    EpisodeLinks, EpisodeMetadata, EztvClient, LinkResolver, MetadataResolver, ProviderError,
    ShowMetadata, TvMazeClient,
};
pub use reconcile::{carry_forward, merge_prior, Reconciler};
pub use relocate::{move_all_into_place, move_into_place, RelocateError, Relocation};
pub use scan::{discover_show_folders, LibraryScanner, ScanError, ScanReport, ShowFolder};
pub use series::{Series, SeriesSummary};
pub use server::{create_router, run_server, ApiError, AppState, ServerError};
pub use startup::{check_download_daemon, check_library_root, run_startup_checks, StartupError};
pub use tvsync_config as config;
pub use tvsync_config::Config;
pub use watcher::WatchSettings;
