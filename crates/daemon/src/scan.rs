//! Library scanner.
//!
//! Lists the show folders directly under the library root and reconciles
//! them concurrently, bounded by the scan plan. Matched series land in the
//! directory; the scan returns only after every reconciliation finished.

use crate::concurrency::ScanPlan;
use crate::directory::SharedDirectory;
use crate::matcher::FilenameMatcher;
use crate::reconcile::Reconciler;
use crate::series::Series;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Errors that abort a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The library root could not be listed.
    #[error("Cannot read library root {path}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A show folder discovered under the library root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShowFolder {
    /// Folder name, used as the metadata lookup key.
    pub name: String,
    pub path: PathBuf,
}

/// Outcome counts of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub discovered: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Reconciliation tasks that panicked or were cancelled.
    pub failed: usize,
}

/// Lists the visible immediate subdirectories of `root`, sorted by name.
///
/// An unreadable root fails the whole call. Individual unreadable entries
/// and names that are not valid UTF-8 are skipped.
pub fn discover_show_folders(root: &Path, matcher: &FilenameMatcher) -> Result<Vec<ShowFolder>, ScanError> {
    let entries = fs::read_dir(root).map_err(|source| ScanError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable library entry");
                continue;
            }
        };
        let path = entry.path();
        // follows symlinks so linked show folders are included
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %path.display(), "Skipping folder with non UTF-8 name");
            continue;
        };
        if matcher.is_hidden(&name) {
            debug!(folder = %name, "Skipping hidden folder");
            continue;
        }
        folders.push(ShowFolder { name, path });
    }

    folders.sort();
    Ok(folders)
}

/// Fans reconciliation out over every show folder of a library.
pub struct LibraryScanner {
    reconciler: Reconciler,
    directory: SharedDirectory,
    plan: ScanPlan,
}

impl LibraryScanner {
    pub fn new(reconciler: Reconciler, directory: SharedDirectory, plan: ScanPlan) -> Self {
        Self {
            reconciler,
            directory,
            plan,
        }
    }

    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    /// Scan `root` and store every matched series.
    ///
    /// Matched series are merged into the directory, so re-scanning keeps
    /// in-flight downloads attached to their records.
    pub async fn scan(&self, root: &Path) -> Result<ScanReport, ScanError> {
        let folders = discover_show_folders(root, self.reconciler.matcher())?;
        let mut report = ScanReport {
            discovered: folders.len(),
            ..Default::default()
        };
        info!(
            root = %root.display(),
            folders = folders.len(),
            max_concurrent = self.plan.max_concurrent,
            "Scanning library"
        );

        let semaphore = Arc::new(Semaphore::new(self.plan.max_concurrent.max(1) as usize));
        let mut tasks: JoinSet<Option<Series>> = JoinSet::new();

        for folder in folders {
            let reconciler = self.reconciler.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(reconciler.reconcile(&folder.name, &folder.path).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(series)) if series.matched => {
                    self.directory.merge(series).await;
                    report.matched += 1;
                }
                Ok(Some(series)) => {
                    debug!(folder = %series.local_name, "Unmatched folder not stored");
                    report.unmatched += 1;
                }
                Ok(None) => report.failed += 1,
                Err(e) => {
                    error!(error = %e, "Reconciliation task failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            discovered = report.discovered,
            matched = report.matched,
            unmatched = report.unmatched,
            failed = report.failed,
            "Library scan finished"
        );
        Ok(report)
    }
}
