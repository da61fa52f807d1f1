//! Completion watcher for active downloads.
//!
//! One background task per record with a handle. It polls the daemon at a
//! fixed interval, backs off exponentially while polls fail, and settles the
//! record once the daemon reports a terminal state. It exits as soon as its
//! token is cancelled or the record no longer carries the watched handle.

use crate::config::WatcherConfig;
use crate::download::{TaskState, TaskStatus};
use crate::episode::{Episode, EpisodeStatus};
use crate::lifecycle::{DownloadController, RecordGuard, RecordId};
use crate::relocate::move_all_into_place;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Polling cadence for completion watchers
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    /// Ceiling for the delay between failed polls
    pub max_backoff: Duration,
}

impl From<&WatcherConfig> for WatchSettings {
    fn from(cfg: &WatcherConfig) -> Self {
        let poll_interval = Duration::from_secs(cfg.poll_interval_secs.max(1));
        Self {
            poll_interval,
            max_backoff: Duration::from_secs(cfg.max_backoff_secs).max(poll_interval),
        }
    }
}

impl WatchSettings {
    /// Backoff for failed polls. Never gives up.
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.poll_interval,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// How a terminal daemon report is applied to the record
#[derive(Debug, Clone, PartialEq)]
enum Settlement {
    /// Files to move into the series folder
    Complete(Vec<PathBuf>),
    Failed,
    Removed,
}

/// Poll `handle` until it settles, the record drops it, or `token` fires.
pub(crate) async fn run(controller: DownloadController, record: RecordId, mut handle: String, token: CancellationToken) {
    let settings = controller.settings().clone();
    let mut backoff = settings.to_backoff();
    let mut delay = settings.poll_interval;
    debug!(record = %record, handle = %handle, "Watcher started");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(record = %record, handle = %handle, "Watcher cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if !carries_handle(&controller, record, &handle).await {
            debug!(record = %record, handle = %handle, "Record no longer carries handle, watcher exiting");
            return;
        }

        let status = match controller.daemon().status(&handle).await {
            Ok(status) => {
                backoff.reset();
                delay = settings.poll_interval;
                status
            }
            Err(e) => {
                delay = backoff
                    .next_backoff()
                    .unwrap_or(settings.max_backoff)
                    .min(settings.max_backoff);
                warn!(record = %record, handle = %handle, error = %e, retry_in_secs = delay.as_secs(), "Status poll failed");
                continue;
            }
        };

        match classify(status) {
            Poll::Followed(next) => {
                if !follow(&controller, record, &handle, &next, &token).await {
                    return;
                }
                info!(record = %record, from = %handle, to = %next, "Download continues under new handle");
                handle = next;
            }
            Poll::Running(state) => mirror(&controller, record, &handle, state, &token).await,
            Poll::Settled(settlement) => {
                settle(&controller, record, &handle, settlement, &token).await;
                return;
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Poll {
    Running(TaskState),
    /// Finished, with the transfer continuing under another handle
    Followed(String),
    Settled(Settlement),
}

fn classify(status: TaskStatus) -> Poll {
    match status.state {
        TaskState::Complete => match status.followed_by.first() {
            Some(next) => Poll::Followed(next.clone()),
            None => Poll::Settled(Settlement::Complete(status.resolved_files())),
        },
        TaskState::Error => Poll::Settled(Settlement::Failed),
        TaskState::Removed => Poll::Settled(Settlement::Removed),
        state => Poll::Running(state),
    }
}

async fn carries_handle(controller: &DownloadController, record: RecordId, handle: &str) -> bool {
    controller
        .directory()
        .episode(record.series_id, record.key)
        .await
        .is_some_and(|ep| ep.download_handle.as_deref() == Some(handle))
}

/// Lock the record, only if the watch is live and the record still carries `handle`.
async fn lock_current(controller: &DownloadController, record: RecordId, handle: &str, token: &CancellationToken) -> Option<RecordGuard> {
    let guard = controller.lock_record(record).await;
    if token.is_cancelled() || !carries_handle(controller, record, handle).await {
        return None;
    }
    Some(guard)
}

/// Run `f` on the record under its lock, only if it still carries `handle`.
async fn with_record<F>(controller: &DownloadController, record: RecordId, handle: &str, token: &CancellationToken, f: F) -> Option<Episode>
where
    F: FnOnce(&mut Episode),
{
    let _guard = lock_current(controller, record, handle, token).await?;
    controller
        .directory()
        .update_episode(record.series_id, record.key, f)
        .await
}

async fn follow(controller: &DownloadController, record: RecordId, handle: &str, next: &str, token: &CancellationToken) -> bool {
    let swapped = with_record(controller, record, handle, token, |ep| {
        ep.download_handle = Some(next.to_string());
    })
    .await;
    if swapped.is_some() {
        controller.rename_watched_handle(record, next);
    }
    swapped.is_some()
}

/// Reflect the daemon's queueing in the record.
async fn mirror(controller: &DownloadController, record: RecordId, handle: &str, state: TaskState, token: &CancellationToken) {
    let target = match state {
        TaskState::Waiting => EpisodeStatus::Queued,
        TaskState::Active => EpisodeStatus::Downloading,
        _ => return,
    };
    with_record(controller, record, handle, token, |ep| {
        if matches!(ep.status, EpisodeStatus::Downloading | EpisodeStatus::Queued) {
            ep.status = target;
        }
    })
    .await;
}

async fn settle(controller: &DownloadController, record: RecordId, handle: &str, settlement: Settlement, token: &CancellationToken) {
    match settlement {
        Settlement::Complete(files) => complete(controller, record, handle, files, token).await,
        Settlement::Failed => {
            warn!(record = %record, handle = %handle, "Daemon reported download failure");
            let updated = with_record(controller, record, handle, token, |ep| ep.end_transfer(EpisodeStatus::Error)).await;
            if updated.is_some() {
                info!(record = %record, "Record marked as error");
            }
        }
        Settlement::Removed => {
            with_record(controller, record, handle, token, |ep| ep.end_transfer(EpisodeStatus::NonExisting)).await;
            info!(record = %record, handle = %handle, "Download removed outside tvsync");
        }
    }
}

/// Move the finished files into the series folder and close the record.
///
/// The record lock is held from the handle check until the record is
/// written, so a concurrent stop either wins and nothing is moved, or
/// finds the record already settled.
async fn complete(controller: &DownloadController, record: RecordId, handle: &str, files: Vec<PathBuf>, token: &CancellationToken) {
    let Some(_guard) = lock_current(controller, record, handle, token).await else {
        debug!(record = %record, handle = %handle, "Record moved on, finished files left in place");
        return;
    };
    let Some(dest_dir) = controller.directory().get(record.series_id).await.map(|s| s.local_path) else {
        return;
    };

    let (moved, failure) = match tokio::task::spawn_blocking(move || move_all_into_place(&files, &dest_dir)).await {
        Ok(relocation) => (relocation.moved, relocation.failure.map(|e| e.to_string())),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    let path = moved.first().cloned();
    let status = if failure.is_some() {
        EpisodeStatus::Error
    } else {
        EpisodeStatus::Completed
    };

    controller
        .directory()
        .update_episode(record.series_id, record.key, |ep| {
            if let Some(path) = path.clone() {
                ep.local_exists = true;
                ep.local_filename = Some(path);
            }
            ep.end_transfer(status);
        })
        .await;

    match failure {
        None => info!(record = %record, handle = %handle, path = ?path, "Download completed"),
        Some(e) => error!(
            record = %record,
            handle = %handle,
            moved = moved.len(),
            error = %e,
            "Could not move completed download into the library"
        ),
    }
}
