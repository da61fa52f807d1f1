//! Download lifecycle controller.
//!
//! Moves one episode record at a time through its download states by
//! talking to the download daemon. Operations on the same record are
//! serialised by a per-record async mutex; the directory lock is never held
//! across a daemon call.
//!
//! | Operation | From          | Effect                                       |
//! |-----------|---------------|----------------------------------------------|
//! | start     | NonExisting   | add link, store handle, Downloading, watch   |
//! | start     | Exists        | rejected (already exists)                    |
//! | start     | Downloading   | no-op                                        |
//! | start     | Queued        | resume, Downloading                          |
//! | start     | other         | record set to Error, rejected                |
//! | pause     | Downloading   | pause, Paused (Error if the daemon failed)   |
//! | stop      | any w/ handle | remove, clear handle, NonExisting            |

use crate::directory::SharedDirectory;
use crate::download::{DownloadDaemon, DownloadError, DownloadOptions};
use crate::episode::{Episode, EpisodeKey, EpisodeStatus};
use crate::reconcile::merge_prior;
use crate::series::Series;
use crate::watcher::{self, WatchSettings};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error type for lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No such series or episode in the directory
    #[error("Episode {0} not found")]
    NotFound(RecordId),

    /// The episode is already in the local library
    #[error("Episode {0} already exists locally")]
    AlreadyExists(RecordId),

    /// The operation is not valid from the record's current status
    #[error("Episode {record} cannot do that while {status}")]
    InvalidState {
        record: RecordId,
        status: EpisodeStatus,
    },

    /// The record carries no download handle
    #[error("Episode {0} has no active download")]
    NoHandle(RecordId),

    /// The record has no link to download from
    #[error("Episode {0} has no download link")]
    NoLink(RecordId),

    /// The download daemon rejected or failed the request
    #[error("Download daemon error: {0}")]
    Daemon(#[from] DownloadError),
}

/// Address of one episode record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub series_id: u64,
    pub key: EpisodeKey,
}

impl RecordId {
    pub fn new(series_id: u64, key: EpisodeKey) -> Self {
        Self { series_id, key }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.series_id, self.key)
    }
}

/// Watcher registration for one record
struct ActiveWatch {
    generation: u64,
    handle: String,
    token: CancellationToken,
}

#[derive(Default)]
struct WatchRegistry {
    next_generation: u64,
    active: HashMap<RecordId, ActiveWatch>,
}

struct ControllerInner {
    directory: SharedDirectory,
    daemon: Arc<dyn DownloadDaemon>,
    options: DownloadOptions,
    settings: WatchSettings,
    locks: Mutex<HashMap<RecordId, Arc<tokio::sync::Mutex<()>>>>,
    watches: Mutex<WatchRegistry>,
}

/// Exclusive access to one record.
///
/// Dropping it releases the lock and forgets the lock entry when no other
/// task is waiting for it, so the lock table only holds contended records.
pub(crate) struct RecordGuard {
    record: RecordId,
    guard: Option<OwnedMutexGuard<()>>,
    inner: Arc<ControllerInner>,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(&self.record)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.record);
        }
    }
}

/// Drives episode records through the download lifecycle.
///
/// Cheap to clone; clones share locks and watchers.
#[derive(Clone)]
pub struct DownloadController {
    inner: Arc<ControllerInner>,
}

impl DownloadController {
    pub fn new(
        directory: SharedDirectory,
        daemon: Arc<dyn DownloadDaemon>,
        options: DownloadOptions,
        settings: WatchSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                directory,
                daemon,
                options,
                settings,
                locks: Mutex::new(HashMap::new()),
                watches: Mutex::new(WatchRegistry::default()),
            }),
        }
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.inner.directory
    }

    pub(crate) fn daemon(&self) -> &Arc<dyn DownloadDaemon> {
        &self.inner.daemon
    }

    pub(crate) fn settings(&self) -> &WatchSettings {
        &self.inner.settings
    }

    /// Acquire the per-record lock, waiting for any operation in flight.
    pub(crate) async fn lock_record(&self, record: RecordId) -> RecordGuard {
        let lock = {
            let mut locks = self
                .inner
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(record).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        RecordGuard {
            record,
            guard: Some(guard),
            inner: self.inner.clone(),
        }
    }

    /// Number of records with a lock entry.
    pub(crate) fn tracked_locks(&self) -> usize {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn load(&self, record: RecordId) -> Result<Episode, LifecycleError> {
        self.inner
            .directory
            .episode(record.series_id, record.key)
            .await
            .ok_or(LifecycleError::NotFound(record))
    }

    async fn store<F>(&self, record: RecordId, f: F) -> Result<Episode, LifecycleError>
    where
        F: FnOnce(&mut Episode),
    {
        self.inner
            .directory
            .update_episode(record.series_id, record.key, f)
            .await
            .ok_or(LifecycleError::NotFound(record))
    }

    /// Start (or resume) the download of one episode.
    pub async fn start(&self, series_id: u64, key: EpisodeKey) -> Result<Episode, LifecycleError> {
        let record = RecordId::new(series_id, key);
        let _guard = self.lock_record(record).await;
        let episode = self.load(record).await?;

        match episode.status {
            EpisodeStatus::NonExisting => {
                let link = episode
                    .torrent_link
                    .as_deref()
                    .filter(|l| !l.is_empty())
                    .ok_or(LifecycleError::NoLink(record))?;

                let handle = self.inner.daemon.add(link, &self.inner.options).await.map_err(|e| {
                    warn!(record = %record, error = %e, "Daemon refused download");
                    LifecycleError::from(e)
                })?;

                let stored = self
                    .store(record, |ep| ep.begin_transfer(handle.clone(), EpisodeStatus::Downloading))
                    .await;
                let updated = match stored {
                    Ok(updated) => updated,
                    Err(e) => {
                        // record vanished while the daemon call was in flight
                        if let Err(remove_err) = self.inner.daemon.remove(&handle).await {
                            warn!(record = %record, handle = %handle, error = %remove_err, "Could not drop orphaned download");
                        }
                        return Err(e);
                    }
                };

                info!(record = %record, handle = %handle, "Download started");
                self.spawn_watcher(record, handle);
                Ok(updated)
            }
            EpisodeStatus::Exists => Err(LifecycleError::AlreadyExists(record)),
            EpisodeStatus::Downloading => {
                debug!(record = %record, "Already downloading");
                Ok(episode)
            }
            EpisodeStatus::Queued => {
                let handle = episode
                    .download_handle
                    .clone()
                    .ok_or(LifecycleError::NoHandle(record))?;
                self.inner.daemon.resume(&handle).await?;

                let updated = self
                    .store(record, |ep| ep.status = EpisodeStatus::Downloading)
                    .await?;
                info!(record = %record, handle = %handle, "Download resumed");
                self.spawn_watcher(record, handle);
                Ok(updated)
            }
            status => {
                self.store(record, |ep| ep.status = EpisodeStatus::Error).await?;
                warn!(record = %record, from = %status, "Start rejected, record marked as error");
                Err(LifecycleError::InvalidState { record, status })
            }
        }
    }

    /// Pause an active download.
    ///
    /// The record ends up `Paused` even when the daemon call fails; in that
    /// case it is then marked `Error` and the daemon error is returned.
    pub async fn pause(&self, series_id: u64, key: EpisodeKey) -> Result<Episode, LifecycleError> {
        let record = RecordId::new(series_id, key);
        let _guard = self.lock_record(record).await;
        let episode = self.load(record).await?;

        let handle = episode
            .download_handle
            .clone()
            .ok_or(LifecycleError::NoHandle(record))?;
        if episode.status != EpisodeStatus::Downloading {
            return Err(LifecycleError::InvalidState {
                record,
                status: episode.status,
            });
        }

        let result = self.inner.daemon.pause(&handle).await;
        let status = match result {
            Ok(()) => EpisodeStatus::Paused,
            Err(_) => EpisodeStatus::Error,
        };
        let updated = self.store(record, |ep| ep.status = status).await?;

        match result {
            Ok(()) => {
                info!(record = %record, handle = %handle, "Download paused");
                Ok(updated)
            }
            Err(e) => {
                warn!(record = %record, handle = %handle, error = %e, "Pause failed, record marked as error");
                Err(e.into())
            }
        }
    }

    /// Remove a download from the daemon and forget its handle.
    ///
    /// A record without a handle is left alone and returned as is.
    pub async fn stop(&self, series_id: u64, key: EpisodeKey) -> Result<Episode, LifecycleError> {
        let record = RecordId::new(series_id, key);
        let _guard = self.lock_record(record).await;
        let episode = self.load(record).await?;

        let Some(handle) = episode.download_handle.clone() else {
            debug!(record = %record, "Nothing to stop");
            return Ok(episode);
        };

        self.inner.daemon.remove(&handle).await.map_err(|e| {
            warn!(record = %record, handle = %handle, error = %e, "Stop failed, handle kept");
            LifecycleError::from(e)
        })?;

        self.cancel_watcher(record);
        let updated = self
            .store(record, |ep| ep.end_transfer(EpisodeStatus::NonExisting))
            .await?;
        info!(record = %record, handle = %handle, "Download stopped");
        Ok(updated)
    }

    /// Store a refreshed series whose canonical id changed from `old_id`.
    ///
    /// The stored entry under `old_id` is folded into `fresh` and removed.
    /// Every carried handle is watched under its new address and the old
    /// watchers are cancelled. Both the old and the new records stay locked
    /// until the move is complete. Returns the id the series is stored under.
    pub async fn rehome_series(&self, old_id: u64, mut fresh: Series) -> u64 {
        let new_id = fresh.id;
        let directory = &self.inner.directory;

        let mut records: Vec<RecordId> = fresh
            .episodes
            .keys()
            .map(|key| RecordId::new(new_id, *key))
            .collect();
        if let Some(prior) = directory.get(old_id).await {
            for key in prior.episodes.keys() {
                records.push(RecordId::new(old_id, *key));
                records.push(RecordId::new(new_id, *key));
            }
        }
        if let Some(existing) = directory.get(new_id).await {
            records.extend(existing.episodes.keys().map(|key| RecordId::new(new_id, *key)));
        }
        // one global order keeps concurrent moves from deadlocking
        records.sort();
        records.dedup();

        let mut guards = Vec::with_capacity(records.len());
        for record in &records {
            guards.push(self.lock_record(*record).await);
        }

        if let Some(prior) = directory.remove(old_id).await {
            merge_prior(&prior, &mut fresh);
            for key in prior.episodes.keys() {
                self.cancel_watcher(RecordId::new(old_id, *key));
            }
        }
        directory.merge(fresh).await;

        if let Some(stored) = directory.get(new_id).await {
            for (key, episode) in &stored.episodes {
                if let Some(handle) = &episode.download_handle {
                    let record = RecordId::new(new_id, *key);
                    info!(record = %record, handle = %handle, old_series_id = old_id, "Watching download under new series id");
                    self.spawn_watcher(record, handle.clone());
                }
            }
        }

        drop(guards);
        new_id
    }

    /// Number of records with a live completion watcher.
    pub fn active_watchers(&self) -> usize {
        self.registry().active.len()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, WatchRegistry> {
        self.inner
            .watches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start watching `handle` unless a watcher already follows it.
    pub(crate) fn spawn_watcher(&self, record: RecordId, handle: String) {
        let (generation, token) = {
            let mut registry = self.registry();
            if let Some(existing) = registry.active.get(&record) {
                if existing.handle == handle && !existing.token.is_cancelled() {
                    return;
                }
                existing.token.cancel();
            }
            registry.next_generation += 1;
            let generation = registry.next_generation;
            let token = CancellationToken::new();
            registry.active.insert(
                record,
                ActiveWatch {
                    generation,
                    handle: handle.clone(),
                    token: token.clone(),
                },
            );
            (generation, token)
        };

        let controller = self.clone();
        tokio::spawn(async move {
            watcher::run(controller.clone(), record, handle, token).await;
            controller.release_watcher(record, generation);
        });
    }

    /// Follow a successor handle within the same watcher.
    pub(crate) fn rename_watched_handle(&self, record: RecordId, handle: &str) {
        if let Some(active) = self.registry().active.get_mut(&record) {
            active.handle = handle.to_string();
        }
    }

    fn cancel_watcher(&self, record: RecordId) {
        if let Some(active) = self.registry().active.remove(&record) {
            active.token.cancel();
        }
    }

    fn release_watcher(&self, record: RecordId, generation: u64) {
        let mut registry = self.registry();
        if registry
            .active
            .get(&record)
            .is_some_and(|a| a.generation == generation)
        {
            registry.active.remove(&record);
        }
    }
}
