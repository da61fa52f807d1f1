//! Series directory: the shared registry of reconciled series.
//!
//! A single readers-writer lock guards the whole map. Readers get cloned
//! snapshots so no lock is held across an await point by callers.

use crate::episode::{Episode, EpisodeKey};
use crate::reconcile::merge_prior;
use crate::series::Series;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to the directory
pub type SharedDirectory = Arc<SeriesDirectory>;

/// Registry of series keyed by canonical id
#[derive(Debug, Default)]
pub struct SeriesDirectory {
    series: RwLock<HashMap<u64, Series>>,
}

/// Create a new shared, empty directory
pub fn new_shared_directory() -> SharedDirectory {
    Arc::new(SeriesDirectory::default())
}

impl SeriesDirectory {
    pub async fn get(&self, id: u64) -> Option<Series> {
        self.series.read().await.get(&id).cloned()
    }

    /// Snapshot of every series, ordered by id. Empty when nothing is stored.
    pub async fn get_all(&self) -> Vec<Series> {
        let guard = self.series.read().await;
        let mut all: Vec<Series> = guard.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Insert or overwrite by the series' own id. Last writer wins.
    pub async fn add(&self, series: Series) -> u64 {
        let id = series.id;
        self.series.write().await.insert(id, series);
        id
    }

    /// Same as [`add`](Self::add): no existence check is made.
    pub async fn update(&self, series: Series) -> u64 {
        self.add(series).await
    }

    /// Store a freshly reconciled series, folding in the stored entry with
    /// the same id (see [`merge_prior`]).
    ///
    /// Read, merge and write happen under one write lock, so lifecycle
    /// updates made while the series was being reconciled are not lost.
    pub async fn merge(&self, mut series: Series) -> u64 {
        let id = series.id;
        let mut guard = self.series.write().await;
        if let Some(prior) = guard.get(&id) {
            merge_prior(prior, &mut series);
        }
        guard.insert(id, series);
        id
    }

    pub async fn remove(&self, id: u64) -> Option<Series> {
        self.series.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.series.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.series.read().await.is_empty()
    }

    /// Snapshot of a single episode record
    pub async fn episode(&self, id: u64, key: EpisodeKey) -> Option<Episode> {
        self.series
            .read()
            .await
            .get(&id)
            .and_then(|s| s.episodes.get(&key))
            .cloned()
    }

    /// Mutate one episode in place under the write lock.
    ///
    /// Returns the record as left by `f`, or `None` when the series or
    /// episode is unknown (in which case `f` is not called).
    pub async fn update_episode<F>(&self, id: u64, key: EpisodeKey, f: F) -> Option<Episode>
    where
        F: FnOnce(&mut Episode),
    {
        let mut guard = self.series.write().await;
        let episode = guard.get_mut(&id)?.episodes.get_mut(&key)?;
        f(episode);
        Some(episode.clone())
    }
}
