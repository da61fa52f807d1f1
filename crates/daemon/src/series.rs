//! Tracked series: local folder identity plus cached provider metadata.

use crate::episode::{Episode, EpisodeKey};
use crate::providers::ShowMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A show folder reconciled against the metadata provider.
///
/// Descriptive fields are a cache of provider data and are replaced on every
/// reconciliation pass. `episodes` is rebuilt wholesale on each pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Canonical provider id, 0 until matched.
    pub id: u64,
    /// True only after a successful, unambiguous metadata lookup.
    pub matched: bool,
    pub name: Option<String>,
    pub status: Option<String>,
    pub language: Option<String>,
    /// Provider last-updated stamp (unix seconds).
    pub last_updated: Option<i64>,
    /// External cross-reference id used by the link resolver (IMDb id).
    pub imdb_id: Option<String>,
    /// Folder name, the source of truth for lookups.
    pub local_name: String,
    pub local_path: PathBuf,
    pub episodes: BTreeMap<EpisodeKey, Episode>,
    /// Whether the last pass obtained the provider's episode listing.
    ///
    /// When false, `episodes` was not rebuilt and must not replace a stored map.
    #[serde(default)]
    pub listing_complete: bool,
}

impl Series {
    /// An unmatched series for a freshly discovered folder.
    pub fn new(local_name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            id: 0,
            matched: false,
            name: None,
            status: None,
            language: None,
            last_updated: None,
            imdb_id: None,
            local_name: local_name.into(),
            local_path: local_path.into(),
            episodes: BTreeMap::new(),
            listing_complete: false,
        }
    }

    /// Replace the cached descriptive fields and mark the series matched.
    pub fn apply_metadata(&mut self, show: &ShowMetadata) {
        self.id = show.id;
        self.matched = true;
        self.name = Some(show.name.clone());
        self.status = show.status.clone();
        self.language = show.language.clone();
        self.last_updated = show.last_updated;
        self.imdb_id = show.imdb_id.clone();
    }

    pub fn episode(&self, key: &EpisodeKey) -> Option<&Episode> {
        self.episodes.get(key)
    }

    /// Display name: provider name when matched, folder name otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.local_name)
    }

    /// Counts used for the post-scan summary.
    pub fn summary(&self) -> SeriesSummary {
        let mut summary = SeriesSummary {
            episodes: self.episodes.len(),
            ..Default::default()
        };
        for episode in self.episodes.values() {
            if episode.has_aired == Some(true) {
                summary.aired += 1;
            }
            if episode.local_exists {
                summary.local += 1;
            } else if episode.has_aired == Some(true) {
                summary.missing += 1;
                if episode.torrent_link.is_some() {
                    summary.downloadable += 1;
                }
            }
        }
        summary
    }
}

/// Aggregate episode counts for one series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeriesSummary {
    pub episodes: usize,
    pub aired: usize,
    pub local: usize,
    /// Aired but not on disk.
    pub missing: usize,
    /// Missing episodes with a link available.
    pub downloadable: usize,
}
