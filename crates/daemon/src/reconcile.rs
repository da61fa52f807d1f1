//! Series reconciliation.
//!
//! Merges three sources into one episode set per series: the metadata
//! provider's listing (the key set), files found under the series folder,
//! and the link index. Every pass that obtains the listing rebuilds the
//! episode map from scratch; [`merge_prior`] folds a stored snapshot back in.

use crate::episode::{Episode, EpisodeKey, EpisodeStatus};
use crate::matcher::FilenameMatcher;
use crate::providers::{EpisodeLinks, EpisodeMetadata, LinkResolver, MetadataResolver};
use crate::series::Series;
use chrono::{Local, NaiveDate};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Air date format used by the metadata provider.
pub const AIR_DATE_FORMAT: &str = "%Y-%m-%d";

/// Builds [`Series`] values from a folder name and path.
#[derive(Clone)]
pub struct Reconciler {
    metadata: Arc<dyn MetadataResolver>,
    links: Arc<dyn LinkResolver>,
    matcher: Arc<FilenameMatcher>,
}

impl Reconciler {
    pub fn new(
        metadata: Arc<dyn MetadataResolver>,
        links: Arc<dyn LinkResolver>,
        matcher: FilenameMatcher,
    ) -> Self {
        Self {
            metadata,
            links,
            matcher: Arc::new(matcher),
        }
    }

    pub fn matcher(&self) -> &FilenameMatcher {
        &self.matcher
    }

    /// Reconcile one series folder against today's date.
    pub async fn reconcile(&self, local_name: &str, local_path: &Path) -> Series {
        self.reconcile_at(local_name, local_path, Local::now().date_naive())
            .await
    }

    /// Reconcile one series folder, judging air dates against `today`.
    ///
    /// Never fails: provider errors leave the series unmatched or without
    /// links, filesystem errors skip the affected entries.
    pub async fn reconcile_at(&self, local_name: &str, local_path: &Path, today: NaiveDate) -> Series {
        let mut series = Series::new(local_name, local_path);

        let show = match self.metadata.lookup_by_name(local_name).await {
            Ok(Some(show)) => show,
            Ok(None) => {
                warn!(folder = %local_name, "No metadata match, series left unmatched");
                return series;
            }
            Err(e) => {
                warn!(folder = %local_name, error = %e, "Metadata lookup failed, series left unmatched");
                return series;
            }
        };
        series.apply_metadata(&show);

        match self.metadata.episodes(show.id).await {
            Ok(listing) => {
                series.episodes = build_episodes(listing, today);
                series.listing_complete = true;
            }
            Err(e) => {
                warn!(series_id = show.id, error = %e, "Episode listing unavailable, stored episodes are kept");
                return series;
            }
        }

        let files = self.local_files(local_path).await;
        apply_local_files(&mut series.episodes, files);

        match &series.imdb_id {
            Some(imdb_id) => match self.links.links_by_external_id(imdb_id).await {
                Ok(links) => apply_links(&mut series.episodes, links),
                Err(e) => {
                    warn!(series_id = series.id, imdb_id = %imdb_id, error = %e, "Link lookup failed");
                }
            },
            None => debug!(series_id = series.id, "No external id, skipping link lookup"),
        }

        info!(
            series_id = series.id,
            name = %series.display_name(),
            episodes = series.episodes.len(),
            "Reconciled series"
        );
        series
    }

    async fn local_files(&self, local_path: &Path) -> Vec<(EpisodeKey, PathBuf)> {
        let matcher = self.matcher.clone();
        let root = local_path.to_path_buf();
        match tokio::task::spawn_blocking(move || scan_local_files(&root, &matcher)).await {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "Local file walk aborted");
                Vec::new()
            }
        }
    }
}

/// Parse a provider air date. Blank or malformed dates are unknown.
pub fn parse_air_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, AIR_DATE_FORMAT)
        .map_err(|e| debug!(air_date = raw, error = %e, "Unparseable air date"))
        .ok()
}

/// Tri-state aired flag. A missing date is unknown, never aired.
pub fn has_aired(air_date: Option<NaiveDate>, today: NaiveDate) -> Option<bool> {
    air_date.map(|date| date <= today)
}

/// Build a fresh episode map from a provider listing.
///
/// The first listing entry for a key wins.
pub fn build_episodes(listing: Vec<EpisodeMetadata>, today: NaiveDate) -> BTreeMap<EpisodeKey, Episode> {
    let mut episodes = BTreeMap::new();
    for meta in listing {
        let key = meta.key();
        match episodes.entry(key) {
            Entry::Occupied(_) => {
                debug!(key = %key, id = meta.id, "Duplicate listing entry ignored");
            }
            Entry::Vacant(slot) => {
                let mut episode = Episode::new(meta.id, meta.name, key);
                episode.air_date = parse_air_date(meta.air_date.as_deref());
                episode.has_aired = has_aired(episode.air_date, today);
                slot.insert(episode);
            }
        }
    }
    episodes
}

/// Walk a series folder and match every visible file name.
///
/// Hidden files are skipped and hidden directories are not descended.
/// Unreadable entries are logged and skipped. Results follow file-name
/// order within each directory.
pub fn scan_local_files(root: &Path, matcher: &FilenameMatcher) -> Vec<(EpisodeKey, PathBuf)> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .map(|name| matcher.is_hidden(name))
                    .unwrap_or(false)
        });

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if let Some(key) = matcher.match_filename(name) {
            found.push((key, entry.into_path()));
        }
    }
    found
}

/// Mark listed episodes present on disk. The first file per key is kept;
/// files for unlisted keys are ignored.
pub fn apply_local_files(episodes: &mut BTreeMap<EpisodeKey, Episode>, files: Vec<(EpisodeKey, PathBuf)>) {
    for (key, path) in files {
        match episodes.get_mut(&key) {
            Some(episode) if !episode.local_exists => {
                episode.local_exists = true;
                episode.local_filename = Some(path);
                episode.status = EpisodeStatus::Exists;
            }
            Some(_) => debug!(key = %key, path = %path.display(), "Additional local file ignored"),
            None => debug!(key = %key, path = %path.display(), "Local file has no listed episode"),
        }
    }
}

/// Attach the single best link to each listed episode.
///
/// When several entries name the same key, the better quality wins.
pub fn apply_links(episodes: &mut BTreeMap<EpisodeKey, Episode>, links: Vec<EpisodeLinks>) {
    for entry in links {
        let Some((quality, url)) = entry.best() else {
            continue;
        };
        let Some(episode) = episodes.get_mut(&entry.key()) else {
            continue;
        };
        if episode.torrent_quality.map_or(true, |current| quality < current) {
            episode.torrent_link = Some(url.to_string());
            episode.torrent_quality = Some(quality);
        }
    }
}

/// Fold a stored snapshot of the same series into a fresh pass.
///
/// With a complete listing the new key set wins and lifecycle state is
/// carried forward. Without one the stored episodes are kept unchanged.
pub fn merge_prior(prior: &Series, next: &mut Series) {
    if next.listing_complete {
        carry_forward(prior, next);
    } else {
        debug!(
            series_id = next.id,
            episodes = prior.episodes.len(),
            "No fresh listing, keeping stored episodes"
        );
        next.episodes = prior.episodes.clone();
    }
}

/// Copy lifecycle state from a prior snapshot into a freshly built series.
///
/// For every re-observed key whose prior status was produced by the
/// lifecycle controller, status and handle are copied verbatim. Prior keys
/// missing from the new listing that still hold a handle are reported.
pub fn carry_forward(prior: &Series, next: &mut Series) {
    for (key, old) in &prior.episodes {
        if !old.status.is_lifecycle_owned() {
            continue;
        }
        match next.episodes.get_mut(key) {
            Some(episode) => {
                episode.status = old.status;
                episode.download_handle = old.download_handle.clone();
            }
            None => {
                if let Some(handle) = &old.download_handle {
                    warn!(
                        series_id = prior.id,
                        season = key.season,
                        episode = key.episode,
                        handle = %handle,
                        "Episode left the listing while its download is in flight"
                    );
                }
            }
        }
    }
}
