//! Episode records and their identity.
//!
//! An [`Episode`] is the unit of reconciled truth: provider metadata, local
//! presence, the best available link and the download lifecycle state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Composite `(season, episode)` key, unique within a series.
///
/// Serialized as `<season>_<episode>` so it can key JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EpisodeKey {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeKey {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.season, self.episode)
    }
}

/// Error parsing an [`EpisodeKey`] from its `<season>_<episode>` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid episode key '{0}', expected <season>_<episode>")]
pub struct ParseKeyError(pub String);

impl FromStr for EpisodeKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (season, episode) = s.split_once('_').ok_or_else(|| ParseKeyError(s.to_string()))?;
        let season = season.parse().map_err(|_| ParseKeyError(s.to_string()))?;
        let episode = episode.parse().map_err(|_| ParseKeyError(s.to_string()))?;
        Ok(Self { season, episode })
    }
}

impl From<EpisodeKey> for String {
    fn from(key: EpisodeKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for EpisodeKey {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Download lifecycle state of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    /// Not on disk and not downloading.
    NonExisting,
    /// Present in the local library.
    Exists,
    /// Active transfer in the download daemon.
    Downloading,
    /// Waiting in the download daemon's queue.
    Queued,
    /// Transfer paused in the download daemon.
    Paused,
    /// Download finished and moved into the library.
    Completed,
    /// A lifecycle operation failed.
    Error,
}

impl Default for EpisodeStatus {
    fn default() -> Self {
        Self::NonExisting
    }
}

impl EpisodeStatus {
    /// States in which the record must carry a download handle.
    ///
    /// `Error` may still hold one: a failed pause or a rejected start from
    /// `Paused` keeps the handle so that a later stop can remove the task
    /// from the daemon.
    pub fn requires_handle(&self) -> bool {
        matches!(
            self,
            EpisodeStatus::Downloading | EpisodeStatus::Queued | EpisodeStatus::Paused
        )
    }

    /// States produced by the lifecycle controller rather than by reconciliation.
    ///
    /// These survive a reconciliation pass for re-observed keys.
    pub fn is_lifecycle_owned(&self) -> bool {
        !matches!(self, EpisodeStatus::NonExisting | EpisodeStatus::Exists)
    }
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeStatus::NonExisting => write!(f, "non_existing"),
            EpisodeStatus::Exists => write!(f, "exists"),
            EpisodeStatus::Downloading => write!(f, "downloading"),
            EpisodeStatus::Queued => write!(f, "queued"),
            EpisodeStatus::Paused => write!(f, "paused"),
            EpisodeStatus::Completed => write!(f, "completed"),
            EpisodeStatus::Error => write!(f, "error"),
        }
    }
}

/// Torrent quality tier. Ordering follows preference: `Hd720p` is best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "720p")]
    Hd720p,
    #[serde(rename = "480p")]
    Sd480p,
    #[serde(rename = "sdtv")]
    Sdtv,
}

impl Quality {
    /// All tiers, most preferred first.
    pub const PREFERENCE: [Quality; 3] = [Quality::Hd720p, Quality::Sd480p, Quality::Sdtv];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Hd720p => "720p",
            Quality::Sd480p => "480p",
            Quality::Sdtv => "sdtv",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reconciled `(season, episode)` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Provider-assigned id. Informational only, never a dedup key.
    pub id: u64,
    pub name: String,
    pub season: u32,
    pub number: u32,
    pub air_date: Option<NaiveDate>,
    /// `None` when the air date is missing or unparseable.
    pub has_aired: Option<bool>,
    pub local_exists: bool,
    pub local_filename: Option<PathBuf>,
    pub torrent_link: Option<String>,
    pub torrent_quality: Option<Quality>,
    pub status: EpisodeStatus,
    /// Opaque download daemon handle (aria2 gid).
    pub download_handle: Option<String>,
}

impl Episode {
    pub fn new(id: u64, name: impl Into<String>, key: EpisodeKey) -> Self {
        Self {
            id,
            name: name.into(),
            season: key.season,
            number: key.episode,
            air_date: None,
            has_aired: None,
            local_exists: false,
            local_filename: None,
            torrent_link: None,
            torrent_quality: None,
            status: EpisodeStatus::NonExisting,
            download_handle: None,
        }
    }

    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.season, self.number)
    }

    /// Attach a handle and move to an active state.
    pub fn begin_transfer(&mut self, handle: String, status: EpisodeStatus) {
        self.download_handle = Some(handle);
        self.status = status;
    }

    /// Drop the handle and settle into a handle-free state.
    pub fn end_transfer(&mut self, status: EpisodeStatus) {
        self.download_handle = None;
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_display_and_parse() {
        let key = EpisodeKey::new(1, 2);
        assert_eq!(key.to_string(), "1_2");
        assert_eq!("1_2".parse::<EpisodeKey>(), Ok(key));
        assert_eq!("03_10".parse::<EpisodeKey>(), Ok(EpisodeKey::new(3, 10)));
    }

    #[test]
    fn test_key_parse_rejects_malformed() {
        for bad in ["", "1", "1_", "_2", "a_b", "1_2_3", "S01E02", "-1_2"] {
            assert!(bad.parse::<EpisodeKey>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_key_as_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(EpisodeKey::new(2, 5), "x");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"2_5":"x"}"#);

        let back: BTreeMap<EpisodeKey, String> = serde_json::from_str(&json).unwrap();
        assert!(back.contains_key(&EpisodeKey::new(2, 5)));
    }

    #[test]
    fn test_key_ordering_is_season_then_episode() {
        let mut keys = vec![
            EpisodeKey::new(2, 1),
            EpisodeKey::new(1, 10),
            EpisodeKey::new(1, 2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![EpisodeKey::new(1, 2), EpisodeKey::new(1, 10), EpisodeKey::new(2, 1)]
        );
    }

    #[test]
    fn test_status_default_and_serde() {
        assert_eq!(EpisodeStatus::default(), EpisodeStatus::NonExisting);
        assert_eq!(
            serde_json::to_string(&EpisodeStatus::NonExisting).unwrap(),
            "\"non_existing\""
        );
        assert_eq!(EpisodeStatus::Downloading.to_string(), "downloading");
    }

    #[test]
    fn test_status_handle_requirements() {
        assert!(EpisodeStatus::Downloading.requires_handle());
        assert!(EpisodeStatus::Queued.requires_handle());
        assert!(EpisodeStatus::Paused.requires_handle());
        assert!(!EpisodeStatus::Completed.requires_handle());
        assert!(!EpisodeStatus::NonExisting.requires_handle());
        assert!(!EpisodeStatus::Error.requires_handle());
    }

    #[test]
    fn test_quality_preference_order() {
        assert!(Quality::Hd720p < Quality::Sd480p);
        assert!(Quality::Sd480p < Quality::Sdtv);
        assert_eq!(serde_json::to_string(&Quality::Hd720p).unwrap(), "\"720p\"");
        assert_eq!(Quality::Sdtv.to_string(), "sdtv");
    }

    #[test]
    fn test_transfer_helpers_keep_handle_invariant() {
        let mut ep = Episode::new(7, "Pilot", EpisodeKey::new(1, 1));
        ep.begin_transfer("2089b05ecca3d829".to_string(), EpisodeStatus::Downloading);
        assert_eq!(ep.download_handle.as_deref(), Some("2089b05ecca3d829"));
        assert!(ep.status.requires_handle());

        ep.end_transfer(EpisodeStatus::NonExisting);
        assert!(ep.download_handle.is_none());
        assert_eq!(ep.status, EpisodeStatus::NonExisting);
    }
}
