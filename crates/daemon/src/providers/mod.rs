//! External metadata and link providers.
//!
//! Both collaborators sit behind async traits so the reconciler can be driven
//! by the HTTP clients in production and by fakes in tests.

pub mod eztv;
pub mod tvmaze;

use crate::episode::{EpisodeKey, Quality};
use async_trait::async_trait;
use thiserror::Error;

pub use eztv::EztvClient;
pub use tvmaze::TvMazeClient;

/// Failure talking to a metadata or link provider.
///
/// Always recoverable: the reconciler degrades the affected series.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {0}")]
    Status(u16),

    #[error("Malformed provider response: {0}")]
    Decode(String),
}

/// Canonical show identity returned by a name lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowMetadata {
    pub id: u64,
    pub name: String,
    pub status: Option<String>,
    pub language: Option<String>,
    pub last_updated: Option<i64>,
    pub imdb_id: Option<String>,
}

/// One entry of a show's episode listing.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeMetadata {
    pub id: u64,
    pub name: String,
    pub season: u32,
    pub number: u32,
    /// Raw `YYYY-MM-DD` air date as reported; parsed by the reconciler.
    pub air_date: Option<String>,
}

impl EpisodeMetadata {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.season, self.number)
    }
}

/// Quality-tagged links for one episode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpisodeLinks {
    pub season: u32,
    pub episode: u32,
    pub links: Vec<(Quality, String)>,
}

impl EpisodeLinks {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.season, self.episode)
    }

    /// The single most preferred non-empty link (720p > 480p > sdtv).
    pub fn best(&self) -> Option<(Quality, &str)> {
        self.links
            .iter()
            .filter(|(_, url)| !url.is_empty())
            .min_by_key(|(quality, _)| *quality)
            .map(|(quality, url)| (*quality, url.as_str()))
    }
}

/// Resolves a folder name to a canonical show and lists its episodes.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// `Ok(None)` when the provider knows no show by that name.
    async fn lookup_by_name(&self, name: &str) -> Result<Option<ShowMetadata>, ProviderError>;

    async fn episodes(&self, show_id: u64) -> Result<Vec<EpisodeMetadata>, ProviderError>;
}

/// Lists download links for a show by its external cross-reference id.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn links_by_external_id(&self, id: &str) -> Result<Vec<EpisodeLinks>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(entries: &[(Quality, &str)]) -> EpisodeLinks {
        EpisodeLinks {
            season: 1,
            episode: 1,
            links: entries.iter().map(|(q, u)| (*q, u.to_string())).collect(),
        }
    }

    #[test]
    fn test_best_prefers_720p_over_sd() {
        let l = links(&[(Quality::Sdtv, "magnet:sd"), (Quality::Hd720p, "magnet:hd")]);
        assert_eq!(l.best(), Some((Quality::Hd720p, "magnet:hd")));
    }

    #[test]
    fn test_best_prefers_480p_over_sd() {
        let l = links(&[(Quality::Sdtv, "magnet:sd"), (Quality::Sd480p, "magnet:480")]);
        assert_eq!(l.best(), Some((Quality::Sd480p, "magnet:480")));
    }

    #[test]
    fn test_best_skips_empty_urls() {
        let l = links(&[(Quality::Hd720p, ""), (Quality::Sdtv, "magnet:sd")]);
        assert_eq!(l.best(), Some((Quality::Sdtv, "magnet:sd")));
    }

    #[test]
    fn test_best_none_without_links() {
        assert_eq!(links(&[]).best(), None);
        assert_eq!(links(&[(Quality::Hd720p, "")]).best(), None);
    }
}
