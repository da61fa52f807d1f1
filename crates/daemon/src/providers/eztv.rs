//! EZTV-style torrent index, queried by IMDb id.
//!
//! `GET /show/<imdb_id>` returns the show with an `episodes` array; each
//! episode carries a `torrents` object keyed by quality (`"0"` is the
//! standard-definition fallback).

use super::{EpisodeLinks, LinkResolver, ProviderError};
use crate::episode::Quality;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct EztvShow {
    #[serde(default)]
    episodes: Vec<EztvEpisode>,
}

#[derive(Debug, Deserialize)]
struct EztvEpisode {
    season: u32,
    episode: u32,
    #[serde(default)]
    torrents: EztvTorrents,
}

#[derive(Debug, Default, Deserialize)]
struct EztvTorrents {
    #[serde(rename = "0")]
    sd: Option<EztvTorrent>,
    #[serde(rename = "480p")]
    sd480p: Option<EztvTorrent>,
    #[serde(rename = "720p")]
    hd720p: Option<EztvTorrent>,
}

#[derive(Debug, Deserialize)]
struct EztvTorrent {
    #[serde(default)]
    url: String,
}

impl From<EztvEpisode> for EpisodeLinks {
    fn from(ep: EztvEpisode) -> Self {
        let links = [
            (Quality::Hd720p, ep.torrents.hd720p),
            (Quality::Sd480p, ep.torrents.sd480p),
            (Quality::Sdtv, ep.torrents.sd),
        ]
        .into_iter()
        .filter_map(|(quality, torrent)| torrent.map(|t| (quality, t.url)))
        .filter(|(_, url)| !url.is_empty())
        .collect();

        Self {
            season: ep.season,
            episode: ep.episode,
            links,
        }
    }
}

/// HTTP client for an EZTV-compatible API.
#[derive(Debug, Clone)]
pub struct EztvClient {
    client: Client,
    base_url: String,
}

impl EztvClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LinkResolver for EztvClient {
    async fn links_by_external_id(&self, id: &str) -> Result<Vec<EpisodeLinks>, ProviderError> {
        let url = format!("{}/show/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let show: EztvShow = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        debug!(imdb_id = %id, count = show.episodes.len(), "Link index returned episodes");

        Ok(show.episodes.into_iter().map(EpisodeLinks::from).collect())
    }
}
