//! TVMaze metadata resolver.
//!
//! TVMaze needs no API key. Endpoints used:
//! - `GET /search/shows?q=<name>` (first hit is the match)
//! - `GET /shows/<id>/episodes`

use super::{EpisodeMetadata, MetadataResolver, ProviderError, ShowMetadata};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    show: TvMazeShow,
}

#[derive(Debug, Clone, Deserialize)]
struct TvMazeShow {
    id: u64,
    name: String,
    status: Option<String>,
    language: Option<String>,
    updated: Option<i64>,
    externals: Option<TvMazeExternals>,
}

#[derive(Debug, Clone, Deserialize)]
struct TvMazeExternals {
    imdb: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TvMazeEpisode {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    season: u32,
    /// Specials carry no number.
    number: Option<u32>,
    airdate: Option<String>,
}

impl From<TvMazeShow> for ShowMetadata {
    fn from(show: TvMazeShow) -> Self {
        Self {
            id: show.id,
            name: show.name,
            status: show.status,
            language: show.language,
            last_updated: show.updated,
            imdb_id: show.externals.and_then(|e| e.imdb),
        }
    }
}

/// HTTP client for the TVMaze API.
#[derive(Debug, Clone)]
pub struct TvMazeClient {
    client: Client,
    base_url: String,
}

impl TvMazeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MetadataResolver for TvMazeClient {
    async fn lookup_by_name(&self, name: &str) -> Result<Option<ShowMetadata>, ProviderError> {
        info!(query = %name, "Searching TVMaze for show");

        let hits: Vec<SearchHit> = self.get_json("/search/shows", &[("q", name)]).await?;
        debug!(query = %name, count = hits.len(), "TVMaze search returned results");

        Ok(hits.into_iter().next().map(|hit| hit.show.into()))
    }

    async fn episodes(&self, show_id: u64) -> Result<Vec<EpisodeMetadata>, ProviderError> {
        let path = format!("/shows/{}/episodes", show_id);
        let episodes: Vec<TvMazeEpisode> = self.get_json(&path, &[]).await?;
        debug!(show_id, count = episodes.len(), "TVMaze returned episodes");

        Ok(episodes
            .into_iter()
            .filter_map(|ep| {
                Some(EpisodeMetadata {
                    id: ep.id,
                    name: ep.name.unwrap_or_default(),
                    season: ep.season,
                    number: ep.number?,
                    air_date: ep.airdate.filter(|d| !d.is_empty()),
                })
            })
            .collect())
    }
}
