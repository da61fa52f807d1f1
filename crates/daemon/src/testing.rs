//! Test doubles shared by the unit tests of this crate.

use crate::download::{DownloadDaemon, DownloadError, DownloadOptions, TaskState, TaskStatus};
use crate::providers::{
    EpisodeLinks, EpisodeMetadata, LinkResolver, MetadataResolver, ProviderError, ShowMetadata,
};
use crate::episode::Quality;
use async_trait::async_trait;
use axum::Router;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn show(id: u64, name: &str, imdb_id: Option<&str>) -> ShowMetadata {
    ShowMetadata {
        id,
        name: name.to_string(),
        status: Some("Running".to_string()),
        language: Some("English".to_string()),
        last_updated: Some(1_700_000_000),
        imdb_id: imdb_id.map(str::to_string),
    }
}

pub fn listing_entry(id: u64, season: u32, number: u32, air_date: Option<&str>) -> EpisodeMetadata {
    EpisodeMetadata {
        id,
        name: format!("Episode {}x{:02}", season, number),
        season,
        number,
        air_date: air_date.map(str::to_string),
    }
}

pub fn links(season: u32, episode: u32, entries: &[(Quality, &str)]) -> EpisodeLinks {
    EpisodeLinks {
        season,
        episode,
        links: entries.iter().map(|(q, u)| (*q, u.to_string())).collect(),
    }
}

/// Metadata resolver answering from fixed tables keyed by folder name.
#[derive(Default)]
pub struct FakeMetadata {
    shows: HashMap<String, ShowMetadata>,
    episodes: HashMap<u64, Vec<EpisodeMetadata>>,
    failing: HashSet<String>,
}

impl FakeMetadata {
    pub fn with_show(mut self, folder: &str, show: ShowMetadata, listing: Vec<EpisodeMetadata>) -> Self {
        self.episodes.insert(show.id, listing);
        self.shows.insert(folder.to_string(), show);
        self
    }

    /// `folder` resolves to `show`, but its episode listing is unavailable.
    pub fn with_unlisted_show(mut self, folder: &str, show: ShowMetadata) -> Self {
        self.shows.insert(folder.to_string(), show);
        self
    }

    /// Lookups for `folder` fail with a transport-like error.
    pub fn failing_for(mut self, folder: &str) -> Self {
        self.failing.insert(folder.to_string());
        self
    }
}

#[async_trait]
impl MetadataResolver for FakeMetadata {
    async fn lookup_by_name(&self, name: &str) -> Result<Option<ShowMetadata>, ProviderError> {
        if self.failing.contains(name) {
            return Err(ProviderError::Status(503));
        }
        Ok(self.shows.get(name).cloned())
    }

    async fn episodes(&self, show_id: u64) -> Result<Vec<EpisodeMetadata>, ProviderError> {
        self.episodes
            .get(&show_id)
            .cloned()
            .ok_or(ProviderError::Status(404))
    }
}

/// Link resolver answering from a fixed table keyed by external id.
#[derive(Default)]
pub struct FakeLinks {
    links: HashMap<String, Vec<EpisodeLinks>>,
    failing: bool,
}

impl FakeLinks {
    pub fn with_links(mut self, imdb_id: &str, links: Vec<EpisodeLinks>) -> Self {
        self.links.insert(imdb_id.to_string(), links);
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl LinkResolver for FakeLinks {
    async fn links_by_external_id(&self, id: &str) -> Result<Vec<EpisodeLinks>, ProviderError> {
        if self.failing {
            return Err(ProviderError::Decode("index offline".to_string()));
        }
        Ok(self.links.get(id).cloned().unwrap_or_default())
    }
}

pub fn task(state: TaskState, files: &[PathBuf]) -> TaskStatus {
    TaskStatus {
        state,
        dir: None,
        files: files.to_vec(),
        followed_by: Vec::new(),
    }
}

#[derive(Default)]
struct FakeDaemonState {
    calls: Vec<String>,
    issued: u32,
    failing: HashSet<&'static str>,
    /// Scripted `status` answers per handle; `None` is a failed poll.
    /// The last entry repeats once the script is exhausted.
    scripts: HashMap<String, VecDeque<Option<TaskStatus>>>,
    polls: HashMap<String, usize>,
}

/// In-memory download daemon recording every call.
///
/// Handles are issued as `gid-1`, `gid-2`, ... Unscripted handles report
/// `active` forever.
#[derive(Default)]
pub struct FakeDaemon {
    state: Mutex<FakeDaemonState>,
}

impl FakeDaemon {
    /// Make every call of `op` (`add`, `pause`, `resume`, `remove`, `version`) fail.
    pub fn fail_on(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    pub fn script(&self, handle: &str, answers: Vec<Option<TaskStatus>>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(handle.to_string(), answers.into());
    }

    /// Calls other than status polls, formatted as `"<op> <arg>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn polls(&self, handle: &str) -> usize {
        self.state.lock().unwrap().polls.get(handle).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str, arg: &str) -> Result<(), DownloadError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", op, arg));
        if state.failing.contains(op) {
            return Err(DownloadError::Rpc {
                code: 1,
                message: format!("{} refused", op),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadDaemon for FakeDaemon {
    async fn add(&self, url: &str, _options: &DownloadOptions) -> Result<String, DownloadError> {
        self.record("add", url)?;
        let mut state = self.state.lock().unwrap();
        state.issued += 1;
        Ok(format!("gid-{}", state.issued))
    }

    async fn pause(&self, handle: &str) -> Result<(), DownloadError> {
        self.record("pause", handle)
    }

    async fn resume(&self, handle: &str) -> Result<(), DownloadError> {
        self.record("resume", handle)
    }

    async fn remove(&self, handle: &str) -> Result<(), DownloadError> {
        self.record("remove", handle)
    }

    async fn status(&self, handle: &str) -> Result<TaskStatus, DownloadError> {
        let mut state = self.state.lock().unwrap();
        *state.polls.entry(handle.to_string()).or_default() += 1;

        let answer = match state.scripts.get_mut(handle) {
            Some(script) if script.len() > 1 => script.pop_front().flatten(),
            Some(script) => script.front().cloned().flatten(),
            None => Some(task(TaskState::Active, &[])),
        };
        answer.ok_or_else(|| DownloadError::Protocol("status unavailable".to_string()))
    }

    async fn version(&self) -> Result<String, DownloadError> {
        self.record("version", "")?;
        Ok("1.37.0".to_string())
    }
}
