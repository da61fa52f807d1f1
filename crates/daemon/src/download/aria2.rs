//! aria2 JSON-RPC client for tvsync
//!
//! Talks to `aria2c --enable-rpc` over HTTP. When a secret is configured,
//! every call carries `token:<secret>` as its first parameter.

use super::{DownloadDaemon, DownloadError, DownloadOptions, TaskState, TaskStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Fields requested from `aria2.tellStatus`
pub const STATUS_KEYS: &[&str] = &["status", "dir", "files", "followedBy"];

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    status: TaskState,
    dir: Option<String>,
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default)]
    followed_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    version: String,
}

impl From<RawStatus> for TaskStatus {
    fn from(raw: RawStatus) -> Self {
        Self {
            state: raw.status,
            dir: raw.dir.map(PathBuf::from),
            // files not yet allocated report an empty path
            files: raw
                .files
                .into_iter()
                .filter(|f| !f.path.is_empty())
                .map(|f| PathBuf::from(f.path))
                .collect(),
            followed_by: raw.followed_by,
        }
    }
}

/// aria2 JSON-RPC client
#[derive(Debug, Clone)]
pub struct Aria2Client {
    client: Client,
    rpc_url: String,
    secret: Option<String>,
}

impl Aria2Client {
    pub fn new(rpc_url: impl Into<String>, secret: Option<String>) -> Result<Self, DownloadError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            secret,
        })
    }

    /// Build the positional parameter list, prefixing the auth token when set.
    fn params(&self, params: Vec<Value>) -> Vec<Value> {
        match &self.secret {
            Some(secret) => std::iter::once(json!(format!("token:{}", secret)))
                .chain(params)
                .collect(),
            None => params,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, DownloadError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params: self.params(params),
        };
        debug!(method, id = %request.id, "aria2 call");

        // aria2 reports RPC errors with a non-2xx status and a JSON body
        let response = self.client.post(&self.rpc_url).json(&request).send().await?;
        let status = response.status();
        let body: RpcResponse = response.json().await.map_err(|e| {
            DownloadError::Protocol(format!("HTTP {} with undecodable body: {}", status, e))
        })?;

        if let Some(err) = body.error {
            return Err(DownloadError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = body
            .result
            .ok_or_else(|| DownloadError::Protocol(format!("{} returned no result", method)))?;
        serde_json::from_value(result)
            .map_err(|e| DownloadError::Protocol(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl DownloadDaemon for Aria2Client {
    async fn add(&self, url: &str, options: &DownloadOptions) -> Result<String, DownloadError> {
        let opts = json!({ "dir": options.dir.to_string_lossy() });
        self.call("aria2.addUri", vec![json!([url]), opts]).await
    }

    async fn pause(&self, handle: &str) -> Result<(), DownloadError> {
        self.call::<String>("aria2.pause", vec![json!(handle)])
            .await
            .map(|_| ())
    }

    async fn resume(&self, handle: &str) -> Result<(), DownloadError> {
        self.call::<String>("aria2.unpause", vec![json!(handle)])
            .await
            .map(|_| ())
    }

    async fn remove(&self, handle: &str) -> Result<(), DownloadError> {
        self.call::<String>("aria2.remove", vec![json!(handle)])
            .await
            .map(|_| ())
    }

    async fn status(&self, handle: &str) -> Result<TaskStatus, DownloadError> {
        let raw: RawStatus = self
            .call("aria2.tellStatus", vec![json!(handle), json!(STATUS_KEYS)])
            .await?;
        Ok(raw.into())
    }

    async fn version(&self) -> Result<String, DownloadError> {
        let raw: RawVersion = self.call("aria2.getVersion", vec![]).await?;
        Ok(raw.version)
    }
}
