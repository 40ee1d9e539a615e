// Swarm engine backed by an rqbit daemon, driven through its HTTP API.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::traits::{
    ByteRange, ByteStream, FileEntry, SwarmEngine, SwarmHandle, TorrentMetadata, TransferStats,
};
use crate::error::{Result, StreamError};

/// rqbit reports speeds in Mbps; convert to bytes per second.
const MBPS_TO_BYTES: f64 = 125_000.0;

pub struct RqbitEngine {
    client: Client,
    base_url: String,
}

impl RqbitEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SwarmEngine for RqbitEngine {
    fn add(&self, magnet_uri: &str, info_hash: &str) -> Arc<dyn SwarmHandle> {
        Arc::new(RqbitHandle {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            magnet_uri: magnet_uri.to_string(),
            info_hash: info_hash.to_string(),
            destroyed: AtomicBool::new(false),
        })
    }
}

pub struct RqbitHandle {
    client: Client,
    base_url: String,
    magnet_uri: String,
    info_hash: String,
    destroyed: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    details: TorrentDetails,
}

#[derive(Debug, Deserialize)]
struct TorrentDetails {
    #[serde(default)]
    info_hash: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    files: Vec<DetailsFile>,
}

#[derive(Debug, Deserialize)]
struct DetailsFile {
    name: String,
    #[serde(default)]
    components: Vec<String>,
    length: u64,
}

#[derive(Debug, Default, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    file_progress: Vec<u64>,
    #[serde(default)]
    progress_bytes: u64,
    #[serde(default)]
    total_bytes: u64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    live: Option<LiveStats>,
}

#[derive(Debug, Deserialize)]
struct LiveStats {
    download_speed: Speed,
    upload_speed: Speed,
    snapshot: LiveSnapshot,
}

#[derive(Debug, Deserialize)]
struct Speed {
    mbps: f64,
}

#[derive(Debug, Deserialize)]
struct LiveSnapshot {
    peer_stats: PeerStats,
}

#[derive(Debug, Deserialize)]
struct PeerStats {
    live: u32,
}

impl From<DetailsFile> for FileEntry {
    fn from(f: DetailsFile) -> Self {
        let path = if f.components.is_empty() {
            f.name.clone()
        } else {
            f.components.join("/")
        };
        let name = f
            .components
            .last()
            .cloned()
            .unwrap_or_else(|| f.name.rsplit('/').next().unwrap_or(&f.name).to_string());
        FileEntry {
            name,
            size: f.length,
            path,
        }
    }
}

impl From<StatsResponse> for TransferStats {
    fn from(s: StatsResponse) -> Self {
        let progress = if s.total_bytes > 0 {
            s.progress_bytes as f64 / s.total_bytes as f64
        } else {
            0.0
        };
        let (download_speed, upload_speed, num_peers) = match &s.live {
            Some(live) => (
                live.download_speed.mbps * MBPS_TO_BYTES,
                live.upload_speed.mbps * MBPS_TO_BYTES,
                live.snapshot.peer_stats.live,
            ),
            None => (0.0, 0.0, 0),
        };
        TransferStats {
            progress,
            download_speed,
            upload_speed,
            num_peers,
            file_downloaded: s.file_progress,
        }
    }
}

impl RqbitHandle {
    fn torrent_url(&self, suffix: &str) -> String {
        format!("{}/torrents/{}/{}", self.base_url, self.info_hash, suffix)
    }

    async fn error_from(resp: reqwest::Response, what: &str) -> StreamError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        warn!("rqbit {} failed status={} body={}", what, status.as_u16(), body);
        StreamError::engine(format!("{} failed: HTTP {} {}", what, status.as_u16(), body))
    }
}

#[async_trait]
impl SwarmHandle for RqbitHandle {
    fn info_hash(&self) -> &str {
        &self.info_hash
    }

    async fn metadata(&self) -> Result<TorrentMetadata> {
        // rqbit answers the add request once the info dictionary is known.
        let resp = self
            .client
            .post(format!("{}/torrents?overwrite=true", self.base_url))
            .body(self.magnet_uri.clone())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from(resp, "add torrent").await);
        }

        let added: AddResponse = resp.json().await?;
        let details = added.details;
        let info_hash = if details.info_hash.is_empty() {
            self.info_hash.clone()
        } else {
            details.info_hash.to_ascii_lowercase()
        };
        let name = details.name.unwrap_or_else(|| info_hash.clone());
        info!(
            "rqbit metadata resolved hash={} name={} files={}",
            info_hash,
            name,
            details.files.len()
        );

        Ok(TorrentMetadata {
            info_hash,
            name,
            files: details.files.into_iter().map(FileEntry::from).collect(),
        })
    }

    async fn stats(&self) -> Result<TransferStats> {
        let resp = self.client.get(self.torrent_url("stats/v1")).send().await?;
        if !resp.status().is_success() {
            return Err(Self::error_from(resp, "stats").await);
        }
        let stats: StatsResponse = resp.json().await?;
        if let Some(err) = stats.error.clone() {
            return Err(StreamError::EngineFatal(err));
        }
        Ok(stats.into())
    }

    async fn open_read(&self, file_index: usize, range: Option<ByteRange>) -> Result<ByteStream> {
        let mut req = self
            .client
            .get(self.torrent_url(&format!("stream/{}", file_index)));
        if let Some(r) = range {
            req = req.header(header::RANGE, format!("bytes={}-{}", r.start, r.end));
        }
        let resp = req.send().await?;

        let status = resp.status();
        debug!(
            "rqbit stream hash={} file={} range={:?} status={}",
            self.info_hash,
            file_index,
            range,
            status.as_u16()
        );
        if !status.is_success() {
            return Err(Self::error_from(resp, "stream").await);
        }
        if range.is_some() && status != StatusCode::PARTIAL_CONTENT {
            return Err(StreamError::engine("engine ignored the range request"));
        }

        Ok(resp.bytes_stream().map(|r| r.map_err(io::Error::other)).boxed())
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.client.post(self.torrent_url("delete")).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("rqbit torrent {} deleted", self.info_hash);
            }
            Ok(resp) => {
                // 404 just means the add never completed on the daemon side.
                warn!(
                    "rqbit delete hash={} status={}",
                    self.info_hash,
                    resp.status().as_u16()
                );
            }
            Err(e) => warn!("rqbit delete hash={} failed: {}", self.info_hash, e),
        }
    }
}
