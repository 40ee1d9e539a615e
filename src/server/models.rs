// JSON payloads of the HTTP API.

use serde::{Deserialize, Serialize};

use crate::engine::session::Session;
use crate::source::traits::TransferStats;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub magnet_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartFile {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub info_hash: String,
    pub name: String,
    pub files: Vec<StartFile>,
    pub stream_url: String,
}

impl From<&Session> for StartResponse {
    fn from(session: &Session) -> Self {
        Self {
            success: true,
            info_hash: session.info_hash().to_string(),
            name: session.name().to_string(),
            files: session
                .files()
                .iter()
                .enumerate()
                .map(|(index, f)| StartFile {
                    index,
                    name: f.name.clone(),
                    size: f.size,
                    path: f.path.clone(),
                })
                .collect(),
            stream_url: session.stream_url(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoFile {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub downloaded: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentInfo {
    pub info_hash: String,
    pub name: String,
    pub progress: f64,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub num_peers: u32,
    pub files: Vec<InfoFile>,
}

impl TorrentInfo {
    pub fn new(session: &Session, stats: &TransferStats) -> Self {
        Self {
            info_hash: session.info_hash().to_string(),
            name: session.name().to_string(),
            progress: stats.progress,
            download_speed: stats.download_speed,
            upload_speed: stats.upload_speed,
            num_peers: stats.num_peers,
            files: session
                .files()
                .iter()
                .enumerate()
                .map(|(index, f)| InfoFile {
                    index,
                    name: f.name.clone(),
                    size: f.size,
                    downloaded: stats.file_downloaded.get(index).copied().unwrap_or(0),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub active_torrents: usize,
    pub uptime: f64,
}
