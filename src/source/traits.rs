use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// Progressive body produced by the engine. Items arrive as the swarm delivers pieces.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// One file of a resolved torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub path: String,
}

pub struct TorrentMetadata {
    pub info_hash: String,
    pub name: String,
    pub files: Vec<FileEntry>,
}

/// Inclusive byte range `[start, end]` within a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Engine-reported transfer counters for one download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferStats {
    /// Ratio of verified bytes, in [0, 1].
    pub progress: f64,
    /// Bytes per second.
    pub download_speed: f64,
    /// Bytes per second.
    pub upload_speed: f64,
    pub num_peers: u32,
    /// Downloaded bytes per file, indexed like the metadata file list.
    pub file_downloaded: Vec<u64>,
}

/// Swarm engine: owns peer discovery and piece transfer for every download.
pub trait SwarmEngine: Send + Sync {
    /// Begin resolving `magnet_uri`. No I/O happens until the handle is polled.
    fn add(&self, magnet_uri: &str, info_hash: &str) -> Arc<dyn SwarmHandle>;
}

/// A single download managed by the engine.
#[async_trait]
pub trait SwarmHandle: Send + Sync {
    fn info_hash(&self) -> &str;

    /// Resolves once metadata is known, or with the engine's fatal error.
    async fn metadata(&self) -> Result<TorrentMetadata>;

    async fn stats(&self) -> Result<TransferStats>;

    /// Open a read source over one file. `None` reads the whole file.
    async fn open_read(&self, file_index: usize, range: Option<ByteRange>) -> Result<ByteStream>;

    /// Release peers, storage handles and anything else tied to this download.
    async fn destroy(&self);
}
