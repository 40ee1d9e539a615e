// In-process swarm engine for tests: scripted metadata outcomes and in-memory file bytes.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use magnet_stream_engine::error::{Result, StreamError};
use magnet_stream_engine::source::traits::{
    ByteRange, ByteStream, FileEntry, SwarmEngine, SwarmHandle, TorrentMetadata, TransferStats,
};

const READ_CHUNK: usize = 64;

#[derive(Clone)]
pub struct FakeFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl FakeFile {
    pub fn new(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            data: pattern(size),
        }
    }
}

/// Deterministic file content.
pub fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// How reads of a resolved torrent behave.
#[derive(Clone, Copy, Debug)]
pub enum ReadMode {
    Normal,
    /// The very first read fails.
    FailFirst,
    /// Yields this many chunks, then fails.
    FailAfterChunks(usize),
    /// Each chunk arrives after a delay, like pieces still downloading.
    Delayed(Duration),
}

#[derive(Clone)]
pub enum Behavior {
    Resolve {
        name: String,
        files: Vec<FakeFile>,
        reads: ReadMode,
    },
    /// Metadata never arrives.
    Hang,
    /// Engine reports a fatal error while resolving.
    Fail(String),
}

impl Behavior {
    pub fn resolve(name: &str, files: Vec<FakeFile>) -> Self {
        Behavior::Resolve {
            name: name.to_string(),
            files,
            reads: ReadMode::Normal,
        }
    }

    pub fn with_reads(name: &str, files: Vec<FakeFile>, reads: ReadMode) -> Self {
        Behavior::Resolve {
            name: name.to_string(),
            files,
            reads,
        }
    }
}

#[derive(Default)]
struct Inner {
    behaviors: Mutex<HashMap<String, Behavior>>,
    metadata_delay: Mutex<Option<Duration>>,
    downloaded: Mutex<HashMap<String, Vec<u64>>>,
    added: AtomicUsize,
    destroyed: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Inner>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, info_hash: &str, behavior: Behavior) {
        self.inner
            .behaviors
            .lock()
            .insert(info_hash.to_string(), behavior);
    }

    pub fn set_metadata_delay(&self, delay: Duration) {
        *self.inner.metadata_delay.lock() = Some(delay);
    }

    /// Per-file downloaded counters the engine reports for `info_hash`.
    pub fn set_downloaded(&self, info_hash: &str, downloaded: Vec<u64>) {
        self.inner
            .downloaded
            .lock()
            .insert(info_hash.to_string(), downloaded);
    }

    /// Number of engine handles created so far.
    pub fn added(&self) -> usize {
        self.inner.added.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.inner.destroyed.lock().clone()
    }
}

impl SwarmEngine for FakeEngine {
    fn add(&self, _magnet_uri: &str, info_hash: &str) -> Arc<dyn SwarmHandle> {
        self.inner.added.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeHandle {
            inner: Arc::clone(&self.inner),
            info_hash: info_hash.to_string(),
        })
    }
}

struct FakeHandle {
    inner: Arc<Inner>,
    info_hash: String,
}

impl FakeHandle {
    fn behavior(&self) -> Behavior {
        self.inner
            .behaviors
            .lock()
            .get(&self.info_hash)
            .cloned()
            .unwrap_or_else(|| Behavior::resolve("Default Movie", vec![FakeFile::new("movie.mp4", 1000)]))
    }
}

#[async_trait]
impl SwarmHandle for FakeHandle {
    fn info_hash(&self) -> &str {
        &self.info_hash
    }

    async fn metadata(&self) -> Result<TorrentMetadata> {
        let delay = *self.inner.metadata_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.behavior() {
            Behavior::Resolve { name, files, .. } => Ok(TorrentMetadata {
                info_hash: self.info_hash.clone(),
                name,
                files: files
                    .iter()
                    .map(|f| FileEntry {
                        name: f.name.clone(),
                        size: f.data.len() as u64,
                        path: format!("library/{}", f.name),
                    })
                    .collect(),
            }),
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail(message) => Err(StreamError::EngineFatal(message)),
        }
    }

    async fn stats(&self) -> Result<TransferStats> {
        let file_downloaded = self
            .inner
            .downloaded
            .lock()
            .get(&self.info_hash)
            .cloned()
            .unwrap_or_default();
        Ok(TransferStats {
            progress: 0.5,
            download_speed: 2048.0,
            upload_speed: 512.0,
            num_peers: 3,
            file_downloaded,
        })
    }

    async fn open_read(&self, file_index: usize, range: Option<ByteRange>) -> Result<ByteStream> {
        let Behavior::Resolve { files, reads, .. } = self.behavior() else {
            return Err(StreamError::engine("torrent not resolved"));
        };
        let file = files
            .get(file_index)
            .ok_or_else(|| StreamError::NotFound("no such file".to_string()))?;
        let data = match range {
            Some(r) => file.data[r.start as usize..=r.end as usize].to_vec(),
            None => file.data.clone(),
        };
        let mut chunks: Vec<io::Result<Bytes>> = data
            .chunks(READ_CHUNK)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        match reads {
            ReadMode::Normal => Ok(stream::iter(chunks).boxed()),
            ReadMode::FailFirst => {
                Ok(stream::iter(vec![Err(io::Error::other("piece read failed"))]).boxed())
            }
            ReadMode::FailAfterChunks(n) => {
                chunks.truncate(n);
                chunks.push(Err(io::Error::other("peer connection lost")));
                Ok(stream::iter(chunks).boxed())
            }
            ReadMode::Delayed(delay) => Ok(stream::iter(chunks)
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                })
                .boxed()),
        }
    }

    async fn destroy(&self) {
        self.inner.destroyed.lock().push(self.info_hash.clone());
    }
}

/// Distinct 40-hex info-hash for test number `n`.
pub fn hash(n: usize) -> String {
    format!("{:040x}", n + 1)
}

pub fn magnet(n: usize) -> String {
    format!("magnet:?xt=urn:btih:{}&dn=test{}", hash(n), n)
}
