// Swarm session: one resolved magnet download bound to its engine handle.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::stats::StatsCollector;
use crate::error::{Result, StreamError};
use crate::source::traits::{ByteRange, ByteStream, FileEntry, SwarmHandle, TransferStats};

pub(crate) struct StatsRefresh {
    pub stats: TransferStats,
    /// Some file gained downloaded bytes since the previous refresh.
    pub advanced: bool,
}

pub struct Session {
    info_hash: String,
    name: String,
    files: Vec<FileEntry>,
    selected_file: usize,
    handle: Arc<dyn SwarmHandle>,
    stats: StatsCollector,
    added_at: Instant,
    last_accessed: Mutex<Instant>,
    open_streams: AtomicUsize,
    destroyed: AtomicBool,
}

impl Session {
    /// Build a session for resolved metadata. `selected_file` must index `files`.
    pub fn new(
        info_hash: String,
        name: String,
        files: Vec<FileEntry>,
        selected_file: usize,
        handle: Arc<dyn SwarmHandle>,
    ) -> Result<Self> {
        if selected_file >= files.len() {
            return Err(StreamError::NotFound(format!(
                "selected file {} out of range ({} files)",
                selected_file,
                files.len()
            )));
        }
        let now = Instant::now();
        Ok(Self {
            info_hash,
            name,
            stats: StatsCollector::new(files.len()),
            files,
            selected_file,
            handle,
            added_at: now,
            last_accessed: Mutex::new(now),
            open_streams: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn info_hash(&self) -> &str {
        &self.info_hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index)
    }

    /// Index of the playable file chosen at creation.
    pub fn selected_file(&self) -> usize {
        self.selected_file
    }

    pub fn stream_url(&self) -> String {
        format!("/api/stream/{}/{}", self.info_hash, self.selected_file)
    }

    pub fn added_at(&self) -> Instant {
        self.added_at
    }

    pub fn last_accessed(&self) -> Instant {
        *self.last_accessed.lock()
    }

    /// Refresh the last-accessed timestamp. Never moves it backwards.
    pub(crate) fn touch(&self) {
        let mut last = self.last_accessed.lock();
        *last = (*last).max(Instant::now());
    }

    /// Number of response bodies currently reading from this session.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self) -> bool {
        self.open_streams() > 0
    }

    pub fn stats(&self) -> TransferStats {
        self.stats.snapshot()
    }

    pub fn bytes_served(&self) -> u64 {
        self.stats.total_served()
    }

    /// Pull fresh counters from the engine. A failed refresh keeps the last snapshot.
    pub(crate) async fn refresh_stats(&self) -> StatsRefresh {
        let advanced = match self.handle.stats().await {
            Ok(update) => self.stats.merge(update),
            Err(e) => {
                warn!("stats refresh failed for {}: {}", self.info_hash, e);
                false
            }
        };
        StatsRefresh {
            stats: self.stats.snapshot(),
            advanced,
        }
    }

    /// Open an independent read source over one file, pinning the session until it drops.
    pub async fn open_read(
        self: &Arc<Self>,
        file_index: usize,
        range: Option<ByteRange>,
    ) -> Result<SessionStream> {
        if file_index >= self.files.len() {
            return Err(StreamError::NotFound("File not found".to_string()));
        }

        // Pin before awaiting the engine so eviction can't pick us mid-open.
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let lease = StreamLease {
            session: Arc::clone(self),
        };
        let inner = self.handle.open_read(file_index, range).await?;
        debug!(
            "stream opened session={} file={} range={:?} open={}",
            self.info_hash,
            file_index,
            range,
            self.open_streams()
        );
        Ok(SessionStream { inner, lease })
    }

    /// Tear down the engine handle. Later calls are no-ops.
    pub async fn teardown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "destroying session {} ({}) served={} open_streams={}",
            self.info_hash,
            self.name,
            self.bytes_served(),
            self.open_streams()
        );
        self.handle.destroy().await;
    }
}

struct StreamLease {
    session: Arc<Session>,
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        let left = self.session.open_streams.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(
            "stream closed session={} open={}",
            self.session.info_hash, left
        );
    }
}

/// Engine byte stream that keeps its session pinned and counts served bytes.
pub struct SessionStream {
    inner: ByteStream,
    lease: StreamLease,
}

impl Stream for SessionStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &poll {
            self.lease.session.stats.record_served(chunk.len() as u64);
        }
        poll
    }
}
