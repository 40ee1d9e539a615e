// Bounded session registry: deduplicates magnet downloads and evicts the least recently used.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::magnet::{canonical_info_hash, extract_info_hash, is_magnet_uri};
use super::session::Session;
use crate::detect::selector::select_media_file;
use crate::error::{Result, StreamError};
use crate::source::traits::{SwarmEngine, TransferStats};

struct Slot {
    session: Arc<Session>,
    tick: u64,
}

/// Map plus a recency index. Ticks grow strictly, so the first entry of
/// `recency` is always the least recently used session and equal access
/// times fall back to insertion order.
#[derive(Default)]
struct RegistryState {
    slots: HashMap<String, Slot>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    /// Set by `evict_all`; nothing is admitted afterwards.
    closed: bool,
}

impl RegistryState {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn insert(&mut self, session: Arc<Session>) {
        let tick = self.bump();
        let key = session.info_hash().to_string();
        if let Some(old) = self.slots.insert(key.clone(), Slot { session, tick }) {
            self.recency.remove(&old.tick);
        }
        self.recency.insert(tick, key);
    }

    fn touch(&mut self, info_hash: &str) -> Option<Arc<Session>> {
        let tick = self.bump();
        let slot = self.slots.get_mut(info_hash)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, info_hash.to_string());
        slot.session.touch();
        Some(Arc::clone(&slot.session))
    }

    /// Touch `session` only if it is still the registered one for its hash.
    fn touch_session(&mut self, session: &Arc<Session>) {
        let current = self
            .slots
            .get(session.info_hash())
            .is_some_and(|slot| Arc::ptr_eq(&slot.session, session));
        if current {
            self.touch(session.info_hash());
        }
    }

    fn remove(&mut self, info_hash: &str) -> Option<Arc<Session>> {
        let slot = self.slots.remove(info_hash)?;
        self.recency.remove(&slot.tick);
        Some(slot.session)
    }

    /// Oldest session without an open stream, or the oldest overall when all are pinned.
    fn pick_victim(&self) -> Option<String> {
        self.recency
            .values()
            .find(|hash| {
                self.slots
                    .get(hash.as_str())
                    .is_some_and(|slot| !slot.session.is_pinned())
            })
            .or_else(|| self.recency.values().next())
            .cloned()
    }

    /// Remove sessions until at most `limit` remain.
    fn evict_to(&mut self, limit: usize) -> Vec<Arc<Session>> {
        let mut evicted = Vec::new();
        while self.slots.len() > limit {
            let Some(victim) = self.pick_victim() else {
                break;
            };
            if let Some(session) = self.remove(&victim) {
                if session.is_pinned() {
                    warn!(
                        "evicting {} with {} open streams, every session is pinned",
                        victim,
                        session.open_streams()
                    );
                }
                evicted.push(session);
            }
        }
        evicted
    }
}

pub struct SessionRegistry {
    engine: Arc<dyn SwarmEngine>,
    capacity: usize,
    metadata_timeout: Duration,
    state: Mutex<RegistryState>,
    admissions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    admission_tasks: TaskTracker,
    shutdown_token: CancellationToken,
}

fn shutting_down() -> StreamError {
    StreamError::engine("session registry is shutting down")
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn SwarmEngine>, capacity: usize, metadata_timeout: Duration) -> Self {
        info!(
            "session registry initialized capacity={} metadata_timeout={:?}",
            capacity, metadata_timeout
        );
        Self {
            engine,
            capacity: capacity.max(1),
            metadata_timeout,
            state: Mutex::new(RegistryState::default()),
            admissions: Mutex::new(HashMap::new()),
            admission_tasks: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the session for `magnet_uri`, resolving and registering it if needed.
    ///
    /// Resolution runs on its own task so a caller that goes away mid-wait
    /// cannot leave an engine handle behind.
    pub async fn get_or_create(self: &Arc<Self>, magnet_uri: &str) -> Result<Arc<Session>> {
        if !is_magnet_uri(magnet_uri) {
            return Err(StreamError::Validation(
                "Invalid magnet URI format".to_string(),
            ));
        }
        let info_hash = extract_info_hash(magnet_uri).ok_or_else(|| {
            StreamError::Validation("Magnet URI has no btih info-hash".to_string())
        })?;

        {
            let state = self.state.lock();
            if state.closed {
                return Err(shutting_down());
            }
            if let Some(slot) = state.slots.get(&info_hash) {
                info!("torrent {} already registered, reusing session", info_hash);
                return Ok(Arc::clone(&slot.session));
            }
        }

        let registry = Arc::clone(self);
        let magnet_uri = magnet_uri.to_string();
        self.admission_tasks
            .spawn(async move { registry.admit_exclusive(&magnet_uri, &info_hash).await })
            .await
            .map_err(|e| StreamError::engine(format!("admission task failed: {}", e)))?
    }

    /// Look up a session and mark it as accessed.
    pub fn get(&self, info_hash: &str) -> Option<Arc<Session>> {
        self.state.lock().touch(&canonical_info_hash(info_hash))
    }

    /// Look up a session without affecting eviction order.
    pub fn peek(&self, info_hash: &str) -> Option<Arc<Session>> {
        self.state
            .lock()
            .slots
            .get(&canonical_info_hash(info_hash))
            .map(|slot| Arc::clone(&slot.session))
    }

    /// All active sessions, oldest first by creation time.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> = self
            .state
            .lock()
            .slots
            .values()
            .map(|slot| Arc::clone(&slot.session))
            .collect();
        sessions.sort_by_key(|s| s.added_at());
        sessions
    }

    /// Pull fresh stats for `session`. A download that made progress counts as accessed.
    pub async fn refresh_stats(&self, session: &Arc<Session>) -> TransferStats {
        let refresh = session.refresh_stats().await;
        if refresh.advanced {
            self.state.lock().touch_session(session);
        }
        refresh.stats
    }

    /// Close the registry and tear down every session.
    ///
    /// Admissions still waiting for metadata are cancelled and awaited, so no
    /// engine handle outlives this call. Later starts fail.
    pub async fn evict_all(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.recency.clear();
            state.slots.drain().map(|(_, slot)| slot.session).collect()
        };
        self.shutdown_token.cancel();
        self.admission_tasks.close();

        info!(
            "cleaning up {} sessions, {} admissions in flight",
            drained.len(),
            self.admission_tasks.len()
        );
        Self::teardown_all(drained).await;
        self.admission_tasks.wait().await;
    }

    /// Serialise admissions per info-hash, then re-check before resolving.
    async fn admit_exclusive(&self, magnet_uri: &str, info_hash: &str) -> Result<Arc<Session>> {
        let gate = Arc::clone(
            self.admissions
                .lock()
                .entry(info_hash.to_string())
                .or_default(),
        );
        let result = {
            let _guard = gate.lock().await;
            match self.peek(info_hash) {
                Some(existing) => {
                    debug!("torrent {} registered by a concurrent start", info_hash);
                    Ok(existing)
                }
                None => self.admit(magnet_uri, info_hash).await,
            }
        };

        let mut admissions = self.admissions.lock();
        if let Some(current) = admissions.get(info_hash) {
            // Only the map and this task hold the gate: nobody else is waiting.
            if Arc::ptr_eq(current, &gate) && Arc::strong_count(&gate) == 2 {
                admissions.remove(info_hash);
            }
        }
        result
    }

    /// Refresh every session's stats so downloads active in the background
    /// are not picked as eviction victims.
    async fn refresh_all(&self) {
        let sessions = self.sessions();
        join_all(sessions.iter().map(|s| self.refresh_stats(s))).await;
    }

    async fn admit(&self, magnet_uri: &str, info_hash: &str) -> Result<Arc<Session>> {
        if self.state.lock().closed {
            return Err(shutting_down());
        }
        if self.len() >= self.capacity {
            self.refresh_all().await;
        }
        let evicted = self.state.lock().evict_to(self.capacity - 1);
        Self::teardown_all(evicted).await;

        info!("adding torrent {}", info_hash);
        let handle = self.engine.add(magnet_uri, info_hash);

        let resolved = tokio::select! {
            _ = self.shutdown_token.cancelled() => None,
            result = tokio::time::timeout(self.metadata_timeout, handle.metadata()) => Some(result),
        };
        let metadata = match resolved {
            None => {
                info!("torrent {} abandoned during shutdown", handle.info_hash());
                handle.destroy().await;
                return Err(shutting_down());
            }
            Some(Ok(Ok(metadata))) => metadata,
            Some(Ok(Err(e))) => {
                warn!("torrent {} failed before registration: {}", info_hash, e);
                handle.destroy().await;
                return Err(e);
            }
            Some(Err(_)) => {
                warn!(
                    "torrent {} metadata timed out after {:?}",
                    info_hash, self.metadata_timeout
                );
                handle.destroy().await;
                return Err(StreamError::MetadataTimeout {
                    secs: self.metadata_timeout.as_secs(),
                });
            }
        };

        info!("torrent metadata received: {}", metadata.name);
        if metadata.info_hash != handle.info_hash() {
            debug!(
                "engine reported hash {} for {}, keeping magnet hash",
                metadata.info_hash,
                handle.info_hash()
            );
        }

        let Some(selected) = select_media_file(&metadata.files) else {
            warn!("torrent {} has no playable file", info_hash);
            handle.destroy().await;
            return Err(StreamError::NoPlayableFile);
        };

        let session = match Session::new(
            info_hash.to_string(),
            metadata.name,
            metadata.files,
            selected,
            Arc::clone(&handle),
        ) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                handle.destroy().await;
                return Err(e);
            }
        };
        info!(
            "selected video file {} (index {}) for {}",
            session.files()[selected].name,
            selected,
            info_hash
        );

        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                None
            } else {
                let evicted = state.evict_to(self.capacity - 1);
                state.insert(Arc::clone(&session));
                Some(evicted)
            }
        };
        let Some(evicted) = evicted else {
            info!("torrent {} resolved after shutdown, discarding", info_hash);
            session.teardown().await;
            return Err(shutting_down());
        };
        Self::teardown_all(evicted).await;

        Ok(session)
    }

    async fn teardown_all(sessions: Vec<Arc<Session>>) {
        if sessions.is_empty() {
            return;
        }
        for session in &sessions {
            info!("cleaning up old torrent: {}", session.name());
        }
        join_all(sessions.iter().map(|s| s.teardown())).await;
    }
}
