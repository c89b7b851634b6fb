//! Background refresh of the registry cache.
//!
//! One coordinator is constructed at the composition root and handed to
//! whichever commands need catalog data. It starts at most one background
//! sync per process, mirrors the sync's progress into a lock-protected
//! snapshot, and serves readers without ever blocking on network I/O.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::{Cache, SyncMode, SyncObserver, SyncProgress};
use crate::client::RegistryClient;
use crate::models::ServerRecord;

/// Lifecycle of the background sync. `Idle` never transitions back to
/// `Syncing`; a coordinator refreshes at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    NotStarted,
    Syncing,
    Idle,
}

/// Point-in-time copy of the coordinator's state, safe to hand out.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub mode: SyncMode,
    pub pages: u64,
    pub fetched: u64,
    pub updated: u64,
    pub cached_count: usize,
    pub last_error: Option<String>,
    pub servers: Vec<ServerRecord>,
}

pub struct SyncCoordinator {
    cache_file: PathBuf,
    registry_url: String,
    /// One-shot gate: exactly one caller of `ensure_started` flips this.
    started: AtomicBool,
    state: Arc<RwLock<SyncStatus>>,
}

impl SyncCoordinator {
    pub fn new(cache_file: impl Into<PathBuf>, registry_url: &str) -> Self {
        Self {
            cache_file: cache_file.into(),
            registry_url: registry_url.to_string(),
            started: AtomicBool::new(false),
            state: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Start the background sync if it has not started yet.
    ///
    /// No-op when `enabled` is false. Safe to call from any number of racing
    /// call sites: the atomic gate lets exactly one of them seed the snapshot
    /// from disk and spawn the sync thread; the rest return immediately.
    pub fn ensure_started(&self, enabled: bool) {
        if !enabled {
            return;
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        // Seed from disk (local-only, cheap) so a reader arriving before the
        // network sync finishes still sees the last known-good catalog.
        let mut seed = Cache::new(&self.cache_file);
        if let Err(e) = seed.load() {
            tracing::warn!("Could not read cache for seeding: {}", e);
        }
        {
            let mut state = write_lock(&self.state);
            state.phase = SyncPhase::Syncing;
            state.mode = if seed.last_synced().is_none() {
                SyncMode::Cold
            } else {
                SyncMode::Incremental
            };
            state.cached_count = seed.count();
            state.servers = seed.all();
        }

        let state = Arc::clone(&self.state);
        let cache_file = self.cache_file.clone();
        let registry_url = self.registry_url.clone();
        std::thread::spawn(move || run_sync(state, cache_file, registry_url));
    }

    /// Latest known record list, as an independently owned copy.
    ///
    /// Once a sync has started this only reads the maintained snapshot. If no
    /// sync has ever started it falls back to a synchronous local-only load.
    /// Never touches the network.
    pub fn snapshot(&self) -> Vec<ServerRecord> {
        {
            let state = read_lock(&self.state);
            if state.phase != SyncPhase::NotStarted {
                return state.servers.clone();
            }
        }
        let mut cache = Cache::new(&self.cache_file);
        if cache.load().is_err() {
            return Vec::new();
        }
        cache.all()
    }

    /// Full copy of the current progress snapshot.
    pub fn status(&self) -> SyncStatus {
        read_lock(&self.state).clone()
    }

    /// One-line human status, derived purely from the locked snapshot.
    ///
    /// `None` when no sync has started or the last sync succeeded; progress
    /// wording while syncing; a stale-data notice when the sync failed.
    pub fn status_line(&self) -> Option<String> {
        let state = read_lock(&self.state);
        match state.phase {
            SyncPhase::NotStarted => None,
            SyncPhase::Syncing => Some(match state.mode {
                SyncMode::Cold => format!(
                    "Fetching registry catalog... {} servers so far",
                    state.fetched
                ),
                SyncMode::Incremental => format!(
                    "Checking registry for updates... {} changed",
                    state.fetched
                ),
            }),
            SyncPhase::Idle => state.last_error.as_ref().map(|_| {
                format!(
                    "Registry sync failed, using {} cached servers",
                    state.cached_count
                )
            }),
        }
    }
}

/// Body of the background thread: fresh cache + client, observer wired into
/// the shared state, one sync, final snapshot recorded under the write lock.
fn run_sync(state: Arc<RwLock<SyncStatus>>, cache_file: PathBuf, registry_url: String) {
    let client = match RegistryClient::new(&registry_url) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Background sync could not start: {}", e);
            let mut s = write_lock(&state);
            s.phase = SyncPhase::Idle;
            s.last_error = Some(e.to_string());
            return;
        }
    };

    let mut cache = Cache::new(&cache_file);
    // Baseline from disk, in case the sync fails before merging anything.
    if let Err(e) = cache.load() {
        tracing::warn!("Background sync could not read cache: {}", e);
    }
    cache.set_observer(Box::new(StateObserver {
        state: Arc::clone(&state),
    }));

    let result = cache.sync(&client);

    let mut s = write_lock(&state);
    s.phase = SyncPhase::Idle;
    s.cached_count = cache.count();
    s.servers = cache.all();
    match result {
        Ok(mode) => {
            s.mode = mode;
            s.last_error = None;
            tracing::debug!("Background {} sync finished: {} servers", mode, s.cached_count);
        }
        Err(e) => {
            tracing::warn!("Background sync failed: {}", e);
            s.last_error = Some(e.to_string());
        }
    }
}

/// Mirrors each progress event into the shared state.
///
/// Runs on the background sync thread, synchronously from inside
/// [`Cache::sync`]; every event rewrites the snapshot wholesale and clears
/// any previously recorded error.
struct StateObserver {
    state: Arc<RwLock<SyncStatus>>,
}

impl SyncObserver for StateObserver {
    fn on_progress(&self, progress: SyncProgress) {
        let mut state = write_lock(&self.state);
        state.mode = progress.mode;
        state.pages = progress.pages;
        state.fetched = progress.fetched;
        state.updated = progress.updated;
        state.cached_count = progress.cached_count;
        state.servers = progress.servers;
        state.last_error = None;
    }
}

// Lock poisoning only happens if a sync thread panicked mid-update; the
// snapshot it left behind is still the best data available, so keep serving.
fn read_lock(state: &RwLock<SyncStatus>) -> RwLockReadGuard<'_, SyncStatus> {
    state.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock(state: &RwLock<SyncStatus>) -> RwLockWriteGuard<'_, SyncStatus> {
    state.write().unwrap_or_else(|e| e.into_inner())
}
