//! Local mirror of the registry catalog.
//!
//! Owns the in-memory record list and its persisted form on disk. A sync is
//! either cold (full re-fetch, chosen when the store has never synced) or
//! incremental (fetch-and-merge of records updated since the last sync).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::client::{ClientError, ListQuery, RegistryClient};
use crate::models::{CacheStore, ServerRecord};

/// Which synchronization strategy a sync run used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Full catalog re-fetch; runs when the cache has never synced.
    #[default]
    Cold,
    /// Merge of records updated since the last successful sync.
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Cold => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Progress counters handed to the observer after every page.
///
/// `servers` is a defensive copy; observers own it outright and can never
/// reach the cache's internal list through it.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub mode: SyncMode,
    pub pages: u64,
    pub fetched: u64,
    pub updated: u64,
    pub cached_count: usize,
    pub servers: Vec<ServerRecord>,
}

/// Receives sync progress. Called synchronously on whichever thread runs
/// [`Cache::sync`], after every page and once more at completion.
pub trait SyncObserver: Send {
    fn on_progress(&self, progress: SyncProgress);
}

/// In-memory catalog copy bound to one on-disk cache file.
pub struct Cache {
    path: PathBuf,
    store: CacheStore,
    observer: Option<Box<dyn SyncObserver>>,
}

impl Cache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: CacheStore::default(),
            observer: None,
        }
    }

    /// Register the progress observer. See [`SyncObserver`] for the calling
    /// contract.
    pub fn set_observer(&mut self, observer: Box<dyn SyncObserver>) {
        self.observer = Some(observer);
    }

    /// Read the cache file into memory.
    ///
    /// A missing file is an empty store. An unparsable file is reset to an
    /// empty store (with a warning) so the next sync runs cold and re-fetches
    /// everything. Any other I/O failure is an error.
    pub fn load(&mut self) -> Result<(), CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.store = CacheStore::default();
                return Ok(());
            }
            Err(e) => return Err(CacheError::ReadFailed(e)),
        };

        match serde_json::from_str(&content) {
            Ok(store) => self.store = store,
            Err(e) => {
                tracing::warn!(
                    "Discarding unparsable cache file {}: {}",
                    self.path.display(),
                    e
                );
                self.store = CacheStore::default();
            }
        }
        Ok(())
    }

    /// Persist the current store to disk. Creates the cache directory with
    /// restrictive permissions if needed.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent).map_err(CacheError::CreateDir)?;
        }
        let output = serde_json::to_string_pretty(&self.store).map_err(CacheError::Serialize)?;
        std::fs::write(&self.path, output)
            .map_err(|e| CacheError::WriteFailed(e, self.path.clone()))?;
        Ok(())
    }

    /// Synchronize with the registry; cold when never synced, else
    /// incremental. Returns the mode that ran.
    ///
    /// On a page failure the error is returned immediately: `last_synced` is
    /// left untouched and records merged from earlier successful pages stay.
    /// A cold sync additionally persists after every page, so a partial run
    /// is never lost across restarts.
    pub fn sync(&mut self, client: &RegistryClient) -> Result<SyncMode, SyncError> {
        match self.store.last_synced {
            None => {
                self.sync_cold(client)?;
                Ok(SyncMode::Cold)
            }
            Some(since) => {
                self.sync_incremental(client, since)?;
                Ok(SyncMode::Incremental)
            }
        }
    }

    fn sync_cold(&mut self, client: &RegistryClient) -> Result<(), SyncError> {
        let started = Utc::now();
        let mut cursor: Option<String> = None;
        let mut pages = 0u64;

        loop {
            let page = client
                .list_servers(&ListQuery {
                    cursor: cursor.take(),
                    ..ListQuery::default()
                })
                .map_err(SyncError::Fetch)?;
            let next = page.next_cursor().map(String::from);

            tracing::debug!(
                "Cold sync page {}: {} servers, more={}",
                pages + 1,
                page.servers.len(),
                next.is_some()
            );

            // The first successful page replaces whatever was loaded; later
            // pages extend it. A failure before any page leaves the old list.
            if pages == 0 {
                self.store.servers = page.servers;
            } else {
                self.store.servers.extend(page.servers);
            }
            self.save().map_err(SyncError::Persist)?;
            pages += 1;
            self.notify(SyncMode::Cold, pages, self.store.servers.len() as u64, 0);

            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        self.store.last_synced = Some(started);
        self.save().map_err(SyncError::Persist)?;
        self.notify(SyncMode::Cold, pages, self.store.servers.len() as u64, 0);
        Ok(())
    }

    fn sync_incremental(
        &mut self,
        client: &RegistryClient,
        since: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let started = Utc::now();
        let mut index: HashMap<String, usize> = self
            .store
            .servers
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        let mut cursor: Option<String> = None;
        let mut pages = 0u64;
        let mut fetched = 0u64;
        let mut updated = 0u64;

        loop {
            let page = client
                .list_servers(&ListQuery {
                    cursor: cursor.take(),
                    updated_since: Some(since),
                    ..ListQuery::default()
                })
                .map_err(SyncError::Fetch)?;
            let next = page.next_cursor().map(String::from);

            tracing::debug!(
                "Incremental sync page {}: {} changed servers",
                pages + 1,
                page.servers.len()
            );

            fetched += page.servers.len() as u64;
            for record in page.servers {
                match index.get(&record.name) {
                    Some(&slot) => {
                        self.store.servers[slot] = record;
                        updated += 1;
                    }
                    None => {
                        index.insert(record.name.clone(), self.store.servers.len());
                        self.store.servers.push(record);
                    }
                }
            }
            pages += 1;
            self.notify(SyncMode::Incremental, pages, fetched, updated);

            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        self.store.last_synced = Some(started);
        self.save().map_err(SyncError::Persist)?;
        self.notify(SyncMode::Incremental, pages, fetched, updated);
        Ok(())
    }

    fn notify(&self, mode: SyncMode, pages: u64, fetched: u64, updated: u64) {
        if let Some(observer) = &self.observer {
            observer.on_progress(SyncProgress {
                mode,
                pages,
                fetched,
                updated,
                cached_count: self.store.servers.len(),
                servers: self.store.servers.clone(),
            });
        }
    }

    /// All cached records, as an independently owned copy.
    pub fn all(&self) -> Vec<ServerRecord> {
        self.store.servers.clone()
    }

    /// Case-insensitive substring search over name, title and description.
    /// A blank query is equivalent to [`Cache::all`].
    pub fn search(&self, query: &str) -> Vec<ServerRecord> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.all();
        }
        self.store
            .servers
            .iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&query)
                    || s.title
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&query))
                    || s.description.to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.store.last_synced
    }

    pub fn count(&self) -> usize {
        self.store.servers.len()
    }
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(path)
    }
}

#[derive(Debug)]
pub enum CacheError {
    ReadFailed(std::io::Error),
    CreateDir(std::io::Error),
    WriteFailed(std::io::Error, PathBuf),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::ReadFailed(e) => write!(f, "Failed to read cache file: {}", e),
            CacheError::CreateDir(e) => write!(f, "Failed to create cache directory: {}", e),
            CacheError::WriteFailed(e, path) => {
                write!(f, "Failed to write {}: {}", path.display(), e)
            }
            CacheError::Serialize(e) => write!(f, "Failed to serialize cache: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

#[derive(Debug)]
pub enum SyncError {
    Fetch(ClientError),
    Persist(CacheError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Fetch(e) => write!(f, "Sync fetch failed: {}", e),
            SyncError::Persist(e) => write!(f, "Sync could not persist cache: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, title: Option<&str>, description: &str) -> ServerRecord {
        ServerRecord {
            name: name.to_string(),
            title: title.map(String::from),
            description: description.to_string(),
            version: "1.0.0".to_string(),
            ..ServerRecord::default()
        }
    }

    fn cache_with(servers: Vec<ServerRecord>) -> Cache {
        let mut cache = Cache::new("/nonexistent/servers.json");
        cache.store.servers = servers;
        cache
    }

    #[test]
    fn blank_search_equals_all() {
        let cache = cache_with(vec![record("a/x", None, ""), record("b/y", None, "")]);
        assert_eq!(cache.search("").len(), 2);
        assert_eq!(cache.search("   ").len(), 2);
        assert_eq!(cache.search("").len(), cache.all().len());
    }

    #[test]
    fn search_matches_name_title_and_description_case_insensitively() {
        let cache = cache_with(vec![
            record("io.github.acme/weather", None, "forecasts"),
            record("io.github.acme/files", Some("File Browser"), "local disk"),
            record("io.github.other/db", None, "Weather history database"),
        ]);

        let by_name = cache.search("WEATHER");
        assert_eq!(by_name.len(), 2);

        let by_title = cache.search("file browser");
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].name, "io.github.acme/files");

        let by_description = cache.search("Disk");
        assert_eq!(by_description.len(), 1);

        assert!(cache.search("nope").is_empty());
    }

    #[test]
    fn all_returns_independent_copies() {
        let cache = cache_with(vec![record("a/x", None, "")]);
        let mut first = cache.all();
        first[0].name = "mutated".to_string();
        let second = cache.all();
        assert_eq!(second[0].name, "a/x");
    }

    #[test]
    fn load_missing_file_yields_empty_store() {
        let mut cache = Cache::new("/definitely/not/here/servers.json");
        cache.load().unwrap();
        assert_eq!(cache.count(), 0);
        assert!(cache.last_synced().is_none());
    }
}
