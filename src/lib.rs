//! mcp-wire - MCP registry browser
//!
//! Mirrors the registry's server catalog on disk, serves it instantly, and
//! refreshes it in the background without blocking readers.

pub mod cache;
pub mod client;
pub mod coordinator;
pub mod models;
pub mod paths;

pub use cache::{Cache, CacheError, SyncError, SyncMode, SyncObserver, SyncProgress};
pub use client::{ClientError, ListQuery, RegistryClient};
pub use coordinator::{SyncCoordinator, SyncPhase, SyncStatus};
pub use models::{ApiProblem, CacheStore, ServerPage, ServerRecord};
pub use paths::Paths;
