//! Path and registry URL resolution.
//!
//! Uses env vars when set, otherwise platform defaults.

use std::path::{Path, PathBuf};

/// Default registry endpoint (the official MCP registry).
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.modelcontextprotocol.io";

/// Resolved locations for the cache file and registry endpoint.
#[derive(Debug, Clone)]
pub struct Paths {
    cache_file: PathBuf,
    registry_url: String,
}

impl Paths {
    /// Resolve from environment, falling back to the platform cache dir.
    ///
    /// `MCP_WIRE_CACHE_DIR` overrides the cache directory (tilde expanded);
    /// `MCP_WIRE_REGISTRY_URL` overrides the registry endpoint. When the
    /// platform cache directory cannot be determined the cache lands in
    /// `./.cache/mcp-wire/`.
    pub fn resolve() -> Self {
        let cache_dir = env_path("MCP_WIRE_CACHE_DIR")
            .or_else(|| dirs::cache_dir().map(|p| p.join("mcp-wire")))
            .unwrap_or_else(|| PathBuf::from("./.cache/mcp-wire"));

        let registry_url = env_string("MCP_WIRE_REGISTRY_URL")
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());

        Self {
            cache_file: cache_dir.join("servers.json"),
            registry_url,
        }
    }

    /// The on-disk cache file (`.../mcp-wire/servers.json`).
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Base URL of the registry API.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }
}

fn env_string(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    env_string(var).map(|v| expand_tilde(&v))
}

fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}
