//! Data structures for the registry API and the on-disk cache file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One catalog entry, as returned by `GET /v0.1/servers`.
///
/// `name` is the primary key (reverse-DNS with a `/` segment, e.g.
/// `io.github.example/weather`). Transport and package payloads are kept
/// opaque; the cache stores them but never interprets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<serde_json::Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ServerMeta>,
}

impl ServerRecord {
    /// Registry-managed metadata, if the registry attached any.
    pub fn official_meta(&self) -> Option<&RegistryMeta> {
        self.meta.as_ref().and_then(|m| m.official.as_ref())
    }
}

/// The `_meta` envelope on a server record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerMeta {
    #[serde(
        rename = "io.modelcontextprotocol.registry/official",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub official: Option<RegistryMeta>,
}

/// Registry-managed metadata attached to each record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One page of the paginated server listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerPage {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

impl ServerPage {
    /// Cursor for the next page. `None` means this was the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.metadata
            .next_cursor
            .as_deref()
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// The persisted cache file at `<cache-dir>/mcp-wire/servers.json`.
///
/// `last_synced` stays `None` until the first successful sync; that absence
/// is the sole signal that the next sync must be a full (cold) one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
}

/// RFC 9457 problem document returned by the registry on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiProblem {
    #[serde(rename = "type", default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

/// Field-level validation error inside a problem document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl std::fmt::Display for ApiProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.title.as_deref(), self.detail.as_deref()) {
            (Some(t), Some(d)) => write!(f, "{}: {}", t, d)?,
            (Some(t), None) => write!(f, "{}", t)?,
            (None, Some(d)) => write!(f, "{}", d)?,
            (None, None) => write!(f, "registry error")?,
        }
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        for e in &self.errors {
            write!(
                f,
                "\n  {}: {}",
                e.location.as_deref().unwrap_or("?"),
                e.message.as_deref().unwrap_or("invalid value"),
            )?;
        }
        Ok(())
    }
}
