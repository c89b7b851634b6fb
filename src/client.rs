//! Stateless HTTP client for the registry catalog API.

use std::error::Error;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;
use serde::de::DeserializeOwned;

use crate::models::{ApiProblem, ServerPage, ServerRecord};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 30;

/// Largest page size the registry accepts.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// How much of a non-JSON error body is kept in a synthesized problem.
const BODY_SNIPPET_LEN: usize = 200;

fn build_http_client() -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("mcp-wire/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(15))
        .build()
}

/// Parameters for one page request of the server listing.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Requested page size; clamped to `[1, 100]`, default 30.
    pub limit: Option<u32>,
    /// Opaque cursor from the previous page, passed through verbatim.
    pub cursor: Option<String>,
    /// Server-side substring filter.
    pub search: Option<String>,
    /// Only return records updated after this instant (incremental sync).
    pub updated_since: Option<DateTime<Utc>>,
}

/// Client for the registry's `v0.1` API. Stateless; every call is one request.
pub struct RegistryClient {
    http: reqwest::blocking::Client,
    base_url: Url,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|_| ClientError::BadBaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::BadBaseUrl(base_url.to_string()));
        }
        let http = build_http_client().map_err(ClientError::HttpClient)?;
        Ok(Self { http, base_url })
    }

    /// Fetch one page of the latest-version server listing.
    pub fn list_servers(&self, query: &ListQuery) -> Result<ServerPage, ClientError> {
        let mut url = self.endpoint(&["v0.1", "servers"])?;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("version", "latest");
            pairs.append_pair("limit", &limit.to_string());
            if let Some(cursor) = query.cursor.as_deref().filter(|c| !c.is_empty()) {
                pairs.append_pair("cursor", cursor);
            }
            if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
                pairs.append_pair("search", search);
            }
            if let Some(since) = query.updated_since {
                pairs.append_pair(
                    "updated_since",
                    &since.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
        }
        self.get_json(url)
    }

    /// Fetch the latest version of a single server by name.
    ///
    /// Names contain a `/` (e.g. `io.github.example/weather`), so the name is
    /// sent as a single percent-encoded path segment.
    pub fn get_server(&self, name: &str) -> Result<ServerRecord, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::EmptyName);
        }
        let url = self.endpoint(&["v0.1", "servers", name, "versions", "latest"])?;
        self.get_json(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| ClientError::BadBaseUrl(self.base_url.to_string()))?;
            parts.pop_if_empty();
            parts.extend(segments);
        }
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(ClientError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ClientError::Api(problem_from_response(
                status.as_u16(),
                &body,
            )));
        }

        let body = resp.text().map_err(ClientError::Transport)?;
        serde_json::from_str(&body).map_err(ClientError::Decode)
    }
}

/// Map a non-2xx response to a structured problem.
///
/// Prefers the registry's `application/problem+json` body; falls back to a
/// synthesized problem built from the status code and a body snippet.
fn problem_from_response(status: u16, body: &str) -> ApiProblem {
    if let Ok(mut problem) = serde_json::from_str::<ApiProblem>(body) {
        if problem.title.is_some() || problem.detail.is_some() || problem.problem_type.is_some() {
            if problem.status.is_none() {
                problem.status = Some(status);
            }
            return problem;
        }
    }

    let trimmed = body.trim();
    let detail = if trimmed.is_empty() {
        None
    } else {
        Some(truncate_snippet(trimmed))
    };
    ApiProblem {
        title: Some(format!("HTTP {}", status)),
        status: Some(status),
        detail,
        ..ApiProblem::default()
    }
}

fn truncate_snippet(body: &str) -> String {
    if body.chars().count() <= BODY_SNIPPET_LEN {
        return body.to_string();
    }
    let mut snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
    snippet.push_str("...");
    snippet
}

#[derive(Debug)]
pub enum ClientError {
    /// Rejected before any request was made.
    EmptyName,
    BadBaseUrl(String),
    HttpClient(reqwest::Error),
    /// Connection, DNS or timeout failure; no response was decoded.
    Transport(reqwest::Error),
    /// The registry answered with a non-2xx status.
    Api(ApiProblem),
    Decode(serde_json::Error),
}

impl ClientError {
    /// The structured registry error, when the failure was a non-2xx reply.
    pub fn api_problem(&self) -> Option<&ApiProblem> {
        match self {
            ClientError::Api(p) => Some(p),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::EmptyName => write!(f, "Server name is empty"),
            ClientError::BadBaseUrl(url) => write!(f, "Invalid registry URL: {}", url),
            ClientError::HttpClient(e) => write!(f, "HTTP client error: {}", e),
            ClientError::Transport(e) => {
                write!(f, "Registry request failed: {}", e)?;
                let mut source: Option<&(dyn Error + '_)> = e.source();
                while let Some(s) = source {
                    write!(f, "\n  Caused by: {}", s)?;
                    source = s.source();
                }
                Ok(())
            }
            ClientError::Api(problem) => write!(f, "Registry error: {}", problem),
            ClientError::Decode(e) => write!(f, "Failed to parse registry response: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}
