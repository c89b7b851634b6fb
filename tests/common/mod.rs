#![allow(dead_code)]

use std::net::TcpListener;
use std::path::Path;

use serde_json::{json, Value};

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn server_json(name: &str, version: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "version": version,
    })
}

pub fn page_json(servers: Vec<Value>, next_cursor: Option<&str>) -> Value {
    let count = servers.len();
    match next_cursor {
        Some(c) => json!({ "servers": servers, "metadata": { "count": count, "nextCursor": c } }),
        None => json!({ "servers": servers, "metadata": { "count": count } }),
    }
}

/// Write a pre-populated cache file, creating its directory.
pub fn seed_cache_file(path: &Path, last_synced: Option<&str>, servers: Vec<Value>) {
    let mut store = json!({ "servers": servers });
    if let Some(at) = last_synced {
        store["last_synced"] = json!(at);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, store.to_string()).unwrap();
}
