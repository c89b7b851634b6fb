mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{can_bind_localhost, page_json, seed_cache_file, server_json};
use httpmock::Method::GET;
use httpmock::MockServer;
use tempfile::TempDir;

use mcp_wire::{SyncCoordinator, SyncPhase};

fn cache_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("mcp-wire").join("servers.json")
}

fn wait_until_idle(coordinator: &SyncCoordinator) {
    for _ in 0..200 {
        if coordinator.status().phase == SyncPhase::Idle {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("background sync did not finish in time");
}

#[test]
fn concurrent_ensure_started_launches_exactly_one_sync() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v0.1/servers");
        then.status(200).json_body(page_json(
            vec![server_json("io.github.acme/weather", "1.0.0", "forecasts")],
            None,
        ));
    });

    let dir = TempDir::new().unwrap();
    let coordinator = Arc::new(SyncCoordinator::new(cache_path(&dir), &server.base_url()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            std::thread::spawn(move || coordinator.ensure_started(true))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    wait_until_idle(&coordinator);

    // One cold sync means one page request, no matter how many callers raced.
    assert_eq!(mock.hits(), 1);
    assert_eq!(coordinator.snapshot().len(), 1);
    assert!(coordinator.status_line().is_none());
}

#[test]
fn ensure_started_is_a_noop_when_disabled() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200).json_body(page_json(vec![], None));
    });

    let dir = TempDir::new().unwrap();
    let coordinator = SyncCoordinator::new(cache_path(&dir), &server.base_url());
    coordinator.ensure_started(false);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(mock.hits(), 0);
    assert_eq!(coordinator.status().phase, SyncPhase::NotStarted);
    assert!(coordinator.status_line().is_none());
}

#[test]
fn snapshot_falls_back_to_disk_before_any_sync() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    seed_cache_file(
        &path,
        Some("2025-06-01T00:00:00Z"),
        vec![server_json("io.github.acme/weather", "1.0.0", "forecasts")],
    );

    // Deliberately unroutable registry: the fallback must not touch it.
    let coordinator = SyncCoordinator::new(&path, "http://127.0.0.1:9");
    let servers = coordinator.snapshot();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "io.github.acme/weather");
    assert!(coordinator.status_line().is_none());
}

#[test]
fn status_line_reports_mode_aware_progress_while_syncing() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    // Slow registry keeps the sync in flight while we look at the status.
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v0.1/servers");
        then.status(200)
            .json_body(page_json(vec![], None))
            .delay(Duration::from_millis(750));
    });

    // Never-synced cache: the first sync is cold.
    let dir = TempDir::new().unwrap();
    let coordinator = SyncCoordinator::new(cache_path(&dir), &server.base_url());
    coordinator.ensure_started(true);

    assert_eq!(coordinator.status().phase, SyncPhase::Syncing);
    assert_eq!(
        coordinator.status_line().as_deref(),
        Some("Fetching registry catalog... 0 servers so far")
    );
    wait_until_idle(&coordinator);

    // Previously-synced cache: the refresh is incremental.
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    seed_cache_file(
        &path,
        Some("2025-06-01T00:00:00Z"),
        vec![server_json("io.github.acme/weather", "1.0.0", "forecasts")],
    );
    let coordinator = SyncCoordinator::new(&path, &server.base_url());
    coordinator.ensure_started(true);

    assert_eq!(coordinator.status().phase, SyncPhase::Syncing);
    assert_eq!(
        coordinator.status_line().as_deref(),
        Some("Checking registry for updates... 0 changed")
    );
    wait_until_idle(&coordinator);
}

#[test]
fn failed_sync_reports_status_and_keeps_stale_snapshot() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v0.1/servers");
        then.status(503).body("down for maintenance");
    });

    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    seed_cache_file(
        &path,
        Some("2025-06-01T00:00:00Z"),
        vec![
            server_json("io.github.acme/weather", "1.0.0", "forecasts"),
            server_json("io.github.acme/files", "2.1.0", "file access"),
        ],
    );

    let coordinator = SyncCoordinator::new(&path, &server.base_url());
    coordinator.ensure_started(true);
    wait_until_idle(&coordinator);

    let status = coordinator.status();
    assert!(status.last_error.is_some());
    assert_eq!(status.cached_count, 2);
    assert_eq!(
        coordinator.status_line().as_deref(),
        Some("Registry sync failed, using 2 cached servers")
    );

    // The stale snapshot is still served, without rereading the file.
    std::fs::remove_file(&path).unwrap();
    let servers = coordinator.snapshot();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].name, "io.github.acme/weather");
}

#[test]
fn successful_sync_replaces_seed_snapshot_and_clears_status() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v0.1/servers")
            .query_param("updated_since", "2025-06-01T00:00:00Z");
        then.status(200).json_body(page_json(
            vec![server_json("io.github.acme/weather", "1.1.0", "forecasts v2")],
            None,
        ));
    });

    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    seed_cache_file(
        &path,
        Some("2025-06-01T00:00:00Z"),
        vec![server_json("io.github.acme/weather", "1.0.0", "forecasts")],
    );

    let coordinator = SyncCoordinator::new(&path, &server.base_url());
    coordinator.ensure_started(true);
    wait_until_idle(&coordinator);

    let status = coordinator.status();
    assert!(status.last_error.is_none());
    assert_eq!(status.cached_count, 1);
    assert_eq!(status.servers[0].version, "1.1.0");
    assert!(coordinator.status_line().is_none());
}
