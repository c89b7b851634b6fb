//! mcp-wire - MCP registry browser CLI

use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use mcp_wire::{
    Cache, Paths, RegistryClient, ServerRecord, SyncCoordinator, SyncObserver, SyncProgress,
};

#[derive(Parser)]
#[command(name = "mcp-wire")]
#[command(about = "Browse the MCP server registry from a locally mirrored catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog servers from the local cache, refreshing in the background
    Browse {
        /// Do not start a background refresh
        #[arg(long)]
        no_refresh: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the local cache (name, title, description)
    Search {
        /// Case-insensitive substring to look for
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch one server's latest version straight from the registry
    Info {
        /// Server name (e.g. io.github.example/weather)
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synchronize the local cache with the registry (blocking)
    Sync,

    /// Show cache freshness and size
    Status,

    /// Show resolved paths (for debugging)
    Paths,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let paths = Paths::resolve();

    match cli.command {
        Commands::Paths => {
            println!("Cache file:   {}", paths.cache_file().display());
            println!("Registry URL: {}", paths.registry_url());
            println!("Cache exists: {}", paths.cache_file().exists());
        }
        Commands::Browse { no_refresh, json } => {
            let coordinator = SyncCoordinator::new(paths.cache_file(), paths.registry_url());
            let enabled = !no_refresh && std::env::var("MCP_WIRE_NO_SYNC").is_err();
            coordinator.ensure_started(enabled);

            if let Some(line) = coordinator.status_line() {
                eprintln!("{}", line);
            }
            let servers = coordinator.snapshot();

            if json {
                print_json(&servers);
            } else {
                if servers.is_empty() {
                    println!("No servers cached yet. Run: mcp-wire sync");
                    return;
                }
                print_server_table(&servers);
            }
        }
        Commands::Search { query, json } => {
            let mut cache = Cache::new(paths.cache_file());
            if let Err(e) = cache.load() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            let servers = cache.search(&query);

            if json {
                print_json(&servers);
            } else {
                if servers.is_empty() {
                    println!("No cached servers match '{}'.", query);
                    return;
                }
                print_server_table(&servers);
            }
        }
        Commands::Info { name, json } => {
            let client = match RegistryClient::new(paths.registry_url()) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match client.get_server(&name) {
                Ok(server) => {
                    if json {
                        print_json(&server);
                    } else {
                        print_server_detail(&server);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Sync => {
            let client = match RegistryClient::new(paths.registry_url()) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let mut cache = Cache::new(paths.cache_file());
            if let Err(e) = cache.load() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            cache.set_observer(Box::new(PrintProgress));
            match cache.sync(&client) {
                Ok(mode) => println!("Synced {} servers ({} sync)", cache.count(), mode),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    eprintln!("Keeping {} previously cached servers.", cache.count());
                    std::process::exit(1);
                }
            }
        }
        Commands::Status => {
            let mut cache = Cache::new(paths.cache_file());
            if let Err(e) = cache.load() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            match cache.last_synced() {
                Some(at) => println!(
                    "Last synced: {}",
                    at.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
                None => println!("Last synced: never"),
            }
            println!("Servers:     {}", cache.count());
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "mcp_wire=debug" } else { "mcp_wire=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints per-page progress during a foreground sync.
struct PrintProgress;

impl SyncObserver for PrintProgress {
    fn on_progress(&self, p: SyncProgress) {
        eprintln!(
            "  page {}: {} fetched, {} cached",
            p.pages, p.fetched, p.cached_count
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_server_table(servers: &[ServerRecord]) {
    const INDENT: &str = "        ";

    for s in servers {
        println!("{}", s.name);
        if let Some(t) = s.title.as_deref().filter(|x| !x.is_empty()) {
            println!("{}Title:       {}", INDENT, t);
        }
        println!("{}Version:     {}", INDENT, s.version);
        if !s.description.is_empty() {
            println!(
                "{}Description: {}",
                INDENT,
                s.description.lines().next().unwrap_or("").trim()
            );
        }
        println!();
    }
}

fn print_server_detail(s: &ServerRecord) {
    const INDENT: &str = "        ";

    println!("{}", s.name);
    if let Some(t) = s.title.as_deref().filter(|x| !x.is_empty()) {
        println!("{}Title:       {}", INDENT, t);
    }
    println!("{}Version:     {}", INDENT, s.version);
    if !s.description.is_empty() {
        println!("{}Description:", INDENT);
        for line in s.description.lines() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                println!("{}{}{}", INDENT, INDENT, trimmed);
            }
        }
    }
    if !s.packages.is_empty() {
        println!("{}Packages:    {}", INDENT, s.packages.len());
    }
    if !s.remotes.is_empty() {
        println!("{}Remotes:     {}", INDENT, s.remotes.len());
    }
    if let Some(meta) = s.official_meta() {
        if let Some(status) = meta.status.as_deref() {
            println!("{}Status:      {}", INDENT, status);
        }
        if let Some(at) = meta.published_at {
            println!(
                "{}Published:   {}",
                INDENT,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
        if let Some(at) = meta.updated_at {
            println!(
                "{}Updated:     {}",
                INDENT,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
    }
}
