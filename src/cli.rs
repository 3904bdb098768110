//! Command-line interface
//!
//! Exit codes: 0 success, 1 user/config error, 2 failing preflight (missing
//! vault or unopenable index when a command needs one).

use std::sync::Arc;

use clap::{Parser, Subcommand};

use context_vault::config::Config;
use context_vault::mcp::{serve_stdio, VaultServer};
use context_vault::search::SearchOptions;
use context_vault::store::ListQuery;
use context_vault::{capture, embedder, status, vault, Store, VaultError};

#[derive(Parser)]
#[command(name = "context-vault", version, about = "Persistent memory for AI agents")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Vault directory (overrides config and CONTEXT_VAULT_DIR)
    #[arg(long, global = true, env = "CONTEXT_VAULT_DIR")]
    pub vault_dir: Option<std::path::PathBuf>,

    /// State directory holding config.json and the index
    #[arg(long, global = true, env = "CONTEXT_VAULT_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    /// Index database path
    #[arg(long, global = true, env = "CONTEXT_VAULT_DB_PATH")]
    pub db_path: Option<std::path::PathBuf>,

    /// Deployment mode: local or hosted
    #[arg(long, global = true)]
    pub mode: Option<context_vault::config::Mode>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the vault directory layout and marker file
    Init,
    /// Serve MCP tools over stdio
    Serve,
    /// Reconcile the index with the vault directory
    Reindex {
        /// Also remove rows whose files are gone (full sync)
        #[arg(long)]
        full: bool,
    },
    /// Search entries (hybrid FTS + vector)
    Search {
        query: String,
        /// Maximum results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Restrict to one kind
        #[arg(long)]
        kind: Option<String>,
    },
    /// List entries newest-first
    List {
        #[arg(long)]
        kind: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the vault health report as JSON
    Status,
    /// Delete expired entries and their files
    Prune,
    /// Delete one entry by id
    Delete { id: String },
}

/// Run the parsed CLI; returns the process exit code.
pub fn run_with(cli: Cli) -> i32 {
    let config = resolved_config(&cli);

    let outcome = match &cli.command {
        Command::Init => cmd_init(&config),
        Command::Serve => return cmd_serve(&config),
        Command::Reindex { full } => with_store(&config, |store, cfg| cmd_reindex(store, cfg, *full)),
        Command::Search { query, limit, kind } => with_store(&config, |store, _| {
            cmd_search(store, query, *limit, kind.clone())
        }),
        Command::List { kind, limit } => {
            with_store(&config, |store, _| cmd_list(store, kind.clone(), *limit))
        }
        Command::Status => with_store(&config, cmd_status),
        Command::Prune => with_store(&config, |store, _| {
            let count = capture::prune(store)?;
            println!("Pruned {count} expired entries");
            Ok(())
        }),
        Command::Delete { id } => with_store(&config, |store, _| {
            capture::delete_entry(store, id)?;
            println!("Deleted {id}");
            Ok(())
        }),
    };

    match outcome {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    }
}

fn resolved_config(cli: &Cli) -> Config {
    let env_data_dir = Config::from_env().data_dir;
    let data_dir = cli
        .data_dir
        .clone()
        .or(env_data_dir)
        .unwrap_or_else(|| Config::default().data_dir_or_default());

    let base = Config::load(&data_dir);
    base.override_with(Config {
        vault_dir: cli.vault_dir.clone(),
        db_path: cli.db_path.clone(),
        data_dir: cli.data_dir.clone(),
        mode: cli.mode,
        telemetry: None,
        thresholds: None,
    })
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<VaultError>() {
        Some(VaultError::VaultNotFound(_)) => 2,
        _ => 1,
    }
}

fn cmd_init(config: &Config) -> anyhow::Result<()> {
    let root = config.vault_dir_or_default();
    vault::init_vault(&root)?;
    // Touch the index so the first tool call doesn't pay schema creation
    let store = Store::open(&config.db_path_or_default())?;
    store.close()?;
    println!("Vault ready at {}", root.display());
    Ok(())
}

fn cmd_serve(config: &Config) -> i32 {
    let server = match VaultServer::new(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("error: {e:#}");
            return 2;
        }
    };
    match serve_stdio(server) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn with_store(
    config: &Config,
    f: impl FnOnce(&Store, &Config) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    vault::require_vault(&config.vault_dir_or_default())?;
    let store = Store::open(&config.db_path_or_default())?;
    f(&store, config)
}

fn cmd_reindex(store: &Store, config: &Config, full: bool) -> anyhow::Result<()> {
    let root = vault::require_vault(&config.vault_dir_or_default())?;
    let provider = embedder::shared_provider().ok();
    if provider.is_none() {
        eprintln!("note: embedding backend unavailable, indexing FTS-only");
    }
    let report = store.reindex(&root, provider.as_deref(), full)?;
    println!(
        "added {}, updated {}, removed {}, unchanged {}",
        report.added, report.updated, report.removed, report.unchanged
    );
    Ok(())
}

fn cmd_search(
    store: &Store,
    query: &str,
    limit: usize,
    kind: Option<String>,
) -> anyhow::Result<()> {
    let provider = embedder::shared_provider().ok();
    let opts = SearchOptions {
        kind,
        limit,
        ..Default::default()
    };
    let hits = store.hybrid_search(provider.as_deref(), query, &opts)?;
    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }
    for hit in hits {
        let title = hit.entry.title.as_deref().unwrap_or("(untitled)");
        println!(
            "{:.3}  [{}] {}  {}",
            hit.score,
            hit.entry.kind,
            title,
            hit.entry.file_path.display()
        );
    }
    Ok(())
}

fn cmd_list(store: &Store, kind: Option<String>, limit: usize) -> anyhow::Result<()> {
    let entries = store.list_entries(&ListQuery {
        kind,
        limit,
        ..Default::default()
    })?;
    for entry in entries {
        println!(
            "{}  [{}] {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.kind,
            entry.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}

fn cmd_status(store: &Store, config: &Config) -> anyhow::Result<()> {
    let root = vault::require_vault(&config.vault_dir_or_default())?;
    let model_available = embedder::shared_provider().ok().map(|p| p.name());
    let report = status::collect(
        store,
        &root,
        &config.thresholds_or_default(),
        model_available,
    )?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
