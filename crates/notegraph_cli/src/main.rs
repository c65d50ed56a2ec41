//! notegraph: operator CLI over a notegraph database.
//!
//! Configuration comes from `.env` / `NOTEGRAPH_*` variables; `--db`
//! overrides the database path. Output is JSON on stdout.

use clap::{Parser, Subcommand};
use log::info;
use notegraph_core::{init_logging, open_db, CoreConfig, GraphCacheEntry, NoteService, ServiceError};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(author, version, about = "Maintenance tool for the notegraph index")]
#[command(propagate_version = true)]
struct Cli {
    /// Database file (overrides NOTEGRAPH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the core library is linked
    Ping,

    /// Show schema version and row counts
    Health,

    /// Discard the graph cache and replay every edge into it
    RebuildGraph,

    /// Compare the graph cache with a replay of the edge table
    VerifyGraph,

    /// List edges pointing at a note
    Backlinks {
        /// Target note uuid
        note_id: Uuid,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CoreConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(log_dir) = &config.log_dir {
        init_logging(config.log_level, &log_dir.to_string_lossy())?;
    }

    match cli.command {
        Commands::Ping => cmd_ping(),
        Commands::Health => with_service(&config, |service| cmd_health(service, &config)),
        Commands::RebuildGraph => with_service(&config, cmd_rebuild_graph),
        Commands::VerifyGraph => with_service(&config, |service| cmd_verify_graph(service)),
        Commands::Backlinks { note_id } => {
            with_service(&config, |service| cmd_backlinks(service, note_id))
        }
    }
}

/// Opens the configured database and hands a service over it to `command`.
fn with_service<F>(config: &CoreConfig, command: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut NoteService<'_>) -> Result<(), Box<dyn std::error::Error>>,
{
    let mut conn = open_db(&config.db_path)?;
    let mut service = NoteService::new(&mut conn, config.index);
    command(&mut service)
}

fn cmd_ping() -> Result<(), Box<dyn std::error::Error>> {
    print_json(&json!({
        "ping": notegraph_core::ping(),
        "version": notegraph_core::core_version(),
    }))
}

fn cmd_health(
    service: &NoteService<'_>,
    config: &CoreConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = service.stats()?;
    print_json(&json!({
        "status": "ok",
        "version": notegraph_core::core_version(),
        "db_path": config.db_path.to_string_lossy(),
        "link_sync": config.index.link_sync.as_str(),
        "schema_version": stats.schema_version,
        "notes": stats.notes,
        "sub_notes": stats.sub_notes,
        "links": stats.links,
        "graph_cache_entries": stats.graph_cache_entries,
    }))
}

fn cmd_rebuild_graph(service: &mut NoteService<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let report = service.rebuild_graph_cache()?;
    info!(
        "event=cli_rebuild_graph module=cli status=ok edges={} entries={}",
        report.edges_replayed, report.entries
    );
    print_json(&json!({
        "edges_replayed": report.edges_replayed,
        "entries": report.entries,
    }))
}

fn cmd_verify_graph(service: &NoteService<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let drift = service.verify_graph_cache()?;
    let items = drift
        .iter()
        .map(|item| {
            json!({
                "note_id": item.note_id.to_string(),
                "stored": entry_json(item.stored.as_ref()),
                "replayed": entry_json(item.replayed.as_ref()),
            })
        })
        .collect::<Vec<_>>();
    print_json(&json!({
        "consistent": items.is_empty(),
        "drift": items,
    }))?;
    if drift.is_empty() {
        Ok(())
    } else {
        Err(format!("graph cache differs from edges for {} note(s)", drift.len()).into())
    }
}

fn cmd_backlinks(
    service: &NoteService<'_>,
    note_id: Uuid,
) -> Result<(), Box<dyn std::error::Error>> {
    if service.get_note(note_id)?.is_none() {
        return Err(ServiceError::NoteNotFound(note_id).into());
    }
    let items = service
        .backlinks(note_id)?
        .into_iter()
        .map(|backlink| {
            json!({
                "link_id": backlink.link_id,
                "source_note_id": backlink.source_note_id.to_string(),
                "source_sub_note_id": backlink.source_sub_note_id.map(|id| id.to_string()),
                "source_title": backlink.source_title,
                "source_slug": backlink.source_slug,
                "label": backlink.label,
                "link_type": backlink.link_type.as_str(),
                "created_at": backlink.created_at,
            })
        })
        .collect::<Vec<_>>();
    print_json(&json!({
        "note_id": note_id.to_string(),
        "backlinks": items,
    }))
}

fn entry_json(entry: Option<&GraphCacheEntry>) -> Value {
    match entry {
        Some(entry) => json!({
            "strength": entry.strength,
            "connected": entry
                .connected
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>(),
        }),
        None => Value::Null,
    }
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
