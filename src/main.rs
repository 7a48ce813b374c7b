mod api;
mod app;
mod buffer;
mod commands;
mod completion;
mod config;
mod edit;
mod fold;
mod keymap;
mod manager;
mod minibuffer;
mod registry;
mod site;
mod store;
mod sync;
mod theme;
mod usage;
mod workflow;

#[cfg(test)]
mod scenarios;

use anyhow::{Context, Result};
use api::{Backend, HttpBackend};
use clap::{Parser, Subcommand};
use manager::BufferManager;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use store::{FileStore, MemoryStore, Store};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mxsite", version, about = "An editor-styled personal site for the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// State file to use instead of the default
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Keep state in memory only; nothing is written to disk
    #[arg(long, global = true, conflicts_with = "store")]
    ephemeral: bool,

    /// Backend base URL, overriding `api_url` from the config
    #[arg(long)]
    api: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in $EDITOR (default: nvim)
    Config,
    /// Manage themes
    Themes {
        #[command(subcommand)]
        command: ThemeCommands,
    },
    /// Print every buffer with its new/unread marker
    Buffers,
}

#[derive(Subcommand)]
enum ThemeCommands {
    /// List available themes
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        match command {
            Commands::Config => return config::open_config_in_editor(),
            Commands::Themes { command } => match command {
                ThemeCommands::List => {
                    let manager = theme::ThemeManager::load();
                    for name in manager.theme_names() {
                        println!("{name}");
                    }
                    return Ok(());
                }
            },
            Commands::Buffers => {
                let store = open_store(cli.store, cli.ephemeral)?;
                return print_buffers(store.as_ref());
            }
        }
    }

    init_logging()?;
    let cfg = config::load_config()?;
    let store = open_store(cli.store, cli.ephemeral)?;
    let backend = cli
        .api
        .or_else(|| cfg.api_url.clone())
        .map(|url| Arc::new(HttpBackend::new(&url)) as Arc<dyn Backend>);
    tracing::info!(
        "Starting with store {} and backend {:?}",
        store.describe(),
        cfg.api_url
    );
    app::run_app(cfg, store, backend)
}

fn open_store(path: Option<PathBuf>, ephemeral: bool) -> Result<Box<dyn Store>> {
    if ephemeral {
        return Ok(Box::new(MemoryStore::new()));
    }
    let path = match path {
        Some(path) => path,
        None => FileStore::default_path()?,
    };
    Ok(Box::new(FileStore::new(path)))
}

fn print_buffers(store: &dyn Store) -> Result<()> {
    let mut state = store
        .load()
        .with_context(|| format!("Failed to load {}", store.describe()))?
        .unwrap_or_default();
    let registry = commands::builtin_registry();
    state.migrate(registry.names());
    let manager = BufferManager::new(state.buffers, state.scratch.as_deref(), state.viewed);
    for buffer in manager.list() {
        let freshness = manager.classify(buffer, state.last_visit);
        let author = buffer.author.as_deref().unwrap_or("-");
        println!(
            "{} {:<24} {:<12} {}",
            freshness.marker(),
            buffer.display_name(),
            author,
            buffer.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

// Logs go to a file; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let dir = dirs::data_dir()
        .context("Could not determine data directory")?
        .join("mxsite");
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("mxsite.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let filter = EnvFilter::try_from_env("MXSITE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to install logger: {err}"))?;
    Ok(())
}
