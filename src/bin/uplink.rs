//! uplink CLI tool
//!
//! Inspect and edit the parent links of a markdown vault from the command line.
//!
//! ## Commands
//!
//! - `show <note>`: the graph node of a note
//! - `outgoing <note>`: forward links, optionally only structural or non-structural ones
//! - `missing <note>`: notes declaring the note as parent that it does not link to
//! - `candidates <note>`: structural notes linking to the note that it does not declare
//! - `link <child> <parent>` / `unlink <child> <parent>`: edit the child's header
//! - `link-all <parent>` / `unlink-all <parent>`: edit every child the parent links to
//! - `rename <note> <new-path>`: move a note and rewrite the references to it
//! - `cycles`: groups of notes that are their own ancestors
//!
//! Notes may be given as vault-relative paths or as link text (`Car`, `Projects/Car`). Output
//! is JSON. Settings are read from `<vault>/.uplink.toml` unless `--config` is given.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use uplink_core::{
    config::{SettingsProvider, TomlSettingsProvider},
    helper::LinksHelper,
    mutator::FsNoteStore,
    node::OutgoingFilter,
    UplinkError,
};

#[derive(Parser)]
#[command(name = "uplink")]
#[command(author, version, about = "Inspect and edit parent links between markdown notes", long_about = None)]
struct Cli {
    /// Vault directory
    vault: PathBuf,

    /// Settings file (default: <vault>/.uplink.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the graph node of a note
    Show { note: String },

    /// List forward links of a note
    Outgoing {
        note: String,

        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
    },

    /// List notes declaring this note as parent that it does not link to
    Missing { note: String },

    /// List structural notes linking to this note that it does not declare as parent
    Candidates { note: String },

    /// Declare a parent in the header of a child note
    Link { child: String, parent: String },

    /// Remove a parent from the header of a child note
    Unlink { child: String, parent: String },

    /// Declare a parent in every note it links to
    LinkAll {
        parent: String,

        /// Leave structural notes alone
        #[arg(long)]
        skip_structural: bool,
    },

    /// Remove a parent from every note it links to
    UnlinkAll { parent: String },

    /// Move a note and rewrite every reference to it
    Rename { note: String, to: String },

    /// Report parent cycles
    Cycles,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Structural,
    NonStructural,
}

impl From<FilterArg> for OutgoingFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => OutgoingFilter::All,
            FilterArg::Structural => OutgoingFilter::StructuralOnly,
            FilterArg::NonStructural => OutgoingFilter::NonStructural,
        }
    }
}

#[derive(Serialize)]
struct EditResult {
    path: String,
    changed: bool,
    error: Option<String>,
}

fn print<T: Serialize>(value: &T) -> Result<(), UplinkError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve(helper: &LinksHelper<FsNoteStore>, note: &str) -> Result<String, UplinkError> {
    let graph = helper.graph().read();
    if graph.contains(note) {
        return Ok(note.to_string());
    }
    graph
        .resolver()
        .resolve_path(note)
        .ok_or_else(|| UplinkError::NotFound(format!("no single note matches '{note}'")))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| cli.vault.join(".uplink.toml"));
    let settings = TomlSettingsProvider::new(config_path).get_settings()?;
    let helper = LinksHelper::open_vault(&cli.vault, settings)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Show { note } => {
            let path = resolve(&helper, &note)?;
            print(&helper.active_node(&path))?;
        }
        Commands::Outgoing { note, filter } => {
            let path = resolve(&helper, &note)?;
            print(&helper.outgoing_views(&path, filter.into()))?;
        }
        Commands::Missing { note } => {
            let path = resolve(&helper, &note)?;
            print(&helper.missing_children(&path))?;
        }
        Commands::Candidates { note } => {
            let path = resolve(&helper, &note)?;
            print(&helper.unlinked_parent_candidates(&path))?;
        }
        Commands::Link { child, parent } => {
            let (child, parent) = (resolve(&helper, &child)?, resolve(&helper, &parent)?);
            let changed = runtime.block_on(helper.add_parent_link(&child, &parent))?;
            print(&EditResult {
                path: child,
                changed,
                error: None,
            })?;
        }
        Commands::Unlink { child, parent } => {
            let (child, parent) = (resolve(&helper, &child)?, resolve(&helper, &parent)?);
            let changed = runtime.block_on(helper.remove_parent_link(&child, &parent))?;
            print(&EditResult {
                path: child,
                changed,
                error: None,
            })?;
        }
        Commands::LinkAll {
            parent,
            skip_structural,
        } => {
            let parent = resolve(&helper, &parent)?;
            let outcomes = runtime.block_on(helper.link_all(&parent, skip_structural));
            print(&to_results(outcomes))?;
        }
        Commands::UnlinkAll { parent } => {
            let parent = resolve(&helper, &parent)?;
            let outcomes = runtime.block_on(helper.unlink_all(&parent));
            print(&to_results(outcomes))?;
        }
        Commands::Rename { note, to } => {
            let from = resolve(&helper, &note)?;
            let outcomes = runtime.block_on(helper.rename_note(&from, &to))?;
            print(&to_results(outcomes))?;
        }
        Commands::Cycles => {
            let cycles = helper.parent_cycles();
            if !cycles.is_empty() {
                tracing::warn!("Found {} parent cycles", cycles.len());
            }
            print(&cycles)?;
        }
    }
    Ok(())
}

fn to_results(outcomes: Vec<uplink_core::mutator::BulkOutcome>) -> Vec<EditResult> {
    outcomes
        .into_iter()
        .map(|outcome| match outcome.result {
            Ok(changed) => EditResult {
                path: outcome.path,
                changed,
                error: None,
            },
            Err(e) => EditResult {
                path: outcome.path,
                changed: false,
                error: Some(e.to_string()),
            },
        })
        .collect()
}
