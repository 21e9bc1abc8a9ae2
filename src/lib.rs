//! # uplink-core
//!
//! Parent/child link graph for a vault of interlinked markdown notes.
//!
//! ## Overview
//!
//! uplink-core turns a folder of markdown notes into a graph of [`node::GraphNode`]s. A note
//! declares its parents in a front matter property (`up` by default) and links to other notes with
//! `[[wikilinks]]` in its body. From those two sources the graph derives, for every note:
//!
//! - **parent links**: the notes its header names as parents, in declaration order
//! - **forward links**: the notes its body links to
//! - **backward links**: every note that links to it or declares it as parent
//! - whether it is **structural**: tagged with the parent tag (`#MOC` by default)
//!
//! The graph is kept in step with the vault incrementally. A [`controller::ReconciliationController`]
//! debounces change notifications and refreshes only the notes a change can affect, and a
//! [`mutator::RelationshipMutator`] writes parent links back into note headers.
//!
//! ### Key Features
//!
//! - **Link resolution**: `[[Car]]`, `[[Projects/Car]]` and `[[Car|alias]]` resolve to a single
//!   note path by segment-suffix matching, or stay unresolved when ambiguous
//! - **Structural classification**: maps of content are told apart by tag
//! - **Relationship queries**: missing children, unlinked parent candidates, selection lookups
//! - **Header rewriting**: parents are added and removed without disturbing the note body
//! - **Debounced reconciliation**: bursts of edits collapse into one refresh per note
//!
//! ## Architecture
//!
//! - **[`paths`]**: path normalization and wikilink target resolution (`PathResolver`)
//! - **[`tokenizer`]**: `[[...]]` reference extraction
//! - **[`note`]**: front matter parsing, tags and parent tokens
//! - **[`index`]**: the metadata index a graph is built from (`MetadataIndex`, `VaultIndex`)
//! - **[`expander`]**: one note's index entry to one `GraphNode`
//! - **[`graph`]**: the `LinkGraph` store, backward links and relationship queries
//! - **[`controller`]**: change notifications to graph refreshes
//! - **[`mutator`]**: header edits written through a `NoteStore`
//! - **[`selection`]**: periodic sampling of an editor selection
//! - **[`helper`]**: `LinksHelper`, everything above behind one API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use uplink_core::{config::LinkSettings, helper::LinksHelper, node::OutgoingFilter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), uplink_core::UplinkError> {
//!     let helper = LinksHelper::open_vault("./vault", LinkSettings::default())?;
//!
//!     for view in helper.outgoing_views("Maps/Vehicles.md", OutgoingFilter::NonStructural) {
//!         println!("{} child={}", view.node, view.is_child_of_active);
//!     }
//!
//!     // Declare Vehicles as parent of every note it links to
//!     for outcome in helper.link_all("Maps/Vehicles.md", true).await {
//!         println!("{}: {:?}", outcome.path, outcome.result);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Keeping the graph current
//!
//! A host editor forwards its index notifications to a controller task:
//!
//! ```rust,no_run
//! # use uplink_core::{config::LinkSettings, controller::ControllerCommand, event::NoteEvent, helper::LinksHelper};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), uplink_core::UplinkError> {
//! let helper = LinksHelper::open_vault("./vault", LinkSettings::default())?;
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! tokio::spawn(helper.controller().run(helper.index().clone(), rx));
//!
//! tx.send(ControllerCommand::Note(NoteEvent::MetadataChanged("Car.md".to_string())))
//!     .ok();
//! # Ok(())
//! # }
//! ```
//!
//! With the `service` feature, [`watch::VaultWatcher`] produces the same notifications from
//! filesystem events.
//!
//! ## Core Concepts
//!
//! ### Solitary suppression
//!
//! A body link to a note that is also declared as parent, and that appears exactly once in the
//! body, is not a forward link: it is the header's reference restated. A second body occurrence
//! makes it a forward link again.
//!
//! ### Ambiguity
//!
//! A reference resolves to the shallowest note whose path ends with its segments. When several
//! notes tie at that depth it resolves to nothing: `[[Car]]` with both `Projects/Car.md` and
//! `Archive/Car.md` in the vault is ambiguous, `[[Archive/Car]]` is not.
//!
//! ## Features
//!
//! - `service`: vault watching through `notify-debouncer-full`
//! - `bin`: the `uplink` command line tool

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod expander;
pub mod graph;
pub mod helper;
pub mod index;
pub mod mutator;
pub mod node;
pub mod note;
pub mod paths;
pub mod selection;
#[cfg(test)]
mod tests;
pub mod tokenizer;
#[cfg(feature = "service")]
pub mod watch;

pub use error::*;
