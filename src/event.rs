use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::node::GraphNode;

/// Change notifications consumed from the host's metadata index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteEvent {
    Created(String),
    Deleted(String),
    /// From path, to path
    Renamed(String, String),
    MetadataChanged(String),
    /// The host index finished building and can be queried.
    IndexReady,
}

impl NoteEvent {
    /// Every path whose graph node must be refreshed because of this event.
    ///
    /// A rename touches both ends: the old path disappears and the new one is created.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            NoteEvent::Created(p) | NoteEvent::Deleted(p) | NoteEvent::MetadataChanged(p) => {
                vec![p.as_str()]
            }
            NoteEvent::Renamed(from, to) => vec![from.as_str(), to.as_str()],
            NoteEvent::IndexReady => Vec::new(),
        }
    }
}

impl Display for NoteEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            NoteEvent::Created(p) => write!(f, "Created({p})"),
            NoteEvent::Deleted(p) => write!(f, "Deleted({p})"),
            NoteEvent::Renamed(from, to) => write!(f, "Renamed({from} -> {to})"),
            NoteEvent::MetadataChanged(p) => write!(f, "MetadataChanged({p})"),
            NoteEvent::IndexReady => write!(f, "IndexReady"),
        }
    }
}

/// Signals re-emitted to the UI layer after the link graph changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    NodeChanged(String),
    /// Path of the newly active note and its snapshot, if the note is in the graph.
    ActiveNodeChanged(String, Option<Arc<GraphNode>>),
    VisibilityChanged(bool),
    /// The whole graph was rebuilt.
    Reinitialized,
}

impl Display for GraphEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            GraphEvent::NodeChanged(p) => write!(f, "NodeChanged({p})"),
            GraphEvent::ActiveNodeChanged(p, _) => write!(f, "ActiveNodeChanged({p})"),
            GraphEvent::VisibilityChanged(v) => write!(f, "VisibilityChanged({v})"),
            GraphEvent::Reinitialized => write!(f, "Reinitialized"),
        }
    }
}
