use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    sync::Arc,
};

/// Immutable snapshot of a note's derived link data.
///
/// Nodes are rebuilt, never patched, whenever the note or the corpus membership changes. Link
/// sets hold note paths; look the referenced nodes up through [crate::graph::LinkGraph].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub path: String,
    /// Minimal trailing part of the path that no other same-named note shares.
    pub display_name: String,
    pub tags: BTreeSet<String>,
    pub is_structural: bool,
    /// Raw parent-property tokens, resolved or not, in declaration order.
    pub parent_tokens: Vec<String>,
    /// Resolved parents, unique and in declaration order.
    pub parent_links: Vec<String>,
    pub forward_links: BTreeSet<String>,
    pub backward_links: BTreeSet<String>,
}

impl GraphNode {
    pub fn has_parent(&self, path: &str) -> bool {
        self.parent_links.iter().any(|parent| parent == path)
    }

    pub fn links_to(&self, path: &str) -> bool {
        self.forward_links.contains(path)
    }

    /// Every path this node points at: forward links followed by parents not already listed.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.forward_links.iter().map(String::as_str).chain(
            self.parent_links
                .iter()
                .filter(|parent| !self.forward_links.contains(*parent))
                .map(String::as_str),
        )
    }

    pub fn links(&self, kind: LinkKind) -> Vec<&str> {
        match kind {
            LinkKind::Parent => self.parent_links.iter().map(String::as_str).collect(),
            LinkKind::Forward => self.forward_links.iter().map(String::as_str).collect(),
            LinkKind::Backward => self.backward_links.iter().map(String::as_str).collect(),
        }
    }
}

impl Display for GraphNode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.display_name)?;
        if self.is_structural {
            write!(f, " (structural)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Parent,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutgoingFilter {
    #[default]
    All,
    StructuralOnly,
    NonStructural,
}

impl OutgoingFilter {
    pub fn accepts(&self, node: &GraphNode) -> bool {
        match self {
            OutgoingFilter::All => true,
            OutgoingFilter::StructuralOnly => node.is_structural,
            OutgoingFilter::NonStructural => !node.is_structural,
        }
    }
}

/// A node as seen from the currently open note. Computed per render; the canonical node is
/// shared, not copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub node: Arc<GraphNode>,
    pub is_active: bool,
    /// The active note declares this node as a parent.
    pub is_parent_of_active: bool,
    /// This node declares the active note as a parent.
    pub is_child_of_active: bool,
    /// This node's forward links point back at the active note.
    pub links_to_active: bool,
}

impl NodeView {
    pub fn new(node: Arc<GraphNode>, active: Option<&GraphNode>) -> NodeView {
        let Some(active) = active else {
            return NodeView {
                node,
                is_active: false,
                is_parent_of_active: false,
                is_child_of_active: false,
                links_to_active: false,
            };
        };
        NodeView {
            is_active: node.path == active.path,
            is_parent_of_active: active.has_parent(&node.path),
            is_child_of_active: node.has_parent(&active.path),
            links_to_active: node.links_to(&active.path),
            node,
        }
    }
}
