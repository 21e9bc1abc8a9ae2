//! Shared test utilities for link graph testing

use crate::{
    config::LinkSettings,
    graph::LinkGraph,
    index::VaultIndex,
    node::GraphNode,
};
use std::{collections::BTreeSet, sync::Arc};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Build a graph over `index` with default settings.
pub fn build_graph(index: &VaultIndex) -> LinkGraph {
    init_logging();
    let mut graph = LinkGraph::new(LinkSettings::default());
    graph.initialize(index).unwrap();
    graph
}

/// A structural root with two children declaring it as parent.
///
/// Child1 mentions Root once in its body, Child2 mentions it twice and links to Child1.
pub fn create_family_index() -> VaultIndex {
    VaultIndex::from_notes([
        ("Root.md", "---\ntags: [MOC]\n---\n# Root\n"),
        ("Child1.md", "---\nup: [\"[[Root]]\"]\n---\nPart of [[Root]].\n"),
        (
            "Child2.md",
            "---\nup:\n  - \"[[Root]]\"\n---\n[[Root]] and again [[Root]], next to [[Child1]].\n",
        ),
    ])
}

/// A vault mixing namesakes, nested folders, structural notes and a parent cycle.
pub fn create_mixed_index() -> VaultIndex {
    VaultIndex::from_notes([
        ("Home.md", "#MOC\n- [[Projects/Car]]\n- [[Banana]]\n- [[Garage]]"),
        ("Projects/Car.md", "---\nup: \"[[Home]]\"\n---\n[[Home]] [[Garage]]"),
        ("Archive/Car.md", "---\nup: Garage\n---\nold car"),
        ("Garage.md", "---\nup: [Home, Projects/Car]\ntags: MOC\n---\n[[Car]] [[nana]]"),
        ("Banana.md", "---\nup: Banana\n---\n[[Home]] [[Home]]"),
        ("Loose.md", "---\nup: \"[[Nowhere]]\"\n---\nloose end"),
    ])
}

pub fn paths_of(nodes: &[Arc<GraphNode>]) -> Vec<&str> {
    nodes.iter().map(|node| node.path.as_str()).collect()
}

pub fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|path| path.to_string()).collect()
}

/// `B ∈ A.backward_links` exactly when A is among B's forward or parent links.
pub fn assert_inverse_law(graph: &LinkGraph) {
    for a in graph.all() {
        for b in graph.all() {
            let referenced = b.forward_links.contains(&a.path) || b.has_parent(&a.path);
            assert_eq!(
                a.backward_links.contains(&b.path),
                referenced,
                "'{}' backward links vs references from '{}'",
                a.path,
                b.path
            );
        }
        for source in a.backward_links.iter() {
            assert!(graph.contains(source), "dangling backward link {source}");
        }
    }
}

/// No link set of any node mentions `path`.
pub fn assert_not_referenced(graph: &LinkGraph, path: &str) {
    assert!(!graph.contains(path));
    for node in graph.all() {
        assert!(!node.has_parent(path), "{} still has parent {}", node.path, path);
        assert!(!node.forward_links.contains(path), "{} still links {}", node.path, path);
        assert!(!node.backward_links.contains(path), "{} still linked by {}", node.path, path);
    }
}
