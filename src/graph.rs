//! The link graph: every expanded [GraphNode] plus the reverse adjacency needed to keep
//! backward links and display names consistent under incremental updates.
//!
//! ## Consistency model
//!
//! A node depends on more than its own note:
//!
//! - its backward links come from every node that references it,
//! - its display name depends on every other note sharing its file name,
//! - its parent and forward links depend on which notes exist, since a token that resolved
//!   uniquely may become ambiguous (or resolvable) when a same-named note appears or leaves.
//!
//! [LinkGraph::upsert] and [LinkGraph::remove] therefore compute the affected set before
//! re-expanding, and rebuild backward links of every node whose referrers changed.
use parking_lot::RwLock;
use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

use crate::{
    config::LinkSettings,
    error::UplinkError,
    expander::NoteExpander,
    index::MetadataIndex,
    node::{GraphNode, LinkKind, NodeView, OutgoingFilter},
    paths::{resolve_among, token_stem, NotePath, PathResolver},
    tokenizer::link_tokens,
};

/// Shared handle to a graph. Readers take snapshots, only the reconciliation path writes.
pub type SharedGraph = Arc<RwLock<LinkGraph>>;

/// A token of a text fragment resolved to a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReference {
    pub node: Arc<GraphNode>,
    /// Trailing part of the path matched by the token.
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    settings: LinkSettings,
    resolver: PathResolver,
    nodes: BTreeMap<String, Arc<GraphNode>>,
    /// target -> nodes whose forward or parent links contain it
    referrers: BTreeMap<String, BTreeSet<String>>,
    /// token stem -> nodes declaring a parent token with that stem, resolved or not
    token_dependents: BTreeMap<String, BTreeSet<String>>,
}

impl LinkGraph {
    pub fn new(settings: LinkSettings) -> LinkGraph {
        LinkGraph {
            settings: settings.normalized(),
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replace the settings without rebuilding. Call [LinkGraph::initialize] afterwards.
    pub fn set_settings(&mut self, settings: LinkSettings) {
        self.settings = settings.normalized();
    }

    /// Replace the settings and rebuild every node under them.
    pub fn reconfigure<I: MetadataIndex + ?Sized>(
        &mut self,
        settings: LinkSettings,
        index: &I,
    ) -> Result<(), UplinkError> {
        self.settings = settings.normalized();
        self.initialize(index)
    }

    /// Rebuild the whole graph from the index.
    ///
    /// Pass one expands every note against the complete path set; pass two derives backward
    /// links once every node's forward and parent links are known.
    #[tracing::instrument(skip_all)]
    pub fn initialize<I: MetadataIndex + ?Sized>(&mut self, index: &I) -> Result<(), UplinkError> {
        if !index.is_ready() {
            return Err(UplinkError::IndexNotReady);
        }
        let paths = index.paths();
        self.resolver = PathResolver::new(paths.iter());
        self.nodes.clear();
        self.referrers.clear();
        self.token_dependents.clear();

        let expanded = {
            let expander = NoteExpander::new(&self.settings, &self.resolver, index);
            paths
                .iter()
                .filter_map(|path| expander.expand(path))
                .collect::<Vec<_>>()
        };
        for node in expanded {
            self.register(&node);
            self.nodes.insert(node.path.clone(), Arc::new(node));
        }

        let all = self.nodes.keys().cloned().collect::<Vec<_>>();
        for path in all {
            self.rebuild_backward_links(&path);
        }
        tracing::info!("Initialized link graph with {} nodes", self.nodes.len());
        Ok(())
    }

    /// Re-expand `path` from the index, together with every node it may affect. A path that
    /// is no longer in the index is removed. Returns the paths whose node changed.
    #[tracing::instrument(skip_all, fields(path = path))]
    pub fn upsert<I: MetadataIndex + ?Sized>(
        &mut self,
        index: &I,
        path: &str,
    ) -> Result<BTreeSet<String>, UplinkError> {
        if !index.is_ready() {
            return Err(UplinkError::IndexNotReady);
        }
        let present = index.contains(path);
        let membership_changed = if present {
            self.resolver.insert(path)
        } else {
            self.resolver.remove(path)
        };
        let affected = self.affected_by(index, path, membership_changed);
        Ok(self.refresh(index, affected))
    }

    /// Drop `path` from the graph and strip it from every other node.
    #[tracing::instrument(skip_all, fields(path = path))]
    pub fn remove<I: MetadataIndex + ?Sized>(
        &mut self,
        index: &I,
        path: &str,
    ) -> Result<BTreeSet<String>, UplinkError> {
        if !index.is_ready() {
            return Err(UplinkError::IndexNotReady);
        }
        let membership_changed = self.resolver.remove(path);
        let affected = self.affected_by(index, path, membership_changed);
        Ok(self.refresh(index, affected))
    }

    fn affected_by<I: MetadataIndex + ?Sized>(
        &self,
        index: &I,
        path: &str,
        membership_changed: bool,
    ) -> BTreeSet<String> {
        let mut affected = BTreeSet::from([path.to_string()]);
        if !membership_changed {
            return affected;
        }
        let stem = NotePath::new(path).filestem();
        let mut namesakes = self
            .resolver
            .same_stem(path)
            .map(str::to_string)
            .collect::<BTreeSet<_>>();
        namesakes.insert(path.to_string());
        for namesake in namesakes.iter() {
            affected.insert(namesake.clone());
            affected.extend(self.referrers_of(namesake).cloned());
            affected.extend(index.incoming(namesake));
        }
        if let Some(dependents) = self.token_dependents.get(stem) {
            affected.extend(dependents.iter().cloned());
        }
        affected
    }

    /// Re-expand `affected`, then rebuild backward links of every node whose referrers may
    /// have changed.
    fn refresh<I: MetadataIndex + ?Sized>(
        &mut self,
        index: &I,
        affected: BTreeSet<String>,
    ) -> BTreeSet<String> {
        let mut touched = affected.clone();
        let mut before: BTreeMap<String, Option<Arc<GraphNode>>> = BTreeMap::new();

        for path in affected.iter() {
            let old = self.nodes.remove(path);
            if let Some(old) = old.as_ref() {
                self.unregister(old);
                touched.extend(old.references().map(str::to_string));
            }
            before.insert(path.clone(), old);
        }

        let expanded = {
            let expander = NoteExpander::new(&self.settings, &self.resolver, index);
            affected
                .iter()
                .filter_map(|path| expander.expand(path))
                .collect::<Vec<_>>()
        };
        for node in expanded {
            self.register(&node);
            touched.extend(node.references().map(str::to_string));
            self.nodes.insert(node.path.clone(), Arc::new(node));
        }

        for path in touched.iter() {
            if !before.contains_key(path) {
                before.insert(path.clone(), self.nodes.get(path).cloned());
            }
            self.rebuild_backward_links(path);
        }

        let changed = before
            .into_iter()
            .filter(|(path, old)| old.as_ref() != self.nodes.get(path))
            .map(|(path, _)| path)
            .collect::<BTreeSet<_>>();
        tracing::debug!(
            "Refreshed {} nodes, {} changed",
            affected.len(),
            changed.len()
        );
        changed
    }

    fn register(&mut self, node: &GraphNode) {
        for target in node.references() {
            self.referrers
                .entry(target.to_string())
                .or_default()
                .insert(node.path.clone());
        }
        for token in node.parent_tokens.iter() {
            if let Some(stem) = token_stem(token) {
                self.token_dependents
                    .entry(stem)
                    .or_default()
                    .insert(node.path.clone());
            }
        }
    }

    fn unregister(&mut self, node: &GraphNode) {
        for target in node.references() {
            if let Some(sources) = self.referrers.get_mut(target) {
                sources.remove(&node.path);
                if sources.is_empty() {
                    self.referrers.remove(target);
                }
            }
        }
        for token in node.parent_tokens.iter() {
            let Some(stem) = token_stem(token) else {
                continue;
            };
            if let Some(dependents) = self.token_dependents.get_mut(&stem) {
                dependents.remove(&node.path);
                if dependents.is_empty() {
                    self.token_dependents.remove(&stem);
                }
            }
        }
    }

    fn referrers_of(&self, path: &str) -> impl Iterator<Item = &String> {
        self.referrers.get(path).into_iter().flatten()
    }

    fn rebuild_backward_links(&mut self, path: &str) {
        let backward = self
            .referrers_of(path)
            .filter(|source| self.nodes.contains_key(source.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>();
        if let Some(node) = self.nodes.get_mut(path) {
            if node.backward_links != backward {
                Arc::make_mut(node).backward_links = backward;
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<Arc<GraphNode>> {
        self.nodes.get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<GraphNode>> {
        self.nodes.values()
    }

    fn nodes_for<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<Arc<GraphNode>> {
        paths.into_iter().filter_map(|path| self.get(path)).collect()
    }

    pub fn neighbors_by_kind(&self, path: &str, kind: LinkKind) -> Vec<Arc<GraphNode>> {
        self.nodes
            .get(path)
            .map(|node| self.nodes_for(node.links(kind)))
            .unwrap_or_default()
    }

    /// Forward links of `path` restricted by `filter`.
    pub fn outgoing(&self, path: &str, filter: OutgoingFilter) -> Vec<Arc<GraphNode>> {
        self.neighbors_by_kind(path, LinkKind::Forward)
            .into_iter()
            .filter(|node| filter.accepts(node))
            .collect()
    }

    /// Structural nodes linking to `path` that `path` does not declare as parent.
    pub fn unlinked_parent_candidates(&self, path: &str) -> Vec<Arc<GraphNode>> {
        let Some(node) = self.nodes.get(path) else {
            return Vec::new();
        };
        self.nodes_for(node.backward_links.iter().map(String::as_str))
            .into_iter()
            .filter(|candidate| {
                candidate.path != node.path
                    && candidate.is_structural
                    && candidate.links_to(&node.path)
                    && !node.has_parent(&candidate.path)
            })
            .collect()
    }

    /// Nodes declaring `path` as parent that `path` does not link to.
    pub fn missing_children(&self, path: &str) -> Vec<Arc<GraphNode>> {
        let Some(node) = self.nodes.get(path) else {
            return Vec::new();
        };
        self.nodes_for(node.backward_links.iter().map(String::as_str))
            .into_iter()
            .filter(|child| {
                child.path != node.path
                    && child.has_parent(&node.path)
                    && !node.links_to(&child.path)
            })
            .collect()
    }

    /// Non-structural notes `parent` links to that do not declare it as parent.
    pub fn unlinked_children(&self, parent: &str) -> Vec<Arc<GraphNode>> {
        self.neighbors_by_kind(parent, LinkKind::Forward)
            .into_iter()
            .filter(|child| {
                child.path != parent && !child.is_structural && !child.has_parent(parent)
            })
            .collect()
    }

    /// Notes `parent` links to that declare it as parent.
    pub fn linked_children(&self, parent: &str) -> Vec<Arc<GraphNode>> {
        self.neighbors_by_kind(parent, LinkKind::Forward)
            .into_iter()
            .filter(|child| child.path != parent && child.has_parent(parent))
            .collect()
    }

    /// Resolve every reference in `text`, in order of first occurrence.
    ///
    /// With `within`, tokens only resolve among the forward links of that note, which is how a
    /// selection inside the open note is mapped to the notes it mentions.
    pub fn resolve_text(&self, text: &str, within: Option<&str>) -> Vec<ResolvedReference> {
        let scope = within.map(|path| {
            self.nodes
                .get(path)
                .map(|node| node.forward_links.clone())
                .unwrap_or_default()
        });
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::new();
        for token in link_tokens(text) {
            let resolution = match scope.as_ref() {
                Some(scope) => resolve_among(token, scope.iter().map(String::as_str)),
                None => self.resolver.resolve(token),
            };
            let Some(resolution) = resolution else {
                continue;
            };
            if !seen.insert(resolution.path.clone()) {
                continue;
            }
            if let Some(node) = self.get(&resolution.path) {
                resolved.push(ResolvedReference {
                    node,
                    label: resolution.label,
                });
            }
        }
        resolved
    }

    /// Views of `paths` relative to the active note.
    pub fn views<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a str>,
        active: Option<&str>,
    ) -> Vec<NodeView> {
        let active = active.and_then(|path| self.nodes.get(path));
        self.nodes_for(paths)
            .into_iter()
            .map(|node| NodeView::new(node, active.map(|a| a.as_ref())))
            .collect()
    }

    /// Every note reachable from `path` by following parent links, nearest first.
    pub fn ancestors(&self, path: &str) -> Vec<String> {
        let mut seen = BTreeSet::from([path.to_string()]);
        let mut found = Vec::new();
        let mut queue = VecDeque::from([path.to_string()]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for parent in node.parent_links.iter() {
                if seen.insert(parent.clone()) {
                    found.push(parent.clone());
                    queue.push_back(parent.clone());
                }
            }
        }
        found
    }

    fn parent_graph(&self) -> DiGraphMap<&str, ()> {
        let mut graph = DiGraphMap::new();
        for node in self.nodes.values() {
            graph.add_node(node.path.as_str());
            for parent in node.parent_links.iter() {
                if self.nodes.contains_key(parent) {
                    graph.add_edge(node.path.as_str(), parent.as_str(), ());
                }
            }
        }
        graph
    }

    /// Groups of notes that are (transitively) their own parents. Cycles are user data; they
    /// are reported, never rejected.
    pub fn parent_cycles(&self) -> Vec<Vec<String>> {
        let graph = self.parent_graph();
        let mut cycles = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|only| graph.contains_edge(*only, *only))
            })
            .map(|component| {
                let mut paths = component
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                paths.sort();
                paths
            })
            .collect::<Vec<_>>();
        cycles.sort();
        cycles
    }
}
