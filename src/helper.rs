//! [LinksHelper]: the API a user interface works against.
//!
//! It owns the in-memory [VaultIndex], the shared [LinkGraph] and a [RelationshipMutator]. Reads
//! are snapshots of the graph. Writes go to the store first; the affected note is re-read and
//! re-indexed only once the write succeeded, so a failed write never leaves the graph ahead of
//! storage.
use parking_lot::RwLock;
use std::{path::Path, sync::Arc};

use crate::{
    config::LinkSettings,
    controller::ReconciliationController,
    error::UplinkError,
    event::NoteEvent,
    graph::{LinkGraph, ResolvedReference, SharedGraph},
    index::{MetadataIndex, VaultIndex},
    mutator::{BulkOutcome, FsNoteStore, NoteStore, RelationshipMutator},
    node::{GraphNode, LinkKind, NodeView, OutgoingFilter},
};

pub struct LinksHelper<S: NoteStore> {
    index: Arc<RwLock<VaultIndex>>,
    graph: SharedGraph,
    mutator: RelationshipMutator<S>,
}

impl LinksHelper<FsNoteStore> {
    /// Index a vault directory and build its graph.
    pub fn open_vault<P: AsRef<Path>>(
        root: P,
        settings: LinkSettings,
    ) -> Result<LinksHelper<FsNoteStore>, UplinkError> {
        let index = VaultIndex::load_dir(root.as_ref())?;
        LinksHelper::new(index, FsNoteStore::new(root), settings)
    }
}

impl<S: NoteStore> LinksHelper<S> {
    /// Wrap `index` and `store`. The graph is built right away when the index is ready.
    pub fn new(index: VaultIndex, store: S, settings: LinkSettings) -> Result<Self, UplinkError> {
        let mut graph = LinkGraph::new(settings);
        if index.is_ready() {
            graph.initialize(&index)?;
        }
        let graph = Arc::new(RwLock::new(graph));
        Ok(LinksHelper {
            index: Arc::new(RwLock::new(index)),
            mutator: RelationshipMutator::new(Arc::new(store), graph.clone()),
            graph,
        })
    }

    pub fn index(&self) -> &Arc<RwLock<VaultIndex>> {
        &self.index
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<S> {
        self.mutator.store()
    }

    /// A reconciliation controller over this helper's graph. When the index was not ready yet,
    /// the controller waits for [NoteEvent::IndexReady] before building the graph.
    pub fn controller(&self) -> ReconciliationController {
        if self.index.read().is_ready() {
            ReconciliationController::initialized(self.graph.clone())
        } else {
            ReconciliationController::new(self.graph.clone())
        }
    }

    pub fn reconfigure(&self, settings: LinkSettings) -> Result<(), UplinkError> {
        let index = self.index.read();
        self.graph.write().reconfigure(settings, &*index)
    }

    pub fn active_node(&self, path: &str) -> Option<Arc<GraphNode>> {
        self.graph.read().get(path)
    }

    pub fn outgoing(&self, path: &str, filter: OutgoingFilter) -> Vec<Arc<GraphNode>> {
        self.graph.read().outgoing(path, filter)
    }

    pub fn unlinked_parent_candidates(&self, path: &str) -> Vec<Arc<GraphNode>> {
        self.graph.read().unlinked_parent_candidates(path)
    }

    pub fn missing_children(&self, path: &str) -> Vec<Arc<GraphNode>> {
        self.graph.read().missing_children(path)
    }

    pub fn unlinked_children(&self, parent: &str) -> Vec<Arc<GraphNode>> {
        self.graph.read().unlinked_children(parent)
    }

    pub fn linked_children(&self, parent: &str) -> Vec<Arc<GraphNode>> {
        self.graph.read().linked_children(parent)
    }

    /// Outgoing links of `active` as seen from it.
    pub fn outgoing_views(&self, active: &str, filter: OutgoingFilter) -> Vec<NodeView> {
        let graph = self.graph.read();
        let outgoing = graph.outgoing(active, filter);
        graph.views(outgoing.iter().map(|node| node.path.as_str()), Some(active))
    }

    pub fn resolve_text(&self, text: &str, within: Option<&str>) -> Vec<ResolvedReference> {
        self.graph.read().resolve_text(text, within)
    }

    pub fn ancestors(&self, path: &str) -> Vec<String> {
        self.graph.read().ancestors(path)
    }

    pub fn parent_cycles(&self) -> Vec<Vec<String>> {
        self.graph.read().parent_cycles()
    }

    /// Declare `parent` in the header of `child`. Returns whether the note was rewritten.
    pub async fn add_parent_link(&self, child: &str, parent: &str) -> Result<bool, UplinkError> {
        let written = self.mutator.add_parent(child, parent).await?;
        if written {
            self.reload(child).await?;
        }
        Ok(written)
    }

    /// Drop `parent` from the header of `child`. Returns whether the note was rewritten.
    pub async fn remove_parent_link(
        &self,
        child: &str,
        parent: &str,
    ) -> Result<bool, UplinkError> {
        let written = self.mutator.remove_parent(child, parent).await?;
        if written {
            self.reload(child).await?;
        }
        Ok(written)
    }

    /// Declare `parent` in every note it links to without being declared.
    pub async fn link_all(&self, parent: &str, skip_structural: bool) -> Vec<BulkOutcome> {
        let children = self
            .graph
            .read()
            .neighbors_by_kind(parent, LinkKind::Forward)
            .iter()
            .filter(|node| !node.has_parent(parent))
            .map(|node| node.path.clone())
            .collect::<Vec<_>>();
        let outcomes = self
            .mutator
            .link_all(parent, &children, skip_structural)
            .await;
        self.reload_written(outcomes).await
    }

    /// Remove `parent` from every note it links to that declares it.
    pub async fn unlink_all(&self, parent: &str) -> Vec<BulkOutcome> {
        let children = self
            .linked_children(parent)
            .iter()
            .map(|node| node.path.clone())
            .collect::<Vec<_>>();
        let outcomes = self.mutator.unlink_all(parent, &children).await;
        self.reload_written(outcomes).await
    }

    /// Add or remove `parent` on exactly the given notes, e.g. the current selection.
    pub async fn link_selected(
        &self,
        parent: &str,
        selected: &[String],
        link: bool,
    ) -> Vec<BulkOutcome> {
        let outcomes = if link {
            self.mutator.link_all(parent, selected, false).await
        } else {
            self.mutator.unlink_all(parent, selected).await
        };
        self.reload_written(outcomes).await
    }

    pub async fn insert_link_below(
        &self,
        active: &str,
        target: &str,
        cursor_line: Option<usize>,
    ) -> Result<(), UplinkError> {
        self.mutator
            .insert_link_below(active, target, cursor_line)
            .await?;
        self.reload(active).await
    }

    pub async fn locate_reference_line(
        &self,
        active: &str,
        target: &str,
    ) -> Result<Option<usize>, UplinkError> {
        self.mutator.locate_reference_line(active, target).await
    }

    /// Move `from` to `to` and rewrite every note referring to it, so the references follow
    /// the note instead of dangling.
    ///
    /// Referrers are the backward links of `from`. Their rewritten text is computed before the
    /// move, written after it, and each rewritten referrer is re-indexed. Fails without
    /// touching anything when `from` is unknown or `to` already exists; otherwise returns one
    /// outcome per referrer.
    #[tracing::instrument(skip(self))]
    pub async fn rename_note(&self, from: &str, to: &str) -> Result<Vec<BulkOutcome>, UplinkError> {
        if self.index.read().contains(to) {
            return Err(UplinkError::Precondition(format!(
                "cannot rename '{from}': '{to}' already exists"
            )));
        }
        let referrers = self
            .active_node(from)
            .ok_or_else(|| UplinkError::NotFound(format!("note '{from}' is not in the graph")))?
            .backward_links
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        let edits = self.mutator.retargeted(from, to, &referrers).await;

        self.mutator.rename(from, to).await?;
        let event = self.index.write().rename_note(from, to)?;
        self.refresh(&event)?;

        let outcomes = self.mutator.write_all(edits).await;
        tracing::info!("Renamed '{}' to '{}', {} referrers", from, to, outcomes.len());
        Ok(self.reload_written(outcomes).await)
    }

    async fn reload_written(&self, outcomes: Vec<BulkOutcome>) -> Vec<BulkOutcome> {
        let mut reloaded = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let result = match outcome.result {
                Ok(true) => self.reload(&outcome.path).await.map(|_| true),
                other => other,
            };
            reloaded.push(BulkOutcome {
                path: outcome.path,
                result,
            });
        }
        reloaded
    }

    /// Re-read `path` from the store, index it and refresh the graph.
    pub async fn reload(&self, path: &str) -> Result<(), UplinkError> {
        let text = self.mutator.store().read(path).await?;
        self.apply(|index| index.upsert_note(path, &text))?;
        Ok(())
    }

    /// Change the index with `f` and refresh the graph for the notification it returns.
    pub fn apply<F>(&self, f: F) -> Result<NoteEvent, UplinkError>
    where
        F: FnOnce(&mut VaultIndex) -> NoteEvent,
    {
        let event = f(&mut self.index.write());
        self.refresh(&event)?;
        Ok(event)
    }

    fn refresh(&self, event: &NoteEvent) -> Result<(), UplinkError> {
        let index = self.index.read();
        let mut graph = self.graph.write();
        for path in event.paths() {
            graph.upsert(&*index, path)?;
        }
        tracing::debug!("Applied {}", event);
        Ok(())
    }
}
