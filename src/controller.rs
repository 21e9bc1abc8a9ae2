//! # Reconciliation controller
//!
//! Turns host change notifications into incremental [LinkGraph] updates.
//!
//! Every tracked path is either clean or has one pending refresh. A notification for a path
//! (re)schedules its refresh `refresh_delay` in the future, superseding any refresh already
//! scheduled for it, so a burst of edits to one note collapses into a single upsert. Due
//! refreshes run in the arrival order of their latest notification.
//!
//! Work is gated twice:
//!
//! - While the consuming view is hidden nothing is refreshed; notifications keep accumulating
//!   and are caught up when the view becomes visible again, with a full rebuild when too many
//!   paths are pending.
//! - Until the metadata index reports readiness, notifications are ignored. Readiness triggers
//!   one full initialize.
//!
//! Consumers register a [GraphObserver] to learn about changed nodes, the active note and
//! visibility, or use [ChannelObserver] to receive [GraphEvent]s over a channel.
//!
//! [LinkGraph]: crate::graph::LinkGraph
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    config::LinkSettings,
    error::UplinkError,
    event::{GraphEvent, NoteEvent},
    graph::SharedGraph,
    index::MetadataIndex,
    node::GraphNode,
};

/// Typed callbacks for graph consumers. Every method defaults to doing nothing.
pub trait GraphObserver: Send + Sync {
    fn node_changed(&self, _path: &str) {}

    fn active_node_changed(&self, _path: &str, _node: Option<Arc<GraphNode>>) {}

    fn visibility_changed(&self, _visible: bool) {}

    fn reinitialized(&self) {}
}

/// Forwards observer callbacks as [GraphEvent]s.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<GraphEvent>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<GraphEvent>) -> Self {
        ChannelObserver { tx }
    }

    fn send(&self, event: GraphEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("Graph event receiver dropped: {}", UplinkError::from(e));
        }
    }
}

impl GraphObserver for ChannelObserver {
    fn node_changed(&self, path: &str) {
        self.send(GraphEvent::NodeChanged(path.to_string()));
    }

    fn active_node_changed(&self, path: &str, node: Option<Arc<GraphNode>>) {
        self.send(GraphEvent::ActiveNodeChanged(path.to_string(), node));
    }

    fn visibility_changed(&self, visible: bool) {
        self.send(GraphEvent::VisibilityChanged(visible));
    }

    fn reinitialized(&self) {
        self.send(GraphEvent::Reinitialized);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Clean,
    PendingRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    due: Instant,
    /// Arrival order of the latest notification for the path.
    seq: u64,
}

/// Messages driving [ReconciliationController::run].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCommand {
    Note(NoteEvent),
    Visible(bool),
    Active(Option<String>),
    Reconfigure(LinkSettings),
}

pub struct ReconciliationController {
    graph: SharedGraph,
    delay: Duration,
    full_rebuild_threshold: usize,
    pending: BTreeMap<String, Pending>,
    seq: u64,
    visible: bool,
    index_ready: bool,
    needs_initialize: bool,
    active: Option<String>,
    observers: Vec<Arc<dyn GraphObserver>>,
}

impl ReconciliationController {
    /// A controller for a visible view over an index that is not known to be ready yet.
    pub fn new(graph: SharedGraph) -> Self {
        let settings = graph.read().settings().clone();
        ReconciliationController {
            graph,
            delay: settings.refresh_delay(),
            full_rebuild_threshold: settings.full_rebuild_threshold,
            pending: BTreeMap::new(),
            seq: 0,
            visible: true,
            index_ready: false,
            needs_initialize: false,
            active: None,
            observers: Vec::new(),
        }
    }

    /// A controller over a graph already initialized from a ready index.
    pub fn initialized(graph: SharedGraph) -> Self {
        ReconciliationController {
            index_ready: true,
            ..ReconciliationController::new(graph)
        }
    }

    pub fn register(&mut self, observer: Arc<dyn GraphObserver>) {
        self.observers.push(observer);
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_index_ready(&self) -> bool {
        self.index_ready
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn state(&self, path: &str) -> RefreshState {
        if self.pending.contains_key(path) {
            RefreshState::PendingRefresh
        } else {
            RefreshState::Clean
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Earliest time a pending refresh becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    /// Record a host notification received at `now`.
    pub fn notify(&mut self, event: &NoteEvent, now: Instant) {
        if matches!(event, NoteEvent::IndexReady) {
            self.set_index_ready();
            return;
        }
        if !self.index_ready {
            tracing::trace!("Index not ready, ignoring {}", event);
            return;
        }
        for path in event.paths() {
            self.seq += 1;
            let previous = self.pending.insert(
                path.to_string(),
                Pending {
                    due: now + self.delay,
                    seq: self.seq,
                },
            );
            if previous.is_some() {
                tracing::trace!("Superseded pending refresh of '{}'", path);
            }
        }
    }

    /// Mark the index ready. The next flush rebuilds the whole graph.
    pub fn set_index_ready(&mut self) {
        if !self.index_ready {
            tracing::debug!("Metadata index ready, scheduling full initialize");
        }
        self.index_ready = true;
        self.needs_initialize = true;
        self.pending.clear();
    }

    /// Run every refresh due at `now`. Returns the paths whose node changed.
    #[tracing::instrument(skip_all)]
    pub fn flush_due<I: MetadataIndex + ?Sized>(
        &mut self,
        index: &I,
        now: Instant,
    ) -> Result<BTreeSet<String>, UplinkError> {
        if !self.visible || !self.index_ready {
            return Ok(BTreeSet::new());
        }
        if self.needs_initialize {
            return self.initialize(index);
        }
        let due = self.pending_in_order(|pending| pending.due <= now);
        self.refresh(index, due)
    }

    /// Pending paths matching `filter`, in arrival order of their latest notification.
    fn pending_in_order(&self, filter: impl Fn(&Pending) -> bool) -> Vec<String> {
        let mut paths = self
            .pending
            .iter()
            .filter(|(_, pending)| filter(pending))
            .map(|(path, pending)| (pending.seq, path.clone()))
            .collect::<Vec<_>>();
        paths.sort();
        paths.into_iter().map(|(_, path)| path).collect()
    }

    /// Show or hide the consuming view. Becoming visible catches up on everything pending.
    pub fn set_visible<I: MetadataIndex + ?Sized>(
        &mut self,
        visible: bool,
        index: &I,
    ) -> Result<BTreeSet<String>, UplinkError> {
        if self.visible == visible {
            return Ok(BTreeSet::new());
        }
        self.visible = visible;
        for observer in self.observers.iter() {
            observer.visibility_changed(visible);
        }
        if !visible || !self.index_ready {
            return Ok(BTreeSet::new());
        }
        if self.needs_initialize || self.pending.len() > self.full_rebuild_threshold {
            tracing::info!(
                "Catching up on {} pending paths with a full initialize",
                self.pending.len()
            );
            return self.initialize(index);
        }
        let pending = self.pending_in_order(|_| true);
        tracing::info!("Catching up on {} pending paths", pending.len());
        self.refresh(index, pending)
    }

    /// Change the active note and tell observers about its current node.
    pub fn set_active(&mut self, path: Option<String>) {
        self.active = path;
        if let Some(active) = self.active.as_deref() {
            let node = self.graph.read().get(active);
            for observer in self.observers.iter() {
                observer.active_node_changed(active, node.clone());
            }
        }
    }

    /// Apply new settings and rebuild the graph under them.
    pub fn reconfigure<I: MetadataIndex + ?Sized>(
        &mut self,
        settings: LinkSettings,
        index: &I,
    ) -> Result<(), UplinkError> {
        let settings = settings.normalized();
        self.delay = settings.refresh_delay();
        self.full_rebuild_threshold = settings.full_rebuild_threshold;
        if !self.index_ready {
            self.graph.write().set_settings(settings);
            return Ok(());
        }
        self.graph.write().reconfigure(settings, index)?;
        self.pending.clear();
        self.needs_initialize = false;
        self.notify_reinitialized();
        Ok(())
    }

    fn initialize<I: MetadataIndex + ?Sized>(
        &mut self,
        index: &I,
    ) -> Result<BTreeSet<String>, UplinkError> {
        self.graph.write().initialize(index)?;
        self.pending.clear();
        self.needs_initialize = false;
        self.notify_reinitialized();
        Ok(BTreeSet::new())
    }

    fn notify_reinitialized(&self) {
        for observer in self.observers.iter() {
            observer.reinitialized();
        }
        if let Some(active) = self.active.as_deref() {
            let node = self.graph.read().get(active);
            for observer in self.observers.iter() {
                observer.active_node_changed(active, node.clone());
            }
        }
    }

    /// Upsert `paths` in order. A path stays pending until its upsert succeeded, so a failed
    /// refresh is retried by the next flush; observers still hear about what changed before it.
    fn refresh<I: MetadataIndex + ?Sized>(
        &mut self,
        index: &I,
        paths: Vec<String>,
    ) -> Result<BTreeSet<String>, UplinkError> {
        let mut changed = BTreeSet::new();
        let mut in_order = Vec::new();
        let mut failure = None;
        {
            let mut graph = self.graph.write();
            for path in paths {
                match graph.upsert(index, &path) {
                    Ok(updated) => {
                        self.pending.remove(&path);
                        for updated in updated {
                            if changed.insert(updated.clone()) {
                                in_order.push(updated);
                            }
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }
        self.notify_changed(&changed, &in_order);
        match failure {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }

    fn notify_changed(&self, changed: &BTreeSet<String>, in_order: &[String]) {
        if changed.is_empty() {
            return;
        }
        tracing::debug!("Reconciled {} changed nodes", changed.len());
        for path in in_order.iter() {
            for observer in self.observers.iter() {
                observer.node_changed(path);
            }
        }
        if let Some(active) = self.active.as_deref() {
            if changed.contains(active) {
                let node = self.graph.read().get(active);
                for observer in self.observers.iter() {
                    observer.active_node_changed(active, node.clone());
                }
            }
        }
    }

    fn handle<I: MetadataIndex + ?Sized>(
        &mut self,
        command: ControllerCommand,
        index: &I,
        now: Instant,
    ) -> Result<(), UplinkError> {
        match command {
            ControllerCommand::Note(event) => {
                let ready = matches!(event, NoteEvent::IndexReady);
                self.notify(&event, now);
                if ready {
                    self.flush_due(index, now)?;
                }
            }
            ControllerCommand::Visible(visible) => {
                self.set_visible(visible, index)?;
            }
            ControllerCommand::Active(path) => self.set_active(path),
            ControllerCommand::Reconfigure(settings) => self.reconfigure(settings, index)?,
        }
        Ok(())
    }

    /// Drive the controller from a command channel until it closes, firing refreshes as they
    /// become due. Refresh failures are logged and do not stop the loop.
    pub async fn run<I: MetadataIndex>(
        mut self,
        index: Arc<RwLock<I>>,
        mut commands: UnboundedReceiver<ControllerCommand>,
    ) {
        loop {
            let deadline = self.next_deadline();
            let sleep = async move {
                match deadline {
                    Some(due) => tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Controller command channel closed");
                        break;
                    };
                    let now = tokio::time::Instant::now().into_std();
                    let result = self.handle(command, &*index.read(), now);
                    if let Err(e) = result {
                        tracing::warn!("Failed to apply controller command: {}", e);
                    }
                }
                _ = sleep => {
                    let now = tokio::time::Instant::now().into_std();
                    let result = self.flush_due(&*index.read(), now);
                    if let Err(e) = result {
                        tracing::warn!("Failed to refresh pending notes: {}", e);
                    }
                }
            }
        }
    }
}
