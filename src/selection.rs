//! Scheduled sampling of the editor selection.
//!
//! The editor is polled every `selection_interval_ms` through a [SelectionSource]. The notes
//! referenced by the selected lines of the active note are published on a
//! [tokio::sync::watch] channel, so bulk operations can act on "the selected notes". The link
//! graph itself never polls; only [SelectionSampler] does.
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

use crate::graph::SharedGraph;

/// A selected run of whole lines, zero based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        LineRange {
            start: start.min(end),
            end: start.max(end),
        }
    }
}

/// What the editor reports at one sampling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSample {
    /// Path of the note open in the editor.
    pub active: String,
    pub ranges: Vec<LineRange>,
    /// Text of the lines covered by the selection.
    pub text: String,
    /// True when the selection has no extent (a bare cursor).
    pub collapsed: bool,
}

/// Editor integration providing the current selection.
pub trait SelectionSource: Send + Sync {
    fn sample(&self) -> Option<SelectionSample>;
}

#[derive(Debug, Default)]
struct SamplerState {
    last: Option<SelectionSample>,
    /// Selection made programmatically; kept until the editor reports a different sample.
    pinned: Option<Vec<String>>,
}

pub struct SelectionSampler<S: SelectionSource> {
    source: S,
    graph: SharedGraph,
    interval: Duration,
    state: Mutex<SamplerState>,
    tx: watch::Sender<Vec<String>>,
}

impl<S: SelectionSource> SelectionSampler<S> {
    pub fn new(
        source: S,
        graph: SharedGraph,
        interval: Duration,
    ) -> (Self, watch::Receiver<Vec<String>>) {
        let (tx, rx) = watch::channel(Vec::new());
        (
            SelectionSampler {
                source,
                graph,
                interval,
                state: Mutex::new(SamplerState::default()),
                tx,
            },
            rx,
        )
    }

    /// Another receiver of the published selection, for consumers added after construction.
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.tx.subscribe()
    }

    /// Select `notes` until the editor selection changes, e.g. after highlighting the line
    /// that references a note.
    pub fn pin(&self, notes: Vec<String>) {
        let mut state = self.state.lock();
        state.last = self.source.sample();
        state.pinned = Some(notes.clone());
        self.publish(notes);
    }

    /// Sample the editor once. Returns whether the published selection changed.
    pub fn tick(&self) -> bool {
        let sample = self.source.sample();
        let mut state = self.state.lock();
        if state.pinned.is_some() && state.last == sample {
            return false;
        }
        state.pinned = None;
        let selected = match sample.as_ref() {
            Some(sample) if !sample.collapsed && sample.ranges.len() == 1 => self
                .graph
                .read()
                .resolve_text(&sample.text, Some(&sample.active))
                .into_iter()
                .map(|reference| reference.node.path.clone())
                .collect(),
            _ => Vec::new(),
        };
        state.last = sample;
        self.publish(selected)
    }

    fn publish(&self, selected: Vec<String>) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == selected {
                false
            } else {
                *current = selected;
                true
            }
        })
    }

    /// Sample until every receiver is gone.
    pub async fn run(self: Arc<Self>) {
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        while !self.tx.is_closed() {
            ticks.tick().await;
            if self.tick() {
                tracing::trace!("Selection changed");
            }
        }
        tracing::debug!("Selection sampler stopped");
    }
}
