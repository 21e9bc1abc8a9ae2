//! # Vault watching
//!
//! [VaultWatcher] watches a vault directory through `notify-debouncer-full` and translates the
//! debounced filesystem events of note files into [NoteEvent]s, the same notifications a host
//! application's metadata index would emit. Dot-files and anything below a dot-directory
//! (`.git`, `.obsidian`, `.trash`) are ignored.
//!
//! ```rust,no_run
//! use uplink_core::{event::NoteEvent, index::VaultIndex, watch::{refresh_index, VaultWatcher}};
//! use std::{path::PathBuf, time::Duration};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), uplink_core::UplinkError> {
//! let root = PathBuf::from("./vault");
//! let mut index = VaultIndex::load_dir(&root)?;
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<NoteEvent>();
//! let _watcher = VaultWatcher::new(&root, Duration::from_millis(500), tx)?;
//! while let Some(event) = rx.recv().await {
//!     refresh_index(&root, &mut index, &event)?;
//! }
//! # Ok(())
//! # }
//! ```
use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{ModifyKind, RenameMode},
        Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::{
    fs::read_to_string,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    error::UplinkError,
    event::NoteEvent,
    index::VaultIndex,
    paths::{os_path_to_string, NotePath},
};

pub struct VaultWatcher {
    root: PathBuf,
    debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl VaultWatcher {
    /// Start watching `root`. Events are sent on `tx` after `delay` of quiet.
    pub fn new<P: AsRef<Path>>(
        root: P,
        delay: Duration,
        tx: UnboundedSender<NoteEvent>,
    ) -> Result<VaultWatcher, UplinkError> {
        let root = root.as_ref().to_path_buf();
        let handler_root = root.clone();
        let mut debouncer = new_debouncer(delay, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events.iter() {
                        for note_event in note_events(&handler_root, &event.event) {
                            tracing::debug!("[VaultWatcher] {}", note_event);
                            if let Err(e) = tx.send(note_event) {
                                tracing::warn!("[VaultWatcher] {}", UplinkError::from(e));
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    tracing::error!("Notify debouncer returned errors: {:?}", errors);
                }
            }
        })?;
        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("Watching vault {:?}", root);
        Ok(VaultWatcher { root, debouncer })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(mut self) -> Result<(), UplinkError> {
        self.debouncer.watcher().unwatch(&self.root)?;
        Ok(())
    }
}

/// Vault-relative path of a note file, or `None` for anything that is not a visible note.
fn note_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let hidden = relative.components().any(|component| match component {
        Component::Normal(name) => name.to_str().is_some_and(|name| name.starts_with('.')),
        _ => false,
    });
    if hidden {
        return None;
    }
    let relative = os_path_to_string(relative);
    NotePath::new(&relative).is_note().then_some(relative)
}

/// Note notifications for one filesystem event.
pub fn note_events(root: &Path, event: &Event) -> Vec<NoteEvent> {
    let paths = event
        .paths
        .iter()
        .map(|path| note_path(root, path))
        .collect::<Vec<_>>();
    let notes = || paths.iter().flatten().cloned();
    match event.kind {
        EventKind::Create(_) => notes().map(NoteEvent::Created).collect(),
        EventKind::Remove(_) => notes().map(NoteEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [Some(from), Some(to)] => vec![NoteEvent::Renamed(from.clone(), to.clone())],
            // Moved in or out of the visible part of the vault
            [None, Some(to)] => vec![NoteEvent::Created(to.clone())],
            [Some(from), None] => vec![NoteEvent::Deleted(from.clone())],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            notes().map(NoteEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            notes().map(NoteEvent::Created).collect()
        }
        EventKind::Modify(_) => notes().map(NoteEvent::MetadataChanged).collect(),
        _ => Vec::new(),
    }
}

/// Bring `index` in line with the file a notification is about.
pub fn refresh_index(
    root: &Path,
    index: &mut VaultIndex,
    event: &NoteEvent,
) -> Result<(), UplinkError> {
    match event {
        NoteEvent::Created(path) | NoteEvent::MetadataChanged(path) => {
            match read_to_string(root.join(path)) {
                Ok(text) => {
                    index.upsert_note(path, &text);
                }
                // Deleted again before the event was handled
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    index.remove_note(path);
                }
                Err(e) => return Err(e.into()),
            }
        }
        NoteEvent::Deleted(path) => {
            index.remove_note(path);
        }
        NoteEvent::Renamed(from, to) => {
            if index.rename_note(from, to).is_err() {
                index.upsert_note(to, &read_to_string(root.join(to))?);
            }
        }
        NoteEvent::IndexReady => index.set_ready(true),
    }
    Ok(())
}
