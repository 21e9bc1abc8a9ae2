//! The metadata index collaborator: per-note tags, header block and resolved link data.
//!
//! The link graph never reads note text itself. A host application exposes its own index
//! through [MetadataIndex]; [VaultIndex] is the in-memory implementation used by the CLI, the
//! filesystem watcher and the tests.
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::read_to_string,
    path::Path,
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    error::UplinkError,
    event::NoteEvent,
    note::{HeaderBlock, Note},
    paths::{os_path_to_string, token_stem, NotePath, PathResolver},
    tokenizer::count_tokens,
};

/// Read-only view of the host's metadata index.
///
/// Link data is already resolved to corpus paths; occurrence counts refer to the note body.
pub trait MetadataIndex: Send + Sync {
    /// False while the host is still building its index out of band.
    fn is_ready(&self) -> bool;

    fn paths(&self) -> Vec<String>;

    fn contains(&self, path: &str) -> bool;

    fn tags(&self, path: &str) -> BTreeSet<String>;

    /// `None` for unknown paths.
    fn header(&self, path: &str) -> Option<HeaderBlock>;

    /// Resolved outgoing link targets of `path` with their occurrence counts.
    fn outgoing(&self, path: &str) -> BTreeMap<String, usize>;

    /// Paths of the notes whose body links resolve to `path`.
    fn incoming(&self, path: &str) -> BTreeSet<String>;
}

#[derive(Debug, Clone, Default)]
struct IndexedNote {
    header: HeaderBlock,
    tags: BTreeSet<String>,
    /// Raw body tokens and their occurrence counts.
    tokens: BTreeMap<String, usize>,
}

/// In-memory metadata index over note texts.
///
/// Tokens are resolved lazily against the current membership, so adding or removing a note
/// changes what existing references point to without re-reading any text.
#[derive(Debug, Clone)]
pub struct VaultIndex {
    ready: bool,
    notes: BTreeMap<String, IndexedNote>,
    resolver: PathResolver,
    /// Token stem -> notes containing a body token with that stem.
    token_sources: BTreeMap<String, BTreeSet<String>>,
}

impl Default for VaultIndex {
    fn default() -> Self {
        VaultIndex {
            ready: true,
            notes: BTreeMap::default(),
            resolver: PathResolver::default(),
            token_sources: BTreeMap::default(),
        }
    }
}

impl VaultIndex {
    pub fn new() -> VaultIndex {
        VaultIndex::default()
    }

    /// An index that reports itself as still building until [VaultIndex::set_ready] is called.
    pub fn building() -> VaultIndex {
        VaultIndex {
            ready: false,
            ..Default::default()
        }
    }

    pub fn from_notes<I, P, T>(notes: I) -> VaultIndex
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: AsRef<str>,
    {
        let mut index = VaultIndex::new();
        for (path, text) in notes {
            index.upsert_note(path.as_ref(), text.as_ref());
        }
        index
    }

    /// Index every note below `root`. Dot-files and dot-directories are skipped, paths are
    /// vault-relative with `/` separators.
    #[tracing::instrument(skip_all, fields(root = ?root.as_ref()))]
    pub fn load_dir<P: AsRef<Path>>(root: P) -> Result<VaultIndex, UplinkError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(UplinkError::NotFound(format!(
                "vault directory {root:?} does not exist"
            )));
        }
        let mut index = VaultIndex::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
        for entry in walker {
            let entry = entry.map_err(|e| UplinkError::Io(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = os_path_to_string(entry.path().strip_prefix(root)?);
            if !NotePath::new(&relative).is_note() {
                continue;
            }
            let text = read_to_string(entry.path())?;
            index.upsert_note(&relative, &text);
        }
        tracing::info!("Indexed {} notes", index.len());
        Ok(index)
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Parse and index `text` under `path`. Returns the change notification a host would emit.
    pub fn upsert_note(&mut self, path: &str, text: &str) -> NoteEvent {
        let note = Note::parse(path, text);
        let tags = note.tags();
        let tokens = count_tokens(&note.body)
            .into_iter()
            .map(|(token, count)| (token.to_string(), count))
            .collect::<BTreeMap<_, _>>();
        let existed = self.unregister_tokens(path);
        for token in tokens.keys() {
            if let Some(stem) = token_stem(token) {
                self.token_sources
                    .entry(stem)
                    .or_default()
                    .insert(path.to_string());
            }
        }
        self.notes.insert(
            path.to_string(),
            IndexedNote {
                header: note.header,
                tags,
                tokens,
            },
        );
        self.resolver.insert(path);
        if existed {
            NoteEvent::MetadataChanged(path.to_string())
        } else {
            NoteEvent::Created(path.to_string())
        }
    }

    pub fn remove_note(&mut self, path: &str) -> Option<NoteEvent> {
        if !self.unregister_tokens(path) {
            return None;
        }
        self.notes.remove(path);
        self.resolver.remove(path);
        Some(NoteEvent::Deleted(path.to_string()))
    }

    /// Move a note to a new path, keeping its content. References in other notes are not
    /// rewritten; see [crate::helper::LinksHelper::rename_note] for that.
    pub fn rename_note(&mut self, from: &str, to: &str) -> Result<NoteEvent, UplinkError> {
        let note = self
            .notes
            .get(from)
            .cloned()
            .ok_or_else(|| UplinkError::NotFound(format!("note '{from}' is not indexed")))?;
        self.unregister_tokens(from);
        self.notes.remove(from);
        self.resolver.remove(from);
        for token in note.tokens.keys() {
            if let Some(stem) = token_stem(token) {
                self.token_sources
                    .entry(stem)
                    .or_default()
                    .insert(to.to_string());
            }
        }
        self.notes.insert(to.to_string(), note);
        self.resolver.insert(to);
        Ok(NoteEvent::Renamed(from.to_string(), to.to_string()))
    }

    /// Removes the token registrations of `path`. Returns whether the note was indexed.
    fn unregister_tokens(&mut self, path: &str) -> bool {
        let Some(old) = self.notes.get(path) else {
            return false;
        };
        for token in old.tokens.keys() {
            let Some(stem) = token_stem(token) else {
                continue;
            };
            if let Some(sources) = self.token_sources.get_mut(&stem) {
                sources.remove(path);
                if sources.is_empty() {
                    self.token_sources.remove(&stem);
                }
            }
        }
        true
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

impl MetadataIndex for VaultIndex {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn paths(&self) -> Vec<String> {
        self.notes.keys().cloned().collect()
    }

    fn contains(&self, path: &str) -> bool {
        self.notes.contains_key(path)
    }

    fn tags(&self, path: &str) -> BTreeSet<String> {
        self.notes
            .get(path)
            .map(|note| note.tags.clone())
            .unwrap_or_default()
    }

    fn header(&self, path: &str) -> Option<HeaderBlock> {
        self.notes.get(path).map(|note| note.header.clone())
    }

    fn outgoing(&self, path: &str) -> BTreeMap<String, usize> {
        let mut resolved = BTreeMap::new();
        let Some(note) = self.notes.get(path) else {
            return resolved;
        };
        for (token, count) in note.tokens.iter() {
            if let Some(target) = self.resolver.resolve_path(token) {
                *resolved.entry(target).or_insert(0) += count;
            }
        }
        resolved
    }

    fn incoming(&self, path: &str) -> BTreeSet<String> {
        let stem = NotePath::new(path).filestem();
        self.token_sources
            .get(stem)
            .into_iter()
            .flatten()
            .filter(|source| {
                self.notes.get(source.as_str()).is_some_and(|note| {
                    note.tokens
                        .keys()
                        .any(|token| self.resolver.resolve_path(token).as_deref() == Some(path))
                })
            })
            .cloned()
            .collect()
    }
}
