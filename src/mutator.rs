//! Writing parent relationships back to note headers.
//!
//! Edits are computed synchronously against a short-lived read of the link graph
//! ([HeaderEdit]) and written through a [NoteStore] afterwards, so no graph lock is held while a
//! write is in flight. The graph itself is never touched here: it picks the change up from the
//! store once the write succeeded.
use futures::future::join_all;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::UplinkError,
    graph::SharedGraph,
    note::{compose, header_line_count, parent_tokens, split_header, HeaderBlock},
    paths::{resolve_among, PathResolver},
    tokenizer::{link_tokens, replace_tokens},
};

/// Storage the notes live in.
pub trait NoteStore: Sync {
    fn read(&self, path: &str) -> impl Future<Output = Result<String, UplinkError>> + Send;

    fn write(
        &self,
        path: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), UplinkError>> + Send;

    /// Move the note at `from` to `to`.
    fn rename(
        &self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<(), UplinkError>> + Send;
}

#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: Mutex<BTreeMap<String, String>>,
}

impl MemoryNoteStore {
    pub fn new<I, P, T>(notes: I) -> MemoryNoteStore
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: Into<String>,
    {
        MemoryNoteStore {
            notes: Mutex::new(
                notes
                    .into_iter()
                    .map(|(path, text)| (path.into(), text.into()))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.notes.lock().get(path).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.notes.lock().clone()
    }
}

impl NoteStore for MemoryNoteStore {
    async fn read(&self, path: &str) -> Result<String, UplinkError> {
        self.get(path)
            .ok_or_else(|| UplinkError::NotFound(format!("note '{path}' is not in the store")))
    }

    async fn write(&self, path: &str, text: &str) -> Result<(), UplinkError> {
        self.notes.lock().insert(path.to_string(), text.to_string());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), UplinkError> {
        let mut notes = self.notes.lock();
        let text = notes
            .remove(from)
            .ok_or_else(|| UplinkError::NotFound(format!("note '{from}' is not in the store")))?;
        notes.insert(to.to_string(), text);
        Ok(())
    }
}

/// Notes stored as files below a vault directory.
#[derive(Debug, Clone)]
pub struct FsNoteStore {
    root: PathBuf,
}

impl FsNoteStore {
    pub fn new<P: AsRef<Path>>(root: P) -> FsNoteStore {
        FsNoteStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl NoteStore for FsNoteStore {
    async fn read(&self, path: &str) -> Result<String, UplinkError> {
        Ok(tokio::fs::read_to_string(self.full_path(path)).await?)
    }

    async fn write(&self, path: &str, text: &str) -> Result<(), UplinkError> {
        tokio::fs::write(self.full_path(path), text)
            .await
            .map_err(|e| UplinkError::Store {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), UplinkError> {
        let target = self.full_path(to);
        let store_error = |e: std::io::Error| UplinkError::Store {
            path: from.to_string(),
            reason: e.to_string(),
        };
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(store_error)?;
        }
        tokio::fs::rename(self.full_path(from), target)
            .await
            .map_err(store_error)
    }
}

/// Pure header rewrites for one parent property, resolved against a corpus snapshot.
pub struct HeaderEdit<'a> {
    property: &'a str,
    resolver: &'a PathResolver,
}

impl<'a> HeaderEdit<'a> {
    pub fn new(property: &'a str, resolver: &'a PathResolver) -> Self {
        HeaderEdit { property, resolver }
    }

    /// New note text with `parent` appended to the parent list, or `None` when it is already
    /// declared. A scalar value is turned into a list first.
    pub fn add_parent(&self, text: &str, parent: &str) -> Result<Option<String>, UplinkError> {
        let (mut header, body) = editable_header(text)?;
        let mut entries = entries_of(header.get(self.property));
        if entries
            .iter()
            .flat_map(parent_tokens)
            .any(|token| self.resolver.resolve_path(&token).as_deref() == Some(parent))
        {
            return Ok(None);
        }
        entries.push(Value::String(self.resolver.link_for(parent)));
        header.insert(Value::String(self.property.to_string()), Value::Sequence(entries));
        compose(&header, body).map(Some)
    }

    /// New note text without any parent entry denoting `parent`, or `None` when there was
    /// nothing to remove. The remaining entries are always written back as a list.
    pub fn remove_parent(&self, text: &str, parent: &str) -> Result<Option<String>, UplinkError> {
        let Some((yaml, body)) = split_header(text) else {
            return Ok(None);
        };
        let mut header = parsed_header(yaml)?;
        let Some(value) = header.get(self.property) else {
            return Ok(None);
        };
        let entries = entries_of(Some(value));
        let kept = entries
            .iter()
            .filter(|entry| {
                !parent_tokens(entry)
                    .iter()
                    .any(|token| self.resolver.denotes(token, parent))
            })
            .cloned()
            .collect::<Vec<_>>();
        if kept.len() == entries.len() {
            return Ok(None);
        }
        header.insert(Value::String(self.property.to_string()), Value::Sequence(kept));
        compose(&header, body).map(Some)
    }

    /// New note text where every reference resolving to `from`, in the body or the parent
    /// property, names `name` instead. `None` when nothing in the note refers to `from`.
    ///
    /// Body references keep their heading and display text. A parent entry referring to
    /// `from` is replaced by a plain `[[name]]` entry. A malformed header is left alone.
    pub fn retarget(&self, text: &str, from: &str, name: &str) -> Option<String> {
        let refers = |token: &str| self.resolver.resolve_path(token).as_deref() == Some(from);
        let (yaml, body) = match split_header(text) {
            Some((yaml, body)) => (Some(yaml), body),
            None => (None, text),
        };
        let header = &text[..text.len() - body.len()];
        let new_header = yaml.and_then(|yaml| self.retarget_header(yaml, &refers, name));
        let new_body = replace_tokens(body, |token| refers(token).then(|| name.to_string()));
        if new_header.is_none() && new_body == body {
            return None;
        }
        Some(format!(
            "{}{}",
            new_header.as_deref().unwrap_or(header),
            new_body
        ))
    }

    /// Fenced header block with parent entries referring to the renamed note replaced.
    fn retarget_header(
        &self,
        yaml: &str,
        refers: &impl Fn(&str) -> bool,
        name: &str,
    ) -> Option<String> {
        let HeaderBlock::Parsed(mut header) = HeaderBlock::parse(yaml) else {
            return None;
        };
        let value = header.get(self.property)?;
        let link = Value::String(format!("[[{name}]]"));
        let retarget_entry = |entry: &Value| {
            if parent_tokens(entry).iter().any(|token| refers(token)) {
                link.clone()
            } else {
                entry.clone()
            }
        };
        let retargeted = match value {
            Value::Sequence(items) => Value::Sequence(items.iter().map(retarget_entry).collect()),
            other => retarget_entry(other),
        };
        if &retargeted == value {
            return None;
        }
        header.insert(Value::String(self.property.to_string()), retargeted);
        match compose(&header, "") {
            Ok(fenced) => Some(fenced),
            Err(e) => {
                tracing::warn!("Failed to rewrite header: {}", e);
                None
            }
        }
    }

    /// `text` with a line holding the canonical reference to `target` inserted after
    /// `cursor_line` (zero based, counted over the whole text). The rest of the text is kept
    /// byte for byte, line endings included.
    pub fn insert_link_below(&self, text: &str, target: &str, cursor_line: usize) -> String {
        let link = self.resolver.link_for(target);
        let mut offset = 0;
        let mut newline = "\n";
        for (number, line) in text.split_inclusive('\n').enumerate() {
            if line.ends_with("\r\n") {
                newline = "\r\n";
            }
            offset += line.len();
            if number == cursor_line {
                break;
            }
        }
        let mut result = String::with_capacity(text.len() + link.len() + newline.len());
        result.push_str(&text[..offset]);
        if offset == text.len() && !text.ends_with('\n') {
            if !text.is_empty() {
                result.push_str(newline);
            }
            result.push_str(&link);
        } else {
            result.push_str(&link);
            result.push_str(newline);
        }
        result.push_str(&text[offset..]);
        result
    }
}

fn editable_header(text: &str) -> Result<(Mapping, &str), UplinkError> {
    match split_header(text) {
        Some((yaml, body)) => Ok((parsed_header(yaml)?, body)),
        None => Ok((Mapping::new(), text)),
    }
}

fn parsed_header(yaml: &str) -> Result<Mapping, UplinkError> {
    match HeaderBlock::parse(yaml) {
        HeaderBlock::Parsed(mapping) => Ok(mapping),
        HeaderBlock::Malformed(reason) => Err(UplinkError::Header(reason)),
        HeaderBlock::Absent => Ok(Mapping::new()),
    }
}

fn entries_of(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// First body line of `text` whose references resolve to `target` among `scope`. Header
/// lines are never reported.
pub fn locate_reference_line<'p>(
    text: &str,
    target: &str,
    scope: impl IntoIterator<Item = &'p str> + Clone,
) -> Option<usize> {
    let skip = header_line_count(text);
    text.lines()
        .enumerate()
        .skip(skip)
        .find(|(_, line)| {
            link_tokens(line).any(|token| {
                resolve_among(token, scope.clone()).is_some_and(|found| found.path == target)
            })
        })
        .map(|(number, _)| number)
}

/// Outcome of one note in a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub path: String,
    /// `Ok(true)` when the note was rewritten, `Ok(false)` when it already had the wanted state.
    pub result: Result<bool, UplinkError>,
}

/// Applies parent relationship edits to notes in a [NoteStore].
///
/// Calls for different notes may run concurrently; callers serialize writes to the same note.
pub struct RelationshipMutator<S: NoteStore> {
    store: Arc<S>,
    graph: SharedGraph,
}

impl<S: NoteStore> Clone for RelationshipMutator<S> {
    fn clone(&self) -> Self {
        RelationshipMutator {
            store: self.store.clone(),
            graph: self.graph.clone(),
        }
    }
}

impl<S: NoteStore> RelationshipMutator<S> {
    pub fn new(store: Arc<S>, graph: SharedGraph) -> Self {
        RelationshipMutator { store, graph }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn edit<T>(&self, f: impl FnOnce(HeaderEdit<'_>) -> T) -> T {
        let graph = self.graph.read();
        f(HeaderEdit::new(
            &graph.settings().parent_property,
            graph.resolver(),
        ))
    }

    /// Returns whether the child was rewritten.
    #[tracing::instrument(skip(self))]
    pub async fn add_parent(&self, child: &str, parent: &str) -> Result<bool, UplinkError> {
        let text = self.store.read(child).await?;
        let Some(updated) = self.edit(|edit| edit.add_parent(&text, parent))? else {
            tracing::debug!("'{}' already declares '{}' as parent", child, parent);
            return Ok(false);
        };
        self.write(child, &updated).await?;
        Ok(true)
    }

    /// Returns whether the child was rewritten.
    #[tracing::instrument(skip(self))]
    pub async fn remove_parent(&self, child: &str, parent: &str) -> Result<bool, UplinkError> {
        let text = self.store.read(child).await?;
        let Some(updated) = self.edit(|edit| edit.remove_parent(&text, parent))? else {
            return Ok(false);
        };
        self.write(child, &updated).await?;
        Ok(true)
    }

    pub async fn write(&self, path: &str, text: &str) -> Result<(), UplinkError> {
        self.store.write(path, text).await.inspect_err(|e| {
            tracing::warn!("Failed to write '{}': {}", path, e);
        })
    }

    /// Add `parent` to every child, waiting for all writes. Structural children are left alone
    /// when `skip_structural` is set.
    pub async fn link_all(
        &self,
        parent: &str,
        children: &[String],
        skip_structural: bool,
    ) -> Vec<BulkOutcome> {
        let targets = {
            let graph = self.graph.read();
            children
                .iter()
                .filter(|child| child.as_str() != parent)
                .filter(|child| {
                    !skip_structural
                        || !graph.get(child).is_some_and(|node| node.is_structural)
                })
                .cloned()
                .collect::<Vec<_>>()
        };
        let results = join_all(targets.iter().map(|child| self.add_parent(child, parent))).await;
        bulk_outcomes(targets, results)
    }

    /// Remove `parent` from every child, waiting for all writes.
    pub async fn unlink_all(&self, parent: &str, children: &[String]) -> Vec<BulkOutcome> {
        let results =
            join_all(children.iter().map(|child| self.remove_parent(child, parent))).await;
        bulk_outcomes(children.to_vec(), results)
    }

    /// Rewritten text of every referrer of `from`, computed before `from` is renamed to `to`.
    ///
    /// References are matched against the corpus as it is now and renamed to the display
    /// name `to` will have once the rename happened. A referrer that is `from` itself is
    /// reported under `to`. `Ok(None)` marks a referrer with nothing to rewrite.
    pub async fn retargeted(
        &self,
        from: &str,
        to: &str,
        referrers: &[String],
    ) -> Vec<(String, Result<Option<String>, UplinkError>)> {
        let texts = join_all(referrers.iter().map(|path| self.store.read(path))).await;
        let graph = self.graph.read();
        let mut renamed = graph.resolver().clone();
        renamed.remove(from);
        renamed.insert(to);
        let name = renamed.unique_link_name(to);
        let edit = HeaderEdit::new(&graph.settings().parent_property, graph.resolver());
        referrers
            .iter()
            .zip(texts)
            .map(|(path, text)| {
                let path = if path == from { to } else { path.as_str() };
                let edited = text.map(|text| edit.retarget(&text, from, &name));
                (path.to_string(), edited)
            })
            .collect()
    }

    /// Write every computed edit, waiting for all writes.
    pub async fn write_all(
        &self,
        edits: Vec<(String, Result<Option<String>, UplinkError>)>,
    ) -> Vec<BulkOutcome> {
        let results = join_all(edits.iter().map(|(path, edit)| async move {
            match edit {
                Ok(Some(text)) => self.write(path, text).await.map(|_| true),
                Ok(None) => Ok(false),
                Err(e) => Err(e.clone()),
            }
        }))
        .await;
        bulk_outcomes(edits.into_iter().map(|(path, _)| path).collect(), results)
    }

    /// Move `from` to `to` in the store.
    #[tracing::instrument(skip(self))]
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), UplinkError> {
        self.store.rename(from, to).await.inspect_err(|e| {
            tracing::warn!("Failed to move '{}' to '{}': {}", from, to, e);
        })
    }

    /// Insert the canonical reference to `target` on the line after the cursor of `active`.
    pub async fn insert_link_below(
        &self,
        active: &str,
        target: &str,
        cursor_line: Option<usize>,
    ) -> Result<(), UplinkError> {
        let Some(cursor_line) = cursor_line else {
            return Err(UplinkError::Precondition(format!(
                "no cursor in '{active}' to insert a link to '{target}'"
            )));
        };
        let text = self.store.read(active).await?;
        let updated = self.edit(|edit| edit.insert_link_below(&text, target, cursor_line));
        self.write(active, &updated).await
    }

    /// Line of `active` referencing `target` through one of its forward links.
    pub async fn locate_reference_line(
        &self,
        active: &str,
        target: &str,
    ) -> Result<Option<usize>, UplinkError> {
        let text = self.store.read(active).await?;
        let scope = self
            .graph
            .read()
            .get(active)
            .map(|node| node.forward_links.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(locate_reference_line(
            &text,
            target,
            scope.iter().map(String::as_str),
        ))
    }
}

fn bulk_outcomes(paths: Vec<String>, results: Vec<Result<bool, UplinkError>>) -> Vec<BulkOutcome> {
    paths
        .into_iter()
        .zip(results)
        .map(|(path, result)| BulkOutcome { path, result })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new(["Root.md", "Maps/Area.md", "Other/Area.md", "Child.md"])
    }

    fn add(text: &str, parent: &str) -> Option<String> {
        let resolver = resolver();
        HeaderEdit::new("up", &resolver).add_parent(text, parent).unwrap()
    }

    fn remove(text: &str, parent: &str) -> Option<String> {
        let resolver = resolver();
        HeaderEdit::new("up", &resolver)
            .remove_parent(text, parent)
            .unwrap()
    }

    fn up_value(text: &str) -> Option<Value> {
        let (yaml, _) = split_header(text)?;
        HeaderBlock::parse(yaml).get("up").cloned()
    }

    #[test]
    fn test_add_creates_header() {
        let text = add("Body [[Root]]\n", "Root.md").unwrap();
        assert_eq!(text, "---\nup:\n- '[[Root]]'\n---\nBody [[Root]]\n");
    }

    #[test]
    fn test_add_normalizes_scalar_and_disambiguates() {
        let text = add("---\nup: Root\ntitle: x\n---\nbody", "Maps/Area.md").unwrap();
        let value = up_value(&text).unwrap();
        assert_eq!(
            value,
            serde_yaml::from_str::<Value>("[Root, '[[Maps/Area]]']").unwrap()
        );
        assert!(text.ends_with("---\nbody"));
        assert!(text.contains("title: x"));
    }

    #[test]
    fn test_add_existing_parent_is_noop() {
        assert_eq!(add("---\nup: \"[[Root|home]]\"\n---\n", "Root.md"), None);
        assert_eq!(add("---\nup:\n  path: Root.md\n---\n", "Root.md"), None);
    }

    #[test]
    fn test_remove_tolerates_brackets() {
        let text = "---\nup:\n  - \"[[Root]]\"\n  - Maps/Area\n  - Child.md\n---\n";
        let removed = remove(text, "Maps/Area.md").unwrap();
        assert_eq!(
            up_value(&removed).unwrap(),
            serde_yaml::from_str::<Value>("['[[Root]]', Child.md]").unwrap()
        );
        assert_eq!(remove(text, "Other/Area.md"), None);
        assert_eq!(remove("no header", "Root.md"), None);
        assert_eq!(remove("---\ntitle: t\n---\n", "Root.md"), None);
    }

    #[test]
    fn test_add_remove_round_trip() {
        let original = "---\nup:\n  - \"[[Root]]\"\n---\ntext\n";
        let added = add(original, "Child.md").unwrap();
        let restored = remove(&added, "Child.md").unwrap();
        assert_eq!(up_value(&restored), up_value(original));

        // Scalar values stay lists once rewritten
        let scalar = "---\nup: Root\n---\n";
        let restored = remove(&add(scalar, "Child.md").unwrap(), "Child.md").unwrap();
        assert_eq!(
            up_value(&restored).unwrap(),
            serde_yaml::from_str::<Value>("[Root]").unwrap()
        );
    }

    #[test]
    fn test_malformed_header_is_an_error() {
        let resolver = resolver();
        let edit = HeaderEdit::new("up", &resolver);
        assert!(matches!(
            edit.add_parent("---\nup: [[[x\n---\n", "Root.md"),
            Err(UplinkError::Header(_))
        ));
        assert!(matches!(
            edit.remove_parent("---\n- a\n---\n", "Root.md"),
            Err(UplinkError::Header(_))
        ));
    }

    #[test]
    fn test_insert_link_below() {
        let resolver = resolver();
        let edit = HeaderEdit::new("up", &resolver);
        assert_eq!(
            edit.insert_link_below("a\nb\n", "Maps/Area.md", 0),
            "a\n[[Maps/Area]]\nb\n"
        );
        assert_eq!(edit.insert_link_below("a", "Root.md", 10), "a\n[[Root]]");
        assert_eq!(edit.insert_link_below("", "Root.md", 0), "[[Root]]");
        assert_eq!(
            edit.insert_link_below("a\nb\n", "Root.md", 10),
            "a\nb\n[[Root]]\n"
        );
    }

    #[test]
    fn test_insert_link_below_keeps_crlf() {
        let resolver = resolver();
        let edit = HeaderEdit::new("up", &resolver);
        let text = "---\r\nup: Root\r\n---\r\na\r\nb\r\n";
        assert_eq!(
            edit.insert_link_below(text, "Child.md", 3),
            "---\r\nup: Root\r\n---\r\na\r\n[[Child]]\r\nb\r\n"
        );
        assert_eq!(
            edit.insert_link_below("a\r\nb", "Child.md", 1),
            "a\r\nb\r\n[[Child]]"
        );
    }

    #[test]
    fn test_retarget_header_and_body() {
        let resolver = PathResolver::new(["P.md", "Q.md", "Maps/Area.md", "Other/Area.md"]);
        let edit = HeaderEdit::new("up", &resolver);

        let text = "---\nup: P\ntitle: t\n---\n[[P]] and [[P#Intro|see]] but [[Q]]\n";
        let retargeted = edit.retarget(text, "P.md", "P2").unwrap();
        assert!(retargeted.ends_with("---\n[[P2]] and [[P2#Intro|see]] but [[Q]]\n"));
        assert_eq!(
            up_value(&retargeted).unwrap(),
            Value::String("[[P2]]".to_string())
        );
        assert!(retargeted.contains("title: t"));

        let text = "---\nup:\n  - Q\n  - \"[[Maps/Area]]\"\n---\nbody";
        let retargeted = edit.retarget(text, "Maps/Area.md", "Area").unwrap();
        assert_eq!(
            up_value(&retargeted).unwrap(),
            serde_yaml::from_str::<Value>("[Q, '[[Area]]']").unwrap()
        );
        assert!(retargeted.ends_with("---\nbody"));
    }

    #[test]
    fn test_retarget_keeps_untouched_text() {
        let resolver = PathResolver::new(["P.md", "A/Car.md", "B/Car.md"]);
        let edit = HeaderEdit::new("up", &resolver);
        // Ambiguous tokens do not refer to a single note and stay as they are
        assert_eq!(edit.retarget("[[Car]] [[Q]]", "A/Car.md", "Car"), None);
        assert_eq!(edit.retarget("---\nup: [Q]\n---\n", "P.md", "P2"), None);

        let text = "---\nup:   [Q]   # kept as written\n---\nsee [[P]]";
        assert_eq!(
            edit.retarget(text, "P.md", "P2").unwrap(),
            "---\nup:   [Q]   # kept as written\n---\nsee [[P2]]"
        );
    }

    #[test]
    fn test_locate_reference_line() {
        let text = "---\nup: \"[[Root]]\"\n---\nintro\nsee [[Area]] and [[Root]]\n";
        let scope = ["Root.md", "Maps/Area.md"];
        assert_eq!(locate_reference_line(text, "Root.md", scope), Some(4));
        assert_eq!(locate_reference_line(text, "Maps/Area.md", scope), Some(4));
        assert_eq!(
            locate_reference_line("---\nup: \"[[Root]]\"\n---\n", "Root.md", scope),
            None
        );
    }
}
