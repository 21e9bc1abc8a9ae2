//! Resolution of short reference tokens (`Car`, `Projects/Car`) to unique note paths.
//!
//! Candidates are matched on whole path segments compared from the end, so `nana` never
//! resolves to `Banana.md`. When several candidates match, the ones closest to the vault root
//! (fewest segments) win; if more than one remains at that depth the token is ambiguous and
//! resolution fails. Ambiguity is never an error: callers simply drop the token.
//!
//! [PathResolver] keeps an index of paths keyed by file stem so resolution only inspects notes
//! sharing the token's final segment, and supports incremental insert/remove as the vault
//! changes.
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
};

use super::path::{ends_with_segments, strip_note_extension, to_nfc, NotePath};

/// A successfully resolved reference token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub path: String,
    /// Longest common trailing text of the token and the extension-less path. Display only.
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    paths: BTreeSet<String>,
    by_stem: BTreeMap<String, BTreeSet<String>>,
}

impl PathResolver {
    pub fn new<I, S>(paths: I) -> PathResolver
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolver = PathResolver::default();
        for path in paths {
            resolver.insert(path.as_ref());
        }
        resolver
    }

    /// Returns true if the path was not yet known.
    pub fn insert(&mut self, path: &str) -> bool {
        if !self.paths.insert(path.to_string()) {
            return false;
        }
        let stem = NotePath::new(path).filestem().to_string();
        self.by_stem.entry(stem).or_default().insert(path.to_string());
        true
    }

    /// Returns true if the path was known.
    pub fn remove(&mut self, path: &str) -> bool {
        if !self.paths.remove(path) {
            return false;
        }
        let stem = NotePath::new(path).filestem();
        if let Some(bucket) = self.by_stem.get_mut(stem) {
            bucket.remove(path);
            if bucket.is_empty() {
                self.by_stem.remove(stem);
            }
        }
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Every known path sharing the file stem of `path`, including `path` itself if known.
    pub fn same_stem(&self, path: &str) -> impl Iterator<Item = &str> {
        self.stem_bucket(NotePath::new(path).filestem())
    }

    fn stem_bucket(&self, stem: &str) -> impl Iterator<Item = &str> {
        self.by_stem
            .get(stem)
            .into_iter()
            .flat_map(|bucket| bucket.iter().map(String::as_str))
    }

    pub fn resolve(&self, token: &str) -> Option<Resolution> {
        let normalized = normalize_token(token)?;
        let stem = normalized.rsplit('/').next().unwrap_or_default();
        let found = narrow(&normalized, self.stem_bucket(stem));
        if found.is_none() {
            tracing::trace!("Unresolved reference token '{}'", token);
        }
        found.map(|path| Resolution {
            label: ending_similarity(NotePath::new(path).without_extension(), &normalized),
            path: path.to_string(),
        })
    }

    pub fn resolve_path(&self, token: &str) -> Option<String> {
        self.resolve(token).map(|resolution| resolution.path)
    }

    /// Minimal trailing run of path segments (extension stripped) that no other known note
    /// ends with. Falls back to the whole extension-less path.
    pub fn unique_link_name(&self, path: &str) -> String {
        let note_path = NotePath::new(path);
        let others = self
            .same_stem(path)
            .filter(|other| *other != path)
            .map(|other| NotePath::new(other).without_extension())
            .collect::<Vec<_>>();
        for n in 1..=note_path.depth() {
            let suffix = note_path.trailing(n);
            if !others.iter().any(|other| ends_with_segments(other, suffix)) {
                return suffix.to_string();
            }
        }
        note_path.without_extension().to_string()
    }

    /// Whether `token` refers to `path`: it resolves to it, or it is ambiguous and `path` is
    /// among the notes it could mean.
    pub fn denotes(&self, token: &str, path: &str) -> bool {
        match self.resolve_path(token) {
            Some(resolved) => resolved == path,
            None => normalize_token(token).is_some_and(|normalized| {
                ends_with_segments(NotePath::new(path).without_extension(), &normalized)
            }),
        }
    }

    /// Canonical double-bracket reference to `path` against the current corpus.
    pub fn link_for(&self, path: &str) -> String {
        format!("[[{}]]", self.unique_link_name(path))
    }
}

/// Resolve `token` against an arbitrary candidate set without an index.
///
/// Used when resolution must be limited to a subset of the vault, such as the outgoing links
/// of the active note.
pub fn resolve_among<'p, I>(token: &str, candidates: I) -> Option<Resolution>
where
    I: IntoIterator<Item = &'p str>,
{
    let normalized = normalize_token(token)?;
    narrow(&normalized, candidates.into_iter()).map(|path| Resolution {
        label: ending_similarity(NotePath::new(path).without_extension(), &normalized),
        path: path.to_string(),
    })
}

/// Final path segment of a normalized token: the file stem every candidate for it must share.
pub fn token_stem(token: &str) -> Option<String> {
    let normalized = normalize_token(token)?;
    normalized.rsplit('/').next().map(str::to_string)
}

fn normalize_token(token: &str) -> Option<Cow<'_, str>> {
    let trimmed = token.trim().trim_start_matches("./").trim_start_matches('/');
    let stripped = strip_note_extension(trimmed);
    if stripped.is_empty() {
        return None;
    }
    Some(match to_nfc(stripped) {
        Cow::Borrowed(_) => Cow::Borrowed(stripped),
        Cow::Owned(owned) => Cow::Owned(owned),
    })
}

fn narrow<'p>(token: &str, candidates: impl Iterator<Item = &'p str>) -> Option<&'p str> {
    let mut best_depth = usize::MAX;
    let mut best: Vec<&'p str> = Vec::new();
    for candidate in candidates {
        let note_path = NotePath::new(candidate);
        if !ends_with_segments(note_path.without_extension(), token) {
            continue;
        }
        let depth = note_path.depth();
        if depth < best_depth {
            best_depth = depth;
            best.clear();
        }
        if depth == best_depth && !best.contains(&candidate) {
            best.push(candidate);
        }
    }
    match best.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

/// Longest common run of trailing characters of `a` and `b`.
pub fn ending_similarity(a: &str, b: &str) -> String {
    let common = a
        .chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let start = a
        .char_indices()
        .rev()
        .nth(common.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(a.len());
    if common == 0 {
        String::new()
    } else {
        a[start..].to_string()
    }
}
