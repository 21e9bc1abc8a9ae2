use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    path::{Component, Path},
};
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Extension of the notes tracked in a vault.
pub const NOTE_EXTENSION: &str = "md";

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
///
/// The result is NFC-normalized so that paths read from filesystems storing decomposed names
/// compare equal to the link text typed by the user.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::RootDir | Component::CurDir => None,
            _ => Some(c.as_os_str().to_string_lossy()),
        })
        .collect::<Vec<_>>()
        .join("/");
    let res = to_nfc(&res).into_owned();
    tracing::trace!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref(),
        res
    );
    res
}

pub fn to_nfc(s: &str) -> Cow<'_, str> {
    if is_nfc(s) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.nfc().collect())
    }
}

/// Drop a trailing `.md` from a reference token. Other dotted suffixes are part of the name.
pub fn strip_note_extension(token: &str) -> &str {
    token
        .strip_suffix(".md")
        .filter(|stem| !stem.is_empty() && !stem.ends_with('/'))
        .unwrap_or(token)
}

/// Compare two `/`-separated names component by component from the end.
///
/// Returns true when every segment of `suffix` equals the aligned trailing segment of `full`,
/// so `"nana"` does not match `"Banana"` and `"b/Car"` matches `"a/b/Car"`.
pub fn ends_with_segments(full: &str, suffix: &str) -> bool {
    let mut full_parts = full.rsplit('/');
    for part in suffix.rsplit('/') {
        match full_parts.next() {
            Some(candidate) if candidate == part => {}
            _ => return false,
        }
    }
    true
}

/// Vault-relative note path split into its directory, stem and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePath<'a> {
    pub path: &'a str,
    /// Index of the last '/' separating directory from file
    dir_sep: Option<usize>,
    /// Index of the '.' separating filename from extension
    ext_sep: Option<usize>,
}

impl<'a> NotePath<'a> {
    pub fn new(path: &'a str) -> NotePath<'a> {
        let dir_sep = path.rfind('/');
        let file_start = dir_sep.map(|sep| sep + 1).unwrap_or(0);
        let ext_sep = path[file_start..]
            .rfind('.')
            // Hidden files have no extension marker
            .filter(|idx| *idx > 0)
            .map(|idx| idx + file_start);
        NotePath {
            path,
            dir_sep,
            ext_sep,
        }
    }

    pub fn dir(&self) -> &'a str {
        &self.path[0..self.dir_sep.unwrap_or(0)]
    }

    pub fn filename(&self) -> &'a str {
        &self.path[self.dir_sep.map(|sep| sep + 1).unwrap_or(0)..]
    }

    pub fn filestem(&self) -> &'a str {
        let start_idx = self.dir_sep.map(|sep| sep + 1).unwrap_or(0);
        &self.path[start_idx..self.ext_sep.unwrap_or(self.path.len())]
    }

    pub fn ext(&self) -> &'a str {
        self.ext_sep
            .map(|idx| &self.path[idx + 1..])
            .unwrap_or_default()
    }

    pub fn is_note(&self) -> bool {
        self.ext() == NOTE_EXTENSION
            && !self.filename().starts_with('.')
            && !self.path.split('/').any(|part| part.starts_with('.'))
    }

    /// The path with its extension removed, e.g. `Projects/Car` for `Projects/Car.md`.
    pub fn without_extension(&self) -> &'a str {
        &self.path[0..self.ext_sep.unwrap_or(self.path.len())]
    }

    /// Extension-less path segments, last one first.
    pub fn rev_segments(&self) -> impl Iterator<Item = &'a str> {
        self.without_extension().rsplit('/')
    }

    pub fn depth(&self) -> usize {
        self.path.split('/').count()
    }

    /// Shortest run of trailing segments (extension stripped) that contains `n` segments.
    pub fn trailing(&self, n: usize) -> &'a str {
        let base = self.without_extension();
        if n == 0 {
            return "";
        }
        let mut start = base.len();
        for _ in 0..n {
            match base[..start].rfind('/') {
                Some(idx) => start = idx,
                None => return base,
            }
        }
        &base[start + 1..]
    }
}

impl<'a, T: AsRef<str> + ?Sized> From<&'a T> for NotePath<'a> {
    fn from(s: &'a T) -> NotePath<'a> {
        NotePath::new(s.as_ref())
    }
}

impl AsRef<str> for NotePath<'_> {
    fn as_ref(&self) -> &str {
        self.path
    }
}

impl Display for NotePath<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}
