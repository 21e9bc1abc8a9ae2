//! Lexical extraction of double-bracket note references.
//!
//! `[[Projects/Car#Engine|my car]]` yields the token `Projects/Car`: everything before the first
//! heading (`#`), block (`^`) or display-text (`|`) separator, trimmed. No resolution happens
//! here; see [crate::paths::PathResolver].
use once_cell::sync::Lazy;
use regex::{CaptureMatches, Captures, Regex};
use std::{borrow::Cow, collections::BTreeMap};

static WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(.*?)\]\]").expect("wikilink pattern is valid"));

/// Lazy iterator over the reference tokens of a text, in occurrence order.
pub struct LinkTokens<'t> {
    captures: CaptureMatches<'static, 't>,
}

impl<'t> Iterator for LinkTokens<'t> {
    type Item = &'t str;

    fn next(&mut self) -> Option<&'t str> {
        for captures in self.captures.by_ref() {
            if let Some(token) = captures.get(1).and_then(|inner| reference_name(inner.as_str())) {
                return Some(token);
            }
        }
        None
    }
}

/// Tokens of every `[[...]]` reference in `text`, left to right and top to bottom.
pub fn link_tokens(text: &str) -> LinkTokens<'_> {
    LinkTokens {
        captures: WIKILINK.captures_iter(text),
    }
}

/// The note-name part of the inside of a reference, or None when it is empty.
///
/// Also accepts a complete `[[...]]` reference, as found in header values.
pub fn reference_name(inner: &str) -> Option<&str> {
    let inner = inner.trim();
    let inner = inner
        .strip_prefix("[[")
        .and_then(|rest| rest.strip_suffix("]]"))
        .unwrap_or(inner);
    let name = inner
        .split(['#', '|', '^'])
        .next()
        .unwrap_or_default()
        // Table cells escape the display-text separator as `\|`
        .trim_end_matches('\\')
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// `text` with the note-name part of every reference replaced by `rename(token)`, where it
/// returns a new name. Heading, block and display-text parts are kept.
pub fn replace_tokens<F>(text: &str, mut rename: F) -> Cow<'_, str>
where
    F: FnMut(&str) -> Option<String>,
{
    WIKILINK.replace_all(text, |captures: &Captures| {
        let whole = &captures[0];
        let inner = &captures[1];
        let Some(token) = reference_name(inner) else {
            return whole.to_string();
        };
        let Some(name) = rename(token) else {
            return whole.to_string();
        };
        match inner.find(token) {
            Some(start) => format!(
                "[[{}{}{}]]",
                &inner[..start],
                name,
                &inner[start + token.len()..]
            ),
            None => whole.to_string(),
        }
    })
}

/// Occurrence count of every token in `text`.
pub fn count_tokens(text: &str) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for token in link_tokens(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_in_order() {
        let text = "See [[Alpha]] and [[Beta#Heading]].\nThen [[ Gamma | shown ]] [[Delta^block]]";
        assert_eq!(
            link_tokens(text).collect::<Vec<_>>(),
            vec!["Alpha", "Beta", "Gamma", "Delta"]
        );
    }

    #[test]
    fn test_empty_tokens_discarded() {
        let text = "[[]] [[  ]] [[#Only heading]] [[|alias]] [[Real]]";
        assert_eq!(link_tokens(text).collect::<Vec<_>>(), vec!["Real"]);
    }

    #[test]
    fn test_paths_and_escaped_alias() {
        let text = "| [[Projects/Car\\|car]] | [[a/b/c.md]] |";
        assert_eq!(
            link_tokens(text).collect::<Vec<_>>(),
            vec!["Projects/Car", "a/b/c.md"]
        );
    }

    #[test]
    fn test_references_do_not_span_lines() {
        let text = "[[Broken\nlink]] [[Fine]]";
        assert_eq!(link_tokens(text).collect::<Vec<_>>(), vec!["Fine"]);
    }

    #[test]
    fn test_reference_name_of_header_values() {
        assert_eq!(reference_name("[[Root]]"), Some("Root"));
        assert_eq!(reference_name("Root"), Some("Root"));
        assert_eq!(reference_name("[[Root|Home]]"), Some("Root"));
        assert_eq!(reference_name("[[]]"), None);
    }

    #[test]
    fn test_replace_tokens_keeps_suffixes() {
        let text = "[[P]] and [[ P#Intro|see ]] next to [[Q]] | [[P\\|p]]";
        let replaced = replace_tokens(text, |token| (token == "P").then(|| "New/P2".to_string()));
        assert_eq!(
            replaced,
            "[[New/P2]] and [[ New/P2#Intro|see ]] next to [[Q]] | [[New/P2\\|p]]"
        );
        assert!(matches!(
            replace_tokens("no references here", |_| None),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_count_tokens() {
        let counts = count_tokens("[[Root]] [[Root#a]] [[Child]]");
        assert_eq!(counts.get("Root"), Some(&2));
        assert_eq!(counts.get("Child"), Some(&1));
    }
}
