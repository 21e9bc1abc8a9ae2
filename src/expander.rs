//! Expansion of a single note into a [GraphNode].
//!
//! Backward links are left empty: they are the corpus-wide inverse of every node's forward and
//! parent links, so [crate::graph::LinkGraph] fills them in once all affected nodes exist.
use std::collections::BTreeSet;

use crate::{
    config::LinkSettings,
    index::MetadataIndex,
    node::GraphNode,
    note::{parent_tokens, HeaderBlock},
    paths::PathResolver,
};

pub struct NoteExpander<'a, I: MetadataIndex + ?Sized> {
    settings: &'a LinkSettings,
    resolver: &'a PathResolver,
    index: &'a I,
}

impl<'a, I: MetadataIndex + ?Sized> NoteExpander<'a, I> {
    pub fn new(settings: &'a LinkSettings, resolver: &'a PathResolver, index: &'a I) -> Self {
        NoteExpander {
            settings,
            resolver,
            index,
        }
    }

    /// Expand `path`, or `None` when the note is not part of the corpus.
    pub fn expand(&self, path: &str) -> Option<GraphNode> {
        if !self.resolver.contains(path) || !self.index.contains(path) {
            return None;
        }
        let tags = self.index.tags(path);
        let is_structural = tags.iter().any(|tag| self.settings.is_parent_tag(tag));

        let parent_tokens = self.parent_tokens(path);
        let mut parent_links: Vec<String> = Vec::with_capacity(parent_tokens.len());
        for token in parent_tokens.iter() {
            if let Some(parent) = self.resolver.resolve_path(token) {
                if !parent_links.contains(&parent) {
                    parent_links.push(parent);
                }
            }
        }

        let forward_links = self
            .index
            .outgoing(path)
            .into_iter()
            .filter(|(target, _)| self.resolver.contains(target))
            .filter(|(target, count)| !(*count == 1 && parent_links.contains(target)))
            .map(|(target, _)| target)
            .collect::<BTreeSet<_>>();

        let node = GraphNode {
            path: path.to_string(),
            display_name: self.resolver.unique_link_name(path),
            tags,
            is_structural,
            parent_tokens,
            parent_links,
            forward_links,
            backward_links: BTreeSet::new(),
        };
        tracing::debug!(
            "Expanded '{}': {} parents, {} forward links",
            node.path,
            node.parent_links.len(),
            node.forward_links.len()
        );
        Some(node)
    }

    fn parent_tokens(&self, path: &str) -> Vec<String> {
        match self.index.header(path) {
            Some(HeaderBlock::Parsed(mapping)) => mapping
                .get(self.settings.parent_property.as_str())
                .map(parent_tokens)
                .unwrap_or_default(),
            Some(HeaderBlock::Malformed(reason)) => {
                tracing::warn!(
                    "Ignoring parents of '{}', header block is malformed: {}",
                    path,
                    reason
                );
                Vec::new()
            }
            Some(HeaderBlock::Absent) | None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VaultIndex;
    use test_log::test;

    fn expand(index: &VaultIndex, path: &str) -> GraphNode {
        let settings = LinkSettings::default();
        let resolver = PathResolver::new(index.paths());
        NoteExpander::new(&settings, &resolver, index)
            .expand(path)
            .unwrap()
    }

    #[test]
    fn test_solitary_reference_suppressed() {
        let index = VaultIndex::from_notes([
            ("Y.md", "#MOC"),
            ("X.md", "---\nup: [\"[[Y]]\"]\n---\nText [[Y]]"),
            ("Z.md", "---\nup: [\"[[Y]]\"]\n---\nText [[Y]] and [[Y#again]]"),
        ]);
        let x = expand(&index, "X.md");
        assert_eq!(x.parent_links, vec!["Y.md".to_string()]);
        assert!(!x.forward_links.contains("Y.md"));

        let z = expand(&index, "Z.md");
        assert_eq!(z.parent_links, vec!["Y.md".to_string()]);
        assert!(z.forward_links.contains("Y.md"));

        assert!(expand(&index, "Y.md").is_structural);
    }

    #[test]
    fn test_parents_unique_and_ordered() {
        let index = VaultIndex::from_notes([
            ("B.md", ""),
            ("A.md", ""),
            (
                "C.md",
                "---\nup:\n  - \"[[B]]\"\n  - A\n  - \"[[B|again]]\"\n  - Missing\n---\n",
            ),
        ]);
        let c = expand(&index, "C.md");
        assert_eq!(c.parent_links, vec!["B.md".to_string(), "A.md".to_string()]);
        assert_eq!(c.parent_tokens, vec!["B", "A", "B", "Missing"]);
        assert!(c.forward_links.is_empty());
    }

    #[test]
    fn test_malformed_header_yields_no_parents() {
        let index = VaultIndex::from_notes([
            ("Root.md", ""),
            ("Bad.md", "---\nup: [[[Root\n---\n[[Root]]"),
        ]);
        let bad = expand(&index, "Bad.md");
        assert!(bad.parent_links.is_empty());
        assert!(bad.forward_links.contains("Root.md"));
    }

    #[test]
    fn test_custom_parent_property_and_tag() {
        let index = VaultIndex::from_notes([
            ("Hub.md", "---\ntags: index\n---\n"),
            ("Leaf.md", "---\nparent: Hub\nup: Other\n---\n"),
        ]);
        let settings = LinkSettings {
            parent_property: "parent".to_string(),
            parent_tag: "#index".to_string(),
            ..Default::default()
        }
        .normalized();
        let resolver = PathResolver::new(index.paths());
        let expander = NoteExpander::new(&settings, &resolver, &index);
        assert!(expander.expand("Hub.md").unwrap().is_structural);
        assert_eq!(
            expander.expand("Leaf.md").unwrap().parent_links,
            vec!["Hub.md".to_string()]
        );
        assert!(expander.expand("Gone.md").is_none());
    }

    #[test]
    fn test_display_name_disambiguates() {
        let index = VaultIndex::from_notes([("A/Car.md", ""), ("B/Car.md", ""), ("Bus.md", "")]);
        assert_eq!(expand(&index, "A/Car.md").display_name, "A/Car");
        assert_eq!(expand(&index, "Bus.md").display_name, "Bus");
    }
}
