//! Raw notes: splitting the YAML header block from the body, reading tags and parent
//! references, and composing a note back together after its header was edited.
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

use crate::{
    config::normalize_tag,
    error::UplinkError,
    tokenizer::{link_tokens, reference_name},
};

static INLINE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(,])#([\p{L}\p{N}_/\-]+)").expect("inline tag pattern is valid")
});

/// Header keys holding tags.
const TAG_KEYS: [&str; 2] = ["tags", "tag"];

/// Key of a reference object inside a header value, e.g. `{ path: "Root.md" }`.
const REFERENCE_PATH_KEY: &str = "path";

/// The structured header block of a note.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HeaderBlock {
    #[default]
    Absent,
    Parsed(Mapping),
    /// The block exists but is not a YAML mapping. Carries the parse error.
    Malformed(String),
}

impl HeaderBlock {
    pub fn parse(yaml: &str) -> HeaderBlock {
        if yaml.trim().is_empty() {
            return HeaderBlock::Parsed(Mapping::new());
        }
        match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Mapping(mapping)) => HeaderBlock::Parsed(mapping),
            Ok(Value::Null) => HeaderBlock::Parsed(Mapping::new()),
            Ok(other) => HeaderBlock::Malformed(format!(
                "expected a key/value block, found {}",
                value_kind(&other)
            )),
            Err(e) => HeaderBlock::Malformed(e.to_string()),
        }
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        match self {
            HeaderBlock::Parsed(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mapping().and_then(|mapping| mapping.get(key))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, HeaderBlock::Malformed(_))
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// A note as stored by the host: path, parsed header, and the body following the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub path: String,
    pub header: HeaderBlock,
    pub body: String,
}

impl Note {
    pub fn parse(path: &str, text: &str) -> Note {
        let (header, body) = match split_header(text) {
            Some((yaml, body)) => (HeaderBlock::parse(yaml), body),
            None => (HeaderBlock::Absent, text),
        };
        if let HeaderBlock::Malformed(reason) = &header {
            tracing::warn!("Malformed header block in '{}': {}", path, reason);
        }
        Note {
            path: path.to_string(),
            header,
            body: body.to_string(),
        }
    }

    /// Tags from the header `tags`/`tag` keys and inline `#tags` of the body, without `#`.
    pub fn tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        if let Some(mapping) = self.header.mapping() {
            for key in TAG_KEYS {
                if let Some(value) = mapping.get(key) {
                    collect_header_tags(value, &mut tags);
                }
            }
        }
        tags.extend(inline_tags(&self.body));
        tags
    }

    /// Reference tokens of the parent property, in declaration order. Empty when the header
    /// is absent or malformed.
    pub fn parent_tokens(&self, parent_property: &str) -> Vec<String> {
        self.header
            .get(parent_property)
            .map(parent_tokens)
            .unwrap_or_default()
    }
}

/// Split `text` into its YAML header (without fences) and the body after the closing fence.
///
/// The header must start on the first line with `---`; it ends at the next `---` or `...` line.
pub fn split_header(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let fence = line.trim_end_matches(['\r', '\n']);
        if fence == "---" || fence == "..." {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Number of lines taken by the header block, fences included. Zero without a header.
pub fn header_line_count(text: &str) -> usize {
    match split_header(text) {
        Some((_, body)) => text[..text.len() - body.len()].lines().count(),
        None => 0,
    }
}

/// Normalize a parent-property value to an ordered list of reference tokens.
///
/// The value may be a bare string (`Root` or `[[Root]]`), a reference object with a `path`
/// key, or a list of either.
pub fn parent_tokens(value: &Value) -> Vec<String> {
    let mut tokens = Vec::new();
    collect_parent_tokens(value, &mut tokens);
    tokens
}

fn collect_parent_tokens(value: &Value, tokens: &mut Vec<String>) {
    match value {
        Value::String(s) if s.contains("[[") => {
            tokens.extend(link_tokens(s).map(str::to_string));
        }
        Value::String(s) => tokens.extend(reference_name(s).map(str::to_string)),
        Value::Mapping(mapping) => {
            if let Some(Value::String(path)) = mapping.get(REFERENCE_PATH_KEY) {
                tokens.extend(reference_name(path).map(str::to_string));
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_parent_tokens(item, tokens);
            }
        }
        Value::Tagged(tagged) => collect_parent_tokens(&tagged.value, tokens),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn collect_header_tags(value: &Value, tags: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for tag in s.split(|c: char| c == ',' || c.is_whitespace()) {
                let tag = normalize_tag(tag);
                if !tag.is_empty() {
                    tags.insert(tag.to_string());
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_header_tags(item, tags);
            }
        }
        _ => {}
    }
}

/// Inline `#tag` tokens of a body. Purely numeric tags are not tags.
pub fn inline_tags(body: &str) -> impl Iterator<Item = String> + '_ {
    INLINE_TAG
        .captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .map(|tag| tag.as_str())
        .filter(|tag| !tag.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Rebuild note text from an edited header mapping and the untouched body.
pub fn compose(header: &Mapping, body: &str) -> Result<String, UplinkError> {
    let yaml = serde_yaml::to_string(header)?;
    Ok(format!("---\n{yaml}---\n{body}"))
}
