pub mod path;
pub mod resolver;

pub use path::{ends_with_segments, os_path_to_string, NotePath, NOTE_EXTENSION};
pub use resolver::{ending_similarity, resolve_among, token_stem, PathResolver, Resolution};
