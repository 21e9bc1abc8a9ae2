//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create a small vault below `temp_dir`.
///
/// Returns the vault root (e.g. `<temp_dir>/vault/`). Layout:
///
/// - `Home.md`: structural, links to both projects and to `Ideas`
/// - `Projects/Car.md`: declares `Home` as parent
/// - `Projects/Boat.md`: no header
/// - `Archive/Bike.md`: declares `Home` as parent, not linked from it
/// - `Ideas.md`: structural, links back to `Home`
/// - `.obsidian/workspace.md` and `notes.txt`: not part of the vault's notes
#[allow(dead_code)]
pub fn create_test_vault(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("vault");
    write_note(
        &root,
        "Home.md",
        "---\ntags: [MOC]\n---\n# Home\n\n- [[Car]]\n- [[Boat]]\n- [[Ideas]]\n",
    );
    write_note(
        &root,
        "Projects/Car.md",
        "---\nup: \"[[Home]]\"\n---\n# Car\n\nBack to [[Home]].\n",
    );
    write_note(&root, "Projects/Boat.md", "# Boat\n\nFloats.\n");
    write_note(&root, "Archive/Bike.md", "---\nup:\n  - Home\n---\n# Bike\n");
    write_note(&root, "Ideas.md", "#MOC\n\nSee [[Home]].\n");
    write_note(&root, ".obsidian/workspace.md", "[[Home]]");
    write_note(&root, "notes.txt", "[[Home]]");
    root
}

/// Write `text` to `relative` below `root`, creating directories as needed.
#[allow(dead_code)]
pub fn write_note(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, text).unwrap();
}

#[allow(dead_code)]
pub fn read_note(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative)).unwrap()
}
