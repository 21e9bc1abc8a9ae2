use crate::error::UplinkError;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_PARENT_PROPERTY: &str = "up";
pub const DEFAULT_PARENT_TAG: &str = "MOC";

/// User-facing configuration of the link graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Header key whose value lists the parents of a note.
    pub parent_property: String,
    /// Tag marking a note as a structural (map of content) note.
    pub parent_tag: String,
    /// Debounce window for reconciliation, in milliseconds.
    pub refresh_delay_ms: u64,
    /// Selection sampling period, in milliseconds.
    pub selection_interval_ms: u64,
    pub selection_enabled: bool,
    /// Number of pending paths above which catch-up rebuilds the whole graph.
    pub full_rebuild_threshold: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            parent_property: DEFAULT_PARENT_PROPERTY.to_string(),
            parent_tag: DEFAULT_PARENT_TAG.to_string(),
            refresh_delay_ms: 3000,
            selection_interval_ms: 500,
            selection_enabled: false,
            full_rebuild_threshold: 256,
        }
    }
}

impl LinkSettings {
    /// Strips any leading `#` from the parent tag and falls back to defaults for empty keys.
    pub fn normalized(mut self) -> Self {
        self.parent_tag = normalize_tag(&self.parent_tag).to_string();
        if self.parent_tag.is_empty() {
            self.parent_tag = DEFAULT_PARENT_TAG.to_string();
        }
        self.parent_property = self.parent_property.trim().to_string();
        if self.parent_property.is_empty() {
            self.parent_property = DEFAULT_PARENT_PROPERTY.to_string();
        }
        self
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn selection_interval(&self) -> Duration {
        Duration::from_millis(self.selection_interval_ms.max(1))
    }

    pub fn is_parent_tag(&self, tag: &str) -> bool {
        normalize_tag(tag) == normalize_tag(&self.parent_tag)
    }
}

pub fn normalize_tag(tag: &str) -> &str {
    tag.trim().trim_start_matches('#')
}

pub trait SettingsProvider: Send + Sync {
    fn get_settings(&self) -> Result<LinkSettings, UplinkError>;
    fn set_settings(&self, settings: &LinkSettings) -> Result<(), UplinkError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlSettingsProvider {
    path: PathBuf,
}

impl TomlSettingsProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlSettingsProvider { path }
    }
}

impl SettingsProvider for TomlSettingsProvider {
    fn get_settings(&self) -> Result<LinkSettings, UplinkError> {
        tracing::debug!("Attempting to read settings from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Settings file not found, using defaults.");
            return Ok(LinkSettings::default());
        }
        let content = read_to_string(&self.path)?;
        let settings: LinkSettings = toml::from_str(&content)?;
        Ok(settings.normalized())
    }

    fn set_settings(&self, settings: &LinkSettings) -> Result<(), UplinkError> {
        tracing::debug!("Attempting to write settings to: {:?}", &self.path);
        let toml_string = toml::to_string(&settings.clone().normalized())?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
