use std::{io, path::StripPrefixError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use crate::event::{GraphEvent, NoteEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum UplinkError {
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Malformed header block: {0}")]
    Header(String),
    #[error("Metadata index is not ready")]
    IndexNotReady,
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Note store write failed for '{path}': {reason}")]
    Store { path: String, reason: String },
}

impl UplinkError {
    /// Whether the error came from the storage layer rather than from the caller's input.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            UplinkError::Io(_) | UplinkError::PermissionDenied | UplinkError::Store { .. }
        )
    }
}

impl From<StripPrefixError> for UplinkError {
    fn from(src: StripPrefixError) -> UplinkError {
        UplinkError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for UplinkError {
    fn from(src: toml::de::Error) -> UplinkError {
        UplinkError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for UplinkError {
    fn from(src: toml::ser::Error) -> UplinkError {
        UplinkError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<YamlError> for UplinkError {
    fn from(src: YamlError) -> UplinkError {
        UplinkError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<JsonError> for UplinkError {
    fn from(src: JsonError) -> UplinkError {
        UplinkError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for UplinkError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => UplinkError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => UplinkError::PermissionDenied,
            _ => UplinkError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<TokioSendError<NoteEvent>> for UplinkError {
    fn from(x: TokioSendError<NoteEvent>) -> Self {
        UplinkError::Io(format!(
            "Channel update send Error, could not transmit note event {}",
            x.0
        ))
    }
}

impl From<TokioSendError<GraphEvent>> for UplinkError {
    fn from(x: TokioSendError<GraphEvent>) -> Self {
        UplinkError::Io(format!(
            "Channel update send Error, could not transmit graph event {}",
            x.0
        ))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for UplinkError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => UplinkError::Custom(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => UplinkError::Custom(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => UplinkError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => UplinkError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                UplinkError::Custom("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                UplinkError::Custom("notify-debouncer max file watch limit reached".to_string())
            }
        }
    }
}
