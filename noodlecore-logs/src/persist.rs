//! Small JSON state-file helpers shared by the alert and storage managers.
//!
//! Reads treat missing, empty, or corrupt files as absent state. Writes are
//! best effort: a failed save is logged and never propagated, so state-file
//! trouble cannot take down the managers that call these.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    if contents.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
            None
        }
    }
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(path, json).await {
                warn!(path = %path.display(), error = %e, "state file write failed");
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "state serialization failed"),
    }
}
