//! Structured dumps of internal payloads for verbose debugging sessions.

use serde::Serialize;
use tracing::{Level, debug, warn};

/// Emit `value` as pretty JSON under `label` when debug logging is enabled.
///
/// Serialisation is skipped entirely unless the active subscriber accepts
/// debug-level events.
pub fn debug_payload<T>(label: &str, value: &T)
where
    T: Serialize + ?Sized,
{
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => debug!(label, payload = %rendered, "debug payload"),
        Err(err) => warn!(label, error = %err, "failed to serialise debug payload"),
    }
}
