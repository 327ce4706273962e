//! Trace logging for field diagnostics.
//!
//! Hosts opt in through `Settings::logs`; events then land as JSON lines
//! in the file named by [`Settings::trace_log`]. Prompt and response text
//! stays out of the log unless `log_content` is also on, which emitting
//! call sites gate themselves.

use crate::config::Settings;
use std::fs::OpenOptions;
use std::sync::{Arc, OnceLock};
use tracing_subscriber::fmt::time::UtcTime;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the JSON file subscriber once per process. A host that already
/// installed its own global subscriber wins the race; losing it is fine.
pub fn init_tracing(settings: &Settings) {
    let Some(path) = settings.trace_log() else {
        return;
    };
    INSTALLED.get_or_init(|| {
        let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
            return;
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(Arc::new(file))
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
