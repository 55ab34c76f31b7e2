//! Runtime log initialization.
//!
//! The first runtime created in a process installs a file-backed tracing
//! subscriber under its home directory; the filter is taken from the
//! `NANOBOX_LOG` environment variable (default `info`). Initialization is
//! best-effort: a failure leaves logging disabled rather than failing
//! runtime construction, and an already-installed subscriber (e.g. in
//! tests) is left in place.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use nanobox_utils::{LOG_FILENAME, LOG_SUBDIR, NANOBOX_LOG_ENV_VAR};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Keeps the background log writer alive for the life of the process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Initialize file logging under the given runtime home.
pub(crate) fn init_logging(home_dir: &Path) {
    if LOG_GUARD.get().is_some() {
        return;
    }

    let log_dir = home_dir.join(LOG_SUBDIR);
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }

    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILENAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(NANOBOX_LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = LOG_GUARD.set(guard);
    }
}
