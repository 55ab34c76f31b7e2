//! Utility functions for working with environment variables.

use std::path::PathBuf;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable for the nanobox home directory
pub const NANOBOX_HOME_ENV_VAR: &str = "NANOBOX_HOME";

/// Environment variable controlling the runtime log filter (tracing syntax)
pub const NANOBOX_LOG_ENV_VAR: &str = "NANOBOX_LOG";

/// Directory name used for the default nanobox home under `$HOME`
pub const NANOBOX_HOME_DIR: &str = ".nanobox";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path to the nanobox home directory.
/// If the NANOBOX_HOME environment variable is set, returns that path.
/// Otherwise, returns `$HOME/.nanobox` (falling back to the current
/// directory when no home directory can be determined).
pub fn get_nanobox_home_path() -> PathBuf {
    if let Ok(nanobox_home) = std::env::var(NANOBOX_HOME_ENV_VAR) {
        PathBuf::from(nanobox_home)
    } else {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(NANOBOX_HOME_DIR);
        path
    }
}
