//! `nanobox_utils` is a module containing common utilities for the nanobox project.
//!
//! It provides:
//! - Environment variable helpers for locating the nanobox home directory
//! - Well-known sub-directory and file names used by the runtime layout
//! - Shared default values (resource limits, timeouts)

#![warn(missing_docs)]

pub mod defaults;
pub mod env;
pub mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use env::*;
pub use path::*;
