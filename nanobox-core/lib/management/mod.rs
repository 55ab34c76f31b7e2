//! Box lifecycle management.
//!
//! This module contains the runtime coordinator and everything it owns:
//! - [`BoxId`] - sortable, never-reused box identity
//! - [`BoxStatus`] - the lifecycle state machine
//! - [`BoxRuntime`] - the coordinator owning the authoritative registry
//! - [`BoxHandle`] - id-based references handed to callers
//! - [`SimpleBox`] - a single-box convenience wrapper

mod handle;
mod id;
mod registry;
mod runtime;
mod simple;
mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use handle::*;
pub use id::BoxId;
pub use registry::{BoxInfo, BoxStateInfo};
pub use runtime::{BoxRuntime, StopTimeout};
pub use simple::*;
pub use state::*;
