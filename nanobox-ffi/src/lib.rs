//! C ABI bindings for the nanobox runtime.
//!
//! This crate exposes the runtime to foreign callers: synchronous calls,
//! output callbacks, and owned-string results. Complex records cross the
//! boundary as JSON to keep the ABI small and stable.

mod ffi;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use ffi::*;
