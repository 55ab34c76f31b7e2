//! Error types for nanobox operations.
//!
//! The taxonomy is deliberately flat: every fallible operation fails with
//! exactly one of the variants below plus a human-readable detail message.
//! Programs should branch on the variant only; the message is advisory.
//! The variant set (and its order) is part of the external contract exposed
//! through `nanobox-ffi`; removing or reordering a variant is a breaking
//! change.

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a nanobox-related operation.
pub type NanoboxResult<T> = Result<T, NanoboxError>;

/// An error that occurred during a nanobox-related operation.
#[derive(Debug, Error)]
pub enum NanoboxError {
    /// An internal invariant was violated
    #[error("internal error: {0}")]
    Internal(String),

    /// The requested box or resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A box or resource with the same identity already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not valid in the box's current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A caller-supplied argument was malformed or ambiguous
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The supplied configuration was rejected
    #[error("config error: {0}")]
    Config(String),

    /// A host filesystem or storage operation failed
    #[error("storage error: {0}")]
    Storage(String),

    /// An image reference could not be resolved to a rootfs
    #[error("image error: {0}")]
    Image(String),

    /// A network setup operation failed
    #[error("network error: {0}")]
    Network(String),

    /// A command could not be launched or supervised inside a box
    #[error("execution error: {0}")]
    Execution(String),

    /// The runtime has been shut down and no longer accepts the operation
    #[error("runtime stopped: {0}")]
    Stopped(String),

    /// The isolation engine reported a failure
    #[error("engine error: {0}")]
    Engine(String),

    /// The operation is not supported on this platform or configuration
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A persistence operation failed
    #[error("database error: {0}")]
    Database(String),

    /// Communication with a box's guest-side agent failed
    #[error("portal error: {0}")]
    Portal(String),

    /// A remote procedure call failed
    #[error("rpc error: {0}")]
    Rpc(String),
}
