//! `nanobox` is a lightweight runtime for creating and managing sandboxed
//! execution boxes.
//!
//! # Overview
//!
//! nanobox provisions isolated execution environments ("boxes") backed by
//! filesystem images and runs commands inside them with streamed or
//! buffered output capture. It handles:
//! - Box lifecycle management (create, start, stop, remove)
//! - Identity and lookup by id, name, or unique id prefix
//! - Command execution with per-stream output delivery
//! - Runtime-wide metrics and coordinated shutdown
//!
//! # Architecture
//!
//! The runtime coordinator owns the authoritative table of box records;
//! callers hold id-based handles that resolve against the table on every
//! call. Image resolution and process isolation are services behind
//! traits; the bundled implementations use plain directories and host
//! process groups, and hardened backends plug in through the same
//! interfaces.
//!
//! # Modules
//!
//! - [`config`] - Box and runtime configuration types and validation
//! - [`engine`] - Command execution and isolation interfaces
//! - [`images`] - Image reference resolution
//! - [`management`] - Lifecycle, registry, coordinator and handles
//! - [`metrics`] - Runtime and per-box metric snapshots

#![warn(missing_docs)]

mod error;
mod log;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod config;
pub mod engine;
pub mod images;
pub mod management;
pub mod metrics;

pub use error::*;
