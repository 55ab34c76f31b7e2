//! Runtime and per-box metrics.
//!
//! Counters are monotonic atomics updated on the hot path without locks;
//! snapshots combine them with per-state box counts recomputed from the
//! authoritative table. Snapshots are derived data, never the source of
//! truth, and are safe to take at any time.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Lock-free storage for runtime-wide counters.
#[derive(Debug, Default)]
pub(crate) struct RuntimeMetricsStorage {
    /// Boxes created since the runtime started
    pub(crate) boxes_created: AtomicU64,

    /// Boxes whose creation failed before a record was inserted
    pub(crate) boxes_failed: AtomicU64,

    /// Commands executed across all boxes
    pub(crate) commands_executed: AtomicU64,

    /// Command executions that failed at the API level
    pub(crate) exec_errors: AtomicU64,
}

/// Lock-free storage for one box's counters.
#[derive(Debug, Default)]
pub(crate) struct BoxMetricsStorage {
    pub(crate) commands_executed: AtomicU64,
    pub(crate) exec_errors: AtomicU64,
}

/// Point-in-time snapshot of runtime-wide metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// Total boxes created since the runtime started
    pub boxes_created_total: u64,

    /// Total boxes whose creation failed
    pub boxes_failed_total: u64,

    /// Total commands executed across all boxes
    pub commands_executed_total: u64,

    /// Total command executions that failed at the API level
    pub exec_errors_total: u64,

    /// Boxes currently in the running state
    pub running_boxes: u64,

    /// Boxes currently in the stopped state
    pub stopped_boxes: u64,

    /// Boxes currently tracked by the runtime
    pub total_boxes: u64,
}

/// Point-in-time snapshot of one box's metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxMetrics {
    /// Whether the box is currently running
    pub running: bool,

    /// Native process id of the isolation unit when running
    pub pid: Option<u32>,

    /// Commands executed in this box
    pub commands_executed_total: u64,

    /// Command executions in this box that failed at the API level
    pub exec_errors_total: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RuntimeMetricsStorage {
    /// Record the outcome of one command execution.
    pub(crate) fn record_exec(&self, failed: bool) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.exec_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl BoxMetricsStorage {
    /// Record the outcome of one command execution.
    pub(crate) fn record_exec(&self, failed: bool) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.exec_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
