//! Caller-facing handle to a box.
//!
//! A handle is an id plus a reference to the runtime's shared state,
//! never a copy of the record. Every call resolves the id against the
//! authoritative table, so mutations made through one handle are visible
//! through every other handle to the same box.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::engine::{BufferSink, ExecSpec, ExecutionResult, OutputSink};
use crate::metrics::BoxMetrics;
use crate::{NanoboxError, NanoboxResult};

use super::id::BoxId;
use super::registry::BoxInfo;
use super::runtime::{self, RuntimeInner, StopTimeout};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A live reference to a box, valid as long as its record exists.
#[derive(Clone)]
pub struct BoxHandle {
    id: BoxId,
    inner: Arc<RuntimeInner>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxHandle {
    pub(crate) fn new(id: BoxId, inner: Arc<RuntimeInner>) -> Self {
        Self { id, inner }
    }

    /// The id of the box this handle refers to.
    pub fn id(&self) -> &BoxId {
        &self.id
    }

    /// Current info for this box.
    ///
    /// ## Errors
    ///
    /// `NotFound` once the box has been removed.
    pub async fn info(&self) -> NanoboxResult<BoxInfo> {
        runtime::refresh_liveness(&self.inner).await;
        let registry = self.inner.registry.read().await;
        registry
            .get(&self.id)
            .map(|record| record.to_info())
            .ok_or_else(|| NanoboxError::NotFound(format!("no box with id {}", self.id)))
    }

    /// Snapshot this box's metrics.
    pub async fn metrics(&self) -> NanoboxResult<BoxMetrics> {
        let registry = self.inner.registry.read().await;
        let record = registry
            .get(&self.id)
            .ok_or_else(|| NanoboxError::NotFound(format!("no box with id {}", self.id)))?;

        Ok(BoxMetrics {
            running: record.status.is_running(),
            pid: record.pid(),
            commands_executed_total: record.metrics.commands_executed.load(Ordering::Relaxed),
            exec_errors_total: record.metrics.exec_errors.load(Ordering::Relaxed),
        })
    }

    /// Restart a stopped box.
    pub async fn start(&self) -> NanoboxResult<()> {
        runtime::start_box(&self.inner, &self.id).await
    }

    /// Stop the box, waiting up to `timeout` for graceful termination.
    ///
    /// Stopping an already-stopped box succeeds with no side effect.
    pub async fn stop(&self, timeout: StopTimeout) -> NanoboxResult<()> {
        runtime::stop_box(&self.inner, &self.id, timeout).await
    }

    /// Execute a command inside the box, streaming output to `sink`.
    ///
    /// The call blocks until the command exits; the sink is invoked zero
    /// or more times strictly before it returns. Without a sink, output
    /// is discarded. Commands against the same box are serialized; boxes
    /// execute independently of each other.
    ///
    /// A non-zero exit code is not an error: `Ok(code)` is returned as
    /// long as the command ran.
    ///
    /// ## Errors
    ///
    /// - `InvalidState` when the box is not running
    /// - `Execution` when the command cannot be launched at all
    pub async fn exec(
        &self,
        spec: &ExecSpec,
        sink: Option<&mut dyn OutputSink>,
    ) -> NanoboxResult<i32> {
        let (unit, exec_lock, metrics) = {
            let registry = self.inner.registry.read().await;
            let record = registry
                .get(&self.id)
                .ok_or_else(|| NanoboxError::NotFound(format!("no box with id {}", self.id)))?;
            if !record.status.can_exec() {
                return Err(NanoboxError::InvalidState(format!(
                    "box {} is not running",
                    self.id.short()
                )));
            }
            let unit = record.unit.clone().ok_or_else(|| {
                NanoboxError::Internal("running box has no isolation unit".to_string())
            })?;
            (unit, record.exec_lock.clone(), record.metrics.clone())
        };

        // One command at a time per box, so two commands never multiplex
        // onto one sink.
        let _guard = exec_lock.lock().await;

        // The box may have been stopped while we waited for the slot.
        {
            let registry = self.inner.registry.read().await;
            match registry.get(&self.id) {
                Some(record) if record.status.can_exec() => {}
                Some(record) => {
                    return Err(NanoboxError::InvalidState(format!(
                        "box {} is not running (state {})",
                        self.id.short(),
                        record.status
                    )));
                }
                None => {
                    return Err(NanoboxError::NotFound(format!(
                        "no box with id {}",
                        self.id
                    )));
                }
            }
        }

        let result = unit.exec(spec, sink).await;
        metrics.record_exec(result.is_err());
        self.inner.metrics.record_exec(result.is_err());
        result
    }

    /// Execute a command and return its exit code with both output
    /// streams accumulated.
    pub async fn exec_buffered(&self, spec: &ExecSpec) -> NanoboxResult<ExecutionResult> {
        let mut sink = BufferSink::default();
        let exit_code = self.exec(spec, Some(&mut sink)).await?;
        Ok(ExecutionResult {
            exit_code,
            stdout: sink.stdout,
            stderr: sink.stderr,
        })
    }
}

impl std::fmt::Debug for BoxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxHandle").field("id", &self.id).finish()
    }
}
