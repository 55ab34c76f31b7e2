//! The box runtime coordinator.
//!
//! [`BoxRuntime`] owns the authoritative registry of boxes and exposes
//! create / get / list / remove / metrics / shutdown. One lock guards the
//! table so every mutation is a single visible step; provisioning and
//! command execution always happen outside that lock so boxes operate
//! concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal;
use nix::unistd::Pid;
use tokio::sync::RwLock;

use nanobox_utils::{DEFAULT_STOP_TIMEOUT_SECS, IMAGES_SUBDIR};

use crate::config::{BoxConfig, RuntimeOptions};
use crate::engine::process::ProcessBackend;
use crate::engine::{IsolationBackend, IsolationUnit};
use crate::images::{DirImageStore, ImageStore};
use crate::metrics::{RuntimeMetrics, RuntimeMetricsStorage};
use crate::{NanoboxError, NanoboxResult};

use super::handle::BoxHandle;
use super::id::BoxId;
use super::registry::{BoxInfo, BoxRecord, BoxRegistry};
use super::state::BoxStatus;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How long to wait for graceful termination before force-killing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopTimeout {
    /// Use the runtime default (10 seconds)
    #[default]
    Default,

    /// Wait the given number of seconds, then kill
    Seconds(u32),

    /// Wait indefinitely; never escalate to a kill
    Unbounded,
}

/// The main entry point for creating and managing boxes.
///
/// Cheaply cloneable; all clones share the same state.
///
/// ## Example
///
/// ```no_run
/// use nanobox_core::config::{BoxConfig, RuntimeOptions};
/// use nanobox_core::management::BoxRuntime;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let runtime = BoxRuntime::new(RuntimeOptions::default())?;
///     let config = BoxConfig::builder().image("alpine:3.19").build();
///     let handle = runtime.create(config).await?;
///     println!("created {}", handle.id());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BoxRuntime {
    inner: Arc<RuntimeInner>,
}

/// Shared runtime state behind every handle.
pub(crate) struct RuntimeInner {
    pub(crate) registry: RwLock<BoxRegistry>,
    /// Once set, create/start permanently fail with a `Stopped` error.
    pub(crate) terminated: AtomicBool,
    pub(crate) metrics: RuntimeMetricsStorage,
    pub(crate) images: Arc<dyn ImageStore>,
    pub(crate) backend: Arc<dyn IsolationBackend>,
    options: RuntimeOptions,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StopTimeout {
    /// Interpret the integer timeout convention of the external surface:
    /// `0` = default, positive = that many seconds, negative = unbounded.
    pub fn from_secs(secs: i32) -> Self {
        match secs {
            0 => StopTimeout::Default,
            n if n > 0 => StopTimeout::Seconds(n as u32),
            _ => StopTimeout::Unbounded,
        }
    }

    /// The grace period to wait before killing; `None` means forever.
    pub(crate) fn grace(self) -> Option<Duration> {
        match self {
            StopTimeout::Default => Some(Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS)),
            StopTimeout::Seconds(secs) => Some(Duration::from_secs(secs as u64)),
            StopTimeout::Unbounded => None,
        }
    }
}

impl BoxRuntime {
    /// Create a runtime with the bundled directory image store and
    /// process backend.
    ///
    /// ## Errors
    ///
    /// Returns `Storage` if the home directory cannot be prepared.
    pub fn new(options: RuntimeOptions) -> NanoboxResult<Self> {
        let images = Arc::new(DirImageStore::new(options.home_dir.join(IMAGES_SUBDIR)));
        let backend = Arc::new(ProcessBackend::new());
        Self::with_services(options, images, backend)
    }

    /// Create a runtime with default options (`NANOBOX_HOME` or
    /// `~/.nanobox`).
    pub fn with_defaults() -> NanoboxResult<Self> {
        Self::new(RuntimeOptions::default())
    }

    /// Create a runtime with caller-supplied image and isolation services.
    pub fn with_services(
        options: RuntimeOptions,
        images: Arc<dyn ImageStore>,
        backend: Arc<dyn IsolationBackend>,
    ) -> NanoboxResult<Self> {
        std::fs::create_dir_all(&options.home_dir).map_err(|e| {
            NanoboxError::Storage(format!(
                "failed to prepare runtime home {}: {}",
                options.home_dir.display(),
                e
            ))
        })?;

        crate::log::init_logging(&options.home_dir);
        tracing::debug!(home_dir = %options.home_dir.display(), "initialized runtime");

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                registry: RwLock::new(BoxRegistry::new()),
                terminated: AtomicBool::new(false),
                metrics: RuntimeMetricsStorage::default(),
                images,
                backend,
                options,
            }),
        })
    }

    /// The options this runtime was created with.
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Create a box and start it.
    ///
    /// The box is running by the time this returns; on any provisioning
    /// failure no record is left behind.
    ///
    /// ## Errors
    ///
    /// - `Stopped` after the runtime has been shut down
    /// - `InvalidArgument` / `AlreadyExists` for a rejected configuration
    /// - `Image` / `Storage` / `Engine` when provisioning fails
    pub async fn create(&self, config: BoxConfig) -> NanoboxResult<BoxHandle> {
        self.ensure_active()?;
        config.validate()?;

        // Reserve identity first so provisioning happens outside the lock.
        let id = {
            let registry = self.inner.registry.read().await;
            if let Some(name) = config.get_name() {
                if registry.contains_name(name) {
                    return Err(NanoboxError::AlreadyExists(format!(
                        "box name '{}' is already in use",
                        name
                    )));
                }
            }
            registry.allocate_id()
        };

        let unit = match provision(&self.inner, &id, &config).await {
            Ok(unit) => unit,
            Err(e) => {
                self.inner.metrics.boxes_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(box_id = %id, error = %e, "box creation failed");
                return Err(e);
            }
        };

        let mut record = BoxRecord::new(id.clone(), config);
        record.status = record.status.transition_to(BoxStatus::Running)?;
        record.unit = Some(Arc::from(unit));

        {
            let mut registry = self.inner.registry.write().await;
            if let Some(name) = record.name.clone() {
                // Re-check under the write lock; a concurrent create may
                // have claimed the name since the reservation.
                if registry.contains_name(&name) {
                    drop(registry);
                    if let Some(unit) = record.unit.take() {
                        let _ = unit.terminate(Some(Duration::ZERO)).await;
                    }
                    self.inner.metrics.boxes_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(NanoboxError::AlreadyExists(format!(
                        "box name '{}' is already in use",
                        name
                    )));
                }
            }
            registry.insert(record)?;
        }

        self.inner.metrics.boxes_created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(box_id = %id, "created box");

        Ok(BoxHandle::new(id, Arc::clone(&self.inner)))
    }

    /// Get a live handle to a box by id, name, or unique id prefix.
    pub async fn get(&self, key: &str) -> NanoboxResult<BoxHandle> {
        refresh_liveness(&self.inner).await;
        let registry = self.inner.registry.read().await;
        let record = registry.resolve(key)?;
        Ok(BoxHandle::new(record.id.clone(), Arc::clone(&self.inner)))
    }

    /// Get a box's info record by id, name, or unique id prefix.
    pub async fn get_info(&self, key: &str) -> NanoboxResult<BoxInfo> {
        refresh_liveness(&self.inner).await;
        let registry = self.inner.registry.read().await;
        Ok(registry.resolve(key)?.to_info())
    }

    /// List all boxes in creation order.
    pub async fn list(&self) -> NanoboxResult<Vec<BoxInfo>> {
        refresh_liveness(&self.inner).await;
        let registry = self.inner.registry.read().await;
        Ok(registry.iter().map(BoxRecord::to_info).collect())
    }

    /// Remove a box.
    ///
    /// A running box is removed only with `force`, which stops it first.
    ///
    /// ## Errors
    ///
    /// - `NotFound` when the key matches nothing
    /// - `InvalidState` for a running box without `force`
    pub async fn remove(&self, key: &str, force: bool) -> NanoboxResult<()> {
        let (id, unit) = {
            let mut registry = self.inner.registry.write().await;
            let id = registry.resolve_id(key)?;
            let record = registry
                .get_mut(&id)
                .ok_or_else(|| NanoboxError::Internal(format!("resolved id {} has no record", id)))?;

            if record.status.is_running() {
                if !force {
                    return Err(NanoboxError::InvalidState(format!(
                        "box {} is running; stop it or use force",
                        record.id.short()
                    )));
                }
                record.status = record.status.transition_to(BoxStatus::Stopped)?;
            }
            (id, record.unit.take())
        };

        // Forced removal stops the unit outside the table lock.
        if let Some(unit) = unit {
            if let Err(e) = unit.terminate(StopTimeout::Default.grace()).await {
                tracing::warn!(box_id = %id, error = %e, "stop during forced remove reported an error");
            }
        }

        let mut registry = self.inner.registry.write().await;
        registry.remove(&id);
        tracing::info!(box_id = %id, "removed box");
        Ok(())
    }

    /// Snapshot runtime-wide metrics.
    pub async fn metrics(&self) -> RuntimeMetrics {
        let registry = self.inner.registry.read().await;
        let mut running = 0u64;
        let mut stopped = 0u64;
        for record in registry.iter() {
            match record.status {
                BoxStatus::Running => running += 1,
                BoxStatus::Stopped => stopped += 1,
                _ => {}
            }
        }

        RuntimeMetrics {
            boxes_created_total: self.inner.metrics.boxes_created.load(Ordering::Relaxed),
            boxes_failed_total: self.inner.metrics.boxes_failed.load(Ordering::Relaxed),
            commands_executed_total: self.inner.metrics.commands_executed.load(Ordering::Relaxed),
            exec_errors_total: self.inner.metrics.exec_errors.load(Ordering::Relaxed),
            running_boxes: running,
            stopped_boxes: stopped,
            total_boxes: registry.len() as u64,
        }
    }

    /// Stop every running box and permanently refuse further create/start.
    ///
    /// Stopping is best-effort per box: a failure is logged and the
    /// remaining boxes are still stopped. Callers re-check state via
    /// `list`. Calling shutdown again is a no-op.
    pub async fn shutdown(&self, timeout: StopTimeout) -> NanoboxResult<()> {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let running: Vec<BoxId> = {
            let registry = self.inner.registry.read().await;
            registry
                .iter()
                .filter(|record| record.status.is_running())
                .map(|record| record.id.clone())
                .collect()
        };

        for id in running {
            if let Err(e) = stop_box(&self.inner, &id, timeout).await {
                tracing::warn!(box_id = %id, error = %e, "failed to stop box during shutdown");
            }
        }

        tracing::info!("runtime shut down");
        Ok(())
    }

    fn ensure_active(&self) -> NanoboxResult<()> {
        if self.inner.terminated.load(Ordering::SeqCst) {
            return Err(NanoboxError::Stopped(
                "runtime has been shut down".to_string(),
            ));
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolve the image and provision a fresh isolation unit.
async fn provision(
    inner: &Arc<RuntimeInner>,
    id: &BoxId,
    config: &BoxConfig,
) -> NanoboxResult<Box<dyn IsolationUnit>> {
    let rootfs = inner.images.resolve(config.get_image()).await?;
    inner.backend.provision(id, &rootfs, config).await
}

/// Stop a box: Running → Stopped, idempotent on Stopped.
///
/// The record is marked stopped and its unit detached under the lock; the
/// unit is terminated outside it. If termination fails the record is
/// restored so the caller can retry.
pub(crate) async fn stop_box(
    inner: &Arc<RuntimeInner>,
    id: &BoxId,
    timeout: StopTimeout,
) -> NanoboxResult<()> {
    let unit = {
        let mut registry = inner.registry.write().await;
        let record = registry
            .get_mut(id)
            .ok_or_else(|| NanoboxError::NotFound(format!("no box with id {}", id)))?;

        match record.status {
            BoxStatus::Stopped => return Ok(()),
            BoxStatus::Running => {
                record.status = record.status.transition_to(BoxStatus::Stopped)?;
                record.unit.take()
            }
            other => {
                return Err(NanoboxError::InvalidState(format!(
                    "cannot stop box in state {}",
                    other
                )));
            }
        }
    };

    if let Some(unit) = unit {
        if let Err(e) = unit.terminate(timeout.grace()).await {
            let mut registry = inner.registry.write().await;
            if let Some(record) = registry.get_mut(id) {
                record.unit = Some(unit);
                record.status = BoxStatus::Running;
            }
            return Err(e);
        }
    }

    tracing::info!(box_id = %id, "stopped box");
    finish_stop(inner, id).await;
    Ok(())
}

/// Restart a stopped box from its original image and configuration.
pub(crate) async fn start_box(inner: &Arc<RuntimeInner>, id: &BoxId) -> NanoboxResult<()> {
    if inner.terminated.load(Ordering::SeqCst) {
        return Err(NanoboxError::Stopped(
            "runtime has been shut down".to_string(),
        ));
    }

    let config = {
        let registry = inner.registry.read().await;
        let record = registry
            .get(id)
            .ok_or_else(|| NanoboxError::NotFound(format!("no box with id {}", id)))?;
        if !record.status.can_start() {
            return Err(NanoboxError::InvalidState(format!(
                "cannot start box in state {}",
                record.status
            )));
        }
        record.config.clone()
    };

    // Re-provision outside the table lock.
    let unit = provision(inner, id, &config).await?;

    let mut registry = inner.registry.write().await;
    match registry.get_mut(id) {
        Some(record) if record.status.can_start() => {
            record.status = record.status.transition_to(BoxStatus::Running)?;
            record.unit = Some(Arc::from(unit));
            tracing::info!(box_id = %id, "started box");
            Ok(())
        }
        Some(record) => {
            let status = record.status;
            drop(registry);
            let _ = unit.terminate(Some(Duration::ZERO)).await;
            Err(NanoboxError::InvalidState(format!(
                "cannot start box in state {}",
                status
            )))
        }
        None => {
            drop(registry);
            let _ = unit.terminate(Some(Duration::ZERO)).await;
            Err(NanoboxError::NotFound(format!("no box with id {}", id)))
        }
    }
}

/// Observe crashed units: a Running record whose process is gone becomes
/// Stopped, honoring auto_remove.
pub(crate) async fn refresh_liveness(inner: &Arc<RuntimeInner>) {
    let mut registry = inner.registry.write().await;
    let mut auto_removed: Vec<BoxId> = Vec::new();

    for record in registry.iter_mut() {
        if !record.status.is_running() {
            continue;
        }
        let Some(pid) = record.pid() else { continue };
        let alive = signal::kill(Pid::from_raw(pid as i32), None).is_ok();
        if alive {
            continue;
        }

        tracing::warn!(box_id = %record.id, pid, "box process exited unexpectedly; marking stopped");
        record.status = BoxStatus::Stopped;
        record.unit = None;
        if *record.config.get_auto_remove() {
            auto_removed.push(record.id.clone());
        }
    }

    for id in auto_removed {
        registry.remove(&id);
        tracing::debug!(box_id = %id, "auto-removed box");
    }
}

/// Post-stop bookkeeping: honor the box's auto_remove flag.
async fn finish_stop(inner: &Arc<RuntimeInner>, id: &BoxId) {
    let auto_remove = {
        let registry = inner.registry.read().await;
        registry
            .get(id)
            .map(|record| *record.config.get_auto_remove())
            .unwrap_or(false)
    };

    if auto_remove {
        let mut registry = inner.registry.write().await;
        registry.remove(id);
        tracing::debug!(box_id = %id, "auto-removed box");
    }
}
