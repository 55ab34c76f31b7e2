//! Single-box convenience wrapper for short-lived workloads.
//!
//! [`SimpleBox`] bundles a private runtime, one box, and cleanup into a
//! single object: create it, `run` commands with buffered output, and
//! either `close` it or let it drop; the box is stopped and
//! force-removed either way.

use crate::config::{BoxConfig, RuntimeOptions};
use crate::engine::{ExecSpec, ExecutionResult};
use crate::{NanoboxError, NanoboxResult};

use super::handle::BoxHandle;
use super::id::BoxId;
use super::runtime::{BoxRuntime, StopTimeout};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One box with its own private runtime and automatic cleanup.
///
/// ## Example
///
/// ```no_run
/// use nanobox_core::management::SimpleBox;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut sandbox = SimpleBox::new("alpine:3.19", 0, 0).await?;
///     let result = sandbox.run("/bin/echo", ["hello"]).await?;
///     assert_eq!(result.exit_code, 0);
///     sandbox.close().await?;
///     Ok(())
/// }
/// ```
pub struct SimpleBox {
    runtime: BoxRuntime,
    handle: BoxHandle,
    closed: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SimpleBox {
    /// Create and start a box from the given image.
    ///
    /// `cpus` and `memory_mib` of `0` select the runtime defaults.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for an empty image reference, before any
    /// runtime state is touched.
    pub async fn new(image: &str, cpus: u32, memory_mib: u32) -> NanoboxResult<Self> {
        Self::with_options(RuntimeOptions::default(), image, cpus, memory_mib).await
    }

    /// Like [`SimpleBox::new`] but with explicit runtime options.
    pub async fn with_options(
        options: RuntimeOptions,
        image: &str,
        cpus: u32,
        memory_mib: u32,
    ) -> NanoboxResult<Self> {
        if image.trim().is_empty() {
            return Err(NanoboxError::InvalidArgument(
                "image reference must not be empty".to_string(),
            ));
        }

        let runtime = BoxRuntime::new(options)?;
        let config = BoxConfig::builder()
            .image(image)
            .cpus(cpus)
            .memory_mib(memory_mib)
            .build();
        let handle = runtime.create(config).await?;

        Ok(Self {
            runtime,
            handle,
            closed: false,
        })
    }

    /// The id of the underlying box.
    pub fn id(&self) -> &BoxId {
        self.handle.id()
    }

    /// Run a command with buffered output capture.
    pub async fn run<I, S>(&self, command: &str, args: I) -> NanoboxResult<ExecutionResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = ExecSpec::new(command).args(args);
        self.handle.exec_buffered(&spec).await
    }

    /// Stop and force-remove the box, then shut the private runtime down.
    ///
    /// Idempotent; called automatically on drop if never invoked.
    pub async fn close(&mut self) -> NanoboxResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let removed = self
            .runtime
            .remove(self.handle.id().as_str(), true)
            .await;
        let shut_down = self.runtime.shutdown(StopTimeout::Default).await;
        removed.and(shut_down)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for SimpleBox {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        // Escape hatch for callers that never reached close(): tear the
        // box down on a detached thread with its own executor, since drop
        // cannot block the async context it runs on.
        let runtime = self.runtime.clone();
        let id = self.handle.id().clone();
        std::thread::spawn(move || {
            let executor = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            if let Ok(executor) = executor {
                executor.block_on(async {
                    if let Err(e) = runtime.remove(id.as_str(), true).await {
                        tracing::debug!(box_id = %id, error = %e, "cleanup remove failed");
                    }
                    let _ = runtime.shutdown(StopTimeout::Default).await;
                });
            }
        });
    }
}
