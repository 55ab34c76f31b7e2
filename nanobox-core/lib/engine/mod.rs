//! Command execution.
//!
//! This module defines the execution contract between the runtime and the
//! isolation layer:
//! - [`ExecSpec`] - what to run inside a box
//! - [`OutputSink`] - caller-supplied sink receiving tagged output chunks
//!   while a command runs (streaming mode); without a sink output is
//!   discarded, and buffered mode accumulates it into an
//!   [`ExecutionResult`]
//! - [`IsolationBackend`] / [`IsolationUnit`] - the interface the runtime
//!   expects from whatever actually isolates processes
//!
//! A command's own exit code is data, not an error: `exec` fails only when
//! the command cannot be launched or supervised at all.

pub mod process;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BoxConfig;
use crate::management::BoxId;
use crate::NanoboxResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Which stream a chunk of command output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,

    /// Standard error
    Stderr,
}

/// Caller-supplied sink for streamed command output.
///
/// Invoked once per chunk, tagged with the originating stream, strictly
/// before the owning `exec` call returns. Chunks of one stream arrive in
/// the order the command produced them; interleaving across the two
/// streams is best-effort.
pub trait OutputSink: Send {
    /// Receive one chunk of output.
    fn write(&mut self, stream: OutputStream, text: &str);
}

/// Specification of one command to run inside a box.
///
/// ## Example
///
/// ```
/// use nanobox_core::engine::ExecSpec;
///
/// let spec = ExecSpec::new("python3")
///     .args(["-c", "print('hello')"])
///     .env("PYTHONUNBUFFERED", "1")
///     .working_dir("/workspace");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecSpec {
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) working_dir: Option<String>,
}

/// Exit status and captured output of a buffered execution.
///
/// Produced only by buffered execution; both buffers are complete once the
/// value exists.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// The command's own exit code (0 = success; negative = signal number)
    pub exit_code: i32,

    /// Everything the command wrote to standard output
    pub stdout: String,

    /// Everything the command wrote to standard error
    pub stderr: String,
}

/// Sink that accumulates both streams for buffered execution.
#[derive(Debug, Default)]
pub(crate) struct BufferSink {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Interface to the service that provisions isolation units.
///
/// Namespace, VM or jail mechanics live behind this trait; the runtime
/// only coordinates lifecycles.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Provision a fresh isolation unit for a box over the given rootfs.
    async fn provision(
        &self,
        id: &BoxId,
        rootfs: &Path,
        config: &BoxConfig,
    ) -> NanoboxResult<Box<dyn IsolationUnit>>;
}

/// One live isolated execution environment.
#[async_trait]
pub trait IsolationUnit: Send + Sync {
    /// Native process id of the unit, if it has one.
    fn pid(&self) -> Option<u32>;

    /// Run a command to completion, delivering output to `sink` as it is
    /// produced, and return the command's exit code.
    async fn exec(&self, spec: &ExecSpec, sink: Option<&mut dyn OutputSink>)
        -> NanoboxResult<i32>;

    /// Terminate the unit: signal graceful shutdown, wait up to `grace`
    /// (`None` = wait indefinitely), then kill.
    async fn terminate(&self, grace: Option<Duration>) -> NanoboxResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ExecSpec {
    /// Create a spec for the given program.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for this command only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Override the working directory for this command.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The program this spec will run.
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl ExecutionResult {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<F> OutputSink for F
where
    F: FnMut(OutputStream, &str) + Send,
{
    fn write(&mut self, stream: OutputStream, text: &str) {
        self(stream, text)
    }
}

impl OutputSink for BufferSink {
    fn write(&mut self, stream: OutputStream, text: &str) {
        let buffer = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buffer.push_str(text);
        buffer.push('\n');
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_spec_builder() {
        let spec = ExecSpec::new("ls")
            .arg("-l")
            .args(["-a", "/tmp"])
            .env("LANG", "C")
            .working_dir("/workspace");
        assert_eq!(spec.command(), "ls");
        assert_eq!(spec.args, vec!["-l", "-a", "/tmp"]);
        assert_eq!(spec.env, vec![("LANG".to_string(), "C".to_string())]);
        assert_eq!(spec.working_dir.as_deref(), Some("/workspace"));
    }

    #[test]
    fn test_buffer_sink_separates_streams() {
        let mut sink = BufferSink::default();
        sink.write(OutputStream::Stdout, "out1");
        sink.write(OutputStream::Stderr, "err1");
        sink.write(OutputStream::Stdout, "out2");
        assert_eq!(sink.stdout, "out1\nout2\n");
        assert_eq!(sink.stderr, "err1\n");
    }

    #[test]
    fn test_execution_result_success() {
        assert!(ExecutionResult::default().success());
        let failed = ExecutionResult {
            exit_code: 2,
            ..Default::default()
        };
        assert!(!failed.success());
    }

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |stream: OutputStream, text: &str| {
                seen.push((stream, text.to_string()));
            };
            let sink: &mut dyn OutputSink = &mut sink;
            sink.write(OutputStream::Stderr, "boom");
        }
        assert_eq!(seen, vec![(OutputStream::Stderr, "boom".to_string())]);
    }
}
