//! Host-process isolation backend.
//!
//! Each box is anchored by a keeper process parked over the box's rootfs;
//! commands run as separate supervised children sharing the box's
//! environment and working directory. Output is captured per stream by
//! dedicated reader tasks and forwarded over a channel to the caller's
//! sink until the command exits.
//!
//! This backend provides process-group supervision without namespace or
//! VM isolation; hardened backends plug in through the same
//! [`IsolationBackend`] interface.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::config::BoxConfig;
use crate::management::BoxId;
use crate::{NanoboxError, NanoboxResult};

use super::{ExecSpec, IsolationBackend, IsolationUnit, OutputSink, OutputStream};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Program used to anchor a box's process group.
const KEEPER_PROGRAM: &str = "/bin/sh";

/// Keeper script: park until terminated.
const KEEPER_SCRIPT: &str = "exec sleep 2147483647";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Backend provisioning process-backed isolation units.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

/// A process-backed box: the keeper process plus the commands currently
/// running inside it.
pub struct ProcessUnit {
    pid: u32,
    keeper: Mutex<Child>,
    rootfs: PathBuf,
    env: Vec<(String, String)>,
    working_dir: Option<String>,
    /// Pids of commands still executing; killed when the unit terminates.
    live_execs: StdMutex<Vec<u32>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProcessBackend {
    /// Create a new backend.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessUnit {
    /// Working directory for a command: the spec's override, else the
    /// box's configured directory, else the rootfs itself.
    fn exec_dir(&self, spec: &ExecSpec) -> PathBuf {
        match spec.working_dir.as_ref().or(self.working_dir.as_ref()) {
            Some(dir) => self.rootfs.join(dir.trim_start_matches('/')),
            None => self.rootfs.clone(),
        }
    }

    fn track_exec(&self, pid: u32) {
        self.live_execs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(pid);
    }

    fn forget_exec(&self, pid: u32) {
        self.live_execs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|p| *p != pid);
    }
}

/// Map an exit status to the exit-code convention: the command's own code,
/// or the negative signal number when it was signal-terminated.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        match status.code() {
            Some(code) => code,
            None => -status.signal().unwrap_or(1),
        }
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}

/// Spawn a reader task forwarding one stream's lines into the channel.
fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<(OutputStream, String)>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    });
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl IsolationBackend for ProcessBackend {
    async fn provision(
        &self,
        id: &BoxId,
        rootfs: &Path,
        config: &BoxConfig,
    ) -> NanoboxResult<Box<dyn IsolationUnit>> {
        let child = Command::new(KEEPER_PROGRAM)
            .args(["-c", KEEPER_SCRIPT])
            .current_dir(rootfs)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                NanoboxError::Engine(format!("failed to start box process for {}: {}", id, e))
            })?;

        let pid = child.id().ok_or_else(|| {
            NanoboxError::Engine(format!("box process for {} exited during startup", id))
        })?;

        tracing::debug!(box_id = %id, pid, "provisioned process-backed box");

        Ok(Box::new(ProcessUnit {
            pid,
            keeper: Mutex::new(child),
            rootfs: rootfs.to_path_buf(),
            env: config.env_pairs(),
            working_dir: config.get_working_dir().clone(),
            live_execs: StdMutex::new(Vec::new()),
        }))
    }
}

#[async_trait]
impl IsolationUnit for ProcessUnit {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn exec(
        &self,
        spec: &ExecSpec,
        mut sink: Option<&mut dyn OutputSink>,
    ) -> NanoboxResult<i32> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(self.env.iter().cloned())
            .envs(spec.env.iter().cloned())
            .current_dir(self.exec_dir(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                NanoboxError::Execution(format!("failed to launch '{}': {}", spec.command, e))
            })?;

        let exec_pid = child.id();
        if let Some(pid) = exec_pid {
            self.track_exec(pid);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, OutputStream::Stderr, tx.clone());
        }
        drop(tx);

        // Deliver chunks on the caller's task until both streams close.
        while let Some((stream, text)) = rx.recv().await {
            if let Some(sink) = sink.as_deref_mut() {
                sink.write(stream, &text);
            }
        }

        let status = child.wait().await.map_err(|e| {
            NanoboxError::Execution(format!("failed to reap '{}': {}", spec.command, e))
        });
        if let Some(pid) = exec_pid {
            self.forget_exec(pid);
        }

        Ok(exit_code_of(status?))
    }

    async fn terminate(&self, grace: Option<Duration>) -> NanoboxResult<()> {
        // Commands still running inside the box go down with it.
        let live: Vec<u32> = {
            let mut live = self.live_execs.lock().unwrap_or_else(|e| e.into_inner());
            live.drain(..).collect()
        };
        for pid in live {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }

        let mut keeper = self.keeper.lock().await;
        let already_exited = keeper
            .try_wait()
            .map_err(|e| NanoboxError::Engine(format!("failed to poll box process {}: {}", self.pid, e)))?
            .is_some();
        if already_exited {
            return Ok(());
        }

        let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM);

        match grace {
            Some(grace) => {
                if tokio::time::timeout(grace, keeper.wait()).await.is_err() {
                    tracing::debug!(pid = self.pid, "grace period elapsed; killing box process");
                    keeper.start_kill().map_err(|e| {
                        NanoboxError::Engine(format!("failed to kill box process {}: {}", self.pid, e))
                    })?;
                    keeper.wait().await.map_err(|e| {
                        NanoboxError::Engine(format!("failed to reap box process {}: {}", self.pid, e))
                    })?;
                }
            }
            None => {
                keeper.wait().await.map_err(|e| {
                    NanoboxError::Engine(format!("failed to reap box process {}: {}", self.pid, e))
                })?;
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_config() -> BoxConfig {
        BoxConfig::builder().image("alpine:3.19").build()
    }

    fn fixture_id() -> BoxId {
        BoxId::parse("01JGXYZABCDEFGHJKMNPQRSTVW").expect("fixture id must be valid")
    }

    async fn provision_unit(rootfs: &Path) -> Box<dyn IsolationUnit> {
        ProcessBackend::new()
            .provision(&fixture_id(), rootfs, &unit_config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unit_has_live_pid_until_terminated() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = provision_unit(tmp.path()).await;

        let pid = unit.pid().unwrap();
        assert!(signal::kill(Pid::from_raw(pid as i32), None).is_ok());

        unit.terminate(Some(Duration::from_secs(5))).await.unwrap();
        // Terminate twice is harmless.
        unit.terminate(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_streams_lines_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = provision_unit(tmp.path()).await;

        let spec = ExecSpec::new("/bin/sh").args(["-c", "echo one; echo two"]);
        let mut lines = Vec::new();
        let mut sink = |stream: OutputStream, text: &str| {
            lines.push((stream, text.to_string()));
        };
        let code = unit.exec(&spec, Some(&mut sink)).await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(
            lines,
            vec![
                (OutputStream::Stdout, "one".to_string()),
                (OutputStream::Stdout, "two".to_string()),
            ]
        );

        unit.terminate(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_without_sink_discards_output() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = provision_unit(tmp.path()).await;

        let spec = ExecSpec::new("/bin/echo").arg("discarded");
        let code = unit.exec(&spec, None).await.unwrap();
        assert_eq!(code, 0);

        unit.terminate(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_missing_program_is_execution_error() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = provision_unit(tmp.path()).await;

        let spec = ExecSpec::new("/definitely/not/a/program");
        let result = unit.exec(&spec, None).await;
        assert!(matches!(result, Err(NanoboxError::Execution(_))));

        unit.terminate(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_env_and_working_dir_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let config = BoxConfig::builder()
            .image("alpine:3.19")
            .env(vec!["BOX_TOKEN=abc".to_string()])
            .build();
        let unit = ProcessBackend::new()
            .provision(&fixture_id(), tmp.path(), &config)
            .await
            .unwrap();

        let spec = ExecSpec::new("/bin/sh").args(["-c", "echo $BOX_TOKEN; pwd"]);
        let mut lines = Vec::new();
        let mut sink = |_stream: OutputStream, text: &str| lines.push(text.to_string());
        unit.exec(&spec, Some(&mut sink)).await.unwrap();

        assert_eq!(lines[0], "abc");
        assert_eq!(lines[1], tmp.path().canonicalize().unwrap().to_string_lossy());

        unit.terminate(Some(Duration::from_secs(5))).await.unwrap();
    }
}
