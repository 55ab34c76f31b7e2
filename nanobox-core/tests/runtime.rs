//! End-to-end tests for the box runtime: lifecycle, lookup, execution,
//! metrics and shutdown.

use nanobox_core::config::{BoxConfig, RuntimeOptions};
use nanobox_core::engine::{ExecSpec, OutputStream};
use nanobox_core::management::{BoxRuntime, BoxStatus, SimpleBox, StopTimeout};
use nanobox_core::NanoboxError;
use tempfile::TempDir;

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

fn test_runtime() -> (BoxRuntime, TempDir) {
    let home = tempfile::tempdir().expect("failed to create temp home");
    let options = RuntimeOptions {
        home_dir: home.path().to_path_buf(),
    };
    let runtime = BoxRuntime::new(options).expect("failed to create runtime");
    (runtime, home)
}

fn alpine() -> BoxConfig {
    BoxConfig::builder().image("alpine:3.19").build()
}

const STOP: StopTimeout = StopTimeout::Seconds(5);

//--------------------------------------------------------------------------------------------------
// Tests: Lifecycle
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_create_starts_box_and_get_returns_it() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let info = runtime.get_info(handle.id().as_str()).await.unwrap();
    assert_eq!(info.get_state().get_status(), &BoxStatus::Running);
    assert!(*info.get_state().get_running());
    assert!(info.get_state().get_pid().is_some());
    assert_eq!(info.get_image(), "alpine:3.19");

    let same = runtime.get(handle.id().as_str()).await.unwrap();
    assert_eq!(same.id(), handle.id());
}

#[test_log::test(tokio::test)]
async fn test_stop_then_start_preserves_identity_and_image() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();
    let id = handle.id().clone();

    handle.stop(STOP).await.unwrap();
    let info = handle.info().await.unwrap();
    assert_eq!(info.get_state().get_status(), &BoxStatus::Stopped);
    assert!(info.get_state().get_pid().is_none());

    handle.start().await.unwrap();
    let info = handle.info().await.unwrap();
    assert_eq!(info.get_id(), &id);
    assert_eq!(info.get_image(), "alpine:3.19");
    assert_eq!(info.get_state().get_status(), &BoxStatus::Running);
}

#[test_log::test(tokio::test)]
async fn test_stop_is_idempotent() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    handle.stop(STOP).await.unwrap();
    handle.stop(STOP).await.unwrap();
    assert_eq!(
        handle.info().await.unwrap().get_state().get_status(),
        &BoxStatus::Stopped
    );
}

#[test_log::test(tokio::test)]
async fn test_start_running_box_is_invalid_state() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let result = handle.start().await;
    assert!(matches!(result, Err(NanoboxError::InvalidState(_))));
}

#[test_log::test(tokio::test)]
async fn test_remove_then_get_fails_not_found() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();
    let id = handle.id().clone();

    handle.stop(STOP).await.unwrap();
    runtime.remove(id.as_str(), false).await.unwrap();

    assert!(matches!(
        runtime.get(id.as_str()).await,
        Err(NanoboxError::NotFound(_))
    ));
    assert!(runtime.list().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_remove_running_without_force_is_invalid_state() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let result = runtime.remove(handle.id().as_str(), false).await;
    assert!(matches!(result, Err(NanoboxError::InvalidState(_))));

    // The record is untouched by the failed remove.
    assert_eq!(
        handle.info().await.unwrap().get_state().get_status(),
        &BoxStatus::Running
    );
}

#[test_log::test(tokio::test)]
async fn test_force_remove_running_box() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();
    let id = handle.id().clone();

    runtime.remove(id.as_str(), true).await.unwrap();
    assert!(matches!(
        runtime.get(id.as_str()).await,
        Err(NanoboxError::NotFound(_))
    ));
}

#[test_log::test(tokio::test)]
async fn test_remove_unknown_box_is_not_found() {
    let (runtime, _home) = test_runtime();
    let result = runtime.remove("no-such-box", true).await;
    assert!(matches!(result, Err(NanoboxError::NotFound(_))));
}

#[test_log::test(tokio::test)]
async fn test_auto_remove_deletes_record_on_stop() {
    let (runtime, _home) = test_runtime();
    let config = BoxConfig::builder()
        .image("alpine:3.19")
        .auto_remove(true)
        .build();
    let handle = runtime.create(config).await.unwrap();
    let id = handle.id().clone();

    handle.stop(STOP).await.unwrap();
    assert!(matches!(
        runtime.get(id.as_str()).await,
        Err(NanoboxError::NotFound(_))
    ));
}

//--------------------------------------------------------------------------------------------------
// Tests: Lookup
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_unique_prefix_resolves_to_same_record() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();
    let id = handle.id().clone();

    let by_prefix = runtime.get_info(id.short()).await.unwrap();
    let by_full = runtime.get_info(id.as_str()).await.unwrap();
    assert_eq!(by_prefix.get_id(), by_full.get_id());
    assert_eq!(by_prefix.get_id(), &id);
}

#[test_log::test(tokio::test)]
async fn test_lookup_by_name() {
    let (runtime, _home) = test_runtime();
    let config = BoxConfig::builder()
        .image("alpine:3.19")
        .name("workhorse")
        .build();
    let handle = runtime.create(config).await.unwrap();

    let info = runtime.get_info("workhorse").await.unwrap();
    assert_eq!(info.get_id(), handle.id());
    assert_eq!(info.get_name().as_deref(), Some("workhorse"));
}

#[test_log::test(tokio::test)]
async fn test_duplicate_name_is_rejected() {
    let (runtime, _home) = test_runtime();
    let config = BoxConfig::builder()
        .image("alpine:3.19")
        .name("twin")
        .build();
    runtime.create(config.clone()).await.unwrap();

    let result = runtime.create(config).await;
    assert!(matches!(result, Err(NanoboxError::AlreadyExists(_))));
}

#[test_log::test(tokio::test)]
async fn test_list_preserves_creation_order() {
    let (runtime, _home) = test_runtime();
    let first = runtime.create(alpine()).await.unwrap();
    let second = runtime.create(alpine()).await.unwrap();
    let third = runtime.create(alpine()).await.unwrap();

    let listed: Vec<String> = runtime
        .list()
        .await
        .unwrap()
        .iter()
        .map(|info| info.get_id().to_string())
        .collect();
    assert_eq!(
        listed,
        vec![
            first.id().to_string(),
            second.id().to_string(),
            third.id().to_string()
        ]
    );
}

//--------------------------------------------------------------------------------------------------
// Tests: Execution
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_streaming_stdout_only_command() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let mut stdout_chunks = 0;
    let mut stderr_chunks = 0;
    {
        let mut sink = |stream: OutputStream, _text: &str| match stream {
            OutputStream::Stdout => stdout_chunks += 1,
            OutputStream::Stderr => stderr_chunks += 1,
        };
        let spec = ExecSpec::new("/bin/echo").arg("hello");
        let code = handle.exec(&spec, Some(&mut sink)).await.unwrap();
        assert_eq!(code, 0);
    }

    assert!(stdout_chunks >= 1);
    assert_eq!(stderr_chunks, 0);
}

#[test_log::test(tokio::test)]
async fn test_streaming_command_writing_both_streams() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let mut stdout_chunks = 0;
    let mut stderr_chunks = 0;
    {
        let mut sink = |stream: OutputStream, _text: &str| match stream {
            OutputStream::Stdout => stdout_chunks += 1,
            OutputStream::Stderr => stderr_chunks += 1,
        };
        let spec = ExecSpec::new("/bin/sh").args(["-c", "echo out; echo err 1>&2"]);
        handle.exec(&spec, Some(&mut sink)).await.unwrap();
    }

    assert!(stdout_chunks >= 1);
    assert!(stderr_chunks >= 1);
}

#[test_log::test(tokio::test)]
async fn test_buffered_echo_hello() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let spec = ExecSpec::new("/bin/echo").arg("hello");
    let result = handle.exec_buffered(&spec).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(result.success());
    assert!(result.stdout.contains("hello\n"));
    assert!(result.stderr.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_missing_executable_is_execution_error() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let spec = ExecSpec::new("/definitely/not/a/program");
    let result = handle.exec(&spec, None).await;
    assert!(matches!(result, Err(NanoboxError::Execution(_))));
}

#[test_log::test(tokio::test)]
async fn test_nonzero_exit_code_is_not_an_error() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    let spec = ExecSpec::new("ls").arg("/definitely/not/a/path");
    let result = handle.exec_buffered(&spec).await.unwrap();
    assert_ne!(result.exit_code, 0);
    assert!(!result.success());
}

#[test_log::test(tokio::test)]
async fn test_exec_on_stopped_box_is_invalid_state() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();
    handle.stop(STOP).await.unwrap();

    let spec = ExecSpec::new("/bin/echo").arg("nope");
    let result = handle.exec(&spec, None).await;
    assert!(matches!(result, Err(NanoboxError::InvalidState(_))));
}

#[test_log::test(tokio::test)]
async fn test_boxes_execute_independently() {
    let (runtime, _home) = test_runtime();
    let first = runtime.create(alpine()).await.unwrap();
    let second = runtime.create(alpine()).await.unwrap();

    let spec_a = ExecSpec::new("/bin/echo").arg("alpha");
    let spec_b = ExecSpec::new("/bin/echo").arg("beta");
    let (a, b) = tokio::join!(first.exec_buffered(&spec_a), second.exec_buffered(&spec_b));

    assert!(a.unwrap().stdout.contains("alpha"));
    assert!(b.unwrap().stdout.contains("beta"));
}

//--------------------------------------------------------------------------------------------------
// Tests: Metrics & Shutdown
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_metrics_reflect_boxes_and_commands() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();
    runtime.create(alpine()).await.unwrap();

    let spec = ExecSpec::new("/bin/echo").arg("count-me");
    handle.exec(&spec, None).await.unwrap();

    let metrics = runtime.metrics().await;
    assert_eq!(metrics.boxes_created_total, 2);
    assert_eq!(metrics.running_boxes, 2);
    assert_eq!(metrics.commands_executed_total, 1);
    assert_eq!(metrics.exec_errors_total, 0);
    assert_eq!(metrics.total_boxes, 2);

    let box_metrics = handle.metrics().await.unwrap();
    assert!(box_metrics.running);
    assert_eq!(box_metrics.commands_executed_total, 1);
}

#[test_log::test(tokio::test)]
async fn test_failed_create_leaves_no_record() {
    let (runtime, _home) = test_runtime();
    let config = BoxConfig::builder().image("").build();

    let result = runtime.create(config).await;
    assert!(matches!(result, Err(NanoboxError::InvalidArgument(_))));
    assert!(runtime.list().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_shutdown_stops_all_boxes_and_terminates_runtime() {
    let (runtime, _home) = test_runtime();
    for _ in 0..3 {
        runtime.create(alpine()).await.unwrap();
    }

    runtime.shutdown(STOP).await.unwrap();

    for info in runtime.list().await.unwrap() {
        assert!(!*info.get_state().get_running());
    }

    let result = runtime.create(alpine()).await;
    assert!(matches!(result, Err(NanoboxError::Stopped(_))));

    // Shutdown is idempotent.
    runtime.shutdown(STOP).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_start_after_shutdown_is_rejected() {
    let (runtime, _home) = test_runtime();
    let handle = runtime.create(alpine()).await.unwrap();

    runtime.shutdown(STOP).await.unwrap();
    let result = handle.start().await;
    assert!(matches!(result, Err(NanoboxError::Stopped(_))));
}

//--------------------------------------------------------------------------------------------------
// Tests: Simple Façade
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_simple_box_runs_buffered_commands() {
    let home = tempfile::tempdir().unwrap();
    let options = RuntimeOptions {
        home_dir: home.path().to_path_buf(),
    };

    let mut sandbox = SimpleBox::with_options(options, "alpine:3.19", 0, 0)
        .await
        .unwrap();
    let result = sandbox.run("/bin/echo", ["hello"]).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("hello\n"));

    sandbox.close().await.unwrap();
    // Closing twice is harmless.
    sandbox.close().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_simple_box_rejects_empty_image() {
    let result = SimpleBox::new("", 0, 0).await;
    assert!(matches!(result, Err(NanoboxError::InvalidArgument(_))));
}
