//! C-compatible API for the nanobox runtime.
//!
//! # Conventions
//!
//! - Every fallible function returns a [`NanoboxErrorCode`] and, when a
//!   non-null `out_error` is supplied, fills it with the code plus a
//!   human-readable message.
//! - Results are written through `out_*` pointers; ownership of every
//!   returned string or record passes to the caller, who releases it
//!   through the matching `nanobox_*_free` function.
//! - Passing NULL to any free function is a safe no-op.
//! - Structured records (box info, metrics) cross the boundary as JSON.
//!
//! # Safety
//!
//! All `unsafe extern "C"` functions dereference raw pointers supplied by
//! the caller; the caller is responsible for pointer validity and for
//! releasing returned allocations exactly once.

#![allow(clippy::missing_safety_doc)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

use tokio::runtime::Runtime as TokioRuntime;

use nanobox_core::config::{BoxConfig, RuntimeOptions};
use nanobox_core::engine::{ExecSpec, OutputSink, OutputStream};
use nanobox_core::management::{BoxHandle, BoxRuntime, SimpleBox, StopTimeout};
use nanobox_core::NanoboxError;

//--------------------------------------------------------------------------------------------------
// Types: Error Codes
//--------------------------------------------------------------------------------------------------

/// Error codes returned by nanobox C API functions.
///
/// Codes map one-to-one onto the runtime's error kinds and are stable:
/// renumbering or removing a code is a breaking change.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanoboxErrorCode {
    /// Operation succeeded
    Ok = 0,
    /// Internal error
    Internal = 1,
    /// Resource not found
    NotFound = 2,
    /// Resource already exists
    AlreadyExists = 3,
    /// Invalid state for operation
    InvalidState = 4,
    /// Invalid argument provided
    InvalidArgument = 5,
    /// Configuration error
    Config = 6,
    /// Storage error
    Storage = 7,
    /// Image error
    Image = 8,
    /// Network error
    Network = 9,
    /// Execution error
    Execution = 10,
    /// Runtime stopped
    Stopped = 11,
    /// Engine error
    Engine = 12,
    /// Unsupported operation
    Unsupported = 13,
    /// Database error
    Database = 14,
    /// Portal/communication error
    Portal = 15,
    /// RPC error
    Rpc = 16,
}

/// Error information for the C API: a stable code plus an optional
/// detail message.
#[repr(C)]
pub struct CNanoboxError {
    /// Error code
    pub code: NanoboxErrorCode,
    /// Detail message (NULL if none; free with `nanobox_error_free`)
    pub message: *mut c_char,
}

impl Default for CNanoboxError {
    fn default() -> Self {
        CNanoboxError {
            code: NanoboxErrorCode::Ok,
            message: ptr::null_mut(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Types: Opaque Handles
//--------------------------------------------------------------------------------------------------

/// Opaque handle to a box runtime instance.
pub struct CNanoboxRuntime {
    runtime: BoxRuntime,
    tokio_rt: Arc<TokioRuntime>,
}

/// Opaque handle to one box.
pub struct CNanoboxBox {
    handle: BoxHandle,
    tokio_rt: Arc<TokioRuntime>,
}

/// Opaque handle for the simple single-box API.
pub struct CNanoboxSimple {
    simple: Option<SimpleBox>,
    tokio_rt: Arc<TokioRuntime>,
}

/// Result of a buffered command execution.
#[repr(C)]
pub struct CNanoboxExecResult {
    /// The command's own exit code
    pub exit_code: c_int,
    /// Captured standard output (free with `nanobox_result_free`)
    pub stdout_text: *mut c_char,
    /// Captured standard error (free with `nanobox_result_free`)
    pub stderr_text: *mut c_char,
}

/// Output callback: `(chunk_text, is_stderr, user_data)`.
pub type NanoboxOutputCallback = extern "C" fn(*const c_char, c_int, *mut c_void);

/// Adapter delivering runtime output chunks into a C callback.
struct CallbackSink {
    callback: NanoboxOutputCallback,
    user_data: *mut c_void,
}

// The callback contract requires user_data to be usable from the thread
// driving the execution.
unsafe impl Send for CallbackSink {}

impl OutputSink for CallbackSink {
    fn write(&mut self, stream: OutputStream, text: &str) {
        let is_stderr = matches!(stream, OutputStream::Stderr) as c_int;
        let c_text = CString::new(text).unwrap_or_default();
        (self.callback)(c_text.as_ptr(), is_stderr, self.user_data);
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Map a runtime error to its stable code.
fn error_to_code(err: &NanoboxError) -> NanoboxErrorCode {
    match err {
        NanoboxError::Internal(_) => NanoboxErrorCode::Internal,
        NanoboxError::NotFound(_) => NanoboxErrorCode::NotFound,
        NanoboxError::AlreadyExists(_) => NanoboxErrorCode::AlreadyExists,
        NanoboxError::InvalidState(_) => NanoboxErrorCode::InvalidState,
        NanoboxError::InvalidArgument(_) => NanoboxErrorCode::InvalidArgument,
        NanoboxError::Config(_) => NanoboxErrorCode::Config,
        NanoboxError::Storage(_) => NanoboxErrorCode::Storage,
        NanoboxError::Image(_) => NanoboxErrorCode::Image,
        NanoboxError::Network(_) => NanoboxErrorCode::Network,
        NanoboxError::Execution(_) => NanoboxErrorCode::Execution,
        NanoboxError::Stopped(_) => NanoboxErrorCode::Stopped,
        NanoboxError::Engine(_) => NanoboxErrorCode::Engine,
        NanoboxError::Unsupported(_) => NanoboxErrorCode::Unsupported,
        NanoboxError::Database(_) => NanoboxErrorCode::Database,
        NanoboxError::Portal(_) => NanoboxErrorCode::Portal,
        NanoboxError::Rpc(_) => NanoboxErrorCode::Rpc,
    }
}

/// Render an error message as an owned C string.
fn error_to_c_string(err: &NanoboxError) -> *mut c_char {
    let message = err.to_string();
    match CString::new(message) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Write an error through the out parameter (if non-null) and return its code.
fn write_error(out_error: *mut CNanoboxError, err: NanoboxError) -> NanoboxErrorCode {
    let code = error_to_code(&err);
    if !out_error.is_null() {
        unsafe {
            *out_error = CNanoboxError {
                code,
                message: error_to_c_string(&err),
            };
        }
    }
    code
}

/// InvalidArgument error for a NULL pointer parameter.
fn null_pointer_error(param: &str) -> NanoboxError {
    NanoboxError::InvalidArgument(format!("{} is null", param))
}

/// Convert a C string to an owned Rust string.
unsafe fn c_str_to_string(s: *const c_char, param: &str) -> Result<String, NanoboxError> {
    if s.is_null() {
        return Err(null_pointer_error(param));
    }
    unsafe {
        CStr::from_ptr(s)
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| NanoboxError::InvalidArgument(format!("{} is not valid UTF-8: {}", param, e)))
    }
}

/// Create a fresh Tokio runtime for an opaque handle.
fn new_tokio_runtime() -> Result<Arc<TokioRuntime>, NanoboxError> {
    TokioRuntime::new()
        .map(Arc::new)
        .map_err(|e| NanoboxError::Internal(format!("failed to create async runtime: {}", e)))
}

/// Serialize a record to JSON and hand it to the caller.
fn write_json<T: serde::Serialize>(
    value: &T,
    out_json: *mut *mut c_char,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            return write_error(
                out_error,
                NanoboxError::Internal(format!("JSON serialization failed: {}", e)),
            );
        }
    };
    match CString::new(json) {
        Ok(s) => {
            unsafe { *out_json = s.into_raw() };
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(
            out_error,
            NanoboxError::Internal(format!("CString conversion failed: {}", e)),
        ),
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Runtime
//--------------------------------------------------------------------------------------------------

/// Get the nanobox version string (static; do not free).
#[no_mangle]
pub extern "C" fn nanobox_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Create a new runtime.
///
/// `home_dir` may be NULL to use the default (`NANOBOX_HOME` or
/// `~/.nanobox`). On success `out_runtime` receives a handle that must be
/// released with `nanobox_runtime_free`.
#[no_mangle]
pub unsafe extern "C" fn nanobox_runtime_new(
    home_dir: *const c_char,
    out_runtime: *mut *mut CNanoboxRuntime,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if out_runtime.is_null() {
        return write_error(out_error, null_pointer_error("out_runtime"));
    }

    let tokio_rt = match new_tokio_runtime() {
        Ok(rt) => rt,
        Err(e) => return write_error(out_error, e),
    };

    let mut options = RuntimeOptions::default();
    if !home_dir.is_null() {
        match c_str_to_string(home_dir, "home_dir") {
            Ok(path) => options.home_dir = path.into(),
            Err(e) => return write_error(out_error, e),
        }
    }

    match BoxRuntime::new(options) {
        Ok(runtime) => {
            *out_runtime = Box::into_raw(Box::new(CNanoboxRuntime { runtime, tokio_rt }));
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(out_error, e),
    }
}

/// Create a box and start it.
///
/// `options_json` is a JSON-encoded box configuration, e.g.
/// `{"image":"alpine:3.19","cpus":2,"auto_remove":false}`. On success
/// `out_box` receives a handle that must be released with
/// `nanobox_box_free`.
#[no_mangle]
pub unsafe extern "C" fn nanobox_create_box(
    runtime: *mut CNanoboxRuntime,
    options_json: *const c_char,
    out_box: *mut *mut CNanoboxBox,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }
    if out_box.is_null() {
        return write_error(out_error, null_pointer_error("out_box"));
    }

    let runtime_ref = &*runtime;

    let options_str = match c_str_to_string(options_json, "options_json") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };
    let config: BoxConfig = match serde_json::from_str(&options_str) {
        Ok(config) => config,
        Err(e) => {
            return write_error(
                out_error,
                NanoboxError::InvalidArgument(format!("invalid box options JSON: {}", e)),
            );
        }
    };

    match runtime_ref.tokio_rt.block_on(runtime_ref.runtime.create(config)) {
        Ok(handle) => {
            *out_box = Box::into_raw(Box::new(CNanoboxBox {
                handle,
                tokio_rt: runtime_ref.tokio_rt.clone(),
            }));
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(out_error, e),
    }
}

/// Get a handle to an existing box by id, name, or unique id prefix.
#[no_mangle]
pub unsafe extern "C" fn nanobox_get(
    runtime: *mut CNanoboxRuntime,
    id_or_name: *const c_char,
    out_box: *mut *mut CNanoboxBox,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }
    if out_box.is_null() {
        return write_error(out_error, null_pointer_error("out_box"));
    }

    let runtime_ref = &*runtime;
    let key = match c_str_to_string(id_or_name, "id_or_name") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };

    match runtime_ref.tokio_rt.block_on(runtime_ref.runtime.get(&key)) {
        Ok(handle) => {
            *out_box = Box::into_raw(Box::new(CNanoboxBox {
                handle,
                tokio_rt: runtime_ref.tokio_rt.clone(),
            }));
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(out_error, e),
    }
}

/// Get a single box's info as JSON.
///
/// The JSON object carries `id`, `name`, `state` (with `status`,
/// `running`, `pid`), `created_at`, `image`, `cpus` and `memory_mib`.
#[no_mangle]
pub unsafe extern "C" fn nanobox_get_info(
    runtime: *mut CNanoboxRuntime,
    id_or_name: *const c_char,
    out_json: *mut *mut c_char,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }
    if out_json.is_null() {
        return write_error(out_error, null_pointer_error("out_json"));
    }

    let runtime_ref = &*runtime;
    let key = match c_str_to_string(id_or_name, "id_or_name") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };

    match runtime_ref
        .tokio_rt
        .block_on(runtime_ref.runtime.get_info(&key))
    {
        Ok(info) => write_json(&info, out_json, out_error),
        Err(e) => write_error(out_error, e),
    }
}

/// List all boxes as a JSON array (creation order).
#[no_mangle]
pub unsafe extern "C" fn nanobox_list_info(
    runtime: *mut CNanoboxRuntime,
    out_json: *mut *mut c_char,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }
    if out_json.is_null() {
        return write_error(out_error, null_pointer_error("out_json"));
    }

    let runtime_ref = &*runtime;
    match runtime_ref.tokio_rt.block_on(runtime_ref.runtime.list()) {
        Ok(infos) => write_json(&infos, out_json, out_error),
        Err(e) => write_error(out_error, e),
    }
}

/// Remove a box. A running box is removed only when `force` is non-zero.
#[no_mangle]
pub unsafe extern "C" fn nanobox_remove(
    runtime: *mut CNanoboxRuntime,
    id_or_name: *const c_char,
    force: c_int,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }

    let runtime_ref = &*runtime;
    let key = match c_str_to_string(id_or_name, "id_or_name") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };

    match runtime_ref
        .tokio_rt
        .block_on(runtime_ref.runtime.remove(&key, force != 0))
    {
        Ok(()) => NanoboxErrorCode::Ok,
        Err(e) => write_error(out_error, e),
    }
}

/// Get runtime-wide metrics as JSON.
#[no_mangle]
pub unsafe extern "C" fn nanobox_runtime_metrics(
    runtime: *mut CNanoboxRuntime,
    out_json: *mut *mut c_char,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }
    if out_json.is_null() {
        return write_error(out_error, null_pointer_error("out_json"));
    }

    let runtime_ref = &*runtime;
    let metrics = runtime_ref.tokio_rt.block_on(runtime_ref.runtime.metrics());
    write_json(&metrics, out_json, out_error)
}

/// Stop every running box and permanently terminate the runtime.
///
/// Timeout semantics in seconds: `0` = default (10s), positive = wait
/// that long per box before force-killing, `-1` = wait indefinitely.
/// After shutdown, create/start calls fail with `Stopped`.
#[no_mangle]
pub unsafe extern "C" fn nanobox_runtime_shutdown(
    runtime: *mut CNanoboxRuntime,
    timeout: c_int,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if runtime.is_null() {
        return write_error(out_error, null_pointer_error("runtime"));
    }

    let runtime_ref = &*runtime;
    match runtime_ref
        .tokio_rt
        .block_on(runtime_ref.runtime.shutdown(StopTimeout::from_secs(timeout)))
    {
        Ok(()) => NanoboxErrorCode::Ok,
        Err(e) => write_error(out_error, e),
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Box Operations
//--------------------------------------------------------------------------------------------------

/// Execute a command inside a box.
///
/// `args_json` is a JSON array of strings (NULL for none). When a
/// callback is supplied it is invoked once per output chunk with the
/// chunk text, a stream flag (`0` = stdout, `1` = stderr) and
/// `user_data`, strictly before this function returns. Without a
/// callback, output is discarded.
///
/// The command's own exit code is written to `out_exit_code`; a non-zero
/// exit code is not an API error.
#[no_mangle]
pub unsafe extern "C" fn nanobox_execute(
    handle: *mut CNanoboxBox,
    command: *const c_char,
    args_json: *const c_char,
    callback: Option<NanoboxOutputCallback>,
    user_data: *mut c_void,
    out_exit_code: *mut c_int,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if handle.is_null() {
        return write_error(out_error, null_pointer_error("handle"));
    }
    if out_exit_code.is_null() {
        return write_error(out_error, null_pointer_error("out_exit_code"));
    }

    let handle_ref = &*handle;

    let command = match c_str_to_string(command, "command") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };

    let args: Vec<String> = if args_json.is_null() {
        Vec::new()
    } else {
        let args_str = match c_str_to_string(args_json, "args_json") {
            Ok(s) => s,
            Err(e) => return write_error(out_error, e),
        };
        match serde_json::from_str(&args_str) {
            Ok(args) => args,
            Err(e) => {
                return write_error(
                    out_error,
                    NanoboxError::InvalidArgument(format!("invalid args JSON: {}", e)),
                );
            }
        }
    };

    let spec = ExecSpec::new(command).args(args);

    let result = match callback {
        Some(callback) => {
            let mut sink = CallbackSink {
                callback,
                user_data,
            };
            handle_ref
                .tokio_rt
                .block_on(handle_ref.handle.exec(&spec, Some(&mut sink)))
        }
        None => handle_ref.tokio_rt.block_on(handle_ref.handle.exec(&spec, None)),
    };

    match result {
        Ok(exit_code) => {
            *out_exit_code = exit_code;
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(out_error, e),
    }
}

/// Restart a stopped box.
#[no_mangle]
pub unsafe extern "C" fn nanobox_box_start(
    handle: *mut CNanoboxBox,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if handle.is_null() {
        return write_error(out_error, null_pointer_error("handle"));
    }

    let handle_ref = &*handle;
    match handle_ref.tokio_rt.block_on(handle_ref.handle.start()) {
        Ok(()) => NanoboxErrorCode::Ok,
        Err(e) => write_error(out_error, e),
    }
}

/// Stop a box (idempotent). Timeout semantics as for
/// `nanobox_runtime_shutdown`.
#[no_mangle]
pub unsafe extern "C" fn nanobox_box_stop(
    handle: *mut CNanoboxBox,
    timeout: c_int,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if handle.is_null() {
        return write_error(out_error, null_pointer_error("handle"));
    }

    let handle_ref = &*handle;
    match handle_ref
        .tokio_rt
        .block_on(handle_ref.handle.stop(StopTimeout::from_secs(timeout)))
    {
        Ok(()) => NanoboxErrorCode::Ok,
        Err(e) => write_error(out_error, e),
    }
}

/// Get a box's info as JSON (see `nanobox_get_info` for the shape).
#[no_mangle]
pub unsafe extern "C" fn nanobox_box_info(
    handle: *mut CNanoboxBox,
    out_json: *mut *mut c_char,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if handle.is_null() {
        return write_error(out_error, null_pointer_error("handle"));
    }
    if out_json.is_null() {
        return write_error(out_error, null_pointer_error("out_json"));
    }

    let handle_ref = &*handle;
    match handle_ref.tokio_rt.block_on(handle_ref.handle.info()) {
        Ok(info) => write_json(&info, out_json, out_error),
        Err(e) => write_error(out_error, e),
    }
}

/// Get a box's metrics as JSON.
#[no_mangle]
pub unsafe extern "C" fn nanobox_box_metrics(
    handle: *mut CNanoboxBox,
    out_json: *mut *mut c_char,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if handle.is_null() {
        return write_error(out_error, null_pointer_error("handle"));
    }
    if out_json.is_null() {
        return write_error(out_error, null_pointer_error("out_json"));
    }

    let handle_ref = &*handle;
    match handle_ref.tokio_rt.block_on(handle_ref.handle.metrics()) {
        Ok(metrics) => write_json(&metrics, out_json, out_error),
        Err(e) => write_error(out_error, e),
    }
}

/// Get a box's id as an owned string (free with `nanobox_free_string`).
/// Returns NULL for a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn nanobox_box_id(handle: *mut CNanoboxBox) -> *mut c_char {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let handle_ref = &*handle;
    match CString::new(handle_ref.handle.id().to_string()) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Simple API
//--------------------------------------------------------------------------------------------------

/// Create and start a single box with its own private runtime.
///
/// `cpus` and `memory_mib` of `0` (or less) select the runtime defaults.
/// Release with `nanobox_simple_free`, which stops and force-removes the
/// box.
#[no_mangle]
pub unsafe extern "C" fn nanobox_simple_new(
    image: *const c_char,
    cpus: c_int,
    memory_mib: c_int,
    out_simple: *mut *mut CNanoboxSimple,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if out_simple.is_null() {
        return write_error(out_error, null_pointer_error("out_simple"));
    }

    let image = match c_str_to_string(image, "image") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };

    let tokio_rt = match new_tokio_runtime() {
        Ok(rt) => rt,
        Err(e) => return write_error(out_error, e),
    };

    let result = tokio_rt.block_on(SimpleBox::new(
        &image,
        cpus.max(0) as u32,
        memory_mib.max(0) as u32,
    ));

    match result {
        Ok(simple) => {
            *out_simple = Box::into_raw(Box::new(CNanoboxSimple {
                simple: Some(simple),
                tokio_rt,
            }));
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(out_error, e),
    }
}

/// Run a command with buffered output capture.
///
/// `args` is an array of `argc` C strings (may be NULL when `argc` is 0).
/// On success `out_result` receives an owned record released with
/// `nanobox_result_free`.
#[no_mangle]
pub unsafe extern "C" fn nanobox_simple_run(
    simple: *mut CNanoboxSimple,
    command: *const c_char,
    args: *const *const c_char,
    argc: c_int,
    out_result: *mut *mut CNanoboxExecResult,
    out_error: *mut CNanoboxError,
) -> NanoboxErrorCode {
    if simple.is_null() {
        return write_error(out_error, null_pointer_error("simple"));
    }
    if out_result.is_null() {
        return write_error(out_error, null_pointer_error("out_result"));
    }

    let simple_ref = &*simple;
    let command = match c_str_to_string(command, "command") {
        Ok(s) => s,
        Err(e) => return write_error(out_error, e),
    };

    let mut arg_vec: Vec<String> = Vec::new();
    if !args.is_null() {
        for i in 0..argc {
            let arg_ptr = *args.offset(i as isize);
            if arg_ptr.is_null() {
                break;
            }
            match c_str_to_string(arg_ptr, "args") {
                Ok(s) => arg_vec.push(s),
                Err(e) => return write_error(out_error, e),
            }
        }
    }

    let sandbox = match simple_ref.simple.as_ref() {
        Some(sandbox) => sandbox,
        None => {
            return write_error(
                out_error,
                NanoboxError::InvalidState("box already released".to_string()),
            );
        }
    };

    match simple_ref.tokio_rt.block_on(sandbox.run(&command, arg_vec)) {
        Ok(result) => {
            let stdout_text = CString::new(result.stdout)
                .map(CString::into_raw)
                .unwrap_or(ptr::null_mut());
            let stderr_text = CString::new(result.stderr)
                .map(CString::into_raw)
                .unwrap_or(ptr::null_mut());
            *out_result = Box::into_raw(Box::new(CNanoboxExecResult {
                exit_code: result.exit_code,
                stdout_text,
                stderr_text,
            }));
            NanoboxErrorCode::Ok
        }
        Err(e) => write_error(out_error, e),
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Memory Management
//--------------------------------------------------------------------------------------------------

/// Free a runtime handle. NULL is a no-op.
#[no_mangle]
pub unsafe extern "C" fn nanobox_runtime_free(runtime: *mut CNanoboxRuntime) {
    if !runtime.is_null() {
        drop(Box::from_raw(runtime));
    }
}

/// Free a box handle. NULL is a no-op. The box itself keeps running; use
/// `nanobox_box_stop` or `nanobox_remove` to tear it down.
#[no_mangle]
pub unsafe extern "C" fn nanobox_box_free(handle: *mut CNanoboxBox) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Free a simple box, stopping and force-removing the underlying box.
/// NULL is a no-op.
#[no_mangle]
pub unsafe extern "C" fn nanobox_simple_free(simple: *mut CNanoboxSimple) {
    if simple.is_null() {
        return;
    }
    let mut simple = Box::from_raw(simple);
    if let Some(mut sandbox) = simple.simple.take() {
        let _ = simple.tokio_rt.block_on(sandbox.close());
    }
}

/// Free a buffered execution result. NULL is a no-op.
#[no_mangle]
pub unsafe extern "C" fn nanobox_result_free(result: *mut CNanoboxExecResult) {
    if result.is_null() {
        return;
    }
    let result = Box::from_raw(result);
    if !result.stdout_text.is_null() {
        drop(CString::from_raw(result.stdout_text));
    }
    if !result.stderr_text.is_null() {
        drop(CString::from_raw(result.stderr_text));
    }
}

/// Free a string allocated by nanobox. NULL is a no-op.
#[no_mangle]
pub unsafe extern "C" fn nanobox_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Release an error's message and reset it to `{Ok, NULL}`. NULL is a
/// no-op.
#[no_mangle]
pub unsafe extern "C" fn nanobox_error_free(error: *mut CNanoboxError) {
    if error.is_null() {
        return;
    }
    let error = &mut *error;
    if !error.message.is_null() {
        drop(CString::from_raw(error.message));
        error.message = ptr::null_mut();
    }
    error.code = NanoboxErrorCode::Ok;
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
