//! Shared default values for the nanobox runtime.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default number of virtual CPUs assigned to a box when none is requested.
pub const DEFAULT_CPUS: u32 = 2;

/// Default memory limit in MiB assigned to a box when none is requested.
pub const DEFAULT_MEMORY_MIB: u32 = 512;

/// Default number of seconds to wait for a box to stop gracefully before
/// it is forcefully terminated.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
