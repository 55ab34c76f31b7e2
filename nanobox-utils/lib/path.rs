//! Well-known sub-directory and file names of the nanobox home layout.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Sub-directory of the nanobox home where prepared rootfs images live
pub const IMAGES_SUBDIR: &str = "images";

/// Sub-directory of the nanobox home where per-box working state lives
pub const BOXES_SUBDIR: &str = "boxes";

/// Sub-directory of the nanobox home where runtime logs are written
pub const LOG_SUBDIR: &str = "log";

/// Filename of the runtime log file
pub const LOG_FILENAME: &str = "nanobox.log";
