//! Host platform utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::env;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the rover software.
///
/// If the `MELON_SW_ROOT` environment variable is set it is used, otherwise
/// the current working directory is taken as the root. Sessions and
/// configuration files are resolved relative to this directory.
pub fn get_melon_sw_root() -> std::io::Result<PathBuf> {
    match env::var("MELON_SW_ROOT") {
        Ok(p) => Ok(PathBuf::from(p)),
        Err(_) => env::current_dir(),
    }
}
