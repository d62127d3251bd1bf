//! Host platform utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable pointing at the root of the arm software checkout.
///
/// The `params` and `sessions` directories are resolved relative to this
/// root so that executables can be run from any working directory.
pub const SW_ROOT_ENV_VAR: &str = "ARM_SW_ROOT";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable (ARM_SW_ROOT) is not set")]
    SwRootNotSet,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the arm software.
///
/// Reads the `ARM_SW_ROOT` environment variable, falling back to the current
/// working directory if it is unset but the directory looks like a checkout
/// (contains a `params` dir). Otherwise an error is returned.
pub fn get_arm_sw_root() -> Result<PathBuf, HostError> {
    if let Some(root) = std::env::var_os(SW_ROOT_ENV_VAR) {
        return Ok(PathBuf::from(root));
    }

    // Fallback for running from the checkout itself
    let cwd = std::env::current_dir().map_err(|_| HostError::SwRootNotSet)?;
    if cwd.join("params").is_dir() {
        Ok(cwd)
    } else {
        Err(HostError::SwRootNotSet)
    }
}
