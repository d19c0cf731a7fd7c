//! Generic parameters functions
//!
//! Parameter files are JSON documents. Modules declare a parameter struct
//! deserialised from a section of the document, with serde defaults covering
//! any keys the file omits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot determine the software root directory: {0}")]
    SwRootNotFound(std::io::Error),

    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(serde_json::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file.
///
/// The file path is resolved relative to the software root directory unless
/// it is absolute.
pub fn load<P>(param_file_path: &Path) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    // Resolve the path against the software root
    let path = if param_file_path.is_absolute() {
        param_file_path.to_path_buf()
    } else {
        let mut p = crate::host::get_melon_sw_root().map_err(LoadError::SwRootNotFound)?;
        p.push(param_file_path);
        p
    };

    // Load the file into a string
    let params_str = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(e)),
    };

    // Parse the string into the parameter struct
    match serde_json::from_str(params_str.as_str()) {
        Ok(p) => Ok(p),
        Err(e) => Err(LoadError::DeserialiseError(e)),
    }
}

/// Load a parameter file, falling back to the default parameters if the file
/// is missing or malformed.
///
/// A warning is issued on fallback, the load never fails. Use this for
/// parameters where a bad config file should degrade, not abort.
pub fn load_or_default<P>(param_file_path: &Path) -> P
where
    P: DeserializeOwned + Default,
{
    match load(param_file_path) {
        Ok(p) => p,
        Err(e) => {
            warn!(
                "Could not load parameter file {:?} ({}), using defaults",
                param_file_path, e
            );
            P::default()
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Default)]
    struct TestParams {
        #[serde(default)]
        answer: i64,
    }

    #[test]
    fn test_load_or_default_missing_file() {
        // A missing file must fall back to defaults rather than error
        let p: TestParams = load_or_default(Path::new("definitely/not/here.json"));
        assert_eq!(p.answer, 0);
    }
}
