//! Locating the binaries under test.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Suffix tried when the bare path does not exist.
pub const EXE_SUFFIX: &str = ".exe";

/// Resolve `path` to an existing file, trying the bare name first and then
/// the name with [`EXE_SUFFIX`] appended.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    let candidates = candidates(path);
    if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(found.clone());
    }

    Err(HarnessError::BinaryNotFound {
        name: path.display().to_string(),
        searched: candidates,
    })
}

fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut suffixed = OsString::from(path.as_os_str());
    suffixed.push(EXE_SUFFIX);
    vec![path.to_path_buf(), PathBuf::from(suffixed)]
}
