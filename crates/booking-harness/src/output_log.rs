//! Append-only sink for server output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{HarnessError, Result};

/// The shared server output log.
///
/// Truncated once at the start of a full run, then only ever appended to.
#[derive(Debug, Clone)]
pub struct OutputLog {
    path: PathBuf,
}

impl OutputLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recreate the log as an empty file.
    pub fn reset(&self) -> Result<()> {
        File::create(&self.path)
            .map(drop)
            .map_err(|e| HarnessError::io(format!("truncating {}", self.path.display()), e))
    }

    pub fn open_append(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarnessError::io(format!("opening {}", self.path.display()), e))
    }

    /// Stdout and stderr handles that both append to the log.
    pub fn stdio_pair(&self) -> Result<(Stdio, Stdio)> {
        let stdout = self.open_append()?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| HarnessError::io(format!("duplicating {}", self.path.display()), e))?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// Append a separator line so each scenario's output can be told apart.
    pub fn mark(&self, label: &str) -> Result<()> {
        let mut file = self.open_append()?;
        writeln!(file, "===== {} =====", label)
            .map_err(|e| HarnessError::io(format!("writing {}", self.path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let log = OutputLog::new(dir.path().join("server_output.log"));
        std::fs::write(log.path(), b"stale output\n").unwrap();

        log.reset().unwrap();
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
    }

    #[test]
    fn test_marks_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = OutputLog::new(dir.path().join("server_output.log"));

        log.mark("functional").unwrap();
        log.mark("server-timeout").unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            contents,
            "===== functional =====\n===== server-timeout =====\n"
        );
    }
}
