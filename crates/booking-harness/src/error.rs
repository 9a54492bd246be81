//! Harness error taxonomy.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use crate::verdict::Verdict;

/// Errors raised while driving the binaries under test.
///
/// Each variant maps onto the verdict a scenario reports when it hits it,
/// see [`HarnessError::verdict`].
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A required binary is absent under both its bare and suffixed name.
    #[error("binary not found: {name} (searched {searched:?})")]
    BinaryNotFound { name: String, searched: Vec<PathBuf> },

    /// The process exited before its startup grace period elapsed.
    #[error("{program} exited during its startup grace period ({status})")]
    StartupFailure { program: String, status: ExitStatus },

    /// The operating system refused to launch the process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Observed behavior contradicts the expected outcome.
    #[error("assertion failed: {0}")]
    AssertionFailure(String),

    /// An external process outlived its ceiling and was killed.
    #[error("{what} did not finish within {after:?} and was killed")]
    WatchdogTimeout { what: String, after: Duration },

    /// Something outside the anticipated set of outcomes happened.
    #[error("unexpected condition: {0}")]
    UnexpectedCondition(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HarnessError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::AssertionFailure(msg.into())
    }

    /// The verdict a scenario reports when this error ends it.
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::BinaryNotFound { .. }
            | Self::StartupFailure { .. }
            | Self::Spawn { .. }
            | Self::Io { .. }
            | Self::Config(_) => Verdict::Aborted,
            Self::AssertionFailure(_) => Verdict::Failed,
            Self::WatchdogTimeout { .. } => Verdict::Hung,
            Self::UnexpectedCondition(_) => Verdict::Indeterminate,
        }
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_mapping() {
        let missing = HarnessError::BinaryNotFound {
            name: "bin/server".into(),
            searched: vec![],
        };
        assert_eq!(missing.verdict(), Verdict::Aborted);
        assert_eq!(HarnessError::assertion("x").verdict(), Verdict::Failed);
        assert_eq!(
            HarnessError::WatchdogTimeout {
                what: "client".into(),
                after: Duration::from_secs(15),
            }
            .verdict(),
            Verdict::Hung
        );
        assert_eq!(
            HarnessError::UnexpectedCondition("x".into()).verdict(),
            Verdict::Indeterminate
        );
    }

    #[test]
    fn test_watchdog_message_names_process() {
        let err = HarnessError::WatchdogTimeout {
            what: "client `1 query`".into(),
            after: Duration::from_secs(2),
        };
        assert_eq!(
            err.to_string(),
            "client `1 query` did not finish within 2s and was killed"
        );
    }
}
