//! Process controller for the server under test.
//!
//! Starting a process blocks for a fixed grace period instead of probing for
//! readiness. A process that exits inside that window is a startup failure.
//! Stopping asks for a graceful exit, escalates to a kill after a bounded
//! wait, and always reaps the child before returning.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::binary;
use crate::config::Timings;
use crate::error::{HarnessError, Result};
use crate::output_log::OutputLog;

/// Launches and tears down long-running processes.
#[derive(Debug, Clone)]
pub struct ProcessController {
    output: OutputLog,
    startup_grace: Duration,
    stop_timeout: Duration,
}

impl ProcessController {
    pub fn new(output: OutputLog, timings: &Timings) -> Self {
        Self {
            output,
            startup_grace: timings.startup_grace,
            stop_timeout: timings.stop_timeout,
        }
    }

    /// Start `executable` with the given environment overrides.
    pub async fn start(
        &self,
        executable: &Path,
        env: &[(String, String)],
    ) -> Result<ManagedProcess> {
        self.start_with_args(executable, &[] as &[&str], env).await
    }

    /// Start `executable` with arguments and environment overrides.
    ///
    /// Returns once the grace period has elapsed with the process still
    /// running.
    pub async fn start_with_args<S: AsRef<std::ffi::OsStr>>(
        &self,
        executable: &Path,
        args: &[S],
        env: &[(String, String)],
    ) -> Result<ManagedProcess> {
        let program = binary::resolve(executable)?;
        let (stdout, stderr) = self.output.stdio_pair()?;

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        let pid = child.id();

        info!(
            "Starting {} (pid {:?}, env overrides: {})...",
            program.display(),
            pid,
            env.len()
        );

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    HarnessError::io(format!("waiting for {}", program.display()), e)
                })?;
                return Err(HarnessError::StartupFailure {
                    program: program.display().to_string(),
                    status,
                });
            }
            _ = tokio::time::sleep(self.startup_grace) => {}
        }

        debug!(
            "{} survived its {:?} grace period",
            program.display(),
            self.startup_grace
        );

        Ok(ManagedProcess {
            child: Some(child),
            pid,
            program,
            args: args.iter().map(|a| a.as_ref().to_os_string()).collect(),
            started: Instant::now(),
            stop_timeout: self.stop_timeout,
        })
    }
}

/// A running process owned by exactly one scenario.
///
/// Dropping it without calling [`ManagedProcess::stop`] still kills the
/// child; the runtime reaps it in the background.
#[derive(Debug)]
pub struct ManagedProcess {
    child: Option<Child>,
    pid: Option<u32>,
    program: PathBuf,
    args: Vec<OsString>,
    started: Instant,
    stop_timeout: Duration,
}

impl ManagedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Time since the grace period ended.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_stopped(&self) -> bool {
        self.child.is_none()
    }

    /// Stop the process.
    ///
    /// Returns the exit status, or `None` if it was already stopped.
    pub async fn stop(&mut self) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        let name = self.program.display().to_string();

        info!("Stopping {}...", name);

        let already = child
            .try_wait()
            .map_err(|e| HarnessError::io(format!("polling {}", name), e))?;
        if let Some(status) = already {
            warn!("{} had already exited ({})", name, status);
            return Ok(Some(status));
        }

        if let Err(e) = request_termination(&mut child) {
            warn!("failed to request termination of {}: {}", name, e);
        }

        let status = match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| HarnessError::io(format!("waiting for {}", name), e))?,
            Err(_) => {
                warn!(
                    "{} ignored termination for {:?}; killing",
                    name, self.stop_timeout
                );
                child
                    .kill()
                    .await
                    .map_err(|e| HarnessError::io(format!("killing {}", name), e))?;
                child
                    .wait()
                    .await
                    .map_err(|e| HarnessError::io(format!("reaping {}", name), e))?
            }
        };

        info!("{} stopped ({}).", name, status);
        Ok(Some(status))
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            warn!(
                "{} dropped while running; killing",
                self.program.display()
            );
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: `pid` is our own child and has not been reaped yet, so it
    // cannot have been recycled.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    const SH: &str = "/bin/sh";

    fn controller(dir: &Path, grace: Duration, stop: Duration) -> ProcessController {
        let mut timings = Timings::from_unit(Duration::from_millis(10));
        timings.startup_grace = grace;
        timings.stop_timeout = stop;
        ProcessController::new(OutputLog::new(dir.join("server_output.log")), &timings)
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let pc = controller(dir.path(), Duration::from_millis(50), Duration::from_secs(5));

        let mut proc = pc
            .start_with_args(Path::new(SH), &["-c", "echo ready; exec sleep 30"], &[])
            .await
            .unwrap();
        assert!(proc.pid().is_some());
        assert!(!proc.is_stopped());

        let status = proc.stop().await.unwrap().expect("first stop reports status");
        assert_eq!(status.signal(), Some(libc::SIGTERM));
        assert!(proc.is_stopped());

        let log = std::fs::read_to_string(dir.path().join("server_output.log")).unwrap();
        assert!(log.contains("ready"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pc = controller(dir.path(), Duration::from_millis(20), Duration::from_secs(5));

        let mut proc = pc
            .start_with_args(Path::new(SH), &["-c", "exec sleep 30"], &[])
            .await
            .unwrap();
        proc.stop().await.unwrap();

        let started = Instant::now();
        assert!(proc.stop().await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_exit_during_grace_is_startup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pc = controller(dir.path(), Duration::from_secs(5), Duration::from_secs(5));

        let started = Instant::now();
        let err = pc
            .start_with_args(Path::new(SH), &["-c", "exit 3"], &[])
            .await
            .unwrap_err();

        match err {
            HarnessError::StartupFailure { status, .. } => assert_eq!(status.code(), Some(3)),
            other => panic!("expected StartupFailure, got {other:?}"),
        }
        // Failure is reported as soon as the process dies, not after the grace period.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stop_kills_process_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let pc = controller(
            dir.path(),
            Duration::from_millis(100),
            Duration::from_millis(200),
        );

        let mut proc = pc
            .start_with_args(
                Path::new(SH),
                &["-c", "trap '' TERM; while :; do sleep 0.05; done"],
                &[],
            )
            .await
            .unwrap();

        let started = Instant::now();
        let status = proc.stop().await.unwrap().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_env_overrides_reach_child() {
        let dir = tempfile::tempdir().unwrap();
        let pc = controller(dir.path(), Duration::from_millis(100), Duration::from_secs(5));

        let env = vec![("BOOKING_MARKER".to_string(), "present".to_string())];
        let mut proc = pc
            .start_with_args(
                Path::new(SH),
                &["-c", "echo marker=$BOOKING_MARKER; exec sleep 30"],
                &env,
            )
            .await
            .unwrap();
        proc.stop().await.unwrap();

        let log = std::fs::read_to_string(dir.path().join("server_output.log")).unwrap();
        assert!(log.contains("marker=present"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let pc = controller(dir.path(), Duration::from_millis(10), Duration::from_secs(1));

        let err = pc
            .start(&dir.path().join("bin").join("server"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::BinaryNotFound { .. }));
    }
}
