//! Runs the client binary under an external watchdog.
//!
//! The watchdog is independent of whatever request timeout the client
//! enforces internally: if the client fails to give up on its own, the
//! harness kills it and reports a hang instead of waiting forever.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binary;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Number of stdout lines surfaced after a run.
pub const PREVIEW_LINES: usize = 5;

/// How long to wait for the output readers once the client has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// One invocation of the client: `<client> <threads> <action> [args...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInvocation {
    thread_count: u32,
    action: String,
    args: Vec<String>,
    expect_failure: bool,
}

impl ClientInvocation {
    pub fn new(thread_count: u32, action: impl Into<String>) -> Self {
        Self {
            thread_count,
            action: action.into(),
            args: Vec::new(),
            expect_failure: false,
        }
    }

    pub fn query(thread_count: u32) -> Self {
        Self::new(thread_count, "query")
    }

    pub fn book(thread_count: u32, seats: u32) -> Self {
        Self::new(thread_count, "book").arg(seats.to_string())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The client is expected to detect an adverse condition and exit
    /// non-zero.
    pub fn expecting_failure(mut self) -> Self {
        self.expect_failure = true;
        self
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn expects_failure(&self) -> bool {
        self.expect_failure
    }

    /// Arguments passed after the program name.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(2 + self.args.len());
        argv.push(self.thread_count.to_string());
        argv.push(self.action.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for ClientInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

/// What a finished client run produced.
#[derive(Debug, Clone)]
pub struct ClientResult {
    /// `None` when the client was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub stdout_lines: Vec<String>,
    pub stderr: String,
}

impl ClientResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn describe_exit(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// The first `limit` stdout lines, plus a trailer counting the rest.
    pub fn preview(&self, limit: usize) -> Vec<String> {
        let mut lines: Vec<String> = self.stdout_lines.iter().take(limit).cloned().collect();
        let hidden = self.stdout_lines.len().saturating_sub(limit);
        if hidden > 0 {
            lines.push(format!("... ({} more lines)", hidden));
        }
        lines
    }

    /// Count booking outcomes reported on stdout.
    pub fn booking_tally(&self) -> BookingTally {
        let mut tally = BookingTally::default();
        for line in &self.stdout_lines {
            let line = line.trim();
            if line == "Status: SUCCESS" {
                tally.successes += 1;
            } else if line == "Status: FAIL" {
                tally.failures += 1;
            } else if let Some(rest) = line.strip_prefix("Remaining Tickets:")
                && let Ok(remaining) = rest.trim().parse::<u32>()
            {
                tally.lowest_remaining = Some(match tally.lowest_remaining {
                    Some(lowest) => lowest.min(remaining),
                    None => remaining,
                });
            }
        }
        tally
    }

    /// Compare the exit code against what the invocation expected.
    pub fn check(&self, invocation: &ClientInvocation) -> Result<()> {
        if invocation.expects_failure() {
            if self.succeeded() {
                return Err(HarnessError::assertion(format!(
                    "client `{}` exited 0 but was expected to fail",
                    invocation
                )));
            }
        } else if !self.succeeded() {
            let mut msg = format!("client `{}` failed with {}", invocation, self.describe_exit());
            if !self.stderr.is_empty() {
                msg.push_str(&format!("; stderr: {}", self.stderr));
            }
            return Err(HarnessError::assertion(msg));
        }
        Ok(())
    }
}

/// Booking outcomes counted from client output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingTally {
    pub successes: u32,
    pub failures: u32,
    pub lowest_remaining: Option<u32>,
}

impl fmt::Display for BookingTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.successes, self.failures)?;
        if let Some(remaining) = self.lowest_remaining {
            write!(f, ", {} remaining", remaining)?;
        }
        Ok(())
    }
}

/// Launches the client binary.
#[derive(Debug, Clone)]
pub struct ClientRunner {
    program: PathBuf,
    watchdog: Duration,
    env: Vec<(String, String)>,
}

impl ClientRunner {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            program: config.client_bin.clone(),
            watchdog: config.timings.client_watchdog,
            env: config.child_env.clone(),
        }
    }

    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Run the client to completion and check its exit code.
    pub async fn run(&self, invocation: &ClientInvocation) -> Result<ClientResult> {
        let result = self.execute(invocation).await?;
        report(invocation, &result);
        result.check(invocation)?;
        Ok(result)
    }

    /// Run the client to completion under the watchdog without judging the
    /// exit code.
    pub async fn execute(&self, invocation: &ClientInvocation) -> Result<ClientResult> {
        self.spawn(invocation)?.wait_within(self.watchdog).await
    }

    /// Launch the client without waiting for it.
    pub fn spawn(&self, invocation: &ClientInvocation) -> Result<RunningClient> {
        let program = binary::resolve(&self.program)?;

        let mut cmd = Command::new(&program);
        cmd.args(invocation.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

        info!("Running client: {} {}", program.display(), invocation);

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(collect_lines(out, "stdout")));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(collect_lines(err, "stderr")));

        Ok(RunningClient {
            child,
            invocation: invocation.clone(),
            started: Instant::now(),
            stdout,
            stderr,
        })
    }
}

/// A client launched with [`ClientRunner::spawn`].
///
/// Dropping it kills the process.
#[derive(Debug)]
pub struct RunningClient {
    child: Child,
    invocation: ClientInvocation,
    started: Instant,
    stdout: Option<JoinHandle<Vec<String>>>,
    stderr: Option<JoinHandle<Vec<String>>>,
}

impl RunningClient {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn invocation(&self) -> &ClientInvocation {
        &self.invocation
    }

    /// Wait for the client to exit; past `ceiling` it is killed and reaped
    /// and a [`HarnessError::WatchdogTimeout`] is returned.
    pub async fn wait_within(mut self, ceiling: Duration) -> Result<ClientResult> {
        let status = match tokio::time::timeout(ceiling, self.child.wait()).await {
            Ok(status) => status.map_err(|e| HarnessError::io("waiting for client", e))?,
            Err(_) => {
                warn!(
                    "client `{}` still running after {:?}; killing",
                    self.invocation, ceiling
                );
                self.kill().await?;
                return Err(HarnessError::WatchdogTimeout {
                    what: format!("client `{}`", self.invocation),
                    after: ceiling,
                });
            }
        };

        let duration = self.started.elapsed();
        let stdout_lines = join_lines(self.stdout.take()).await;
        let stderr = join_lines(self.stderr.take()).await.join("\n");

        debug!(
            "client `{}` exited after {:.2}s ({})",
            self.invocation,
            duration.as_secs_f64(),
            status
        );

        Ok(ClientResult {
            exit_code: status.code(),
            duration,
            stdout_lines,
            stderr,
        })
    }

    /// Kill the client and wait until it has been reaped.
    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| HarnessError::io("killing client", e))?;
        join_lines(self.stdout.take()).await;
        join_lines(self.stderr.take()).await;
        Ok(())
    }
}

/// Log a bounded preview of the client's output.
fn report(invocation: &ClientInvocation, result: &ClientResult) {
    info!(
        "client `{}` finished in {:.2}s with {}",
        invocation,
        result.duration.as_secs_f64(),
        result.describe_exit()
    );
    for line in result.preview(PREVIEW_LINES) {
        info!("  | {}", line);
    }
    if !result.succeeded() && !result.stderr.is_empty() {
        warn!("client stderr:\n{}", result.stderr);
    }
}

/// Read the pipe to end-of-stream. Invalid UTF-8 is replaced rather than
/// ending the read, so the client never sees a closed pipe.
async fn collect_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                debug!("[client {}] {}", stream, line);
                collected.push(line);
            }
            Err(e) => {
                warn!("reading client {} failed: {}", stream, e);
                break;
            }
        }
    }
    collected
}

async fn join_lines(handle: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(lines)) => lines,
        Ok(Err(e)) => {
            warn!("client output reader failed: {}", e);
            Vec::new()
        }
        Err(_) => {
            // A grandchild may still hold the pipe open.
            handle.abort();
            Vec::new()
        }
    }
}
