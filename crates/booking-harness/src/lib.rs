//! End-to-end timeout harness for the ticket-booking server and client.
//!
//! The harness treats both binaries as black boxes. It starts the real
//! server, runs the real client under a watchdog, and stands in for either
//! side with a raw socket to provoke and observe timeout handling:
//!
//! - **functional**: query, book, a concurrent booking contest and a query
//!   stress pass against the real server.
//! - **client-timeout**: a mock server accepts the client's connection and
//!   never answers; the client must exit non-zero on its own.
//! - **server-timeout**: a mock client connects to the real server and goes
//!   quiet past the idle threshold; the server must have dropped it.
//!
//! Scenarios run one at a time, each releasing its processes and sockets
//! before the next starts, and a failing scenario never stops the run.
//!
//! ```no_run
//! use booking_harness::{HarnessConfig, Orchestrator, scenarios};
//!
//! # async fn demo() -> booking_harness::Result<()> {
//! let orchestrator = Orchestrator::new(HarnessConfig::default())?;
//! let selected: Vec<_> = scenarios::all().iter().collect();
//! let summary = orchestrator.run(&selected, |report| println!("{}", report.render())).await?;
//! assert!(summary.all_passed());
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock_client;
pub mod mock_server;
pub mod orchestrator;
pub mod output_log;
pub mod phase;
pub mod process;
pub mod scenarios;
pub mod verdict;

pub use client::{ClientInvocation, ClientResult, ClientRunner};
pub use config::{HarnessConfig, Timings};
pub use error::{HarnessError, Result};
pub use orchestrator::{HarnessContext, Orchestrator};
pub use process::{ManagedProcess, ProcessController};
pub use verdict::{RunSummary, ScenarioReport, Verdict};
