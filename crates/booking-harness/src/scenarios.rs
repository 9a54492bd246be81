//! The scenarios, in the order a full run executes them.
//!
//! Each scenario owns its processes and sockets and releases them on every
//! exit path before returning.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};

use booking_wire::query_request;

use crate::client::ClientInvocation;
use crate::error::{HarnessError, Result};
use crate::mock_client::IdleConnection;
use crate::mock_server::{HoldOutcome, MockServer};
use crate::orchestrator::HarnessContext;
use crate::phase::{PeerPhase, PhaseTracker};
use crate::verdict::{ScenarioOutcome, Verdict};

pub type ScenarioFuture = Pin<Box<dyn Future<Output = ScenarioOutcome> + Send>>;

pub type ScenarioFn = fn(Arc<HarnessContext>) -> ScenarioFuture;

/// A named, self-contained unit of setup, action, assertion and teardown.
pub struct Scenario {
    pub name: &'static str,
    pub objective: &'static str,
    pub func: ScenarioFn,
}

static SCENARIOS: [Scenario; 3] = [
    Scenario {
        name: "functional",
        objective: "Smoke-test the real server and client: query, book, a booking contest and a query stress pass",
        func: functional_boxed,
    },
    Scenario {
        name: "client-timeout",
        objective: "Accept the client's connection and never answer; the client must give up and exit non-zero",
        func: client_timeout_boxed,
    },
    Scenario {
        name: "server-timeout",
        objective: "Hold an idle connection past the server's idle threshold; the server must have evicted it",
        func: server_timeout_boxed,
    },
];

/// Every scenario, in execution order.
pub fn all() -> &'static [Scenario] {
    &SCENARIOS
}

pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

fn functional_boxed(ctx: Arc<HarnessContext>) -> ScenarioFuture {
    Box::pin(functional(ctx))
}

fn client_timeout_boxed(ctx: Arc<HarnessContext>) -> ScenarioFuture {
    Box::pin(client_timeout(ctx))
}

fn server_timeout_boxed(ctx: Arc<HarnessContext>) -> ScenarioFuture {
    Box::pin(server_timeout(ctx))
}

// =============================================================================
// Functional smoke test
// =============================================================================

async fn functional(ctx: Arc<HarnessContext>) -> ScenarioOutcome {
    let mut server = match ctx.start_server().await {
        Ok(server) => server,
        Err(e) => return ScenarioOutcome::from_error(&e),
    };

    let config = &ctx.config;
    let steps = [
        ("single query", ClientInvocation::query(1), false),
        ("single booking", ClientInvocation::book(1, 1), false),
        (
            "booking contest",
            ClientInvocation::book(config.contest_threads, 1),
            true,
        ),
        ("query stress", ClientInvocation::query(config.stress_threads), false),
    ];

    let mut outcome = ScenarioOutcome::pass();
    for (label, invocation, is_contest) in &steps {
        match ctx.clients.run(invocation).await {
            Ok(result) => {
                info!("{} ok ({:.2}s)", label, result.duration.as_secs_f64());
                if *is_contest {
                    let tally = result.booking_tally();
                    outcome.note(format!("{}: {}", label, tally));
                    if let Some(capacity) = config.seat_capacity
                        && tally.successes > capacity
                    {
                        outcome.record(
                            Verdict::Failed,
                            format!(
                                "{}: {} bookings succeeded but only {} seats exist",
                                label, tally.successes, capacity
                            ),
                        );
                    }
                }
            }
            Err(e) => {
                let aborted = e.verdict() == Verdict::Aborted;
                outcome.record_error(label, &e);
                if aborted {
                    break;
                }
            }
        }
    }

    if let Err(e) = server.stop().await {
        outcome.record_error("stopping server", &e);
    }
    outcome
}

// =============================================================================
// Client-side timeout
// =============================================================================

async fn client_timeout(ctx: Arc<HarnessContext>) -> ScenarioOutcome {
    let mut phases = PhaseTracker::new("client-timeout");
    let result = stall_client(&ctx, &mut phases).await;
    let last = phases.tear_down();
    settle(result, last)
}

async fn stall_client(ctx: &HarnessContext, phases: &mut PhaseTracker) -> Result<ScenarioOutcome> {
    let timings = &ctx.config.timings;

    // The listener must be up before the client is launched.
    let server = MockServer::listen(ctx.config.mock_listen_addr())?;
    phases.advance(PeerPhase::Listening);

    let invocation = ClientInvocation::query(1).expecting_failure();
    let mut client = ctx.clients.spawn(&invocation)?;

    let mut peer = match server.accept_within(timings.accept_timeout).await {
        Ok(peer) => peer,
        Err(e) => {
            if let Err(kill) = client.kill().await {
                warn!("failed to kill client: {}", kill);
            }
            return Err(e);
        }
    };
    phases.advance(PeerPhase::Peered);

    phases.advance(PeerPhase::AdversarialWait);
    info!(
        "Holding {} silent for {:.1}s...",
        peer.peer_addr(),
        timings.client_stall.as_secs_f64()
    );
    if let HoldOutcome::ClientClosed(after) = peer.hold_silent(timings.client_stall).await {
        info!("client hung up after {:.2}s", after.as_secs_f64());
    }

    phases.advance(PeerPhase::Probe);
    peer.close();
    drop(server);

    let result = client.wait_within(timings.client_reap_timeout).await?;
    result.check(&invocation)?;

    let mut outcome = ScenarioOutcome::pass();
    outcome.note(format!(
        "client gave up with {} after {:.2}s",
        result.describe_exit(),
        result.duration.as_secs_f64()
    ));
    Ok(outcome)
}

// =============================================================================
// Server-side timeout
// =============================================================================

async fn server_timeout(ctx: Arc<HarnessContext>) -> ScenarioOutcome {
    let mut server = match ctx.start_server().await {
        Ok(server) => server,
        Err(e) => return ScenarioOutcome::from_error(&e),
    };

    let mut phases = PhaseTracker::new("server-timeout");
    let result = probe_idle_connection(&ctx, &mut phases).await;
    let last = phases.tear_down();
    let mut outcome = settle(result, last);

    if let Err(e) = server.stop().await {
        outcome.record_error("stopping server", &e);
    }
    outcome
}

async fn probe_idle_connection(
    ctx: &HarnessContext,
    phases: &mut PhaseTracker,
) -> Result<ScenarioOutcome> {
    let timings = &ctx.config.timings;

    phases.advance(PeerPhase::Connecting);
    let conn = IdleConnection::connect(ctx.config.server_addr(), timings.connect_timeout).await?;
    phases.advance(PeerPhase::Peered);

    phases.advance(PeerPhase::AdversarialWait);
    conn.idle(timings.server_idle_hold).await;

    phases.advance(PeerPhase::Probe);
    let probe = conn
        .probe(&query_request(0), timings.probe_read_timeout)
        .await;
    info!("probe: {}", probe.describe());

    let mut outcome = ScenarioOutcome::pass();
    outcome.record(probe.verdict(), probe.describe());
    Ok(outcome)
}

/// Turn a mock-peer result into an outcome, naming the phase an error
/// happened in.
fn settle(result: Result<ScenarioOutcome>, phase: PeerPhase) -> ScenarioOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => fail_in_phase(&e, phase),
    }
}

fn fail_in_phase(err: &HarnessError, phase: PeerPhase) -> ScenarioOutcome {
    let mut outcome = ScenarioOutcome::pass();
    outcome.record(err.verdict(), format!("{} (during {})", err, phase));
    outcome
}
