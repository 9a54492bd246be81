//! Runs scenarios in order, isolating each from the others.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::client::ClientRunner;
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::output_log::OutputLog;
use crate::process::{ManagedProcess, ProcessController};
use crate::scenarios::Scenario;
use crate::verdict::{RunSummary, ScenarioOutcome, ScenarioReport, Verdict};

/// Shared state handed to every scenario.
#[derive(Debug)]
pub struct HarnessContext {
    pub config: HarnessConfig,
    pub processes: ProcessController,
    pub clients: ClientRunner,
    pub output: OutputLog,
}

impl HarnessContext {
    pub fn new(config: HarnessConfig) -> Self {
        let output = OutputLog::new(config.output_log.clone());
        Self {
            processes: ProcessController::new(output.clone(), &config.timings),
            clients: ClientRunner::new(&config),
            output,
            config,
        }
    }

    /// Start the server under test with the configured environment.
    pub async fn start_server(&self) -> Result<ManagedProcess> {
        self.processes
            .start(&self.config.server_bin, &self.config.child_env)
            .await
    }
}

pub struct Orchestrator {
    ctx: Arc<HarnessContext>,
}

impl Orchestrator {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(HarnessContext::new(config)),
        })
    }

    pub fn context(&self) -> &HarnessContext {
        &self.ctx
    }

    /// Run `scenarios` in order.
    ///
    /// The output log is truncated first. `observe` is called with each
    /// report as soon as its scenario finishes. Only a failure to reset the
    /// log ends the run early; scenario failures never do.
    pub async fn run(
        &self,
        scenarios: &[&'static Scenario],
        mut observe: impl FnMut(&ScenarioReport),
    ) -> Result<RunSummary> {
        self.ctx.output.reset()?;

        let mut summary = RunSummary::default();
        for scenario in scenarios {
            let report = self.run_one(scenario).await;
            observe(&report);
            summary.reports.push(report);
        }

        info!("{}", summary.tally());
        Ok(summary)
    }

    /// Run a single scenario as its own task, so a panic inside it is
    /// reported as a failure instead of ending the run.
    pub async fn run_one(&self, scenario: &'static Scenario) -> ScenarioReport {
        info!("=== {} ===", scenario.name);
        info!("{}", scenario.objective);

        if let Err(e) = self.ctx.output.mark(scenario.name) {
            warn!("could not mark output log: {}", e);
        }

        let started = Instant::now();
        let outcome = match tokio::spawn((scenario.func)(self.ctx.clone())).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                ScenarioOutcome::fail(format!("scenario panicked: {}", panic_message(e.into_panic())))
            }
            Err(e) => ScenarioOutcome::fail(format!("scenario task failed: {}", e)),
        };
        let report = ScenarioReport::new(scenario.name, outcome, started.elapsed());

        match report.verdict {
            Verdict::Passed => info!("{} passed", scenario.name),
            verdict => error!("{} {}: {}", scenario.name, verdict, report.notes.join("; ")),
        }
        report
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::scenarios::ScenarioFuture;

    fn panicking(_ctx: Arc<HarnessContext>) -> ScenarioFuture {
        Box::pin(async { panic!("boom") })
    }

    fn passing(ctx: Arc<HarnessContext>) -> ScenarioFuture {
        Box::pin(async move {
            let mut outcome = ScenarioOutcome::pass();
            outcome.note(format!("port {}", ctx.config.port));
            outcome
        })
    }

    static PANICS: Scenario = Scenario {
        name: "panics",
        objective: "Panic inside the scenario",
        func: panicking,
    };

    static PASSES: Scenario = Scenario {
        name: "passes",
        objective: "Pass without doing anything",
        func: passing,
    };

    fn orchestrator(dir: &Path) -> Orchestrator {
        let config = HarnessConfig {
            output_log: dir.join("server_output.log"),
            port: 18080,
            ..HarnessConfig::default()
        };
        Orchestrator::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let mut seen = Vec::new();
        let summary = orchestrator
            .run(&[&PANICS, &PASSES], |report| seen.push(report.name))
            .await
            .unwrap();

        assert_eq!(seen, vec!["panics", "passes"]);
        let panicked = summary.get("panics").unwrap();
        assert_eq!(panicked.verdict, Verdict::Failed);
        assert!(panicked.notes[0].contains("boom"));
        assert_eq!(summary.get("passes").unwrap().notes, vec!["port 18080"]);
        assert!(!summary.all_passed());
    }

    #[tokio::test]
    async fn test_run_resets_and_marks_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server_output.log");
        std::fs::write(&log, "previous run\n").unwrap();

        let orchestrator = orchestrator(dir.path());
        let summary = orchestrator.run(&[&PASSES], |_| {}).await.unwrap();
        assert!(summary.all_passed());

        let contents = std::fs::read_to_string(&log).unwrap();
        assert_eq!(contents, "===== passes =====\n");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = HarnessConfig::default();
        config.timings.client_stall = config.timings.expected_client_timeout;
        assert!(Orchestrator::new(config).is_err());
    }
}
