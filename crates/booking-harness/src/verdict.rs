//! Scenario verdicts and run reporting.

use std::fmt;
use std::time::Duration;

use facet::Facet;
use owo_colors::OwoColorize;

use crate::error::HarnessError;

/// Outcome class of a scenario, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    /// Observed behavior matched the expectation.
    Passed,
    /// Something outside the anticipated outcomes happened; neither a pass
    /// nor a confirmed failure.
    Indeterminate,
    /// Observed behavior contradicted the expectation.
    Failed,
    /// A dependency had to be killed because it outlived its ceiling.
    Hung,
    /// A dependency could not be started at all.
    Aborted,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Indeterminate => "indeterminate",
            Self::Failed => "failed",
            Self::Hung => "hung",
            Self::Aborted => "aborted",
        }
    }

    fn tag(self) -> String {
        match self {
            Self::Passed => format!("{}", "[PASS]".green()),
            Self::Indeterminate => format!("{}", "[????]".yellow()),
            Self::Failed => format!("{}", "[FAIL]".red()),
            Self::Hung => format!("{}", "[HUNG]".magenta()),
            Self::Aborted => format!("{}", "[ABRT]".red()),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a scenario observed.
///
/// A scenario with several checks records each one; the overall verdict is
/// the worst of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub verdict: Verdict,
    pub notes: Vec<String>,
}

impl ScenarioOutcome {
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Passed,
            notes: Vec::new(),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Failed,
            notes: vec![msg.into()],
        }
    }

    pub fn from_error(err: &HarnessError) -> Self {
        Self {
            verdict: err.verdict(),
            notes: vec![err.to_string()],
        }
    }

    /// Record a check, escalating the verdict if it is worse.
    pub fn record(&mut self, verdict: Verdict, note: impl Into<String>) {
        self.verdict = self.verdict.max(verdict);
        self.notes.push(note.into());
    }

    /// Record an error raised by the step named `step`.
    pub fn record_error(&mut self, step: &str, err: &HarnessError) {
        self.record(err.verdict(), format!("{}: {}", step, err));
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Result of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub verdict: Verdict,
    pub notes: Vec<String>,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn new(name: &'static str, outcome: ScenarioOutcome, elapsed: Duration) -> Self {
        Self {
            name,
            verdict: outcome.verdict,
            notes: outcome.notes,
            elapsed,
        }
    }

    /// Human-readable result lines.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} {} ({:.2}s)",
            self.verdict.tag(),
            self.name,
            self.elapsed.as_secs_f64()
        );
        for note in &self.notes {
            out.push_str(&format!("\n       {}", note));
        }
        out
    }
}

/// JSON form of a scenario report.
#[derive(Facet)]
pub struct ScenarioReportJson {
    pub name: String,
    pub verdict: String,
    pub notes: Vec<String>,
    pub elapsed_ms: u64,
}

impl From<&ScenarioReport> for ScenarioReportJson {
    fn from(report: &ScenarioReport) -> Self {
        Self {
            name: report.name.to_string(),
            verdict: report.verdict.as_str().to_string(),
            notes: report.notes.clone(),
            elapsed_ms: report.elapsed.as_millis() as u64,
        }
    }
}

/// Results of a whole run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(|r| r.verdict == Verdict::Passed)
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.reports.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    pub fn to_json(&self) -> String {
        let reports: Vec<ScenarioReportJson> =
            self.reports.iter().map(ScenarioReportJson::from).collect();
        facet_json::to_string(&reports)
    }

    /// One-line tally, e.g. `3 scenarios: 2 passed, 1 hung`.
    pub fn tally(&self) -> String {
        let parts: Vec<String> = [
            Verdict::Passed,
            Verdict::Failed,
            Verdict::Hung,
            Verdict::Indeterminate,
            Verdict::Aborted,
        ]
        .into_iter()
        .filter_map(|v| match self.count(v) {
            0 => None,
            n => Some(format!("{} {}", n, v)),
        })
        .collect();

        format!("{} scenarios: {}", self.reports.len(), parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_escalates_to_worst() {
        let mut outcome = ScenarioOutcome::pass();
        outcome.record(Verdict::Passed, "query ok");
        assert!(outcome.passed());

        outcome.record(Verdict::Hung, "client killed");
        outcome.record(Verdict::Failed, "nonzero exit");
        assert_eq!(outcome.verdict, Verdict::Hung);
        assert_eq!(outcome.notes.len(), 3);
    }

    #[test]
    fn test_from_error_carries_verdict_and_message() {
        let outcome = ScenarioOutcome::from_error(&HarnessError::assertion("client exited 0"));
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.notes, vec!["assertion failed: client exited 0"]);
    }

    #[test]
    fn test_summary_tally() {
        let summary = RunSummary {
            reports: vec![
                ScenarioReport::new("functional", ScenarioOutcome::pass(), Duration::ZERO),
                ScenarioReport::new(
                    "client-timeout",
                    ScenarioOutcome::fail("client exited 0"),
                    Duration::ZERO,
                ),
                ScenarioReport::new("server-timeout", ScenarioOutcome::pass(), Duration::ZERO),
            ],
        };
        assert!(!summary.all_passed());
        assert_eq!(summary.tally(), "3 scenarios: 2 passed, 1 failed");
        assert_eq!(
            summary.get("client-timeout").map(|r| r.verdict),
            Some(Verdict::Failed)
        );
    }

    #[test]
    fn test_json_contains_verdicts() {
        let summary = RunSummary {
            reports: vec![ScenarioReport::new(
                "server-timeout",
                ScenarioOutcome::pass(),
                Duration::from_millis(1500),
            )],
        };
        let json = summary.to_json();
        assert!(json.contains("\"server-timeout\""));
        assert!(json.contains("\"passed\""));
        assert!(json.contains("1500"));
    }
}
