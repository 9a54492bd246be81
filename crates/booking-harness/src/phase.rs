//! Lifecycle phases of the mock-peer scenarios.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

/// Where a mock-peer scenario is in its protocol.
///
/// `TornDown` is reachable from every other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    Idle,
    Listening,
    Connecting,
    Peered,
    AdversarialWait,
    Probe,
    TornDown,
}

impl fmt::Display for PeerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Listening => "LISTENING",
            Self::Connecting => "CONNECTING",
            Self::Peered => "PEERED",
            Self::AdversarialWait => "ADVERSARIAL_WAIT",
            Self::Probe => "PROBE",
            Self::TornDown => "TORN_DOWN",
        };
        f.write_str(name)
    }
}

/// Records phase transitions for one scenario.
#[derive(Debug)]
pub struct PhaseTracker {
    scenario: &'static str,
    phase: PeerPhase,
    entered: Instant,
    history: Vec<(PeerPhase, Duration)>,
}

impl PhaseTracker {
    pub fn new(scenario: &'static str) -> Self {
        Self {
            scenario,
            phase: PeerPhase::Idle,
            entered: Instant::now(),
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> PeerPhase {
        self.phase
    }

    pub fn advance(&mut self, next: PeerPhase) {
        let spent = self.entered.elapsed();
        debug!(
            "{}: {} -> {} (after {:.2}s)",
            self.scenario,
            self.phase,
            next,
            spent.as_secs_f64()
        );
        self.history.push((self.phase, spent));
        self.phase = next;
        self.entered = Instant::now();
    }

    /// Enter `TornDown`, returning the phase that was active before.
    pub fn tear_down(&mut self) -> PeerPhase {
        let last = self.phase;
        if last != PeerPhase::TornDown {
            self.advance(PeerPhase::TornDown);
        }
        last
    }

    /// Phases left so far, with the time spent in each.
    pub fn history(&self) -> &[(PeerPhase, Duration)] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_recorded() {
        let mut tracker = PhaseTracker::new("client-timeout");
        assert_eq!(tracker.current(), PeerPhase::Idle);

        tracker.advance(PeerPhase::Listening);
        tracker.advance(PeerPhase::Peered);
        assert_eq!(tracker.tear_down(), PeerPhase::Peered);
        assert_eq!(tracker.current(), PeerPhase::TornDown);

        let left: Vec<PeerPhase> = tracker.history().iter().map(|(p, _)| *p).collect();
        assert_eq!(
            left,
            vec![PeerPhase::Idle, PeerPhase::Listening, PeerPhase::Peered]
        );
    }

    #[test]
    fn test_tear_down_twice() {
        let mut tracker = PhaseTracker::new("server-timeout");
        tracker.tear_down();
        assert_eq!(tracker.tear_down(), PeerPhase::TornDown);
        assert_eq!(tracker.history().len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(PeerPhase::AdversarialWait.to_string(), "ADVERSARIAL_WAIT");
    }
}
