//! Routing of probe results within one cycle, per detection mode.

use super::{Correlator, Verdict};
use crate::probe::{ProbeResult, Source};
use crate::profile::DetectionMode;

/// What the caller should do after feeding a result in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing yet; more results are expected.
    Wait,
    /// Dispatch another probe for this cycle.
    Launch(Source),
    /// The cycle has its verdict.
    Done(Verdict),
}

/// State of the cycle currently in flight.
#[derive(Debug)]
pub struct Cycle {
    pub id: u64,
    mode: DetectionMode,
    correlator: Correlator,
    fallback_launched: bool,
    finished: bool,
}

impl Cycle {
    pub fn new(id: u64, mode: DetectionMode) -> Self {
        Self {
            id,
            mode,
            correlator: Correlator::new(),
            fallback_launched: false,
            finished: false,
        }
    }

    /// Probes to dispatch when the cycle starts.
    pub fn initial_probes(&self) -> Vec<Source> {
        match self.mode {
            DetectionMode::HttpOnly => vec![Source::Reachability],
            DetectionMode::UnifiOnly | DetectionMode::UnifiPrimary => vec![Source::Controller],
            DetectionMode::Hybrid => vec![Source::Reachability, Source::Controller],
        }
    }

    pub fn on_result(&mut self, source: Source, result: ProbeResult) -> Step {
        if self.finished {
            return Step::Wait;
        }
        let step = match (self.mode, source) {
            (DetectionMode::HttpOnly, Source::Reachability) => Step::Done(single(result, "HTTP")),
            (DetectionMode::UnifiOnly, Source::Controller) => Step::Done(single(result, "UniFi")),
            (DetectionMode::UnifiPrimary, Source::Controller) => {
                if result.present {
                    Step::Done(single(result, "UniFi"))
                } else if !self.fallback_launched {
                    self.fallback_launched = true;
                    Step::Launch(Source::Reachability)
                } else {
                    Step::Wait
                }
            }
            (DetectionMode::UnifiPrimary, Source::Reachability) if self.fallback_launched => {
                Step::Done(single(result, "HTTP (UniFi fallback)"))
            }
            (DetectionMode::Hybrid, source) => match self.correlator.record(source, result) {
                Some(verdict) => Step::Done(verdict),
                None => Step::Wait,
            },
            (mode, source) => {
                tracing::debug!(%mode, %source, "result not expected in this mode, ignored");
                Step::Wait
            }
        };
        if matches!(step, Step::Done(_)) {
            self.finished = true;
        }
        step
    }
}

fn single(result: ProbeResult, method: &str) -> Verdict {
    Verdict {
        present: result.present,
        reason: result.reason,
        method: method.to_string(),
    }
}
