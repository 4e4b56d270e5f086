//! Two-slot join point for hybrid cycles.

use crate::probe::{ProbeResult, Source};

/// Combined outcome of a cycle, ready for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub present: bool,
    pub reason: String,
    /// Detection-method label for display.
    pub method: String,
}

/// Holds at most one pending result per source.
#[derive(Debug, Default)]
pub struct Correlator {
    reachability: Option<ProbeResult>,
    controller: Option<ProbeResult>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result; returns the combined verdict once both slots are filled.
    ///
    /// Slots are cleared as soon as the verdict is produced.
    pub fn record(&mut self, source: Source, result: ProbeResult) -> Option<Verdict> {
        let slot = match source {
            Source::Reachability => &mut self.reachability,
            Source::Controller => &mut self.controller,
        };
        if slot.is_some() {
            tracing::debug!(%source, "duplicate result for filled slot ignored");
            return None;
        }
        *slot = Some(result);

        if self.reachability.is_none() || self.controller.is_none() {
            return None;
        }
        let http = self.reachability.take()?;
        let unifi = self.controller.take()?;
        Some(combine(&http, &unifi))
    }
}

/// Either source confirming presence is enough.
fn combine(http: &ProbeResult, unifi: &ProbeResult) -> Verdict {
    let method = match (http.present, unifi.present) {
        (true, true) => "Hybrid (HTTP + UniFi)",
        (true, false) => "Hybrid (HTTP)",
        (false, true) => "Hybrid (UniFi)",
        (false, false) => "Hybrid",
    };
    Verdict {
        present: http.present || unifi.present,
        reason: format!(
            "{}: {}; {}: {}",
            Source::Reachability,
            http.reason,
            Source::Controller,
            unifi.reason
        ),
        method: method.to_string(),
    }
}
