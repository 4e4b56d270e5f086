//! Presence state machine with failure-count hysteresis.
//!
//! - **Cycle start**: the failure counter is bumped unconditionally and, once
//!   it exceeds the threshold, a `present` device is declared away right away,
//!   without waiting for the cycle's probes.
//! - **Present verdict**: counter reset, last-seen refreshed, transition to
//!   `present` if not already there.
//! - **Absent verdict**: no transition; the threshold already did its work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    NotPresent,
}

impl Presence {
    pub fn as_str(self) -> &'static str {
        match self {
            Presence::Present => "present",
            Presence::NotPresent => "not present",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Presence::Present),
            "not present" => Some(Presence::NotPresent),
            _ => None,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative presence state carried across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub presence: Presence,
    pub failures: u32,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl Default for PresenceRecord {
    fn default() -> Self {
        Self {
            presence: Presence::NotPresent,
            failures: 0,
            last_seen: None,
            last_attempt: None,
        }
    }
}

/// An actual change of presence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Presence,
    pub to: Presence,
}

/// Sole mutator of the [`PresenceRecord`].
#[derive(Debug)]
pub struct PresenceMachine {
    record: PresenceRecord,
    max_failures: u32,
    last_reason: Option<String>,
}

impl PresenceMachine {
    pub fn new(record: PresenceRecord, max_failures: u32) -> Self {
        Self {
            record,
            max_failures,
            last_reason: None,
        }
    }

    pub fn record(&self) -> &PresenceRecord {
        &self.record
    }

    pub fn presence(&self) -> Presence {
        self.record.presence
    }

    /// Reason attached to the most recent verdict.
    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }

    /// Start a cycle: count it as a failure until proven otherwise.
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        self.record.failures = self.record.failures.saturating_add(1);
        self.record.last_attempt = Some(now);

        if self.record.failures > self.max_failures && self.record.presence == Presence::Present {
            self.record.presence = Presence::NotPresent;
            tracing::info!(
                failures = self.record.failures,
                threshold = self.max_failures,
                "failure threshold exceeded, marking not present"
            );
            return Some(Transition {
                from: Presence::Present,
                to: Presence::NotPresent,
            });
        }
        None
    }

    /// Apply a cycle's verdict.
    pub fn apply(&mut self, verdict: &Verdict, now: DateTime<Utc>) -> Option<Transition> {
        self.last_reason = Some(verdict.reason.clone());
        if !verdict.present {
            tracing::debug!(failures = self.record.failures, reason = %verdict.reason, "cycle found no presence");
            return None;
        }

        self.record.failures = 0;
        self.record.last_seen = Some(now);
        if self.record.presence == Presence::Present {
            return None;
        }

        let from = self.record.presence;
        self.record.presence = Presence::Present;
        tracing::info!(method = %verdict.method, reason = %verdict.reason, "device is present");
        Some(Transition {
            from,
            to: Presence::Present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn verdict(present: bool) -> Verdict {
        Verdict {
            present,
            reason: if present { "HTTP 200".into() } else { "no response".into() },
            method: "HTTP".into(),
        }
    }

    fn present_machine(max_failures: u32) -> PresenceMachine {
        let mut m = PresenceMachine::new(PresenceRecord::default(), max_failures);
        m.begin_cycle(Utc::now());
        m.apply(&verdict(true), Utc::now());
        m
    }

    /// One full failed cycle; returns the transitions it produced.
    fn failed_cycle(m: &mut PresenceMachine) -> Vec<Transition> {
        let now = Utc::now();
        m.begin_cycle(now)
            .into_iter()
            .chain(m.apply(&verdict(false), now))
            .collect()
    }

    #[test]
    fn test_three_timeouts_below_threshold_stay_present() {
        let mut m = present_machine(20);
        for _ in 0..3 {
            assert!(failed_cycle(&mut m).is_empty());
        }
        assert_eq!(m.presence(), Presence::Present);
        assert_eq!(m.record().failures, 3);
    }

    #[test]
    fn test_threshold_exceeded_fires_once() {
        let mut m = present_machine(3);
        let mut transitions = Vec::new();
        for _ in 0..3 {
            transitions.extend(failed_cycle(&mut m));
        }
        assert!(transitions.is_empty());
        assert_eq!(m.presence(), Presence::Present);

        // fourth cycle start: count 4 > 3
        transitions.extend(m.begin_cycle(Utc::now()));
        assert_eq!(m.presence(), Presence::NotPresent);
        for _ in 0..10 {
            transitions.extend(failed_cycle(&mut m));
        }
        assert_eq!(
            transitions,
            vec![Transition {
                from: Presence::Present,
                to: Presence::NotPresent
            }]
        );
    }

    #[test]
    fn test_threshold_policy_for_every_threshold() {
        for threshold in 0..25u32 {
            let mut m = present_machine(threshold);
            let mut transitions = 0;
            for _ in 0..threshold + 5 {
                transitions += failed_cycle(&mut m).len();
            }
            assert_eq!(m.presence(), Presence::NotPresent, "threshold {}", threshold);
            assert_eq!(transitions, 1, "threshold {}", threshold);
        }
    }

    #[test]
    fn test_present_verdict_resets_and_updates_last_seen() {
        let mut m = PresenceMachine::new(PresenceRecord::default(), 5);
        let t0 = Utc::now();
        for _ in 0..8 {
            failed_cycle(&mut m);
        }
        assert_eq!(m.record().failures, 8);

        let t1 = t0 + ChronoDuration::seconds(90);
        m.begin_cycle(t1);
        let transition = m.apply(&verdict(true), t1);
        assert_eq!(
            transition,
            Some(Transition {
                from: Presence::NotPresent,
                to: Presence::Present
            })
        );
        assert_eq!(m.record().failures, 0);
        assert_eq!(m.record().last_seen, Some(t1));
        assert_eq!(m.record().last_attempt, Some(t1));

        // re-confirmation is not a transition but still resets
        m.begin_cycle(t1);
        assert_eq!(m.apply(&verdict(true), t1), None);
        assert_eq!(m.record().failures, 0);
    }

    #[test]
    fn test_absent_verdict_keeps_reason() {
        let mut m = PresenceMachine::new(PresenceRecord::default(), 5);
        m.begin_cycle(Utc::now());
        assert_eq!(m.apply(&verdict(false), Utc::now()), None);
        assert_eq!(m.last_reason(), Some("no response"));
        assert_eq!(m.record().last_seen, None);
    }

    #[test]
    fn test_presence_string_roundtrip() {
        assert_eq!(Presence::parse(Presence::Present.as_str()), Some(Presence::Present));
        assert_eq!(Presence::parse("not present"), Some(Presence::NotPresent));
        assert_eq!(Presence::parse("away"), None);
    }
}
