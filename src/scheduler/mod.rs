//! Scheduler adapter: next-delay policy and a one-shot, re-armable timer.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::engine::Presence;
use crate::profile::Effective;

/// Delay before the next cycle for the current presence value.
pub fn next_delay(presence: Presence, effective: &Effective) -> Duration {
    match presence {
        Presence::Present => effective.present_interval,
        Presence::NotPresent => effective.away_interval,
    }
}

/// At most one pending invocation; scheduling replaces any earlier one.
#[derive(Debug, Default)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, cancelling whatever was pending. Returns the wall-clock
    /// time of the next check.
    pub fn schedule_once(&mut self, delay: Duration) -> DateTime<Utc> {
        self.cancel_all();
        self.deadline = Some(Instant::now() + delay);
        Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
    }

    pub fn cancel_all(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the armed deadline passes, then disarms. Never resolves
    /// while disarmed. Safe to drop and call again.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.cancel_all();
            }
            None => std::future::pending().await,
        }
    }
}
