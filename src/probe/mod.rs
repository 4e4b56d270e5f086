//! Probe results and the reachability prober.

mod http;

pub use http::*;

use serde::Serialize;
use std::fmt;

/// Evidence source that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Reachability,
    Controller,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Reachability => f.write_str("HTTP"),
            Source::Controller => f.write_str("UniFi"),
        }
    }
}

/// Outcome of one source within one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub present: bool,
    pub reason: String,
}

impl ProbeResult {
    pub fn present(reason: impl Into<String>) -> Self {
        Self {
            present: true,
            reason: reason.into(),
        }
    }

    pub fn absent(reason: impl Into<String>) -> Self {
        Self {
            present: false,
            reason: reason.into(),
        }
    }
}
