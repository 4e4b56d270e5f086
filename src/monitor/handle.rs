//! Cloneable handle for talking to a running monitor.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum Command {
    Refresh(oneshot::Sender<RefreshOutcome>),
}

/// How a refresh request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Started,
    /// A cycle was in flight; a new one runs as soon as it completes.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

impl MonitorHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Request one cycle. Returns `None` if the monitor has stopped.
    pub async fn refresh(&self) -> Option<RefreshOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::Refresh(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }
}
