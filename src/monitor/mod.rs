//! Per-device monitor.
//!
//! A single task owns the presence machine, the cycle in flight and the
//! timer. Probes run as spawned tasks and report back over a channel, tagged
//! with the id of the cycle that launched them; anything tagged with another
//! id is dropped. A refresh that arrives mid-cycle is deferred until the
//! current cycle finishes, and multiple deferred refreshes coalesce into one.

mod handle;

pub use handle::*;

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::db::{Store, StoredDevice};
use crate::engine::{Cycle, PresenceMachine, Step, Verdict};
use crate::events::{Attribute, AttributeUpdate, StatusBoard};
use crate::probe::{run_http_probe, ProbeResult, Source};
use crate::profile::{DetectionMode, DeviceProfile, Effective};
use crate::scheduler::{next_delay, OneShotTimer};
use crate::transport::Transport;
use crate::unifi::{ControllerClient, ControllerCredentials, ControllerProbe, ControllerVerdict};

/// A probe outcome on its way back to the monitor.
#[derive(Debug)]
struct ProbeEvent {
    cycle: u64,
    outcome: Outcome,
}

#[derive(Debug)]
enum Outcome {
    Reachability(ProbeResult),
    Controller(ControllerVerdict),
}

pub struct Monitor {
    profile: DeviceProfile,
    mode: DetectionMode,
    effective: Effective,
    transport: Arc<dyn Transport>,
    controller: Option<Arc<ControllerProbe>>,
    controller_status: String,
    controller_last_seen: Option<DateTime<Utc>>,
    machine: PresenceMachine,
    timer: OneShotTimer,
    cycle: Option<Cycle>,
    next_cycle_id: u64,
    refresh_pending: bool,
    board: Arc<StatusBoard>,
    store: Option<Store>,
    results_tx: mpsc::Sender<ProbeEvent>,
    results_rx: mpsc::Receiver<ProbeEvent>,
    commands: mpsc::Receiver<Command>,
}

impl Monitor {
    pub fn new(
        profile: DeviceProfile,
        credentials: Option<ControllerCredentials>,
        transport: Arc<dyn Transport>,
        initial: StoredDevice,
        board: Arc<StatusBoard>,
        store: Option<Store>,
    ) -> (Self, MonitorHandle) {
        let (mode, controller, controller_status) = resolve_mode(&profile, credentials, transport.clone());
        if mode != profile.mode {
            tracing::warn!(
                configured = %profile.mode,
                status = %controller_status,
                "controller integration incomplete, falling back to http_only"
            );
        }
        let effective = profile.effective(mode.uses_controller());

        let (results_tx, results_rx) = mpsc::channel(16);
        let (cmd_tx, commands) = mpsc::channel(16);

        let monitor = Self {
            machine: PresenceMachine::new(initial.record, effective.max_failures),
            controller_last_seen: initial.controller_last_seen,
            profile,
            mode,
            effective,
            transport,
            controller,
            controller_status,
            timer: OneShotTimer::new(),
            cycle: None,
            next_cycle_id: 1,
            refresh_pending: false,
            board,
            store,
            results_tx,
            results_rx,
            commands,
        };
        (monitor, MonitorHandle::new(cmd_tx))
    }

    /// Detection mode actually in use after configuration checks.
    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Run until every [`MonitorHandle`] is dropped.
    pub async fn run(mut self) {
        tracing::info!(
            device = %self.profile.name,
            address = %self.profile.address,
            mode = %self.mode,
            threshold = self.effective.max_failures,
            "monitor started"
        );
        self.publish_initial().await;
        self.start_cycle().await;

        loop {
            tokio::select! {
                _ = self.timer.fired() => {
                    self.start_cycle().await;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Refresh(reply)) => {
                        let outcome = self.refresh().await;
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },
                Some(event) = self.results_rx.recv() => {
                    self.on_probe_event(event).await;
                }
            }
        }

        if self.timer.is_armed() {
            self.timer.cancel_all();
        }
        tracing::info!(device = %self.profile.name, "monitor stopped");
    }

    async fn refresh(&mut self) -> RefreshOutcome {
        if self.cycle.is_some() {
            self.refresh_pending = true;
            tracing::warn!(device = %self.profile.name, "cycle in flight, refresh deferred");
            return RefreshOutcome::Deferred;
        }
        self.start_cycle().await;
        RefreshOutcome::Started
    }

    async fn start_cycle(&mut self) {
        if self.cycle.is_some() {
            self.refresh_pending = true;
            return;
        }
        self.timer.cancel_all();

        let now = Utc::now();
        let id = self.next_cycle_id;
        self.next_cycle_id += 1;

        let transition = self.machine.begin_cycle(now);
        let record = self.machine.record();
        let mut updates = vec![
            AttributeUpdate::new(Attribute::FailureCount, json!(record.failures)),
            AttributeUpdate::timestamp(Attribute::LastAttempt, record.last_attempt),
            AttributeUpdate::timestamp(Attribute::NextCheck, None),
        ];
        if let Some(t) = transition {
            tracing::info!(device = %self.profile.name, from = %t.from, to = %t.to, "presence transition");
            updates.push(AttributeUpdate::presence(t.to, true));
        }
        self.board.publish_all(updates).await;

        let cycle = Cycle::new(id, self.mode);
        tracing::debug!(cycle = id, failures = record.failures, "cycle started");
        for source in cycle.initial_probes() {
            self.launch(id, source);
        }
        self.cycle = Some(cycle);
    }

    fn launch(&self, cycle: u64, source: Source) {
        let tx = self.results_tx.clone();
        match source {
            Source::Reachability => {
                let transport = self.transport.clone();
                let address = self.profile.address.clone();
                let port = self.profile.port;
                let timeout = self.profile.http_timeout;
                let refused_ok = self.profile.treat_refused_as_present;
                tokio::spawn(async move {
                    let result = run_http_probe(transport.as_ref(), &address, port, timeout, refused_ok).await;
                    let event = ProbeEvent {
                        cycle,
                        outcome: Outcome::Reachability(result),
                    };
                    if tx.send(event).await.is_err() {
                        tracing::error!("monitor gone, reachability result dropped");
                    }
                });
            }
            Source::Controller => {
                let (Some(probe), Some(mac)) = (self.controller.clone(), self.profile.mac.clone()) else {
                    tracing::error!(cycle, "controller probe requested without controller configuration");
                    return;
                };
                tokio::spawn(async move {
                    let verdict = probe.check(&mac, Utc::now()).await;
                    let event = ProbeEvent {
                        cycle,
                        outcome: Outcome::Controller(verdict),
                    };
                    if tx.send(event).await.is_err() {
                        tracing::error!("monitor gone, controller result dropped");
                    }
                });
            }
        }
    }

    async fn on_probe_event(&mut self, event: ProbeEvent) {
        if self.cycle.as_ref().map(|c| c.id) != Some(event.cycle) {
            tracing::debug!(cycle = event.cycle, "dropping result from a finished cycle");
            return;
        }

        let (source, result) = match event.outcome {
            Outcome::Reachability(result) => (Source::Reachability, result),
            Outcome::Controller(verdict) => {
                self.note_controller(&verdict).await;
                (Source::Controller, verdict.result)
            }
        };

        let step = match self.cycle.as_mut() {
            Some(cycle) => cycle.on_result(source, result),
            None => return,
        };
        match step {
            Step::Wait => {}
            Step::Launch(next) => {
                tracing::debug!(cycle = event.cycle, source = %next, "launching fallback probe");
                self.launch(event.cycle, next);
            }
            Step::Done(verdict) => self.finish_cycle(verdict).await,
        }
    }

    async fn note_controller(&mut self, verdict: &ControllerVerdict) {
        self.controller_status = verdict.status.clone();
        let mut updates = vec![AttributeUpdate::new(
            Attribute::ControllerStatus,
            json!(verdict.status),
        )];
        if let Some(seen) = verdict.client.as_ref().and_then(|c| c.last_seen_at()) {
            self.controller_last_seen = Some(seen);
            updates.push(AttributeUpdate::timestamp(Attribute::ControllerLastSeen, Some(seen)));
        }
        self.board.publish_all(updates).await;
    }

    async fn finish_cycle(&mut self, verdict: Verdict) {
        self.cycle = None;
        let now = Utc::now();
        let transition = self.machine.apply(&verdict, now);

        let presence = self.machine.presence();
        let delay = next_delay(presence, &self.effective);
        let next_check = self.timer.schedule_once(delay);

        let record = self.machine.record();
        let mut updates = Vec::with_capacity(5);
        if let Some(t) = transition {
            tracing::info!(device = %self.profile.name, from = %t.from, to = %t.to, "presence transition");
            updates.push(AttributeUpdate::presence(t.to, true));
        }
        updates.push(AttributeUpdate::new(Attribute::FailureCount, json!(record.failures)));
        if verdict.present {
            updates.push(AttributeUpdate::timestamp(Attribute::LastSeen, record.last_seen));
        }
        updates.push(AttributeUpdate::timestamp(Attribute::NextCheck, Some(next_check)));
        // Published last: marks the cycle as complete for subscribers.
        updates.push(AttributeUpdate::new(Attribute::DetectionMethod, json!(verdict.method)));
        self.board.publish_all(updates).await;

        tracing::debug!(
            present = verdict.present,
            reason = self.machine.last_reason().unwrap_or_default(),
            next_in = ?delay,
            "cycle finished"
        );
        self.persist();

        if self.refresh_pending {
            self.refresh_pending = false;
            self.start_cycle().await;
        }
    }

    async fn publish_initial(&mut self) {
        let record = self.machine.record();
        self.board
            .publish_all(vec![
                AttributeUpdate::presence(record.presence, false),
                AttributeUpdate::new(Attribute::FailureCount, json!(record.failures)),
                AttributeUpdate::timestamp(Attribute::LastSeen, record.last_seen),
                AttributeUpdate::timestamp(Attribute::LastAttempt, record.last_attempt),
                AttributeUpdate::new(Attribute::DetectionMethod, json!(self.mode.as_str())),
                AttributeUpdate::new(Attribute::ControllerStatus, json!(self.controller_status)),
                AttributeUpdate::timestamp(Attribute::ControllerLastSeen, self.controller_last_seen),
            ])
            .await;
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let state = StoredDevice {
            record: self.machine.record().clone(),
            controller_last_seen: self.controller_last_seen,
        };
        if let Err(e) = store.save_device(&self.profile.name, &state) {
            tracing::error!(device = %self.profile.name, "failed to persist presence record: {}", e);
        }
    }
}

/// Pick the detection mode actually usable with the given configuration.
///
/// Controller modes without complete credentials or a hardware address run
/// as `http_only`, with the reason in the controller status label.
fn resolve_mode(
    profile: &DeviceProfile,
    credentials: Option<ControllerCredentials>,
    transport: Arc<dyn Transport>,
) -> (DetectionMode, Option<Arc<ControllerProbe>>, String) {
    if !profile.mode.uses_controller() {
        return (DetectionMode::HttpOnly, None, "Not used".to_string());
    }

    let mut missing: Vec<&str> = match &credentials {
        Some(creds) => creds.missing(),
        None => vec!["controller credentials"],
    };
    if profile.mac.as_deref().map_or(true, |m| m.trim().is_empty()) {
        missing.push("hardware address");
    }

    match credentials {
        Some(creds) if missing.is_empty() => {
            let client = ControllerClient::new(transport, creds, profile.controller_timeout);
            (
                profile.mode,
                Some(Arc::new(ControllerProbe::new(client))),
                "Pending".to_string(),
            )
        }
        _ => (
            DetectionMode::HttpOnly,
            None,
            format!("Not configured: missing {}", missing.join(", ")),
        ),
    }
}
