//! Attribute updates for the presentation layer.
//!
//! Every update is applied to a status snapshot (served by the web API) and
//! broadcast to subscribers. Only the presence attribute carries a meaningful
//! `is_state_change` flag; consumers use it to avoid duplicate notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};

use crate::engine::{Presence, PresenceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Presence,
    LastSeen,
    LastAttempt,
    FailureCount,
    NextCheck,
    DetectionMethod,
    ControllerStatus,
    ControllerLastSeen,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeUpdate {
    pub attribute: Attribute,
    pub value: Value,
    pub is_state_change: bool,
}

impl AttributeUpdate {
    pub fn new(attribute: Attribute, value: Value) -> Self {
        Self {
            attribute,
            value,
            is_state_change: false,
        }
    }

    pub fn presence(presence: Presence, is_state_change: bool) -> Self {
        Self {
            attribute: Attribute::Presence,
            value: json!(presence.as_str()),
            is_state_change,
        }
    }

    pub fn timestamp(attribute: Attribute, at: Option<DateTime<Utc>>) -> Self {
        Self::new(attribute, at.map(|t| json!(t.to_rfc3339())).unwrap_or(Value::Null))
    }
}

/// Snapshot of every published attribute.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device: String,
    pub presence: Presence,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub next_check: Option<DateTime<Utc>>,
    pub detection_method: Option<String>,
    pub controller_status: Option<String>,
    pub controller_last_seen: Option<DateTime<Utc>>,
}

impl DeviceStatus {
    pub fn new(device: &str, record: &PresenceRecord) -> Self {
        Self {
            device: device.to_string(),
            presence: record.presence,
            last_seen: record.last_seen,
            last_attempt: record.last_attempt,
            failure_count: record.failures,
            next_check: None,
            detection_method: None,
            controller_status: None,
            controller_last_seen: None,
        }
    }

    fn apply(&mut self, update: &AttributeUpdate) {
        let as_time = |v: &Value| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        let as_text = |v: &Value| v.as_str().map(str::to_string);
        match update.attribute {
            Attribute::Presence => {
                if let Some(p) = update.value.as_str().and_then(Presence::parse) {
                    self.presence = p;
                }
            }
            Attribute::LastSeen => self.last_seen = as_time(&update.value),
            Attribute::LastAttempt => self.last_attempt = as_time(&update.value),
            Attribute::FailureCount => {
                self.failure_count = update.value.as_u64().unwrap_or(0) as u32;
            }
            Attribute::NextCheck => self.next_check = as_time(&update.value),
            Attribute::DetectionMethod => self.detection_method = as_text(&update.value),
            Attribute::ControllerStatus => self.controller_status = as_text(&update.value),
            Attribute::ControllerLastSeen => self.controller_last_seen = as_time(&update.value),
        }
    }
}

/// Publishes attribute updates to the snapshot and to subscribers.
pub struct StatusBoard {
    status: RwLock<DeviceStatus>,
    tx: broadcast::Sender<AttributeUpdate>,
}

impl StatusBoard {
    pub fn new(status: DeviceStatus) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            status: RwLock::new(status),
            tx,
        }
    }

    pub async fn publish(&self, update: AttributeUpdate) {
        if update.is_state_change {
            tracing::info!(value = %update.value, "presence changed");
        }
        self.status.write().await.apply(&update);
        // No subscribers is fine.
        let _ = self.tx.send(update);
    }

    pub async fn publish_all(&self, updates: Vec<AttributeUpdate>) {
        for update in updates {
            self.publish(update).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttributeUpdate> {
        self.tx.subscribe()
    }

    pub async fn snapshot(&self) -> DeviceStatus {
        self.status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_updates_snapshot_and_subscribers() {
        let board = StatusBoard::new(DeviceStatus::new("phone", &PresenceRecord::default()));
        let mut rx = board.subscribe();

        let seen = Utc::now();
        board
            .publish_all(vec![
                AttributeUpdate::presence(Presence::Present, true),
                AttributeUpdate::timestamp(Attribute::LastSeen, Some(seen)),
                AttributeUpdate::new(Attribute::FailureCount, json!(0)),
                AttributeUpdate::new(Attribute::DetectionMethod, json!("HTTP")),
            ])
            .await;

        let snap = board.snapshot().await;
        assert_eq!(snap.presence, Presence::Present);
        assert_eq!(snap.last_seen.map(|t| t.timestamp()), Some(seen.timestamp()));
        assert_eq!(snap.detection_method.as_deref(), Some("HTTP"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.attribute, Attribute::Presence);
        assert!(first.is_state_change);
        let second = rx.recv().await.unwrap();
        assert!(!second.is_state_change);
    }

    #[test]
    fn test_snapshot_serializes_for_api() {
        let board = StatusBoard::new(DeviceStatus::new("phone", &PresenceRecord::default()));
        let body = tokio_test::block_on(async {
            board
                .publish(AttributeUpdate::new(Attribute::ControllerStatus, json!("Pending")))
                .await;
            serde_json::to_value(board.snapshot().await).unwrap()
        });
        assert_eq!(body["device"], json!("phone"));
        assert_eq!(body["presence"], json!("not_present"));
        assert_eq!(body["controller_status"], json!("Pending"));
        assert_eq!(body["next_check"], Value::Null);
    }

    #[test]
    fn test_null_timestamp_clears() {
        let mut status = DeviceStatus::new("x", &PresenceRecord::default());
        status.next_check = Some(Utc::now());
        status.apply(&AttributeUpdate::timestamp(Attribute::NextCheck, None));
        assert_eq!(status.next_check, None);
    }
}
