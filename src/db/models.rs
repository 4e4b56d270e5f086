//! Database model types.

use chrono::{DateTime, Utc};

use crate::engine::PresenceRecord;

/// Persisted state for one device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredDevice {
    pub record: PresenceRecord,
    pub controller_last_seen: Option<DateTime<Utc>>,
}
