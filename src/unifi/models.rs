// Controller API response types
//
// The client-list endpoint wraps its payload in `{ "meta": {...}, "data": [...] }`.
// Field presence varies across firmware, so nearly everything is optional.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Login request body.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
}

/// Login response body; only the token field matters.
#[derive(Debug, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// `stat/sta` envelope.
#[derive(Debug, Deserialize)]
pub struct StaResponse {
    #[serde(default)]
    pub meta: Option<Meta>,
    pub data: Vec<StaClient>,
}

#[derive(Debug, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub rc: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// One associated client from `stat/sta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaClient {
    #[serde(default)]
    pub mac: String,
    /// Epoch seconds.
    #[serde(default)]
    pub last_seen: Option<i64>,
    /// Seconds.
    #[serde(default)]
    pub uptime: Option<i64>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ap_mac: Option<String>,
    #[serde(default)]
    pub essid: Option<String>,
}

impl StaClient {
    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        self.last_seen.and_then(|s| Utc.timestamp_opt(s, 0).single())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.hostname.as_deref())
            .filter(|n| !n.is_empty())
    }
}
