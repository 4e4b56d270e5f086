//! Device profile, detection mode and device-class defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which evidence sources a cycle consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    HttpOnly,
    UnifiOnly,
    UnifiPrimary,
    Hybrid,
}

impl DetectionMode {
    pub fn uses_controller(self) -> bool {
        !matches!(self, DetectionMode::HttpOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::HttpOnly => "http_only",
            DetectionMode::UnifiOnly => "unifi_only",
            DetectionMode::UnifiPrimary => "unifi_primary",
            DetectionMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http_only" | "http" => Ok(DetectionMode::HttpOnly),
            "unifi_only" | "unifi" => Ok(DetectionMode::UnifiOnly),
            "unifi_primary" => Ok(DetectionMode::UnifiPrimary),
            "hybrid" => Ok(DetectionMode::Hybrid),
            other => Err(format!("unknown detection mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Iphone,
    Android,
    Laptop,
    Desktop,
    Iot,
    Generic,
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iphone" | "ios" => Ok(DeviceClass::Iphone),
            "android" => Ok(DeviceClass::Android),
            "laptop" => Ok(DeviceClass::Laptop),
            "desktop" => Ok(DeviceClass::Desktop),
            "iot" => Ok(DeviceClass::Iot),
            "generic" | "other" | "" => Ok(DeviceClass::Generic),
            other => Err(format!("unknown device class: {}", other)),
        }
    }
}

/// Polling intervals and failure threshold for one device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDefaults {
    pub present_interval: u64,
    pub away_interval: u64,
    pub max_failures: u32,
}

const fn defaults(present_interval: u64, away_interval: u64, max_failures: u32) -> ClassDefaults {
    ClassDefaults {
        present_interval,
        away_interval,
        max_failures,
    }
}

/// Device class -> (reachability-only defaults, defaults with controller data).
///
/// Phones drop Wi-Fi traffic while asleep, so they get a long failure budget;
/// with the controller watching association they can afford slower polling.
static CLASS_DEFAULTS: &[(DeviceClass, ClassDefaults, ClassDefaults)] = &[
    (DeviceClass::Iphone, defaults(60, 30, 20), defaults(120, 60, 30)),
    (DeviceClass::Android, defaults(60, 30, 15), defaults(120, 60, 20)),
    (DeviceClass::Laptop, defaults(60, 30, 5), defaults(60, 30, 5)),
    (DeviceClass::Desktop, defaults(120, 60, 3), defaults(120, 60, 3)),
    (DeviceClass::Iot, defaults(300, 60, 3), defaults(300, 60, 3)),
    (DeviceClass::Generic, defaults(60, 30, 5), defaults(60, 30, 5)),
];

/// Look up the defaults for a class.
pub fn class_defaults(class: DeviceClass, with_controller: bool) -> ClassDefaults {
    CLASS_DEFAULTS
        .iter()
        .find(|(c, _, _)| *c == class)
        .map(|(_, plain, controller)| if with_controller { *controller } else { *plain })
        .unwrap_or(defaults(60, 30, 5))
}

/// Immutable per-device configuration.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub mac: Option<String>,
    pub class: DeviceClass,
    pub mode: DetectionMode,
    pub http_timeout: Duration,
    pub controller_timeout: Duration,
    pub treat_refused_as_present: bool,
    /// Overrides; zero falls back to the class default.
    pub present_interval: u64,
    pub away_interval: u64,
    pub max_failures: u32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: "device".to_string(),
            address: String::new(),
            port: 80,
            mac: None,
            class: DeviceClass::Generic,
            mode: DetectionMode::HttpOnly,
            http_timeout: Duration::from_secs(5),
            controller_timeout: Duration::from_secs(10),
            treat_refused_as_present: true,
            present_interval: 0,
            away_interval: 0,
            max_failures: 0,
        }
    }
}

/// Settings after applying class defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effective {
    pub present_interval: Duration,
    pub away_interval: Duration,
    pub max_failures: u32,
}

impl DeviceProfile {
    /// Resolve zero/unset overrides against the class table.
    pub fn effective(&self, controller_active: bool) -> Effective {
        let d = class_defaults(self.class, controller_active);
        let pick = |value: u64, fallback: u64| if value == 0 { fallback } else { value };
        Effective {
            present_interval: Duration::from_secs(pick(self.present_interval, d.present_interval)),
            away_interval: Duration::from_secs(pick(self.away_interval, d.away_interval)),
            max_failures: if self.max_failures == 0 {
                d.max_failures
            } else {
                self.max_failures
            },
        }
    }
}
