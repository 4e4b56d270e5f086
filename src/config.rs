//! Configuration module.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::profile::{DetectionMode, DeviceClass, DeviceProfile};
use crate::unifi::{normalize_mac, ControllerCredentials, ControllerVariant};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the status API (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "presence.db")
    pub db_path: String,
    pub device: DeviceProfile,
    /// Present when any `UNIFI_*` setting is given, even if incomplete.
    pub controller: Option<ControllerCredentials>,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup.
    ///
    /// Environment variables:
    /// - `PRESENCE_HTTP_PORT`, `PRESENCE_DB_PATH`: server settings
    /// - `PRESENCE_ADDRESS` (required), `PRESENCE_PORT`, `PRESENCE_MAC`,
    ///   `PRESENCE_DEVICE_NAME`, `PRESENCE_DEVICE_CLASS`, `PRESENCE_MODE`
    /// - `PRESENCE_HTTP_TIMEOUT`, `PRESENCE_CONTROLLER_TIMEOUT` (seconds)
    /// - `PRESENCE_REFUSED_IS_PRESENT` (true/false)
    /// - `PRESENCE_PRESENT_INTERVAL`, `PRESENCE_AWAY_INTERVAL`,
    ///   `PRESENCE_MAX_FAILURES` (0 = device-class default)
    /// - `UNIFI_ADDRESS`, `UNIFI_PORT`, `UNIFI_VARIANT`, `UNIFI_SITE`,
    ///   `UNIFI_USERNAME`, `UNIFI_PASSWORD`
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let address = get("PRESENCE_ADDRESS").ok_or(ConfigError::Missing("PRESENCE_ADDRESS"))?;
        let mac = get("PRESENCE_MAC");
        if let Some(mac) = &mac {
            if normalize_mac(mac).len() != 12 {
                return Err(ConfigError::Invalid {
                    name: "PRESENCE_MAC",
                    reason: format!("{:?} is not a 48-bit hardware address", mac),
                });
            }
        }
        let defaults = DeviceProfile::default();

        let device = DeviceProfile {
            name: get("PRESENCE_DEVICE_NAME").unwrap_or(defaults.name),
            address,
            port: parse_or(&get, "PRESENCE_PORT", defaults.port)?,
            mac,
            class: parse_or(&get, "PRESENCE_DEVICE_CLASS", defaults.class)?,
            mode: parse_or(&get, "PRESENCE_MODE", defaults.mode)?,
            http_timeout: Duration::from_secs(parse_or(
                &get,
                "PRESENCE_HTTP_TIMEOUT",
                defaults.http_timeout.as_secs(),
            )?),
            controller_timeout: Duration::from_secs(parse_or(
                &get,
                "PRESENCE_CONTROLLER_TIMEOUT",
                defaults.controller_timeout.as_secs(),
            )?),
            treat_refused_as_present: parse_or(
                &get,
                "PRESENCE_REFUSED_IS_PRESENT",
                defaults.treat_refused_as_present,
            )?,
            present_interval: parse_or(&get, "PRESENCE_PRESENT_INTERVAL", 0)?,
            away_interval: parse_or(&get, "PRESENCE_AWAY_INTERVAL", 0)?,
            max_failures: parse_or(&get, "PRESENCE_MAX_FAILURES", 0)?,
        };

        let controller_keys = [
            "UNIFI_ADDRESS",
            "UNIFI_USERNAME",
            "UNIFI_PASSWORD",
            "UNIFI_VARIANT",
            "UNIFI_PORT",
            "UNIFI_SITE",
        ];
        let controller = if controller_keys.iter().any(|k| get(k).is_some()) {
            let variant: ControllerVariant = parse_or(&get, "UNIFI_VARIANT", ControllerVariant::UnifiOs)?;
            Some(ControllerCredentials {
                address: get("UNIFI_ADDRESS").unwrap_or_default(),
                port: parse_or(&get, "UNIFI_PORT", variant.default_port())?,
                variant,
                site: get("UNIFI_SITE").unwrap_or_else(|| "default".to_string()),
                username: get("UNIFI_USERNAME").unwrap_or_default(),
                password: lookup("UNIFI_PASSWORD").unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(Self {
            http_port: parse_or(&get, "PRESENCE_HTTP_PORT", 8080)?,
            db_path: get("PRESENCE_DB_PATH").unwrap_or_else(|| "presence.db".to_string()),
            device,
            controller,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::load_from(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = load(&[("PRESENCE_ADDRESS", "192.168.1.20")]).unwrap();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "presence.db");
        assert_eq!(cfg.device.port, 80);
        assert_eq!(cfg.device.mode, DetectionMode::HttpOnly);
        assert_eq!(cfg.device.class, DeviceClass::Generic);
        assert!(cfg.device.treat_refused_as_present);
        assert!(cfg.controller.is_none());
    }

    #[test]
    fn test_address_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("PRESENCE_ADDRESS"));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = load(&[("PRESENCE_ADDRESS", "x"), ("PRESENCE_MODE", "ping")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PRESENCE_MODE", .. }));
        let err = load(&[("PRESENCE_ADDRESS", "x"), ("PRESENCE_PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PRESENCE_PORT", .. }));
    }

    #[test]
    fn test_mac_must_be_48_bits() {
        for bad in ["zz:zz:zz:zz:zz:zz", "--", "aa:bb:cc", "aa:bb:cc:dd:ee:ff:00"] {
            let err = load(&[("PRESENCE_ADDRESS", "x"), ("PRESENCE_MAC", bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "PRESENCE_MAC", .. }), "{}", bad);
        }
        let cfg = load(&[("PRESENCE_ADDRESS", "x"), ("PRESENCE_MAC", "aa-bb-cc-dd-ee-ff")]).unwrap();
        assert_eq!(cfg.device.mac.as_deref(), Some("aa-bb-cc-dd-ee-ff"));
    }

    #[test]
    fn test_controller_settings() {
        let cfg = load(&[
            ("PRESENCE_ADDRESS", "192.168.1.20"),
            ("PRESENCE_MODE", "hybrid"),
            ("PRESENCE_DEVICE_CLASS", "iphone"),
            ("PRESENCE_MAC", "AA:BB:CC:DD:EE:FF"),
            ("UNIFI_ADDRESS", "192.168.1.1"),
            ("UNIFI_VARIANT", "selfhosted"),
            ("UNIFI_USERNAME", "admin"),
            ("UNIFI_PASSWORD", " pass word "),
        ])
        .unwrap();
        let creds = cfg.controller.unwrap();
        assert_eq!(creds.variant, ControllerVariant::SelfHosted);
        assert_eq!(creds.port, 8443);
        assert_eq!(creds.site, "default");
        assert_eq!(creds.password, " pass word ");
        assert_eq!(cfg.device.mode, DetectionMode::Hybrid);
        assert_eq!(cfg.device.class, DeviceClass::Iphone);
    }
}
