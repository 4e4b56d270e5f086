//! Controller login and client lookup.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::{ControllerCredentials, ControllerError, LoginRequest, LoginResponse, StaClient, StaResponse};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// A client entry seen within this window counts as connected.
pub const RECENTLY_SEEN_SECS: i64 = 300;
/// Minimum uptime for an addressed client to count as connected.
pub const MIN_ACTIVE_UPTIME_SECS: i64 = 10;

/// Issues login and client-list requests against one controller.
#[derive(Clone)]
pub struct ControllerClient {
    transport: Arc<dyn Transport>,
    credentials: ControllerCredentials,
    timeout: Duration,
}

impl ControllerClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: ControllerCredentials, timeout: Duration) -> Self {
        Self {
            transport,
            credentials,
            timeout,
        }
    }

    pub fn credentials(&self) -> &ControllerCredentials {
        &self.credentials
    }

    /// Log in and return the cookie value to attach to later requests.
    pub async fn login(&self) -> Result<String, ControllerError> {
        let creds = &self.credentials;
        let url = format!("{}{}", creds.base_url(), creds.variant.login_path());
        let body = serde_json::to_value(LoginRequest {
            username: &creds.username,
            password: &creds.password,
            remember: creds.variant.remember_flag(),
        })
        .map_err(|e| ControllerError::Parse(e.to_string()))?;

        let request = HttpRequest::post_json(url, body, self.timeout)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .insecure(true);

        let response = match self.transport.send(request).await {
            Ok(r) => r,
            Err(TransportError::Timeout(_)) => return Err(ControllerError::Timeout),
            Err(e) => return Err(ControllerError::Transport(e)),
        };

        match response.status {
            200..=299 => extract_token(&response).ok_or(ControllerError::MissingToken),
            401 | 403 => Err(ControllerError::AuthFailed),
            404 => Err(ControllerError::EndpointNotFound),
            status => Err(ControllerError::LoginFailed(status)),
        }
    }

    /// Look up one hardware address in the controller's client table.
    ///
    /// Returns `Ok(None)` when the client is not associated.
    pub async fn query_client(&self, token: &str, mac: &str) -> Result<Option<StaClient>, ControllerError> {
        let creds = &self.credentials;
        let url = format!("{}{}", creds.base_url(), creds.variant.clients_path(&creds.site));
        let request = HttpRequest::get(url, self.timeout)
            .header("Cookie", token)
            .header("Accept", "application/json")
            .insecure(true);

        let response = self.transport.send(request).await?;
        match response.status {
            200..=299 => {}
            401 => return Err(ControllerError::Unauthorized),
            status => return Err(ControllerError::Http(status)),
        }

        let parsed: StaResponse =
            serde_json::from_str(&response.body).map_err(|e| ControllerError::Parse(e.to_string()))?;
        if let Some(meta) = &parsed.meta {
            if meta.rc.as_deref() == Some("error") {
                let msg = meta.msg.clone().unwrap_or_default();
                // self-hosted controllers report an expired session in-band
                if msg == "api.err.LoginRequired" {
                    return Err(ControllerError::Unauthorized);
                }
                return Err(ControllerError::Parse(msg));
            }
        }
        let wanted = normalize_mac(mac);
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(parsed.data.into_iter().find(|c| normalize_mac(&c.mac) == wanted))
    }
}

/// Extract a session cookie from a login response.
///
/// `Set-Cookie` patterns are tried in order (UniFi OS `TOKEN`, self-hosted
/// `unifises`, then `csrf_token`), before falling back to a JSON `token` field.
pub fn extract_token(response: &HttpResponse) -> Option<String> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        ["TOKEN", "unifises", "csrf_token"]
            .into_iter()
            .map(|name| (name, Regex::new(&format!(r"(?:^|[\s;,]){}=([^;\s]+)", name)).unwrap()))
            .collect()
    });

    for (name, re) in patterns {
        for cookie in response.header_values("set-cookie") {
            if let Some(value) = re.captures(cookie).and_then(|caps| caps.get(1)) {
                return Some(format!("{}={}", name, value.as_str()));
            }
        }
    }

    let body: LoginResponse = serde_json::from_str(&response.body).ok()?;
    body.token
        .filter(|t| !t.is_empty())
        .map(|t| format!("TOKEN={}", t))
}

/// Lower-case and strip separators so `AA:BB-CC.dd` style inputs compare equal.
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Controller-side presence judgment for a matched client.
///
/// Stale entries linger in the client table after a device leaves, so being
/// listed is not enough: the entry must be recent or actively addressed.
pub fn assess_client(client: &StaClient, now: DateTime<Utc>) -> (bool, String) {
    let mut reasons = Vec::new();

    let age = client.last_seen.map(|ts| now.timestamp() - ts);
    if let Some(age) = age {
        if age <= RECENTLY_SEEN_SECS {
            reasons.push(format!("Recently seen ({}s ago)", age.max(0)));
        }
    }

    let uptime = client.uptime.unwrap_or(0);
    let ip = client.ip.as_deref().unwrap_or("");
    if uptime > MIN_ACTIVE_UPTIME_SECS && !ip.is_empty() {
        reasons.push(format!("Active connection (uptime {}s, IP {})", uptime, ip));
    }

    if reasons.is_empty() {
        let detail = match age {
            Some(age) => format!("Stale client entry (last seen {}s ago)", age),
            None => "Stale client entry (no activity reported)".to_string(),
        };
        (false, detail)
    } else {
        (true, reasons.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;
    use crate::unifi::ControllerVariant;
    use chrono::Duration as ChronoDuration;

    fn creds(variant: ControllerVariant) -> ControllerCredentials {
        ControllerCredentials {
            address: "10.0.0.1".into(),
            port: variant.default_port(),
            variant,
            site: "default".into(),
            username: "admin".into(),
            password: "secret".into(),
        }
    }

    fn with_cookies(cookies: &[&str], body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: cookies
                .iter()
                .map(|c| ("Set-Cookie".to_string(), c.to_string()))
                .collect(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_extract_token_priority() {
        let resp = with_cookies(
            &["csrf_token=c1; Path=/", "TOKEN=t1; Path=/; HttpOnly"],
            r#"{"token":"body"}"#,
        );
        assert_eq!(extract_token(&resp).as_deref(), Some("TOKEN=t1"));

        let resp = with_cookies(&["unifises=u1; Path=/; secure", "csrf_token=c1"], "");
        assert_eq!(extract_token(&resp).as_deref(), Some("unifises=u1"));

        let resp = with_cookies(&["other=x", "csrf_token=c1; Path=/"], "");
        assert_eq!(extract_token(&resp).as_deref(), Some("csrf_token=c1"));
    }

    #[test]
    fn test_extract_token_from_body() {
        let resp = with_cookies(&["other=x"], r#"{"token":"abc"}"#);
        assert_eq!(extract_token(&resp).as_deref(), Some("TOKEN=abc"));

        let resp = with_cookies(&[], r#"{"unique_id":"x"}"#);
        assert_eq!(extract_token(&resp), None);
    }

    #[test]
    fn test_extract_token_ignores_suffix_names() {
        let resp = with_cookies(&["XTOKEN=nope"], "");
        assert_eq!(extract_token(&resp), None);
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aabbccddeeff");
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff"), "aabbccddeeff");
        assert_eq!(normalize_mac("aabbccddeeff"), normalize_mac("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_assess_recently_seen() {
        let now = Utc::now();
        let client = StaClient {
            mac: "aa:bb:cc:dd:ee:ff".into(),
            last_seen: Some((now - ChronoDuration::seconds(30)).timestamp()),
            ..Default::default()
        };
        let (present, reason) = assess_client(&client, now);
        assert!(present);
        assert!(reason.contains("Recently seen"));
    }

    #[test]
    fn test_assess_both_reasons_concatenated() {
        let now = Utc::now();
        let client = StaClient {
            last_seen: Some(now.timestamp() - 5),
            uptime: Some(600),
            ip: Some("192.168.1.20".into()),
            ..Default::default()
        };
        let (present, reason) = assess_client(&client, now);
        assert!(present);
        assert!(reason.contains("Recently seen"));
        assert!(reason.contains("Active connection"));
    }

    #[test]
    fn test_assess_stale_entry() {
        let now = Utc::now();
        let client = StaClient {
            last_seen: Some(now.timestamp() - 900),
            uptime: Some(600),
            ip: None,
            ..Default::default()
        };
        let (present, reason) = assess_client(&client, now);
        assert!(!present);
        assert!(reason.contains("Stale"));

        let short = StaClient {
            uptime: Some(10),
            ip: Some("192.168.1.20".into()),
            ..Default::default()
        };
        assert!(!assess_client(&short, now).0);
    }

    #[tokio::test]
    async fn test_login_body_and_path_per_variant() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/api/login", 200, &[("Set-Cookie", "unifises=s1; Path=/")], "");
        let client = ControllerClient::new(transport.clone(), creds(ControllerVariant::SelfHosted), Duration::from_secs(2));

        assert_eq!(client.login().await.unwrap(), "unifises=s1");
        let req = &transport.requests()[0];
        assert_eq!(req.url, "https://10.0.0.1:8443/api/login");
        let body = req.body.as_ref().unwrap();
        assert_eq!(body["remember"], serde_json::json!(false));
        assert_eq!(body["username"], serde_json::json!("admin"));
    }

    #[tokio::test]
    async fn test_login_failure_classification() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/api/auth/login", 401, &[], "");
        transport.respond("/api/auth/login", 404, &[], "");
        transport.respond("/api/auth/login", 502, &[], "");
        transport.respond("/api/auth/login", 200, &[], "{}");
        let client = ControllerClient::new(transport, creds(ControllerVariant::UnifiOs), Duration::from_secs(2));

        assert_eq!(client.login().await, Err(ControllerError::AuthFailed));
        assert_eq!(client.login().await, Err(ControllerError::EndpointNotFound));
        assert_eq!(client.login().await, Err(ControllerError::LoginFailed(502)));
        assert_eq!(client.login().await, Err(ControllerError::MissingToken));
        // nothing scripted: transport times out
        assert_eq!(client.login().await, Err(ControllerError::Timeout));
    }

    #[tokio::test]
    async fn test_query_client_matches_normalized_mac() {
        let transport = Arc::new(ScriptedTransport::new());
        let body = r#"{"meta":{"rc":"ok"},"data":[
            {"mac":"00:11:22:33:44:55"},
            {"mac":"aa:bb:cc:dd:ee:ff","ip":"192.168.1.20"}
        ]}"#;
        transport.respond("/proxy/network/api/s/default/stat/sta", 200, &[], body);
        transport.respond("/proxy/network/api/s/default/stat/sta", 200, &[], body);
        let client = ControllerClient::new(transport.clone(), creds(ControllerVariant::UnifiOs), Duration::from_secs(2));

        let found = client.query_client("TOKEN=t", "AABBCCDDEEFF").await.unwrap();
        assert_eq!(found.unwrap().ip.as_deref(), Some("192.168.1.20"));
        let missing = client.query_client("TOKEN=t", "de:ad:be:ef:00:01").await.unwrap();
        assert!(missing.is_none());

        let req = &transport.requests()[0];
        assert!(req.headers.iter().any(|(k, v)| k == "Cookie" && v == "TOKEN=t"));
    }

    #[tokio::test]
    async fn test_query_client_never_matches_empty_mac() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/stat/sta", 200, &[], r#"{"data":[{"ip":"192.168.1.30"}]}"#);
        let client = ControllerClient::new(transport, creds(ControllerVariant::UnifiOs), Duration::from_secs(2));

        assert_eq!(client.query_client("TOKEN=t", "::").await, Ok(None));
    }

    #[tokio::test]
    async fn test_query_client_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/stat/sta", 401, &[], "");
        transport.respond("/stat/sta", 500, &[], "");
        transport.respond("/stat/sta", 200, &[], "<html>");
        let client = ControllerClient::new(transport, creds(ControllerVariant::SelfHosted), Duration::from_secs(2));

        assert_eq!(client.query_client("t", "aa").await, Err(ControllerError::Unauthorized));
        assert_eq!(client.query_client("t", "aa").await, Err(ControllerError::Http(500)));
        assert!(matches!(client.query_client("t", "aa").await, Err(ControllerError::Parse(_))));
    }

    #[tokio::test]
    async fn test_query_client_in_band_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/stat/sta", 200, &[], r#"{"meta":{"rc":"error","msg":"api.err.LoginRequired"},"data":[]}"#);
        transport.respond("/stat/sta", 200, &[], r#"{"meta":{"rc":"error","msg":"api.err.NoSiteContext"},"data":[]}"#);
        let client = ControllerClient::new(transport, creds(ControllerVariant::SelfHosted), Duration::from_secs(2));

        assert_eq!(client.query_client("t", "aa").await, Err(ControllerError::Unauthorized));
        assert_eq!(
            client.query_client("t", "aa").await,
            Err(ControllerError::Parse("api.err.NoSiteContext".into()))
        );
    }
}
