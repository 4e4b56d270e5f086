//! Reachability probe implementation.

use std::net::Ipv6Addr;
use std::time::Duration;

use super::ProbeResult;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Build the probe URL for an address/port pair.
pub fn probe_url(address: &str, port: u16) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        return address.to_string();
    }
    // IPv6 literals need brackets in URL authority
    let host = match address.parse::<Ipv6Addr>() {
        Ok(v6) => format!("[{}]", v6),
        Err(_) => address.to_string(),
    };
    if port == 443 {
        format!("https://{}/", host)
    } else {
        format!("http://{}:{}/", host, port)
    }
}

/// Run one reachability check against the given address.
pub async fn run_http_probe(
    transport: &dyn Transport,
    address: &str,
    port: u16,
    timeout: Duration,
    treat_refused_as_present: bool,
) -> ProbeResult {
    let request = HttpRequest::get(probe_url(address, port), timeout).insecure(true);
    let outcome = transport.send(request).await;
    let result = classify_reachability(&outcome, treat_refused_as_present);
    tracing::debug!(address, port, present = result.present, reason = %result.reason, "reachability probe");
    result
}

/// Classify a transport outcome, first matching rule wins:
/// timeout, refusal (when allowed), other transport error, 2xx-4xx, 5xx.
pub fn classify_reachability(
    outcome: &Result<HttpResponse, TransportError>,
    treat_refused_as_present: bool,
) -> ProbeResult {
    match outcome {
        Err(TransportError::Timeout(_)) => ProbeResult::absent("no response"),
        Err(TransportError::Refused(_)) if treat_refused_as_present => {
            ProbeResult::present("Connection refused (host is up)")
        }
        Err(e) => ProbeResult::absent(e.to_string()),
        Ok(resp) if (200..500).contains(&resp.status) => {
            ProbeResult::present(format!("HTTP {}", resp.status))
        }
        Ok(resp) => ProbeResult::absent(format!("Unexpected HTTP {}", resp.status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: code,
            ..Default::default()
        })
    }

    #[test]
    fn test_timeout_is_absent() {
        let r = classify_reachability(&Err(TransportError::Timeout(Duration::from_secs(5))), true);
        assert_eq!(r, ProbeResult::absent("no response"));
    }

    #[test]
    fn test_refused_depends_on_flag() {
        let refused = Err(TransportError::Refused("Connection refused (os error 111)".into()));
        assert!(classify_reachability(&refused, true).present);

        let r = classify_reachability(&refused, false);
        assert!(!r.present);
        assert!(r.reason.contains("refused"));
    }

    #[test]
    fn test_other_transport_error_is_absent() {
        let r = classify_reachability(&Err(TransportError::Network("no route to host".into())), true);
        assert!(!r.present);
        assert!(r.reason.contains("no route to host"));
    }

    #[test]
    fn test_status_ranges() {
        assert!(classify_reachability(&status(200), false).present);
        assert!(classify_reachability(&status(404), false).present);
        assert!(classify_reachability(&status(499), false).present);
        assert!(!classify_reachability(&status(500), false).present);
        assert!(!classify_reachability(&status(503), false).present);
        assert!(!classify_reachability(&status(101), false).present);
    }

    #[test]
    fn test_probe_url() {
        assert_eq!(probe_url("192.168.1.20", 80), "http://192.168.1.20:80/");
        assert_eq!(probe_url("phone.lan", 443), "https://phone.lan/");
        assert_eq!(probe_url("http://x:8080/health", 1), "http://x:8080/health");
    }

    #[test]
    fn test_probe_url_brackets_ipv6() {
        assert_eq!(probe_url("fe80::1", 80), "http://[fe80::1]:80/");
        assert_eq!(probe_url("2001:db8::20", 443), "https://[2001:db8::20]/");
        assert_eq!(probe_url("[fe80::1]", 8080), "http://[fe80::1]:8080/");
    }

    #[tokio::test]
    async fn test_run_http_probe_uses_transport() {
        let transport = ScriptedTransport::new();
        transport.respond("192.168.1.20:62078/", 401, &[], "");
        let r = run_http_probe(&transport, "192.168.1.20", 62078, Duration::from_secs(1), true).await;
        assert!(r.present);
        assert_eq!(r.reason, "HTTP 401");
        assert!(transport.requests()[0].insecure);
    }
}
