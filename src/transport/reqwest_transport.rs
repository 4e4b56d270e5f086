//! reqwest-backed transport.

use async_trait::async_trait;
use std::error::Error as _;

use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Transport over two pooled reqwest clients, one strict and one that accepts
/// invalid certificates.
#[derive(Clone)]
pub struct ReqwestTransport {
    strict: reqwest::Client,
    insecure: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let strict = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        let insecure = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(Self { strict, insecure })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = if request.insecure { &self.insecure } else { &self.strict };

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        builder = builder.timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&e, request.timeout))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| classify_error(&e, request.timeout))?;

        Ok(HttpResponse { status, headers, body })
    }
}

fn classify_error(e: &reqwest::Error, timeout: std::time::Duration) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout(timeout);
    }
    let message = error_chain(e);
    if is_refusal(&message) {
        TransportError::Refused(message)
    } else {
        TransportError::Network(message)
    }
}

/// Flatten an error and its sources, since reqwest hides the io error text.
fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

pub(crate) fn is_refusal(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("connection refused") || lower.contains("econnrefused")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_refusal() {
        assert!(is_refusal("error sending request: tcp connect error: Connection refused (os error 111)"));
        assert!(is_refusal("ECONNREFUSED"));
        assert!(!is_refusal("dns error: failed to lookup address"));
    }

    #[tokio::test]
    async fn test_unroutable_address_is_an_error() {
        let transport = ReqwestTransport::new().unwrap();
        let result = transport
            .send(HttpRequest::get("http://256.256.256.256", Duration::from_millis(100)))
            .await;
        assert!(result.is_err());
    }
}
