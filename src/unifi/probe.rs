//! Controller probe: session handling, lookup and the single re-login retry.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{assess_client, ControllerClient, ControllerError, SessionManager, SessionState, StaClient};
use crate::probe::ProbeResult;

/// What the controller said about the device in one cycle.
#[derive(Debug, Clone)]
pub struct ControllerVerdict {
    pub result: ProbeResult,
    /// Human-readable controller status label.
    pub status: String,
    /// Matched client entry, if the device was listed.
    pub client: Option<StaClient>,
}

impl ControllerVerdict {
    fn failed(err: &ControllerError) -> Self {
        Self::failed_with(err.to_string())
    }

    fn failed_with(reason: String) -> Self {
        Self {
            result: ProbeResult::absent(reason.clone()),
            status: reason,
            client: None,
        }
    }
}

fn connected_label(client: &StaClient) -> String {
    let mut label = "Connected".to_string();
    if let Some(essid) = client.essid.as_deref().filter(|s| !s.is_empty()) {
        label.push_str(&format!(" to {}", essid));
    }
    if let Some(ap) = client.ap_mac.as_deref().filter(|s| !s.is_empty()) {
        label.push_str(&format!(" via {}", ap));
    }
    label
}

/// Pairs a [`ControllerClient`] with the session it authenticates with.
pub struct ControllerProbe {
    client: ControllerClient,
    sessions: Mutex<SessionManager>,
}

impl ControllerProbe {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            sessions: Mutex::new(SessionManager::new()),
        }
    }

    /// Run one controller check for `mac`.
    ///
    /// A rejected session is re-established at most once per call.
    pub async fn check(&self, mac: &str, now: DateTime<Utc>) -> ControllerVerdict {
        let mut sessions = self.sessions.lock().await;
        let mut retried = false;

        loop {
            let token = match sessions.ensure(now) {
                SessionState::Valid(token) => token,
                SessionState::NeedsLogin => match self.client.login().await {
                    Ok(token) => {
                        tracing::info!(controller = %self.client.credentials().address, "controller login succeeded");
                        sessions.record_login(token.clone(), now);
                        token
                    }
                    Err(e) => {
                        tracing::warn!(controller = %self.client.credentials().address, error = %e, "controller login failed");
                        // a re-login after a rejected session is an authentication failure whatever the cause
                        if retried && e != ControllerError::AuthFailed {
                            return ControllerVerdict::failed_with(format!("{} ({})", ControllerError::AuthFailed, e));
                        }
                        return ControllerVerdict::failed(&e);
                    }
                },
            };

            match self.client.query_client(&token, mac).await {
                Ok(Some(client)) => {
                    let (present, reason) = assess_client(&client, now);
                    tracing::debug!(
                        mac,
                        name = client.display_name().unwrap_or("-"),
                        present,
                        reason = %reason,
                        "controller lookup"
                    );
                    return ControllerVerdict {
                        result: ProbeResult {
                            present,
                            reason: reason.clone(),
                        },
                        status: if present {
                            connected_label(&client)
                        } else {
                            format!("Listed but inactive: {}", reason)
                        },
                        client: Some(client),
                    };
                }
                Ok(None) => {
                    tracing::debug!(mac, "client not in controller table");
                    return ControllerVerdict {
                        result: ProbeResult::absent("Not in controller client list"),
                        status: "Not connected".to_string(),
                        client: None,
                    };
                }
                Err(ControllerError::Unauthorized) if !retried => {
                    tracing::warn!("controller rejected session, logging in again");
                    sessions.invalidate();
                    retried = true;
                }
                Err(ControllerError::Unauthorized) => {
                    sessions.invalidate();
                    return ControllerVerdict::failed(&ControllerError::AuthFailed);
                }
                Err(e) => return ControllerVerdict::failed(&e),
            }
        }
    }
}
