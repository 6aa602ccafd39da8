//! Emergency call transport.
//!
//! Places a voice call through the Twilio call-creation endpoint when a fall
//! is confirmed. The call speaks the measured impact force and skin
//! temperature to whoever answers.
//!
//! Delivery runs on a dedicated worker thread fed by a bounded channel, so a
//! slow or failing provider can never stall sample processing. There is no
//! retry: a failed call still consumed the alert cooldown upstream.

use crate::alert::AlertPayload;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::thread;

/// Twilio REST API root.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Notifier (Twilio) account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Master switch; when false the agent runs without outbound calls.
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    /// Caller ID, E.164 format
    pub from_number: String,
    /// Emergency contact, E.164 format
    pub to_number: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            to_number: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NotifierConfig {
    /// Call-creation endpoint for this account.
    pub fn calls_url(&self) -> String {
        format!("{TWILIO_API_BASE}/Accounts/{}/Calls.json", self.account_sid)
    }

    /// True when enabled and every required field is present.
    pub fn is_configured(&self) -> bool {
        self.enabled
            && !self.account_sid.is_empty()
            && !self.auth_token.is_empty()
            && !self.from_number.is_empty()
            && !self.to_number.is_empty()
    }
}

/// Notifier error types.
#[derive(Debug)]
pub enum NotifierError {
    /// Missing or invalid account settings
    Config(String),
    /// Network/HTTP transport error
    Network(String),
    /// The provider rejected the request; body carries its diagnostic
    Provider { status: u16, body: String },
    /// Response decoding error
    Serialization(String),
}

impl std::fmt::Display for NotifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierError::Config(msg) => write!(f, "Notifier config error: {msg}"),
            NotifierError::Network(msg) => write!(f, "Notifier network error: {msg}"),
            NotifierError::Provider { status, body } => {
                write!(f, "Notifier rejected request ({status}): {body}")
            }
            NotifierError::Serialization(msg) => {
                write!(f, "Notifier serialization error: {msg}")
            }
        }
    }
}

impl std::error::Error for NotifierError {}

/// Provider-acknowledged call, for logging.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
}

/// Async Twilio client.
pub struct NotifierClient {
    config: NotifierConfig,
    client: reqwest::Client,
}

impl NotifierClient {
    pub fn new(config: NotifierConfig) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifierError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// TwiML voice response spoken on pickup.
    pub fn voice_message(alert: &AlertPayload) -> String {
        format!(
            "<Response><Say voice=\"alice\">Emergency Alert. A fall has been detected. \
             Impact force was {:.1} G. Skin temperature is {:.1} degrees.</Say></Response>",
            alert.impact, alert.temperature
        )
    }

    /// Place the emergency call. One attempt, no retry.
    pub async fn place_call(&self, alert: &AlertPayload) -> Result<CallOutcome, NotifierError> {
        if !self.config.is_configured() {
            return Err(NotifierError::Config(
                "notifier is disabled or missing account settings".to_string(),
            ));
        }

        let twiml = Self::voice_message(alert);
        let params = [
            ("To", self.config.to_number.trim()),
            ("From", self.config.from_number.trim()),
            ("Twiml", twiml.as_str()),
        ];

        let response = self
            .client
            .post(self.config.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| NotifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifierError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let call: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NotifierError::Serialization(e.to_string()))?;

        Ok(CallOutcome {
            call_sid: call
                .get("sid")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            call_status: call
                .get("status")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }
}

/// Run the notifier on its own thread with a private current-thread runtime.
///
/// Consumes alerts until the sending side disconnects. Each alert is one
/// call attempt; outcomes are logged and never propagated back into the
/// sampling path.
pub fn spawn_notifier_worker(
    config: NotifierConfig,
    alerts: Receiver<AlertPayload>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("notifier worker could not create runtime: {e}");
                return;
            }
        };

        let client = match NotifierClient::new(config) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("notifier worker disabled: {e}");
                for _ in alerts.iter() {
                    tracing::warn!("alert dropped, notifier unavailable");
                }
                return;
            }
        };

        for alert in alerts.iter() {
            tracing::info!(
                impact = alert.impact,
                temperature = alert.temperature,
                "placing emergency call"
            );

            match runtime.block_on(client.place_call(&alert)) {
                Ok(outcome) => {
                    tracing::info!(
                        call_sid = outcome.call_sid.as_deref().unwrap_or("unknown"),
                        call_status = outcome.call_status.as_deref().unwrap_or("unknown"),
                        "emergency call accepted"
                    );
                }
                Err(e) => {
                    tracing::error!("emergency call failed: {e}");
                }
            }
        }
    })
}
