//! Product analytics, sent to Amplitude's HTTP v2 API.
//!
//! Tracking never blocks or fails an exchange: events are posted from a
//! spawned task and delivery errors are only logged.

use serde::Serialize;

pub const AMPLITUDE_URL: &str = "https://api2.amplitude.com/2/httpapi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Event {
    #[strum(serialize = "User Registration")]
    UserRegistration,
    #[strum(serialize = "Text Message")]
    UserSendText,
    #[strum(serialize = "Voice Message")]
    UserSendVoice,
    #[strum(serialize = "Photo Message")]
    UserSendPhoto,
    #[strum(serialize = "Photo Recognition")]
    PhotoRecognition,
}

#[derive(Debug, Serialize)]
struct Batch<'a> {
    api_key: &'a str,
    events: Vec<TrackedEvent>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct TrackedEvent {
    user_id: String,
    event_type: String,
}

#[derive(Debug, Clone)]
pub struct Analytics {
    api_key: Option<String>,
    url: String,
    client: reqwest::Client,
}

impl Analytics {
    /// Tracking is a no-op without an API key.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()),
            url: AMPLITUDE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn track(&self, user_id: i64, event: Event) {
        let Some(api_key) = self.api_key.clone() else {
            tracing::trace!(user_id, %event, "analytics disabled");
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let batch = Batch {
                api_key: &api_key,
                events: vec![tracked(user_id, event)],
            };
            match client.post(&url).json(&batch).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(user_id, %event, "analytics event sent");
                }
                Ok(response) => {
                    tracing::warn!(
                        user_id,
                        %event,
                        status = %response.status(),
                        "analytics event rejected"
                    );
                }
                Err(err) => {
                    tracing::warn!(user_id, %event, error = %err, "analytics event not sent");
                }
            }
        });
    }
}

fn tracked(user_id: i64, event: Event) -> TrackedEvent {
    TrackedEvent {
        user_id: user_id.to_string(),
        event_type: event.to_string(),
    }
}
