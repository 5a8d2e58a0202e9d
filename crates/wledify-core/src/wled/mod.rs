//! WLED dispatch
//!
//! Commands are POSTed to `http://<ip>/json/state`. Delivery is best-effort
//! and unverifiable: the response status and body are never read, so
//! `accepted` only means the request left without a transport error. It says
//! nothing about whether the device applied the command.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::constants::keys;
use crate::storage::SharedStore;

/// Saved device address, e.g. `192.168.1.50` or `wled.local:8080`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTarget {
    ip: String,
}

impl DeviceTarget {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into().trim().to_string(),
        }
    }

    /// Read the persisted target, empty if none was saved
    pub fn load(storage: &SharedStore) -> Self {
        Self::new(storage.get(keys::WLED_IP).unwrap_or_default())
    }

    /// Persist this target
    pub fn save(&self, storage: &SharedStore) -> anyhow::Result<()> {
        storage.set(keys::WLED_IP, &self.ip)
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn is_empty(&self) -> bool {
        self.ip.is_empty()
    }

    pub fn state_url(&self) -> String {
        format!("http://{}/json/state", self.ip)
    }
}

/// One segment of a state update; unset fields are omitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<Vec<[u8; 3]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    /// Individual LED colors, in order from LED 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i: Option<Vec<[u8; 3]>>,
}

/// Body of a `/json/state` POST
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LightCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    pub seg: Vec<SegmentCommand>,
}

impl LightCommand {
    /// `{"on":true,"seg":[{"col":[[r,g,b]]}]}`
    pub fn solid_color(red: u8, green: u8, blue: u8) -> Self {
        Self {
            on: Some(true),
            seg: vec![SegmentCommand {
                col: Some(vec![[red, green, blue]]),
                ..SegmentCommand::default()
            }],
        }
    }

    /// `{"seg":[{"bri":x}]}`
    pub fn segment_brightness(brightness: u8) -> Self {
        Self {
            on: None,
            seg: vec![SegmentCommand {
                bri: Some(brightness),
                ..SegmentCommand::default()
            }],
        }
    }

    /// `{"seg":[{"i":[[r,g,b],...]}]}`
    pub fn individual_leds(colors: Vec<[u8; 3]>) -> Self {
        Self {
            on: None,
            seg: vec![SegmentCommand {
                i: Some(colors),
                ..SegmentCommand::default()
            }],
        }
    }
}

/// What the caller learns from a dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// The request was sent without a transport error
    pub accepted: bool,
    /// Status line for the user
    pub message: String,
    pub sent_at: Option<DateTime<Local>>,
}

impl DispatchOutcome {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            sent_at: None,
        }
    }
}

/// Anything that can take a light command
#[async_trait]
pub trait LightSink: Send + Sync {
    async fn send(&self, target: &DeviceTarget, command: &LightCommand) -> DispatchOutcome;
}

pub const IP_NOT_SET: &str = "WLED IP not set.";

/// HTTP dispatcher for WLED's JSON API
pub struct WledDispatcher {
    client: reqwest::Client,
}

impl WledDispatcher {
    /// `client` should carry a short timeout; devices live on the LAN
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LightSink for WledDispatcher {
    async fn send(&self, target: &DeviceTarget, command: &LightCommand) -> DispatchOutcome {
        if target.is_empty() {
            return DispatchOutcome::rejected(IP_NOT_SET);
        }

        let url = target.state_url();
        match self.client.post(&url).json(command).send().await {
            // The response is dropped unread
            Ok(_) => {
                let now = Local::now();
                tracing::debug!(url = %url, "WLED command sent");
                DispatchOutcome {
                    accepted: true,
                    message: format!(
                        "Command sent to WLED ({}). Check WLED device.",
                        now.format("%H:%M:%S")
                    ),
                    sent_at: Some(now),
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, "Error sending to WLED: {}", e);
                DispatchOutcome::rejected(format!("Error sending to WLED: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::MockServer;
    use std::sync::Arc;

    #[test]
    fn test_command_shapes() {
        assert_eq!(
            serde_json::to_value(LightCommand::solid_color(255, 0, 10)).unwrap(),
            serde_json::json!({"on": true, "seg": [{"col": [[255, 0, 10]]}]})
        );
        assert_eq!(
            serde_json::to_value(LightCommand::segment_brightness(128)).unwrap(),
            serde_json::json!({"seg": [{"bri": 128}]})
        );
        assert_eq!(
            serde_json::to_value(LightCommand::individual_leds(vec![[1, 1, 1], [2, 2, 2]])).unwrap(),
            serde_json::json!({"seg": [{"i": [[1, 1, 1], [2, 2, 2]]}]})
        );
    }

    #[tokio::test]
    async fn test_empty_target_short_circuits() {
        let server = MockServer::start();
        let dispatcher = WledDispatcher::new(reqwest::Client::new());

        let outcome = dispatcher
            .send(&DeviceTarget::new("   "), &LightCommand::solid_color(1, 2, 3))
            .await;

        assert!(!outcome.accepted);
        assert_eq!(outcome.message, "WLED IP not set.");
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_posts_json_and_ignores_response() {
        let server = MockServer::start();
        // Even an error status counts as sent: the response is opaque
        server.enqueue_text(500, "boom");
        let dispatcher = WledDispatcher::new(reqwest::Client::new());

        let outcome = dispatcher
            .send(&DeviceTarget::new(server.host()), &LightCommand::solid_color(255, 0, 0))
            .await;

        assert!(outcome.accepted);
        assert!(outcome.message.starts_with("Command sent to WLED ("));
        assert!(outcome.message.ends_with("). Check WLED device."));
        assert!(outcome.sent_at.is_some());

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "/json/state");
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"on": true, "seg": [{"col": [[255, 0, 0]]}]}));
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        // Bind then drop a listener so the port is closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dispatcher = WledDispatcher::new(reqwest::Client::new());
        let outcome = dispatcher
            .send(
                &DeviceTarget::new(format!("127.0.0.1:{}", port)),
                &LightCommand::solid_color(0, 0, 0),
            )
            .await;

        assert!(!outcome.accepted);
        assert!(outcome.message.starts_with("Error sending to WLED: "));
    }

    #[test]
    fn test_target_persistence() {
        let storage: SharedStore = Arc::new(MemoryStore::new());
        assert!(DeviceTarget::load(&storage).is_empty());

        DeviceTarget::new(" 10.0.0.7 ").save(&storage).unwrap();
        assert_eq!(DeviceTarget::load(&storage).ip(), "10.0.0.7");
    }
}
