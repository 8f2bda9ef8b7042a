//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gesture::GestureClient;
use crate::media::MediaConstraints;
use crate::peer::IceServer;

/// Settings for one calling client.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use signcall_core::ClientConfig;
///
/// let config = ClientConfig::from_json(r#"{"relayUrl": "ws://10.0.0.5:4000/ws"}"#).unwrap();
/// assert_eq!(config.relay_url, "ws://10.0.0.5:4000/ws");
/// assert_eq!(config.ice_servers.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// WebSocket endpoint of the signaling relay.
    pub relay_url: String,
    /// Base URL of the gesture recognition service, if used.
    pub gesture_url: Option<String>,
    pub ice_servers: Vec<IceServer>,
    /// How long the "call ended" state is shown before returning to idle.
    pub ended_notice_ms: u64,
    pub media: MediaConstraints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:4000/ws".to_string(),
            gesture_url: None,
            ice_servers: IceServer::default_stun(),
            ended_notice_ms: 2000,
            media: MediaConstraints::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn ended_notice(&self) -> Duration {
        Duration::from_millis(self.ended_notice_ms)
    }

    /// Client for the gesture service, when a URL is configured.
    pub fn gesture_client(&self) -> Option<GestureClient> {
        self.gesture_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(GestureClient::new)
    }
}
