//! Push service wire messages.
//!
//! Every frame is a JSON text frame tagged by `messageType`. Outbound
//! messages are plain serde structs; inbound frames parse into
//! [`InboundFrame`] and are validated at the boundary, so nothing past
//! this module touches untyped JSON.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};

/// Outbound `hello`.
///
/// `broadcasts` is always sent as `null`; `uaid` is omitted until the
/// service has assigned one.
#[derive(Debug, Serialize)]
pub struct HelloRequest<'a> {
    #[serde(rename = "messageType")]
    message_type: &'static str,
    broadcasts: Option<serde_json::Value>,
    use_webpush: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    uaid: Option<&'a str>,
}

impl<'a> HelloRequest<'a> {
    /// Build a hello, echoing `uaid` when one is known.
    pub fn new(uaid: Option<&'a str>) -> Self {
        Self {
            message_type: "hello",
            broadcasts: None,
            use_webpush: true,
            uaid: uaid.filter(|id| !id.is_empty()),
        }
    }
}

/// Outbound `register`.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    #[serde(rename = "channelID")]
    channel_id: &'a str,
    #[serde(rename = "messageType")]
    message_type: &'static str,
    key: &'a str,
}

impl<'a> RegisterRequest<'a> {
    /// Build a register request for `channel_id` scoped to `server_key`.
    pub fn new(channel_id: &'a str, server_key: &'a str) -> Self {
        Self {
            channel_id,
            message_type: "register",
            key: server_key,
        }
    }
}

/// Hello acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelloAck {
    /// Session id assigned (or echoed) by the service.
    pub uaid: String,
    /// Status code.
    pub status: u16,
}

/// Register acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterAck {
    /// Channel the acknowledgement refers to.
    #[serde(rename = "channelID")]
    pub channel_id: String,
    /// Status code; 200 on success.
    pub status: u16,
    /// Push endpoint URL, present on success.
    #[serde(rename = "pushEndpoint", default)]
    pub push_endpoint: Option<String>,
}

/// Encrypted notification for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Notification {
    /// Target channel.
    #[serde(rename = "channelID")]
    pub channel_id: String,
    /// Encrypted record, base64url without padding.
    pub data: String,
    /// Service-side message version, if sent.
    #[serde(default)]
    pub version: Option<String>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "messageType")]
pub enum InboundFrame {
    /// `hello` response.
    #[serde(rename = "hello")]
    HelloAck(HelloAck),
    /// `register` response.
    #[serde(rename = "register")]
    RegisterAck(RegisterAck),
    /// Pushed notification.
    #[serde(rename = "notification")]
    Notification(Notification),
    /// Any other message type.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Parse one text frame.
    ///
    /// Fails on invalid JSON, a missing `messageType`, or a known message
    /// type with missing required fields.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HelloAck(_) => "hello",
            Self::RegisterAck(_) => "register",
            Self::Notification(_) => "notification",
            Self::Unknown => "unknown",
        }
    }
}
