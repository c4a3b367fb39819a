//! Data models for Mailgun API responses.

use serde::{Deserialize, Serialize};

/// Acknowledgement returned when a message is accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Human-readable status, e.g. `Queued. Thank you.`
    pub message: String,
    /// Message-Id assigned by the API.
    #[serde(default)]
    pub id: String,
}

/// JSON envelope of error responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) message: String,
}

/// Where the API keeps a copy of a received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub key: String,
    #[serde(default)]
    pub url: String,
}

/// An inbound message retained server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(default)]
    pub recipients: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "body-plain", default)]
    pub body_plain: String,
    #[serde(rename = "stripped-text", default)]
    pub stripped_text: String,
    #[serde(rename = "stripped-signature", default)]
    pub stripped_signature: String,
    #[serde(rename = "body-html", default)]
    pub body_html: String,
    #[serde(rename = "stripped-html", default)]
    pub stripped_html: String,
    #[serde(default)]
    pub attachments: Vec<StoredAttachment>,
    #[serde(rename = "message-url", default)]
    pub message_url: String,
    #[serde(rename = "content-id-map", default)]
    pub content_id_map: serde_json::Map<String, serde_json::Value>,
    /// Raw headers as `[name, value]` pairs, in message order.
    #[serde(rename = "message-headers", default)]
    pub message_headers: Vec<(String, String)>,
}

/// Attachment metadata of a [`StoredMessage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredAttachment {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "content-type", default)]
    pub content_type: String,
}
