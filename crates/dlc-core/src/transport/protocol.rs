//! Inbound message decoding.
//!
//! The discriminator is `type` (or `action`, which some extension builds
//! use). Older extension builds use different names for the same message,
//! so aliases are accepted.

use serde_json::Value;

use crate::intent::SourceEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("message has no type")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// A page-level download candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub file_name: Option<String>,
    pub page_url: Option<String>,
    pub source_event: Option<SourceEvent>,
}

/// A YouTube download at a chosen quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoutubeRequest {
    pub url: String,
    /// Explicit format selector; wins over `resolution`.
    pub quality: Option<String>,
    pub resolution: Option<String>,
    pub file_name: Option<String>,
    pub audio_only: bool,
    pub page_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Download(DownloadRequest),
    LinkResolved {
        original_url: String,
        final_url: String,
        file_name: Option<String>,
        page_url: Option<String>,
    },
    NativeDownload {
        url: String,
        final_url: Option<String>,
        file_name: Option<String>,
        page_url: Option<String>,
    },
    ExtractQualities {
        url: String,
    },
    YoutubeDownload(YoutubeRequest),
    OpenApp,
    ConnectionCheck {
        /// `test_connection` also asks the engine client to reconnect now.
        reconnect: bool,
    },
    Ping,
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Download(_) => "download",
            InboundMessage::LinkResolved { .. } => "link_resolved",
            InboundMessage::NativeDownload { .. } => "native_download",
            InboundMessage::ExtractQualities { .. } => "extract_qualities",
            InboundMessage::YoutubeDownload(_) => "youtube_download",
            InboundMessage::OpenApp => "open_app",
            InboundMessage::ConnectionCheck { .. } => "connection_check",
            InboundMessage::Ping => "ping",
        }
    }
}

/// `requestId` of a message, echoed in its reply.
pub fn request_id(value: &Value) -> Option<Value> {
    value.get("requestId").filter(|v| !v.is_null()).cloned()
}

fn optional(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(value: &Value, key: &'static str) -> Result<String, ProtocolError> {
    optional(value, key).ok_or(ProtocolError::MissingField(key))
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn source_event(value: &Value) -> Option<SourceEvent> {
    let raw = value.get("sourceEvent")?;
    match serde_json::from_value(raw.clone()) {
        Ok(ev) => Some(ev),
        Err(_) => {
            tracing::debug!(source_event = %raw, "unknown sourceEvent ignored");
            None
        }
    }
}

/// Parses one text frame into a message.
pub fn decode(value: &Value) -> Result<InboundMessage, ProtocolError> {
    if !value.is_object() {
        return Err(ProtocolError::InvalidJson("expected a JSON object".to_string()));
    }
    let kind = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ProtocolError::MissingType)?;

    let msg = match kind {
        "download" | "download_link" => InboundMessage::Download(DownloadRequest {
            url: required(value, "url")?,
            file_name: optional(value, "fileName"),
            page_url: optional(value, "pageUrl"),
            source_event: source_event(value),
        }),
        "link_resolved" => InboundMessage::LinkResolved {
            original_url: required(value, "originalUrl")?,
            final_url: required(value, "finalUrl")?,
            file_name: optional(value, "fileName"),
            page_url: optional(value, "pageUrl"),
        },
        "native_download" => InboundMessage::NativeDownload {
            url: required(value, "url")?,
            final_url: optional(value, "finalUrl"),
            file_name: optional(value, "fileName"),
            page_url: optional(value, "pageUrl"),
        },
        "extract_qualities" | "extractYouTubeQualities" => InboundMessage::ExtractQualities {
            url: required(value, "url")?,
        },
        "youtube_download" | "downloadYouTube" => InboundMessage::YoutubeDownload(YoutubeRequest {
            url: required(value, "url")?,
            quality: optional(value, "quality"),
            resolution: optional(value, "resolution"),
            file_name: optional(value, "fileName").or_else(|| optional(value, "title")),
            audio_only: flag(value, "audioOnly"),
            page_url: optional(value, "pageUrl"),
        }),
        "open_app" | "openApp" => InboundMessage::OpenApp,
        "connection_check" | "checkConnection" | "get_connection_status" => {
            InboundMessage::ConnectionCheck { reconnect: false }
        }
        "test_connection" => InboundMessage::ConnectionCheck { reconnect: true },
        "ping" => InboundMessage::Ping,
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };
    Ok(msg)
}
