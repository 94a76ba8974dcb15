//! JSON frames exchanged with the download engine.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

fn is_false(v: &bool) -> bool {
    !*v
}

/// Command sent from the coordinator to the engine, one per text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineCommand {
    #[serde(rename = "download", rename_all = "camelCase")]
    Download {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_url: Option<String>,
        should_open_app: bool,
        timestamp: u64,
        #[serde(default, skip_serializing_if = "is_false")]
        from_pending: bool,
    },
    #[serde(rename = "youtube_download", rename_all = "camelCase")]
    YoutubeDownload {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        quality: String,
        audio_only: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_url: Option<String>,
        timestamp: u64,
        #[serde(default, skip_serializing_if = "is_false")]
        from_pending: bool,
    },
    #[serde(rename = "open_app")]
    OpenApp { timestamp: u64 },
    #[serde(rename = "extractYouTubeQualities")]
    ExtractQualities { url: String },
}

impl EngineCommand {
    pub fn download(url: &str, file_name: Option<String>, page_url: Option<String>) -> Self {
        EngineCommand::Download {
            url: url.to_string(),
            file_name,
            page_url,
            should_open_app: true,
            timestamp: epoch_millis(),
            from_pending: false,
        }
    }

    pub fn open_app() -> Self {
        EngineCommand::OpenApp {
            timestamp: epoch_millis(),
        }
    }

    /// Wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineCommand::Download { .. } => "download",
            EngineCommand::YoutubeDownload { .. } => "youtube_download",
            EngineCommand::OpenApp { .. } => "open_app",
            EngineCommand::ExtractQualities { .. } => "extractYouTubeQualities",
        }
    }

    /// Copy of a persisted command flagged as a replay.
    pub fn as_replay(&self) -> Self {
        let mut cmd = self.clone();
        match &mut cmd {
            EngineCommand::Download { from_pending, .. }
            | EngineCommand::YoutubeDownload { from_pending, .. } => *from_pending = true,
            EngineCommand::OpenApp { .. } | EngineCommand::ExtractQualities { .. } => {}
        }
        cmd
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Milliseconds since the Unix epoch, as the engine expects in `timestamp`.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One stream variant reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawQualityOption")]
pub struct QualityOption {
    #[serde(rename = "resolution")]
    pub resolution_label: String,
    #[serde(rename = "ext")]
    pub format_extension: String,
    #[serde(rename = "filesize", skip_serializing_if = "Option::is_none")]
    pub approx_file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    pub is_audio_only: bool,
}

impl QualityOption {
    /// Vertical resolution parsed from labels like `1080p`, `1080p60` or `1920x1080`.
    pub fn height(&self) -> Option<u32> {
        parse_height(&self.resolution_label)
    }
}

pub(crate) fn parse_height(label: &str) -> Option<u32> {
    let label = label.trim();
    let tail = match label.split_once('x') {
        Some((_, h)) => h,
        None => label,
    };
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Lenient shape of what engines actually send.
#[derive(Deserialize)]
struct RawQualityOption {
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    filesize: Option<f64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    is_audio_only: Option<bool>,
    #[serde(default)]
    has_video: Option<bool>,
}

impl From<RawQualityOption> for QualityOption {
    fn from(raw: RawQualityOption) -> Self {
        let is_audio_only = raw
            .is_audio_only
            .unwrap_or(raw.has_video == Some(false));
        QualityOption {
            resolution_label: raw
                .resolution
                .or(raw.format)
                .unwrap_or_else(|| "unknown".to_string()),
            format_extension: raw
                .ext
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "mp4".to_string()),
            approx_file_size_bytes: raw
                .filesize
                .or(raw.filesize_approx)
                .filter(|n| *n >= 0.0)
                .map(|n| n as u64),
            fps: raw.fps,
            is_audio_only,
        }
    }
}

/// Engine answer to `extractYouTubeQualities`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitiesReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub qualities: Vec<QualityOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QualitiesReply {
    /// Treats a frame as a qualities reply when it carries `success` or is
    /// typed `youtubeQualities`. Anything else is an unsolicited engine frame.
    pub fn from_frame(value: &serde_json::Value) -> Option<Self> {
        let typed = value.get("type").and_then(|t| t.as_str()) == Some("youtubeQualities");
        if value.get("success").is_none() && !typed {
            return None;
        }
        let mut reply: QualitiesReply = serde_json::from_value(value.clone()).ok()?;
        if typed && value.get("success").is_none() {
            reply.success = reply.error.is_none();
        }
        Some(reply)
    }
}
