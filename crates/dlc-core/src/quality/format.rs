//! Mapping from a chosen resolution to the yt-dlp format selector sent with
//! `youtube_download`. Each selector names the usual mp4 video+m4a audio
//! format ids for that height, then falls back to `best` at that height.

use crate::engine::parse_height;

pub const AUDIO_ONLY_SELECTOR: &str = "bestaudio";

pub fn format_selector_for_height(height: u32) -> &'static str {
    match height {
        h if h >= 2160 => "313+140/315+140/401+140/best[height=2160]",
        h if h >= 1440 => "271+140/308+140/best[height=1440]",
        h if h >= 1080 => "137+140/299+140/best[height=1080]",
        h if h >= 720 => "136+140/298+140/22/best[height=720]",
        h if h >= 480 => "135+140/244+140/18/best[height=480]",
        h if h >= 360 => "134+140/243+140/18/best[height=360]",
        _ => "133+140/242+140/17/best[height=240]",
    }
}

/// `best` without a resolution; an unparseable label gets the 240p floor.
pub fn format_selector_for_resolution(resolution: Option<&str>) -> &'static str {
    match resolution.map(str::trim).filter(|r| !r.is_empty()) {
        None => "best",
        Some(label) => format_selector_for_height(parse_height(label).unwrap_or(0)),
    }
}
