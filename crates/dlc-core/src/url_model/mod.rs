//! URL modeling: direct-file classification and filename derivation.
//!
//! The coordinator only sees URLs and a few header values, so everything it
//! knows about "is this a file?" and "what is it called?" lives here.

mod classify;
mod content_disposition;
mod path;
mod sanitize;

pub use classify::{is_direct_file_url, is_local_url, KNOWN_EXTENSIONS};
pub use content_disposition::parse_content_disposition_filename;
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;
use sanitize::{truncate_on_char_boundary, NAME_MAX};

/// Filename used when neither the URL nor the headers yield anything usable.
const DEFAULT_FILENAME: &str = "download.file";

/// Suffix appended to names without an extension so the engine never saves a bare stem.
const FALLBACK_EXTENSION: &str = ".file";

/// Derives a filename for a download.
///
/// Prefers the filename from `content_disposition`, then the last path segment
/// of `url`, then `<host>.file`. Names without an extension get `.file`
/// appended. The result is sanitized for use on disk.
///
/// # Examples
///
/// - `derive_filename("https://example.com/archive.zip", None)` → `"archive.zip"`
/// - `derive_filename("https://example.com/get", None)` → `"get.file"`
/// - `derive_filename("https://example.com/", None)` → `"example.com.file"`
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition_filename)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| filename_from_url_path(url))
        .or_else(|| host_of(url).map(|h| format!("{h}{FALLBACK_EXTENSION}")));

    let Some(raw) = candidate else {
        return DEFAULT_FILENAME.to_string();
    };

    let mut name = sanitize_filename(&raw);
    if name.is_empty() || name == "." || name == ".." {
        return DEFAULT_FILENAME.to_string();
    }
    if !name.contains('.') {
        truncate_on_char_boundary(&mut name, NAME_MAX - FALLBACK_EXTENSION.len());
        name.push_str(FALLBACK_EXTENSION);
    }
    name
}

fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(str::to_string)
}
