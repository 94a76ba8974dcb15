//! Direct-file and local-URL classification.

/// Extensions that mark a URL as pointing straight at a file.
pub const KNOWN_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz", ".mp4", ".avi", ".mkv", ".mov",
    ".wmv", ".flv", ".webm", ".m4v", ".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a",
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".doc", ".docx", ".xls", ".xlsx",
    ".ppt", ".pptx", ".exe", ".msi", ".dmg", ".pkg", ".deb", ".rpm", ".apk", ".iso", ".img",
    ".bin", ".dll", ".so", ".dylib", ".torrent",
];

/// Path segments that servers commonly use for download endpoints.
const DOWNLOAD_PATH_SEGMENTS: &[&str] = &["download", "dl"];

/// Query keys whose presence (with a truthy value) marks a download endpoint.
const DOWNLOAD_QUERY_KEYS: &[&str] = &["download", "dl", "export"];

fn has_known_extension(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    KNOWN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_truthy_marker(key: &str, value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    match key {
        "export" => value == "download",
        _ => value.is_empty() || value == "1" || value == "true" || value == "yes",
    }
}

/// True if `url` already looks like a direct file: its last path segment or a
/// query value ends with a known extension, or it carries a download marker
/// (`/download/…`, `?dl=1`, `?export=download`, an attachment disposition
/// override). Unparseable URLs are never direct.
pub fn is_direct_file_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };

    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.last().is_some_and(|s| has_known_extension(s)) {
        return true;
    }
    if segments
        .iter()
        .any(|s| DOWNLOAD_PATH_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()))
    {
        return true;
    }

    parsed.query_pairs().any(|(k, v)| {
        let key = k.to_ascii_lowercase();
        has_known_extension(&v)
            || (DOWNLOAD_QUERY_KEYS.contains(&key.as_str()) && is_truthy_marker(&key, &v))
            || (key == "response-content-disposition" && v.to_ascii_lowercase().contains("attachment"))
    })
}

/// True for URLs that must never be forwarded to the engine: loopback hosts,
/// `file:` and `data:` URLs.
pub fn is_local_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            if matches!(parsed.scheme(), "file" | "data" | "blob") {
                return true;
            }
            matches!(
                parsed.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("[::1]")
            )
        }
        Err(_) => {
            let lower = url.trim().to_ascii_lowercase();
            lower.starts_with("file:") || lower.starts_with("data:")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_in_last_segment() {
        assert!(is_direct_file_url("https://example.com/files/archive.zip"));
        assert!(is_direct_file_url("https://example.com/Setup.EXE"));
        assert!(is_direct_file_url("https://example.com/a/b.tar.gz?token=1"));
    }

    #[test]
    fn extension_only_in_hostname_is_not_direct() {
        assert!(!is_direct_file_url("https://downloads.sourceforge.net/project/page"));
        assert!(!is_direct_file_url("https://example.com/interstitial"));
    }

    #[test]
    fn extension_in_query_value() {
        assert!(is_direct_file_url("https://example.com/get?file=report.pdf"));
    }

    #[test]
    fn download_markers() {
        assert!(is_direct_file_url("https://example.com/download/12345"));
        assert!(is_direct_file_url("https://www.dropbox.com/s/abc/thing?dl=1"));
        assert!(is_direct_file_url("https://drive.example.com/uc?export=download&id=x"));
        assert!(is_direct_file_url(
            "https://bucket.s3.amazonaws.com/key?response-content-disposition=attachment%3B"
        ));
        assert!(!is_direct_file_url("https://www.dropbox.com/s/abc/thing?dl=0"));
        assert!(!is_direct_file_url("https://example.com/downloads"));
    }

    #[test]
    fn unparseable_is_not_direct() {
        assert!(!is_direct_file_url("file.zip"));
    }

    #[test]
    fn local_urls() {
        assert!(is_local_url("http://localhost:8080/file.zip"));
        assert!(is_local_url("http://127.0.0.1/x"));
        assert!(is_local_url("file:///tmp/a.zip"));
        assert!(is_local_url("data:text/plain;base64,SGk="));
        assert!(!is_local_url("https://example.com/a.zip"));
    }
}
