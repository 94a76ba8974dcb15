//! HTTP HEAD probing for redirect resolution.
//!
//! Uses the curl crate (libcurl) to follow redirects from an interstitial URL
//! and report where they end, plus the headers that name the file.

mod parse;

use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

use crate::url_model::parse_content_disposition_filename;

/// Redirects followed before giving up on a chain.
const MAX_REDIRECTS: u32 = 10;

/// Outcome of a HEAD probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// URL after following all redirects.
    pub final_url: String,
    /// `Content-Disposition` of the final response, if present.
    pub content_disposition: Option<String>,
    /// `Content-Type` of the final response, if present.
    pub content_type: Option<String>,
    /// `Content-Length` of the final response, if present.
    pub content_length: Option<u64>,
}

impl ProbeResult {
    /// Result used when probing fails: the observed URL is treated as final.
    pub fn unresolved(url: &str) -> Self {
        Self {
            final_url: url.to_string(),
            content_disposition: None,
            content_type: None,
            content_length: None,
        }
    }

    /// Filename advertised by the server, if any.
    pub fn file_name(&self) -> Option<String> {
        self.content_disposition
            .as_deref()
            .and_then(parse_content_disposition_filename)
    }
}

/// Something that can resolve a URL to its redirect target.
///
/// Blocking; async callers run it under `spawn_blocking`.
pub trait HeadProber: Send + Sync {
    fn probe(&self, url: &str) -> Result<ProbeResult>;
}

/// libcurl-backed prober.
#[derive(Debug, Clone)]
pub struct CurlProber {
    timeout: Duration,
}

impl CurlProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HeadProber for CurlProber {
    fn probe(&self, url: &str) -> Result<ProbeResult> {
        let mut lines: Vec<String> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(url).context("invalid URL")?;
        easy.nobody(true)?;
        easy.follow_location(true)?;
        easy.max_redirections(MAX_REDIRECTS)?;
        easy.connect_timeout(self.timeout.min(Duration::from_secs(15)))?;
        easy.timeout(self.timeout)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.perform().context("HEAD request failed")?;
        }

        let code = easy.response_code().context("no response code")?;
        if !(200..300).contains(&code) {
            anyhow::bail!("HEAD {} returned HTTP {}", url, code);
        }

        let final_url = easy
            .effective_url()?
            .map(str::to_string)
            .unwrap_or_else(|| url.to_string());
        let headers = parse::parse_final_headers(&lines);

        Ok(ProbeResult {
            final_url,
            content_disposition: headers.content_disposition,
            content_type: headers.content_type,
            content_length: headers.content_length,
        })
    }
}

/// Probes `url` on the blocking pool. Any failure (including a panic in the
/// prober) falls back to the observed URL.
pub async fn probe_or_fallback(prober: std::sync::Arc<dyn HeadProber>, url: String) -> ProbeResult {
    let task_url = url.clone();
    match tokio::task::spawn_blocking(move || prober.probe(&task_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::debug!(url = %url, "HEAD probe failed, treating URL as final: {:#}", e);
            ProbeResult::unresolved(&url)
        }
        Err(e) => {
            tracing::warn!(url = %url, "HEAD probe task failed: {}", e);
            ProbeResult::unresolved(&url)
        }
    }
}
