//! Matching a final download URL back to the URL a page first showed us.
//!
//! The default heuristic (same host, or one URL contains the other) can
//! false-positive on short or generic URLs, so it is a configurable policy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationPolicy {
    /// Same hostname, or either URL is a substring of the other.
    #[default]
    HostOrSubstring,
    /// Same hostname only.
    HostOnly,
    /// Byte-identical URLs only.
    Exact,
}

/// Correlation tag of a URL: `host:<hostname>` when it parses with a host,
/// otherwise `raw:<url>`.
pub fn correlation_tag(url: &str) -> String {
    match url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        Some(host) => format!("host:{}", host.to_ascii_lowercase()),
        None => format!("raw:{url}"),
    }
}

fn is_host_tag(tag: &str) -> bool {
    tag.starts_with("host:")
}

impl RelationPolicy {
    /// Compares an intent (its tag and observed URL) against a final URL and its tag.
    pub fn matches(self, observed_tag: &str, observed: &str, final_tag: &str, final_url: &str) -> bool {
        let same_host = is_host_tag(observed_tag) && observed_tag == final_tag;
        match self {
            RelationPolicy::Exact => observed == final_url,
            RelationPolicy::HostOnly => same_host,
            RelationPolicy::HostOrSubstring => {
                // Both sides must be real URLs, as with the host rule.
                if !is_host_tag(observed_tag) || !is_host_tag(final_tag) {
                    return false;
                }
                same_host || observed.contains(final_url) || final_url.contains(observed)
            }
        }
    }

    pub fn related(self, observed: &str, final_url: &str) -> bool {
        self.matches(
            &correlation_tag(observed),
            observed,
            &correlation_tag(final_url),
            final_url,
        )
    }
}

/// The default relation: same hostname, or one URL contains the other.
pub fn is_related(a: &str, b: &str) -> bool {
    RelationPolicy::HostOrSubstring.related(a, b)
}
