//! Parse collected HTTP header lines, keeping only the last response of a redirect chain.

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct FinalHeaders {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// libcurl hands us the headers of every hop; a status line starts a new response.
pub(crate) fn parse_final_headers(lines: &[String]) -> FinalHeaders {
    let mut out = FinalHeaders::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            out = FinalHeaders::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            out.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("content-type") {
            out.content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            out.content_disposition = Some(value.to_string());
        }
    }

    out
}
