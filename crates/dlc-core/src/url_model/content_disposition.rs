//! Content-Disposition header parsing (filename and filename*).

/// Extracts the filename from a raw Content-Disposition header value.
///
/// `filename*=charset'lang'percent-encoded` (RFC 5987) wins over a plain
/// `filename=` parameter; quoted values are unescaped.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.split(';').map(str::trim) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'value; the charset is informational since we decode lossily.
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                let decoded = unquote(&percent_decode(encoded));
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
            "filename" => {
                let v = unquote(value);
                if !v.is_empty() {
                    plain = Some(v);
                }
            }
            _ => {}
        }
    }

    plain
}

/// Strips surrounding quotes and backslash escapes.
fn unquote(value: &str) -> String {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    if escaped {
        out.push('\\');
    }
    out
}

/// Lossy percent-decoding; malformed escapes are kept verbatim.
pub(super) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quoted() {
        let r = parse_content_disposition_filename("attachment; filename=\"report.pdf\"");
        assert_eq!(r.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn parse_token() {
        let r = parse_content_disposition_filename("attachment; filename=report.pdf");
        assert_eq!(r.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn parse_escaped_quote() {
        let r = parse_content_disposition_filename(r#"attachment; filename="a \"b\".txt""#);
        assert_eq!(r.as_deref(), Some("a \"b\".txt"));
    }

    #[test]
    fn parse_filename_star_with_language() {
        let r = parse_content_disposition_filename("attachment; filename*=utf-8'en'caf%C3%A9.txt");
        assert_eq!(r.as_deref(), Some("café.txt"));
    }

    #[test]
    fn filename_star_takes_precedence() {
        let r = parse_content_disposition_filename(
            "attachment; filename=\"fallback.bin\"; filename*=UTF-8''real%20name.dat",
        );
        assert_eq!(r.as_deref(), Some("real name.dat"));
    }

    #[test]
    fn no_filename() {
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }

    #[test]
    fn percent_decode_keeps_malformed_escapes() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%2"), "a%2");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
