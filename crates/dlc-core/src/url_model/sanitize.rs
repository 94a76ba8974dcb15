//! Filename sanitization for names proposed by pages and servers.

/// Byte limit shared by ext4 and APFS.
pub(crate) const NAME_MAX: usize = 255;

/// Sanitizes a candidate filename.
///
/// - Replaces NUL, `/`, `\`, `:` and control characters with `_`
/// - Collapses runs of replacement characters
/// - Trims leading/trailing whitespace, dots and underscores
/// - Truncates to 255 bytes on a char boundary
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_replaced = false;

    for c in name.chars() {
        if c == '\0' || c == '/' || c == '\\' || c == ':' || c.is_control() {
            if !prev_replaced {
                out.push('_');
            }
            prev_replaced = true;
        } else {
            out.push(c);
            prev_replaced = false;
        }
    }

    let trimmed = out.trim_matches(|c: char| c.is_whitespace() || c == '.' || c == '_');

    let mut out = trimmed.to_string();
    truncate_on_char_boundary(&mut out, NAME_MAX);
    out
}

/// Shortens `name` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_on_char_boundary(name: &mut String, max: usize) {
    if name.len() <= max {
        return;
    }
    let mut take = max;
    while take > 0 && !name.is_char_boundary(take) {
        take -= 1;
    }
    name.truncate(take);
}
