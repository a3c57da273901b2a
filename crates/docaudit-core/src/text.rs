//! Small text helpers shared by the normalizer and the model client.

/// Remove HTML-like tags (`<b>`, `</p>`, `<!-- -->`, `<?xml ?>`) and trim.
///
/// A `<` that does not open a tag (`a < b`) is kept verbatim.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            let opens_tag = matches!(chars.peek(), Some(n) if n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'));
            if opens_tag {
                for skipped in chars.by_ref() {
                    if skipped == '>' {
                        break;
                    }
                }
                continue;
            }
        }
        out.push(c);
    }
    out.trim().to_string()
}

/// First `limit` characters of `input` (not bytes).
pub fn truncate_chars(input: &str, limit: usize) -> String {
    match input.char_indices().nth(limit) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

/// Collapse whitespace runs to single spaces, trim, then truncate.
pub fn clip(input: &str, limit: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, limit)
}
