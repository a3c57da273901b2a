use serde_json::Value;

type Strategy = fn(&str) -> Option<Vec<Value>>;

/// Tried in order against fence-stripped text once the raw decode failed.
const FALLBACKS: [Strategy; 3] = [decode_document, array_slice, wrapper_slice];

/// Extract a findings array from model output.
///
/// Order matters: raw decode (array or `{"findings": [...]}`), then the same
/// after stripping code fences, then the outermost `[`..`]` slice, then the
/// outermost `{`..`}` slice as a wrapper object.
pub fn parse_findings(text: &str) -> Option<Vec<Value>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(found) = decode_document(text) {
        return Some(found);
    }
    let stripped = strip_fences(text);
    FALLBACKS.iter().find_map(|strategy| strategy(&stripped))
}

fn decode_document(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => Some(items),
        Value::Object(map) => unwrap_findings(map),
        _ => None,
    }
}

fn unwrap_findings(mut map: serde_json::Map<String, Value>) -> Option<Vec<Value>> {
    match map.remove("findings") {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn array_slice(text: &str) -> Option<Vec<Value>> {
    let slice = outer_slice(text, '[', ']')?;
    match serde_json::from_str::<Value>(slice).ok()? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn wrapper_slice(text: &str) -> Option<Vec<Value>> {
    let slice = outer_slice(text, '{', '}')?;
    match serde_json::from_str::<Value>(slice).ok()? {
        Value::Object(map) => unwrap_findings(map),
        _ => None,
    }
}

fn outer_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Drop every ``` marker, along with a `json` language tag right after it.
fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            rest = &rest[4..];
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
