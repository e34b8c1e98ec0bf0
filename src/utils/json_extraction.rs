//! JSON extraction from generation-service responses.
//!
//! Responses may wrap the payload in markdown code fences or surround it
//! with explanatory text. The extraction strategies, tried in order:
//! 1. A ```json (or generic) code fence
//! 2. Content that starts with '{' or '['
//! 3. The first balanced `{...}` or `[...]` span anywhere in the content
//!
//! Absent or malformed JSON yields `None`; callers treat that as a
//! structured-content failure for the one call, never a crash.

use regex::Regex;

/// Extracts the first parseable JSON value from a response.
pub fn extract_json(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Some(inner) = fenced_block(trimmed) {
        if let Some(value) = first_balanced_value(inner) {
            return Some(value);
        }
    }

    first_balanced_value(trimmed)
}

/// Extracts the first JSON object from a response.
pub fn extract_object(content: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    match extract_json(content)? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Extracts the first JSON array from a response.
///
/// When the first balanced span is an object rather than an array, the
/// remainder of the content is scanned for an array span. Some models
/// emit a preamble object before the requested list.
pub fn extract_array(content: &str) -> Option<Vec<serde_json::Value>> {
    let trimmed = content.trim();
    let haystack = fenced_block(trimmed).unwrap_or(trimmed);

    let start = haystack.find('[')?;
    let span = balanced_span(&haystack[start..], '[', ']')?;
    match serde_json::from_str(span) {
        Ok(serde_json::Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Returns the inner content of the first ``` code fence, if any.
fn fenced_block(content: &str) -> Option<&str> {
    let re = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    Some(caps.get(1)?.as_str().trim())
}

/// Finds the first balanced `{...}` or `[...]` span that parses as JSON.
fn first_balanced_value(content: &str) -> Option<serde_json::Value> {
    let obj_start = content.find('{');
    let arr_start = content.find('[');

    // Try whichever delimiter appears first, then fall back to the other.
    let order = match (obj_start, arr_start) {
        (Some(o), Some(a)) if o < a => [Some((o, '{', '}')), Some((a, '[', ']'))],
        (Some(o), Some(a)) => [Some((a, '[', ']')), Some((o, '{', '}'))],
        (Some(o), None) => [Some((o, '{', '}')), None],
        (None, Some(a)) => [Some((a, '[', ']')), None],
        (None, None) => return None,
    };

    for entry in order.into_iter().flatten() {
        let (start, open, close) = entry;
        if let Some(span) = balanced_span(&content[start..], open, close) {
            if let Ok(value) = serde_json::from_str(span) {
                return Some(value);
            }
        }
    }
    None
}

/// Returns the balanced span starting at the first character of `s`,
/// which must be `open`. Tracks string literals and escapes so brackets
/// inside strings do not count toward depth.
fn balanced_span(s: &str, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
