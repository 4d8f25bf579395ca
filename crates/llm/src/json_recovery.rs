//! Balanced-brace JSON recovery for LLM planner replies (spec.md 4.4):
//! extract the first balanced `{...}`, respecting string literals and
//! escapes, trim trailing/duplicate commas, and revalidate.

use gf_domain::error::{Error, Result};

/// Extract the first top-level balanced `{...}` span from `text`,
/// scanning outside of string literals (so braces inside quoted
/// strings never affect the depth count).
fn extract_first_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Trim a trailing comma immediately before a closing `}`/`]`, and
/// collapse a run of consecutive commas into one. This is a
/// character-level pass, not a JSON parser, so it only ever removes
/// characters that would otherwise cause a parse error.
fn trim_bad_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }

        if c == ',' {
            // Drop this comma if the next significant character (skipping
            // only whitespace) is another comma or a closing bracket —
            // that covers both trailing commas and duplicate runs, one
            // comma at a time.
            let mut lookahead = chars.clone();
            let next_significant = loop {
                match lookahead.peek() {
                    Some(n) if n.is_whitespace() => {
                        lookahead.next();
                    }
                    other => break other.copied(),
                }
            };
            if matches!(next_significant, Some(',') | Some('}') | Some(']')) {
                continue;
            }
        }

        out.push(c);
    }
    out
}

/// Recover a JSON object from a raw LLM reply. Returns a parsed
/// [`serde_json::Value`] on success.
pub fn recover_json_object(raw: &str) -> Result<serde_json::Value> {
    let candidate = extract_first_object(raw)
        .ok_or_else(|| Error::Planning("no balanced JSON object found in reply".into()))?;

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
        return Ok(value);
    }

    let cleaned = trim_bad_commas(candidate);
    serde_json::from_str::<serde_json::Value>(&cleaned)
        .map_err(|e| Error::Planning(format!("unparseable planner reply after recovery: {e}")))
}
