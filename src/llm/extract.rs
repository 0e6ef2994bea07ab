use serde_json::Value;
use tracing::debug;

/// Pull a JSON object out of free-form model output.
///
/// Models are not contractually bound to a response format: some wrap the
/// object in a ```json fence, some emit it bare inside prose. Two strategies
/// are tried in order — the fenced block, then the first balanced brace span.
/// Malformed contents never raise; they resolve to `None`.
pub fn extract_json(raw: &str) -> Option<Value> {
    if let Some(block) = fenced_block(raw) {
        if let Ok(value) = serde_json::from_str(block.trim()) {
            return Some(value);
        }
        debug!("fenced block did not parse as JSON, trying bare object span");
    }

    let span = object_span(raw)?;
    serde_json::from_str(span).ok()
}

fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```json")? + "```json".len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// First balanced `{...}` span, tracking string literals so braces inside
/// quoted values do not confuse the depth counter.
fn object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_fenced_block() {
        let raw = "Sure! Here you go:\n```json\n{\"intent\": \"weather\", \"location\": \"Tokyo\"}\n```\nLet me know if you need more.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["intent"], json!("weather"));
        assert_eq!(value["location"], json!("Tokyo"));
    }

    #[test]
    fn extracts_bare_object_from_prose() {
        let raw = "The classification is {\"intent\": \"news\", \"topic\": \"markets\"} as requested.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["intent"], json!("news"));
    }

    #[test]
    fn idempotent_on_clean_json() {
        let clean = r#"{"intent": "general", "location": "", "topic": ""}"#;
        let expected: Value = serde_json::from_str(clean).unwrap();
        assert_eq!(extract_json(clean), Some(expected));
    }

    #[test]
    fn handles_nested_objects_and_braces_in_strings() {
        let raw = r#"noise {"outer": {"inner": "has } brace"}} trailing"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["outer"]["inner"], json!("has } brace"));
    }

    #[test]
    fn none_on_plain_text() {
        assert_eq!(extract_json("no structure here at all"), None);
    }

    #[test]
    fn none_on_empty_input() {
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn none_on_unbalanced_braces() {
        assert_eq!(extract_json("{\"intent\": \"weather\""), None);
    }

    #[test]
    fn none_on_malformed_contents() {
        assert_eq!(extract_json("{\"intent\": }"), None);
        assert_eq!(extract_json("```json\nnot json\n```"), None);
    }
}
