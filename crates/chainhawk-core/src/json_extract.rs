//! Pull JSON objects out of mixed log + JSON tool output.
//!
//! Tools like `forge` interleave progress text with their `--json` payload.
//! Spans are found by brace balancing that ignores braces inside JSON strings.

use serde_json::Value;

/// End index (exclusive) of the balanced `{...}` span starting at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    debug_assert_eq!(bytes[start], b'{');
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every top-level JSON object embedded in `text`, in order of appearance.
pub fn json_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        match balanced_end(bytes, i) {
            Some(end) => match serde_json::from_str::<Value>(&text[i..end]) {
                Ok(value @ Value::Object(_)) => {
                    out.push(value);
                    i = end;
                }
                _ => i += 1,
            },
            None => i += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn first(text: &str) -> Option<Value> {
        json_objects(text).into_iter().next()
    }

    #[test]
    fn test_whole_text_object() {
        let v = first(r#"  {"deployedTo":"0x1"}  "#).unwrap();
        assert_eq!(v, json!({"deployedTo": "0x1"}));
    }

    #[test]
    fn test_object_wrapped_in_log_text() {
        let text = "Compiling...\n{\"deployedTo\":\"0x1111111111111111111111111111111111111111\"}\nDone";
        let v = first(text).unwrap();
        assert_eq!(
            v["deployedTo"],
            "0x1111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"log {"msg":"a } tricky { \" value","n":{"k":1}} tail"#;
        let v = first(text).unwrap();
        assert_eq!(v["msg"], "a } tricky { \" value");
        assert_eq!(v["n"]["k"], 1);
    }

    #[test]
    fn test_invalid_spans_are_skipped() {
        let text = "warn {not json} then {\"a\":1} and later {\"b\":2} end";
        assert_eq!(json_objects(text), vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_no_object() {
        assert!(first("").is_none());
        assert!(first("no braces here").is_none());
        assert!(first("unbalanced { \"a\": 1").is_none());
        assert!(first("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_nested_object_inside_garbage_span() {
        // Outer span is not JSON, inner one is.
        let text = "{ prefix {\"inner\":true} }";
        assert_eq!(first(text).unwrap(), json!({"inner": true}));
    }

    #[test]
    fn test_multibyte_text_around_object() {
        let text = "배포 중... {\"deployedTo\":\"0x2\"} 완료";
        assert_eq!(first(text).unwrap()["deployedTo"], "0x2");
    }
}
