use log::debug;
use serde_json::Value;

const CONTENT_POINTER: &str = "/choices/0/delta/content";

/// Pulls `choices[0].delta.content` out of one data payload.
///
/// Returns `None` for anything that is not a usable text increment:
/// invalid JSON, heartbeat objects, role-only or finish-only deltas.
/// Only the first choice is inspected, so a malformed later choice does not
/// hide a valid first one.
pub fn extract_delta(payload: &str) -> Option<String> {
    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping unparsable frame ({}): {}", e, payload);
            return None;
        }
    };
    value
        .pointer(CONTENT_POINTER)
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_content() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        assert_eq!(extract_delta(payload), Some("Hi".to_string()));
    }

    #[test]
    fn only_first_choice_counts() {
        let payload = r#"{"choices":[{"delta":{"content":"a"}},{"delta":{"content":"b"}}]}"#;
        assert_eq!(extract_delta(payload), Some("a".to_string()));
    }

    #[test]
    fn malformed_later_choice_does_not_hide_first() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi"}},{"delta":"x"}]}"#;
        assert_eq!(extract_delta(payload), Some("Hi".to_string()));
        let payload = r#"{"choices":[{"delta":{"content":"Hi"}},7]}"#;
        assert_eq!(extract_delta(payload), Some("Hi".to_string()));
    }

    #[test]
    fn invalid_json_yields_nothing() {
        assert_eq!(extract_delta("not json"), None);
        assert_eq!(extract_delta("{\"choices\":"), None);
        assert_eq!(extract_delta("[1,2,3]"), None);
    }

    #[test]
    fn structural_mismatches_yield_nothing() {
        assert_eq!(extract_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(extract_delta(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#), None);
        assert_eq!(extract_delta(r#"{"choices":[{"delta":{"content":""}}]}"#), None);
        assert_eq!(extract_delta(r#"{"choices":[{"delta":{"content":null}}]}"#), None);
        assert_eq!(extract_delta(r#"{"choices":[]}"#), None);
        assert_eq!(extract_delta(r#"{"choices":5}"#), None);
        assert_eq!(extract_delta(r#"{"choices":[{"delta":{"content":5}}]}"#), None);
        assert_eq!(extract_delta(r#"{}"#), None);
    }
}
