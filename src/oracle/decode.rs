//! Strict decoding of JSON payloads embedded in free text.

use serde::de::DeserializeOwned;

/// Outcome of decoding an oracle response
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Parsed(T),
    Failed(String),
}

impl<T> Decoded<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Parsed(value) => Some(value),
            Decoded::Failed(_) => None,
        }
    }
}

/// Locate the JSON object in a response: from the first `{` to the last `}`.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Decode the first embedded JSON object into `T`
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Decoded<T> {
    let Some(span) = extract_json_span(text) else {
        return Decoded::Failed("no JSON object found in response".to_string());
    };
    match serde_json::from_str(span) {
        Ok(value) => Decoded::Parsed(value),
        Err(e) => Decoded::Failed(format!("invalid JSON in response: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_extract_span_ignores_prose() {
        let text = "Sure! Here you go:\n```json\n{\"match\": [\"ok\"]}\n```\nAnything else?";
        assert_eq!(extract_json_span(text), Some("{\"match\": [\"ok\"]}"));
    }

    #[test]
    fn test_decode_failures_are_tagged() {
        assert!(matches!(decode_json::<Value>("no braces here"), Decoded::Failed(_)));
        assert!(matches!(decode_json::<Value>("} backwards {"), Decoded::Failed(_)));
        assert!(matches!(decode_json::<Value>("{not: json}"), Decoded::Failed(_)));
    }

    #[test]
    fn test_decode_nested_object() {
        let decoded = decode_json::<Value>("result: {\"a\": {\"b\": 1}} done");
        assert_eq!(decoded.ok().unwrap()["a"]["b"], 1);
    }
}
