//! Pulls assistant text out of decoded frames.
//!
//! Backends disagree on where the text lives, so each probe below checks
//! one known shape. A frame matching none of them simply carries no text.

use serde_json::Value;

type Probe = fn(&Value) -> Option<String>;

const PROBES: [Probe; 4] = [item_content, output, message, tuple_content];

/// Returns the first non-empty text found in `value`, probing the
/// `{type: "item", content}`, `{output}`, `{message}` and
/// `[message, metadata]` shapes in that order.
pub fn extract_content(value: &Value) -> Option<String> {
    PROBES
        .iter()
        .find_map(|probe| probe(value).filter(|text| !text.is_empty()))
}

/// Returns the protocol version advertised by a non-content frame.
pub fn extract_protocol_version(value: &Value) -> Option<&str> {
    version_field(value).or_else(|| version_field(value.get("metadata")?))
}

fn version_field(value: &Value) -> Option<&str> {
    const KEYS: [&str; 3] =
        ["protocol_version", "langgraph_version", "version"];
    KEYS.iter().find_map(|key| value.get(*key)?.as_str())
}

fn item_content(value: &Value) -> Option<String> {
    if value.get("type")?.as_str()? != "item" {
        return None;
    }
    text_of(value.get("content")?)
}

fn output(value: &Value) -> Option<String> {
    text_of(value.get("output")?)
}

fn message(value: &Value) -> Option<String> {
    text_of(value.get("message")?)
}

fn tuple_content(value: &Value) -> Option<String> {
    let message = value.as_array()?.first()?;
    // Echoed inputs and tool results are not assistant text.
    let kind = message.get("type").and_then(Value::as_str);
    if let Some("human" | "tool") = kind {
        return None;
    }
    text_of(message.get("content")?)
}

/// Reads text from a plain string, a list of content parts, or an object
/// wrapping either under `content`.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(_) => {
                        let ty = part.get("type").and_then(Value::as_str);
                        if ty.is_some_and(|ty| ty != "text") {
                            return None;
                        }
                        part.get("text").and_then(Value::as_str)
                    }
                    _ => None,
                })
                .collect();
            Some(text)
        }
        Value::Object(_) => text_of(value.get("content")?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_known_shapes() {
        let cases = [
            (json!({ "type": "item", "content": "a" }), Some("a")),
            (json!({ "output": "b" }), Some("b")),
            (json!({ "message": "c" }), Some("c")),
            (
                json!([{ "type": "AIMessageChunk", "content": "d" }, {}]),
                Some("d"),
            ),
            (json!({ "type": "begin", "metadata": {} }), None),
            (json!({ "type": "end" }), None),
            (json!(42), None),
        ];
        for (value, expected) in cases {
            let content = extract_content(&value);
            assert_eq!(content.as_deref(), expected, "{value}");
        }
    }

    #[test]
    fn test_empty_text_falls_through() {
        let value = json!({ "output": "", "message": "fallback" });
        assert_eq!(extract_content(&value).as_deref(), Some("fallback"));

        let value = json!({ "type": "item", "content": "" });
        assert_eq!(extract_content(&value), None);
    }

    #[test]
    fn test_content_parts() {
        let value = json!([
            {
                "type": "ai",
                "content": [
                    { "type": "text", "text": "Hello" },
                    { "type": "tool_use", "id": "x" },
                    { "type": "text", "text": " there" }
                ]
            },
            { "langgraph_node": "agent" }
        ]);
        assert_eq!(extract_content(&value).as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_skips_human_tuples() {
        let value = json!([{ "type": "human", "content": "echo" }, {}]);
        assert_eq!(extract_content(&value), None);
    }

    #[test]
    fn test_protocol_version() {
        let value = json!({ "run_id": "1", "langgraph_version": "0.2.1" });
        assert_eq!(extract_protocol_version(&value), Some("0.2.1"));
        let value = json!({ "metadata": { "version": "3" } });
        assert_eq!(extract_protocol_version(&value), Some("3"));
        assert_eq!(extract_protocol_version(&json!({})), None);
    }
}
