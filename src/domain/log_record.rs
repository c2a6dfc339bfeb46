use prost::Message;
use serde::{Deserialize, Serialize};

/// A single structured log record as the CLS service understands it.
///
/// Mirrors the `Log` message of the CLS protobuf schema, so the encoded length
/// used for batch accounting is exactly what ends up on the wire.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unix timestamp in seconds
    #[prost(int64, required, tag = "1")]
    pub time: i64,
    #[prost(message, repeated, tag = "2")]
    pub contents: Vec<Content>,
}

/// One key/value field of a [`LogRecord`].
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Content {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, required, tag = "2")]
    pub value: String,
}

impl Content {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl LogRecord {
    pub fn new(time: i64, contents: Vec<Content>) -> Self {
        Self { time, contents }
    }

    /// Record stamped with the current wall clock.
    pub fn now(contents: Vec<Content>) -> Self {
        Self::new(chrono::Utc::now().timestamp(), contents)
    }

    /// Plain text line, stored under the `content` key.
    pub fn from_message(time: i64, message: impl Into<String>) -> Self {
        Self::new(time, vec![Content::new("content", message)])
    }

    /// Flattens a JSON object into key/value contents.
    ///
    /// String values are stored as-is, everything else keeps its JSON text.
    /// Field order follows the object's iteration order.
    pub fn from_json_object(time: i64, object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let contents = object
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => Content::new(key.as_str(), s.as_str()),
                other => Content::new(key.as_str(), other.to_string()),
            })
            .collect();
        Self::new(time, contents)
    }

    /// Protobuf encoded length of this record.
    pub fn encoded_size(&self) -> usize {
        self.encoded_len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.contents
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_size_matches_wire_bytes() {
        let record = LogRecord::new(
            1_700_000_000,
            vec![Content::new("level", "info"), Content::new("msg", "hello")],
        );
        assert_eq!(record.encoded_size(), record.encode_to_vec().len());
    }

    #[test]
    fn json_object_keeps_non_string_values_as_json() {
        let value = serde_json::json!({"msg": "hi", "status": 200, "ok": true});
        let object = value.as_object().unwrap();
        let record = LogRecord::from_json_object(42, object);

        assert_eq!(record.time, 42);
        assert_eq!(record.get("msg"), Some("hi"));
        assert_eq!(record.get("status"), Some("200"));
        assert_eq!(record.get("ok"), Some("true"));
    }

    #[test]
    fn plain_message_uses_content_key() {
        let record = LogRecord::from_message(1, "raw line");
        assert_eq!(record.get("content"), Some("raw line"));
        assert_eq!(record.contents.len(), 1);
    }
}
