use crate::buffer::Batch;
use crate::domain::{Content, LogRecord};
use bytes::Bytes;
use clap::ValueEnum;
use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Protobuf encoding failed: {0}")]
    ProtobufError(#[from] prost::EncodeError),
    #[error("Batch is empty")]
    EmptyBatch,
}

/// Encoding used for the request body of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// CLS `LogGroupList` protobuf (default)
    #[default]
    Protobuf,
    /// The same tree as JSON
    Json,
}

impl PayloadFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadFormat::Protobuf => CONTENT_TYPE_PROTOBUF,
            PayloadFormat::Json => CONTENT_TYPE_JSON,
        }
    }
}

/// Serialized batch ready for upload.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Bytes,
    pub format: PayloadFormat,
    pub batch_id: String,
    pub record_count: usize,
}

impl Payload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Group of records sharing source metadata.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroup {
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<LogRecord>,
    #[prost(string, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_flow: Option<String>,
    #[prost(string, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[prost(string, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[prost(message, repeated, tag = "5")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_tags: Vec<LogTag>,
}

pub type LogTag = Content;

/// Top-level upload message.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroupList {
    #[prost(message, repeated, tag = "1")]
    pub log_group_list: Vec<LogGroup>,
}

/// Turns a batch into bytes for the wire.
#[cfg_attr(test, automock)]
pub trait BatchSerializer: Send {
    fn serialize(&self, batch: &Batch) -> Result<Payload, SerializationError>;
}

/// Encodes a batch as a single-group `LogGroupList`.
#[derive(Debug, Clone, Default)]
pub struct LogGroupSerializer {
    format: PayloadFormat,
    source: Option<String>,
    filename: Option<String>,
    log_tags: Vec<LogTag>,
}

impl LogGroupSerializer {
    pub fn new(format: PayloadFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.log_tags.push(Content::new(key, value));
        self
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    fn log_group_list(&self, batch: &Batch) -> LogGroupList {
        LogGroupList {
            log_group_list: vec![LogGroup {
                logs: batch.records().to_vec(),
                context_flow: None,
                filename: self.filename.clone(),
                source: self.source.clone(),
                log_tags: self.log_tags.clone(),
            }],
        }
    }
}

impl BatchSerializer for LogGroupSerializer {
    fn serialize(&self, batch: &Batch) -> Result<Payload, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let message = self.log_group_list(batch);
        let bytes = match self.format {
            PayloadFormat::Protobuf => {
                let mut buf = Vec::with_capacity(message.encoded_len());
                message.encode(&mut buf)?;
                buf
            }
            PayloadFormat::Json => serde_json::to_vec(&message)?,
        };

        Ok(Payload {
            bytes: Bytes::from(bytes),
            format: self.format,
            batch_id: batch.id().to_string(),
            record_count: batch.count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Accumulator;

    fn sample_batch() -> Batch {
        let mut accumulator = Accumulator::new();
        accumulator.append(LogRecord::from_message(100, "first"));
        accumulator.append(LogRecord::from_message(101, "second <b>&</b>"));
        accumulator.reset()
    }

    #[test]
    fn test_protobuf_payload_decodes_back() {
        let batch = sample_batch();
        let serializer =
            LogGroupSerializer::new(PayloadFormat::Protobuf).with_source(Some("host-a".into()));

        let payload = serializer.serialize(&batch).unwrap();
        assert_eq!(payload.content_type(), CONTENT_TYPE_PROTOBUF);
        assert_eq!(payload.record_count, 2);
        assert_eq!(payload.batch_id, batch.id());

        let decoded = LogGroupList::decode(payload.bytes.clone()).unwrap();
        assert_eq!(decoded.log_group_list.len(), 1);
        let group = &decoded.log_group_list[0];
        assert_eq!(group.source.as_deref(), Some("host-a"));
        assert_eq!(group.logs, batch.records());
    }

    #[test]
    fn test_json_payload_shape() {
        let batch = sample_batch();
        let serializer = LogGroupSerializer::new(PayloadFormat::Json).with_tag("env", "prod");

        let payload = serializer.serialize(&batch).unwrap();
        assert_eq!(payload.content_type(), CONTENT_TYPE_JSON);

        let text = std::str::from_utf8(&payload.bytes).unwrap();
        // No HTML escaping of markup characters.
        assert!(text.contains("second <b>&</b>"));

        let value: serde_json::Value = serde_json::from_slice(&payload.bytes).unwrap();
        let group = &value["logGroupList"][0];
        assert_eq!(group["logs"][0]["time"], 100);
        assert_eq!(group["logs"][1]["contents"][0]["key"], "content");
        assert_eq!(group["logTags"][0]["value"], "prod");
        assert!(group.get("source").is_none());
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let batch = Accumulator::new().reset();
        let result = LogGroupSerializer::default().serialize(&batch);
        assert!(matches!(result, Err(SerializationError::EmptyBatch)));
    }
}
