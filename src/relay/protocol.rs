//! Line protocol between the relay and clients.
//!
//! One part per line, `<code>:<json>`:
//!
//! | code | payload                                         |
//! |------|-------------------------------------------------|
//! | `0`  | text delta, JSON string                         |
//! | `8`  | `[{"modelName","modelId","messageId"?}]`        |
//! | `3`  | error message, JSON string                      |
//! | `d`  | `{"finishReason": ...}`                         |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnnotation {
    pub model_name: String,
    pub model_id: i32,
    /// Id of the persisted assistant row, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPart {
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    Text(String),
    Annotation(ModelAnnotation),
    Error(String),
    Finish(FinishPart),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("line has no part code: {0}")]
    MissingCode(String),
    #[error("unknown part code {0}")]
    UnknownCode(String),
    #[error("invalid payload: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Payload(err.to_string())
    }
}

impl StreamPart {
    pub fn finish(reason: impl Into<String>) -> Self {
        StreamPart::Finish(FinishPart {
            finish_reason: reason.into(),
        })
    }

    /// Encoded line including the trailing newline.
    pub fn encode(&self) -> String {
        // serializing strings and these plain structs cannot fail
        let (code, payload) = match self {
            StreamPart::Text(text) => ("0", serde_json::to_string(text)),
            StreamPart::Annotation(annotation) => ("8", serde_json::to_string(&[annotation])),
            StreamPart::Error(message) => ("3", serde_json::to_string(message)),
            StreamPart::Finish(finish) => ("d", serde_json::to_string(finish)),
        };
        format!("{}:{}\n", code, payload.unwrap_or_else(|_| "null".to_string()))
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MissingCode(line.to_string()))?;

        match code {
            "0" => Ok(StreamPart::Text(serde_json::from_str(payload)?)),
            "3" => Ok(StreamPart::Error(serde_json::from_str(payload)?)),
            "d" => Ok(StreamPart::Finish(serde_json::from_str(payload)?)),
            "8" => {
                let mut annotations: Vec<ModelAnnotation> = serde_json::from_str(payload)?;
                if annotations.is_empty() {
                    return Err(ProtocolError::Payload("empty annotation list".into()));
                }
                Ok(StreamPart::Annotation(annotations.remove(0)))
            }
            other => Err(ProtocolError::UnknownCode(other.to_string())),
        }
    }
}

/// Splits a chunked byte stream into parts. Chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamPart, ProtocolError>> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if line.trim().is_empty() {
                continue;
            }
            parts.push(StreamPart::decode(&line));
        }
        parts
    }

    /// Whatever is left once the body ended without a final newline.
    pub fn finish(self) -> Option<Result<StreamPart, ProtocolError>> {
        let rest = String::from_utf8_lossy(&self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(StreamPart::decode(&rest))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_json_escaped_on_one_line() {
        let line = StreamPart::Text("line one\n\"two\"".into()).encode();
        assert_eq!(line, "0:\"line one\\n\\\"two\\\"\"\n");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn annotation_is_a_single_element_array() {
        let part = StreamPart::Annotation(ModelAnnotation {
            model_name: "openai:gpt-4o-mini".into(),
            model_id: 2,
            message_id: Some(41),
        });
        assert_eq!(
            part.encode(),
            "8:[{\"modelName\":\"openai:gpt-4o-mini\",\"modelId\":2,\"messageId\":41}]\n"
        );
        assert_eq!(StreamPart::decode(&part.encode()), Ok(part));
    }

    #[test]
    fn annotation_without_message_id_omits_the_field() {
        let part = StreamPart::Annotation(ModelAnnotation {
            model_name: "google:gemini-pro".into(),
            model_id: 3,
            message_id: None,
        });
        assert!(!part.encode().contains("messageId"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(StreamPart::decode("hello"), Err(ProtocolError::MissingCode(_))));
        assert!(matches!(StreamPart::decode("x:1"), Err(ProtocolError::UnknownCode(_))));
        assert!(matches!(StreamPart::decode("0:not json"), Err(ProtocolError::Payload(_))));
        assert!(matches!(StreamPart::decode("8:[]"), Err(ProtocolError::Payload(_))));
    }

    #[test]
    fn decoder_reassembles_split_chunks() {
        let mut body = String::new();
        body.push_str(&StreamPart::Text("héllo".into()).encode());
        body.push_str(&StreamPart::finish("stop").encode());
        let bytes = body.as_bytes();

        let mut decoder = LineDecoder::new();
        let mut parts = Vec::new();
        // split inside the two-byte 'é'
        for chunk in [&bytes[..5], &bytes[5..9], &bytes[9..]] {
            parts.extend(decoder.push(chunk));
        }
        assert!(decoder.finish().is_none());

        let parts: Vec<StreamPart> = parts.into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(parts, vec![StreamPart::Text("héllo".into()), StreamPart::finish("stop")]);
    }
}
