use crate::catalog::FunctionId;
use crate::provenance::ProvenanceGroups;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Bitcode uploads travel hex-encoded inside a single frame, so the ceiling is generous.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub const LIST_FUNCTIONS_CMD: &str = "lfa";
pub const DECOMPILE_CMD: &str = "dec";
pub const UPLOAD_CMD: &str = "upload";

const ID_FIELD: &str = "id";
const CMD_FIELD: &str = "cmd";
const OUTPUT_FIELD: &str = "output";
const MESSAGE_FIELD: &str = "message";
const FILE_FIELD: &str = "file";

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("request payload must not carry reserved field '{0}'")]
    ReservedField(&'static str),
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// Outgoing request body. The correlation id is injected at encode time.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayload {
    fields: Map<String, Value>,
}

impl RequestPayload {
    pub fn command(cmd: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(CMD_FIELD.to_string(), Value::String(cmd.into()));
        Self { fields }
    }

    pub fn list_functions() -> Self {
        Self::command(LIST_FUNCTIONS_CMD)
    }

    pub fn decompile(function: FunctionId) -> Self {
        Self::command(format!("{DECOMPILE_CMD} {function}"))
    }

    /// The service decodes `file` from hex before loading the module.
    pub fn upload(bitcode: &[u8]) -> Self {
        Self::command(UPLOAD_CMD).with_field(FILE_FIELD, hex::encode(bitcode))
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn cmd(&self) -> Option<&str> {
        self.fields.get(CMD_FIELD).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Serializes `{id, ...payload}` as one text frame.
pub fn encode_request(
    id: RequestId,
    payload: &RequestPayload,
    max_frame_bytes: usize,
) -> Result<String, FrameError> {
    if payload.fields.contains_key(ID_FIELD) {
        return Err(FrameError::ReservedField(ID_FIELD));
    }
    let mut message = Map::with_capacity(payload.fields.len() + 1);
    message.insert(ID_FIELD.to_string(), Value::from(id));
    message.extend(payload.fields.clone());

    let encoded = serde_json::to_string(&Value::Object(message))
        .map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_inbound(frame: &str, max_frame_bytes: usize) -> Result<Value, FrameError> {
    let raw = frame.trim_end_matches(['\n', '\r']);
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_str(raw).map_err(|err| FrameError::Decode(err.to_string()))
}

/// The correlation id of an inbound message, if it carries one.
pub fn correlation_id(message: &Value) -> Option<RequestId> {
    message.get(ID_FIELD).and_then(Value::as_u64)
}

/// Text of a service push (`{"message": ...}`). Empty strings do not count.
pub fn notification_text(message: &Value) -> Option<&str> {
    message
        .get(MESSAGE_FIELD)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: RequestId,
    pub cmd: Option<String>,
    pub output: ReplyOutput,
}

impl Reply {
    pub fn from_message(id: RequestId, mut message: Value) -> Self {
        let cmd = message
            .get(CMD_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        let output = message
            .get_mut(OUTPUT_FIELD)
            .map(Value::take)
            .map(ReplyOutput::from)
            .unwrap_or_default();
        Self { id, cmd, output }
    }
}

/// Reply body, classified once at the decode boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutput {
    Decompiled(Decompilation),
    Text(String),
}

impl Default for ReplyOutput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ReplyOutput {
    /// What a terminal shows for this reply.
    pub fn terminal_text(&self) -> &str {
        match self {
            ReplyOutput::Decompiled(decompiled) => &decompiled.code,
            ReplyOutput::Text(text) => text,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ReplyOutput::Decompiled(_))
    }
}

impl From<Value> for ReplyOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => ReplyOutput::Text(text),
            Value::Null => ReplyOutput::default(),
            Value::Object(_) => match Decompilation::deserialize(&value) {
                Ok(decompiled) => ReplyOutput::Decompiled(decompiled),
                Err(_) => ReplyOutput::Text(value.to_string()),
            },
            other => ReplyOutput::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Decompilation {
    pub ir: String,
    pub code: String,
    #[serde(default)]
    pub provenance: ProvenanceGroups,
}
