use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::MessageId;
use crate::{Frame, KvError, Result};

/// Operation codes understood by the key-value service.
///
/// Encoded on the wire as a small integer in the `op` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
    /// Fetch the value stored under a key.
    Get = 1,

    /// Insert or replace the value stored under a key.
    Insert = 2,

    /// Update an existing value.
    ///
    /// The typed `update` helper writes with [`Operation::Insert`] instead;
    /// this code is only sent through a raw `call`.
    Update = 3,

    /// Remove a key.
    Delete = 4,
}

impl Operation {
    // ---

    /// Numeric code sent on the wire.
    pub const fn code(self) -> u8 {
        // ---
        self as u8
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        op.code()
    }
}

impl TryFrom<u8> for Operation {
    // ---
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        // ---
        match code {
            1 => Ok(Operation::Get),
            2 => Ok(Operation::Insert),
            3 => Ok(Operation::Update),
            4 => Ok(Operation::Delete),
            other => Err(format!("unknown operation code: {other}")),
        }
    }
}

/// A request frame.
///
/// Wire shape: `{"op":2,"key":"user:1","value":"…","messageId":7}`; `value`
/// is omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    // ---
    pub op: Operation,

    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}

impl Request {
    // ---

    /// Build a request. Fails if `key` is empty.
    pub fn new(
        op: Operation,
        key: impl Into<String>,
        value: Option<Value>,
        message_id: MessageId,
    ) -> Result<Self> {
        // ---
        let key = key.into();
        if key.is_empty() {
            return Err(KvError::InvalidRequest("key must not be empty".into()));
        }

        Ok(Self {
            op,
            key,
            value,
            message_id,
        })
    }

    /// Serialize into an outbound frame.
    pub fn to_frame(&self) -> Result<Frame> {
        // ---
        let bytes = serde_json::to_vec(self)?;
        Ok(Frame::from(bytes))
    }

    /// Parse an outbound frame back into a request.
    ///
    /// Used by peers that answer requests (tests, the in-memory demo).
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        // ---
        Ok(serde_json::from_slice(frame.as_bytes())?)
    }
}

/// A response frame.
///
/// Wire shape: `{"messageId":7,"value":"…"}` or `{"messageId":7,"error":"…"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    // ---
    #[serde(rename = "messageId")]
    pub message_id: MessageId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Error indicator. When present the operation failed and `value` is
    /// not meaningful. Non-string indicators are kept as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Response {
    // ---

    /// Successful response carrying an optional value.
    pub fn ok(message_id: MessageId, value: Option<Value>) -> Self {
        // ---
        Self {
            message_id,
            value,
            error: None,
        }
    }

    /// Failed response carrying an error message.
    pub fn error(message_id: MessageId, message: impl Into<String>) -> Self {
        // ---
        Self {
            message_id,
            value: None,
            error: Some(Value::String(message.into())),
        }
    }

    /// Human readable error message, if this response is a failure.
    pub fn error_message(&self) -> Option<String> {
        // ---
        self.error.as_ref().map(|err| match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Turn the response into the caller-facing result.
    pub fn into_result(self) -> Result<Option<Value>> {
        // ---
        match self.error_message() {
            Some(message) => Err(KvError::Remote(message)),
            None => Ok(self.value),
        }
    }

    /// Parse an inbound frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        // ---
        Ok(serde_json::from_slice(frame.as_bytes())?)
    }

    /// Serialize into a frame (peer side).
    pub fn to_frame(&self) -> Result<Frame> {
        // ---
        let bytes = serde_json::to_vec(self)?;
        Ok(Frame::from(bytes))
    }
}
