//! Wire protocol of the key-value service's WebSocket API.
//!
//! Every frame is a JSON object. Requests carry `op`, `key`, an optional
//! `value` and the client-assigned `messageId`; responses echo `messageId`
//! and carry either `value` or `error`.
mod message;
mod message_id;
mod value;

pub use message::{Operation, Request, Response};
pub use message_id::{MessageId, MessageIdGenerator};
pub use value::{decode_value, encode_value, merge_values};
