//! JSON wire codec for signaling payloads.
//!
//! A payload is an object of the form `{"op": "<Variant>", "d": { ... }}`. Decoding never
//! panics; every failure is reported as a [`DecodeError`] so callers can drop the payload.

use crate::model::{RelayFrame, SignalingMessage};
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no \"op\" tag")]
    MissingOp,

    #[error("unknown op {0:?}")]
    UnknownOp(String),

    #[error("field {0:?} must not be empty")]
    EmptyField(&'static str),
}

pub fn encode(message: &SignalingMessage) -> Bytes {
    match serde_json::to_vec(message) {
        Ok(payload) => Bytes::from(payload),
        Err(e) => {
            error!("Failed to encode {} from {}: {}", message.op(), message.from(), e);
            Bytes::new()
        }
    }
}

pub fn decode(payload: &[u8]) -> Result<SignalingMessage, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let op = op_tag(&value)?;
    if !SignalingMessage::OPS.contains(&op) {
        return Err(DecodeError::UnknownOp(op.to_owned()));
    }

    let message: SignalingMessage = serde_json::from_value(value)?;
    validate(&message)?;
    Ok(message)
}

pub fn encode_frame(frame: &RelayFrame) -> String {
    match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode relay frame: {}", e);
            String::new()
        }
    }
}

pub fn decode_frame(payload: &[u8]) -> Result<RelayFrame, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    op_tag(&value)?;
    let frame: RelayFrame = serde_json::from_value(value)?;
    if let RelayFrame::Signal { message } = &frame {
        validate(message)?;
    }
    Ok(frame)
}

fn op_tag(value: &Value) -> Result<&str, DecodeError> {
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    object
        .get("op")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingOp)
}

fn validate(message: &SignalingMessage) -> Result<(), DecodeError> {
    if message.from().is_empty() {
        return Err(DecodeError::EmptyField("from"));
    }
    if message.to().is_some_and(|to| to.is_empty()) {
        return Err(DecodeError::EmptyField("to"));
    }
    Ok(())
}
