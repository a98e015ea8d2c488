// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque value payloads and the value ↔ payload converter.
//!
//! The engine never interprets payload contents; everything that crosses a
//! turn boundary (activity inputs and results, signal arguments, workflow
//! results) is carried as a [`Payload`] and decoded at the edge that knows
//! the concrete type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type tag for JSON-encoded payloads.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// An opaque serialized value plus its content-type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub content_type: String,
    pub data: String,
}

impl Payload {
    /// The canonical encoding of "no value".
    pub fn null() -> Self {
        Self { content_type: CONTENT_TYPE_JSON.to_string(), data: "null".to_string() }
    }
}

/// Errors from converting values to and from payloads
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("encoding value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decoding payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unsupported payload content type: {0}")]
    ContentType(String),
}

/// Encode a value into a JSON payload.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Payload, PayloadError> {
    let data = serde_json::to_string(value).map_err(PayloadError::Encode)?;
    Ok(Payload { content_type: CONTENT_TYPE_JSON.to_string(), data })
}

/// Decode a payload back into a value.
pub fn from_payload<T: DeserializeOwned>(payload: &Payload) -> Result<T, PayloadError> {
    if payload.content_type != CONTENT_TYPE_JSON {
        return Err(PayloadError::ContentType(payload.content_type.clone()));
    }
    serde_json::from_str(&payload.data).map_err(PayloadError::Decode)
}

/// Encode a list of argument values into payloads.
///
/// ```ignore
/// let inputs = payloads![35, 12]?;
/// ```
#[macro_export]
macro_rules! payloads {
    () => { Ok::<Vec<$crate::payload::Payload>, $crate::payload::PayloadError>(Vec::new()) };
    ($($value:expr),+ $(,)?) => {
        (|| -> Result<Vec<$crate::payload::Payload>, $crate::payload::PayloadError> {
            Ok(vec![$($crate::payload::to_payload(&$value)?),+])
        })()
    };
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
