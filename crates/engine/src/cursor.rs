//! Cursor codec
//!
//! A cursor is the key of the last row a page returned, as an opaque token:
//! URL-safe base64 (no padding) over a versioned JSON payload
//! `{"v":1,"key":{column: Value}}`. Values keep their variant tag, so a
//! decoded key has exactly the shape that was encoded.
//!
//! Decoding never guesses. Anything that is not a well-formed token of a
//! known version is a [`CursorDecodeError`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use widemap_core::{CursorDecodeError, Error, PrimaryKeyPredicate, Result, SchemaDescriptor, Value};

/// Payload version written by this codec
pub const CURSOR_VERSION: u8 = 1;

/// Default bound on untrusted token length
pub const MAX_CURSOR_LEN: usize = 8 * 1024;

#[derive(Serialize)]
struct Payload<'a> {
    v: u8,
    key: BTreeMap<&'a str, &'a Value>,
}

#[derive(Deserialize)]
struct Envelope {
    v: u8,
    #[serde(default)]
    key: Option<serde_json::Value>,
}

/// Encodes and decodes pagination cursors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorCodec {
    max_len: usize,
}

impl Default for CursorCodec {
    fn default() -> Self {
        Self::new(MAX_CURSOR_LEN)
    }
}

impl CursorCodec {
    /// Codec rejecting tokens longer than `max_len`
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Longest token accepted
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Encode a key snapshot as a token
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when a value cannot be represented (non-finite float).
    pub fn encode(&self, key: &PrimaryKeyPredicate) -> Result<String> {
        let payload = Payload {
            v: CURSOR_VERSION,
            key: key.iter().collect(),
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| Error::InvalidArgument(format!("cursor key not encodable: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a token back into the key snapshot it was built from
    ///
    /// Surrounding whitespace is trimmed.
    pub fn decode(
        &self,
        token: &str,
    ) -> std::result::Result<PrimaryKeyPredicate, CursorDecodeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CursorDecodeError::Empty);
        }
        if token.len() > self.max_len {
            return Err(CursorDecodeError::TooLong {
                len: token.len(),
                max: self.max_len,
            });
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| CursorDecodeError::Transport(e.to_string()))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| CursorDecodeError::Payload(e.to_string()))?;
        if envelope.v != CURSOR_VERSION {
            return Err(CursorDecodeError::UnsupportedVersion(envelope.v));
        }
        let key = envelope
            .key
            .ok_or_else(|| CursorDecodeError::Payload("missing key".to_string()))?;
        let key: BTreeMap<String, Value> =
            serde_json::from_value(key).map_err(|e| CursorDecodeError::Payload(e.to_string()))?;
        Ok(key.into_iter().collect())
    }

    /// Decode a token and check it can resume a query over `schema`
    ///
    /// The key must bind every primary-key column and nothing else, and
    /// must agree with the bound prefix of `predicate`. Bindings after the
    /// first unbound column do not narrow the scan, so they are not checked.
    pub fn decode_for(
        &self,
        token: &str,
        schema: &SchemaDescriptor,
        predicate: &PrimaryKeyPredicate,
    ) -> std::result::Result<PrimaryKeyPredicate, CursorDecodeError> {
        let key = self.decode(token)?;

        for (column, _) in key.iter() {
            if !schema.is_key_column(column) {
                return Err(CursorDecodeError::Mismatch(format!(
                    "'{column}' is not a primary-key column of '{}'",
                    schema.entity()
                )));
            }
        }
        if let Some(missing) = key.first_missing(schema) {
            return Err(CursorDecodeError::Mismatch(format!(
                "cursor does not bind primary-key column '{missing}'"
            )));
        }
        let bound = predicate.bound_prefix_len(schema);
        for column in &schema.primary_key()[..bound] {
            let column = column.name.as_str();
            if key.get(column) != predicate.get(column) {
                return Err(CursorDecodeError::Mismatch(format!(
                    "cursor disagrees with the query on '{column}'"
                )));
            }
        }
        Ok(key)
    }
}

/// Encode with the default codec
pub fn encode_cursor(key: &PrimaryKeyPredicate) -> Result<String> {
    CursorCodec::default().encode(key)
}

/// Decode with the default codec
pub fn decode_cursor(token: &str) -> std::result::Result<PrimaryKeyPredicate, CursorDecodeError> {
    CursorCodec::default().decode(token)
}
