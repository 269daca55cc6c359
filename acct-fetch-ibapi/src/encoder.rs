//! IB TWS API message encoder.
//!
//! Encodes outgoing messages in the IB wire format: null-terminated ASCII fields
//! with a 4-byte big-endian length prefix (V100+ framing).

use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::errors::{IBApiError, Result};
use crate::protocol::{API_SIGN, HEADER_LEN, MAX_CLIENT_VER, MAX_MSG_LEN, MIN_CLIENT_VER};

/// Check if a string contains only ASCII printable characters (32-126)
/// plus tab (9), LF (10), CR (13).
fn is_ascii_printable(s: &str) -> bool {
    s.bytes()
        .all(|b| (32..127).contains(&b) || b == 9 || b == 10 || b == 13)
}

// ============================================================================
// MessageEncoder
// ============================================================================

/// Builds a single outgoing IB API message.
///
/// Fields are encoded as ASCII text followed by a null byte (0x00). The first
/// four bytes are reserved for the length header and filled in by
/// [`MessageEncoder::finalize`].
pub struct MessageEncoder {
    buf: BytesMut,
    server_version: i32,
}

impl MessageEncoder {
    pub fn new(server_version: i32) -> Self {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_bytes(0, HEADER_LEN);
        Self {
            buf,
            server_version,
        }
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    /// Write the big-endian length header and return the framed message.
    pub fn finalize(mut self) -> Result<BytesMut> {
        let msg_len = self.buf.len() - HEADER_LEN;
        if msg_len > MAX_MSG_LEN {
            return Err(IBApiError::Encoding(format!(
                "message too long: {msg_len} bytes (max {MAX_MSG_LEN})"
            )));
        }
        let len_bytes = (msg_len as u32).to_be_bytes();
        self.buf[0..HEADER_LEN].copy_from_slice(&len_bytes);
        Ok(self.buf)
    }

    // ========================================================================
    // Field encoders
    // ========================================================================

    /// Encode a string field: bytes + '\0'.
    pub fn encode_field_str(&mut self, value: &str) -> &mut Self {
        if !value.is_empty() && !is_ascii_printable(value) {
            tracing::warn!(value, "non-ASCII-printable string in field encoding");
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.put_u8(0);
        self
    }

    /// Encode an i32 field: ASCII decimal + '\0'.
    pub fn encode_field_i32(&mut self, value: i32) -> &mut Self {
        self.write_display(value);
        self.buf.put_u8(0);
        self
    }

    /// Encode a bool field: "1\0" for true, "0\0" for false.
    pub fn encode_field_bool(&mut self, value: bool) -> &mut Self {
        self.buf.extend_from_slice(if value { b"1" } else { b"0" });
        self.buf.put_u8(0);
        self
    }

    /// Encode a message id.
    ///
    /// The negotiated version range never reaches the protobuf revision, so
    /// message ids are always text fields.
    pub fn encode_msg_id(&mut self, msg_id: i32) -> &mut Self {
        self.encode_field_i32(msg_id)
    }

    fn write_display<T: fmt::Display>(&mut self, value: T) {
        let s = value.to_string();
        self.buf.extend_from_slice(s.as_bytes());
    }
}

// ============================================================================
// Connect request builder (special case, fields are not null-terminated)
// ============================================================================

/// Build the V100+ connection request bytes.
///
/// Wire format: `b"API\0"` + `[4-byte BE length]` + `b"v100..176[ connectOptions]"`.
/// The version string is not null-terminated.
pub fn build_connect_request(connect_options: Option<&str>) -> Result<BytesMut> {
    let body = format!("v{MIN_CLIENT_VER}..{MAX_CLIENT_VER}");
    let body = match connect_options {
        Some(opts) if !opts.is_empty() => format!("{body} {opts}"),
        _ => body,
    };

    let body_bytes = body.as_bytes();
    let body_len = body_bytes.len();
    if body_len > MAX_MSG_LEN {
        return Err(IBApiError::Encoding("connect request too long".into()));
    }

    let mut buf = BytesMut::with_capacity(API_SIGN.len() + HEADER_LEN + body_len);
    buf.extend_from_slice(API_SIGN);
    buf.extend_from_slice(&(body_len as u32).to_be_bytes());
    buf.extend_from_slice(body_bytes);
    Ok(buf)
}

// ============================================================================
// Tests
// ============================================================================
