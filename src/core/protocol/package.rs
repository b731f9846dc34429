// src/core/protocol/package.rs

//! Implements the CitrineDB frame structure and the corresponding `Encoder`
//! and `Decoder` for network communication.
//!
//! Each frame is a `u32` little-endian length prefix followed by a one-byte
//! command discriminant, a flags byte, a 16-byte correlation id, optional
//! credentials and the message payload. The decoder surfaces payload decode
//! failures as a [`PackageIn`] carrying an error, so one bad frame never
//! takes down the session; only frame-level violations are fatal.

use crate::core::errors::CitrineError;
use crate::core::protocol::message::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

/// Length of the fixed frame header after the length prefix:
/// command byte, flags byte and the correlation id.
const HEADER_LEN: usize = 1 + 1 + 16;

/// Frames larger than this are treated as a protocol violation.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Flag bit signalling that credentials follow the correlation id.
const FLAG_AUTHENTICATED: u8 = 0x01;

/// Account credentials attached to an outbound package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// An outbound package: a message plus the correlation id it travels under
/// and the credentials it is authorized with.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageOut {
    pub correlation: Uuid,
    pub message: Message,
    pub credentials: Option<Credentials>,
}

impl PackageOut {
    /// Wraps a message into a package under a freshly minted correlation id.
    pub fn new(message: Message, credentials: Option<Credentials>) -> Self {
        Self {
            correlation: Uuid::new_v4(),
            message,
            credentials,
        }
    }
}

/// An inbound package: the correlation id of the frame and either the
/// decoded message or the error that prevented decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageIn {
    pub correlation: Uuid,
    pub message: Result<Message, CitrineError>,
}

/// A `tokio_util::codec` implementation for CitrineDB frames.
#[derive(Debug, Default)]
pub struct PackageCodec;

impl Encoder<PackageOut> for PackageCodec {
    type Error = CitrineError;

    fn encode(&mut self, item: PackageOut, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(HEADER_LEN + 64);
        body.put_u8(item.message.command());
        let flags = if item.credentials.is_some() {
            FLAG_AUTHENTICATED
        } else {
            0
        };
        body.put_u8(flags);
        body.extend_from_slice(item.correlation.as_bytes());
        if let Some(credentials) = &item.credentials {
            put_credential_field(&mut body, &credentials.login)?;
            put_credential_field(&mut body, &credentials.password)?;
        }
        item.message.encode_payload(&mut body)?;

        if body.len() > MAX_FRAME_SIZE {
            return Err(CitrineError::Protocol(format!(
                "outbound frame of {} bytes exceeds limit",
                body.len()
            )));
        }
        dst.put_u32_le(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl Decoder for PackageCodec {
    type Item = PackageIn;
    type Error = CitrineError;

    /// Returns `Ok(None)` until a full frame is buffered. A frame whose
    /// declared length violates protocol limits is a fatal session error;
    /// everything past the correlation id decodes into the package payload,
    /// failures included.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > MAX_FRAME_SIZE {
            return Err(CitrineError::Protocol(format!(
                "inbound frame of {declared} bytes exceeds limit"
            )));
        }
        if declared < HEADER_LEN {
            return Err(CitrineError::Protocol(format!(
                "inbound frame of {declared} bytes is shorter than the header"
            )));
        }
        if src.len() < 4 + declared {
            src.reserve(4 + declared - src.len());
            return Ok(None);
        }
        src.advance(4);
        let mut frame = src.split_to(declared).freeze();

        let cmd = frame.get_u8();
        let flags = frame.get_u8();
        let correlation_raw = frame.split_to(16);
        let correlation = Uuid::from_slice(&correlation_raw)
            .map_err(|e| CitrineError::Protocol(format!("invalid correlation id: {e}")))?;

        let message = decode_body(cmd, flags, frame);
        Ok(Some(PackageIn {
            correlation,
            message,
        }))
    }
}

/// Skips credentials when present, then decodes the message payload.
fn decode_body(cmd: u8, flags: u8, mut frame: Bytes) -> Result<Message, CitrineError> {
    if flags & FLAG_AUTHENTICATED != 0 {
        skip_credential_field(&mut frame)?;
        skip_credential_field(&mut frame)?;
    }
    Message::decode(cmd, frame)
}

fn put_credential_field(dst: &mut BytesMut, field: &str) -> Result<(), CitrineError> {
    let len = u8::try_from(field.len()).map_err(|_| {
        CitrineError::Protocol(format!("credential field of {} bytes is too long", field.len()))
    })?;
    dst.put_u8(len);
    dst.extend_from_slice(field.as_bytes());
    Ok(())
}

fn skip_credential_field(frame: &mut Bytes) -> Result<(), CitrineError> {
    if frame.remaining() < 1 {
        return Err(CitrineError::Decode("truncated credential length".into()));
    }
    let len = frame.get_u8() as usize;
    if frame.remaining() < len {
        return Err(CitrineError::Decode("truncated credential field".into()));
    }
    frame.advance(len);
    Ok(())
}
