//! Binary frame encoding and decoding.
//!
//! Every WebSocket message carries exactly one frame:
//!
//! ```text
//! ┌────────────┬──────────────────┬──────────────────┐
//! │ Event type │ Body length      │ Body             │
//! │ 1 byte     │ 3 bytes uint BE  │ `length` bytes   │
//! └────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! Bodies are UTF-8 JSON except for [`FrameKind::Ping`] and
//! [`FrameKind::Pong`], which are empty.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest body the 24-bit length field can describe.
pub const MAX_BODY_LEN: usize = 0x00FF_FFFF;

// ============================================================================
// FrameKind
// ============================================================================

/// Frame event type, the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Application envelope (request, response or push).
    Normal = 0,
    /// Client heartbeat probe.
    Ping = 1,
    /// Server heartbeat answer.
    Pong = 2,
    /// Client greeting sent once the socket opens.
    Handshake = 3,
    /// Server acceptance of the handshake.
    Ready = 4,
    /// Server-forced disconnect.
    Kick = 5,
    /// Session-affinity cookie pushed by the server.
    Cookie = 6,
}

impl FrameKind {
    /// Returns the wire byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for kinds whose body is always empty.
    #[inline]
    #[must_use]
    pub const fn is_heartbeat(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Ping),
            2 => Ok(Self::Pong),
            3 => Ok(Self::Handshake),
            4 => Ok(Self::Ready),
            5 => Ok(Self::Kick),
            6 => Ok(Self::Cookie),
            other => Err(Error::unknown_frame_kind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "NORMAL",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Handshake => "HANDSHAKE",
            Self::Ready => "READY",
            Self::Kick => "KICK",
            Self::Cookie => "COOKIE",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event type.
    pub kind: FrameKind,
    /// Body bytes (length taken from the header).
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(kind: FrameKind, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Encodes this frame to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if the body exceeds [`MAX_BODY_LEN`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self.kind, &self.body)
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the body is not valid UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| Error::protocol(format!("{} body is not UTF-8: {e}", self.kind)))
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Encodes a frame: event type, 3-byte big-endian length, then body.
///
/// # Errors
///
/// Returns [`Error::FrameTooLarge`] if `body` exceeds [`MAX_BODY_LEN`].
pub fn encode(kind: FrameKind, body: &[u8]) -> Result<Vec<u8>> {
    let length = body.len();
    if length > MAX_BODY_LEN {
        return Err(Error::frame_too_large(length, MAX_BODY_LEN));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + length);
    buf.push(kind.as_u8());
    buf.extend_from_slice(&length_bytes(length));
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Encodes a header-only frame, as used for PING and PONG.
#[inline]
#[must_use]
pub const fn encode_empty(kind: FrameKind) -> [u8; HEADER_SIZE] {
    [kind.as_u8(), 0, 0, 0]
}

/// Decodes one frame from a complete message.
///
/// Bytes past `length` are ignored.
///
/// # Errors
///
/// - [`Error::Protocol`] if the header is short or the body truncated
/// - [`Error::UnknownFrameKind`] if the event type byte is outside 0–6
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::protocol(format!(
            "frame header needs {HEADER_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let kind = FrameKind::try_from(bytes[0])?;
    let length = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]) as usize;

    let body = bytes
        .get(HEADER_SIZE..HEADER_SIZE + length)
        .ok_or_else(|| {
            Error::protocol(format!(
                "{kind} frame declares {length} body bytes, got {}",
                bytes.len() - HEADER_SIZE
            ))
        })?;

    Ok(Frame::new(kind, body))
}

#[inline]
fn length_bytes(length: usize) -> [u8; 3] {
    let [_, hi, mid, lo] = (length as u32).to_be_bytes();
    [hi, mid, lo]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_encode_header_layout() {
        let bytes = encode(FrameKind::Normal, b"{}").expect("encode");
        assert_eq!(bytes, vec![0, 0, 0, 2, b'{', b'}']);
    }

    #[test]
    fn test_encode_ping_is_header_only() {
        let bytes = encode(FrameKind::Ping, &[]).expect("encode");
        assert_eq!(bytes, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_encode_empty_matches_encode() {
        let bytes = encode(FrameKind::Pong, &[]).expect("encode");
        assert_eq!(encode_empty(FrameKind::Pong).as_slice(), bytes.as_slice());
    }

    #[test]
    fn test_encode_uses_all_three_length_bytes() {
        let body = vec![b'a'; 0x01_02_03];
        let bytes = encode(FrameKind::Cookie, &body).expect("encode");
        assert_eq!(&bytes[..HEADER_SIZE], &[6, 0x01, 0x02, 0x03]);
        assert_eq!(bytes.len(), HEADER_SIZE + body.len());
    }

    #[test]
    fn test_encode_max_body() {
        let body = vec![0u8; MAX_BODY_LEN];
        let bytes = encode(FrameKind::Normal, &body).expect("encode");
        assert_eq!(&bytes[1..HEADER_SIZE], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_rejects_oversized_body() {
        let body = vec![0u8; MAX_BODY_LEN + 1];
        let err = encode(FrameKind::Normal, &body).unwrap_err();
        assert!(matches!(
            err,
            Error::FrameTooLarge {
                length,
                max: MAX_BODY_LEN
            } if length == MAX_BODY_LEN + 1
        ));
    }

    #[test]
    fn test_decode_ready() {
        let frame = decode(&[4, 0, 0, 2, b'{', b'}']).expect("decode");
        assert_eq!(frame.kind, FrameKind::Ready);
        assert_eq!(frame.text().expect("utf8"), "{}");
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let frame = decode(&[0, 0, 0, 1, b'x', b'y']).expect("decode");
        assert_eq!(frame.body, b"x");
    }

    #[test]
    fn test_decode_short_header() {
        let err = decode(&[0, 0]).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_decode_truncated_body() {
        let err = decode(&[0, 0, 0, 9, b'x']).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = decode(&[7, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::UnknownFrameKind { kind: 7 }));
    }

    #[test]
    fn test_kind_try_from_covers_protocol() {
        for byte in 0..=6u8 {
            let kind = FrameKind::try_from(byte).expect("known kind");
            assert_eq!(kind.as_u8(), byte);
        }
        assert!(FrameKind::Pong.is_heartbeat());
        assert!(!FrameKind::Kick.is_heartbeat());
    }

    #[test]
    fn test_text_rejects_invalid_utf8() {
        let frame = Frame::new(FrameKind::Normal, vec![0xFF, 0xFE]);
        assert!(frame.text().is_err());
    }

    fn any_kind() -> impl Strategy<Value = FrameKind> {
        (0u8..=6).prop_map(|b| FrameKind::try_from(b).expect("known kind"))
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            kind in any_kind(),
            body in proptest::collection::vec(any::<u8>(), 0..4096),
        ) {
            let bytes = encode(kind, &body).expect("encode");
            let frame = decode(&bytes).expect("decode");
            prop_assert_eq!(frame.kind, kind);
            prop_assert_eq!(frame.body, body);
        }
    }
}
