//! Data-frame codec (panic-free).
//!
//! Parsing rules:
//! - Never index (`buf[0]`) — always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.
//!
//! Frames sent server -> client are always fin=1 and unmasked. Client frames
//! may carry a 4-byte mask key; `apply_mask` undoes (or applies) it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BridgeError, Result};

/// Control-frame payloads are capped at 125 bytes by the protocol.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Close status used when the peer supplied no code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Frame opcode nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Map a wire nibble to a known opcode. Unknown values return `None`;
    /// the connection layer logs and skips those frames.
    pub fn from_wire(nibble: u8) -> Option<Opcode> {
        match nibble {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }
}

/// How the payload length is carried after the two prefix bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    /// 7-bit inline length (0..=125).
    Inline(u8),
    /// Marker 126: next 2 bytes are a big-endian u16.
    Extended16,
    /// Marker 127: next 8 bytes are a big-endian u64.
    Extended64,
}

impl LengthField {
    /// Number of extra length bytes to read after the prefix.
    pub fn extra_bytes(self) -> usize {
        match self {
            LengthField::Inline(_) => 0,
            LengthField::Extended16 => 2,
            LengthField::Extended64 => 8,
        }
    }
}

/// Decoded two-byte frame prefix.
#[derive(Debug, Clone, Copy)]
pub struct FramePrefix {
    pub fin: bool,
    /// Known opcode, or `None` for nibbles outside the RFC set.
    pub opcode: Option<Opcode>,
    /// Raw opcode nibble, kept for diagnostics.
    pub raw_opcode: u8,
    pub masked: bool,
    pub length: LengthField,
}

/// Decode the fixed two-byte frame prefix.
pub fn decode_prefix(b0: u8, b1: u8) -> FramePrefix {
    let raw_opcode = b0 & 0x0F;
    let len7 = b1 & 0x7F;
    FramePrefix {
        fin: b0 & 0x80 != 0,
        opcode: Opcode::from_wire(raw_opcode),
        raw_opcode,
        masked: b1 & 0x80 != 0,
        length: match len7 {
            126 => LengthField::Extended16,
            127 => LengthField::Extended64,
            n => LengthField::Inline(n),
        },
    }
}

/// Resolve the real payload length from the extension bytes that follow the
/// prefix. `extra` must hold exactly `field.extra_bytes()` bytes.
pub fn extended_length(field: LengthField, extra: &[u8]) -> Result<u64> {
    let mut buf = extra;
    match field {
        LengthField::Inline(n) => Ok(u64::from(n)),
        LengthField::Extended16 => {
            if buf.remaining() < 2 {
                return Err(BridgeError::Protocol("truncated 16-bit length".into()));
            }
            Ok(u64::from(buf.get_u16()))
        }
        LengthField::Extended64 => {
            if buf.remaining() < 8 {
                return Err(BridgeError::Protocol("truncated 64-bit length".into()));
            }
            Ok(buf.get_u64())
        }
    }
}

/// XOR the payload with the 4-byte mask key. Involution: applying twice with
/// the same key restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

fn put_header(out: &mut BytesMut, opcode: Opcode, payload_len: usize) {
    out.put_u8(0x80 | opcode as u8);
    if payload_len <= 125 {
        out.put_u8(payload_len as u8);
    } else if payload_len <= u16::MAX as usize {
        out.put_u8(126);
        out.put_u16(payload_len as u16);
    } else {
        out.put_u8(127);
        out.put_u64(payload_len as u64);
    }
}

/// Encode a fin=1, unmasked text frame.
pub fn encode_text(text: &str) -> Bytes {
    let bytes = text.as_bytes();
    let mut out = BytesMut::with_capacity(10 + bytes.len());
    put_header(&mut out, Opcode::Text, bytes.len());
    out.put_slice(bytes);
    out.freeze()
}

/// Encode a fin=1, unmasked binary frame.
pub fn encode_binary(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(10 + data.len());
    put_header(&mut out, Opcode::Binary, data.len());
    out.put_slice(data);
    out.freeze()
}

/// Encode a close frame: 2-byte big-endian status code plus an optional
/// UTF-8 reason. Rejects reasons that would push the control payload past
/// 125 bytes; truncating a reason silently is not allowed.
pub fn encode_close(code: u16, reason: Option<&str>) -> Result<Bytes> {
    let reason = reason.unwrap_or("");
    if 2 + reason.len() > MAX_CONTROL_PAYLOAD {
        return Err(BridgeError::Protocol(format!(
            "close reason is {} bytes, control payload limit is {}",
            reason.len(),
            MAX_CONTROL_PAYLOAD - 2
        )));
    }
    let mut out = BytesMut::with_capacity(4 + reason.len());
    put_header(&mut out, Opcode::Close, 2 + reason.len());
    out.put_u16(code);
    out.put_slice(reason.as_bytes());
    Ok(out.freeze())
}

/// Encode a ping frame. The payload is typically empty; echoed payloads are
/// bounded by the control-frame limit.
pub fn encode_ping(payload: &[u8]) -> Result<Bytes> {
    encode_control(Opcode::Ping, payload)
}

/// Encode a pong frame carrying the payload of the ping it answers.
pub fn encode_pong(payload: &[u8]) -> Result<Bytes> {
    encode_control(Opcode::Pong, payload)
}

fn encode_control(opcode: Opcode, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_CONTROL_PAYLOAD {
        return Err(BridgeError::Protocol(format!(
            "control payload is {} bytes, limit is {}",
            payload.len(),
            MAX_CONTROL_PAYLOAD
        )));
    }
    let mut out = BytesMut::with_capacity(2 + payload.len());
    put_header(&mut out, opcode, payload.len());
    out.put_slice(payload);
    Ok(out.freeze())
}

/// Decode an (already unmasked) close payload into code and reason.
/// Payloads shorter than two bytes mean "no status" (1005).
pub fn decode_close(payload: &[u8]) -> (u16, Option<String>) {
    let mut buf = payload;
    if buf.remaining() < 2 {
        return (CLOSE_NO_STATUS, None);
    }
    let code = buf.get_u16();
    if buf.is_empty() {
        (code, None)
    } else {
        (code, Some(String::from_utf8_lossy(buf).into_owned()))
    }
}
