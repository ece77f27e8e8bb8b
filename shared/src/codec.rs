//! Opcode-indexed binary codec framework
//!
//! A frame on the wire is `[opcode: u8][payload]`. Each message type is
//! handled by exactly one [`MessageCodec`], and the [`CodecRegistry`] maps
//! opcodes to codecs. The registry is assembled once at startup and then
//! shared read-only, so concurrent encode/decode needs no locking.

use crate::codecs::{
    ChatCodec, ExperienceCodec, KeepAliveCodec, KickCodec, LoginAcceptedCodec, LoginCodec,
    PositionLookCodec,
};
use crate::messages::Packet;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Longest string, in UTF-8 bytes, a string field may carry
pub const MAX_STRING_LEN: usize = 32767;

/// Failures raised while registering, encoding or decoding messages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes were available than the message requires. The stream is
    /// desynchronized and the connection should be closed.
    #[error("message 0x{opcode:02X} needs {needed} more bytes but only {available} are available")]
    BufferUnderflow {
        opcode: u8,
        needed: usize,
        available: usize,
    },

    #[error("{remaining} trailing bytes after message 0x{opcode:02X}")]
    TrailingBytes { opcode: u8, remaining: usize },

    #[error("no codec registered for opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Two codecs were registered for the same opcode
    #[error("opcode 0x{0:02X} is already bound to a codec")]
    DuplicateOpcode(u8),

    #[error("codec for opcode 0x{expected:02X} cannot encode a {found} message")]
    MessageMismatch { expected: u8, found: &'static str },

    #[error("frame is empty")]
    EmptyFrame,

    #[error("string of {0} bytes exceeds the protocol limit")]
    StringTooLong(usize),

    #[error("message 0x{opcode:02X} declares a {len} byte string, over the protocol limit")]
    DeclaredStringTooLong { opcode: u8, len: usize },

    #[error("string field of message 0x{0:02X} is not valid UTF-8")]
    InvalidUtf8(u8),
}

impl CodecError {
    /// True when the peer sent bytes the decoder could not make sense of
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            CodecError::BufferUnderflow { .. }
                | CodecError::TrailingBytes { .. }
                | CodecError::UnknownOpcode(_)
                | CodecError::EmptyFrame
                | CodecError::InvalidUtf8(_)
                | CodecError::DeclaredStringTooLong { .. }
        )
    }
}

/// Serializer and deserializer for a single message type
pub trait MessageCodec: Send + Sync {
    /// Opcode this codec is bound to
    fn opcode(&self) -> u8;

    /// Payload length for messages whose size never depends on field values
    fn fixed_len(&self) -> Option<usize> {
        None
    }

    /// Writes the payload of `packet` (without the opcode) into `dst`
    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Reads one message payload from the front of `src`
    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError>;
}

/// Mapping from opcode to codec
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<u8, Arc<dyn MessageCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding a codec for every message in [`crate::messages`]
    pub fn standard() -> Result<Self, CodecError> {
        let mut registry = Self::new();
        registry
            .register(KeepAliveCodec)?
            .register(LoginCodec)?
            .register(LoginAcceptedCodec)?
            .register(ChatCodec)?
            .register(PositionLookCodec)?
            .register(ExperienceCodec)?
            .register(KickCodec)?;
        Ok(registry)
    }

    /// Binds the codec's opcode to it
    ///
    /// Fails with [`CodecError::DuplicateOpcode`] if the opcode is already
    /// bound; the existing binding is left untouched.
    pub fn register<C>(&mut self, codec: C) -> Result<&mut Self, CodecError>
    where
        C: MessageCodec + 'static,
    {
        let opcode = codec.opcode();
        if self.codecs.contains_key(&opcode) {
            return Err(CodecError::DuplicateOpcode(opcode));
        }
        self.codecs.insert(opcode, Arc::new(codec));
        Ok(self)
    }

    pub fn contains(&self, opcode: u8) -> bool {
        self.codecs.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    fn lookup(&self, opcode: u8) -> Result<&Arc<dyn MessageCodec>, CodecError> {
        self.codecs
            .get(&opcode)
            .ok_or(CodecError::UnknownOpcode(opcode))
    }

    /// Encodes `packet` as an opcode-tagged frame
    pub fn encode(&self, packet: &Packet) -> Result<Bytes, CodecError> {
        let codec = self.lookup(packet.opcode())?;
        let mut dst = BytesMut::with_capacity(1 + codec.fixed_len().unwrap_or(64));
        dst.put_u8(codec.opcode());
        codec.encode(packet, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Decodes exactly one message payload for `opcode`
    pub fn decode(&self, opcode: u8, mut payload: Bytes) -> Result<Packet, CodecError> {
        let codec = self.lookup(opcode)?;

        if let Some(needed) = codec.fixed_len() {
            if payload.len() < needed {
                return Err(CodecError::BufferUnderflow {
                    opcode,
                    needed,
                    available: payload.len(),
                });
            }
        }

        let packet = codec.decode(&mut payload)?;

        if payload.has_remaining() {
            return Err(CodecError::TrailingBytes {
                opcode,
                remaining: payload.remaining(),
            });
        }

        Ok(packet)
    }

    /// Decodes a complete `[opcode][payload]` frame
    pub fn decode_frame(&self, frame: &[u8]) -> Result<Packet, CodecError> {
        let (&opcode, payload) = frame.split_first().ok_or(CodecError::EmptyFrame)?;
        self.decode(opcode, Bytes::copy_from_slice(payload))
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<u8> = self.codecs.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("opcodes", &opcodes)
            .finish()
    }
}

/// Fails with [`CodecError::BufferUnderflow`] unless `needed` bytes remain
pub fn ensure_remaining(src: &Bytes, opcode: u8, needed: usize) -> Result<(), CodecError> {
    if src.remaining() < needed {
        return Err(CodecError::BufferUnderflow {
            opcode,
            needed,
            available: src.remaining(),
        });
    }
    Ok(())
}

/// Writes a `u16` length-prefixed UTF-8 string
pub fn put_string(dst: &mut BytesMut, value: &str) -> Result<(), CodecError> {
    let len = value.len();
    if len > MAX_STRING_LEN {
        return Err(CodecError::StringTooLong(len));
    }
    dst.put_u16(len as u16);
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Reads a `u16` length-prefixed UTF-8 string
pub fn get_string(src: &mut Bytes, opcode: u8) -> Result<String, CodecError> {
    ensure_remaining(src, opcode, 2)?;
    let len = src.get_u16() as usize;
    if len > MAX_STRING_LEN {
        return Err(CodecError::DeclaredStringTooLong { opcode, len });
    }
    ensure_remaining(src, opcode, len)?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8(opcode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ChatMessage, ExperienceMessage, KickMessage, LoginMessage};

    struct ShadowExperienceCodec;

    impl MessageCodec for ShadowExperienceCodec {
        fn opcode(&self) -> u8 {
            ExperienceMessage::OPCODE
        }

        fn encode(&self, _packet: &Packet, _dst: &mut BytesMut) -> Result<(), CodecError> {
            Ok(())
        }

        fn decode(&self, _src: &mut Bytes) -> Result<Packet, CodecError> {
            Ok(Packet::Chat(ChatMessage::new("shadow")))
        }
    }

    #[test]
    fn test_standard_registry_covers_all_messages() {
        let registry = CodecRegistry::standard().unwrap();
        assert_eq!(registry.len(), 7);
        for opcode in [0x00, 0x01, 0x02, 0x03, 0x0D, 0x2B, 0xFF] {
            assert!(registry.contains(opcode), "missing 0x{:02X}", opcode);
        }
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = CodecRegistry::standard().unwrap();
        let result = registry.register(ShadowExperienceCodec);
        assert!(matches!(result, Err(CodecError::DuplicateOpcode(0x2B))));

        // Original binding survives
        let packet = registry
            .decode(0x2B, Bytes::from_static(&[0x3F, 0x40, 0, 0, 0, 0x0A, 0x03, 0xE8]))
            .unwrap();
        assert!(matches!(packet, Packet::Experience(_)));
    }

    #[test]
    fn test_encode_prefixes_opcode() {
        let registry = CodecRegistry::standard().unwrap();
        let frame = registry
            .encode(&Packet::Kick(KickMessage::new("Kicked")))
            .unwrap();
        assert_eq!(frame[0], 0xFF);
        assert_eq!(&frame[1..3], &[0x00, 0x06]);
        assert_eq!(&frame[3..], b"Kicked");
    }

    #[test]
    fn test_unknown_opcode() {
        let registry = CodecRegistry::standard().unwrap();
        let result = registry.decode(0x7E, Bytes::new());
        assert_eq!(result, Err(CodecError::UnknownOpcode(0x7E)));

        let empty = CodecRegistry::new();
        let result = empty.encode(&Packet::Chat(ChatMessage::new("hi")));
        assert_eq!(result, Err(CodecError::UnknownOpcode(0x03)));
    }

    #[test]
    fn test_fixed_length_underflow() {
        let registry = CodecRegistry::standard().unwrap();
        let result = registry.decode(0x2B, Bytes::from_static(&[0x3F, 0x40, 0x00]));
        assert_eq!(
            result,
            Err(CodecError::BufferUnderflow {
                opcode: 0x2B,
                needed: 8,
                available: 3,
            })
        );
        assert!(result.unwrap_err().is_desync());
    }

    #[test]
    fn test_string_underflow() {
        let registry = CodecRegistry::standard().unwrap();
        // Declares 5 bytes of text, carries 2
        let result = registry.decode(0x03, Bytes::from_static(&[0x00, 0x05, b'h', b'i']));
        assert_eq!(
            result,
            Err(CodecError::BufferUnderflow {
                opcode: 0x03,
                needed: 5,
                available: 2,
            })
        );

        let result = registry.decode(0x03, Bytes::from_static(&[0x00]));
        assert!(matches!(result, Err(CodecError::BufferUnderflow { .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let registry = CodecRegistry::standard().unwrap();
        let result = registry.decode(0x00, Bytes::from_static(&[0, 0, 0, 1, 9]));
        assert_eq!(
            result,
            Err(CodecError::TrailingBytes {
                opcode: 0x00,
                remaining: 1,
            })
        );
    }

    #[test]
    fn test_decode_frame() {
        let registry = CodecRegistry::standard().unwrap();
        let login = Packet::Login(LoginMessage {
            protocol_version: 1,
            name: "notch".to_string(),
        });
        let frame = registry.encode(&login).unwrap();
        assert_eq!(registry.decode_frame(&frame).unwrap(), login);
        assert_eq!(registry.decode_frame(&[]), Err(CodecError::EmptyFrame));
    }

    #[test]
    fn test_invalid_utf8() {
        let registry = CodecRegistry::standard().unwrap();
        let result = registry.decode(0x03, Bytes::from_static(&[0x00, 0x02, 0xC3, 0x28]));
        assert_eq!(result, Err(CodecError::InvalidUtf8(0x03)));
    }

    #[test]
    fn test_string_too_long() {
        let mut dst = BytesMut::new();
        let long = "x".repeat(MAX_STRING_LEN + 1);
        assert_eq!(
            put_string(&mut dst, &long),
            Err(CodecError::StringTooLong(MAX_STRING_LEN + 1))
        );
        assert!(dst.is_empty());
        assert!(!CodecError::StringTooLong(MAX_STRING_LEN + 1).is_desync());
    }

    #[test]
    fn test_oversized_declared_string_is_desync() {
        let registry = CodecRegistry::standard().unwrap();
        // Chat claiming a 65535 byte message
        let result = registry.decode(0x03, Bytes::from_static(&[0xFF, 0xFF, b'h', b'i']));
        let error = result.unwrap_err();
        assert_eq!(
            error,
            CodecError::DeclaredStringTooLong {
                opcode: 0x03,
                len: 0xFFFF
            }
        );
        assert!(error.is_desync());
    }

    #[test]
    fn test_registry_debug_lists_opcodes() {
        let registry = CodecRegistry::standard().unwrap();
        let rendered = format!("{:?}", registry);
        assert!(rendered.contains("43"));
        assert!(rendered.contains("255"));
    }
}
