//! Concrete codecs for the built-in message set
//!
//! All multi-byte fields are big-endian.

use crate::codec::{ensure_remaining, get_string, put_string, CodecError, MessageCodec};
use crate::messages::{
    ChatMessage, ExperienceMessage, KeepAliveMessage, KickMessage, LoginAcceptedMessage,
    LoginMessage, Packet, PositionLookMessage,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

fn mismatch(expected: u8, packet: &Packet) -> CodecError {
    CodecError::MessageMismatch {
        expected,
        found: packet.name(),
    }
}

pub struct KeepAliveCodec;

impl MessageCodec for KeepAliveCodec {
    fn opcode(&self) -> u8 {
        KeepAliveMessage::OPCODE
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(KeepAliveMessage::WIRE_LEN)
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::KeepAlive(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        dst.put_u32(message.token);
        Ok(())
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        ensure_remaining(src, self.opcode(), KeepAliveMessage::WIRE_LEN)?;
        Ok(Packet::KeepAlive(KeepAliveMessage {
            token: src.get_u32(),
        }))
    }
}

pub struct LoginCodec;

impl MessageCodec for LoginCodec {
    fn opcode(&self) -> u8 {
        LoginMessage::OPCODE
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::Login(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        dst.put_u16(message.protocol_version);
        put_string(dst, &message.name)
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        ensure_remaining(src, self.opcode(), 2)?;
        let protocol_version = src.get_u16();
        let name = get_string(src, self.opcode())?;
        Ok(Packet::Login(LoginMessage {
            protocol_version,
            name,
        }))
    }
}

pub struct LoginAcceptedCodec;

impl MessageCodec for LoginAcceptedCodec {
    fn opcode(&self) -> u8 {
        LoginAcceptedMessage::OPCODE
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(LoginAcceptedMessage::WIRE_LEN)
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::LoginAccepted(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        dst.put_u32(message.entity_id);
        Ok(())
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        ensure_remaining(src, self.opcode(), LoginAcceptedMessage::WIRE_LEN)?;
        Ok(Packet::LoginAccepted(LoginAcceptedMessage {
            entity_id: src.get_u32(),
        }))
    }
}

pub struct ChatCodec;

impl MessageCodec for ChatCodec {
    fn opcode(&self) -> u8 {
        ChatMessage::OPCODE
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::Chat(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        put_string(dst, &message.message)
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        let message = get_string(src, self.opcode())?;
        Ok(Packet::Chat(ChatMessage { message }))
    }
}

pub struct PositionLookCodec;

impl MessageCodec for PositionLookCodec {
    fn opcode(&self) -> u8 {
        PositionLookMessage::OPCODE
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(PositionLookMessage::WIRE_LEN)
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::PositionLook(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        dst.put_f64(message.x);
        dst.put_f64(message.y);
        dst.put_f64(message.z);
        dst.put_f32(message.yaw);
        dst.put_f32(message.pitch);
        Ok(())
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        ensure_remaining(src, self.opcode(), PositionLookMessage::WIRE_LEN)?;
        let x = src.get_f64();
        let y = src.get_f64();
        let z = src.get_f64();
        let yaw = src.get_f32();
        let pitch = src.get_f32();
        Ok(Packet::PositionLook(PositionLookMessage {
            x,
            y,
            z,
            yaw,
            pitch,
        }))
    }
}

/// Experience bar codec, opcode `0x2B`
///
/// Payload layout: `bar_value: f32 | level: u16 | total_experience: u16`.
pub struct ExperienceCodec;

impl MessageCodec for ExperienceCodec {
    fn opcode(&self) -> u8 {
        ExperienceMessage::OPCODE
    }

    fn fixed_len(&self) -> Option<usize> {
        Some(ExperienceMessage::WIRE_LEN)
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::Experience(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        dst.put_f32(message.bar_value);
        dst.put_u16(message.level);
        dst.put_u16(message.total_experience);
        Ok(())
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        ensure_remaining(src, self.opcode(), ExperienceMessage::WIRE_LEN)?;
        let bar_value = src.get_f32();
        let level = src.get_u16();
        let total_experience = src.get_u16();
        Ok(Packet::Experience(ExperienceMessage {
            bar_value,
            level,
            total_experience,
        }))
    }
}

pub struct KickCodec;

impl MessageCodec for KickCodec {
    fn opcode(&self) -> u8 {
        KickMessage::OPCODE
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let Packet::Kick(message) = packet else {
            return Err(mismatch(self.opcode(), packet));
        };
        put_string(dst, &message.reason)
    }

    fn decode(&self, src: &mut Bytes) -> Result<Packet, CodecError> {
        let reason = get_string(src, self.opcode())?;
        Ok(Packet::Kick(KickMessage { reason }))
    }
}
