//! Typed protocol messages exchanged between client and server
//!
//! Every message type owns exactly one opcode. The [`Packet`] enum is the
//! type-erased form handed to and returned from the codec registry.

/// Protocol revision a client must announce in its login message
pub const PROTOCOL_VERSION: u16 = 1;

/// Opcode table for the messages defined in this module
pub mod opcode {
    pub const KEEP_ALIVE: u8 = 0x00;
    pub const LOGIN: u8 = 0x01;
    pub const LOGIN_ACCEPTED: u8 = 0x02;
    pub const CHAT: u8 = 0x03;
    pub const POSITION_LOOK: u8 = 0x0D;
    pub const EXPERIENCE: u8 = 0x2B;
    pub const KICK: u8 = 0xFF;
}

/// Liveness probe; either side echoes the token back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveMessage {
    pub token: u32,
}

impl KeepAliveMessage {
    pub const OPCODE: u8 = opcode::KEEP_ALIVE;
    pub const WIRE_LEN: usize = 4;
}

/// First message a client sends, naming the player it wants to control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginMessage {
    pub protocol_version: u16,
    pub name: String,
}

impl LoginMessage {
    pub const OPCODE: u8 = opcode::LOGIN;
}

/// Server acknowledgement of a successful login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginAcceptedMessage {
    pub entity_id: u32,
}

impl LoginAcceptedMessage {
    pub const OPCODE: u8 = opcode::LOGIN_ACCEPTED;
    pub const WIRE_LEN: usize = 4;
}

/// A line of chat text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
}

impl ChatMessage {
    pub const OPCODE: u8 = opcode::CHAT;

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Absolute position and orientation of the controlled entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionLookMessage {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl PositionLookMessage {
    pub const OPCODE: u8 = opcode::POSITION_LOOK;
    pub const WIRE_LEN: usize = 32;
}

/// Experience bar update
///
/// `bar_value` is the fractional progress towards the next level. It is
/// conventionally within `[0, 1]` but the codec transmits whatever it is
/// given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperienceMessage {
    pub bar_value: f32,
    pub level: u16,
    pub total_experience: u16,
}

impl ExperienceMessage {
    pub const OPCODE: u8 = opcode::EXPERIENCE;
    pub const WIRE_LEN: usize = 8;

    pub fn new(bar_value: f32, level: u16, total_experience: u16) -> Self {
        Self {
            bar_value,
            level,
            total_experience,
        }
    }
}

/// Connection termination with a human readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickMessage {
    pub reason: String,
}

impl KickMessage {
    pub const OPCODE: u8 = opcode::KICK;

    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Any message the protocol knows how to carry
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    KeepAlive(KeepAliveMessage),
    Login(LoginMessage),
    LoginAccepted(LoginAcceptedMessage),
    Chat(ChatMessage),
    PositionLook(PositionLookMessage),
    Experience(ExperienceMessage),
    Kick(KickMessage),
}

impl Packet {
    /// Opcode declared by the wrapped message type
    pub fn opcode(&self) -> u8 {
        match self {
            Packet::KeepAlive(_) => KeepAliveMessage::OPCODE,
            Packet::Login(_) => LoginMessage::OPCODE,
            Packet::LoginAccepted(_) => LoginAcceptedMessage::OPCODE,
            Packet::Chat(_) => ChatMessage::OPCODE,
            Packet::PositionLook(_) => PositionLookMessage::OPCODE,
            Packet::Experience(_) => ExperienceMessage::OPCODE,
            Packet::Kick(_) => KickMessage::OPCODE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::KeepAlive(_) => "KeepAlive",
            Packet::Login(_) => "Login",
            Packet::LoginAccepted(_) => "LoginAccepted",
            Packet::Chat(_) => "Chat",
            Packet::PositionLook(_) => "PositionLook",
            Packet::Experience(_) => "Experience",
            Packet::Kick(_) => "Kick",
        }
    }
}

macro_rules! impl_into_packet {
    ($($message:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$message> for Packet {
                fn from(message: $message) -> Self {
                    Packet::$variant(message)
                }
            }
        )*
    };
}

impl_into_packet! {
    KeepAliveMessage => KeepAlive,
    LoginMessage => Login,
    LoginAcceptedMessage => LoginAccepted,
    ChatMessage => Chat,
    PositionLookMessage => PositionLook,
    ExperienceMessage => Experience,
    KickMessage => Kick,
}
