//! # Shared protocol definitions
//!
//! Message types and the binary codec framework used by both the server
//! and any client speaking its protocol.
//!
//! ## Wire format
//!
//! Every message travels as a single frame:
//!
//! ```text
//! [opcode: u8][payload: codec-defined bytes]
//! ```
//!
//! Integers and floats are big-endian. Strings are a `u16` byte length
//! followed by UTF-8 text.
//!
//! ## Usage
//!
//! ```rust
//! use shared::{CodecRegistry, ExperienceMessage, Packet};
//!
//! let registry = CodecRegistry::standard().unwrap();
//! let frame = registry
//!     .encode(&Packet::Experience(ExperienceMessage::new(0.75, 10, 1000)))
//!     .unwrap();
//! assert_eq!(frame.as_ref(), &[0x2B, 0x3F, 0x40, 0x00, 0x00, 0x00, 0x0A, 0x03, 0xE8]);
//!
//! let decoded = registry.decode_frame(&frame).unwrap();
//! assert_eq!(decoded, Packet::Experience(ExperienceMessage::new(0.75, 10, 1000)));
//! ```

pub mod codec;
pub mod codecs;
pub mod messages;

pub use codec::{CodecError, CodecRegistry, MessageCodec, MAX_STRING_LEN};
pub use messages::{
    ChatMessage, ExperienceMessage, KeepAliveMessage, KickMessage, LoginAcceptedMessage,
    LoginMessage, Packet, PositionLookMessage, PROTOCOL_VERSION,
};
