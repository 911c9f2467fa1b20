//! # Protocol - Binary Wire Format
//!
//! Byte-exact serialization shared by the server and its clients. Every
//! message on the wire is a WebSocket binary frame laid out as:
//!
//! ```text
//! [opcode: u16 big-endian][body: opcode-specific layout]
//! ```
//!
//! ## Codec Rules
//!
//! * **Primitives** - integers and floats are written in big-endian order,
//!   independent of the host byte order
//! * **Aggregates** - fields are written one after another in declaration
//!   order with no padding (see [`wire_struct!`])
//! * **Strings and sequences** - a `u16` length prefix followed by the
//!   elements; lengths above [`MAX_SEQUENCE_LEN`] are rejected on decode
//!
//! Reads are bounds-checked: reading past the end of a [`Packet`] returns
//! [`PacketError::OutOfBounds`] and leaves the cursor where it was.
//!
//! ## Opcodes
//!
//! The opcode set is closed and known at compile time ([`Opcode`]). Unknown
//! opcode values decode to [`UnknownOpcode`] and are meant to be ignored by
//! the receiver rather than treated as a wire error.

pub mod codec;
pub mod messages;
pub mod opcode;
pub mod packet;

pub use codec::{clip_str, Decode, Encode, MAX_SEQUENCE_LEN};
pub use messages::{encode_message, Jump, Message, Script, ScriptResult, Test};
pub use opcode::{Opcode, UnknownOpcode, OPCODE_SIZE};
pub use packet::{Packet, PacketError};
