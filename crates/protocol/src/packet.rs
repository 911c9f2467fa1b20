//! In-memory packet buffer with a read/write cursor.
//!
//! A [`Packet`] is built once per inbound message (from the received bytes)
//! or once per outbound response (empty, grown on write) and consumed once.

use crate::codec::{Decode, Encode};
use thiserror::Error;

/// Errors produced while decoding a packet.
///
/// None of these are fatal for a connection: the wire is untrusted, so a
/// malformed message is simply dropped by the receiver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// A read needed more bytes than the packet has left.
    #[error("packet read out of bounds: needed {needed} byte(s), {remaining} remaining")]
    OutOfBounds { needed: usize, remaining: usize },

    /// A length prefix exceeded the sanity bound.
    #[error("length prefix {len} exceeds the limit of {max}")]
    LengthExceeded { len: usize, max: usize },

    /// A string body was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// An owned byte buffer plus a cursor.
///
/// The cursor is where the next read or write happens. Writes past the end
/// grow the buffer; reads past the end fail with [`PacketError::OutOfBounds`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    buffer: Vec<u8>,
    cursor: usize,
}

impl Packet {
    /// Creates an empty packet, used for outbound messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty packet with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Decodes a value at the cursor.
    ///
    /// On failure the cursor is restored to where it was before the call, so
    /// a failed aggregate read never leaves the packet half-consumed.
    ///
    /// # Errors
    ///
    /// Returns the [`PacketError`] reported by the value's [`Decode`] impl.
    pub fn read<T: Decode>(&mut self) -> Result<T, PacketError> {
        let start = self.cursor;
        match T::decode(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.cursor = start;
                Err(e)
            }
        }
    }

    /// Encodes a value at the cursor, growing the buffer as needed.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }

    /// Borrows the next `len` bytes and advances the cursor past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], PacketError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(PacketError::OutOfBounds {
                needed: len,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buffer[start..self.cursor])
    }

    /// Reads exactly `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Writes raw bytes at the cursor, overwriting or extending the buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.cursor + bytes.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
    }

    /// Total number of bytes in the buffer.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves the cursor without any bounds check.
    ///
    /// Meant for peeking at headers. A position past the end is not unsafe:
    /// subsequent reads fail and subsequent writes zero-fill the gap.
    pub fn set_cursor(&mut self, position: usize) {
        self.cursor = position;
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl From<Vec<u8>> for Packet {
    fn from(buffer: Vec<u8>) -> Self {
        Self { buffer, cursor: 0 }
    }
}

impl From<&[u8]> for Packet {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl From<Packet> for Vec<u8> {
    fn from(packet: Packet) -> Self {
        packet.buffer
    }
}
