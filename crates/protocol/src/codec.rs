//! Encode/decode traits and their implementations for wire types.
//!
//! Primitive numbers are written big-endian. Strings and sequences carry a
//! `u16` length prefix. Aggregates are declared with [`wire_struct!`], which
//! encodes each field in declaration order without padding.

use crate::packet::{Packet, PacketError};

/// Upper bound accepted for a string or sequence length prefix.
///
/// Protects the decoder against a corrupted or hostile length field asking
/// for a huge allocation.
pub const MAX_SEQUENCE_LEN: usize = 1024;

/// A value that can be written into a [`Packet`].
pub trait Encode {
    fn encode(&self, packet: &mut Packet);
}

/// A value that can be read out of a [`Packet`].
pub trait Decode: Sized {
    /// Smallest number of bytes an encoded value can occupy.
    ///
    /// For fixed-size values this is the exact size. Dispatch uses it to drop
    /// truncated messages before attempting to decode them.
    const MIN_SIZE: usize;

    fn decode(packet: &mut Packet) -> Result<Self, PacketError>;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, packet: &mut Packet) {
                    packet.write_bytes(&self.to_be_bytes());
                }
            }

            impl Decode for $ty {
                const MIN_SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
                    Ok(<$ty>::from_be_bytes(packet.read_array()?))
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Encode for bool {
    fn encode(&self, packet: &mut Packet) {
        packet.write_bytes(&[u8::from(*self)]);
    }
}

impl Decode for bool {
    const MIN_SIZE: usize = 1;

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        Ok(packet.read::<u8>()? != 0)
    }
}

/// Reads a `u16` length prefix and checks it against [`MAX_SEQUENCE_LEN`].
fn read_len(packet: &mut Packet) -> Result<usize, PacketError> {
    let len = usize::from(packet.read::<u16>()?);
    if len > MAX_SEQUENCE_LEN {
        return Err(PacketError::LengthExceeded {
            len,
            max: MAX_SEQUENCE_LEN,
        });
    }
    Ok(len)
}

/// Longest prefix of `text` that fits in [`MAX_SEQUENCE_LEN`] bytes without
/// splitting a character.
pub fn clip_str(text: &str) -> &str {
    let mut end = text.len().min(MAX_SEQUENCE_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Writes the `u16` prefix for `len` items. `len` never exceeds
/// [`MAX_SEQUENCE_LEN`], so the prefix always fits and always decodes.
fn write_len(packet: &mut Packet, len: usize) {
    debug_assert!(len <= MAX_SEQUENCE_LEN);
    packet.write(&(len as u16));
}

/// Strings longer than [`MAX_SEQUENCE_LEN`] bytes are cut at the last
/// character boundary that fits.
impl Encode for str {
    fn encode(&self, packet: &mut Packet) {
        let text = clip_str(self);
        write_len(packet, text.len());
        packet.write_bytes(text.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, packet: &mut Packet) {
        self.as_str().encode(packet);
    }
}

impl Decode for String {
    const MIN_SIZE: usize = 2;

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        let len = read_len(packet)?;
        let bytes = packet.read_bytes(len)?.to_vec();
        String::from_utf8(bytes).map_err(|_| PacketError::InvalidUtf8)
    }
}

/// Sequences longer than [`MAX_SEQUENCE_LEN`] items are cut to that many.
impl<T: Encode> Encode for [T] {
    fn encode(&self, packet: &mut Packet) {
        let len = self.len().min(MAX_SEQUENCE_LEN);
        write_len(packet, len);
        for item in &self[..len] {
            item.encode(packet);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, packet: &mut Packet) {
        self.as_slice().encode(packet);
    }
}

impl<T: Decode> Decode for Vec<T> {
    const MIN_SIZE: usize = 2;

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        let len = read_len(packet)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(packet.read::<T>()?);
        }
        Ok(items)
    }
}

/// Declares a struct whose wire form is its fields in declaration order.
///
/// ```
/// protocol::wire_struct! {
///     #[derive(Debug, PartialEq)]
///     pub struct Move {
///         pub x: f32,
///         pub y: f32,
///     }
/// }
///
/// let mut packet = protocol::Packet::new();
/// packet.write(&Move { x: 1.0, y: 2.0 });
/// assert_eq!(packet.size(), 8);
/// ```
#[macro_export]
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_meta:meta])* $field_vis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$field_meta])* $field_vis $field: $ty ),*
        }

        impl $crate::Encode for $name {
            fn encode(&self, packet: &mut $crate::Packet) {
                let _ = &packet;
                $( $crate::Encode::encode(&self.$field, packet); )*
            }
        }

        impl $crate::Decode for $name {
            const MIN_SIZE: usize = 0 $( + <$ty as $crate::Decode>::MIN_SIZE )*;

            fn decode(packet: &mut $crate::Packet) -> ::core::result::Result<Self, $crate::PacketError> {
                let _ = &packet;
                Ok(Self {
                    $( $field: packet.read::<$ty>()?, )*
                })
            }
        }
    };
}
