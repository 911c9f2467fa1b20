//! Message bodies for each opcode.
//!
//! Every body is a [`wire_struct!`](crate::wire_struct) so its layout is the
//! field order below. [`encode_message`] prefixes a body with its opcode.

use crate::codec::{clip_str, Decode, Encode};
use crate::opcode::{Opcode, OPCODE_SIZE};
use crate::packet::Packet;
use crate::wire_struct;

/// A message body bound to a fixed opcode.
pub trait Message: Encode + Decode {
    const OPCODE: Opcode;
}

wire_struct! {
    /// Echo test request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Test {
        pub value: u16,
    }
}

wire_struct! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Jump {}
}

wire_struct! {
    /// Request to run a script by path.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct Script {
        pub path: String,
        pub args: Vec<String>,
    }
}

wire_struct! {
    /// Outcome of a [`Script`] request. `ok` is 1 on success, 0 on failure,
    /// and `output` holds the result text or the error text.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct ScriptResult {
        pub ok: u8,
        pub output: String,
    }
}

impl Message for Test {
    const OPCODE: Opcode = Opcode::Test;
}

impl Message for Jump {
    const OPCODE: Opcode = Opcode::Jump;
}

impl Message for Script {
    const OPCODE: Opcode = Opcode::Script;
}

impl Message for ScriptResult {
    const OPCODE: Opcode = Opcode::ScriptResult;
}

/// Output longer than one string field can carry is clipped on a character
/// boundary, so every result decodes on the client.
impl ScriptResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: 1,
            output: clipped(output.into()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: 0,
            output: clipped(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok != 0
    }
}

fn clipped(mut text: String) -> String {
    let len = clip_str(&text).len();
    text.truncate(len);
    text
}

/// Encodes `[opcode][body]` into a fresh buffer ready to send.
pub fn encode_message<M: Message>(message: &M) -> Vec<u8> {
    let mut packet = Packet::with_capacity(OPCODE_SIZE + M::MIN_SIZE);
    packet.write(&M::OPCODE).write(message);
    packet.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketError;

    #[test]
    fn test_echo_response_bytes() {
        assert_eq!(encode_message(&Test { value: 0 }), vec![0, 0, 0, 0]);
        assert_eq!(encode_message(&Test { value: 1 }), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_jump_has_empty_body() {
        assert_eq!(Jump::MIN_SIZE, 0);
        assert_eq!(encode_message(&Jump {}), vec![0, 1]);
    }

    #[test]
    fn test_script_layout() {
        let bytes = encode_message(&Script {
            path: "a.lua".to_string(),
            args: vec!["x".to_string()],
        });
        assert_eq!(
            bytes,
            vec![
                0x00, 0x02, // opcode
                0x00, 0x05, b'a', b'.', b'l', b'u', b'a', // path
                0x00, 0x01, 0x00, 0x01, b'x', // args
            ]
        );
    }

    #[test]
    fn test_script_result_decodes_after_header() {
        let bytes = encode_message(&ScriptResult::failure("boom"));
        let mut packet = Packet::from(bytes);
        assert_eq!(packet.read::<u16>(), Ok(u16::from(Opcode::ScriptResult)));

        let result = packet.read::<ScriptResult>().unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.output, "boom");
    }

    #[test]
    fn test_longest_script_output_round_trips() {
        use crate::codec::MAX_SEQUENCE_LEN;

        let result = ScriptResult::success("x".repeat(MAX_SEQUENCE_LEN + 476));
        assert_eq!(result.output.len(), MAX_SEQUENCE_LEN);

        let mut packet = Packet::from(encode_message(&result));
        packet.read::<u16>().unwrap();
        assert_eq!(packet.read::<ScriptResult>(), Ok(result));
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_failure_text_is_clipped_on_char_boundary() {
        use crate::codec::MAX_SEQUENCE_LEN;

        let result = ScriptResult::failure(format!("!{}", "é".repeat(800)));
        assert_eq!(result.output.len(), MAX_SEQUENCE_LEN - 1);
        assert!(result.output.ends_with('é'));
    }

    #[test]
    fn test_truncated_script_is_rejected() {
        // Path claims 5 bytes but only 2 follow.
        let mut packet = Packet::from(vec![0x00, 0x05, b'a', b'b']);
        assert!(matches!(
            packet.read::<Script>(),
            Err(PacketError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_min_sizes() {
        assert_eq!(Test::MIN_SIZE, 2);
        assert_eq!(Script::MIN_SIZE, 4);
        assert_eq!(ScriptResult::MIN_SIZE, 3);
    }
}
