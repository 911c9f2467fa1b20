//! The closed opcode set.

use crate::codec::Encode;
use crate::packet::Packet;
use std::fmt;
use thiserror::Error;

/// Width of the opcode header that precedes every message body.
pub const OPCODE_SIZE: usize = std::mem::size_of::<u16>();

/// Tag written in front of every message body.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Echo test. Client sends a `u16`, server answers with `[0, 0, 0, 0]`.
    Test = 0,
    /// Movement placeholder with an empty body.
    Jump = 1,
    /// Run a script by path with string arguments.
    Script = 2,
    /// Server response to [`Opcode::Script`].
    ScriptResult = 3,
}

impl Opcode {
    pub const ALL: [Opcode; 4] = [
        Opcode::Test,
        Opcode::Jump,
        Opcode::Script,
        Opcode::ScriptResult,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Test => "test",
            Opcode::Jump => "jump",
            Opcode::Script => "script",
            Opcode::ScriptResult => "script_result",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), u16::from(*self))
    }
}

/// An opcode value outside the known set.
///
/// Receivers ignore these; the value is kept for logging.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown opcode {0}")]
pub struct UnknownOpcode(pub u16);

impl TryFrom<u16> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Test),
            1 => Ok(Opcode::Jump),
            2 => Ok(Opcode::Script),
            3 => Ok(Opcode::ScriptResult),
            other => Err(UnknownOpcode(other)),
        }
    }
}

impl From<Opcode> for u16 {
    fn from(opcode: Opcode) -> Self {
        opcode as u16
    }
}

impl Encode for Opcode {
    fn encode(&self, packet: &mut Packet) {
        packet.write(&u16::from(*self));
    }
}
