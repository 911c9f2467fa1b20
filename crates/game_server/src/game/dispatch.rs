//! Opcode dispatch and the built-in message handlers.
//!
//! The opcode set is closed, so routing is a plain `match`. Each arm decodes
//! the body type for that opcode and calls its handler. A body that is too
//! short or fails to decode is dropped without touching the connection.

use super::script::ScriptEngine;
use super::session::Session;
use super::WorldId;
use protocol::{encode_message, Jump, Message, Opcode, Packet, Script, ScriptResult, Test};
use tracing::{debug, trace};

/// Everything a handler can reach while processing one message.
pub struct Context<'a> {
    pub session: &'a Session,
    pub scripts: &'a mut dyn ScriptEngine,
    pub world: WorldId,
}

impl Context<'_> {
    /// Encodes `message` and sends it to the session's connection.
    ///
    /// Returns `false` if the connection is gone; handlers can ignore that.
    pub fn respond<M: Message>(&self, message: &M) -> bool {
        self.session.send(encode_message(message))
    }
}

/// Routes a message to its handler.
///
/// `packet` must be positioned just after the opcode header.
pub fn dispatch(ctx: &mut Context<'_>, opcode: u16, packet: &mut Packet) {
    let opcode = match Opcode::try_from(opcode) {
        Ok(opcode) => opcode,
        Err(unknown) => {
            trace!(connection = ctx.session.id(), "ignoring {}", unknown);
            return;
        }
    };

    match opcode {
        Opcode::Test => decode_and_handle(ctx, packet, on_test),
        Opcode::Jump => decode_and_handle(ctx, packet, on_jump),
        Opcode::Script => decode_and_handle(ctx, packet, on_script),
        Opcode::ScriptResult => {
            trace!(connection = ctx.session.id(), "ignoring client-sent {}", opcode);
        }
    }
}

fn decode_and_handle<M: Message>(
    ctx: &mut Context<'_>,
    packet: &mut Packet,
    handle: fn(&mut Context<'_>, M),
) {
    if packet.remaining() < M::MIN_SIZE {
        trace!(
            connection = ctx.session.id(),
            opcode = %M::OPCODE,
            remaining = packet.remaining(),
            "dropping truncated message"
        );
        return;
    }

    match packet.read::<M>() {
        Ok(body) => handle(ctx, body),
        Err(e) => trace!(
            connection = ctx.session.id(),
            opcode = %M::OPCODE,
            "dropping malformed message: {}",
            e
        ),
    }
}

fn on_test(ctx: &mut Context<'_>, _body: Test) {
    ctx.respond(&Test { value: 0 });
}

fn on_jump(ctx: &mut Context<'_>, _body: Jump) {
    debug!(connection = ctx.session.id(), world = ctx.world, "jump");
}

fn on_script(ctx: &mut Context<'_>, body: Script) {
    let result = match ctx.scripts.execute(&body.path, &body.args) {
        Ok(output) => ScriptResult::success(output),
        Err(e) => {
            debug!(
                connection = ctx.session.id(),
                path = %body.path,
                "script failed: {}",
                e
            );
            ScriptResult::failure(e.to_string())
        }
    };
    ctx.respond(&result);
}
