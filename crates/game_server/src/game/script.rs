//! Scripting collaborator seam.
//!
//! The server does not embed an interpreter. A [`ScriptFactory`] builds one
//! [`ScriptEngine`] per world when the world is created, and the engine lives
//! and dies with that world.

use super::WorldId;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("scripting is not available")]
    Unavailable,

    #[error("script not found: {0}")]
    NotFound(String),

    #[error("script failed: {0}")]
    Failed(String),
}

/// An interpreter owned by one world.
pub trait ScriptEngine: Send {
    /// Loads (and may cache) the script at `path`, then runs it with `args`.
    fn execute(&mut self, path: &str, args: &[String]) -> Result<String, ScriptError>;

    /// Runs a one-off piece of source text.
    fn eval(&mut self, source: &str) -> Result<String, ScriptError>;
}

/// Builds the engine for a world.
pub type ScriptFactory = Arc<dyn Fn(WorldId) -> Box<dyn ScriptEngine> + Send + Sync>;

/// Engine used when no interpreter is configured. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScripting;

impl ScriptEngine for NoScripting {
    fn execute(&mut self, _path: &str, _args: &[String]) -> Result<String, ScriptError> {
        Err(ScriptError::Unavailable)
    }

    fn eval(&mut self, _source: &str) -> Result<String, ScriptError> {
        Err(ScriptError::Unavailable)
    }
}

pub fn no_scripting() -> ScriptFactory {
    Arc::new(|_: WorldId| Box::new(NoScripting) as Box<dyn ScriptEngine>)
}
