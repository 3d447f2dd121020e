//! Script front-ends behind one engine interface.
//!
//! The console talks to exactly one [`ScriptEngine`] per run, chosen when the
//! source is loaded. Both engines register the same [`crate::api::API`]
//! table and share the console state through `Rc<RefCell<ConsoleState>>`.

pub mod lua;
pub mod rhai;

use crate::state::ConsoleState;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Which embedded runtime runs the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    Lua,
    Rhai,
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frontend::Lua => f.write_str("lua"),
            Frontend::Rhai => f.write_str("rhai"),
        }
    }
}

/// Callback argument passed from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Num(f32),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<f32> for Arg {
    fn from(n: f32) -> Self {
        Arg::Num(n)
    }
}

/// What a global name refers to in the script environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Function,
    /// Bound to a value of the named type
    NotCallable(String),
}

/// Expected type when reading a global back from the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    Str,
    Num,
    Bool,
}

impl GlobalKind {
    pub fn name(self) -> &'static str {
        match self {
            GlobalKind::Str => "string",
            GlobalKind::Num => "number",
            GlobalKind::Bool => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Global {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Global {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Global::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Global::Num(n) => Some(*n),
            _ => None,
        }
    }
}

/// Engine-specific marker restored after each callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(pub usize);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("global '{name}' is not set")]
    GlobalUnset { name: String },
    #[error("global '{name}' must be a {expected}, got {found}")]
    GlobalType {
        name: String,
        expected: &'static str,
        found: String,
    },
    #[error("'{name}' is a {found}, not a function")]
    CallableType { name: String, found: String },
    #[error("{message}")]
    Runtime {
        message: String,
        /// Innermost frame last
        traceback: Vec<String>,
    },
    #[error("{chunk}: {message}")]
    Load { chunk: String, message: String },
}

impl ScriptError {
    pub fn traceback(&self) -> &[String] {
        match self {
            ScriptError::Runtime { traceback, .. } => traceback,
            _ => &[],
        }
    }
}

/// Capabilities the console needs from a script runtime.
pub trait ScriptEngine {
    fn frontend(&self) -> Frontend;

    /// Compile and run a chunk at top level.
    fn load(&mut self, source: &str, chunk_name: &str) -> Result<(), ScriptError>;

    fn resolve(&self, name: &str) -> Binding;

    /// Call a resolved function with exactly `args`, discarding results.
    fn invoke(&mut self, name: &str, args: &[Arg]) -> Result<(), ScriptError>;

    fn read_global(&self, name: &str, kind: GlobalKind) -> Result<Global, ScriptError>;

    fn define_global(&mut self, name: &str, value: Global) -> Result<(), ScriptError>;

    fn checkpoint(&self) -> Checkpoint;

    /// Release what the engine accumulated since `checkpoint`.
    fn restore(&mut self, checkpoint: Checkpoint);
}

/// Build the engine for `frontend` with the console API registered.
pub fn create(
    frontend: Frontend,
    state: Rc<RefCell<ConsoleState>>,
) -> Result<Box<dyn ScriptEngine>, ScriptError> {
    let engine: Box<dyn ScriptEngine> = match frontend {
        Frontend::Lua => Box::new(lua::LuaEngine::new(state)?),
        Frontend::Rhai => Box::new(rhai::RhaiEngine::new(state)),
    };
    log::debug!("script engine ready: {}", frontend);
    Ok(engine)
}

/// Numbers that fit an integer are handed to scripts as integers.
pub(crate) fn integral(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral() {
        assert_eq!(integral(3.0), Some(3));
        assert_eq!(integral(-7.0), Some(-7));
        assert_eq!(integral(3.5), None);
        assert_eq!(integral(f64::NAN), None);
        assert_eq!(integral(f64::INFINITY), None);
    }

    #[test]
    fn test_runtime_traceback() {
        let err = ScriptError::Runtime {
            message: "boom".into(),
            traceback: vec!["in step".into()],
        };
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.traceback(), &["in step".to_string()]);
        assert!(ScriptError::GlobalUnset { name: "x".into() }.traceback().is_empty());
    }
}
