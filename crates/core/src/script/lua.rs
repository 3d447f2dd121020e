//! Lua 5.4 front-end (`mlua`, vendored).
//!
//! Every API entry becomes a global function. Callbacks are plain global
//! functions looked up by their qualified name. Errors raised by API calls
//! carry Lua's stack traceback back to the dispatcher.

use super::{integral, Arg, Binding, Checkpoint, Frontend, Global, GlobalKind, ScriptEngine, ScriptError};
use crate::api::{self, ApiError, Value, API};
use crate::state::ConsoleState;
use mlua::{Error as LuaError, Function, Lua, MultiValue, Value as LuaValue, Variadic};
use std::cell::RefCell;
use std::rc::Rc;

pub struct LuaEngine {
    lua: Lua,
}

impl LuaEngine {
    pub fn new(state: Rc<RefCell<ConsoleState>>) -> Result<Self, ScriptError> {
        let lua = Lua::new();
        install_api(&lua, &state).map_err(|e| ScriptError::Load {
            chunk: "api".to_string(),
            message: e.to_string(),
        })?;
        Ok(LuaEngine { lua })
    }
}

fn install_api(lua: &Lua, state: &Rc<RefCell<ConsoleState>>) -> mlua::Result<()> {
    let globals = lua.globals();
    for entry in API {
        let state = state.clone();
        let func = lua.create_function(move |lua, args: Variadic<LuaValue>| {
            let args = args
                .iter()
                .enumerate()
                .map(|(i, v)| from_lua(entry.name, i + 1, v))
                .collect::<Result<Vec<_>, _>>()
                .map_err(LuaError::external)?;
            let result = api::invoke(entry, &mut state.borrow_mut(), args).map_err(LuaError::external)?;
            to_lua(lua, result)
        })?;
        globals.set(entry.name, func)?;
    }
    Ok(())
}

fn from_lua(op: &'static str, index: usize, v: &LuaValue) -> Result<Value, ApiError> {
    match v {
        LuaValue::Nil => Ok(Value::Nil),
        LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
        LuaValue::Integer(i) => Ok(Value::Number(*i as f64)),
        LuaValue::Number(n) => Ok(Value::Number(*n)),
        LuaValue::String(s) => Ok(Value::Str(s.as_bytes().to_vec())),
        other => Err(ApiError::ArgType {
            op,
            index,
            expected: "number or string",
            found: other.type_name(),
        }),
    }
}

fn to_lua(lua: &Lua, v: Value) -> mlua::Result<LuaValue> {
    Ok(match v {
        Value::Nil => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(b),
        Value::Number(n) => match integral(n) {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n),
        },
        Value::Str(s) => LuaValue::String(lua.create_string(&s)?),
    })
}

/// Split an error string at Lua's `stack traceback:` marker.
fn split_traceback(text: &str) -> (String, Vec<String>) {
    match text.split_once("\nstack traceback:") {
        Some((message, rest)) => (message.to_string(), traceback_lines(rest)),
        None => (text.to_string(), Vec::new()),
    }
}

fn traceback_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "stack traceback:")
        .map(str::to_string)
        .collect()
}

fn runtime_error(err: LuaError) -> ScriptError {
    match err {
        LuaError::CallbackError { traceback, cause } => {
            let mut cause: &LuaError = &cause;
            while let LuaError::CallbackError { cause: inner, .. } = cause {
                cause = &**inner;
            }
            let (message, _) = split_traceback(&cause.to_string());
            ScriptError::Runtime { message, traceback: traceback_lines(&traceback) }
        }
        LuaError::RuntimeError(text) => {
            let (message, traceback) = split_traceback(&text);
            ScriptError::Runtime { message, traceback }
        }
        other => {
            let (message, traceback) = split_traceback(&other.to_string());
            ScriptError::Runtime { message, traceback }
        }
    }
}

impl ScriptEngine for LuaEngine {
    fn frontend(&self) -> Frontend {
        Frontend::Lua
    }

    fn load(&mut self, source: &str, chunk_name: &str) -> Result<(), ScriptError> {
        self.lua
            .load(source)
            .set_name(format!("@{}", chunk_name))
            .exec()
            .map_err(|e| ScriptError::Load {
                chunk: chunk_name.to_string(),
                message: e.to_string(),
            })
    }

    fn resolve(&self, name: &str) -> Binding {
        match self.lua.globals().raw_get::<LuaValue>(name) {
            Ok(LuaValue::Nil) | Err(_) => Binding::Unbound,
            Ok(LuaValue::Function(_)) => Binding::Function,
            Ok(other) => Binding::NotCallable(other.type_name().to_string()),
        }
    }

    fn invoke(&mut self, name: &str, args: &[Arg]) -> Result<(), ScriptError> {
        let func: Function = self.lua.globals().get(name).map_err(runtime_error)?;
        let values = args
            .iter()
            .map(|a| match a {
                Arg::Str(s) => self.lua.create_string(s).map(LuaValue::String),
                Arg::Num(n) => Ok(LuaValue::Number(*n as f64)),
            })
            .collect::<mlua::Result<Vec<_>>>()
            .map_err(runtime_error)?;
        func.call::<()>(MultiValue::from_vec(values)).map_err(runtime_error)
    }

    fn read_global(&self, name: &str, kind: GlobalKind) -> Result<Global, ScriptError> {
        let value: LuaValue = self.lua.globals().get(name).map_err(runtime_error)?;
        let mismatch = |found: &str| ScriptError::GlobalType {
            name: name.to_string(),
            expected: kind.name(),
            found: found.to_string(),
        };
        match (kind, value) {
            (_, LuaValue::Nil) => Err(ScriptError::GlobalUnset { name: name.to_string() }),
            (GlobalKind::Str, LuaValue::String(s)) => Ok(Global::Str(s.to_string_lossy())),
            (GlobalKind::Num, LuaValue::Integer(i)) => Ok(Global::Num(i as f64)),
            (GlobalKind::Num, LuaValue::Number(n)) => Ok(Global::Num(n)),
            (GlobalKind::Bool, LuaValue::Boolean(b)) => Ok(Global::Bool(b)),
            (_, other) => Err(mismatch(other.type_name())),
        }
    }

    fn define_global(&mut self, name: &str, value: Global) -> Result<(), ScriptError> {
        let globals = self.lua.globals();
        let result = match value {
            Global::Str(s) => globals.set(name, s),
            Global::Num(n) => match integral(n) {
                Some(i) => globals.set(name, i),
                None => globals.set(name, n),
            },
            Global::Bool(b) => globals.set(name, b),
        };
        result.map_err(runtime_error)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.lua.used_memory())
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.lua.expire_registry_values();
        if self.lua.used_memory() > checkpoint.0 {
            if let Err(e) = self.lua.gc_step() {
                log::warn!("lua gc step failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine() -> (LuaEngine, Rc<RefCell<ConsoleState>>) {
        let state = Rc::new(RefCell::new(ConsoleState::with_seed(Config::default(), 3)));
        (LuaEngine::new(state.clone()).unwrap(), state)
    }

    #[test]
    fn test_resolve() {
        let (mut lua, _) = engine();
        lua.load("function step() end\nscore = 5", "test").unwrap();
        assert_eq!(lua.resolve("step"), Binding::Function);
        assert_eq!(lua.resolve("idiv"), Binding::Function);
        assert_eq!(lua.resolve("missing"), Binding::Unbound);
        assert_eq!(lua.resolve("score"), Binding::NotCallable("integer".to_string()));
    }

    #[test]
    fn test_api_calls_reach_state() {
        let (mut lua, state) = engine();
        lua.load("function step(x) poke(0, idiv(x, 2)) end", "test").unwrap();
        lua.invoke("step", &[Arg::Num(7.0)]).unwrap();
        assert_eq!(state.borrow().peek(0, 1).unwrap(), vec![3]);
    }

    #[test]
    fn test_integer_results() {
        let (mut lua, _) = engine();
        lua.load("r = idiv(-7, 2)\nt = math.type(r)", "test").unwrap();
        assert_eq!(lua.read_global("r", GlobalKind::Num), Ok(Global::Num(-3.0)));
        assert_eq!(lua.read_global("t", GlobalKind::Str), Ok(Global::Str("integer".into())));
    }

    #[test]
    fn test_api_error_has_traceback() {
        let (mut lua, _) = engine();
        lua.load("function step() idiv(1, 0) end", "test").unwrap();
        let err = lua.invoke("step", &[]).unwrap_err();
        match err {
            ScriptError::Runtime { message, traceback } => {
                assert!(message.contains("division by zero"), "{}", message);
                assert!(!traceback.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_script_error() {
        let (mut lua, _) = engine();
        lua.load("function step() error('bad') end", "test").unwrap();
        let err = lua.invoke("step", &[]).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_load_error() {
        let (mut lua, _) = engine();
        let err = lua.load("function (", "broken").unwrap_err();
        assert!(matches!(err, ScriptError::Load { ref chunk, .. } if chunk == "broken"));
    }

    #[test]
    fn test_globals() {
        let (mut lua, _) = engine();
        lua.define_global("width", Global::Num(24.0)).unwrap();
        lua.define_global("title", Global::Str("cel7 ce".into())).unwrap();
        lua.load("width = width + 8", "test").unwrap();
        assert_eq!(lua.read_global("width", GlobalKind::Num), Ok(Global::Num(32.0)));
        assert_eq!(
            lua.read_global("title", GlobalKind::Num),
            Err(ScriptError::GlobalType {
                name: "title".into(),
                expected: "number",
                found: "string".into()
            })
        );
        assert_eq!(
            lua.read_global("delay", GlobalKind::Num),
            Err(ScriptError::GlobalUnset { name: "delay".into() })
        );
    }

    #[test]
    fn test_checkpoint_restore() {
        let (mut lua, _) = engine();
        lua.load("function step() local t = {} for i = 1, 1000 do t[i] = i end end", "test").unwrap();
        let cp = lua.checkpoint();
        lua.invoke("step", &[]).unwrap();
        lua.restore(cp);
        // The engine stays usable and keeps its globals
        assert_eq!(lua.resolve("step"), Binding::Function);
        assert!(lua.invoke("step", &[]).is_ok());
    }

    #[test]
    fn test_split_traceback() {
        let (msg, tb) = split_traceback("x:1: oops\nstack traceback:\n\t[C]: in ?\n\tx:1: in main");
        assert_eq!(msg, "x:1: oops");
        assert_eq!(tb, vec!["[C]: in ?".to_string(), "x:1: in main".to_string()]);
    }
}
