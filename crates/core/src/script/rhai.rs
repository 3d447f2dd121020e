//! Rhai front-end.
//!
//! API entries are registered once per accepted arity with `Dynamic`
//! parameters. Config globals live in a persistent [`Scope`]; callbacks are
//! script functions (or `Fn` pointers stored in the scope).
//!
//! Rhai functions cannot see the global scope, so every callback runs with a
//! persistent object map bound as `this` for state kept between calls.

use super::{integral, Arg, Binding, Checkpoint, Frontend, Global, GlobalKind, ScriptEngine, ScriptError};
use crate::api::{self, ApiEntry, ApiError, Value, API};
use crate::state::ConsoleState;
use ::rhai::{Blob, CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope, AST, FLOAT, INT};
use std::cell::RefCell;
use std::rc::Rc;

type RhaiResult = Result<Dynamic, Box<EvalAltResult>>;

/// Scope name for a console global. `debug` is a reserved word in Rhai.
fn scope_name(name: &str) -> &str {
    match name {
        "debug" => "debug_mode",
        other => other,
    }
}

pub struct RhaiEngine {
    engine: Engine,
    scope: Scope<'static>,
    ast: AST,
    /// Object bound as `this` in every callback
    this: Dynamic,
}

impl RhaiEngine {
    pub fn new(state: Rc<RefCell<ConsoleState>>) -> Self {
        let mut engine = Engine::new();
        for entry in API {
            for &arity in entry.arities {
                register(&mut engine, entry, arity, state.clone());
            }
        }
        RhaiEngine {
            engine,
            scope: Scope::new(),
            ast: AST::empty(),
            this: Dynamic::from_map(Map::new()),
        }
    }

    fn script_fn_defined(&self, name: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == name)
    }

    fn scope_fn_ptr(&self, name: &str) -> Option<FnPtr> {
        self.scope
            .get(name)
            .filter(|v| v.is::<FnPtr>())
            .map(|v| v.clone().cast::<FnPtr>())
    }
}

fn register(engine: &mut Engine, entry: &'static ApiEntry, arity: usize, state: Rc<RefCell<ConsoleState>>) {
    let call = move |args: Vec<Dynamic>| dispatch(entry, &state, args);
    let name = entry.name;
    match arity {
        0 => {
            engine.register_fn(name, move || call(vec![]));
        }
        1 => {
            engine.register_fn(name, move |a: Dynamic| call(vec![a]));
        }
        2 => {
            engine.register_fn(name, move |a: Dynamic, b: Dynamic| call(vec![a, b]));
        }
        3 => {
            engine.register_fn(name, move |a: Dynamic, b: Dynamic, c: Dynamic| call(vec![a, b, c]));
        }
        5 => {
            engine.register_fn(
                name,
                move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic, e: Dynamic| call(vec![a, b, c, d, e]),
            );
        }
        n => log::warn!("{}: no rhai binding for arity {}", name, n),
    }
}

fn dispatch(entry: &'static ApiEntry, state: &Rc<RefCell<ConsoleState>>, args: Vec<Dynamic>) -> RhaiResult {
    let args = args
        .into_iter()
        .enumerate()
        .map(|(i, d)| from_dynamic(entry.name, i + 1, d))
        .collect::<Result<Vec<_>, _>>()
        .map_err(raise)?;
    let result = api::invoke(entry, &mut state.borrow_mut(), args).map_err(raise)?;
    Ok(to_dynamic(result))
}

fn raise(e: ApiError) -> Box<EvalAltResult> {
    e.to_string().into()
}

fn from_dynamic(op: &'static str, index: usize, d: Dynamic) -> Result<Value, ApiError> {
    if d.is_unit() {
        return Ok(Value::Nil);
    }
    if let Ok(b) = d.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = d.as_int() {
        return Ok(Value::Number(i as f64));
    }
    if let Ok(f) = d.as_float() {
        return Ok(Value::Number(f));
    }
    if let Ok(c) = d.as_char() {
        return Ok(Value::Str(c.to_string().into_bytes()));
    }
    if d.is::<Blob>() {
        return Ok(Value::Str(d.cast::<Blob>()));
    }
    let found = d.type_name();
    d.into_string()
        .map(|s| Value::Str(s.into_bytes()))
        .map_err(|_| ApiError::ArgType { op, index, expected: "number or string", found })
}

fn to_dynamic(v: Value) -> Dynamic {
    match v {
        Value::Nil => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => match integral(n) {
            Some(i) => Dynamic::from(i as INT),
            None => Dynamic::from(n as FLOAT),
        },
        // Bytes that are not valid UTF-8 come back as a blob
        Value::Str(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Dynamic::from(s),
            Err(e) => Dynamic::from_blob(e.into_bytes()),
        },
    }
}

fn runtime_error(err: Box<EvalAltResult>) -> ScriptError {
    let mut traceback = Vec::new();
    let mut err = *err;
    loop {
        match err {
            EvalAltResult::ErrorInFunctionCall(name, source, inner, pos) => {
                if source.is_empty() {
                    traceback.push(format!("in call to function '{}' @ {}", name, pos));
                } else {
                    traceback.push(format!("in call to function '{}' @ '{}' {}", name, source, pos));
                }
                err = *inner;
            }
            other => {
                return ScriptError::Runtime { message: other.to_string(), traceback };
            }
        }
    }
}

impl ScriptEngine for RhaiEngine {
    fn frontend(&self) -> Frontend {
        Frontend::Rhai
    }

    fn load(&mut self, source: &str, chunk_name: &str) -> Result<(), ScriptError> {
        let load_error = |message: String| ScriptError::Load {
            chunk: chunk_name.to_string(),
            message,
        };
        let mut ast = self
            .engine
            .compile_with_scope(&self.scope, source)
            .map_err(|e| load_error(e.to_string()))?;
        ast.set_source(chunk_name);
        self.engine
            .run_ast_with_scope(&mut self.scope, &ast)
            .map_err(|e| load_error(e.to_string()))?;
        self.ast = ast;
        Ok(())
    }

    fn resolve(&self, name: &str) -> Binding {
        if self.script_fn_defined(name) {
            return Binding::Function;
        }
        match self.scope.get(name) {
            None => Binding::Unbound,
            Some(v) if v.is::<FnPtr>() => Binding::Function,
            Some(v) => Binding::NotCallable(v.type_name().to_string()),
        }
    }

    fn invoke(&mut self, name: &str, args: &[Arg]) -> Result<(), ScriptError> {
        let args: Vec<Dynamic> = args
            .iter()
            .map(|a| match a {
                Arg::Str(s) => Dynamic::from(s.clone()),
                Arg::Num(n) => Dynamic::from(*n as FLOAT),
            })
            .collect();

        if self.script_fn_defined(name) {
            let options = CallFnOptions::new()
                .eval_ast(false)
                .rewind_scope(true)
                .bind_this_ptr(&mut self.this);
            return self
                .engine
                .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, name, args)
                .map(|_| ())
                .map_err(runtime_error);
        }
        match self.scope_fn_ptr(name) {
            Some(fp) => fp
                .call::<Dynamic>(&self.engine, &self.ast, args)
                .map(|_| ())
                .map_err(runtime_error),
            None => Err(ScriptError::Runtime {
                message: format!("function '{}' not found", name),
                traceback: Vec::new(),
            }),
        }
    }

    fn read_global(&self, name: &str, kind: GlobalKind) -> Result<Global, ScriptError> {
        let value = self
            .scope
            .get(scope_name(name))
            .ok_or_else(|| ScriptError::GlobalUnset { name: name.to_string() })?;
        let found = match kind {
            GlobalKind::Str if value.is_string() => value.clone().into_string().ok().map(Global::Str),
            GlobalKind::Num => value
                .as_int()
                .map(|i| i as f64)
                .or_else(|_| value.as_float())
                .ok()
                .map(Global::Num),
            GlobalKind::Bool => value.as_bool().ok().map(Global::Bool),
            _ => None,
        };
        found.ok_or_else(|| ScriptError::GlobalType {
            name: name.to_string(),
            expected: kind.name(),
            found: value.type_name().to_string(),
        })
    }

    fn define_global(&mut self, name: &str, value: Global) -> Result<(), ScriptError> {
        let value = match value {
            Global::Str(s) => Dynamic::from(s),
            Global::Num(n) => match integral(n) {
                Some(i) => Dynamic::from(i as INT),
                None => Dynamic::from(n as FLOAT),
            },
            Global::Bool(b) => Dynamic::from(b),
        };
        self.scope.set_value(scope_name(name).to_string(), value);
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.scope.len())
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        if self.scope.len() > checkpoint.0 {
            log::debug!("rhai: rewinding scope {} -> {}", self.scope.len(), checkpoint.0);
            self.scope.rewind(checkpoint.0);
        }
    }
}
