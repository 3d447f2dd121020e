//! Scripted I/O surface: the console's "instruction set".
//!
//! Each primitive pops its inputs left to right from an [`ArgList`] and
//! forwards them to [`ConsoleState`]. Both script front-ends register every
//! entry of [`API`] under the same name, converting their native values to
//! and from [`Value`].

use crate::memory::AccessError;
use crate::state::ConsoleState;
use std::collections::VecDeque;
use thiserror::Error;

/// Engine-neutral script value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    /// Byte string (scripts' text values)
    Str(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error(transparent)]
    Address(#[from] AccessError),
    #[error("{op}: division by zero")]
    DivideByZero { op: &'static str },
    #[error("{op}: value {value} out of range")]
    ValueOutOfRange { op: &'static str, value: f64 },
    #[error("{op}: argument {index} must be a {expected}, got {found}")]
    ArgType {
        op: &'static str,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{op}: missing argument {index}")]
    MissingArg { op: &'static str, index: usize },
    #[error("Expected a string with one character, got {len}")]
    FillChar { len: usize },
    #[error("cell ({x}, {y}) outside the {width}x{height} display")]
    CellOutOfRange {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },
}

/// Arguments of one primitive call, consumed left to right.
pub struct ArgList {
    op: &'static str,
    values: VecDeque<Value>,
    index: usize,
}

impl ArgList {
    pub fn new(op: &'static str, values: Vec<Value>) -> Self {
        ArgList { op, values: values.into(), index: 0 }
    }

    fn next_value(&mut self) -> Result<Value, ApiError> {
        self.index += 1;
        self.values
            .pop_front()
            .ok_or(ApiError::MissingArg { op: self.op, index: self.index })
    }

    fn mismatch(&self, expected: &'static str, found: &Value) -> ApiError {
        ApiError::ArgType {
            op: self.op,
            index: self.index,
            expected,
            found: found.type_name(),
        }
    }

    pub fn next(&mut self) -> Result<Value, ApiError> {
        self.next_value()
    }

    pub fn number(&mut self) -> Result<f64, ApiError> {
        match self.next_value()? {
            Value::Number(n) => Ok(n),
            other => Err(self.mismatch("number", &other)),
        }
    }

    /// Number truncated toward zero; non-finite or out of `i64` range fails.
    pub fn int(&mut self) -> Result<i64, ApiError> {
        let n = self.number()?;
        to_int(self.op, n)
    }

    /// Non-negative integer used as an address or size.
    pub fn index(&mut self) -> Result<usize, ApiError> {
        let n = self.int()?;
        usize::try_from(n).map_err(|_| ApiError::ValueOutOfRange { op: self.op, value: n as f64 })
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, ApiError> {
        match self.next_value()? {
            Value::Str(s) => Ok(s),
            other => Err(self.mismatch("string", &other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn to_int(op: &'static str, n: f64) -> Result<i64, ApiError> {
    // i64::MAX as f64 rounds up to 2^63, which itself is out of range
    if !n.is_finite() || n < i64::MIN as f64 || n >= i64::MAX as f64 {
        return Err(ApiError::ValueOutOfRange { op, value: n });
    }
    Ok(n.trunc() as i64)
}

pub type ApiFn = fn(&mut ConsoleState, &mut ArgList) -> Result<Value, ApiError>;

/// One registered primitive.
pub struct ApiEntry {
    pub name: &'static str,
    /// Accepted argument counts (front-ends without variadics register one
    /// overload per arity)
    pub arities: &'static [usize],
    pub func: ApiFn,
}

pub const API: &[ApiEntry] = &[
    ApiEntry { name: "idiv",     arities: &[2],    func: api_divide },
    ApiEntry { name: "imod",     arities: &[2],    func: api_modulus },
    ApiEntry { name: "quit",     arities: &[0],    func: api_quit },
    ApiEntry { name: "rand",     arities: &[1],    func: api_rand },
    ApiEntry { name: "poke",     arities: &[2],    func: api_poke },
    ApiEntry { name: "peek",     arities: &[1, 2], func: api_peek },
    ApiEntry { name: "color",    arities: &[1],    func: api_color },
    ApiEntry { name: "put",      arities: &[3],    func: api_put },
    ApiEntry { name: "get",      arities: &[2],    func: api_get },
    ApiEntry { name: "fill",     arities: &[5],    func: api_fill },
    ApiEntry { name: "strlen",   arities: &[1],    func: api_strlen },
    ApiEntry { name: "strstart", arities: &[2],    func: api_strstart },
    ApiEntry { name: "strat",    arities: &[2],    func: api_strat },
    ApiEntry { name: "char2num", arities: &[1],    func: api_char2num },
    ApiEntry { name: "username", arities: &[0],    func: api_username },
    ApiEntry { name: "bank",     arities: &[0, 1], func: api_bank },
];

/// Look up a primitive by its script name.
pub fn lookup(name: &str) -> Option<&'static ApiEntry> {
    API.iter().find(|e| e.name == name)
}

/// Run a primitive against the console state.
pub fn invoke(entry: &ApiEntry, st: &mut ConsoleState, args: Vec<Value>) -> Result<Value, ApiError> {
    let mut list = ArgList::new(entry.name, args);
    (entry.func)(st, &mut list)
}

fn api_divide(_: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let a = args.int()?;
    let b = args.int()?;
    Ok(Value::Number(ConsoleState::divide(a, b)? as f64))
}

fn api_modulus(_: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let a = args.int()?;
    let b = args.int()?;
    Ok(Value::Number(ConsoleState::modulus(a, b)? as f64))
}

fn api_quit(st: &mut ConsoleState, _: &mut ArgList) -> Result<Value, ApiError> {
    st.quit = true;
    Ok(Value::Nil)
}

fn api_rand(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let n = args.int()?;
    Ok(Value::Number(st.random(n)? as f64))
}

fn api_poke(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let addr = args.index()?;
    match args.next()? {
        Value::Str(bytes) => st.poke(addr, &bytes)?,
        // Wraps like a C byte store
        Value::Number(n) => st.poke(addr, &[to_int("poke", n)? as u8])?,
        other => {
            return Err(ApiError::ArgType {
                op: "poke",
                index: 2,
                expected: "string or number",
                found: other.type_name(),
            })
        }
    }
    Ok(Value::Nil)
}

fn api_peek(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let addr = args.index()?;
    if args.is_empty() {
        let byte = st.peek(addr, 1)?[0];
        return Ok(Value::Number(byte as f64));
    }
    let size = args.index()?;
    Ok(Value::Str(st.peek(addr, size)?))
}

fn api_color(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let c = args.int()?;
    st.set_color(c)?;
    Ok(Value::Nil)
}

fn api_put(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let x = args.int()?;
    let y = args.int()?;
    let text = match args.next()? {
        Value::Str(s) => s,
        // Numbers print as the script would show them
        Value::Number(n) => format_number(n).into_bytes(),
        other => {
            return Err(ApiError::ArgType {
                op: "put",
                index: 3,
                expected: "string",
                found: other.type_name(),
            })
        }
    };
    st.put(x, y, &text)?;
    Ok(Value::Nil)
}

fn api_get(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let x = args.int()?;
    let y = args.int()?;
    Ok(Value::Number(st.get(x, y)? as f64))
}

fn api_fill(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let x = args.int()?;
    let y = args.int()?;
    let w = args.int()?;
    let h = args.int()?;
    let ch = args.bytes()?;
    st.fill(x, y, w, h, &ch)?;
    Ok(Value::Nil)
}

fn api_strlen(_: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    Ok(Value::Number(args.bytes()?.len() as f64))
}

fn api_strstart(_: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let s = args.bytes()?;
    let prefix = args.bytes()?;
    Ok(Value::Bool(s.starts_with(&prefix)))
}

fn api_strat(_: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let s = args.bytes()?;
    let i = args.index()?;
    match s.get(i) {
        Some(&b) => Ok(Value::Str(vec![b])),
        None => Err(ApiError::ValueOutOfRange { op: "strat", value: i as f64 }),
    }
}

fn api_char2num(_: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    let s = args.bytes()?;
    Ok(Value::Number(s.first().copied().unwrap_or(0) as f64))
}

fn api_username(_: &mut ConsoleState, _: &mut ArgList) -> Result<Value, ApiError> {
    Ok(Value::from(username().as_str()))
}

fn api_bank(st: &mut ConsoleState, args: &mut ArgList) -> Result<Value, ApiError> {
    if args.is_empty() {
        return Ok(Value::Number(st.bank.number() as f64));
    }
    let n = args.int()?;
    st.select_bank(n)?;
    Ok(Value::Nil)
}

/// OS user name, `"root"` when unknown.
pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "root".to_string())
}

/// Integral numbers without a fractional part (`3`, not `3.0`).
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn call(st: &mut ConsoleState, name: &str, args: Vec<Value>) -> Result<Value, ApiError> {
        invoke(lookup(name).unwrap(), st, args)
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_table_names_unique() {
        for (i, a) in API.iter().enumerate() {
            assert!(API[i + 1..].iter().all(|b| b.name != a.name), "duplicate {}", a.name);
            assert!(!a.arities.is_empty());
        }
    }

    #[test]
    fn test_divide() {
        let mut st = ConsoleState::with_seed(Config::default(), 1);
        assert_eq!(call(&mut st, "idiv", vec![num(7.0), num(2.0)]), Ok(num(3.0)));
        assert_eq!(call(&mut st, "idiv", vec![num(-7.0), num(2.0)]), Ok(num(-3.0)));
        assert_eq!(call(&mut st, "idiv", vec![num(7.9), num(2.1)]), Ok(num(3.0)));
        assert_eq!(
            call(&mut st, "imod", vec![num(5.0), num(0.0)]),
            Err(ApiError::DivideByZero { op: "imod" })
        );
        assert!(matches!(
            call(&mut st, "idiv", vec![num(1e300), num(2.0)]),
            Err(ApiError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_arg_errors() {
        let mut st = ConsoleState::with_seed(Config::default(), 1);
        assert_eq!(
            call(&mut st, "idiv", vec![num(1.0)]),
            Err(ApiError::MissingArg { op: "idiv", index: 2 })
        );
        assert_eq!(
            call(&mut st, "strlen", vec![num(1.0)]),
            Err(ApiError::ArgType { op: "strlen", index: 1, expected: "string", found: "number" })
        );
        assert!(matches!(
            call(&mut st, "poke", vec![num(-1.0), num(1.0)]),
            Err(ApiError::ValueOutOfRange { op: "poke", .. })
        ));
    }

    #[test]
    fn test_peek_poke_composition() {
        let mut st = ConsoleState::with_seed(Config::default(), 1);
        call(&mut st, "poke", vec![num(100.0), num(0x1FF as f64)]).unwrap();
        assert_eq!(call(&mut st, "peek", vec![num(100.0)]), Ok(num(255.0)));

        call(&mut st, "poke", vec![num(200.0), Value::from("cel7")]).unwrap();
        assert_eq!(call(&mut st, "peek", vec![num(200.0), num(4.0)]), Ok(Value::from("cel7")));
    }

    #[test]
    fn test_put_get_fill() {
        let mut st = ConsoleState::with_seed(Config::default(), 1);
        call(&mut st, "put", vec![num(23.0), num(0.0), Value::from("AB")]).unwrap();
        assert_eq!(call(&mut st, "get", vec![num(23.0), num(0.0)]), Ok(num(b'A' as f64)));
        call(&mut st, "put", vec![num(0.0), num(1.0), num(42.0)]).unwrap();
        assert_eq!(call(&mut st, "get", vec![num(1.0), num(1.0)]), Ok(num(b'2' as f64)));
        assert_eq!(
            call(&mut st, "fill", vec![num(0.0), num(0.0), num(1.0), num(1.0), Value::from("ab")]),
            Err(ApiError::FillChar { len: 2 })
        );
    }

    #[test]
    fn test_string_helpers() {
        let mut st = ConsoleState::with_seed(Config::default(), 1);
        assert_eq!(call(&mut st, "strlen", vec![Value::from("hello")]), Ok(num(5.0)));
        assert_eq!(
            call(&mut st, "strstart", vec![Value::from("hello"), Value::from("he")]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            call(&mut st, "strstart", vec![Value::from("he"), Value::from("hello")]),
            Ok(Value::Bool(false))
        );
        assert_eq!(call(&mut st, "strat", vec![Value::from("hello"), num(1.0)]), Ok(Value::from("e")));
        assert!(call(&mut st, "strat", vec![Value::from("hi"), num(2.0)]).is_err());
        assert_eq!(call(&mut st, "char2num", vec![Value::from("A")]), Ok(num(65.0)));
        assert_eq!(call(&mut st, "char2num", vec![Value::from("")]), Ok(num(0.0)));
    }

    #[test]
    fn test_quit_and_bank() {
        let mut st = ConsoleState::with_seed(Config::default(), 1);
        call(&mut st, "quit", vec![]).unwrap();
        assert!(st.quit);
        assert_eq!(call(&mut st, "bank", vec![]), Ok(num(0.0)));
        call(&mut st, "bank", vec![num(1.0)]).unwrap();
        assert_eq!(call(&mut st, "bank", vec![]), Ok(num(1.0)));
    }

    #[test]
    fn test_username_not_empty() {
        assert!(!username().is_empty());
    }
}
