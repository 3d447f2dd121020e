//! Script source loading.
//!
//! Produces a [`Source`] from either a script file's bytes (front-end chosen
//! by extension) or a self-contained binary carrying its script after the
//! last NUL byte. File I/O stays in the frontend.

use crate::script::Frontend;
use std::path::Path;
use thiserror::Error;

/// Marker on the first payload line selecting Lua.
const LUA_MARKER: &str = "--lua";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown script extension: {0:?}")]
    UnknownExtension(String),
    #[error("no script payload found after a NUL byte")]
    NoPayload,
    #[error("script is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub text: String,
    pub frontend: Frontend,
    /// Chunk name used in error messages
    pub name: String,
}

/// Front-end for a script path, by extension.
pub fn frontend_for_path(path: &Path) -> Result<Frontend, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "lua" => Ok(Frontend::Lua),
        "rhai" => Ok(Frontend::Rhai),
        _ => Err(LoadError::UnknownExtension(ext)),
    }
}

/// Build a source from the contents of the script file at `path`.
pub fn from_path_bytes(path: &Path, bytes: Vec<u8>) -> Result<Source, LoadError> {
    let frontend = frontend_for_path(path)?;
    let text = String::from_utf8(bytes)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Source { text, frontend, name })
}

/// Extract the script appended to a binary after its last NUL byte.
pub fn from_binary_payload(binary: &[u8]) -> Result<Source, LoadError> {
    let nul = binary.iter().rposition(|&b| b == 0).ok_or(LoadError::NoPayload)?;
    let text = String::from_utf8(binary[nul + 1..].to_vec())?;
    let first_line = text.lines().next().unwrap_or("").trim_end();
    let frontend = if first_line == LUA_MARKER {
        Frontend::Lua
    } else {
        Frontend::Rhai
    };
    Ok(Source { text, frontend, name: "payload".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extension_selects_frontend() {
        let src = from_path_bytes(Path::new("games/snake.lua"), b"x = 1".to_vec()).unwrap();
        assert_eq!(src.frontend, Frontend::Lua);
        assert_eq!(src.name, "snake.lua");
        let src = from_path_bytes(Path::new("demo.RHAI"), b"let x = 1;".to_vec()).unwrap();
        assert_eq!(src.frontend, Frontend::Rhai);
    }

    #[test]
    fn test_unknown_extension() {
        let err = from_path_bytes(Path::new("game.py"), Vec::new()).unwrap_err();
        assert!(matches!(err, LoadError::UnknownExtension(ref e) if e == "py"));
        assert!(matches!(frontend_for_path(Path::new("noext")), Err(LoadError::UnknownExtension(_))));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = from_path_bytes(Path::new("a.lua"), vec![0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, LoadError::Encoding(_)));
    }

    #[test]
    fn test_payload_after_last_nul() {
        let mut bin = b"\x7fELF\0junk\0".to_vec();
        bin.extend_from_slice(b"--lua\nfunction step() end\n");
        let src = from_binary_payload(&bin).unwrap();
        assert_eq!(src.frontend, Frontend::Lua);
        assert!(src.text.starts_with("--lua"));

        let src = from_binary_payload(b"bin\0fn step() {}").unwrap();
        assert_eq!(src.frontend, Frontend::Rhai);
        assert_eq!(src.text, "fn step() {}");
    }

    #[test]
    fn test_no_payload() {
        assert!(matches!(from_binary_payload(b"no sentinel"), Err(LoadError::NoPayload)));
    }

    #[test]
    fn test_payload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"header\0--lua\nwidth = 10\n").unwrap();
        let bytes = std::fs::read(file.path()).unwrap();
        let src = from_binary_payload(&bytes).unwrap();
        assert_eq!(src.frontend, Frontend::Lua);
        assert_eq!(src.text, "--lua\nwidth = 10\n");
    }
}
