use crate::config::ConfigError;
use crate::script::ScriptError;
use thiserror::Error;

/// Errors surfaced to the host while booting or reconfiguring a console.
///
/// Failures inside callbacks never reach this type; the dispatcher absorbs
/// them into Error mode.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
