//! Console mode state machine.
//!
//! The active mode selects the callback namespace. The host drives
//! `Start → Setup → Normal`; a failed dispatch moves the console to `Error`,
//! which it only leaves through an explicit [`ModeMachine::set`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Splash screen, renders the Rom bank
    Start,
    /// One-shot setup after the splash
    Setup,
    Normal,
    Error,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Start, Mode::Setup, Mode::Normal, Mode::Error];

    /// Prefix prepended to callback names while this mode is active.
    pub fn namespace(self) -> &'static str {
        match self {
            Mode::Start => "__start_",
            Mode::Setup => "__setup_",
            Mode::Normal => "",
            Mode::Error => "__error_",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Start => "start",
            Mode::Setup => "setup",
            Mode::Normal => "normal",
            Mode::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ModeStatus {
    initialized: bool,
    steps: u64,
}

/// Current mode plus per-mode init flag and step counter.
#[derive(Debug, Clone)]
pub struct ModeMachine {
    current: Mode,
    status: [ModeStatus; 4],
}

impl ModeMachine {
    pub fn new(initial: Mode) -> Self {
        ModeMachine {
            current: initial,
            status: [ModeStatus::default(); 4],
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Switch to `mode`; its `init` callback runs again on the next tick.
    pub fn set(&mut self, mode: Mode) {
        if mode != self.current {
            log::info!("mode: {} -> {}", self.current, mode);
        }
        self.current = mode;
        self.status[mode.index()].initialized = false;
    }

    /// Record a failed dispatch. Returns true if the machine entered
    /// `Error`, false if it was already there.
    pub fn fail(&mut self) -> bool {
        if self.current == Mode::Error {
            return false;
        }
        self.set(Mode::Error);
        true
    }

    /// Qualify a callback name with the active namespace.
    pub fn qualify(&self, name: &str) -> String {
        format!("{}{}", self.current.namespace(), name)
    }

    pub fn is_initialized(&self, mode: Mode) -> bool {
        self.status[mode.index()].initialized
    }

    pub fn mark_initialized(&mut self, mode: Mode) {
        self.status[mode.index()].initialized = true;
    }

    pub fn steps(&self, mode: Mode) -> u64 {
        self.status[mode.index()].steps
    }

    pub fn bump_steps(&mut self, mode: Mode) {
        self.status[mode.index()].steps += 1;
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new(Mode::Start)
    }
}
