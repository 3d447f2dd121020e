//! The console: state, script engine and mode machine wired together.
//!
//! [`Console::call`] is the single dispatch boundary. Script failures are
//! logged there and turned into a transition to [`Mode::Error`]; nothing
//! script-originated propagates to the host loop.

use crate::capture::{Frame, FrameCapture};
use crate::config::Config;
use crate::display;
use crate::error::Result;
use crate::input::{Action, InputEvent};
use crate::loader::Source;
use crate::memory::Bank;
use crate::mode::{Mode, ModeMachine};
use crate::png;
use crate::script::{self, Arg, Binding, Checkpoint, Frontend, Global, GlobalKind, ScriptEngine, ScriptError};
use crate::state::ConsoleState;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Instant;

/// Result of one callback dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// No such callback in the active namespace
    Skipped,
    Completed,
    /// Raised an error; the console is (or stays) in Error mode
    Failed,
}

/// Restores the engine checkpoint when dropped, whether the call succeeded or not.
struct CheckpointGuard<'a> {
    engine: &'a mut dyn ScriptEngine,
    checkpoint: Checkpoint,
}

impl<'a> CheckpointGuard<'a> {
    fn new(engine: &'a mut dyn ScriptEngine) -> Self {
        let checkpoint = engine.checkpoint();
        CheckpointGuard { engine, checkpoint }
    }
}

impl Drop for CheckpointGuard<'_> {
    fn drop(&mut self) {
        self.engine.restore(self.checkpoint);
    }
}

pub struct Console {
    state: Rc<RefCell<ConsoleState>>,
    engine: Box<dyn ScriptEngine>,
    modes: ModeMachine,
    /// RGBA8888, rewritten on every pass
    pixels: Vec<u32>,
    last_pass: Option<Instant>,
    /// Completed step+render passes
    ticks: u64,
    capture: Option<FrameCapture>,
}

impl Console {
    /// Create the engine, export config defaults, run the script's top level
    /// and read the resulting config back. The console starts in Start mode.
    pub fn boot(config: Config, source: &Source) -> Result<Console> {
        Self::with_state(ConsoleState::new(config), source)
    }

    /// Like [`Console::boot`] with a fixed RNG seed.
    pub fn boot_seeded(config: Config, source: &Source, seed: u64) -> Result<Console> {
        Self::with_state(ConsoleState::with_seed(config, seed), source)
    }

    fn with_state(state: ConsoleState, source: &Source) -> Result<Console> {
        let defaults = state.config.clone();
        let state = Rc::new(RefCell::new(state));
        let mut engine = script::create(source.frontend, state.clone())?;

        engine.define_global("title", Global::Str(defaults.title.clone()))?;
        engine.define_global("width", Global::Num(defaults.width as f64))?;
        engine.define_global("height", Global::Num(defaults.height as f64))?;
        engine.define_global("scale", Global::Num(defaults.scale as f64))?;
        engine.define_global("debug", Global::Bool(defaults.debug))?;

        log::info!("loading {} ({})", source.name, source.frontend);
        engine.load(&source.text, &source.name)?;

        let mut console = Console {
            state,
            engine,
            modes: ModeMachine::new(Mode::Start),
            pixels: Vec::new(),
            last_pass: None,
            ticks: 0,
            capture: None,
        };
        console.reload_config()?;
        console.render();
        Ok(console)
    }

    fn global_num(&self, name: &str) -> std::result::Result<f64, ScriptError> {
        let value = self.engine.read_global(name, GlobalKind::Num)?;
        value.as_num().ok_or_else(|| ScriptError::GlobalType {
            name: name.to_string(),
            expected: GlobalKind::Num.name(),
            found: format!("{:?}", value),
        })
    }

    fn global_str(&self, name: &str) -> std::result::Result<String, ScriptError> {
        let value = self.engine.read_global(name, GlobalKind::Str)?;
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(ScriptError::GlobalType {
                name: name.to_string(),
                expected: GlobalKind::Str.name(),
                found: format!("{:?}", value),
            }),
        }
    }

    fn global_bool(&self, name: &str) -> std::result::Result<bool, ScriptError> {
        match self.engine.read_global(name, GlobalKind::Bool)? {
            Global::Bool(b) => Ok(b),
            other => Err(ScriptError::GlobalType {
                name: name.to_string(),
                expected: GlobalKind::Bool.name(),
                found: format!("{:?}", other),
            }),
        }
    }

    /// Re-read the config globals from the script.
    ///
    /// Returns true if the grid size or scale changed, so the host has to
    /// rebuild its window.
    pub fn reload_config(&mut self) -> Result<bool> {
        let title = self.global_str("title")?;
        let width = self.global_num("width")?;
        let height = self.global_num("height")?;
        let scale = self.global_num("scale")?;
        let delay = match self.global_num("delay") {
            Ok(ms) => Some(ms),
            Err(ScriptError::GlobalUnset { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let debug = match self.global_bool("debug") {
            Ok(b) => b,
            Err(ScriptError::GlobalUnset { .. }) => self.state.borrow().config.debug,
            Err(e) => return Err(e.into()),
        };

        let config = Config::from_globals(title, width, height, scale, delay, debug)?;
        let changed = {
            let mut state = self.state.borrow_mut();
            let changed = state.config.geometry_differs(&config);
            state.config = config;
            changed
        };
        if changed {
            let config = self.config();
            log::info!("config: {}x{} cells, scale {}", config.width, config.height, config.scale);
            // Keep pixels() in step with frame_size()
            self.redraw();
        }
        Ok(changed)
    }

    /// Dispatch `name` in the active mode's namespace.
    pub fn call(&mut self, name: &str, args: &[Arg]) -> CallOutcome {
        let qualified = self.modes.qualify(name);
        match self.engine.resolve(&qualified) {
            Binding::Unbound => CallOutcome::Skipped,
            Binding::NotCallable(found) => self.fail(ScriptError::CallableType { name: qualified, found }),
            Binding::Function => {
                log::debug!("call {}", qualified);
                let result = {
                    let mut guard = CheckpointGuard::new(self.engine.as_mut());
                    guard.engine.invoke(&qualified, args)
                };
                match result {
                    Ok(()) => CallOutcome::Completed,
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    fn fail(&mut self, err: ScriptError) -> CallOutcome {
        log::error!("{}", err);
        for line in err.traceback() {
            log::error!("    {}", line);
        }
        if self.modes.fail() {
            self.state.borrow_mut().paint_banner(&err.to_string());
        } else {
            log::warn!("error raised in error mode, staying there");
        }
        CallOutcome::Failed
    }

    /// Run one step pass and render, unless the configured delay has not
    /// elapsed since the previous pass.
    pub fn tick(&mut self, now: Instant) -> bool {
        let delay = self.state.borrow().config.delay;
        if let Some(last) = self.last_pass {
            if now.saturating_duration_since(last) < delay {
                return false;
            }
        }
        self.last_pass = Some(now);
        self.step();
        self.render();
        self.ticks += 1;
        true
    }

    /// One init/step pass of the mode machine, without rendering.
    pub fn step(&mut self) {
        let mode = self.modes.current();
        if !self.modes.is_initialized(mode) && self.call("init", &[]) != CallOutcome::Failed {
            self.modes.mark_initialized(mode);
        }
        if self.modes.current() == mode && self.call("step", &[]) != CallOutcome::Failed {
            self.modes.bump_steps(mode);
        }
    }

    /// Render the display into the pixel buffer and feed the frame capture.
    pub fn render(&mut self) {
        self.redraw();
        let st = self.state.borrow();
        if let Some(capture) = self.capture.as_mut() {
            if capture.tick_frame() {
                let (width, height) = display::buffer_size(st.config.width, st.config.height);
                capture.push(Frame {
                    width,
                    height,
                    pixels: self.pixels.clone(),
                    tick: self.ticks,
                });
            }
        }
    }

    /// The splash screen shows the Rom watermark and Error mode the Normal
    /// bank carrying the banner; other modes show the active bank.
    fn redraw(&mut self) {
        let st = self.state.borrow();
        let bank = match self.modes.current() {
            Mode::Start => Bank::Rom,
            Mode::Error => Bank::Normal,
            _ => st.bank,
        };
        display::render(&st.memory, bank, st.config.width, st.config.height, &mut self.pixels);
    }

    pub fn handle_event(&mut self, event: &InputEvent) -> CallOutcome {
        match event.action() {
            Action::Quit => {
                self.state.borrow_mut().quit = true;
                CallOutcome::Skipped
            }
            Action::Callback(name, args) => self.call(name, &args),
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Pixel buffer size `(width, height)`.
    pub fn frame_size(&self) -> (usize, usize) {
        let st = self.state.borrow();
        display::buffer_size(st.config.width, st.config.height)
    }

    pub fn screenshot_png(&self) -> Vec<u8> {
        let (w, h) = self.frame_size();
        png::encode_png(w as u32, h as u32, &display::pixels_to_rgba_bytes(&self.pixels))
    }

    pub fn config(&self) -> Config {
        self.state.borrow().config.clone()
    }

    /// Read access to the console state. Do not hold across a dispatch.
    pub fn state(&self) -> Ref<'_, ConsoleState> {
        self.state.borrow()
    }

    pub fn quit_requested(&self) -> bool {
        self.state.borrow().quit
    }

    pub fn mode(&self) -> Mode {
        self.modes.current()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.modes.set(mode);
    }

    pub fn mode_steps(&self, mode: Mode) -> u64 {
        self.modes.steps(mode)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn frontend(&self) -> Frontend {
        self.engine.frontend()
    }

    /// Start capturing every `interval`-th frame into a ring of `capacity`.
    pub fn enable_capture(&mut self, capacity: usize, interval: u32) {
        self.capture = Some(FrameCapture::new(capacity, interval));
    }

    pub fn disable_capture(&mut self) -> Option<FrameCapture> {
        self.capture.take()
    }

    pub fn capture(&self) -> Option<&FrameCapture> {
        self.capture.as_ref()
    }
}
