//! cel7 desktop frontend.
//!
//! Provides two execution modes:
//!
//! - **GUI mode** (default): Scaled window at 40 ticks per second with
//!   keyboard, text and mouse input forwarded to the script.
//! - **Headless mode** (`--headless`): Runs N ticks without a window and
//!   prints text snapshots of the display grid.
//!
//! Without a script argument the frontend looks for a script appended to its
//! own executable after a NUL byte.
//!
//! GUI keys: F5 = reload config, F10 = start/stop frame capture,
//! F12 = PNG screenshot, Esc (release) = quit.

use anyhow::{bail, Context, Result};
use cel7_core::display::{self, rgba_to_rgb};
use cel7_core::input::{self, InputEvent};
use cel7_core::loader::{self, Source};
use cel7_core::{Bank, Config, Console, Mode, DISPLAY_START};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Scale, ScaleMode, Window, WindowOptions};
use std::cell::RefCell;
use std::env;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level};

/// Ticks per second
const TICK_RATE: usize = 40;
/// Start-mode steps before the host moves on to Setup (one second)
const SPLASH_STEPS: u64 = TICK_RATE as u64;
/// Frames kept while capturing
const CAPTURE_FRAMES: usize = 200;
/// Capture every Nth rendered frame
const CAPTURE_INTERVAL: u32 = 2;

// ─── Options ────────────────────────────────────────────────────────────────

struct Options {
    debug: bool,
    headless: bool,
    frames: usize,
    snapshots: Vec<usize>,
    scale: Option<usize>,
    png: Option<String>,
    script: Option<String>,
}

enum Command {
    Run(Options),
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut opts = Options {
        debug: false,
        headless: false,
        frames: 60,
        snapshots: Vec::new(),
        scale: None,
        png: None,
        script: None,
    };
    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-d" => opts.debug = !opts.debug,
            "-V" | "-v" => return Ok(Command::Version),
            "-h" | "--help" => return Ok(Command::Help),
            "--headless" => opts.headless = true,
            "--frames" => opts.frames = value(args, &mut i)?.parse::<usize>().context("--frames")?,
            "--snapshot" => {
                let frame = value(args, &mut i)?.parse::<usize>().context("--snapshot")?;
                opts.snapshots.push(frame);
            }
            "--scale" => opts.scale = Some(value(args, &mut i)?.parse::<usize>().context("--scale")?),
            "--png" => opts.png = Some(value(args, &mut i)?.to_string()),
            s if s.starts_with('-') => return Ok(Command::Help),
            s => opts.script = Some(s.to_string()),
        }
        i += 1;
    }
    Ok(Command::Run(opts))
}

/// The argument following the flag at `*i`.
fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    match args.get(*i) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{} expects a value", flag),
    }
}

fn usage(program: &str) {
    eprintln!("cel7 v{} - Rust", env!("CARGO_PKG_VERSION"));
    eprintln!("usage: {} [-d] [options] [file.lua | file.rhai]", program);
    eprintln!("       {} [-V]", program);
    eprintln!("       {} [-h]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d                   Debug logging, skip the splash screen");
    eprintln!("  --headless           Run without a window");
    eprintln!("  --frames N           Ticks to run in headless mode (default 60)");
    eprintln!("  --snapshot N         Print the display after tick N (repeatable)");
    eprintln!("  --scale N            Default pixel scale (1-16)");
    eprintln!("  --png FILE           Save a screenshot when headless mode ends");
    eprintln!();
    eprintln!("GUI keys: F5=Reload config F10=Capture F12=Screenshot Esc=Quit");
}

fn setup_logging(debug: bool) {
    use tracing_subscriber::util::SubscriberInitExt;

    let level = if debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .compact()
        .finish()
        .init();
}

/// Script from the given path, or the payload appended to this executable.
fn load_source(script: Option<&str>) -> Result<Source> {
    match script {
        Some(path) => {
            let path = Path::new(path);
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(loader::from_path_bytes(path, bytes)?)
        }
        None => {
            let exe = env::current_exe().context("locating executable")?;
            let bytes = fs::read(&exe).with_context(|| format!("reading {}", exe.display()))?;
            loader::from_binary_payload(&bytes).context("no script given and none embedded")
        }
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("cel7");
    let opts = match parse_args(&args)? {
        Command::Run(opts) => opts,
        Command::Version => {
            println!("cel7 v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Help => {
            usage(program);
            return Ok(());
        }
    };

    setup_logging(opts.debug);

    let mut config = Config { debug: opts.debug, ..Config::default() };
    if let Some(scale) = opts.scale {
        config.scale = scale;
        config.validate().context("--scale")?;
    }

    let source = load_source(opts.script.as_deref())?;
    let mut console = Console::boot(config, &source).context("booting console")?;
    if opts.debug {
        console.set_mode(Mode::Normal);
    }

    if opts.headless {
        run_headless(&mut console, &opts)
    } else {
        run_gui(&mut console)
    }
}

/// Drive the host side of `Start → Setup → Normal`. Returns true if the
/// window has to be rebuilt for a new geometry.
fn advance_boot_modes(console: &mut Console) -> bool {
    match console.mode() {
        Mode::Start if console.mode_steps(Mode::Start) >= SPLASH_STEPS => {
            console.set_mode(Mode::Setup);
            false
        }
        Mode::Setup if console.mode_steps(Mode::Setup) >= 1 => {
            let rebuild = match console.reload_config() {
                Ok(changed) => changed,
                Err(e) => {
                    error!("config: {}", e);
                    false
                }
            };
            if console.mode() == Mode::Setup {
                console.set_mode(Mode::Normal);
            }
            rebuild
        }
        _ => false,
    }
}

// ─── GUI Mode ───────────────────────────────────────────────────────────────

/// Collects typed characters between two frames.
struct TextInput(Rc<RefCell<String>>);

impl minifb::InputCallback for TextInput {
    fn add_char(&mut self, uni_char: u32) {
        if let Some(c) = char::from_u32(uni_char).filter(|c| !c.is_control()) {
            self.0.borrow_mut().push(c);
        }
    }
}

fn open_window(config: &Config, text: &Rc<RefCell<String>>) -> Result<Window> {
    let (w, h) = config.window_size();
    let mut window = Window::new(
        &config.title,
        w,
        h,
        WindowOptions {
            scale: Scale::X1,
            scale_mode: ScaleMode::AspectRatioStretch,
            resize: true,
            ..Default::default()
        },
    )
    .context("creating window")?;
    window.set_target_fps(TICK_RATE);
    window.set_input_callback(Box::new(TextInput(text.clone())));
    Ok(window)
}

fn key_name(key: Key) -> &'static str {
    // Debug names: "Escape", "A", "Key1", ...
    input::key_name(format!("{:?}", key).trim_start_matches("Key"))
}

const MOUSE_BUTTONS: [(MouseButton, &str); 3] = [
    (MouseButton::Left, "left"),
    (MouseButton::Middle, "middle"),
    (MouseButton::Right, "right"),
];

fn run_gui(console: &mut Console) -> Result<()> {
    let text = Rc::new(RefCell::new(String::new()));
    let mut config = console.config();
    let mut window = open_window(&config, &text)?;
    let mut scaled_buf = Vec::new();

    let mut last_mouse: Option<(f32, f32)> = None;
    let mut prev_buttons = [false; 3];
    let mut last_size = window.get_size();
    let mut screenshot_n = 0u32;
    let mut capture_n = 0u32;
    let start_time = Instant::now();

    while window.is_open() && !console.quit_requested() {
        // Host keys
        for key in window.get_keys_pressed(KeyRepeat::No) {
            match key {
                Key::F5 => match console.reload_config() {
                    Ok(true) => {
                        config = console.config();
                        window = open_window(&config, &text)?;
                    }
                    Ok(false) => config = console.config(),
                    Err(e) => error!("reload: {}", e),
                },
                Key::F12 => {
                    let path = format!("screenshot_{:04}.png", screenshot_n);
                    match fs::write(&path, console.screenshot_png()) {
                        Ok(()) => {
                            info!("screenshot: {}", path);
                            screenshot_n += 1;
                        }
                        Err(e) => error!("screenshot {}: {}", path, e),
                    }
                }
                Key::F10 => toggle_capture(console, &mut capture_n),
                _ => {
                    console.handle_event(&InputEvent::KeyDown(key_name(key).to_string()));
                }
            }
        }
        for key in window.get_keys_released() {
            if !matches!(key, Key::F5 | Key::F10 | Key::F12) {
                console.handle_event(&InputEvent::KeyUp(key_name(key).to_string()));
            }
        }

        let typed = std::mem::take(&mut *text.borrow_mut());
        if !typed.is_empty() {
            console.handle_event(&InputEvent::Text(typed));
        }

        // Mouse
        let size = window.get_size();
        let grid = (config.width, config.height);
        if let Some((px, py)) = window.get_mouse_pos(MouseMode::Discard) {
            let (x, y) = input::to_cells(px, py, size, grid);
            if last_mouse != Some((px, py)) {
                console.handle_event(&InputEvent::MouseMotion { x, y });
                last_mouse = Some((px, py));
            }
            for (i, (button, name)) in MOUSE_BUTTONS.iter().enumerate() {
                let down = window.get_mouse_down(*button);
                if down && !prev_buttons[i] {
                    let event = InputEvent::MouseDown { button: name.to_string(), clicks: 1, x, y };
                    console.handle_event(&event);
                }
                prev_buttons[i] = down;
            }
            if let Some((_, dy)) = window.get_scroll_wheel() {
                if dy != 0.0 {
                    console.handle_event(&InputEvent::MouseWheel { delta: dy.signum(), x, y });
                }
            }
        }
        if size != last_size {
            console.handle_event(&InputEvent::Resize { w: size.0 as u32, h: size.1 as u32 });
            last_size = size;
        }

        console.tick(Instant::now());
        if advance_boot_modes(console) {
            config = console.config();
            window = open_window(&config, &text)?;
            last_size = window.get_size();
        }

        // Present
        let (fw, fh) = console.frame_size();
        let scale = config.scale;
        let (sw, sh) = (fw * scale, fh * scale);
        scaled_buf.resize(sw * sh, 0);
        let pixels = console.pixels();
        for y in 0..fh {
            for x in 0..fw {
                let c = rgba_to_rgb(pixels[y * fw + x]);
                for sy in 0..scale {
                    let base = (y * scale + sy) * sw + x * scale;
                    scaled_buf[base..base + scale].fill(c);
                }
            }
        }
        window
            .update_with_buffer(&scaled_buf, sw, sh)
            .context("presenting frame")?;
    }

    if console.capture().is_some() {
        toggle_capture(console, &mut capture_n);
    }
    if config.debug {
        let secs = start_time.elapsed().as_secs_f64();
        info!(
            "{} ticks in {:.1}s ({:.1} per second)",
            console.ticks(),
            secs,
            console.ticks() as f64 / secs
        );
    }
    Ok(())
}

/// Start capturing, or stop and write the captured frames as PNG files.
fn toggle_capture(console: &mut Console, capture_n: &mut u32) {
    let Some(capture) = console.disable_capture() else {
        console.enable_capture(CAPTURE_FRAMES, CAPTURE_INTERVAL);
        info!("capture started");
        return;
    };
    let mut written = 0;
    for (i, frame) in capture.frames().enumerate() {
        let path = format!("capture_{:03}_{:04}.png", capture_n, i);
        let rgba = display::pixels_to_rgba_bytes(&frame.pixels);
        let png = cel7_core::png::encode_png(frame.width as u32, frame.height as u32, &rgba);
        match fs::write(&path, png) {
            Ok(()) => written += 1,
            Err(e) => {
                error!("capture {}: {}", path, e);
                break;
            }
        }
    }
    info!("capture {}: wrote {} frames", capture_n, written);
    *capture_n += 1;
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(console: &mut Console, opts: &Options) -> Result<()> {
    let tick = Duration::from_secs(1) / TICK_RATE as u32;
    let t0 = Instant::now();
    for frame in 0..opts.frames {
        console.tick(t0 + tick * frame as u32);
        advance_boot_modes(console);
        if opts.snapshots.contains(&(frame + 1)) {
            println!("\n  === Tick {} ({}) ===", frame + 1, console.mode());
            print_display(console);
        }
        if console.quit_requested() {
            info!("quit after {} ticks", frame + 1);
            break;
        }
    }
    if opts.debug {
        println!("\n  === Final ({}) ===", console.mode());
        print_display(console);
    }
    if let Some(path) = &opts.png {
        fs::write(path, console.screenshot_png()).with_context(|| format!("writing {}", path))?;
        info!("screenshot: {}", path);
    }
    if console.mode() == Mode::Error {
        warn!("script ended in error mode");
    }
    Ok(())
}

/// Print the display grid as text, unprintable glyphs as blanks.
fn print_display(console: &Console) {
    let config = console.config();
    let state = console.state();
    let bank = if console.mode() == Mode::Start { Bank::Rom } else { state.bank };
    let cells = state.memory.bank_bytes(bank);
    for y in 0..config.height {
        let mut line = String::with_capacity(config.width + 4);
        line.push_str("  |");
        for x in 0..config.width {
            let ch = cells[DISPLAY_START + (y * config.width + x) * 2];
            line.push(if display::printable(ch) == ch { ch as char } else { ' ' });
        }
        line.push('|');
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("cel7").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn test_parse_args() {
        let Command::Run(opts) = parse_args(&args(&[
            "-d", "--headless", "--frames", "10", "--snapshot", "3", "--snapshot", "5", "game.lua",
        ]))
        .unwrap() else {
            panic!("expected run");
        };
        assert!(opts.debug && opts.headless);
        assert_eq!(opts.frames, 10);
        assert_eq!(opts.snapshots, vec![3, 5]);
        assert_eq!(opts.script.as_deref(), Some("game.lua"));
    }

    #[test]
    fn test_parse_flags() {
        assert!(matches!(parse_args(&args(&["-V"])).unwrap(), Command::Version));
        assert!(matches!(parse_args(&args(&["-x"])).unwrap(), Command::Help));
        assert!(parse_args(&args(&["--frames"])).is_err());
        assert!(parse_args(&args(&["--frames", "many"])).is_err());
    }

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(Key::Escape), "escape");
        assert_eq!(key_name(Key::A), "a");
        assert_eq!(key_name(Key::Key7), "7");
        assert_eq!(key_name(Key::Up), "up");
        assert_eq!(key_name(Key::LeftShift), "unknown");
    }

    #[test]
    fn test_splash_sequence() {
        let source = Source {
            text: "function __setup_init() width = 30 end".into(),
            frontend: cel7_core::Frontend::Lua,
            name: "t".into(),
        };
        let mut console = Console::boot(Config::default(), &source).unwrap();
        let t0 = Instant::now();
        let mut rebuilt = false;
        for i in 0..(SPLASH_STEPS as u32 + 2) {
            console.tick(t0 + Duration::from_millis(i as u64));
            rebuilt |= advance_boot_modes(&mut console);
        }
        assert_eq!(console.mode(), Mode::Normal);
        assert!(rebuilt);
        assert_eq!(console.config().width, 30);
    }
}
