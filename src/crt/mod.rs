//! Terminal runtime.
//!
//! [`Crt`] owns the terminal for the lifetime of the dashboard: it enters
//! raw mode, installs the teardown signal handlers, normalizes key
//! sequences, controls input timing and keeps the color registry.
//!
//! - **backend**: terminal-control capability set (crossterm on the tty)
//! - **color**: color pairs, emphasis and the semantic role registry
//! - **keys**: escape-sequence decoding and terminal-specific remaps
//! - **signals**: async-signal-safe restore and SIGTERM/SIGSEGV handlers
//!
//! # Lifecycle
//!
//! ```text
//! (no Crt) --init--> Active --done / Drop / fatal_error / SIGTERM / SIGSEGV--> Torn down
//! ```

pub mod backend;
pub mod color;
pub mod keys;
pub mod signals;

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{CrtError, Result};
use crate::rich_string::RichString;

use self::backend::{CrosstermBackend, TerminalBackend};
use self::color::{Attr, ColorElement, ColorRegistry, ColorScheme};
use self::keys::{Key, KeyDecoder, MouseMask, XTERM_REMAP};
use self::signals::SignalHandlers;

/// Exit status of [`Crt::fatal_error`]
pub const FATAL_EXIT_CODE: i32 = 2;

/// One half-delay tick
pub const TICK: Duration = Duration::from_millis(100);

const DEFAULT_SCROLL_H_AMOUNT: u16 = 5;
const LINUX_SCROLL_H_AMOUNT: u16 = 20;

static INSTANCE_CREATED: AtomicBool = AtomicBool::new(false);
static COLORS: RwLock<Option<Arc<ColorRegistry>>> = RwLock::new(None);

/// The registry of the running runtime, or the default one before init.
pub fn colors() -> Arc<ColorRegistry> {
    if let Ok(guard) = COLORS.read() {
        if let Some(registry) = guard.as_ref() {
            return Arc::clone(registry);
        }
    }
    Arc::new(ColorRegistry::build(ColorScheme::DEFAULT))
}

fn publish_colors(registry: Arc<ColorRegistry>) {
    if let Ok(mut guard) = COLORS.write() {
        *guard = Some(registry);
    }
}

/// What the environment says about the terminal
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TerminalEnv {
    /// `TERM`, if set
    pub term_type: Option<String>,
    pub utf8: bool,
}

impl TerminalEnv {
    pub fn from_process() -> Self {
        let locale = ["LC_ALL", "LC_CTYPE", "LANG"].map(|name| std::env::var(name).ok());
        Self {
            term_type: std::env::var("TERM").ok(),
            utf8: locale_is_utf8(locale.iter().map(|v| v.as_deref())),
        }
    }
}

/// The first non-empty locale variable decides.
fn locale_is_utf8<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> bool {
    values
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .map_or(false, |v| {
            let v = v.to_ascii_lowercase();
            v.contains("utf-8") || v.contains("utf8")
        })
}

/// How `get_key` waits for input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Wait at most this many tenths of a second
    HalfDelay(u8),
    /// Wait until a key arrives
    Blocking,
    /// Return immediately
    NonBlocking,
}

impl InputMode {
    pub fn timeout(self) -> Option<Duration> {
        match self {
            InputMode::HalfDelay(ticks) => Some(TICK * u32::from(ticks)),
            InputMode::Blocking => None,
            InputMode::NonBlocking => Some(Duration::ZERO),
        }
    }
}

/// Half-delay ticks for a requested refresh delay (tenths of a second)
pub fn half_delay_ticks(delay: u32) -> u8 {
    (delay / 2).clamp(1, u32::from(u8::MAX)) as u8
}

fn scroll_h_amount(term_type: Option<&str>) -> u16 {
    if term_type == Some("linux") {
        LINUX_SCROLL_H_AMOUNT
    } else {
        DEFAULT_SCROLL_H_AMOUNT
    }
}

/// Process-wide terminal runtime
pub struct Crt<B: TerminalBackend = CrosstermBackend> {
    backend: B,
    decoder: KeyDecoder,
    colors: Arc<ColorRegistry>,
    color_scheme: ColorScheme,
    has_colors: bool,
    delay: u8,
    input_mode: InputMode,
    term_type: Option<String>,
    utf8: bool,
    scroll_h_amount: u16,
    cursor_x: u16,
    active: bool,
    signals: Option<SignalHandlers>,
}

impl Crt<CrosstermBackend> {
    /// Take over the process's terminal.
    ///
    /// Only one runtime may be created per process.
    pub fn init(delay: u32, color_scheme: ColorScheme) -> Result<Self> {
        if !io::stdin().is_terminal() {
            return Err(CrtError::NotATerminal);
        }
        if INSTANCE_CREATED.swap(true, Ordering::SeqCst) {
            return Err(CrtError::AlreadyInitialized);
        }

        let result = signals::capture_terminal_modes()
            .map_err(CrtError::from)
            .and_then(|()| {
                Self::init_with(
                    CrosstermBackend::new(),
                    TerminalEnv::from_process(),
                    delay,
                    color_scheme,
                )
            });
        let mut crt = match result {
            Ok(crt) => crt,
            Err(err) => {
                // Nothing was created; a later attempt may try again.
                signals::disarm();
                INSTANCE_CREATED.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        crt.signals = Some(signals::install()?);
        Ok(crt)
    }
}

impl<B: TerminalBackend> Crt<B> {
    /// Bring up the runtime on an arbitrary backend.
    ///
    /// Does not install signal handlers.
    pub fn init_with(
        mut backend: B,
        env: TerminalEnv,
        delay: u32,
        color_scheme: ColorScheme,
    ) -> Result<Self> {
        backend.enter()?;

        let ticks = half_delay_ticks(delay);
        let has_colors = backend.color_count() >= 8;
        let mut crt = Self {
            backend,
            decoder: KeyDecoder::new(),
            colors: Arc::new(ColorRegistry::build(color_scheme)),
            color_scheme,
            has_colors,
            delay: ticks,
            input_mode: InputMode::HalfDelay(ticks),
            scroll_h_amount: scroll_h_amount(env.term_type.as_deref()),
            term_type: env.term_type,
            utf8: env.utf8,
            cursor_x: 0,
            active: true,
            signals: None,
        };

        // From here on a failure drops `crt`, which restores the terminal.
        crt.backend.set_cursor_visible(false)?;

        if keys::needs_remap(crt.term_type.as_deref()) {
            for (seq, key) in XTERM_REMAP {
                crt.decoder.define_key(seq, *key);
            }
            debug!("Installed {} key remaps for {:?}", XTERM_REMAP.len(), crt.term_type);
        }

        let effective = if crt.has_colors {
            color_scheme
        } else {
            warn!("Terminal has no color support, using monochrome scheme");
            ColorScheme::MONOCHROME
        };
        crt.set_colors(effective);
        crt.set_mouse_mask(MouseMask::BUTTON1_CLICKED)?;

        info!(
            "Terminal runtime up: term={:?} colors={} scheme={} half_delay={} utf8={}",
            crt.term_type, crt.has_colors, crt.color_scheme, crt.delay, crt.utf8
        );
        Ok(crt)
    }

    /// Restore the terminal and end the session.
    pub fn done(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let _ = self.backend.set_cursor_visible(true);
        if let Err(err) = self.backend.leave() {
            warn!("Terminal restore failed: {}", err);
        }
        signals::disarm();
        if let Some(handlers) = self.signals.take() {
            handlers.uninstall();
        }
        info!("Terminal runtime torn down");
    }

    /// Restore the terminal, report `note` with the current OS error and exit with status 2.
    pub fn fatal_error(self, note: &str) -> ! {
        let err = io::Error::last_os_error();
        self.fatal_io_error(note, &err)
    }

    /// Like [`fatal_error`](Self::fatal_error), reporting `err` instead of `errno`.
    pub fn fatal_io_error(mut self, note: &str, err: &io::Error) -> ! {
        self.teardown();
        let mut stderr = io::stderr().lock();
        let _ = write_fatal_report(&mut stderr, note, err);
        let _ = stderr.flush();
        std::process::exit(FATAL_EXIT_CODE)
    }

    /// Read one key in the current input mode; `None` on timeout.
    pub fn get_key(&mut self) -> Result<Option<Key>> {
        let timeout = self.input_mode.timeout();
        let backend = &mut self.backend;
        let key = self.decoder.decode(timeout, |t| backend.read_byte(t))?;
        Ok(key)
    }

    /// Block until a key arrives, then go back to half-delay input.
    pub fn read_key(&mut self) -> Result<Key> {
        self.input_mode = InputMode::Blocking;
        let result = loop {
            match self.get_key() {
                Ok(Some(key)) => break Ok(key),
                Ok(None) => continue,
                Err(err) => break Err(err),
            }
        };
        self.input_mode = InputMode::HalfDelay(self.delay);
        result
    }

    /// Make `get_key` return immediately.
    pub fn disable_delay(&mut self) {
        self.input_mode = InputMode::NonBlocking;
    }

    /// Go back to the stored half-delay timeout.
    pub fn enable_delay(&mut self) {
        self.input_mode = InputMode::HalfDelay(self.delay);
    }

    /// Rebuild every color pair and role attribute for `color_scheme`.
    pub fn set_colors(&mut self, color_scheme: ColorScheme) {
        self.color_scheme = color_scheme;
        let registry = ColorRegistry::build(color_scheme);
        for pair in registry.pairs() {
            self.backend.init_pair(pair);
        }
        self.colors = Arc::new(registry);
        publish_colors(Arc::clone(&self.colors));
        debug!("Color registry rebuilt for scheme {}", color_scheme);
    }

    pub fn set_mouse_mask(&mut self, mask: MouseMask) -> Result<()> {
        self.decoder.set_mouse_mask(mask);
        self.backend.set_mouse_mask(mask)?;
        Ok(())
    }

    /// Column where the cursor is shown by [`show_cursor`](Self::show_cursor)
    pub fn set_cursor_column(&mut self, col: u16) {
        self.cursor_x = col;
    }

    pub fn show_cursor(&mut self, row: u16) -> Result<()> {
        self.backend.move_cursor(row, self.cursor_x)?;
        self.backend.set_cursor_visible(true)?;
        Ok(())
    }

    pub fn hide_cursor(&mut self) -> Result<()> {
        self.backend.set_cursor_visible(false)?;
        Ok(())
    }

    pub fn draw(&mut self, row: u16, col: u16, text: &RichString) -> Result<()> {
        self.backend.draw(row, col, text)?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.backend.clear()?;
        Ok(())
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Terminal size as (columns, rows)
    pub fn size(&self) -> Result<(u16, u16)> {
        Ok(self.backend.size()?)
    }

    pub fn attr(&self, role: ColorElement) -> Attr {
        self.colors.attr(role)
    }

    pub fn colors(&self) -> &ColorRegistry {
        &self.colors
    }

    pub fn color_scheme(&self) -> ColorScheme {
        self.color_scheme
    }

    pub fn has_colors(&self) -> bool {
        self.has_colors
    }

    /// Stored half-delay tick count
    pub fn delay(&self) -> u8 {
        self.delay
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn term_type(&self) -> Option<&str> {
        self.term_type.as_deref()
    }

    pub fn utf8(&self) -> bool {
        self.utf8
    }

    pub fn scroll_h_amount(&self) -> u16 {
        self.scroll_h_amount
    }

    pub fn cursor_x(&self) -> u16 {
        self.cursor_x
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn decoder(&self) -> &KeyDecoder {
        &self.decoder
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: TerminalBackend> Drop for Crt<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// OS error text without Rust's " (os error N)" suffix
pub fn os_error_description(err: &io::Error) -> String {
    let text = err.to_string();
    match err.raw_os_error() {
        Some(code) => {
            let suffix = format!(" (os error {})", code);
            match text.strip_suffix(&suffix) {
                Some(stripped) => stripped.to_string(),
                None => text,
            }
        }
        None => text,
    }
}

/// Write `"<note>: <error>\n"`
pub fn write_fatal_report<W: Write>(out: &mut W, note: &str, err: &io::Error) -> io::Result<()> {
    writeln!(out, "{}: {}", note, os_error_description(err))
}

#[cfg(test)]
mod tests {
    use super::backend::ScriptedBackend;
    use super::*;

    fn env(term: Option<&str>) -> TerminalEnv {
        TerminalEnv {
            term_type: term.map(str::to_string),
            utf8: true,
        }
    }

    fn crt_with(backend: ScriptedBackend, term: Option<&str>, delay: u32) -> Crt<ScriptedBackend> {
        Crt::init_with(backend, env(term), delay, ColorScheme::DEFAULT).unwrap()
    }

    #[test]
    fn test_half_delay_ticks() {
        assert_eq!(half_delay_ticks(4), 2);
        assert_eq!(half_delay_ticks(1), 1);
        assert_eq!(half_delay_ticks(0), 1);
        assert_eq!(half_delay_ticks(15), 7);
        assert_eq!(half_delay_ticks(10_000), 255);
    }

    #[test]
    fn test_init_sets_half_delay() {
        let crt = crt_with(ScriptedBackend::new(256), Some("xterm"), 4);
        assert_eq!(crt.delay(), 2);
        assert_eq!(crt.input_mode(), InputMode::HalfDelay(2));
        assert_eq!(crt.input_mode().timeout(), Some(Duration::from_millis(200)));

        let crt = crt_with(ScriptedBackend::new(256), Some("xterm"), 1);
        assert_eq!(crt.delay(), 1);
    }

    #[test]
    fn test_init_enters_raw_mode_and_hides_cursor() {
        let crt = crt_with(ScriptedBackend::new(256), None, 10);
        let backend = crt.backend();
        assert!(backend.raw);
        assert_eq!(backend.enter_calls, 1);
        assert!(!backend.cursor_visible);
        assert_eq!(backend.mouse_mask, MouseMask::BUTTON1_CLICKED);
        assert_eq!(backend.pairs.len(), 81);
        assert!(crt.is_active());
    }

    #[test]
    fn test_scroll_step_by_terminal() {
        assert_eq!(crt_with(ScriptedBackend::new(8), Some("linux"), 10).scroll_h_amount(), 20);
        assert_eq!(crt_with(ScriptedBackend::new(8), Some("xterm"), 10).scroll_h_amount(), 5);
        assert_eq!(crt_with(ScriptedBackend::new(8), Some("linux-16color"), 10).scroll_h_amount(), 5);
        assert_eq!(crt_with(ScriptedBackend::new(8), Some(""), 10).scroll_h_amount(), 5);
        assert_eq!(crt_with(ScriptedBackend::new(8), None, 10).scroll_h_amount(), 5);
    }

    #[test]
    fn test_remap_only_for_known_terminals() {
        for term in ["xterm", "xterm-color", "vt220"] {
            let crt = crt_with(ScriptedBackend::new(8), Some(term), 10);
            assert_eq!(crt.decoder().remapped_count(), XTERM_REMAP.len(), "{}", term);
            assert_eq!(crt.decoder().lookup(b"\x1b[17;2~"), Some(Key::F(18)));
        }
        for term in [Some("xterm-256color"), Some("linux"), Some("screen"), None] {
            let crt = crt_with(ScriptedBackend::new(8), term, 10);
            assert_eq!(crt.decoder().remapped_count(), 0, "{:?}", term);
        }
    }

    #[test]
    fn test_no_colors_forces_monochrome() {
        for requested in [ColorScheme(0), ColorScheme(3), ColorScheme(5)] {
            let crt = Crt::init_with(ScriptedBackend::new(2), env(None), 10, requested).unwrap();
            assert!(!crt.has_colors());
            assert_eq!(crt.color_scheme(), ColorScheme::MONOCHROME);
        }

        let crt = Crt::init_with(ScriptedBackend::new(8), env(None), 10, ColorScheme(3)).unwrap();
        assert_eq!(crt.color_scheme(), ColorScheme(3));
    }

    #[test]
    fn test_set_colors_is_idempotent() {
        let mut crt = crt_with(ScriptedBackend::new(256), None, 10);
        let before = crt.colors().clone();
        crt.set_colors(ColorScheme::DEFAULT);
        assert_eq!(crt.colors(), &before);

        let pairs = &crt.backend().pairs;
        assert_eq!(pairs.len(), 162);
        assert_eq!(pairs[..81], pairs[81..]);
        assert!(pairs.iter().all(|p| p.id >= 0 && p.id <= 88));
    }

    #[test]
    fn test_read_key_restores_half_delay() {
        let backend = ScriptedBackend::new(8).with_input(b"q");
        let mut crt = crt_with(backend, None, 6);

        assert_eq!(crt.read_key().unwrap(), Key::Char('q'));
        assert_eq!(crt.input_mode(), InputMode::HalfDelay(3));

        assert_eq!(crt.get_key().unwrap(), None);
        assert_eq!(
            crt.backend().read_timeouts,
            vec![None, Some(Duration::from_millis(300))]
        );
    }

    #[test]
    fn test_read_key_restores_half_delay_on_error() {
        let mut crt = crt_with(ScriptedBackend::new(8), None, 6);
        assert!(crt.read_key().is_err());
        assert_eq!(crt.input_mode(), InputMode::HalfDelay(3));
    }

    #[test]
    fn test_read_key_skips_unregistered_mouse_events() {
        let backend = ScriptedBackend::new(8).with_input(b"\x1b[<64;1;1Mx");
        let mut crt = crt_with(backend, None, 6);
        assert_eq!(crt.read_key().unwrap(), Key::Char('x'));
    }

    #[test]
    fn test_delay_toggle() {
        let mut crt = crt_with(ScriptedBackend::new(8), None, 20);
        crt.disable_delay();
        assert_eq!(crt.input_mode(), InputMode::NonBlocking);
        assert_eq!(crt.get_key().unwrap(), None);
        crt.enable_delay();
        assert_eq!(crt.input_mode(), InputMode::HalfDelay(10));
        assert_eq!(
            crt.backend().read_timeouts,
            vec![Some(Duration::ZERO)]
        );
    }

    #[test]
    fn test_teardown_restores_terminal_once() {
        let mut crt = crt_with(ScriptedBackend::new(8), None, 10);
        crt.teardown();
        assert!(!crt.is_active());
        assert!(crt.backend().cursor_visible);
        assert!(!crt.backend().raw);

        crt.teardown();
        assert_eq!(crt.backend().leave_calls, 1);
    }

    #[test]
    fn test_cursor_column() {
        let mut crt = crt_with(ScriptedBackend::new(8), None, 10);
        crt.set_cursor_column(12);
        crt.show_cursor(23).unwrap();
        assert_eq!(crt.cursor_x(), 12);
        assert_eq!(crt.backend().cursor, (23, 12));
        assert!(crt.backend().cursor_visible);
    }

    #[test]
    fn test_failed_enter_leaves_terminal_cooked() {
        let mut backend = ScriptedBackend::new(8);
        backend.fail_alternate_screen = true;
        assert!(matches!(
            Crt::init_with(&mut backend, env(Some("xterm")), 10, ColorScheme::DEFAULT),
            Err(CrtError::Io(_))
        ));
        assert!(!backend.raw);
        assert_eq!(backend.leave_calls, 0);
    }

    fn mark_leave() {
        unsafe { libc::write(libc::STDERR_FILENO, b"<left>".as_ptr().cast(), 6) };
    }

    #[test]
    fn test_fatal_error_restores_then_exits_2() {
        let (status, output) = backend::run_forked(|| {
            let mut backend = ScriptedBackend::new(8);
            backend.leave_hook = Some(mark_leave);
            let crt = crt_with(backend, None, 10);
            // Leaves EBADF in errno
            unsafe { libc::close(-1) };
            crt.fatal_error("monterm: cannot open");
        });
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), FATAL_EXIT_CODE);
        assert_eq!(output, "<left>monterm: cannot open: Bad file descriptor\n");
    }

    #[test]
    fn test_fatal_io_error_reports_given_error() {
        let (status, output) = backend::run_forked(|| {
            let crt = crt_with(ScriptedBackend::new(8), None, 10);
            let err = io::Error::new(io::ErrorKind::UnexpectedEof, "terminal input closed");
            crt.fatal_io_error("monterm: cannot read input", &err);
        });
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), FATAL_EXIT_CODE);
        assert_eq!(output, "monterm: cannot read input: terminal input closed\n");
    }

    #[test]
    fn test_fatal_report_format() {
        let err = io::Error::from_raw_os_error(libc::EACCES);
        let mut out = Vec::new();
        write_fatal_report(&mut out, "cannot open display", &err).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "cannot open display: Permission denied\n"
        );
    }

    #[test]
    fn test_os_error_description_without_code() {
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(os_error_description(&err), "boom");
    }

    #[test]
    fn test_locale_detection() {
        assert!(locale_is_utf8([None, Some("en_US.UTF-8"), Some("C")]));
        assert!(locale_is_utf8([Some(""), None, Some("de_DE.utf8")]));
        assert!(!locale_is_utf8([Some("C"), Some("en_US.UTF-8"), None]));
        assert!(!locale_is_utf8([None, None, None]));
    }

    #[test]
    fn test_published_registry_matches_runtime() {
        let crt = crt_with(ScriptedBackend::new(256), None, 10);
        assert_eq!(
            colors().attr(ColorElement::FunctionKey),
            crt.attr(ColorElement::FunctionKey)
        );
    }
}
