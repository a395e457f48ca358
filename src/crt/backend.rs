//! Terminal-control backends
//!
//! [`TerminalBackend`] is the capability set the runtime needs from the
//! terminal: raw mode, cursor visibility, color-pair registration, timed
//! byte input, mouse reporting and attributed output. The runtime is the
//! only caller.

use std::collections::HashMap;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableMouseCapture, EnableMouseCapture},
    execute, queue,
    style::{
        available_color_count, Attribute, Color, Print, ResetColor, SetAttribute,
        SetBackgroundColor, SetForegroundColor,
    },
    terminal::{
        self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};

use super::color::{Attr, BaseColor, Emphasis, RegisteredPair};
use super::keys::MouseMask;
use crate::rich_string::RichString;

pub trait TerminalBackend {
    /// Toggle raw input (no echo, no line buffering)
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()>;
    fn set_alternate_screen(&mut self, enabled: bool) -> io::Result<()>;

    /// Enter raw mode on the alternate screen.
    ///
    /// Raw mode is switched back off if the screen switch fails.
    fn enter(&mut self) -> io::Result<()> {
        self.set_raw_mode(true)?;
        if let Err(err) = self.set_alternate_screen(true) {
            let _ = self.set_raw_mode(false);
            return Err(err);
        }
        Ok(())
    }

    /// Leave raw mode and the alternate screen
    fn leave(&mut self) -> io::Result<()>;
    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()>;
    fn move_cursor(&mut self, row: u16, col: u16) -> io::Result<()>;
    /// Number of colors the terminal supports
    fn color_count(&self) -> u16;
    fn init_pair(&mut self, pair: RegisteredPair);
    fn set_mouse_mask(&mut self, mask: MouseMask) -> io::Result<()>;
    /// Read one byte, waiting at most `timeout` (`None` blocks)
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>>;
    fn size(&self) -> io::Result<(u16, u16)>;
    fn clear(&mut self) -> io::Result<()>;
    fn draw(&mut self, row: u16, col: u16, text: &RichString) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Backend on the process's own tty, using crossterm for output
pub struct CrosstermBackend {
    out: Stdout,
    pairs: HashMap<i16, (Color, Color)>,
    colors: u16,
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermBackend {
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            pairs: HashMap::new(),
            colors: available_color_count(),
        }
    }

    fn terminal_color(index: i16) -> Color {
        usize::try_from(index)
            .ok()
            .and_then(|i| BaseColor::ALL.get(i))
            .map_or(Color::Reset, |base| base.to_crossterm())
    }

    fn queue_attr(&mut self, attr: Attr) -> io::Result<()> {
        queue!(self.out, SetAttribute(Attribute::Reset))?;
        if self.colors >= 8 {
            let (fg, bg) = attr
                .pair_id()
                .and_then(|id| self.pairs.get(&id).copied())
                .unwrap_or((Color::Reset, Color::Reset));
            queue!(self.out, SetForegroundColor(fg), SetBackgroundColor(bg))?;
        }
        if attr.emphasis.contains(Emphasis::BOLD) {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        if attr.emphasis.contains(Emphasis::BLINK) {
            queue!(self.out, SetAttribute(Attribute::SlowBlink))?;
        }
        Ok(())
    }
}

impl TerminalBackend for CrosstermBackend {
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            enable_raw_mode()
        } else {
            disable_raw_mode()
        }
    }

    fn set_alternate_screen(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            execute!(self.out, EnterAlternateScreen)
        } else {
            execute!(self.out, LeaveAlternateScreen)
        }
    }

    fn leave(&mut self) -> io::Result<()> {
        // Best-effort restore: try all steps even if one fails.
        let mut first_err: Option<io::Error> = None;

        if let Err(err) = execute!(
            self.out,
            ResetColor,
            SetAttribute(Attribute::Reset),
            DisableMouseCapture,
            LeaveAlternateScreen
        ) {
            first_err.get_or_insert(err);
        }
        if let Err(err) = disable_raw_mode() {
            first_err.get_or_insert(err);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        if visible {
            execute!(self.out, Show)
        } else {
            execute!(self.out, Hide)
        }
    }

    fn move_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        queue!(self.out, MoveTo(col, row))
    }

    fn color_count(&self) -> u16 {
        self.colors
    }

    fn init_pair(&mut self, pair: RegisteredPair) {
        self.pairs.insert(
            pair.id,
            (Self::terminal_color(pair.fg), Self::terminal_color(pair.bg)),
        );
    }

    fn set_mouse_mask(&mut self, mask: MouseMask) -> io::Result<()> {
        if mask.is_empty() {
            execute!(self.out, DisableMouseCapture)
        } else {
            execute!(self.out, EnableMouseCapture)
        }
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        let timeout_ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as i32);
        let mut fds = libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `fds` is a valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err),
            };
        }
        if ready == 0 {
            return Ok(None);
        }

        let mut byte = 0u8;
        // SAFETY: reading a single byte into a valid stack location.
        let n = unsafe { libc::read(libc::STDIN_FILENO, (&mut byte as *mut u8).cast(), 1) };
        match n {
            1 => Ok(Some(byte)),
            0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "terminal input closed")),
            _ => {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(None),
                    _ => Err(err),
                }
            }
        }
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        terminal::size()
    }

    fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, ResetColor, Clear(ClearType::All))
    }

    fn draw(&mut self, row: u16, col: u16, text: &RichString) -> io::Result<()> {
        queue!(self.out, MoveTo(col, row))?;
        for (attr, run) in text.runs() {
            self.queue_attr(attr)?;
            queue!(self.out, Print(run))?;
        }
        queue!(self.out, SetAttribute(Attribute::Reset), ResetColor)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<B: TerminalBackend + ?Sized> TerminalBackend for &mut B {
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_raw_mode(enabled)
    }

    fn set_alternate_screen(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_alternate_screen(enabled)
    }

    fn enter(&mut self) -> io::Result<()> {
        (**self).enter()
    }

    fn leave(&mut self) -> io::Result<()> {
        (**self).leave()
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        (**self).set_cursor_visible(visible)
    }

    fn move_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        (**self).move_cursor(row, col)
    }

    fn color_count(&self) -> u16 {
        (**self).color_count()
    }

    fn init_pair(&mut self, pair: RegisteredPair) {
        (**self).init_pair(pair)
    }

    fn set_mouse_mask(&mut self, mask: MouseMask) -> io::Result<()> {
        (**self).set_mouse_mask(mask)
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        (**self).read_byte(timeout)
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        (**self).size()
    }

    fn clear(&mut self) -> io::Result<()> {
        (**self).clear()
    }

    fn draw(&mut self, row: u16, col: u16, text: &RichString) -> io::Result<()> {
        (**self).draw(row, col, text)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Run `child` in a forked process with stdout and stderr captured.
///
/// Returns the raw wait status and everything the child wrote.
#[cfg(test)]
pub(crate) fn run_forked<F: FnOnce()>(child: F) -> (libc::c_int, String) {
    use std::io::Read;
    use std::os::fd::FromRawFd;

    let mut fds = [0 as libc::c_int; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        unsafe {
            libc::close(fds[0]);
            libc::dup2(fds[1], libc::STDOUT_FILENO);
            libc::dup2(fds[1], libc::STDERR_FILENO);
            libc::close(fds[1]);
        }
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(child));
        unsafe { libc::_exit(101) }
    }

    unsafe { libc::close(fds[1]) };
    // SAFETY: the read end is owned here and closed when `pipe` drops.
    let mut pipe = unsafe { std::fs::File::from_raw_fd(fds[0]) };
    let mut output = Vec::new();
    pipe.read_to_end(&mut output).unwrap();

    let mut status = 0;
    assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
    (status, String::from_utf8_lossy(&output).into_owned())
}

/// In-memory backend that records calls and replays queued input
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    pub colors: u16,
    pub raw: bool,
    pub alternate_screen: bool,
    pub fail_alternate_screen: bool,
    pub enter_calls: usize,
    pub leave_calls: usize,
    pub cursor_visible: bool,
    pub cursor: (u16, u16),
    pub pairs: Vec<RegisteredPair>,
    pub mouse_mask: MouseMask,
    pub input: std::collections::VecDeque<u8>,
    pub read_timeouts: Vec<Option<Duration>>,
    pub drawn: Vec<(u16, u16, String)>,
    /// Called from `leave`, for observing teardown in a forked child
    pub leave_hook: Option<fn()>,
}

#[cfg(test)]
impl ScriptedBackend {
    pub fn new(colors: u16) -> Self {
        Self {
            colors,
            cursor_visible: true,
            ..Self::default()
        }
    }

    pub fn with_input(mut self, bytes: &[u8]) -> Self {
        self.input.extend(bytes.iter().copied());
        self
    }
}

#[cfg(test)]
impl TerminalBackend for ScriptedBackend {
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            self.enter_calls += 1;
        }
        self.raw = enabled;
        Ok(())
    }

    fn set_alternate_screen(&mut self, enabled: bool) -> io::Result<()> {
        if enabled && self.fail_alternate_screen {
            return Err(io::Error::new(io::ErrorKind::Other, "alternate screen unavailable"));
        }
        self.alternate_screen = enabled;
        Ok(())
    }

    fn leave(&mut self) -> io::Result<()> {
        self.leave_calls += 1;
        self.raw = false;
        self.alternate_screen = false;
        if let Some(hook) = self.leave_hook {
            hook();
        }
        Ok(())
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        self.cursor_visible = visible;
        Ok(())
    }

    fn move_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        self.cursor = (row, col);
        Ok(())
    }

    fn color_count(&self) -> u16 {
        self.colors
    }

    fn init_pair(&mut self, pair: RegisteredPair) {
        self.pairs.push(pair);
    }

    fn set_mouse_mask(&mut self, mask: MouseMask) -> io::Result<()> {
        self.mouse_mask = mask;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        self.read_timeouts.push(timeout);
        match self.input.pop_front() {
            Some(byte) => Ok(Some(byte)),
            None if timeout.is_none() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "script exhausted",
            )),
            None => Ok(None),
        }
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        Ok((80, 24))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.drawn.clear();
        Ok(())
    }

    fn draw(&mut self, row: u16, col: u16, text: &RichString) -> io::Result<()> {
        self.drawn.push((row, col, text.text()));
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_color_mapping() {
        assert_eq!(CrosstermBackend::terminal_color(-1), Color::Reset);
        assert_eq!(CrosstermBackend::terminal_color(1), Color::DarkRed);
        assert_eq!(CrosstermBackend::terminal_color(7), Color::Grey);
    }

    #[test]
    fn test_scripted_backend_blocking_read_fails_when_exhausted() {
        let mut backend = ScriptedBackend::new(8).with_input(b"a");
        assert_eq!(backend.read_byte(None).unwrap(), Some(b'a'));
        assert_eq!(backend.read_byte(Some(Duration::ZERO)).unwrap(), None);
        assert!(backend.read_byte(None).is_err());
    }

    #[test]
    fn test_enter_rolls_back_raw_mode() {
        let mut backend = ScriptedBackend::new(8);
        backend.fail_alternate_screen = true;
        assert!(backend.enter().is_err());
        assert!(!backend.raw);
        assert!(!backend.alternate_screen);

        backend.fail_alternate_screen = false;
        backend.enter().unwrap();
        assert!(backend.raw);
        assert!(backend.alternate_screen);
    }
}
