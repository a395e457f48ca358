//! Signal-driven teardown
//!
//! Handlers here run in interrupt context. They may only touch atomics,
//! the termios snapshot taken before raw mode, and `write(2)` with static
//! buffers. [`emergency_restore`] is the one restore routine they share;
//! anything added to it must stay allocation-free and lock-free.

use std::io;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use signal_hook::consts::signal::SIGTERM;
use signal_hook::SigId;

/// Show cursor, reset attributes, stop mouse reporting, leave the alternate screen
pub const RESTORE_SEQUENCE: &[u8] =
    b"\x1b[0m\x1b[?1006l\x1b[?1015l\x1b[?1003l\x1b[?1002l\x1b[?1000l\x1b[?25h\x1b[?1049l";

#[cfg(target_os = "linux")]
pub const CRASH_REPORT: &str = concat!(
    "\n\nmonterm ",
    env!("CARGO_PKG_VERSION"),
    " aborting. Please report bug at https://github.com/user/monterm\n"
);

#[cfg(not(target_os = "linux"))]
pub const CRASH_REPORT: &str = concat!(
    "\n\nmonterm ",
    env!("CARGO_PKG_VERSION"),
    " aborting. Unsupported platform.\n"
);

#[cfg(all(target_os = "linux", target_env = "gnu"))]
const BACKTRACE_INTRO: &str = "\n Please include in your report the following backtrace: \n";

#[cfg(all(target_os = "linux", target_env = "gnu"))]
const BACKTRACE_HELP: &str = concat!(
    "\nAdditionally, in order to make the above backtrace useful,",
    "\nplease also run the following command to generate a disassembly of your binary:",
    "\n\n   objdump -d `which monterm` > ~/monterm.objdump",
    "\n\nand then attach the file ~/monterm.objdump to your bug report.",
    "\n\nThank you for helping to improve monterm!\n\n"
);

#[cfg(all(target_os = "linux", target_env = "gnu"))]
const MAX_FRAMES: usize = 128;

static SAVED_TERMIOS: OnceLock<libc::termios> = OnceLock::new();
static ARMED: AtomicBool = AtomicBool::new(false);
static RESTORED: AtomicBool = AtomicBool::new(false);

/// Snapshot the cooked-mode termios of stdin and arm the emergency restore.
///
/// Must run before the terminal enters raw mode.
pub fn capture_terminal_modes() -> io::Result<()> {
    let mut termios = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: tcgetattr fills the struct on success.
    if unsafe { libc::tcgetattr(libc::STDIN_FILENO, termios.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: initialized by the successful tcgetattr above.
    let _ = SAVED_TERMIOS.set(unsafe { termios.assume_init() });
    arm();
    Ok(())
}

fn arm() {
    RESTORED.store(false, Ordering::SeqCst);
    ARMED.store(true, Ordering::SeqCst);
}

/// The normal teardown path restored the terminal; handlers become no-ops.
pub fn disarm() {
    ARMED.store(false, Ordering::SeqCst);
}

/// Put the terminal back into cooked mode with a visible cursor.
///
/// Async-signal-safe. Runs at most once per arm.
pub fn emergency_restore() {
    if !ARMED.load(Ordering::SeqCst) || RESTORED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Some(termios) = SAVED_TERMIOS.get() {
        // SAFETY: tcsetattr is async-signal-safe; `termios` is a valid snapshot.
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, termios);
        }
    }
    write_all_raw(libc::STDOUT_FILENO, RESTORE_SEQUENCE);
}

fn write_all_raw(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: write(2) on a static buffer is async-signal-safe.
        let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if n <= 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

fn handle_sigterm() {
    emergency_restore();
    signal_hook::low_level::exit(0);
}

extern "C" fn handle_sigsegv(_signal: libc::c_int) {
    emergency_restore();
    write_crash_report(libc::STDERR_FILENO);
    // SAFETY: abort is async-signal-safe and never returns.
    unsafe { libc::abort() }
}

/// Version banner, then the call stack where glibc can symbolize it.
fn write_crash_report(fd: libc::c_int) {
    write_all_raw(fd, CRASH_REPORT.as_bytes());

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        write_all_raw(fd, BACKTRACE_INTRO.as_bytes());
        let mut frames = [std::ptr::null_mut::<libc::c_void>(); MAX_FRAMES];
        // SAFETY: `frames` holds MAX_FRAMES slots; backtrace_symbols_fd writes
        // straight to `fd` without allocating. libgcc is already loaded by
        // `preload_backtrace`.
        unsafe {
            let depth = libc::backtrace(frames.as_mut_ptr(), MAX_FRAMES as libc::c_int);
            libc::backtrace_symbols_fd(frames.as_ptr(), depth, fd);
        }
        write_all_raw(fd, BACKTRACE_HELP.as_bytes());
    }
}

/// The first `backtrace` call loads the unwinder, which allocates.
/// Do it here, outside signal context.
fn preload_backtrace() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        let mut frames = [std::ptr::null_mut::<libc::c_void>(); 1];
        // SAFETY: one valid slot.
        unsafe {
            libc::backtrace(frames.as_mut_ptr(), 1);
        }
    }
}

/// Registered handlers; dropped back to their previous disposition by [`uninstall`](Self::uninstall).
pub struct SignalHandlers {
    sigterm: SigId,
    previous_sigsegv: Option<libc::sigaction>,
}

/// Install the SIGTERM handler and, outside diagnostic builds, the SIGSEGV handler.
pub fn install() -> io::Result<SignalHandlers> {
    // SAFETY: the action only calls async-signal-safe functions.
    let sigterm = unsafe { signal_hook::low_level::register(SIGTERM, handle_sigterm)? };

    let previous_sigsegv = if cfg!(debug_assertions) {
        None
    } else {
        match install_sigsegv() {
            Ok(previous) => Some(previous),
            Err(err) => {
                let _ = signal_hook::low_level::unregister(sigterm);
                return Err(err);
            }
        }
    };

    Ok(SignalHandlers {
        sigterm,
        previous_sigsegv,
    })
}

fn install_sigsegv() -> io::Result<libc::sigaction> {
    preload_backtrace();

    // SAFETY: zeroed sigaction is a valid "no flags, empty mask" value.
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = handle_sigsegv as extern "C" fn(libc::c_int) as libc::sighandler_t;
    action.sa_flags = libc::SA_RESETHAND;
    let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };

    // SAFETY: both structs are valid for the duration of the calls.
    let rc = unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGSEGV, &action, &mut previous)
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(previous)
}

impl SignalHandlers {
    pub fn uninstall(self) {
        let _ = signal_hook::low_level::unregister(self.sigterm);
        if let Some(previous) = self.previous_sigsegv {
            // SAFETY: restoring the disposition saved at install time.
            unsafe {
                libc::sigaction(libc::SIGSEGV, &previous, std::ptr::null_mut());
            }
        }
    }
}
