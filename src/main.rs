//! monterm - color role browser
//!
//! Brings up the terminal runtime and lists every semantic color role of
//! the dashboard with a live sample, so palettes and key remaps can be
//! checked on a real terminal.
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Up/Down, PgUp/PgDn, Home/End | Move selection |
//! | Left/Right | Scroll horizontally |
//! | Enter / click | Inspect role |
//! | / | Search |
//! | q, F10 | Quit |

use std::env;

use anyhow::Context;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use monterm::config::Config;
use monterm::crt::backend::TerminalBackend;
use monterm::crt::color::{Attr, ColorElement, ColorScheme, Emphasis};
use monterm::crt::keys::{Key, MouseMask};
use monterm::crt::Crt;
use monterm::error::{CrtError, Result as CrtResult};
use monterm::object::{self, ListItem, Object};
use monterm::rich_string::RichString;

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Width of the role name column
const NAME_WIDTH: usize = 26;

/// Command line overrides
#[derive(Default)]
struct Options {
    delay: Option<u32>,
    color_scheme: Option<ColorScheme>,
    no_color: bool,
    verbose: bool,
}

fn print_version() {
    eprintln!("monterm {}", VERSION);
}

fn print_help() {
    eprintln!("monterm {} - terminal runtime color role browser", VERSION);
    eprintln!();
    eprintln!("Usage: monterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --delay <N>       Refresh delay in tenths of a second");
    eprintln!("  -s, --scheme <ID>     Color scheme id");
    eprintln!("  -C, --no-color        Use the monochrome scheme");
    eprintln!("  -v, --verbose         Debug logging");
    eprintln!("  -V, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.monterm/config.toml");
    eprintln!("Log file:      ~/.monterm/monterm.log");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-d" | "--delay" => {
                i += 1;
                let value = args.get(i).ok_or("Missing delay argument")?;
                let delay = value
                    .parse()
                    .map_err(|_| format!("Invalid delay: {}", value))?;
                options.delay = Some(delay);
            }
            "-s" | "--scheme" => {
                i += 1;
                let value = args.get(i).ok_or("Missing scheme argument")?;
                let id = value
                    .parse()
                    .map_err(|_| format!("Invalid scheme: {}", value))?;
                options.color_scheme = Some(ColorScheme(id));
            }
            "-C" | "--no-color" => {
                options.no_color = true;
            }
            "-v" | "--verbose" => {
                options.verbose = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn init_logging(verbose: bool) {
    let log_path = Config::config_dir()
        .map(|dir| dir.join("monterm.log"))
        .unwrap_or_else(|| std::path::PathBuf::from("monterm.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging(options.verbose);
    info!("monterm {} starting...", VERSION);

    let mut config = Config::load();
    if let Some(delay) = options.delay {
        config.delay = delay;
    }
    if let Some(scheme) = options.color_scheme {
        config.color_scheme = scheme;
    }
    if options.no_color {
        config.color_scheme = ColorScheme::MONOCHROME;
    }

    run(config)
}

fn run(config: Config) -> anyhow::Result<()> {
    let mut crt =
        Crt::init(config.delay, config.color_scheme).context("Failed to initialize terminal")?;
    if !config.mouse {
        crt.set_mouse_mask(MouseMask::empty())?;
    }

    let mut browser = Browser::new();
    loop {
        if let Err(e) = browser.draw(&mut crt, None) {
            abort_on(crt, "monterm: cannot draw", e);
        }

        let key = match crt.get_key() {
            Ok(Some(key)) => key,
            Ok(None) => {
                crt.enable_delay();
                continue;
            }
            Err(e) => abort_on(crt, "monterm: cannot read input", e),
        };
        // Drain typeahead without waiting between keys
        crt.disable_delay();

        match browser.handle_key(&mut crt, key) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => abort_on(crt, "monterm: terminal error", e),
        }
    }

    browser.close();
    crt.done();
    info!("monterm exiting");
    Ok(())
}

/// Scrollable list of color roles
struct Browser {
    rows: Vec<Box<dyn Object>>,
    selected: usize,
    top: usize,
    h_offset: usize,
}

impl Browser {
    fn new() -> Self {
        let mut rows: Vec<Box<dyn Object>> = ColorElement::ALL
            .iter()
            .enumerate()
            .map(|(index, role)| {
                Box::new(ListItem::new(format!("{:?}", role), index as i32)) as Box<dyn Object>
            })
            .collect();
        rows.sort_by(|a, b| object::compare(a.as_ref(), b.as_ref()));

        #[cfg(debug_assertions)]
        assert!(rows
            .iter()
            .all(|row| object::is_a(row.as_ref(), &object::LIST_ITEM_CLASS)));

        Self {
            rows,
            selected: 0,
            top: 0,
            h_offset: 0,
        }
    }

    fn role_at(&self, index: usize) -> Option<ColorElement> {
        let item = self.rows.get(index)?.downcast_ref::<ListItem>()?;
        ColorElement::ALL.get(item.key as usize).copied()
    }

    fn body_height<B: TerminalBackend>(crt: &Crt<B>) -> CrtResult<usize> {
        let (_, rows) = crt.size()?;
        Ok(usize::from(rows.saturating_sub(2)).max(1))
    }

    fn draw<B: TerminalBackend>(&mut self, crt: &mut Crt<B>, status: Option<&RichString>) -> CrtResult<()> {
        let (cols, rows) = crt.size()?;
        let height = Self::body_height(crt)?;
        if self.selected < self.top {
            self.top = self.selected;
        } else if self.selected >= self.top + height {
            self.top = self.selected + 1 - height;
        }

        crt.clear()?;

        let mut header = RichString::new();
        let title = format!("{:<width$}", " Role", width = NAME_WIDTH + 1);
        header.append(crt.attr(ColorElement::PanelHeaderFocus), &title);
        header.append(
            crt.attr(ColorElement::PanelHeaderFocus),
            &format!("{:<width$}", "Sample", width = usize::from(cols).saturating_sub(title.len())),
        );
        crt.draw(0, 0, &header)?;

        for (offset, index) in (self.top..self.rows.len()).take(height).enumerate() {
            let mut line = RichString::with_capacity(usize::from(cols));
            line.push(Attr::NORMAL, ' ');
            object::display(self.rows[index].as_ref(), &mut line);
            while line.len() <= NAME_WIDTH {
                line.push(Attr::NORMAL, ' ');
            }
            if let Some(role) = self.role_at(index) {
                line.append(crt.attr(role), &describe(crt.attr(role)));
            }
            if index == self.selected {
                line.set_attr(crt.attr(ColorElement::PanelHighlightFocus));
            }
            crt.draw(offset as u16 + 1, 0, &scrolled(&line, self.h_offset))?;
        }

        let bottom = rows.saturating_sub(1);
        match status {
            Some(status) => crt.draw(bottom, 0, status)?,
            None => {
                let bar = function_bar(crt);
                crt.draw(bottom, 0, &bar)?;
            }
        }
        crt.refresh()
    }

    /// Returns false when the browser should exit
    fn handle_key<B: TerminalBackend>(&mut self, crt: &mut Crt<B>, key: Key) -> CrtResult<bool> {
        let last = self.rows.len().saturating_sub(1);
        let page = Self::body_height(crt)?;
        match key {
            Key::Char('q') | Key::F(10) => return Ok(false),
            Key::Up => self.selected = self.selected.saturating_sub(1),
            Key::Down => self.selected = (self.selected + 1).min(last),
            Key::PageUp => self.selected = self.selected.saturating_sub(page),
            Key::PageDown => self.selected = (self.selected + page).min(last),
            Key::Home => self.selected = 0,
            Key::End => self.selected = last,
            Key::Left => {
                self.h_offset = self.h_offset.saturating_sub(usize::from(crt.scroll_h_amount()))
            }
            Key::Right => self.h_offset += usize::from(crt.scroll_h_amount()),
            Key::Enter => self.inspect(crt)?,
            Key::Char('/') => self.search(crt)?,
            Key::Mouse(event) if event.bstate.contains(MouseMask::BUTTON1_CLICKED) => {
                let row = usize::from(event.row);
                if let Some(index) = clicked_row(self.top, row, page, self.rows.len()) {
                    self.selected = index;
                    self.inspect(crt)?;
                }
            }
            _ => {}
        }
        Ok(true)
    }

    /// Show the selected role's attribute until a key is pressed
    fn inspect<B: TerminalBackend>(&mut self, crt: &mut Crt<B>) -> CrtResult<()> {
        let Some(role) = self.role_at(self.selected) else {
            return Ok(());
        };
        let mut status = RichString::new();
        status.append(crt.attr(ColorElement::HelpBold), &format!("{:?}", role));
        status.append(Attr::NORMAL, ": ");
        status.append(crt.attr(role), &describe(crt.attr(role)));
        status.append(Attr::NORMAL, "  (press any key)");
        self.draw(crt, Some(&status))?;
        crt.read_key()?;
        Ok(())
    }

    /// Incremental search on role names
    fn search<B: TerminalBackend>(&mut self, crt: &mut Crt<B>) -> CrtResult<()> {
        const PROMPT: &str = "Search: ";
        let start = self.selected;
        let mut query = String::new();
        let mut found = true;

        loop {
            let mut status = RichString::new();
            status.append(crt.attr(ColorElement::FunctionKey), PROMPT);
            let query_attr = if found {
                crt.attr(ColorElement::FunctionBar)
            } else {
                crt.attr(ColorElement::FailedSearch)
            };
            status.append(query_attr, &query);

            let (_, rows) = crt.size()?;
            self.draw(crt, Some(&status))?;
            crt.set_cursor_column((PROMPT.len() + query.chars().count()) as u16);
            crt.show_cursor(rows.saturating_sub(1))?;
            crt.refresh()?;

            match crt.read_key()? {
                Key::Enter => break,
                Key::Esc => {
                    self.selected = start;
                    break;
                }
                Key::Backspace => {
                    query.pop();
                }
                Key::Char(ch) if !ch.is_control() => query.push(ch),
                _ => continue,
            }
            found = self.find(&query).map(|index| self.selected = index).is_some();
        }

        crt.hide_cursor()
    }

    fn find(&self, query: &str) -> Option<usize> {
        let needle = query.to_lowercase();
        (0..self.rows.len()).find(|&index| {
            self.rows[index]
                .downcast_ref::<ListItem>()
                .map_or(false, |item| item.value.to_lowercase().contains(&needle))
        })
    }

    fn close(self) {
        for row in self.rows {
            object::delete(row);
        }
    }
}

fn function_bar<B: TerminalBackend>(crt: &Crt<B>) -> RichString {
    let mut bar = RichString::new();
    for (key, label) in [("Enter", "Inspect "), ("/", "Search "), ("q", "Quit ")] {
        bar.append(crt.attr(ColorElement::FunctionKey), key);
        bar.append(crt.attr(ColorElement::FunctionBar), label);
    }
    bar
}

/// List index under screen row `row`. Row 0 is the header and rows past
/// the body belong to the function bar.
fn clicked_row(top: usize, row: usize, body_height: usize, len: usize) -> Option<usize> {
    if row == 0 || row > body_height {
        return None;
    }
    let index = top + row - 1;
    (index < len).then_some(index)
}

/// Restore the terminal and exit, reporting the error that caused it
fn abort_on<B: TerminalBackend>(crt: Crt<B>, note: &str, err: CrtError) -> ! {
    error!("{}: {}", note, err);
    match err {
        CrtError::Io(io_err) => crt.fatal_io_error(note, &io_err),
        _ => crt.fatal_error(note),
    }
}

fn describe(attr: Attr) -> String {
    let mut text = match attr.pair {
        Some(pair) => format!("pair {:>2} {:?} on {:?}", pair.id(), pair.fg, pair.bg),
        None => "terminal default".to_string(),
    };
    if attr.emphasis.contains(Emphasis::BOLD) {
        text.push_str(" +bold");
    }
    if attr.emphasis.contains(Emphasis::BLINK) {
        text.push_str(" +blink");
    }
    text
}

fn scrolled(line: &RichString, offset: usize) -> RichString {
    let mut out = RichString::with_capacity(line.len().saturating_sub(offset));
    for cell in line.cells().iter().skip(offset) {
        out.push(cell.attr, cell.ch);
    }
    out
}
