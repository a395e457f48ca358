//! Key decoding for terminal input
//!
//! Converts raw input bytes (escape sequences, UTF-8, SGR mouse reports)
//! into canonical [`Key`] values. Terminal emulators disagree on the
//! sequences for Home/End and the first function keys, so the runtime
//! installs extra mappings for the terminal types known to need them.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::io;
use std::time::Duration;

use bitflags::bitflags;

/// How long to wait for the rest of an escape sequence
pub const ESCAPE_DELAY: Duration = Duration::from_millis(25);

const ESC: u8 = 0x1b;
const SGR_MOUSE_PREFIX: &[u8] = b"\x1b[<";
const MAX_SEQUENCE_LEN: usize = 32;

bitflags! {
    /// Mouse event types, also used as the registration mask
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MouseMask: u16 {
        const BUTTON1_PRESSED  = 0b0000_0001;
        const BUTTON1_RELEASED = 0b0000_0010;
        const BUTTON1_CLICKED  = 0b0000_0100;
        const BUTTON3_PRESSED  = 0b0000_1000;
        const BUTTON3_RELEASED = 0b0001_0000;
        const BUTTON3_CLICKED  = 0b0010_0000;
        const WHEEL_UP         = 0b0100_0000;
        const WHEEL_DOWN       = 0b1000_0000;
    }
}

/// A mouse report, 0-based cell coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MouseEvent {
    pub bstate: MouseMask,
    pub column: u16,
    pub row: u16,
}

/// Canonical key codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    BackTab,
    Backspace,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
    Mouse(MouseEvent),
}

/// Sequences every terminal gets
const BASE_SEQUENCES: &[(&[u8], Key)] = &[
    (b"\x1b[A", Key::Up),
    (b"\x1b[B", Key::Down),
    (b"\x1b[C", Key::Right),
    (b"\x1b[D", Key::Left),
    (b"\x1bOA", Key::Up),
    (b"\x1bOB", Key::Down),
    (b"\x1bOC", Key::Right),
    (b"\x1bOD", Key::Left),
    (b"\x1bOH", Key::Home),
    (b"\x1bOF", Key::End),
    (b"\x1b[Z", Key::BackTab),
    (b"\x1b[1~", Key::Home),
    (b"\x1b[2~", Key::Insert),
    (b"\x1b[3~", Key::Delete),
    (b"\x1b[4~", Key::End),
    (b"\x1b[5~", Key::PageUp),
    (b"\x1b[6~", Key::PageDown),
    // Linux console
    (b"\x1b[[A", Key::F(1)),
    (b"\x1b[[B", Key::F(2)),
    (b"\x1b[[C", Key::F(3)),
    (b"\x1b[[D", Key::F(4)),
    (b"\x1b[[E", Key::F(5)),
    (b"\x1b[15~", Key::F(5)),
    (b"\x1b[17~", Key::F(6)),
    (b"\x1b[18~", Key::F(7)),
    (b"\x1b[19~", Key::F(8)),
    (b"\x1b[20~", Key::F(9)),
    (b"\x1b[21~", Key::F(10)),
    (b"\x1b[23~", Key::F(11)),
    (b"\x1b[24~", Key::F(12)),
];

/// Terminal types whose Home/End/F1-F4 sequences need remapping
pub const REMAP_TERMINALS: &[&str] = &["xterm", "xterm-color", "vt220"];

/// Extra mappings installed for [`REMAP_TERMINALS`]
pub const XTERM_REMAP: &[(&[u8], Key)] = &[
    (b"\x1b[H", Key::Home),
    (b"\x1b[F", Key::End),
    (b"\x1b[7~", Key::Home),
    (b"\x1b[8~", Key::End),
    (b"\x1bOP", Key::F(1)),
    (b"\x1bOQ", Key::F(2)),
    (b"\x1bOR", Key::F(3)),
    (b"\x1bOS", Key::F(4)),
    (b"\x1b[11~", Key::F(1)),
    (b"\x1b[12~", Key::F(2)),
    (b"\x1b[13~", Key::F(3)),
    (b"\x1b[14~", Key::F(4)),
    (b"\x1b[17;2~", Key::F(18)),
];

pub fn needs_remap(term_type: Option<&str>) -> bool {
    term_type.map_or(false, |term| REMAP_TERMINALS.contains(&term))
}

/// Byte-to-key decoder with a configurable sequence table
pub struct KeyDecoder {
    sequences: BTreeMap<Vec<u8>, Key>,
    remapped: usize,
    mouse_mask: MouseMask,
    button1_down: bool,
    button3_down: bool,
    pending: VecDeque<u8>,
}

impl Default for KeyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDecoder {
    pub fn new() -> Self {
        let sequences = BASE_SEQUENCES
            .iter()
            .map(|(seq, key)| (seq.to_vec(), *key))
            .collect();
        Self {
            sequences,
            remapped: 0,
            mouse_mask: MouseMask::empty(),
            button1_down: false,
            button3_down: false,
            pending: VecDeque::new(),
        }
    }

    /// Bind `seq` to `key`, replacing any existing binding
    pub fn define_key(&mut self, seq: &[u8], key: Key) {
        self.sequences.insert(seq.to_vec(), key);
        self.remapped += 1;
    }

    /// Number of `define_key` calls so far
    pub fn remapped_count(&self) -> usize {
        self.remapped
    }

    pub fn lookup(&self, seq: &[u8]) -> Option<Key> {
        self.sequences.get(seq).copied()
    }

    pub fn set_mouse_mask(&mut self, mask: MouseMask) {
        self.mouse_mask = mask;
    }

    pub fn mouse_mask(&self) -> MouseMask {
        self.mouse_mask
    }

    fn is_prefix(&self, seq: &[u8]) -> bool {
        self.sequences
            .range::<[u8], _>((Bound::Included(seq), Bound::Unbounded))
            .next()
            .map_or(false, |(candidate, _)| candidate.starts_with(seq))
    }

    fn next_byte<F>(&mut self, timeout: Option<Duration>, read: &mut F) -> io::Result<Option<u8>>
    where
        F: FnMut(Option<Duration>) -> io::Result<Option<u8>>,
    {
        match self.pending.pop_front() {
            Some(byte) => Ok(Some(byte)),
            None => read(timeout),
        }
    }

    /// Decode one key. `timeout` bounds the wait for the first byte
    /// (`None` blocks); `Ok(None)` means nothing arrived or the input
    /// was a mouse event outside the registered mask.
    pub fn decode<F>(&mut self, timeout: Option<Duration>, mut read: F) -> io::Result<Option<Key>>
    where
        F: FnMut(Option<Duration>) -> io::Result<Option<u8>>,
    {
        let Some(first) = self.next_byte(timeout, &mut read)? else {
            return Ok(None);
        };

        let key = match first {
            ESC => return self.decode_escape(&mut read),
            b'\r' | b'\n' => Key::Enter,
            b'\t' => Key::Tab,
            0x7f | 0x08 => Key::Backspace,
            byte if byte < 0x80 => Key::Char(byte as char),
            byte => self.decode_utf8(byte, &mut read)?,
        };
        Ok(Some(key))
    }

    fn decode_escape<F>(&mut self, read: &mut F) -> io::Result<Option<Key>>
    where
        F: FnMut(Option<Duration>) -> io::Result<Option<u8>>,
    {
        let mut seq = vec![ESC];
        loop {
            if let Some(key) = self.lookup(&seq) {
                return Ok(Some(key));
            }
            if seq.len() >= SGR_MOUSE_PREFIX.len() && seq.starts_with(SGR_MOUSE_PREFIX) {
                return self.decode_sgr_mouse(seq, read);
            }
            if seq.len() > 1 && !self.is_prefix(&seq) && !SGR_MOUSE_PREFIX.starts_with(&seq) {
                break;
            }
            match self.next_byte(Some(ESCAPE_DELAY), read)? {
                Some(byte) => seq.push(byte),
                None => break,
            }
        }

        // Unknown sequence: report a bare ESC and replay the rest
        for byte in seq.into_iter().skip(1).rev() {
            self.pending.push_front(byte);
        }
        Ok(Some(Key::Esc))
    }

    fn decode_sgr_mouse<F>(&mut self, mut seq: Vec<u8>, read: &mut F) -> io::Result<Option<Key>>
    where
        F: FnMut(Option<Duration>) -> io::Result<Option<u8>>,
    {
        while !matches!(seq.last(), Some(b'M') | Some(b'm')) {
            if seq.len() >= MAX_SEQUENCE_LEN {
                return Ok(None);
            }
            match self.next_byte(Some(ESCAPE_DELAY), read)? {
                Some(byte) => seq.push(byte),
                None => return Ok(None),
            }
        }

        let pressed = seq.last() == Some(&b'M');
        let body = &seq[SGR_MOUSE_PREFIX.len()..seq.len() - 1];
        let fields: Vec<u16> = std::str::from_utf8(body)
            .unwrap_or("")
            .split(';')
            .filter_map(|f| f.parse().ok())
            .collect();
        let [button, x, y] = fields[..] else {
            return Ok(None);
        };

        let bstate = self.mouse_state(button, pressed) & self.mouse_mask;
        if bstate.is_empty() {
            return Ok(None);
        }
        Ok(Some(Key::Mouse(MouseEvent {
            bstate,
            column: x.saturating_sub(1),
            row: y.saturating_sub(1),
        })))
    }

    fn mouse_state(&mut self, button: u16, pressed: bool) -> MouseMask {
        // Motion reports carry bit 32; they are never registered.
        if button & 32 != 0 {
            return MouseMask::empty();
        }
        match (button, pressed) {
            (0, true) => {
                self.button1_down = true;
                MouseMask::BUTTON1_PRESSED
            }
            (0, false) => {
                let clicked = std::mem::take(&mut self.button1_down);
                if clicked {
                    MouseMask::BUTTON1_RELEASED | MouseMask::BUTTON1_CLICKED
                } else {
                    MouseMask::BUTTON1_RELEASED
                }
            }
            (2, true) => {
                self.button3_down = true;
                MouseMask::BUTTON3_PRESSED
            }
            (2, false) => {
                let clicked = std::mem::take(&mut self.button3_down);
                if clicked {
                    MouseMask::BUTTON3_RELEASED | MouseMask::BUTTON3_CLICKED
                } else {
                    MouseMask::BUTTON3_RELEASED
                }
            }
            (64, true) => MouseMask::WHEEL_UP,
            (65, true) => MouseMask::WHEEL_DOWN,
            _ => MouseMask::empty(),
        }
    }

    fn decode_utf8<F>(&mut self, first: u8, read: &mut F) -> io::Result<Key>
    where
        F: FnMut(Option<Duration>) -> io::Result<Option<u8>>,
    {
        let len = match first {
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Ok(Key::Char(char::REPLACEMENT_CHARACTER)),
        };
        let mut buf = vec![first];
        while buf.len() < len {
            match self.next_byte(Some(ESCAPE_DELAY), read)? {
                Some(byte) => buf.push(byte),
                None => break,
            }
        }
        let ch = std::str::from_utf8(&buf)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        Ok(Key::Char(ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut KeyDecoder, input: &[u8]) -> Vec<Key> {
        let mut bytes: VecDeque<u8> = input.iter().copied().collect();
        let mut keys = Vec::new();
        loop {
            let result = decoder
                .decode(Some(Duration::ZERO), |_| Ok(bytes.pop_front()))
                .unwrap();
            match result {
                Some(key) => keys.push(key),
                None if bytes.is_empty() && decoder.pending.is_empty() => break,
                None => {}
            }
        }
        keys
    }

    fn xterm_decoder() -> KeyDecoder {
        let mut decoder = KeyDecoder::new();
        for (seq, key) in XTERM_REMAP {
            decoder.define_key(seq, *key);
        }
        decoder
    }

    #[test]
    fn test_plain_keys() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(
            decode_all(&mut decoder, b"q\r\t\x7f"),
            vec![Key::Char('q'), Key::Enter, Key::Tab, Key::Backspace]
        );
    }

    #[test]
    fn test_base_sequences() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(
            decode_all(&mut decoder, b"\x1b[A\x1bOD\x1b[5~\x1b[17~"),
            vec![Key::Up, Key::Left, Key::PageUp, Key::F(6)]
        );
    }

    #[test]
    fn test_xterm_remap() {
        let mut decoder = KeyDecoder::new();
        // Without the remap, ESC[H is not a known key
        assert_eq!(decoder.lookup(b"\x1b[H"), None);

        let mut decoder = xterm_decoder();
        assert_eq!(decoder.remapped_count(), 13);
        assert_eq!(
            decode_all(&mut decoder, b"\x1b[H\x1b[F\x1bOP\x1b[14~\x1b[17;2~"),
            vec![Key::Home, Key::End, Key::F(1), Key::F(4), Key::F(18)]
        );
    }

    #[test]
    fn test_unknown_sequence_replays_bytes() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(
            decode_all(&mut decoder, b"\x1bx"),
            vec![Key::Esc, Key::Char('x')]
        );
        assert_eq!(decode_all(&mut decoder, b"\x1b"), vec![Key::Esc]);
    }

    #[test]
    fn test_utf8() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(
            decode_all(&mut decoder, "é日".as_bytes()),
            vec![Key::Char('é'), Key::Char('日')]
        );
    }

    #[test]
    fn test_mouse_click_respects_mask() {
        let mut decoder = KeyDecoder::new();
        assert!(decode_all(&mut decoder, b"\x1b[<0;11;21M\x1b[<0;11;21m").is_empty());

        decoder.set_mouse_mask(MouseMask::BUTTON1_CLICKED);
        let keys = decode_all(&mut decoder, b"\x1b[<0;11;21M\x1b[<0;11;21m\x1b[<64;1;1M");
        assert_eq!(
            keys,
            vec![Key::Mouse(MouseEvent {
                bstate: MouseMask::BUTTON1_CLICKED,
                column: 10,
                row: 20,
            })]
        );
    }

    #[test]
    fn test_release_without_press_is_not_a_click() {
        let mut decoder = KeyDecoder::new();
        decoder.set_mouse_mask(MouseMask::BUTTON1_CLICKED);
        assert!(decode_all(&mut decoder, b"\x1b[<0;5;5m").is_empty());
    }

    #[test]
    fn test_needs_remap() {
        assert!(needs_remap(Some("xterm")));
        assert!(needs_remap(Some("xterm-color")));
        assert!(needs_remap(Some("vt220")));
        assert!(!needs_remap(Some("xterm-256color")));
        assert!(!needs_remap(Some("linux")));
        assert!(!needs_remap(Some("")));
        assert!(!needs_remap(None));
    }
}
