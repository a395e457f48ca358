//! Attributed text buffer
//!
//! `RichString` is the output buffer every `display` slot renders into.
//! It stores one attribute per character so a single line can mix colors.

use unicode_width::UnicodeWidthChar;

use crate::crt::color::Attr;

/// A single character with its rendering attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RichCell {
    pub ch: char,
    pub attr: Attr,
}

/// A line of attributed text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RichString {
    cells: Vec<RichCell>,
}

impl RichString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Append `text` rendered with `attr`
    pub fn append(&mut self, attr: Attr, text: &str) {
        self.cells.extend(text.chars().map(|ch| RichCell { ch, attr }));
    }

    pub fn push(&mut self, attr: Attr, ch: char) {
        self.cells.push(RichCell { ch, attr });
    }

    /// Replace the contents with `text` rendered with `attr`
    pub fn write(&mut self, attr: Attr, text: &str) {
        self.cells.clear();
        self.append(attr, text);
    }

    /// Re-color the characters in `start..end` (clamped to the length)
    pub fn set_attr_range(&mut self, attr: Attr, start: usize, end: usize) {
        let end = end.min(self.cells.len());
        if start >= end {
            return;
        }
        for cell in &mut self.cells[start..end] {
            cell.attr = attr;
        }
    }

    /// Re-color the whole line
    pub fn set_attr(&mut self, attr: Attr) {
        let len = self.cells.len();
        self.set_attr_range(attr, 0, len);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Number of characters
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Display width in terminal columns
    pub fn width(&self) -> usize {
        self.cells
            .iter()
            .map(|cell| cell.ch.width().unwrap_or(0))
            .sum()
    }

    pub fn cells(&self) -> &[RichCell] {
        &self.cells
    }

    /// Plain text without attributes
    pub fn text(&self) -> String {
        self.cells.iter().map(|cell| cell.ch).collect()
    }

    /// Consecutive runs sharing one attribute, as `(attr, text)`
    pub fn runs(&self) -> Vec<(Attr, String)> {
        let mut runs: Vec<(Attr, String)> = Vec::new();
        for cell in &self.cells {
            match runs.last_mut() {
                Some((attr, text)) if *attr == cell.attr => text.push(cell.ch),
                _ => runs.push((cell.attr, cell.ch.to_string())),
            }
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crt::color::BaseColor;

    #[test]
    fn test_append_and_runs() {
        let red = Attr::color(BaseColor::Red, BaseColor::Reset);
        let mut s = RichString::new();
        s.append(Attr::NORMAL, "PID ");
        s.append(red, "1234");

        assert_eq!(s.text(), "PID 1234");
        assert_eq!(
            s.runs(),
            vec![(Attr::NORMAL, "PID ".to_string()), (red, "1234".to_string())]
        );
    }

    #[test]
    fn test_write_replaces() {
        let mut s = RichString::new();
        s.append(Attr::NORMAL, "old");
        s.write(Attr::BOLD, "new");
        assert_eq!(s.text(), "new");
        assert!(s.cells().iter().all(|c| c.attr == Attr::BOLD));
    }

    #[test]
    fn test_set_attr_range_clamps() {
        let mut s = RichString::new();
        s.append(Attr::NORMAL, "abcdef");
        s.set_attr_range(Attr::BOLD, 4, 100);
        assert_eq!(s.cells()[3].attr, Attr::NORMAL);
        assert_eq!(s.cells()[4].attr, Attr::BOLD);
        assert_eq!(s.cells()[5].attr, Attr::BOLD);

        s.set_attr_range(Attr::BOLD, 10, 12);
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn test_wide_chars() {
        let mut s = RichString::new();
        s.append(Attr::NORMAL, "日本a");
        assert_eq!(s.len(), 3);
        assert_eq!(s.width(), 5);
    }
}
