//! Code-point cursor over one source file.
//!
//! Backslash-newline splices are removed up front, so every consumer sees logical
//! characters only, while each character keeps the physical line/column it came from.

use symbol_table::GlobalSymbol as Symbol;

use crate::error::Result;
use crate::source::SourceLocation;

/// Restore point for backtracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    index: usize,
    file: Symbol,
    line_offset: i64,
}

#[derive(Debug, Clone)]
pub struct SourceCursor {
    chars: Vec<char>,
    positions: Vec<(u32, u32)>,
    end_position: (u32, u32),
    index: usize,
    file: Symbol,
    line_offset: i64,
}

impl SourceCursor {
    pub fn new(text: &str, file: Symbol) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut positions = Vec::with_capacity(text.len());
        let (mut line, mut column) = (1u32, 1u32);
        let mut iter = text.chars().peekable();

        while let Some(ch) = iter.next() {
            match ch {
                '\\' if matches!(iter.peek(), Some('\n') | Some('\r')) => {
                    if iter.next() == Some('\r') && iter.peek() == Some(&'\n') {
                        iter.next();
                    }
                    line += 1;
                    column = 1;
                }
                '\r' => {
                    if iter.peek() == Some(&'\n') {
                        iter.next();
                    }
                    chars.push('\n');
                    positions.push((line, column));
                    line += 1;
                    column = 1;
                }
                '\n' => {
                    chars.push('\n');
                    positions.push((line, column));
                    line += 1;
                    column = 1;
                }
                _ => {
                    chars.push(ch);
                    positions.push((line, column));
                    column += 1;
                }
            }
        }

        SourceCursor {
            chars,
            positions,
            end_position: (line, column),
            index: 0,
            file,
            line_offset: 0,
        }
    }

    #[inline]
    pub fn at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    #[inline]
    pub fn current(&self) -> Option<char> {
        self.at(0)
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.index >= self.chars.len()
    }

    pub fn advance(&mut self, count: usize) {
        self.index = (self.index + count).min(self.chars.len());
    }

    /// Consumes `expected` if the input continues with it.
    pub fn eat(&mut self, expected: &str) -> bool {
        let matches = expected.chars().enumerate().all(|(i, c)| self.at(i) == Some(c));
        if matches {
            self.advance(expected.chars().count());
        }
        matches
    }

    pub fn file(&self) -> Symbol {
        self.file
    }

    pub fn position(&self) -> usize {
        self.index
    }

    /// Logical characters between two positions.
    pub fn slice(&self, from: usize, to: usize) -> String {
        self.chars[from.min(self.chars.len())..to.min(self.chars.len())].iter().collect()
    }

    pub fn location(&self) -> SourceLocation {
        self.location_at(0)
    }

    /// Reported location of the character `offset` positions ahead.
    pub fn location_at(&self, offset: usize) -> SourceLocation {
        let (line, column) = self
            .positions
            .get(self.index + offset)
            .copied()
            .unwrap_or(self.end_position);
        let line = (line as i64 + self.line_offset).max(1) as u32;
        SourceLocation::new(self.file, line, column)
    }

    pub fn save(&self) -> CursorState {
        CursorState {
            index: self.index,
            file: self.file,
            line_offset: self.line_offset,
        }
    }

    pub fn restore(&mut self, state: CursorState) {
        self.index = state.index;
        self.file = state.file;
        self.line_offset = state.line_offset;
    }

    /// Runs `f` and rewinds the cursor if it fails.
    pub fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let state = self.save();
        let result = f(self);
        if result.is_err() {
            self.restore(state);
        }
        result
    }

    /// `#line` support: the physical line at the cursor is reported as `line` from now on.
    pub fn set_line(&mut self, line: u32, file: Option<Symbol>) {
        let physical = self
            .positions
            .get(self.index)
            .map(|p| p.0)
            .unwrap_or(self.end_position.0);
        self.line_offset = line as i64 - physical as i64;
        if let Some(file) = file {
            self.file = file;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_splicing_keeps_physical_positions() {
        let cursor = SourceCursor::new("ab\\\ncd\nx", Symbol::new("t.c"));
        assert_eq!(cursor.slice(0, 6), "abcd\nx");
        let mut c = cursor.clone();
        c.advance(2);
        assert_eq!(c.current(), Some('c'));
        assert_eq!(c.location().line, 2);
        assert_eq!(c.location().column, 1);
    }

    #[test]
    fn test_set_line_rewrites_reported_lines() {
        let mut cursor = SourceCursor::new("a\nb\nc", Symbol::new("t.c"));
        cursor.advance(2);
        cursor.set_line(100, Some(Symbol::new("other.c")));
        assert_eq!(cursor.location().line, 100);
        cursor.advance(2);
        assert_eq!(cursor.location().line, 101);
        assert_eq!(cursor.location().file.as_str(), "other.c");
    }

    #[test]
    fn test_attempt_rewinds_on_failure() {
        let mut cursor = SourceCursor::new("abc", Symbol::new("t.c"));
        let r: Result<()> = cursor.attempt(|c| {
            c.advance(2);
            Err(crate::error::Error::no_match(None))
        });
        assert!(r.is_err());
        assert_eq!(cursor.position(), 0);
        assert!(cursor.eat("ab"));
        assert_eq!(cursor.current(), Some('c'));
    }
}
