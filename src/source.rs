use std::fmt;

use symbol_table::GlobalSymbol as Symbol;

/// Logical position of a token: file name, 1-based line and column.
///
/// The line and file are the *reported* ones, so they reflect `#line` rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Symbol,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: Symbol, line: u32, column: u32) -> Self {
        SourceLocation { file, line, column }
    }

    /// Location used for tokens synthesized by the compiler itself.
    pub fn builtin() -> Self {
        SourceLocation {
            file: Symbol::new("<built-in>"),
            line: 0,
            column: 0,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.line == 0 && self.file.as_str() == "<built-in>"
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
