//! Macro definitions and the scopes they live in.

use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use crate::error::Result;
use crate::lang_options::{Environment, FeatureFlags};
use crate::lexer::{Lexer, LexerMode, Token, TokenKind};
use crate::source::SourceLocation;

/// Macros whose expansion depends on where they are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicMacro {
    File,
    Line,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroKind {
    Object,
    Function {
        params: Vec<Symbol>,
        /// `...` was declared; the tail arguments bind to `__VA_ARGS__`
        variadic: bool,
    },
    Dynamic(DynamicMacro),
}

/// Represents a macro definition
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: Symbol,
    pub kind: MacroKind,
    /// Replacement list; whitespace runs are collapsed and never lead or trail
    pub replacement: Vec<Token>,
    pub location: SourceLocation,
}

impl Macro {
    pub fn object(name: Symbol, replacement: Vec<Token>, location: SourceLocation) -> Self {
        Macro {
            name,
            kind: MacroKind::Object,
            replacement,
            location,
        }
    }

    pub fn function(
        name: Symbol,
        params: Vec<Symbol>,
        variadic: bool,
        replacement: Vec<Token>,
        location: SourceLocation,
    ) -> Self {
        Macro {
            name,
            kind: MacroKind::Function { params, variadic },
            replacement,
            location,
        }
    }

    pub fn is_function_like(&self) -> bool {
        matches!(self.kind, MacroKind::Function { .. })
    }

    /// Index of `name` among the parameters, `__VA_ARGS__` coming last.
    pub fn parameter_index(&self, name: Symbol) -> Option<usize> {
        let MacroKind::Function { params, variadic } = &self.kind else {
            return None;
        };
        if let Some(index) = params.iter().position(|p| *p == name) {
            return Some(index);
        }
        (*variadic && name.as_str() == "__VA_ARGS__").then_some(params.len())
    }

    /// Two definitions are identical when kind, parameters and replacement spelling
    /// (with whitespace separation) agree.
    pub fn is_identical(&self, other: &Macro) -> bool {
        let spelling = |tokens: &[Token]| -> Vec<String> { tokens.iter().map(Token::spelling).collect() };
        self.kind == other.kind && spelling(&self.replacement) == spelling(&other.replacement)
    }

    pub fn replacement_text(&self) -> String {
        self.replacement.iter().map(Token::spelling).collect()
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#define {}", self.name)?;
        match &self.kind {
            MacroKind::Object => {}
            MacroKind::Function { params, variadic } => {
                let names = params
                    .iter()
                    .map(|p| p.as_str())
                    .chain(variadic.then_some("..."))
                    .join(", ");
                write!(f, "({})", names)?;
            }
            MacroKind::Dynamic(_) => return write!(f, " <dynamic>"),
        }
        if !self.replacement.is_empty() {
            write!(f, " {}", self.replacement_text())?;
        }
        Ok(())
    }
}

/// Lookup interface shared by macro tables and their overlays.
pub trait MacroScope {
    fn lookup(&self, name: Symbol) -> Option<&Macro>;

    fn is_defined(&self, name: Symbol) -> bool {
        self.lookup(name).is_some()
    }
}

/// One flat scope of macro definitions, in definition order.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: IndexMap<Symbol, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler-provided macros for `environment`.
    pub fn predefined(environment: &Environment) -> Result<Self> {
        let mut table = MacroTable::new();
        let location = SourceLocation::builtin();
        let add_text = |table: &mut MacroTable, name: &str, text: &str| -> Result<()> {
            let replacement = lex_replacement(text)?;
            table.define(Macro::object(Symbol::new(name), replacement, location));
            Ok(())
        };

        for (name, kind) in [("__FILE__", DynamicMacro::File), ("__LINE__", DynamicMacro::Line)] {
            table.define(Macro {
                name: Symbol::new(name),
                kind: MacroKind::Dynamic(kind),
                replacement: Vec::new(),
                location,
            });
        }
        add_text(&mut table, "__DATE__", &format!("\"{}\"", environment.date_string()))?;
        add_text(&mut table, "__TIME__", &format!("\"{}\"", environment.time_string()))?;
        add_text(&mut table, "__STDC__", "1")?;
        add_text(&mut table, "__STDC_HOSTED__", if environment.hosted { "1" } else { "0" })?;
        add_text(&mut table, "__STDC_VERSION__", &format!("{}L", environment.version))?;
        for (flag, name) in FeatureFlags::MACROS {
            if environment.features.contains(flag) {
                add_text(&mut table, name, "1")?;
            }
        }
        Ok(table)
    }

    /// Insert or replace a definition, returning the previous one.
    pub fn define(&mut self, definition: Macro) -> Option<Macro> {
        debug!("define macro {}", definition.name);
        self.macros.insert(definition.name, definition)
    }

    pub fn undefine(&mut self, name: Symbol) -> Option<Macro> {
        debug!("undefine macro {}", name);
        self.macros.shift_remove(&name)
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.macros.contains_key(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.values()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// One `#define` line per macro, in definition order.
    pub fn render(&self) -> String {
        self.iter().map(|m| format!("{}\n", m)).collect()
    }
}

impl MacroScope for MacroTable {
    fn lookup(&self, name: Symbol) -> Option<&Macro> {
        self.macros.get(&name)
    }
}

/// An inner scope consulted before falling back to an outer one.
pub struct Overlay<'a> {
    pub inner: &'a dyn MacroScope,
    pub outer: &'a dyn MacroScope,
}

impl MacroScope for Overlay<'_> {
    fn lookup(&self, name: Symbol) -> Option<&Macro> {
        self.inner.lookup(name).or_else(|| self.outer.lookup(name))
    }
}

/// Lex `text` into a normalized replacement list.
pub fn lex_replacement(text: &str) -> Result<Vec<Token>> {
    let tokens = Lexer::new(text, Symbol::new("<built-in>"), LexerMode::Preprocessor).tokenize()?;
    Ok(normalize_replacement(tokens))
}

/// Collapse whitespace runs to one blank and trim both ends.
pub(crate) fn normalize_replacement(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token.kind {
            TokenKind::Sentinel => break,
            TokenKind::Whitespace { .. } => {
                if out.last().is_some_and(|t| !t.is_whitespace()) {
                    out.push(Token::new(TokenKind::Whitespace { newline: false }, token.location));
                }
            }
            _ => out.push(token),
        }
    }
    while out.last().is_some_and(Token::is_whitespace) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_prefers_inner_scope() {
        let mut outer = MacroTable::new();
        let mut inner = MacroTable::new();
        let name = Symbol::new("VALUE");
        outer.define(Macro::object(name, lex_replacement("1").unwrap(), SourceLocation::builtin()));
        inner.define(Macro::object(name, lex_replacement("2").unwrap(), SourceLocation::builtin()));

        let overlay = Overlay {
            inner: &inner,
            outer: &outer,
        };
        assert_eq!(overlay.lookup(name).unwrap().replacement_text(), "2");
        inner.undefine(name);
        let overlay = Overlay {
            inner: &inner,
            outer: &outer,
        };
        assert_eq!(overlay.lookup(name).unwrap().replacement_text(), "1");
        assert!(!overlay.is_defined(Symbol::new("OTHER")));
    }

    #[test]
    fn test_identical_definitions_ignore_whitespace_width() {
        let name = Symbol::new("M");
        let a = Macro::object(name, lex_replacement("a   +  b").unwrap(), SourceLocation::builtin());
        let b = Macro::object(name, lex_replacement("a + b").unwrap(), SourceLocation::builtin());
        let c = Macro::object(name, lex_replacement("a+b").unwrap(), SourceLocation::builtin());
        assert!(a.is_identical(&b));
        assert!(!a.is_identical(&c));
    }

    #[test]
    fn test_predefined_macros_golden() {
        let table = MacroTable::predefined(&Environment::default()).unwrap();
        insta::assert_snapshot!(table.render().trim_end(), @r###"
        #define __FILE__ <dynamic>
        #define __LINE__ <dynamic>
        #define __DATE__ "Jan  1 1970"
        #define __TIME__ "00:00:00"
        #define __STDC__ 1
        #define __STDC_HOSTED__ 1
        #define __STDC_VERSION__ 201112L
        #define __STDC_UTF_16__ 1
        #define __STDC_UTF_32__ 1
        #define __STDC_NO_ATOMICS__ 1
        #define __STDC_NO_COMPLEX__ 1
        #define __STDC_NO_THREADS__ 1
        #define __STDC_NO_VLA__ 1
        "###);
    }
}
