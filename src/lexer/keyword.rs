use std::fmt;
use std::sync::OnceLock;

use hashbrown::HashMap;
use symbol_table::GlobalSymbol as Symbol;

/// C11 keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Storage class specifiers
    Auto,
    Extern,
    Register,
    Static,
    ThreadLocal,
    Typedef,

    // Type qualifiers
    Const,
    Restrict,
    Volatile,
    Atomic,

    // Type specifiers
    Bool,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Signed,
    Unsigned,
    Void,
    Complex,
    Imaginary,
    Struct,
    Union,
    Enum,

    // Control flow
    Break,
    Case,
    Continue,
    Default,
    Do,
    Else,
    For,
    Goto,
    If,
    Return,
    Switch,
    While,

    // Other keywords
    Alignas,
    Alignof,
    Generic,
    Inline,
    Noreturn,
    Sizeof,
    StaticAssert,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("auto", Keyword::Auto),
    ("break", Keyword::Break),
    ("case", Keyword::Case),
    ("char", Keyword::Char),
    ("const", Keyword::Const),
    ("continue", Keyword::Continue),
    ("default", Keyword::Default),
    ("do", Keyword::Do),
    ("double", Keyword::Double),
    ("else", Keyword::Else),
    ("enum", Keyword::Enum),
    ("extern", Keyword::Extern),
    ("float", Keyword::Float),
    ("for", Keyword::For),
    ("goto", Keyword::Goto),
    ("if", Keyword::If),
    ("inline", Keyword::Inline),
    ("int", Keyword::Int),
    ("long", Keyword::Long),
    ("register", Keyword::Register),
    ("restrict", Keyword::Restrict),
    ("return", Keyword::Return),
    ("short", Keyword::Short),
    ("signed", Keyword::Signed),
    ("sizeof", Keyword::Sizeof),
    ("static", Keyword::Static),
    ("struct", Keyword::Struct),
    ("switch", Keyword::Switch),
    ("typedef", Keyword::Typedef),
    ("union", Keyword::Union),
    ("unsigned", Keyword::Unsigned),
    ("void", Keyword::Void),
    ("volatile", Keyword::Volatile),
    ("while", Keyword::While),
    ("_Alignas", Keyword::Alignas),
    ("_Alignof", Keyword::Alignof),
    ("_Atomic", Keyword::Atomic),
    ("_Bool", Keyword::Bool),
    ("_Complex", Keyword::Complex),
    ("_Generic", Keyword::Generic),
    ("_Imaginary", Keyword::Imaginary),
    ("_Noreturn", Keyword::Noreturn),
    ("_Static_assert", Keyword::StaticAssert),
    ("_Thread_local", Keyword::ThreadLocal),
];

fn keyword_map() -> &'static HashMap<Symbol, Keyword> {
    static MAP: OnceLock<HashMap<Symbol, Keyword>> = OnceLock::new();
    MAP.get_or_init(|| KEYWORDS.iter().map(|(s, k)| (Symbol::new(s), *k)).collect())
}

impl Keyword {
    /// Check if a symbol represents a C11 keyword.
    pub fn lookup(symbol: Symbol) -> Option<Keyword> {
        keyword_map().get(&symbol).copied()
    }

    pub fn as_str(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, k)| *k == self)
            .map(|(s, _)| *s)
            .unwrap_or("")
    }

    pub fn is_storage_class_specifier(self) -> bool {
        matches!(
            self,
            Keyword::Typedef
                | Keyword::Extern
                | Keyword::Static
                | Keyword::ThreadLocal
                | Keyword::Auto
                | Keyword::Register
        )
    }

    pub fn is_type_specifier(self) -> bool {
        matches!(
            self,
            Keyword::Void
                | Keyword::Char
                | Keyword::Short
                | Keyword::Int
                | Keyword::Long
                | Keyword::Float
                | Keyword::Double
                | Keyword::Signed
                | Keyword::Unsigned
                | Keyword::Bool
                | Keyword::Complex
                | Keyword::Imaginary
                | Keyword::Struct
                | Keyword::Union
                | Keyword::Enum
        )
    }

    pub fn is_type_qualifier(self) -> bool {
        matches!(
            self,
            Keyword::Const | Keyword::Restrict | Keyword::Volatile | Keyword::Atomic
        )
    }

    pub fn is_function_specifier(self) -> bool {
        matches!(self, Keyword::Inline | Keyword::Noreturn)
    }

    /// Check if the keyword can start a declaration specifier
    pub fn is_declaration_specifier_start(self) -> bool {
        self.is_storage_class_specifier()
            || self.is_type_specifier()
            || self.is_type_qualifier()
            || self.is_function_specifier()
            || self == Keyword::Alignas
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(Keyword::lookup(Symbol::new("_Static_assert")), Some(Keyword::StaticAssert));
        assert_eq!(Keyword::lookup(Symbol::new("integer")), None);
        for (spelling, keyword) in KEYWORDS {
            assert_eq!(keyword.as_str(), *spelling);
        }
    }
}
