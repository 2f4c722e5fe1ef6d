//! Token model shared by the preprocessor and the parser.

use std::fmt;
use std::sync::Arc;

use symbol_table::GlobalSymbol as Symbol;

use super::keyword::Keyword;
use super::punctuator::Punctuator;
use crate::source::SourceLocation;

/// String literal encoding prefixes, in the order the lexer tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringEncoding {
    Multibyte,
    Utf8,
    Utf16,
    Utf32,
    Wide,
}

impl StringEncoding {
    pub fn prefix(self) -> &'static str {
        match self {
            StringEncoding::Multibyte => "",
            StringEncoding::Utf8 => "u8",
            StringEncoding::Utf16 => "u",
            StringEncoding::Utf32 => "U",
            StringEncoding::Wide => "L",
        }
    }

    pub fn is_narrow(self) -> bool {
        matches!(self, StringEncoding::Multibyte | StringEncoding::Utf8)
    }
}

/// Decoded literal contents, without the terminating null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringValue {
    Multibyte(Vec<u8>),
    Utf8(Vec<u8>),
    Utf16(Vec<u16>),
    Utf32(Vec<u32>),
    Wide(Vec<u32>),
}

impl StringValue {
    pub fn encoding(&self) -> StringEncoding {
        match self {
            StringValue::Multibyte(_) => StringEncoding::Multibyte,
            StringValue::Utf8(_) => StringEncoding::Utf8,
            StringValue::Utf16(_) => StringEncoding::Utf16,
            StringValue::Utf32(_) => StringEncoding::Utf32,
            StringValue::Wide(_) => StringEncoding::Wide,
        }
    }

    /// Number of code units, excluding the terminator.
    pub fn len(&self) -> usize {
        match self {
            StringValue::Multibyte(v) | StringValue::Utf8(v) => v.len(),
            StringValue::Utf16(v) => v.len(),
            StringValue::Utf32(v) | StringValue::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Narrow contents as text, for `#include` paths and diagnostics.
    pub fn to_text(&self) -> String {
        match self {
            StringValue::Multibyte(v) | StringValue::Utf8(v) => String::from_utf8_lossy(v).into_owned(),
            StringValue::Utf16(v) => String::from_utf16_lossy(v),
            StringValue::Utf32(v) | StringValue::Wide(v) => {
                v.iter().filter_map(|u| char::from_u32(*u)).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    /// Source spelling, quotes and prefix included.
    pub spelling: Symbol,
    pub value: StringValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerType {
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
}

impl IntegerType {
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            IntegerType::UnsignedInt | IntegerType::UnsignedLong | IntegerType::UnsignedLongLong
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatType {
    Float,
    Double,
    LongDouble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharType {
    Char,
    WideChar,
    Char16,
    Char32,
}

/// Numeric and character constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Integer { value: u64, ty: IntegerType },
    Floating { value: f64, ty: FloatType },
    Character { value: i64, ty: CharType },
}

/// Open extension point for tokens produced outside the core lexer.
pub trait TokenExtension: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn spelling(&self) -> String;
}

/// Shared handle to an extension payload; equal only to itself.
#[derive(Debug, Clone)]
pub struct ExtensionToken(pub Arc<dyn TokenExtension>);

impl PartialEq for ExtensionToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Sentinel,
    Keyword(Keyword),
    Identifier(Symbol),
    Punctuator(Punctuator),
    StringLiteral(StringLiteral),
    Constant { value: Constant, spelling: Symbol },

    // Preprocessor-only kinds
    Whitespace { newline: bool },
    PpNumber(Symbol),
    PpHeaderName { system: bool, name: Symbol },
    Placemarker,
    Extension(ExtensionToken),
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TokenFlags: u8 {
        /// Painted identifier: never substituted again.
        const NO_EXPAND = 1 << 0;
        /// Produced by macro substitution.
        const MACRO_EXPANDED = 1 << 1;
        /// Punctuator written with its digraph spelling.
        const DIGRAPH = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    pub flags: TokenFlags,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation) -> Self {
        Token {
            kind,
            location,
            flags: TokenFlags::empty(),
        }
    }

    pub fn sentinel(location: SourceLocation) -> Self {
        Token::new(TokenKind::Sentinel, location)
    }

    pub fn identifier(name: &str, location: SourceLocation) -> Self {
        Token::new(TokenKind::Identifier(Symbol::new(name)), location)
    }

    pub fn pp_number(text: &str, location: SourceLocation) -> Self {
        Token::new(TokenKind::PpNumber(Symbol::new(text)), location)
    }

    pub fn punctuator(punctuator: Punctuator, location: SourceLocation) -> Self {
        Token::new(TokenKind::Punctuator(punctuator), location)
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace { .. })
    }

    pub fn is_newline(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace { newline: true })
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, TokenKind::Sentinel)
    }

    pub fn is_punctuator(&self, punctuator: Punctuator) -> bool {
        self.kind == TokenKind::Punctuator(punctuator)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn as_identifier(&self) -> Option<Symbol> {
        match self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Source text of the token, as stringification and pasting see it.
    pub fn spelling(&self) -> String {
        match &self.kind {
            TokenKind::Sentinel | TokenKind::Placemarker => String::new(),
            TokenKind::Keyword(k) => k.as_str().to_string(),
            TokenKind::Identifier(name) | TokenKind::PpNumber(name) => name.as_str().to_string(),
            TokenKind::Punctuator(p) => {
                if self.flags.contains(TokenFlags::DIGRAPH) {
                    p.digraph().unwrap_or(p.as_str()).to_string()
                } else {
                    p.as_str().to_string()
                }
            }
            TokenKind::StringLiteral(lit) => lit.spelling.as_str().to_string(),
            TokenKind::Constant { spelling, .. } => spelling.as_str().to_string(),
            TokenKind::Whitespace { newline: true } => "\n".to_string(),
            TokenKind::Whitespace { newline: false } => " ".to_string(),
            TokenKind::PpHeaderName { system: true, name } => format!("<{}>", name),
            TokenKind::PpHeaderName { system: false, name } => format!("\"{}\"", name),
            TokenKind::Extension(ext) => ext.0.spelling(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spelling())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Marker;

    impl TokenExtension for Marker {
        fn name(&self) -> &str {
            "marker"
        }

        fn spelling(&self) -> String {
            "@marker".to_string()
        }
    }

    #[test]
    fn test_extension_token_identity() {
        let ext = ExtensionToken(Arc::new(Marker));
        let a = Token::new(TokenKind::Extension(ext.clone()), SourceLocation::builtin());
        let b = Token::new(TokenKind::Extension(ExtensionToken(Arc::new(Marker))), SourceLocation::builtin());
        assert_eq!(a.clone(), a);
        assert_ne!(a, b);
        assert_eq!(a.spelling(), "@marker");
        assert_eq!(ext.0.name(), "marker");
    }

    #[test]
    fn test_digraph_spelling_round_trip() {
        let mut token = Token::punctuator(Punctuator::LeftBracket, SourceLocation::builtin());
        assert_eq!(token.spelling(), "[");
        token.flags |= TokenFlags::DIGRAPH;
        assert_eq!(token.spelling(), "<:");
    }
}
