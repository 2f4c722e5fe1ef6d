//! Lexer: code points to tokens.
//!
//! In [`LexerMode::Preprocessor`] the lexer yields preprocessing tokens (whitespace,
//! pp-numbers, raw identifiers). In [`LexerMode::Parser`] it yields parser tokens
//! directly: keywords, typed constants and merged adjacent string literals.
//! [`convert_preprocessed`] turns the preprocessor's output into the latter form.

pub mod cursor;
pub mod keyword;
pub mod number;
pub mod punctuator;
pub mod string_literal;
pub mod token;

use log::trace;
use symbol_table::GlobalSymbol as Symbol;

pub use cursor::{CursorState, SourceCursor};
pub use keyword::Keyword;
pub use punctuator::{Punctuator, PunctuatorTrie};
pub use string_literal::StringBuffer;
pub use token::{
    CharType, Constant, ExtensionToken, FloatType, IntegerType, StringEncoding, StringLiteral, StringValue, Token,
    TokenExtension, TokenFlags, TokenKind,
};

use crate::error::{Error, ErrorKind, Result};
use crate::source::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerMode {
    Preprocessor,
    Parser,
}

/// Recognizes one token at the cursor, or fails with `NoMatch`.
pub fn next_token(cursor: &mut SourceCursor, mode: LexerMode, header_names: bool) -> Result<Token> {
    if mode == LexerMode::Parser {
        skip_whitespace(cursor)?;
    }
    let location = cursor.location();
    if cursor.is_eof() {
        return Ok(Token::sentinel(location));
    }

    if mode == LexerMode::Preprocessor {
        match cursor.attempt(match_whitespace) {
            Err(e) if e.is_no_match() => {}
            other => return other.map(|newline| Token::new(TokenKind::Whitespace { newline }, location)),
        }
        if header_names {
            match cursor.attempt(match_header_name) {
                Err(e) if e.is_no_match() => {}
                other => return other.map(|kind| Token::new(kind, location)),
            }
        }
    }

    match cursor.attempt(string_literal::match_char_constant) {
        Err(e) if e.is_no_match() => {}
        other => {
            return other.map(|(value, spelling)| Token::new(TokenKind::Constant { value, spelling }, location))
        }
    }

    match cursor.attempt(string_literal::match_string_literal) {
        Err(e) if e.is_no_match() => {}
        Err(e) => return Err(e),
        Ok(literal) => {
            let literal = match mode {
                LexerMode::Parser => merge_adjacent_literals(cursor, literal)?,
                LexerMode::Preprocessor => literal,
            };
            return Ok(Token::new(TokenKind::StringLiteral(literal), location));
        }
    }

    let number = match mode {
        LexerMode::Preprocessor => cursor.attempt(number::match_pp_number).map(TokenKind::PpNumber),
        LexerMode::Parser => cursor
            .attempt(number::match_constant)
            .map(|(value, spelling)| TokenKind::Constant { value, spelling }),
    };
    match number {
        Err(e) if e.is_no_match() => {}
        other => return other.map(|kind| Token::new(kind, location)),
    }

    match cursor.attempt(match_identifier) {
        Err(e) if e.is_no_match() => {}
        Err(e) => return Err(e),
        Ok(name) => {
            let kind = match (mode, Keyword::lookup(name)) {
                (LexerMode::Parser, Some(keyword)) => TokenKind::Keyword(keyword),
                _ => TokenKind::Identifier(name),
            };
            return Ok(Token::new(kind, location));
        }
    }

    if let Some(m) = PunctuatorTrie::get().longest_match(|i| cursor.at(i)) {
        cursor.advance(m.length);
        let mut token = Token::punctuator(m.punctuator, location);
        if m.digraph {
            token.flags |= TokenFlags::DIGRAPH;
        }
        return Ok(token);
    }

    Err(Error::no_match(location))
}

/// Skips blanks and comments; `Ok(true)` when the run is a newline.
fn match_whitespace(cursor: &mut SourceCursor) -> Result<bool> {
    if cursor.current() == Some('\n') {
        cursor.advance(1);
        return Ok(true);
    }
    let start = cursor.position();
    loop {
        match (cursor.at(0), cursor.at(1)) {
            (Some(' ' | '\t' | '\u{b}' | '\u{c}'), _) => cursor.advance(1),
            (Some('/'), Some('*')) => skip_block_comment(cursor)?,
            (Some('/'), Some('/')) => {
                while cursor.current().is_some_and(|c| c != '\n') {
                    cursor.advance(1);
                }
            }
            _ => break,
        }
    }
    if cursor.position() == start {
        return Err(Error::no_match(cursor.location()));
    }
    Ok(false)
}

fn skip_block_comment(cursor: &mut SourceCursor) -> Result<()> {
    let location = cursor.location();
    cursor.advance(2);
    loop {
        match (cursor.at(0), cursor.at(1)) {
            (Some('*'), Some('/')) => {
                cursor.advance(2);
                return Ok(());
            }
            (Some(_), _) => cursor.advance(1),
            (None, _) => return Err(Error::malformed(location, "unterminated comment")),
        }
    }
}

fn skip_whitespace(cursor: &mut SourceCursor) -> Result<()> {
    loop {
        match cursor.attempt(match_whitespace) {
            Ok(_) => continue,
            Err(e) if e.is_no_match() => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

fn match_header_name(cursor: &mut SourceCursor) -> Result<TokenKind> {
    let (system, close) = match cursor.current() {
        Some('<') => (true, '>'),
        Some('"') => (false, '"'),
        _ => return Err(Error::no_match(cursor.location())),
    };
    cursor.advance(1);
    let start = cursor.position();
    while let Some(c) = cursor.current() {
        if c == close {
            let name = cursor.slice(start, cursor.position());
            cursor.advance(1);
            return Ok(TokenKind::PpHeaderName {
                system,
                name: Symbol::new(&name),
            });
        }
        if c == '\n' {
            break;
        }
        cursor.advance(1);
    }
    Err(Error::no_match(cursor.location()))
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (!c.is_ascii() && c.is_alphabetic())
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || (!c.is_ascii() && c.is_alphanumeric())
}

/// Identifier with universal character names decoded into the spelling.
fn match_identifier(cursor: &mut SourceCursor) -> Result<Symbol> {
    let mut name = String::new();
    loop {
        let location = cursor.location();
        match (cursor.at(0), cursor.at(1)) {
            (Some('\\'), Some(marker @ ('u' | 'U'))) => {
                cursor.advance(2);
                let count = if marker == 'u' { 4 } else { 8 };
                let c = string_literal::universal_character(cursor, count, location)?;
                if name.is_empty() && c.is_ascii_digit() {
                    return Err(Error::malformed(location, "identifier cannot start with a digit"));
                }
                name.push(c);
            }
            (Some(c), _) if name.is_empty() && is_identifier_start(c) => {
                name.push(c);
                cursor.advance(1);
            }
            (Some(c), _) if !name.is_empty() && is_identifier_continue(c) => {
                name.push(c);
                cursor.advance(1);
            }
            _ => break,
        }
    }
    if name.is_empty() {
        return Err(Error::no_match(cursor.location()));
    }
    Ok(Symbol::new(&name))
}

/// Parser mode: glue following literals onto `first`, skipping whitespace in between.
fn merge_adjacent_literals(cursor: &mut SourceCursor, first: StringLiteral) -> Result<StringLiteral> {
    let location = cursor.location();
    let mut spelling = first.spelling.as_str().to_string();
    let mut buffer = StringBuffer::new(first.value.encoding());
    buffer.append(&first.value)?;
    loop {
        let state = cursor.save();
        skip_whitespace(cursor)?;
        match string_literal::match_string_literal(cursor) {
            Ok(next) => {
                buffer
                    .append(&next.value)
                    .map_err(|e| Error::malformed(location, e.message))?;
                spelling.push(' ');
                spelling.push_str(next.spelling.as_str());
            }
            Err(e) if e.is_no_match() => {
                cursor.restore(state);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(StringLiteral {
        spelling: Symbol::new(&spelling),
        value: buffer.finish(),
    })
}

/// Stateful wrapper around [`next_token`] for one source file.
#[derive(Debug, Clone)]
pub struct Lexer {
    cursor: SourceCursor,
    mode: LexerMode,
    header_names: bool,
}

impl Lexer {
    pub fn new(source: &str, file: Symbol, mode: LexerMode) -> Self {
        Self::from_cursor(SourceCursor::new(source, file), mode)
    }

    pub fn from_cursor(cursor: SourceCursor, mode: LexerMode) -> Self {
        Lexer {
            cursor,
            mode,
            header_names: false,
        }
    }

    pub fn cursor(&self) -> &SourceCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut SourceCursor {
        &mut self.cursor
    }

    /// Header names are only recognized right after `#include`.
    pub fn set_header_names(&mut self, allowed: bool) {
        self.header_names = allowed;
    }

    pub fn next_token(&mut self) -> Result<Token> {
        let token = next_token(&mut self.cursor, self.mode, self.header_names).or_else(|e| {
            if e.kind == ErrorKind::NoMatch {
                let found = self.cursor.current().unwrap_or(' ');
                Err(Error::malformed(e.location, format!("unexpected character '{}'", found)))
            } else {
                Err(e)
            }
        })?;
        trace!("lexed {:?} at {}", token.kind, token.location);
        Ok(token)
    }

    /// All remaining tokens, sentinel included.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.is_sentinel();
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Consumes raw input through the end of the line, for skipped conditional groups.
    ///
    /// Comments may carry the skip across lines; quotes are matched leniently.
    pub fn skip_line(&mut self) {
        let cursor = &mut self.cursor;
        while let Some(c) = cursor.current() {
            match (c, cursor.at(1)) {
                ('\n', _) => {
                    cursor.advance(1);
                    return;
                }
                ('/', Some('*')) => {
                    if skip_block_comment(cursor).is_err() {
                        return;
                    }
                }
                ('/', Some('/')) => {
                    while cursor.current().is_some_and(|c| c != '\n') {
                        cursor.advance(1);
                    }
                }
                ('"' | '\'', _) => {
                    cursor.advance(1);
                    while let Some(inner) = cursor.current() {
                        if inner == '\n' {
                            break;
                        }
                        cursor.advance(1);
                        if inner == '\\' {
                            cursor.advance(1);
                        } else if inner == c {
                            break;
                        }
                    }
                }
                _ => cursor.advance(1),
            }
        }
    }

    /// Skips blanks and comments that do not end the line.
    pub fn skip_blanks(&mut self) -> Result<()> {
        loop {
            if self.cursor.current() == Some('\n') {
                return Ok(());
            }
            match self.cursor.attempt(match_whitespace) {
                Ok(_) => continue,
                Err(e) if e.is_no_match() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Converts preprocessing tokens into parser tokens.
///
/// Whitespace and placemarkers disappear, identifiers become keywords where they
/// spell one, pp-numbers become typed constants and adjacent literals are merged.
pub fn convert_preprocessed(tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut pending: Option<(StringBuffer, String, SourceLocation)> = None;

    for token in tokens {
        let kind = match token.kind {
            TokenKind::Whitespace { .. } | TokenKind::Placemarker => continue,
            TokenKind::StringLiteral(literal) => {
                match pending.as_mut() {
                    Some((buffer, spelling, location)) => {
                        buffer
                            .append(&literal.value)
                            .map_err(|e| Error::malformed(*location, e.message))?;
                        spelling.push(' ');
                        spelling.push_str(literal.spelling.as_str());
                    }
                    None => {
                        let mut buffer = StringBuffer::new(literal.value.encoding());
                        buffer.append(&literal.value)?;
                        let spelling = literal.spelling.as_str().to_string();
                        pending = Some((buffer, spelling, token.location));
                    }
                }
                continue;
            }
            TokenKind::Identifier(name) => match Keyword::lookup(name) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(name),
            },
            TokenKind::PpNumber(spelling) => TokenKind::Constant {
                value: number::parse_pp_number(spelling.as_str(), token.location)?,
                spelling,
            },
            TokenKind::PpHeaderName { .. } => {
                return Err(Error::malformed(token.location, "header name outside of #include"));
            }
            other => other,
        };
        flush_literal(&mut pending, &mut out);
        out.push(Token {
            kind,
            location: token.location,
            flags: token.flags - TokenFlags::NO_EXPAND,
        });
    }
    flush_literal(&mut pending, &mut out);

    if !out.last().is_some_and(Token::is_sentinel) {
        let location = out.last().map(|t| t.location).unwrap_or_default();
        out.push(Token::sentinel(location));
    }
    Ok(out)
}

fn flush_literal(pending: &mut Option<(StringBuffer, String, SourceLocation)>, out: &mut Vec<Token>) {
    if let Some((buffer, spelling, location)) = pending.take() {
        let literal = StringLiteral {
            spelling: Symbol::new(&spelling),
            value: buffer.finish(),
        };
        out.push(Token::new(TokenKind::StringLiteral(literal), location));
    }
}
