//! Token sequences with push-front splicing.
//!
//! Macro substitution reads tokens from a stack of buffers. Pushing a replacement
//! list puts it in front of everything not yet read, so the result is rescanned
//! together with the rest of the input. A buffer remembers which macro produced it;
//! while any of its tokens remain unread that macro is "currently expanding".

use symbol_table::GlobalSymbol as Symbol;

use crate::lexer::{Punctuator, Token};

#[derive(Debug)]
struct Buffer {
    tokens: Vec<Token>,
    position: usize,
    origin: Option<Symbol>,
}

impl Buffer {
    fn is_exhausted(&self) -> bool {
        self.position >= self.tokens.len()
    }
}

#[derive(Debug, Default)]
pub struct TokenSequence {
    buffers: Vec<Buffer>,
    /// Macros being expanded by whoever owns this sequence (argument pre-expansion)
    inherited: Vec<Symbol>,
}

impl TokenSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_inherited(tokens, Vec::new())
    }

    /// A sequence rescanned inside the expansion of `inherited` macros.
    pub fn with_inherited(tokens: Vec<Token>, inherited: Vec<Symbol>) -> Self {
        TokenSequence {
            buffers: vec![Buffer {
                tokens,
                position: 0,
                origin: None,
            }],
            inherited,
        }
    }

    /// Splice `tokens` in front of the unread input.
    ///
    /// Exhausted buffers stay below the new one: a macro found at the very end of
    /// another macro's replacement is a nested replacement of it.
    pub fn push_front(&mut self, tokens: Vec<Token>, origin: Option<Symbol>) {
        self.buffers.push(Buffer {
            tokens,
            position: 0,
            origin,
        });
    }

    fn drop_exhausted(&mut self) {
        while self.buffers.len() > 1 && self.buffers.last().is_some_and(Buffer::is_exhausted) {
            self.buffers.pop();
        }
    }

    /// Next token. The buffer it came from stays on the stack until the following read,
    /// so [`is_expanding`](Self::is_expanding) still sees its origin.
    pub fn next(&mut self) -> Option<Token> {
        self.drop_exhausted();
        let buffer = self.buffers.iter_mut().rev().find(|b| !b.is_exhausted())?;
        let token = buffer.tokens.get(buffer.position).cloned();
        buffer.position += 1;
        token
    }

    /// First unread token that is not whitespace, without consuming anything.
    pub fn peek_non_whitespace(&self) -> Option<&Token> {
        self.buffers
            .iter()
            .rev()
            .flat_map(|b| b.tokens[b.position.min(b.tokens.len())..].iter())
            .find(|t| !t.is_whitespace())
    }

    /// Consume whitespace and a following `(`, if that is what comes next.
    pub fn eat_left_paren(&mut self) -> bool {
        if !self
            .peek_non_whitespace()
            .is_some_and(|t| t.is_punctuator(Punctuator::LeftParen))
        {
            return false;
        }
        while let Some(token) = self.next() {
            if !token.is_whitespace() {
                break;
            }
        }
        true
    }

    /// `name` is a macro whose replacement is still being read.
    pub fn is_expanding(&self, name: Symbol) -> bool {
        self.inherited.contains(&name) || self.buffers.iter().any(|b| b.origin == Some(name))
    }

    /// Every macro currently expanding, for nested sequences.
    pub fn expanding(&self) -> Vec<Symbol> {
        let mut names = self.inherited.clone();
        names.extend(self.buffers.iter().filter_map(|b| b.origin));
        names
    }

    pub fn depth(&self) -> usize {
        self.buffers.len() + self.inherited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceLocation;

    fn ident(name: &str) -> Token {
        Token::identifier(name, SourceLocation::builtin())
    }

    #[test]
    fn test_push_front_is_read_first() {
        let mut seq = TokenSequence::new(vec![ident("a"), ident("b")]);
        assert_eq!(seq.next().unwrap().spelling(), "a");
        seq.push_front(vec![ident("x"), ident("y")], Some(Symbol::new("M")));
        let rest: Vec<String> = std::iter::from_fn(|| seq.next()).map(|t| t.spelling()).collect();
        assert_eq!(rest, ["x", "y", "b"]);
    }

    #[test]
    fn test_origin_stays_expanding_until_next_read() {
        let m = Symbol::new("M");
        let mut seq = TokenSequence::new(vec![ident("tail")]);
        seq.push_front(vec![ident("M")], Some(m));
        assert_eq!(seq.next().unwrap().spelling(), "M");
        assert!(seq.is_expanding(m));
        assert_eq!(seq.next().unwrap().spelling(), "tail");
        assert!(!seq.is_expanding(m));
    }

    #[test]
    fn test_eat_left_paren_skips_whitespace_across_buffers() {
        let blank = Token::new(
            crate::lexer::TokenKind::Whitespace { newline: true },
            SourceLocation::builtin(),
        );
        let paren = Token::punctuator(Punctuator::LeftParen, SourceLocation::builtin());
        let mut seq = TokenSequence::new(vec![blank.clone(), paren, ident("x")]);
        seq.push_front(vec![blank], None);
        assert!(seq.eat_left_paren());
        assert_eq!(seq.next().unwrap().spelling(), "x");

        let mut seq = TokenSequence::new(vec![ident("y")]);
        assert!(!seq.eat_left_paren());
        assert_eq!(seq.next().unwrap().spelling(), "y");
    }
}
