//! Parser module for the C11 front-end
//!
//! This module provides the main parser coordination, public API, and state management.
//! It orchestrates the parsing process by delegating to specialized sub-modules for
//! declarations, expressions and statements.

use hashbrown::HashMap;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{Keyword, Punctuator, Token, TokenKind};
use crate::source::SourceLocation;

pub mod declarations;
pub mod expressions;
pub mod statements;

/// Deepest nesting of declarators, expressions or statements accepted before bailing out.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Tracks which identifiers name types, per block scope.
///
/// `true` marks a typedef name, `false` an ordinary identifier shadowing one.
#[derive(Debug)]
pub(crate) struct TypeDefContext {
    scopes: Vec<HashMap<Symbol, bool>>,
}

impl TypeDefContext {
    pub(crate) fn new() -> Self {
        TypeDefContext {
            scopes: vec![HashMap::new()],
        }
    }

    pub(crate) fn is_type_name(&self, symbol: Symbol) -> bool {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&symbol).copied())
            .unwrap_or(false)
    }

    fn declare(&mut self, symbol: Symbol, is_typedef: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(symbol, is_typedef);
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }
}

/// Main parser structure
pub struct Parser<'arena, 'src> {
    tokens: &'src [Token],
    current_idx: usize,
    ast: &'arena mut Ast,
    type_context: TypeDefContext,
    depth: usize,
}

impl<'arena, 'src> Parser<'arena, 'src> {
    /// Create a new parser over converted (parser-mode) tokens
    pub fn new(tokens: &'src [Token], ast: &'arena mut Ast) -> Self {
        Parser {
            tokens,
            current_idx: 0,
            ast,
            type_context: TypeDefContext::new(),
            depth: 0,
        }
    }

    /// Parse translation unit (top level)
    pub fn parse_translation_unit(&mut self) -> Result<NodeRef> {
        declarations::parse_translation_unit(self)
    }

    /// Parse a full expression that must span all tokens.
    pub fn parse_expression_to_end(&mut self) -> Result<NodeRef> {
        let expr = expressions::parse_expression(self)?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse a constant expression (a conditional expression) that must span all tokens.
    pub fn parse_constant_expression_to_end(&mut self) -> Result<NodeRef> {
        let expr = expressions::parse_conditional_expression(self)?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Get the current token, `None` at the end of input
    fn try_current_token(&self) -> Option<&'src Token> {
        self.tokens.get(self.current_idx).filter(|t| !t.is_sentinel())
    }

    /// Get the current token (returns error if at end of input)
    fn current_token(&self) -> Result<&'src Token> {
        self.try_current_token()
            .ok_or_else(|| Error::malformed(self.current_location(), "unexpected end of input"))
    }

    fn current_kind(&self) -> Option<&'src TokenKind> {
        self.try_current_token().map(|t| &t.kind)
    }

    /// Location of the current token, or of the last token at end of input
    pub(crate) fn current_location(&self) -> SourceLocation {
        self.tokens
            .get(self.current_idx)
            .or_else(|| self.tokens.last())
            .map(|t| t.location)
            .unwrap_or_default()
    }

    /// Peek at the token after the current one
    fn peek_token(&self, next_index: usize) -> Option<&'src Token> {
        self.tokens
            .get(self.current_idx + 1 + next_index)
            .filter(|t| !t.is_sentinel())
    }

    /// Advance to the next token and return the previous one
    fn advance(&mut self) -> Option<&'src Token> {
        let token = self.try_current_token()?;
        self.current_idx += 1;
        Some(token)
    }

    fn is_punct(&self, punctuator: Punctuator) -> bool {
        self.try_current_token().is_some_and(|t| t.is_punctuator(punctuator))
    }

    fn is_keyword(&self, keyword: Keyword) -> bool {
        self.try_current_token().is_some_and(|t| t.is_keyword(keyword))
    }

    fn accept_punct(&mut self, punctuator: Punctuator) -> bool {
        if self.is_punct(punctuator) {
            self.current_idx += 1;
            true
        } else {
            false
        }
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        if self.is_keyword(keyword) {
            self.current_idx += 1;
            true
        } else {
            false
        }
    }

    /// Expect a specific punctuator, consume it if found
    fn expect_punct(&mut self, expected: Punctuator) -> Result<SourceLocation> {
        let location = self.current_location();
        if self.accept_punct(expected) {
            Ok(location)
        } else {
            Err(self.unexpected(&format!("'{}'", expected)))
        }
    }

    fn expect_keyword(&mut self, expected: Keyword) -> Result<SourceLocation> {
        let location = self.current_location();
        if self.accept_keyword(expected) {
            Ok(location)
        } else {
            Err(self.unexpected(&format!("'{}'", expected.as_str())))
        }
    }

    /// expect and accept an identifier name, returning the symbol and its location
    fn expect_name(&mut self) -> Result<(Symbol, SourceLocation)> {
        match self.try_current_token() {
            Some(Token {
                kind: TokenKind::Identifier(symbol),
                location,
                ..
            }) => {
                self.current_idx += 1;
                Ok((*symbol, *location))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.try_current_token() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of expression")),
        }
    }

    /// Error describing the current token as unexpected
    fn unexpected(&self, expected: &str) -> Error {
        match self.try_current_token() {
            Some(token) => Error::malformed(
                token.location,
                format!("expected {}, found '{}'", expected, token.spelling()),
            ),
            None => Error::malformed(
                self.current_location(),
                format!("expected {}, found end of input", expected),
            ),
        }
    }

    /// Disambiguates between a type name and an identifier in ambiguous contexts.
    fn is_type_name(&self, symbol: Symbol) -> bool {
        self.type_context.is_type_name(symbol)
    }

    /// Check if the current token can start a type name.
    pub(crate) fn is_type_name_start(&self) -> bool {
        match self.current_kind() {
            Some(TokenKind::Keyword(k)) => k.is_type_specifier() || k.is_type_qualifier(),
            Some(TokenKind::Identifier(symbol)) => self.is_type_name(*symbol),
            _ => false,
        }
    }

    /// Check if the current token can start a declaration
    pub(crate) fn starts_declaration(&self) -> bool {
        match self.current_kind() {
            Some(TokenKind::Keyword(k)) => k.is_declaration_specifier_start() || *k == Keyword::StaticAssert,
            Some(TokenKind::Identifier(symbol)) => {
                self.is_type_name(*symbol)
                    && !self.peek_token(0).is_some_and(|t| t.is_punctuator(Punctuator::Colon))
            }
            _ => false,
        }
    }

    pub(crate) fn add_typedef(&mut self, symbol: Symbol) {
        debug!("add_typedef: {}", symbol);
        self.type_context.declare(symbol, true);
    }

    pub(crate) fn add_ordinary(&mut self, symbol: Symbol) {
        self.type_context.declare(symbol, false);
    }

    pub(crate) fn push_scope(&mut self) {
        self.type_context.push_scope();
    }

    pub(crate) fn pop_scope(&mut self) {
        self.type_context.pop_scope();
    }

    /// Run `f` one nesting level deeper, failing on pathological input depth.
    pub(crate) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(Error::out_of_bounds(
                self.current_location(),
                format!("nesting depth exceeds {}", MAX_NESTING_DEPTH),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

/// contain functions related to AST nodes
impl Parser<'_, '_> {
    /// Push a node to the AST and return its reference
    pub(crate) fn push_node(&mut self, kind: NodeKind, location: SourceLocation) -> NodeRef {
        self.ast.push_node(kind, location)
    }

    pub(crate) fn set_root(&mut self, root: NodeRef) {
        self.ast.set_root(root);
    }
}

/// Parse converted tokens into `ast`, returning the translation unit node.
pub fn parse_translation_unit(tokens: &[Token], ast: &mut Ast) -> Result<NodeRef> {
    Parser::new(tokens, ast).parse_translation_unit()
}

/// Parse converted tokens as a single constant expression.
pub fn parse_constant_expression(tokens: &[Token], ast: &mut Ast) -> Result<NodeRef> {
    Parser::new(tokens, ast).parse_constant_expression_to_end()
}
