//! Macro substitution: invocation, argument capture, `#`, `##` and rescanning.

use std::cell::Cell;

use log::trace;
use symbol_table::GlobalSymbol as Symbol;

use super::macros::{DynamicMacro, Macro, MacroKind, MacroScope};
use super::token_sequence::TokenSequence;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, LexerMode, Punctuator, PunctuatorTrie, StringLiteral, StringValue, Token, TokenFlags, TokenKind};
use crate::source::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Ordinary text lines and `#include`/`#line` operands
    Text,
    /// `#if`/`#elif` conditions: `defined` is an operator and leftover identifiers are `0`
    Condition,
}

pub struct Substitution<'s> {
    scope: &'s dyn MacroScope,
    mode: SubstitutionMode,
    max_depth: usize,
    /// Arguments currently being pre-expanded inside one another
    nesting: Cell<usize>,
}

impl<'s> Substitution<'s> {
    pub fn new(scope: &'s dyn MacroScope, mode: SubstitutionMode, max_depth: usize) -> Self {
        Substitution {
            scope,
            mode,
            max_depth,
            nesting: Cell::new(0),
        }
    }

    /// Fully macro-expand `tokens`.
    pub fn run(&self, tokens: Vec<Token>) -> Result<Vec<Token>> {
        self.expand(TokenSequence::new(tokens))
    }

    fn expand(&self, mut seq: TokenSequence) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(mut token) = seq.next() {
            let TokenKind::Identifier(name) = token.kind else {
                out.push(token);
                continue;
            };

            if self.mode == SubstitutionMode::Condition && name.as_str() == "defined" {
                out.push(self.defined_operator(&mut seq, token.location)?);
                continue;
            }
            if self.mode == SubstitutionMode::Text && name.as_str() == "_Pragma" {
                self.pragma_operator(&mut seq, token.location)?;
                continue;
            }

            if !token.flags.contains(TokenFlags::NO_EXPAND) && seq.is_expanding(name) {
                // blue paint: this identifier never expands again, wherever it ends up
                token.flags |= TokenFlags::NO_EXPAND;
            }
            let definition = match self.scope.lookup(name) {
                Some(definition) if !token.flags.contains(TokenFlags::NO_EXPAND) => definition,
                _ => {
                    out.push(self.unexpanded(token));
                    continue;
                }
            };

            if seq.depth() + self.nesting.get() > self.max_depth {
                return Err(Error::out_of_bounds(
                    token.location,
                    format!("macro expansion of '{}' nested too deeply", name),
                ));
            }

            let replacement = match &definition.kind {
                MacroKind::Dynamic(dynamic) => {
                    out.push(dynamic_replacement(*dynamic, token.location));
                    continue;
                }
                MacroKind::Object => self.replace(definition, &[], &seq, token.location)?,
                MacroKind::Function { .. } => {
                    if !seq.eat_left_paren() {
                        out.push(self.unexpanded(token));
                        continue;
                    }
                    let arguments = self.collect_arguments(&mut seq, definition, token.location)?;
                    self.replace(definition, &arguments, &seq, token.location)?
                }
            };
            trace!("expanded {} into {} tokens", name, replacement.len());
            seq.push_front(replacement, Some(name));
        }
        Ok(out)
    }

    /// An identifier that is not substituted; in conditions it evaluates as `0`.
    fn unexpanded(&self, token: Token) -> Token {
        match self.mode {
            SubstitutionMode::Text => token,
            SubstitutionMode::Condition => Token::pp_number("0", token.location),
        }
    }

    fn defined_operator(&self, seq: &mut TokenSequence, location: SourceLocation) -> Result<Token> {
        let parenthesized = seq.eat_left_paren();
        let operand = next_non_whitespace(seq);
        let Some(name) = operand.as_ref().and_then(Token::as_identifier) else {
            return Err(Error::malformed(location, "operator 'defined' requires an identifier"));
        };
        if parenthesized {
            let close = next_non_whitespace(seq);
            if !close.is_some_and(|t| t.is_punctuator(Punctuator::RightParen)) {
                return Err(Error::malformed(location, "missing ')' after 'defined'"));
            }
        }
        let value = if self.scope.is_defined(name) { "1" } else { "0" };
        Ok(Token::pp_number(value, location))
    }

    /// `_Pragma("...")` is recognized and dropped.
    fn pragma_operator(&self, seq: &mut TokenSequence, location: SourceLocation) -> Result<()> {
        let malformed = || Error::malformed(location, "_Pragma takes a parenthesized string literal");
        if !seq.eat_left_paren() {
            return Err(malformed());
        }
        let literal = next_non_whitespace(seq);
        if !literal.is_some_and(|t| matches!(t.kind, TokenKind::StringLiteral(_))) {
            return Err(malformed());
        }
        let close = next_non_whitespace(seq);
        if !close.is_some_and(|t| t.is_punctuator(Punctuator::RightParen)) {
            return Err(malformed());
        }
        trace!("ignoring _Pragma at {}", location);
        Ok(())
    }

    /// Arguments of a function-like invocation, the opening `(` already consumed.
    fn collect_arguments(
        &self,
        seq: &mut TokenSequence,
        definition: &Macro,
        location: SourceLocation,
    ) -> Result<Vec<Vec<Token>>> {
        let MacroKind::Function { params, variadic } = &definition.kind else {
            return Err(Error::internal("argument capture for an object-like macro"));
        };
        let (param_count, variadic) = (params.len(), *variadic);

        let mut arguments: Vec<Vec<Token>> = vec![Vec::new()];
        let mut depth = 0usize;
        loop {
            let Some(mut token) = seq.next() else {
                return Err(Error::malformed(
                    location,
                    format!("unterminated invocation of macro '{}'", definition.name),
                ));
            };
            match &token.kind {
                TokenKind::Sentinel => {
                    return Err(Error::malformed(
                        location,
                        format!("unterminated invocation of macro '{}'", definition.name),
                    ))
                }
                TokenKind::Punctuator(Punctuator::LeftParen) => depth += 1,
                TokenKind::Punctuator(Punctuator::RightParen) if depth == 0 => break,
                TokenKind::Punctuator(Punctuator::RightParen) => depth -= 1,
                TokenKind::Punctuator(Punctuator::Comma) if depth == 0 => {
                    // the variadic tail keeps its commas
                    if !(variadic && arguments.len() > param_count) {
                        arguments.push(Vec::new());
                        continue;
                    }
                }
                TokenKind::Identifier(name) if seq.is_expanding(*name) => token.flags |= TokenFlags::NO_EXPAND,
                TokenKind::Whitespace { newline: true } => token.kind = TokenKind::Whitespace { newline: false },
                _ => {}
            }
            if let Some(current) = arguments.last_mut() {
                current.push(token);
            }
        }

        for argument in &mut arguments {
            trim_whitespace(argument);
        }

        let required = param_count + usize::from(variadic);
        if param_count == 0 && arguments.len() == 1 && arguments[0].is_empty() {
            arguments.clear();
        }
        if variadic && arguments.len() == param_count {
            arguments.push(Vec::new());
        }
        if arguments.len() != required {
            return Err(Error::out_of_bounds(
                location,
                format!(
                    "macro '{}' requires {} arguments, but {} given",
                    definition.name,
                    required,
                    arguments.len()
                ),
            ));
        }
        Ok(arguments)
    }

    /// Replacement list of `definition` with its parameters substituted.
    fn replace(
        &self,
        definition: &Macro,
        arguments: &[Vec<Token>],
        seq: &TokenSequence,
        location: SourceLocation,
    ) -> Result<Vec<Token>> {
        let body = &definition.replacement;
        let parameter = |token: &Token| token.as_identifier().and_then(|name| definition.parameter_index(name));
        let function_like = definition.is_function_like();
        let next_significant = |from: usize| (from..body.len()).find(|&j| !body[j].is_whitespace());

        let mut expanded: Vec<Option<Vec<Token>>> = vec![None; arguments.len()];
        let mut out: Vec<Token> = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            let token = &body[i];

            if token.is_punctuator(Punctuator::HashHash) {
                while out.last().is_some_and(Token::is_whitespace) {
                    out.pop();
                }
                let (Some(left), Some(j)) = (out.pop(), next_significant(i + 1)) else {
                    return Err(Error::malformed(location, "'##' cannot appear at either end of a macro expansion"));
                };
                let (right, next) = self.paste_operand(body, j, arguments, function_like, &parameter, location)?;
                let mut right = right.into_iter();
                let first = right.next().unwrap_or_else(|| placemarker(location));
                out.push(paste(&left, &first)?);
                out.extend(right);
                i = next;
                continue;
            }

            if function_like && token.is_punctuator(Punctuator::Hash) {
                let Some(index) = next_significant(i + 1).filter(|&j| parameter(&body[j]).is_some()) else {
                    return Err(Error::malformed(token.location, "'#' is not followed by a macro parameter"));
                };
                let argument = parameter(&body[index]).and_then(|p| arguments.get(p));
                out.push(stringify(argument.map(Vec::as_slice).unwrap_or(&[]), location));
                i = index + 1;
                continue;
            }

            if let Some(p) = parameter(token) {
                let argument = arguments.get(p).map(Vec::as_slice).unwrap_or(&[]);
                let pasted_next = next_significant(i + 1).is_some_and(|j| body[j].is_punctuator(Punctuator::HashHash));
                if pasted_next {
                    // operands of ## use the argument as written
                    if argument.is_empty() {
                        out.push(placemarker(location));
                    } else {
                        out.extend(argument.iter().cloned());
                    }
                } else {
                    if expanded[p].is_none() {
                        expanded[p] = Some(self.expand_argument(argument, seq, definition.name, location)?);
                    }
                    out.extend(expanded[p].iter().flatten().cloned());
                }
                i += 1;
                continue;
            }

            let mut copy = token.clone();
            copy.location = location;
            copy.flags |= TokenFlags::MACRO_EXPANDED;
            out.push(copy);
            i += 1;
        }

        out.retain(|t| !matches!(t.kind, TokenKind::Placemarker));
        Ok(out)
    }

    /// Fully expand one argument before it replaces its parameter. Each level of
    /// `f(f(...))` nests one more expansion.
    fn expand_argument(
        &self,
        argument: &[Token],
        seq: &TokenSequence,
        name: Symbol,
        location: SourceLocation,
    ) -> Result<Vec<Token>> {
        let level = self.nesting.get() + 1;
        if level + seq.depth() > self.max_depth {
            return Err(Error::out_of_bounds(
                location,
                format!("arguments of macro '{}' nested too deeply", name),
            ));
        }
        self.nesting.set(level);
        let result = self.expand(TokenSequence::with_inherited(argument.to_vec(), seq.expanding()));
        self.nesting.set(level - 1);
        result
    }

    /// Right operand of `##` at `body[j]`: its tokens and the index after it.
    fn paste_operand(
        &self,
        body: &[Token],
        j: usize,
        arguments: &[Vec<Token>],
        function_like: bool,
        parameter: &dyn Fn(&Token) -> Option<usize>,
        location: SourceLocation,
    ) -> Result<(Vec<Token>, usize)> {
        let token = &body[j];
        if let Some(p) = parameter(token) {
            let argument = arguments.get(p).cloned().unwrap_or_default();
            return Ok((argument, j + 1));
        }
        if function_like && token.is_punctuator(Punctuator::Hash) {
            let target = (j + 1..body.len()).find(|&k| !body[k].is_whitespace());
            if let Some(k) = target {
                if let Some(p) = parameter(&body[k]) {
                    let argument = arguments.get(p).map(Vec::as_slice).unwrap_or(&[]);
                    return Ok((vec![stringify(argument, location)], k + 1));
                }
            }
            return Err(Error::malformed(token.location, "'#' is not followed by a macro parameter"));
        }
        let mut copy = token.clone();
        copy.location = location;
        Ok((vec![copy], j + 1))
    }
}

fn next_non_whitespace(seq: &mut TokenSequence) -> Option<Token> {
    std::iter::from_fn(|| seq.next()).find(|t| !t.is_whitespace())
}

fn trim_whitespace(tokens: &mut Vec<Token>) {
    while tokens.last().is_some_and(Token::is_whitespace) {
        tokens.pop();
    }
    let leading = tokens.iter().take_while(|t| t.is_whitespace()).count();
    tokens.drain(..leading);
}

fn placemarker(location: SourceLocation) -> Token {
    Token::new(TokenKind::Placemarker, location)
}

fn dynamic_replacement(kind: DynamicMacro, location: SourceLocation) -> Token {
    let mut token = match kind {
        DynamicMacro::File => string_token(location.file.as_str(), location),
        DynamicMacro::Line => Token::pp_number(&location.line.to_string(), location),
    };
    token.flags |= TokenFlags::MACRO_EXPANDED;
    token
}

/// Narrow string literal token holding `text`.
fn string_token(text: &str, location: SourceLocation) -> Token {
    let mut spelling = String::with_capacity(text.len() + 2);
    spelling.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            spelling.push('\\');
        }
        spelling.push(c);
    }
    spelling.push('"');
    let literal = StringLiteral {
        spelling: Symbol::new(&spelling),
        value: StringValue::Multibyte(text.as_bytes().to_vec()),
    };
    Token::new(TokenKind::StringLiteral(literal), location)
}

/// The `#` operator: spell the argument as written, whitespace runs reduced to one blank.
pub fn stringify(tokens: &[Token], location: SourceLocation) -> Token {
    let mut text = String::new();
    for token in tokens {
        if token.is_whitespace() {
            if !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
            continue;
        }
        text.push_str(&token.spelling());
    }
    let text = text.trim_end();
    let mut token = string_token(text, location);
    token.flags |= TokenFlags::MACRO_EXPANDED;
    token
}

/// The `##` operator.
pub fn paste(left: &Token, right: &Token) -> Result<Token> {
    match (&left.kind, &right.kind) {
        (TokenKind::Placemarker, _) => return Ok(right.clone()),
        (_, TokenKind::Placemarker) => return Ok(left.clone()),
        _ => {}
    }
    let text = format!("{}{}", left.spelling(), right.spelling());
    let invalid = || {
        Error::malformed(
            left.location,
            format!(
                "pasting \"{}\" and \"{}\" does not give a valid preprocessing token",
                left.spelling(),
                right.spelling()
            ),
        )
    };

    let mut token = if let (TokenKind::Punctuator(_), TokenKind::Punctuator(_)) = (&left.kind, &right.kind) {
        let matched = PunctuatorTrie::get().whole_match(&text).ok_or_else(invalid)?;
        let mut token = Token::punctuator(matched.punctuator, left.location);
        if matched.digraph {
            token.flags |= TokenFlags::DIGRAPH;
        }
        token
    } else {
        let mut tokens = Lexer::new(&text, left.location.file, LexerMode::Preprocessor)
            .tokenize()
            .map_err(|_| invalid())?;
        tokens.retain(|t| !t.is_sentinel());
        if tokens.len() != 1 || tokens[0].is_whitespace() {
            return Err(invalid());
        }
        let mut token = tokens.remove(0);
        token.location = left.location;
        token
    };
    token.flags |= TokenFlags::MACRO_EXPANDED;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pp::macros::{lex_replacement, MacroTable};

    fn expand(definitions: &[Macro], text: &str) -> Result<String> {
        let mut table = MacroTable::new();
        for definition in definitions {
            table.define(definition.clone());
        }
        let tokens = Lexer::new(text, Symbol::new("<test>"), LexerMode::Preprocessor).tokenize()?;
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_sentinel()).collect();
        let out = Substitution::new(&table, SubstitutionMode::Text, 512).run(tokens)?;
        Ok(out
            .iter()
            .filter(|t| !t.is_whitespace())
            .map(Token::spelling)
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn object(name: &str, body: &str) -> Macro {
        Macro::object(Symbol::new(name), lex_replacement(body).unwrap(), SourceLocation::builtin())
    }

    fn function(name: &str, params: &[&str], variadic: bool, body: &str) -> Macro {
        Macro::function(
            Symbol::new(name),
            params.iter().map(|p| Symbol::new(p)).collect(),
            variadic,
            lex_replacement(body).unwrap(),
            SourceLocation::builtin(),
        )
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let defs = [object("A", "B"), object("B", "A")];
        assert_eq!(expand(&defs, "A B").unwrap(), "A B");
    }

    #[test]
    fn test_function_macro_without_parens_is_kept() {
        let defs = [function("f", &["x"], false, "[x]")];
        assert_eq!(expand(&defs, "f + f(1)").unwrap(), "f + [ 1 ]");
    }

    #[test]
    fn test_nested_parentheses_do_not_split_arguments() {
        let defs = [function("FIRST", &["a", "b"], false, "a")];
        assert_eq!(expand(&defs, "FIRST((1, 2), 3)").unwrap(), "( 1 , 2 )");
    }

    #[test]
    fn test_argument_count_mismatch() {
        let defs = [function("F", &["a", "b"], false, "a b")];
        let err = expand(&defs, "F(1)").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::OutOfBounds);
        // a single parameter accepts an empty invocation
        let defs = [function("G", &["a"], false, "<a>")];
        assert_eq!(expand(&defs, "G()").unwrap(), "< >");
    }

    #[test]
    fn test_variadic_arguments() {
        let defs = [
            function("CALL", &["f"], true, "f(__VA_ARGS__)"),
            function("SHOW", &[], true, "#__VA_ARGS__"),
        ];
        assert_eq!(expand(&defs, "CALL(g, 1, 2)").unwrap(), "g ( 1 , 2 )");
        assert_eq!(expand(&defs, "CALL(g)").unwrap(), "g ( )");
        assert_eq!(expand(&defs, "SHOW(a,  b)").unwrap(), "\"a, b\"");
    }

    #[test]
    fn test_paste_uses_unexpanded_arguments() {
        let defs = [
            object("ONE", "1"),
            function("CAT", &["a", "b"], false, "a##b"),
            function("XCAT", &["a", "b"], false, "CAT(a, b)"),
        ];
        assert_eq!(expand(&defs, "CAT(ONE, 2)").unwrap(), "ONE2");
        assert_eq!(expand(&defs, "XCAT(ONE, 2)").unwrap(), "12");
        assert_eq!(expand(&defs, "CAT(x y, z w)").unwrap(), "x yz w");
    }

    #[test]
    fn test_invalid_punctuator_paste() {
        let defs = [function("CAT", &["a", "b"], false, "a##b")];
        assert_eq!(expand(&defs, "CAT(-, >)").unwrap(), "->");
        let err = expand(&defs, "CAT(+, -)").unwrap_err();
        assert!(err.message.contains("does not give a valid preprocessing token"));
    }

    #[test]
    fn test_nested_arguments_hit_the_depth_limit() {
        let mut table = MacroTable::new();
        table.define(function("f", &["x"], false, "x"));
        let source = format!("{}1{}", "f(".repeat(2000), ")".repeat(2000));
        let tokens = Lexer::new(&source, Symbol::new("<test>"), LexerMode::Preprocessor)
            .tokenize()
            .unwrap();
        let err = Substitution::new(&table, SubstitutionMode::Text, 32).run(tokens).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::OutOfBounds);
        insta::assert_snapshot!(err.message, @"arguments of macro 'f' nested too deeply");

        let defs = [function("f", &["x"], false, "x")];
        let source = format!("{}1{}", "f(".repeat(20), ")".repeat(20));
        assert_eq!(expand(&defs, &source).unwrap(), "1");
    }

    #[test]
    fn test_stringify_escapes_quotes() {
        let defs = [function("STR", &["x"], false, "#x")];
        assert_eq!(expand(&defs, r#"STR("a\n")"#).unwrap(), r#""\"a\\n\"""#);
    }

    #[test]
    fn test_defined_operator_in_conditions() {
        let mut table = MacroTable::new();
        table.define(object("X", "2"));
        let tokens = Lexer::new("defined(X) + defined Y + X + Z", Symbol::new("<test>"), LexerMode::Preprocessor)
            .tokenize()
            .unwrap();
        let out = Substitution::new(&table, SubstitutionMode::Condition, 512)
            .run(tokens)
            .unwrap();
        let text: Vec<String> = out
            .iter()
            .filter(|t| !t.is_whitespace() && !t.is_sentinel())
            .map(Token::spelling)
            .collect();
        assert_eq!(text.join(" "), "1 + 0 + 2 + 0");
    }
}
