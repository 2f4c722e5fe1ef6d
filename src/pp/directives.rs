//! Splits a source file into directive lines and text lines.

use log::trace;
use symbol_table::GlobalSymbol as Symbol;

use super::macros::{normalize_replacement, Macro};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, LexerMode, Punctuator, SourceCursor, Token, TokenKind};
use crate::source::SourceLocation;

/// Preprocessor directive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Define,
    Undef,
    Include,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Line,
    Pragma,
    Error,
    Warning,
}

impl DirectiveKind {
    pub fn lookup(name: &str) -> Option<DirectiveKind> {
        let kind = match name {
            "define" => DirectiveKind::Define,
            "undef" => DirectiveKind::Undef,
            "include" => DirectiveKind::Include,
            "if" => DirectiveKind::If,
            "ifdef" => DirectiveKind::Ifdef,
            "ifndef" => DirectiveKind::Ifndef,
            "elif" => DirectiveKind::Elif,
            "else" => DirectiveKind::Else,
            "endif" => DirectiveKind::Endif,
            "line" => DirectiveKind::Line,
            "pragma" => DirectiveKind::Pragma,
            "error" => DirectiveKind::Error,
            "warning" => DirectiveKind::Warning,
            _ => return None,
        };
        Some(kind)
    }

    fn opens_conditional(self) -> bool {
        matches!(self, DirectiveKind::If | DirectiveKind::Ifdef | DirectiveKind::Ifndef)
    }
}

/// A classified directive with its raw token tail.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    If { condition: Vec<Token> },
    Ifdef { name: Symbol, negated: bool },
    Elif { condition: Vec<Token> },
    Else,
    Endif,
    Include { tokens: Vec<Token> },
    Define(Macro),
    Undef { name: Symbol },
    Line { tokens: Vec<Token> },
    Error { tokens: Vec<Token> },
    Warning { tokens: Vec<Token> },
    Pragma { tokens: Vec<Token> },
    /// A lone `#`
    Empty,
    /// `#` followed by something that names no directive
    NonDirective { name: String },
}

impl Directive {
    /// Ends the group it appears in.
    pub fn is_group_terminator(&self) -> bool {
        matches!(self, Directive::Elif { .. } | Directive::Else | Directive::Endif)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveLine {
    pub directive: Directive,
    /// Location of the introducing `#`
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Directive(DirectiveLine),
    /// Tokens of one text line, trailing newline included
    Text(Vec<Token>),
    End,
}

/// Line-oriented scanner over one source file.
pub struct DirectiveScanner {
    lexer: Lexer,
}

impl DirectiveScanner {
    pub fn new(source: &str, file: Symbol) -> Self {
        DirectiveScanner {
            lexer: Lexer::new(source, file, LexerMode::Preprocessor),
        }
    }

    pub fn cursor(&self) -> &SourceCursor {
        self.lexer.cursor()
    }

    pub fn cursor_mut(&mut self) -> &mut SourceCursor {
        self.lexer.cursor_mut()
    }

    /// Classify and consume the next line.
    pub fn next_line(&mut self) -> Result<Line> {
        self.lexer.skip_blanks()?;
        let first = self.lexer.next_token()?;
        if first.is_sentinel() {
            return Ok(Line::End);
        }
        if first.is_punctuator(Punctuator::Hash) {
            let directive = self.directive(first.location)?;
            trace!("directive {:?} at {}", directive, first.location);
            return Ok(Line::Directive(DirectiveLine {
                directive,
                location: first.location,
            }));
        }

        let mut tokens = vec![first];
        while !tokens.last().is_some_and(Token::is_newline) {
            let token = self.lexer.next_token()?;
            if token.is_sentinel() {
                break;
            }
            tokens.push(token);
        }
        Ok(Line::Text(tokens))
    }

    /// Skip a group whose condition failed, up to the `#elif`, `#else` or `#endif`
    /// that closes it. Nested conditionals are skipped whole; `None` means end of file.
    pub fn skip_group(&mut self) -> Result<Option<DirectiveLine>> {
        let mut depth = 0usize;
        loop {
            if self.lexer.skip_blanks().is_err() {
                self.lexer.skip_line();
                continue;
            }
            let first = match self.lexer.next_token() {
                Ok(token) => token,
                Err(_) => {
                    self.lexer.skip_line();
                    continue;
                }
            };
            if first.is_sentinel() {
                return Ok(None);
            }
            if first.is_newline() {
                continue;
            }
            if !first.is_punctuator(Punctuator::Hash) {
                self.lexer.skip_line();
                continue;
            }

            let (kind, name) = match self.directive_name() {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(_) => {
                    self.lexer.skip_line();
                    continue;
                }
            };
            let kind = match kind {
                Some(kind) if kind.opens_conditional() => {
                    depth += 1;
                    self.lexer.skip_line();
                    continue;
                }
                Some(DirectiveKind::Endif) if depth > 0 => {
                    depth -= 1;
                    self.lexer.skip_line();
                    continue;
                }
                Some(kind @ (DirectiveKind::Elif | DirectiveKind::Else | DirectiveKind::Endif)) if depth == 0 => kind,
                _ => {
                    trace!("skipping #{} at {}", name, first.location);
                    self.lexer.skip_line();
                    continue;
                }
            };
            let directive = self.parse_directive(kind, first.location)?;
            return Ok(Some(DirectiveLine {
                directive,
                location: first.location,
            }));
        }
    }

    /// Name after `#`. `None` for an empty directive, whose newline is then consumed.
    fn directive_name(&mut self) -> Result<Option<(Option<DirectiveKind>, String)>> {
        self.lexer.skip_blanks()?;
        let token = self.lexer.next_token()?;
        if token.is_newline() || token.is_sentinel() {
            return Ok(None);
        }
        let name = token.spelling();
        let kind = match token.kind {
            TokenKind::Identifier(symbol) => DirectiveKind::lookup(symbol.as_str()),
            _ => None,
        };
        Ok(Some((kind, name)))
    }

    fn directive(&mut self, location: SourceLocation) -> Result<Directive> {
        let Some((kind, name)) = self.directive_name()? else {
            return Ok(Directive::Empty);
        };
        match kind {
            Some(kind) => self.parse_directive(kind, location),
            None => {
                self.read_tail()?;
                Ok(Directive::NonDirective { name })
            }
        }
    }

    fn parse_directive(&mut self, kind: DirectiveKind, location: SourceLocation) -> Result<Directive> {
        self.lexer.set_header_names(kind == DirectiveKind::Include);
        let raw = self.read_tail();
        self.lexer.set_header_names(false);
        let raw = raw?;

        let directive = match kind {
            DirectiveKind::Define => Directive::Define(parse_define(&raw, location)?),
            DirectiveKind::Undef => Directive::Undef {
                name: macro_name(&raw, "#undef", location)?,
            },
            DirectiveKind::Ifdef | DirectiveKind::Ifndef => Directive::Ifdef {
                name: macro_name(&raw, if kind == DirectiveKind::Ifdef { "#ifdef" } else { "#ifndef" }, location)?,
                negated: kind == DirectiveKind::Ifndef,
            },
            DirectiveKind::If | DirectiveKind::Elif => {
                let condition = trimmed(raw);
                if condition.is_empty() {
                    return Err(Error::malformed(location, "#if with no expression"));
                }
                if kind == DirectiveKind::If {
                    Directive::If { condition }
                } else {
                    Directive::Elif { condition }
                }
            }
            DirectiveKind::Else => Directive::Else,
            DirectiveKind::Endif => Directive::Endif,
            DirectiveKind::Include => Directive::Include { tokens: trimmed(raw) },
            DirectiveKind::Line => Directive::Line { tokens: trimmed(raw) },
            DirectiveKind::Error => Directive::Error { tokens: trimmed(raw) },
            DirectiveKind::Warning => Directive::Warning { tokens: trimmed(raw) },
            DirectiveKind::Pragma => Directive::Pragma { tokens: trimmed(raw) },
        };
        Ok(directive)
    }

    /// Remaining tokens of the line, newline consumed but not returned.
    fn read_tail(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.lexer.next_token()?;
            if token.is_newline() || token.is_sentinel() {
                return Ok(tokens);
            }
            tokens.push(token);
        }
    }
}

fn trimmed(mut tokens: Vec<Token>) -> Vec<Token> {
    while tokens.last().is_some_and(Token::is_whitespace) {
        tokens.pop();
    }
    let leading = tokens.iter().take_while(|t| t.is_whitespace()).count();
    tokens.drain(..leading);
    tokens
}

fn macro_name(tokens: &[Token], directive: &str, location: SourceLocation) -> Result<Symbol> {
    tokens
        .iter()
        .find(|t| !t.is_whitespace())
        .and_then(Token::as_identifier)
        .ok_or_else(|| Error::malformed(location, format!("macro name missing or not an identifier in {}", directive)))
}

/// Parse the tail of a `#define` line.
pub fn parse_define(tokens: &[Token], location: SourceLocation) -> Result<Macro> {
    let mut iter = tokens.iter().skip_while(|t| t.is_whitespace()).peekable();
    let name = iter
        .next()
        .and_then(Token::as_identifier)
        .ok_or_else(|| Error::malformed(location, "macro name must be an identifier"))?;
    if name.as_str() == "defined" {
        return Err(Error::malformed(location, "'defined' cannot be used as a macro name"));
    }

    // function-like only when `(` follows the name with no space
    let function_like = iter.peek().is_some_and(|t| t.is_punctuator(Punctuator::LeftParen));
    let mut params: Vec<Symbol> = Vec::new();
    let mut variadic = false;
    if function_like {
        iter.next();
        let mut expect_param = true;
        loop {
            let Some(token) = iter.next() else {
                return Err(Error::malformed(location, "missing ')' in macro parameter list"));
            };
            match &token.kind {
                TokenKind::Whitespace { .. } => {}
                TokenKind::Punctuator(Punctuator::RightParen) if !expect_param || params.is_empty() => break,
                TokenKind::Punctuator(Punctuator::Ellipsis) if expect_param && !variadic => {
                    variadic = true;
                    expect_param = false;
                }
                TokenKind::Identifier(param) if expect_param && !variadic => {
                    if param.as_str() == "__VA_ARGS__" {
                        return Err(Error::malformed(token.location, "__VA_ARGS__ cannot be a macro parameter"));
                    }
                    if params.contains(param) {
                        return Err(Error::malformed(
                            token.location,
                            format!("duplicate macro parameter '{}'", param),
                        ));
                    }
                    params.push(*param);
                    expect_param = false;
                }
                TokenKind::Punctuator(Punctuator::Comma) if !expect_param && !variadic => expect_param = true,
                _ => {
                    return Err(Error::malformed(
                        token.location,
                        format!("invalid token '{}' in macro parameter list", token.spelling()),
                    ))
                }
            }
        }
    }

    let replacement = normalize_replacement(iter.cloned().collect());
    validate_replacement(&replacement, function_like, &params, variadic, location)?;

    Ok(if function_like {
        Macro::function(name, params, variadic, replacement, location)
    } else {
        Macro::object(name, replacement, location)
    })
}

fn validate_replacement(
    replacement: &[Token],
    function_like: bool,
    params: &[Symbol],
    variadic: bool,
    location: SourceLocation,
) -> Result<()> {
    let is_paste = |t: Option<&Token>| t.is_some_and(|t| t.is_punctuator(Punctuator::HashHash));
    if is_paste(replacement.first()) || is_paste(replacement.last()) {
        return Err(Error::malformed(
            location,
            "'##' cannot appear at either end of a macro expansion",
        ));
    }

    let significant: Vec<&Token> = replacement.iter().filter(|t| !t.is_whitespace()).collect();
    for (i, token) in significant.iter().enumerate() {
        if let Some(name) = token.as_identifier() {
            if name.as_str() == "__VA_ARGS__" && !variadic {
                return Err(Error::malformed(
                    token.location,
                    "__VA_ARGS__ can only appear in the expansion of a variadic macro",
                ));
            }
        }
        if function_like && token.is_punctuator(Punctuator::Hash) {
            let operand = significant.get(i + 1).and_then(|t| t.as_identifier());
            let is_param = operand.is_some_and(|name| {
                params.contains(&name) || (variadic && name.as_str() == "__VA_ARGS__")
            });
            if !is_param {
                return Err(Error::malformed(token.location, "'#' is not followed by a macro parameter"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pp::macros::MacroKind;

    fn lines(source: &str) -> Vec<Line> {
        let mut scanner = DirectiveScanner::new(source, Symbol::new("t.c"));
        let mut out = Vec::new();
        loop {
            let line = scanner.next_line().unwrap();
            if line == Line::End {
                return out;
            }
            out.push(line);
        }
    }

    fn define(source: &str) -> Result<Macro> {
        let tokens = Lexer::new(source, Symbol::new("t.c"), LexerMode::Preprocessor).tokenize()?;
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_sentinel()).collect();
        parse_define(&tokens, SourceLocation::builtin())
    }

    #[test]
    fn test_classify_lines() {
        let found = lines("#define X 1\nint x;\n  #  \n#pragma once\n# 12 \"x\"\n");
        assert_eq!(found.len(), 5);
        assert!(matches!(&found[0], Line::Directive(d) if matches!(d.directive, Directive::Define(_))));
        assert!(matches!(&found[1], Line::Text(tokens) if tokens.last().is_some_and(Token::is_newline)));
        assert!(matches!(&found[2], Line::Directive(d) if d.directive == Directive::Empty));
        assert!(matches!(&found[3], Line::Directive(d) if matches!(d.directive, Directive::Pragma { .. })));
        assert!(matches!(&found[4], Line::Directive(d) if matches!(d.directive, Directive::NonDirective { .. })));
    }

    #[test]
    fn test_include_reads_header_names() {
        let found = lines("#include <stdio.h>\n#include \"local.h\"\n");
        let Line::Directive(DirectiveLine {
            directive: Directive::Include { tokens },
            ..
        }) = &found[0]
        else {
            panic!("expected #include, got {:?}", found[0]);
        };
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].spelling(), "<stdio.h>");
        assert!(matches!(&found[1], Line::Directive(d) if matches!(&d.directive, Directive::Include { tokens } if tokens[0].spelling() == "\"local.h\"")));
    }

    #[test]
    fn test_skip_group_tracks_nesting() {
        let source = "a\n#if 1\n#endif\n#ifdef Y\n#else\n#endif\n'unterminated\n#elif 2\nz\n";
        let mut scanner = DirectiveScanner::new(source, Symbol::new("t.c"));
        let found = scanner.skip_group().unwrap().unwrap();
        assert!(matches!(found.directive, Directive::Elif { .. }));
        assert_eq!(found.location.line, 8);
        assert!(matches!(scanner.next_line().unwrap(), Line::Text(_)));
        assert!(scanner.skip_group().unwrap().is_none());
    }

    #[test]
    fn test_define_forms() {
        let object = define("PAREN (x)").unwrap();
        assert_eq!(object.kind, MacroKind::Object);
        assert_eq!(object.replacement_text(), "(x)");

        let function = define("F(a, b, ...) a + b __VA_ARGS__").unwrap();
        assert_eq!(function.to_string(), "#define F(a, b, ...) a + b __VA_ARGS__");

        let empty = define("NONE()").unwrap();
        assert!(empty.is_function_like());
        assert!(empty.replacement.is_empty());
    }

    #[test]
    fn test_define_errors() {
        for source in [
            "F(a, a) a",
            "F(a,) a",
            "F(a) #b",
            "X ## y",
            "X y ##",
            "defined 1",
            "1 x",
            "G(x) __VA_ARGS__",
        ] {
            let err = define(source).unwrap_err();
            assert_eq!(err.kind, crate::error::ErrorKind::MalformedInput, "{}", source);
        }
        // `#` in an object-like macro is an ordinary token
        assert_eq!(define("H # x").unwrap().replacement_text(), "# x");
    }
}
