use itertools::Itertools;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use super::directives::{parse_define, Directive, DirectiveLine, DirectiveScanner, Line};
use super::header_search::SourceLocator;
use super::macros::{Macro, MacroScope, MacroTable, Overlay};
use super::substitution::{Substitution, SubstitutionMode};
use crate::ast::Ast;
use crate::diagnostic::DiagnosticEngine;
use crate::error::{Error, Result, ResultExt};
use crate::lang_options::Environment;
use crate::lexer::{convert_preprocessed, Lexer, LexerMode, Punctuator, StringEncoding, Token, TokenKind};
use crate::parser::parse_constant_expression;
use crate::semantic::const_eval::{self, PreprocessorContext};
use crate::source::SourceLocation;

/// Configuration for preprocessor
#[derive(Debug, Clone)]
pub struct PreprocessorConfig {
    pub max_include_depth: usize,
    /// Nesting limit for macro rescanning and argument pre-expansion
    pub max_expansion_depth: usize,
    /// Nesting limit for `#if`/`#ifdef`/`#ifndef` groups, included files counted
    pub max_conditional_depth: usize,
    /// Command-line style definitions: `("NAME", "body")` or `("F(x)", "body")`
    pub defines: Vec<(String, String)>,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        PreprocessorConfig {
            max_include_depth: 200,
            max_expansion_depth: 512,
            max_conditional_depth: 256,
            defines: Vec::new(),
        }
    }
}

/// State of one `#if` chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionalState {
    /// A branch has been taken; later branches are skipped
    Success,
    /// No branch taken yet
    Fail,
}

/// Main preprocessor structure
pub struct Preprocessor<'src> {
    locator: &'src dyn SourceLocator,
    diag: &'src mut DiagnosticEngine,
    config: PreprocessorConfig,
    predefined: MacroTable,
    user: MacroTable,
    include_depth: usize,
    conditional_depth: usize,
}

impl<'src> Preprocessor<'src> {
    /// Create a new preprocessor
    pub fn new(
        locator: &'src dyn SourceLocator,
        diag: &'src mut DiagnosticEngine,
        environment: &Environment,
        config: PreprocessorConfig,
    ) -> Result<Self> {
        let mut preprocessor = Preprocessor {
            locator,
            diag,
            predefined: MacroTable::predefined(environment)?,
            user: MacroTable::new(),
            config,
            include_depth: 0,
            conditional_depth: 0,
        };
        for (name, body) in preprocessor.config.defines.clone() {
            let text = format!("{} {}", name, body);
            let tokens = Lexer::new(&text, Symbol::new("<command line>"), LexerMode::Preprocessor).tokenize()?;
            let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_sentinel()).collect();
            let definition = parse_define(&tokens, SourceLocation::builtin())?;
            preprocessor.define_macro(definition);
        }
        Ok(preprocessor)
    }

    /// Preprocess a main source file into a flat token list ending in a sentinel.
    pub fn process(&mut self, source: &str, file: Symbol) -> Result<Vec<Token>> {
        debug!("preprocessing {}", file);
        let (mut tokens, end) = self.process_file(source, file)?;
        tokens.push(Token::sentinel(end));
        Ok(tokens)
    }

    pub fn user_macros(&self) -> &MacroTable {
        &self.user
    }

    pub fn predefined_macros(&self) -> &MacroTable {
        &self.predefined
    }

    pub fn is_macro_defined(&self, name: Symbol) -> bool {
        self.scope().is_defined(name)
    }

    fn scope(&self) -> Overlay<'_> {
        Overlay {
            inner: &self.user,
            outer: &self.predefined,
        }
    }

    /// Tokens of one file, without sentinel, and the location of its end.
    fn process_file(&mut self, source: &str, file: Symbol) -> Result<(Vec<Token>, SourceLocation)> {
        let mut scanner = DirectiveScanner::new(source, file);
        let mut out = Vec::new();
        if let Some(stray) = self.run_group(&mut scanner, &mut out)? {
            let name = match stray.directive {
                Directive::Elif { .. } => "#elif",
                Directive::Else => "#else",
                _ => "#endif",
            };
            return Err(Error::malformed(stray.location, format!("{} without #if", name)));
        }
        Ok((out, scanner.cursor().location()))
    }

    /// Process lines until end of file or a directive that ends the group,
    /// which is returned to the enclosing conditional.
    fn run_group(&mut self, scanner: &mut DirectiveScanner, out: &mut Vec<Token>) -> Result<Option<DirectiveLine>> {
        let mut text: Vec<Token> = Vec::new();
        loop {
            match scanner.next_line()? {
                Line::Text(tokens) => text.extend(tokens),
                Line::End => {
                    self.flush_text(&mut text, out)?;
                    return Ok(None);
                }
                Line::Directive(line) => {
                    self.flush_text(&mut text, out)?;
                    if line.directive.is_group_terminator() {
                        return Ok(Some(line));
                    }
                    self.run_directive(scanner, line, out)?;
                }
            }
        }
    }

    /// Substitute the pending text lines and append them to the output.
    fn flush_text(&mut self, text: &mut Vec<Token>, out: &mut Vec<Token>) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let scope = self.scope();
        let substitution = Substitution::new(&scope, SubstitutionMode::Text, self.config.max_expansion_depth);
        let expanded = substitution.run(std::mem::take(text))?;
        out.extend(expanded.into_iter().filter(|t| !t.is_whitespace()));
        Ok(())
    }

    fn run_directive(&mut self, scanner: &mut DirectiveScanner, line: DirectiveLine, out: &mut Vec<Token>) -> Result<()> {
        let location = line.location;
        match line.directive {
            Directive::If { condition } => {
                let taken = self.evaluate_condition(condition, location)?;
                self.run_conditional(scanner, taken, location, out)
            }
            Directive::Ifdef { name, negated } => {
                let taken = self.is_macro_defined(name) != negated;
                self.run_conditional(scanner, taken, location, out)
            }
            Directive::Include { tokens } => self.handle_include(scanner, tokens, location, out),
            Directive::Define(definition) => {
                self.define_macro(definition);
                Ok(())
            }
            Directive::Undef { name } => self.handle_undef(name, location),
            Directive::Line { tokens } => self.handle_line(scanner, tokens, location),
            Directive::Error { tokens } => Err(Error::malformed(location, format!("#error {}", render(&tokens)))),
            Directive::Warning { tokens } => {
                self.diag.report_warning(format!("#warning {}", render(&tokens)), Some(location));
                Ok(())
            }
            Directive::Pragma { tokens } => {
                debug!("ignoring #pragma {} at {}", render(&tokens), location);
                Ok(())
            }
            Directive::Empty => Ok(()),
            Directive::NonDirective { name } => Err(Error::malformed(
                location,
                format!("invalid preprocessing directive '#{}'", name),
            )),
            Directive::Elif { .. } | Directive::Else | Directive::Endif => {
                Err(Error::internal("group terminator reached directive dispatch"))
            }
        }
    }

    /// Run an `#if`/`#ifdef`/`#ifndef` chain through its `#endif`.
    fn run_conditional(
        &mut self,
        scanner: &mut DirectiveScanner,
        taken: bool,
        location: SourceLocation,
        out: &mut Vec<Token>,
    ) -> Result<()> {
        if self.conditional_depth >= self.config.max_conditional_depth {
            return Err(Error::out_of_bounds(location, "conditional directives nested too deeply"));
        }
        self.conditional_depth += 1;
        let result = self.run_conditional_chain(scanner, taken, location, out);
        self.conditional_depth -= 1;
        result
    }

    fn run_conditional_chain(
        &mut self,
        scanner: &mut DirectiveScanner,
        taken: bool,
        location: SourceLocation,
        out: &mut Vec<Token>,
    ) -> Result<()> {
        let mut state = if taken {
            ConditionalState::Success
        } else {
            ConditionalState::Fail
        };
        debug!("conditional at {}: {:?}", location, state);
        let mut terminator = if taken {
            self.run_group(scanner, out)?
        } else {
            scanner.skip_group()?
        };
        let mut seen_else = false;

        loop {
            let Some(line) = terminator else {
                return Err(Error::malformed(location, "unterminated conditional directive"));
            };
            terminator = match line.directive {
                Directive::Endif => return Ok(()),
                Directive::Else => {
                    if seen_else {
                        return Err(Error::malformed(line.location, "#else after #else"));
                    }
                    seen_else = true;
                    if state == ConditionalState::Fail {
                        state = ConditionalState::Success;
                        self.run_group(scanner, out)?
                    } else {
                        scanner.skip_group()?
                    }
                }
                Directive::Elif { condition } => {
                    if seen_else {
                        return Err(Error::malformed(line.location, "#elif after #else"));
                    }
                    // a taken branch skips every later #elif without evaluating it
                    if state == ConditionalState::Fail && self.evaluate_condition(condition, line.location)? {
                        state = ConditionalState::Success;
                        self.run_group(scanner, out)?
                    } else {
                        scanner.skip_group()?
                    }
                }
                _ => return Err(Error::internal("conditional ended by a non-terminator")),
            };
            debug!("conditional at {} continues: {:?}", location, state);
        }
    }

    /// Substitute, parse and evaluate an `#if` condition.
    pub fn evaluate_condition(&self, tokens: Vec<Token>, location: SourceLocation) -> Result<bool> {
        let scope = self.scope();
        let substitution = Substitution::new(&scope, SubstitutionMode::Condition, self.config.max_expansion_depth);
        let expanded = substitution.run(tokens)?;
        let converted = convert_preprocessed(expanded)?;
        if converted.iter().all(Token::is_sentinel) {
            return Err(Error::malformed(location, "#if with no expression"));
        }

        let mut ast = Ast::new();
        let expr = parse_constant_expression(&converted, &mut ast)
            .or_else_no_match(|_| Error::malformed(location, "invalid expression in preprocessor condition"))?;
        let value = const_eval::evaluate(&ast, expr, &mut PreprocessorContext)?;
        debug!("condition at {} evaluated to {:?}", location, value);
        Ok(value.is_truthy())
    }

    fn define_macro(&mut self, definition: Macro) {
        let name = definition.name;
        if self.predefined.contains(name) {
            self.diag
                .report_warning(format!("redefining builtin macro '{}'", name), Some(definition.location));
        } else if let Some(previous) = self.user.lookup(name) {
            if !previous.is_identical(&definition) {
                self.diag
                    .report_warning(format!("'{}' macro redefined", name), Some(definition.location));
                self.diag.report_note("previous definition is here", Some(previous.location));
            }
        }
        self.user.define(definition);
    }

    fn handle_undef(&mut self, name: Symbol, location: SourceLocation) -> Result<()> {
        if self.user.undefine(name).is_none() && self.predefined.contains(name) {
            return Err(Error::malformed(
                location,
                format!("cannot undefine builtin macro '{}'", name),
            ));
        }
        Ok(())
    }

    fn handle_include(
        &mut self,
        scanner: &DirectiveScanner,
        tokens: Vec<Token>,
        location: SourceLocation,
        out: &mut Vec<Token>,
    ) -> Result<()> {
        if self.include_depth >= self.config.max_include_depth {
            return Err(Error::out_of_bounds(location, "#include nested too deeply"));
        }
        let (name, system) = self.include_target(tokens, location)?;

        let file = self
            .locator
            .open(&name, system, Some(scanner.cursor().file()))
            .map_err(|mut e| {
                e.location.get_or_insert(location);
                e
            })?;
        debug!("including '{}' at {}", file.path, location);

        self.include_depth += 1;
        let result = self.process_file(&file.text, file.path);
        self.include_depth -= 1;
        let (tokens, _) = result?;
        out.extend(tokens);
        Ok(())
    }

    /// Header name of an `#include`, macro-expanding the operand when it is not
    /// already a header name.
    fn include_target(&self, tokens: Vec<Token>, location: SourceLocation) -> Result<(String, bool)> {
        if let [token] = tokens.as_slice() {
            if let TokenKind::PpHeaderName { system, name } = token.kind {
                return Ok((name.as_str().to_string(), system));
            }
        }

        let scope = self.scope();
        let expanded = Substitution::new(&scope, SubstitutionMode::Text, self.config.max_expansion_depth).run(tokens)?;
        let invalid = || Error::malformed(location, "#include expects \"FILENAME\" or <FILENAME>");
        let start = expanded.iter().position(|t| !t.is_whitespace()).ok_or_else(invalid)?;
        let end = expanded.iter().rposition(|t| !t.is_whitespace()).ok_or_else(invalid)?;
        let (first, last) = (&expanded[start], &expanded[end]);

        if start == end {
            return match &first.kind {
                TokenKind::StringLiteral(literal) if literal.value.encoding() == StringEncoding::Multibyte => {
                    Ok((literal.spelling.as_str().trim_matches('"').to_string(), false))
                }
                TokenKind::PpHeaderName { system, name } => Ok((name.as_str().to_string(), *system)),
                _ => Err(invalid()),
            };
        }
        if first.is_punctuator(Punctuator::Less) && last.is_punctuator(Punctuator::Greater) {
            let name: String = expanded[start + 1..end].iter().map(Token::spelling).collect();
            return Ok((name, true));
        }
        Err(invalid())
    }

    fn handle_line(&mut self, scanner: &mut DirectiveScanner, tokens: Vec<Token>, location: SourceLocation) -> Result<()> {
        let scope = self.scope();
        let expanded = Substitution::new(&scope, SubstitutionMode::Text, self.config.max_expansion_depth).run(tokens)?;
        let significant: Vec<Token> = expanded.into_iter().filter(|t| !t.is_whitespace()).collect();

        let (number, file) = match significant.as_slice() {
            [number] => (number, None),
            [number, name] => match &name.kind {
                TokenKind::StringLiteral(literal) if literal.value.encoding() == StringEncoding::Multibyte => {
                    (number, Some(Symbol::new(literal.value.to_text())))
                }
                _ => return Err(Error::malformed(name.location, "invalid filename in #line directive")),
            },
            _ => return Err(Error::malformed(location, "#line expects a line number and an optional filename")),
        };
        let digits = match number.kind {
            TokenKind::PpNumber(spelling) if spelling.as_str().bytes().all(|b| b.is_ascii_digit()) => spelling,
            _ => {
                return Err(Error::malformed(
                    number.location,
                    "#line directive requires a simple digit sequence",
                ))
            }
        };
        let line = digits
            .as_str()
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=2_147_483_647).contains(n))
            .ok_or_else(|| Error::out_of_bounds(number.location, "line number out of range in #line directive"))?;

        debug!("#line {} {:?} at {}", line, file, location);
        scanner.cursor_mut().set_line(line, file);
        Ok(())
    }
}

/// Spellings of the non-whitespace tokens, separated by single blanks.
pub fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter(|t| !t.is_whitespace() && !t.is_sentinel())
        .map(Token::spelling)
        .join(" ")
}
