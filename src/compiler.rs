//! Compilation pipeline orchestration
//!
//! A [`CompilationUnit`] drives one translation unit through preprocessing, token
//! conversion, parsing, semantic analysis and IR layout translation, stopping after
//! the requested [`CompilePhase`].

use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use crate::ast::Ast;
use crate::diagnostic::DiagnosticEngine;
use crate::error::{Error, ErrorKind, Result};
use crate::ir::{self, TranslatedUnit};
use crate::lang_options::Environment;
use crate::lexer::{convert_preprocessed, Token};
use crate::parser::parse_translation_unit;
use crate::pp::{Preprocessor, PreprocessorConfig, SourceLocator};
use crate::semantic::{analyze, AnalyzedUnit};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CompilePhase {
    Preprocess,
    Parse,
    Analyze,
    #[default]
    Translate,
}

/// Outputs of a single translation unit, filled up to the phase the run stopped after
#[derive(Debug, Default)]
pub struct CompileArtifact {
    pub preprocessed: Option<Vec<Token>>,
    pub ast: Option<Ast>,
    pub analyzed: Option<AnalyzedUnit>,
    pub translated: Option<TranslatedUnit>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub environment: Environment,
    pub preprocessor: PreprocessorConfig,
    /// `-W` style switches understood by [`DiagnosticEngine::from_warnings`]
    pub warnings: Vec<String>,
}

/// One translation unit and the diagnostics collected while compiling it.
pub struct CompilationUnit<'l> {
    locator: &'l dyn SourceLocator,
    options: CompileOptions,
    diagnostics: DiagnosticEngine,
}

impl<'l> CompilationUnit<'l> {
    pub fn new(locator: &'l dyn SourceLocator, options: CompileOptions) -> Self {
        let diagnostics = DiagnosticEngine::from_warnings(&options.warnings);
        CompilationUnit {
            locator,
            options,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticEngine {
        &self.diagnostics
    }

    /// Run the pipeline on `source`, named `file`, up to and including `stop_after`.
    pub fn run(&mut self, source: &str, file: Symbol, stop_after: CompilePhase) -> Result<CompileArtifact> {
        let result = self.run_pipeline(source, file, stop_after);
        let result = guard_no_match(result);
        if let Err(e) = &result {
            self.diagnostics.report_error(e);
        }
        result
    }

    /// Preprocessed token stream of `source`.
    pub fn preprocess(&mut self, source: &str, file: Symbol) -> Result<Vec<Token>> {
        let artifact = self.run(source, file, CompilePhase::Preprocess)?;
        artifact
            .preprocessed
            .ok_or_else(|| Error::internal("preprocessing produced no tokens"))
    }

    /// Full pipeline through IR layout translation.
    pub fn translate(&mut self, source: &str, file: Symbol) -> Result<TranslatedUnit> {
        let artifact = self.run(source, file, CompilePhase::Translate)?;
        artifact
            .translated
            .ok_or_else(|| Error::internal("translation produced no IR module"))
    }

    fn run_pipeline(&mut self, source: &str, file: Symbol, stop_after: CompilePhase) -> Result<CompileArtifact> {
        let mut out = CompileArtifact::default();

        // Preprocessing phase
        let pp_tokens = self.run_preprocessor(source, file)?;
        if stop_after == CompilePhase::Preprocess {
            out.preprocessed = Some(pp_tokens);
            return Ok(out);
        }

        // Parsing phase
        let tokens = convert_preprocessed(pp_tokens)?;
        let mut ast = Ast::new();
        parse_translation_unit(&tokens, &mut ast)?;
        debug!("parsed {} AST nodes", ast.len());
        if stop_after == CompilePhase::Parse {
            out.ast = Some(ast);
            return Ok(out);
        }

        // Semantic analysis phase
        let mut analyzed = analyze(&ast, &mut self.diagnostics)?;
        if stop_after == CompilePhase::Analyze {
            out.ast = Some(ast);
            out.analyzed = Some(analyzed);
            return Ok(out);
        }

        // IR layout phase
        let translated = ir::translate(&mut analyzed)?;
        out.ast = Some(ast);
        out.analyzed = Some(analyzed);
        out.translated = Some(translated);
        Ok(out)
    }

    fn run_preprocessor(&mut self, source: &str, file: Symbol) -> Result<Vec<Token>> {
        let mut preprocessor = Preprocessor::new(
            self.locator,
            &mut self.diagnostics,
            &self.options.environment,
            self.options.preprocessor.clone(),
        )?;
        preprocessor.process(source, file)
    }
}

/// `NoMatch` is an internal alternation signal; one escaping the pipeline is a bug.
fn guard_no_match<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| match e.kind {
        ErrorKind::NoMatch => Error {
            kind: ErrorKind::InternalError,
            message: format!("unresolved alternative escaped the pipeline: {}", e.message),
            ..e
        },
        _ => e,
    })
}
