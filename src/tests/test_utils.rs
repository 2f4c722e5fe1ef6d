use symbol_table::GlobalSymbol as Symbol;

use crate::ast::{Ast, NodeKind, NodeRef};
use crate::compiler::{CompilationUnit, CompileArtifact, CompileOptions, CompilePhase};
use crate::error::Error;
use crate::ir::TranslatedUnit;
use crate::pp::VirtualSourceLocator;
use crate::semantic::{AnalyzedUnit, Namespace};

pub fn run_pipeline(source: &str, phase: CompilePhase) -> Result<CompileArtifact, Error> {
    let _ = env_logger::builder().is_test(true).try_init();
    let locator = VirtualSourceLocator::new();
    let mut unit = CompilationUnit::new(&locator, CompileOptions::default());
    unit.run(source, Symbol::new("<test>"), phase)
}

pub fn run_pipeline_success(source: &str, phase: CompilePhase) -> CompileArtifact {
    match run_pipeline(source, phase) {
        Ok(artifact) => artifact,
        Err(e) => panic!("Compilation failed: {}", e),
    }
}

pub fn run_pipeline_error(source: &str, phase: CompilePhase) -> Error {
    match run_pipeline(source, phase) {
        Ok(_) => panic!("Compilation unexpectedly succeeded:\n{}", source),
        Err(e) => e,
    }
}

pub fn setup_parse(source: &str) -> Ast {
    run_pipeline_success(source, CompilePhase::Parse)
        .ast
        .expect("No AST available")
}

pub fn setup_analysis(source: &str) -> (Ast, AnalyzedUnit) {
    let artifact = run_pipeline_success(source, CompilePhase::Analyze);
    (
        artifact.ast.expect("No AST available"),
        artifact.analyzed.expect("No analysis available"),
    )
}

pub fn setup_translation(source: &str) -> TranslatedUnit {
    run_pipeline_success(source, CompilePhase::Translate)
        .translated
        .expect("No IR available")
}

/// Spelled type of a file-scope identifier.
pub fn global_type(unit: &AnalyzedUnit, name: &str) -> String {
    let identifier = unit
        .symbols
        .lookup_global(Symbol::new(name))
        .unwrap_or_else(|| panic!("'{}' is not declared at file scope", name));
    unit.registry.display(identifier.ty())
}

/// Spelled type of a file-scope struct/union/enum tag.
pub fn tag_type(unit: &AnalyzedUnit, tag: &str) -> String {
    let (_, identifier) = unit
        .symbols
        .lookup(Symbol::new(tag), Namespace::Tag)
        .unwrap_or_else(|| panic!("tag '{}' is not declared", tag));
    unit.registry.display(identifier.ty())
}

/// Expression of the last expression statement in the AST.
pub fn last_expression_statement(ast: &Ast) -> NodeRef {
    ast.kinds
        .iter()
        .rev()
        .find_map(|kind| match kind {
            NodeKind::ExpressionStatement(Some(expr)) => Some(*expr),
            _ => None,
        })
        .expect("no expression statement in source")
}

/// Type of `expr` evaluated inside a function body after `declarations`.
pub fn expression_type(declarations: &str, expr: &str) -> String {
    let source = format!("{}\nvoid probe(void) {{ {}; }}\n", declarations, expr);
    let (ast, unit) = setup_analysis(&source);
    let node = last_expression_statement(&ast);
    let ty = unit
        .info
        .expression_type(node)
        .unwrap_or_else(|| panic!("'{}' has no recorded type", expr));
    unit.registry.display(ty)
}
