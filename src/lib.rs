//! A C11 front-end implemented in Rust.
//!
//! Source text flows through the [`pp`] macro preprocessor, is converted and parsed
//! into an [`ast`], checked by the [`semantic`] analyzer and finally laid out into
//! flat [`ir`] type descriptors. [`compiler::CompilationUnit`] wires the stages up.

/// Contains the error types for the application.
pub mod error;
pub mod diagnostic;
pub mod source;
/// Contains the translation environment configuration.
pub mod lang_options;

pub mod lexer;
/// Contains the preprocessor.
pub mod pp;
pub mod ast;
pub mod parser;
/// Contains the semantic analyzer.
pub mod semantic;
/// Contains the IR layout translator.
pub mod ir;
/// Contains the compiler pipeline.
pub mod compiler;


pub use compiler::{CompilationUnit, CompileArtifact, CompileOptions, CompilePhase};
pub use error::{Error, ErrorKind, Result};
pub use source::SourceLocation;
