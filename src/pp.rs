//! Macro preprocessor.
//!
//! [`directives`] splits a file into directive and text lines, [`substitution`]
//! expands macros over token sequences and [`Preprocessor`] drives both, handling
//! conditional inclusion and `#include` through a [`SourceLocator`].

pub mod directives;
pub mod header_search;
pub mod macros;
pub mod preprocessor;
pub mod substitution;
pub mod token_sequence;

#[cfg(test)]
mod tests_pasting;
#[cfg(test)]
mod tests_preprocessor;

pub use directives::{Directive, DirectiveKind, DirectiveLine, DirectiveScanner, Line};
pub use header_search::{FilesystemSourceLocator, SourceFile, SourceLocator, VirtualSourceLocator};
pub use macros::{DynamicMacro, Macro, MacroKind, MacroScope, MacroTable, Overlay};
pub use preprocessor::{render, Preprocessor, PreprocessorConfig};
pub use substitution::{Substitution, SubstitutionMode};
pub use token_sequence::TokenSequence;
