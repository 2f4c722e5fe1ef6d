//! Semantic analysis module.
//!
//! This module provides semantic analysis for C11 translation units:
//! - canonical type construction and layout ([`TypeRegistry`])
//! - scoped symbol management ([`SymbolTable`])
//! - declaration, statement and expression checking ([`SemanticAnalyzer`])
//! - constant expression evaluation, shared with the preprocessor's `#if`

pub mod analyzer;
pub mod const_eval;
pub mod conversions;
pub mod declarator;
pub mod expressions;
pub mod symbol_table;
pub mod type_registry;
pub mod types;

// Re-export key types for public API
pub use analyzer::{
    analyze, AnalyzedUnit, DeclaredIdentifier, ExpressionType, FunctionInfo, SemanticAnalyzer, SemanticInfo,
};
pub use const_eval::{ConstContext, ConstValue, PreprocessorContext};
pub use symbol_table::{Namespace, ScopeId, ScopeKind, ScopedIdentifier, Storage, SymbolTable};
pub use type_registry::TypeRegistry;
pub use types::{
    ArraySize, EnumConstant, FunctionParameter, LayoutKind, RecordField, StorageUnit, Type, TypeKind, TypeLayout,
    TypeQualifiers, TypeRef,
};
