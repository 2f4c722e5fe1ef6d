//! Semantic Analysis Phase
//!
//! Walks the parsed translation unit once, resolving every declaration into the
//! [`SymbolTable`] and [`TypeRegistry`] and annotating every expression node with its
//! type in [`SemanticInfo`]. Analysis stops at the first error.

use hashbrown::{HashMap, HashSet};
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use super::const_eval::{self, CastTarget, ConstContext, ConstValue};
use super::declarator::{DeclaratorInfo, ResolvedSpecifiers};
use super::symbol_table::{Namespace, ScopeId, ScopeKind, ScopedIdentifier, Storage, SymbolTable};
use super::type_registry::TypeRegistry;
use super::types::{ArraySize, FunctionParameter, TypeKind, TypeRef};
use crate::ast::*;
use crate::diagnostic::DiagnosticEngine;
use crate::error::{Error, Result};
use crate::lexer::StringValue;
use crate::source::SourceLocation;

/// Type of an analyzed expression, before lvalue/array/function conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressionType {
    pub ty: TypeRef,
    pub is_lvalue: bool,
}

/// One identifier introduced by a declaration node.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredIdentifier {
    pub name: Symbol,
    pub ty: TypeRef,
    /// `None` for typedefs
    pub storage: Option<Storage>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: Symbol,
    pub ty: TypeRef,
    /// Function scope holding the parameters; blocks of the body are its children
    pub scope: ScopeId,
    pub parameters: Vec<FunctionParameter>,
    pub specifiers: FunctionSpecifiers,
    pub location: SourceLocation,
}

/// Side tables produced by analysis, keyed by AST node.
#[derive(Debug, Default)]
pub struct SemanticInfo {
    pub expression_types: HashMap<NodeRef, ExpressionType>,
    pub declarations: HashMap<NodeRef, Vec<DeclaredIdentifier>>,
    pub functions: Vec<FunctionInfo>,
}

impl SemanticInfo {
    pub fn expression_type(&self, node: NodeRef) -> Option<TypeRef> {
        self.expression_types.get(&node).map(|e| e.ty)
    }
}

/// Everything analysis produces for one translation unit.
#[derive(Debug)]
pub struct AnalyzedUnit {
    pub registry: TypeRegistry,
    pub symbols: SymbolTable,
    pub info: SemanticInfo,
}

#[derive(Debug)]
struct FunctionContext {
    return_type: TypeRef,
    name: Symbol,
}

#[derive(Debug, Default)]
struct SwitchContext {
    cases: HashSet<i64>,
    has_default: bool,
}

/// Main entry point for semantic analysis
pub struct SemanticAnalyzer<'a> {
    pub(super) ast: &'a Ast,
    pub(super) diag: &'a mut DiagnosticEngine,
    pub(super) registry: TypeRegistry,
    pub(super) symbols: SymbolTable,
    pub(super) info: SemanticInfo,
    function: Option<FunctionContext>,
    loop_depth: u32,
    switches: Vec<SwitchContext>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(ast: &'a Ast, diag: &'a mut DiagnosticEngine) -> Self {
        SemanticAnalyzer {
            ast,
            diag,
            registry: TypeRegistry::new(),
            symbols: SymbolTable::new(),
            info: SemanticInfo::default(),
            function: None,
            loop_depth: 0,
            switches: Vec::new(),
        }
    }

    /// Analyze the whole translation unit.
    pub fn analyze(mut self) -> Result<AnalyzedUnit> {
        let ast = self.ast;
        let root = ast
            .root()
            .ok_or_else(|| Error::internal("AST has no translation unit"))?;
        let NodeKind::TranslationUnit(items) = ast.get_kind(root) else {
            return Err(Error::internal("AST root is not a translation unit"));
        };

        debug!("Starting semantic analysis of {} external declarations", items.len());
        for &item in items {
            self.analyze_external_declaration(item)?;
        }
        debug!("Semantic analysis complete");

        Ok(AnalyzedUnit {
            registry: self.registry,
            symbols: self.symbols,
            info: self.info,
        })
    }

    fn analyze_external_declaration(&mut self, node: NodeRef) -> Result<()> {
        let ast = self.ast;
        match ast.get_kind(node) {
            NodeKind::Declaration(data) => self.analyze_declaration(node, data),
            NodeKind::FunctionDef(data) => self.analyze_function_definition(node, data),
            NodeKind::StaticAssert(condition, message) => self.analyze_static_assert(node, *condition, message.as_ref()),
            other => Err(Error::internal(format!("unexpected external declaration {:?}", other))),
        }
    }

    pub(super) fn evaluate_integer(&mut self, expr: NodeRef) -> Result<i64> {
        let ast = self.ast;
        const_eval::evaluate_integer(ast, expr, self)
    }

    pub(super) fn evaluate(&mut self, expr: NodeRef) -> Result<ConstValue> {
        let ast = self.ast;
        const_eval::evaluate(ast, expr, self)
    }

    pub(super) fn analyze_static_assert(
        &mut self,
        node: NodeRef,
        condition: NodeRef,
        message: Option<&StringValue>,
    ) -> Result<()> {
        let value = self.evaluate_integer(condition)?;
        if value == 0 {
            let text = match message {
                Some(message) => format!("static assertion failed: {}", message.to_text()),
                None => "static assertion failed".to_string(),
            };
            return Err(Error::malformed(self.ast.get_location(node), text));
        }
        Ok(())
    }

    // ============================================================
    // Declarations
    // ============================================================

    pub(super) fn analyze_declaration(&mut self, node: NodeRef, data: &'a DeclarationData) -> Result<()> {
        let location = self.ast.get_location(node);
        let specifiers = self.resolve_specifiers(&data.specifiers, data.init_declarators.is_empty(), location)?;

        if data.init_declarators.is_empty() {
            if !specifiers.declares_tag {
                self.diag
                    .report_warning("declaration does not declare anything", Some(location));
            }
            return Ok(());
        }

        let mut declared = Vec::with_capacity(data.init_declarators.len());
        for init in &data.init_declarators {
            let info = self.apply_declarator(specifiers.ty, &init.declarator, init.location)?;
            let Some(name) = info.name else {
                return Err(Error::malformed(init.location, "declaration requires a name"));
            };
            let location = info.location.unwrap_or(init.location);

            if specifiers.storage == Some(StorageClass::Typedef) {
                if init.initializer.is_some() {
                    return Err(Error::malformed(location, format!("typedef '{}' is initialized", name)));
                }
                self.declare_typedef(name, info.ty, location)?;
                declared.push(DeclaredIdentifier {
                    name,
                    ty: info.ty,
                    storage: None,
                    scope: self.symbols.current_scope(),
                });
                continue;
            }

            if self.registry.is_function(info.ty) {
                if init.initializer.is_some() {
                    return Err(Error::malformed(
                        location,
                        format!("function '{}' is initialized like a variable", name),
                    ));
                }
                let storage = self.function_storage(&specifiers, location)?;
                let ty = self.declare_function(name, info.ty, storage, specifiers.function_specifiers, false, location)?;
                declared.push(DeclaredIdentifier {
                    name,
                    ty,
                    storage: Some(storage),
                    scope: self.symbols.current_scope(),
                });
                continue;
            }

            if !specifiers.function_specifiers.is_empty() {
                return Err(Error::malformed(
                    location,
                    format!("function specifier on non-function '{}'", name),
                ));
            }

            let storage = self.object_storage(&specifiers, location)?;
            let ty = match init.initializer {
                Some(initializer) => self.complete_from_initializer(info.ty, initializer)?,
                None => info.ty,
            };
            self.check_object_type(name, ty, storage, location)?;
            let alignment = self.effective_alignment(ty, specifiers.alignment, location)?;

            // the identifier is in scope inside its own initializer
            let ty = self.declare_object(name, ty, storage, alignment, init.initializer.is_some(), location)?;
            if let Some(initializer) = init.initializer {
                if storage == Storage::Extern && !self.symbols.is_file_scope() {
                    return Err(Error::malformed(
                        location,
                        format!("'extern' variable '{}' cannot have an initializer", name),
                    ));
                }
                self.analyze_initializer(ty, initializer)?;
            }
            declared.push(DeclaredIdentifier {
                name,
                ty,
                storage: Some(storage),
                scope: self.symbols.current_scope(),
            });
        }
        self.info.declarations.insert(node, declared);
        Ok(())
    }

    fn object_storage(&self, specifiers: &ResolvedSpecifiers, location: SourceLocation) -> Result<Storage> {
        let file_scope = self.symbols.is_file_scope();
        let storage = match (specifiers.storage, specifiers.thread_local) {
            (None, false) if file_scope => Storage::Extern,
            (None, false) => Storage::Auto,
            (Some(StorageClass::Extern), false) => Storage::Extern,
            (Some(StorageClass::Static), false) => Storage::Static,
            (Some(StorageClass::Auto), false) => Storage::Auto,
            (Some(StorageClass::Register), false) => Storage::Register,
            (None, true) if file_scope => Storage::ThreadLocal,
            (None, true) => {
                return Err(Error::malformed(
                    location,
                    "'_Thread_local' at block scope requires 'static' or 'extern'",
                ))
            }
            (Some(StorageClass::Extern), true) => Storage::ExternThreadLocal,
            (Some(StorageClass::Static), true) => Storage::StaticThreadLocal,
            (Some(other), _) => {
                return Err(Error::malformed(
                    location,
                    format!("invalid storage class '{}' for an object", other.name()),
                ))
            }
        };
        Ok(storage)
    }

    fn function_storage(&self, specifiers: &ResolvedSpecifiers, location: SourceLocation) -> Result<Storage> {
        if specifiers.thread_local {
            return Err(Error::malformed(location, "'_Thread_local' on a function declaration"));
        }
        match specifiers.storage {
            None | Some(StorageClass::Extern) => Ok(Storage::Extern),
            Some(StorageClass::Static) if self.symbols.is_file_scope() => Ok(Storage::Static),
            Some(other) => Err(Error::malformed(
                location,
                format!("invalid storage class '{}' for a function", other.name()),
            )),
        }
    }

    fn check_object_type(&self, name: Symbol, ty: TypeRef, storage: Storage, location: SourceLocation) -> Result<()> {
        if self.registry.is_void(ty) {
            return Err(Error::malformed(location, format!("variable '{}' has type 'void'", name)));
        }
        let tentative_array = self.symbols.is_file_scope()
            && matches!(
                self.registry.base_kind(ty),
                TypeKind::Array {
                    size: ArraySize::Unbounded,
                    ..
                }
            );
        if matches!(storage, Storage::Extern | Storage::ExternThreadLocal) || tentative_array {
            return Ok(());
        }
        if !self.registry.is_complete(ty) {
            return Err(Error::malformed(
                location,
                format!(
                    "variable '{}' has incomplete type '{}'",
                    name,
                    self.registry.display(ty)
                ),
            ));
        }
        Ok(())
    }

    fn effective_alignment(&mut self, ty: TypeRef, requested: Option<u32>, location: SourceLocation) -> Result<Option<u32>> {
        let Some(requested) = requested else {
            return Ok(None);
        };
        if self.registry.is_complete(ty) && !matches!(self.registry.base_kind(ty), TypeKind::Array { size: ArraySize::Vla, .. }) {
            let natural = self.registry.align_of(ty)?;
            if requested < natural {
                return Err(Error::malformed(
                    location,
                    format!(
                        "requested alignment {} is less than minimum alignment {} of '{}'",
                        requested,
                        natural,
                        self.registry.display(ty)
                    ),
                ));
            }
        }
        Ok(Some(requested))
    }

    fn declare_typedef(&mut self, name: Symbol, ty: TypeRef, location: SourceLocation) -> Result<()> {
        match self.symbols.lookup_local(name, Namespace::Ordinary) {
            Some(ScopedIdentifier::TypeDefinition { ty: existing, .. }) if self.registry.same(*existing, ty) => Ok(()),
            Some(ScopedIdentifier::TypeDefinition { ty: existing, .. }) => Err(Error::malformed(
                location,
                format!(
                    "typedef redefinition of '{}' with different types ('{}' vs '{}')",
                    name,
                    self.registry.display(ty),
                    self.registry.display(*existing)
                ),
            )),
            Some(other) => Err(Error::malformed(
                location,
                format!("redefinition of '{}' as different kind of symbol ({})", name, other.kind_name()),
            )),
            None => {
                self.symbols
                    .declare(name, Namespace::Ordinary, ScopedIdentifier::TypeDefinition { ty, location });
                Ok(())
            }
        }
    }

    /// Declare or redeclare a function, returning the composite type.
    fn declare_function(
        &mut self,
        name: Symbol,
        ty: TypeRef,
        storage: Storage,
        specifiers: FunctionSpecifiers,
        defining: bool,
        location: SourceLocation,
    ) -> Result<TypeRef> {
        // block-scope function declarations refer to the file-scope entity
        let previous = self
            .symbols
            .lookup_local(name, Namespace::Ordinary)
            .or_else(|| self.symbols.lookup_global(name))
            .cloned();

        let (ty, storage, specifiers, defined) = match previous {
            Some(ScopedIdentifier::Function {
                ty: old_ty,
                storage: old_storage,
                specifiers: old_specifiers,
                defined: old_defined,
                ..
            }) => {
                if defining && old_defined {
                    return Err(Error::malformed(location, format!("redefinition of function '{}'", name)));
                }
                if old_storage == Storage::Extern && storage == Storage::Static {
                    return Err(Error::malformed(
                        location,
                        format!("static declaration of '{}' follows non-static declaration", name),
                    ));
                }
                let composite = self.registry.composite(old_ty, ty, location).map_err(|_| {
                    Error::malformed(location, format!("conflicting types for '{}'", name))
                })?;
                (composite, old_storage, old_specifiers | specifiers, old_defined || defining)
            }
            Some(other) if self.symbols.lookup_local(name, Namespace::Ordinary).is_some() => {
                return Err(Error::malformed(
                    location,
                    format!("redefinition of '{}' as different kind of symbol ({})", name, other.kind_name()),
                ));
            }
            _ => (ty, storage, specifiers, defining),
        };

        let identifier = ScopedIdentifier::Function {
            ty,
            storage,
            specifiers,
            defined,
            location,
        };
        if !self.symbols.is_file_scope() && self.symbols.lookup_global(name).is_some() {
            self.symbols
                .declare_in(ScopeId::GLOBAL, name, Namespace::Ordinary, identifier.clone());
        }
        self.symbols.declare(name, Namespace::Ordinary, identifier);
        Ok(ty)
    }

    /// Declare or redeclare an object, returning its (composite) type.
    fn declare_object(
        &mut self,
        name: Symbol,
        ty: TypeRef,
        storage: Storage,
        alignment: Option<u32>,
        defined: bool,
        location: SourceLocation,
    ) -> Result<TypeRef> {
        let previous = self.symbols.lookup_local(name, Namespace::Ordinary).cloned();
        let mut file_scope_entity = false;
        let (ty, storage, alignment, defined) = match previous {
            None => match self.linked_file_scope_object(name, storage) {
                // block-scope extern takes the linkage of the visible file-scope object
                Some((old_ty, old_storage, old_alignment)) => {
                    if old_storage.is_thread_local() != storage.is_thread_local() {
                        return Err(Error::malformed(
                            location,
                            format!("thread-local declaration of '{}' mismatches previous declaration", name),
                        ));
                    }
                    file_scope_entity = true;
                    let composite = self.redeclared_object_type(name, old_ty, ty, location)?;
                    (composite, old_storage, alignment.max(old_alignment), defined)
                }
                None => (ty, storage, alignment, defined),
            },
            Some(ScopedIdentifier::Object {
                ty: old_ty,
                storage: old_storage,
                alignment: old_alignment,
                defined: old_defined,
                file_scope_entity: old_entity,
                ..
            }) => {
                let linked = |s: Storage| !s.is_automatic();
                if !linked(old_storage) || !linked(storage) {
                    return Err(Error::malformed(location, format!("redefinition of '{}'", name)));
                }
                if defined && old_defined {
                    return Err(Error::malformed(location, format!("redefinition of '{}'", name)));
                }
                let storage = match (old_storage, storage) {
                    (old, Storage::Extern | Storage::ExternThreadLocal) => old,
                    (Storage::Extern, Storage::Static) | (Storage::ExternThreadLocal, Storage::StaticThreadLocal) => {
                        return Err(Error::malformed(
                            location,
                            format!("static declaration of '{}' follows non-static declaration", name),
                        ))
                    }
                    (old, new) if old.is_thread_local() != new.is_thread_local() => {
                        return Err(Error::malformed(
                            location,
                            format!("thread-local declaration of '{}' mismatches previous declaration", name),
                        ))
                    }
                    (_, new) => new,
                };
                file_scope_entity = old_entity;
                let composite = self.redeclared_object_type(name, old_ty, ty, location)?;
                (composite, storage, alignment.max(old_alignment), defined || old_defined)
            }
            Some(other) => {
                return Err(Error::malformed(
                    location,
                    format!("redefinition of '{}' as different kind of symbol ({})", name, other.kind_name()),
                ))
            }
        };

        debug!("declare_object: {} : {} ({:?})", name, self.registry.display(ty), storage);
        self.symbols.declare(
            name,
            Namespace::Ordinary,
            ScopedIdentifier::Object {
                ty,
                storage,
                alignment,
                defined,
                file_scope_entity,
                location,
            },
        );
        Ok(ty)
    }

    /// The file-scope object a block-scope `extern` declaration of `name` refers to,
    /// when no inner declaration hides it.
    fn linked_file_scope_object(&self, name: Symbol, storage: Storage) -> Option<(TypeRef, Storage, Option<u32>)> {
        if self.symbols.is_file_scope() || !matches!(storage, Storage::Extern | Storage::ExternThreadLocal) {
            return None;
        }
        match self.symbols.lookup(name, Namespace::Ordinary)? {
            (
                scope,
                ScopedIdentifier::Object {
                    ty,
                    storage,
                    alignment,
                    ..
                },
            ) if scope == ScopeId::GLOBAL => Some((*ty, *storage, *alignment)),
            _ => None,
        }
    }

    fn redeclared_object_type(
        &mut self,
        name: Symbol,
        old_ty: TypeRef,
        ty: TypeRef,
        location: SourceLocation,
    ) -> Result<TypeRef> {
        self.registry.composite(old_ty, ty, location).map_err(|_| {
            Error::malformed(
                location,
                format!(
                    "conflicting types for '{}' ('{}' vs '{}')",
                    name,
                    self.registry.display(ty),
                    self.registry.display(old_ty)
                ),
            )
        })
    }

    /// Infer the bound of `T x[] = ...` from its initializer.
    pub(super) fn complete_from_initializer(&mut self, ty: TypeRef, initializer: NodeRef) -> Result<TypeRef> {
        let (element, qualifiers) = match self.registry.base_kind(ty) {
            TypeKind::Array {
                element,
                size: ArraySize::Unbounded,
            } => (*element, self.registry.qualifiers(ty)),
            _ => return Ok(ty),
        };
        let ast = self.ast;
        let length = match ast.get_kind(initializer) {
            NodeKind::StringLiteral(value) => value.len() as u64 + 1,
            NodeKind::InitializerList(items) => {
                let mut next: u64 = 0;
                let mut length: u64 = 0;
                for item in items {
                    if let Some(Designator::ArrayIndex(index)) = item.designators.first() {
                        let index = self.evaluate_integer(*index)?;
                        next = u64::try_from(index).map_err(|_| {
                            Error::malformed(ast.get_location(item.initializer), "array designator is negative")
                        })?;
                    }
                    next += 1;
                    length = length.max(next);
                }
                length
            }
            _ => return Ok(ty),
        };
        let array = self.registry.array_of(element, ArraySize::Bounded(length));
        Ok(self.registry.qualified(array, qualifiers))
    }

    pub(super) fn analyze_initializer(&mut self, target: TypeRef, initializer: NodeRef) -> Result<()> {
        let ast = self.ast;
        let location = ast.get_location(initializer);
        match ast.get_kind(initializer) {
            NodeKind::InitializerList(items) => {
                // raw field index the next positional initializer starts looking from
                let mut next_field = 0;
                for item in items {
                    if item.designators.is_empty() {
                        let (index, member_type) = self.positional_member(target, next_field, location)?;
                        next_field = index + 1;
                        self.analyze_initializer_element(member_type, item.initializer)?;
                        continue;
                    }

                    // designators walk down from the aggregate itself
                    let mut member_type = target;
                    for (depth, designator) in item.designators.iter().enumerate() {
                        member_type = match designator {
                            Designator::FieldName(field) => {
                                let (path, ty) = self.registry.find_member(member_type, *field).ok_or_else(|| {
                                    Error::malformed(
                                        location,
                                        format!(
                                            "field designator '{}' does not refer to any field in type '{}'",
                                            field,
                                            self.registry.display(member_type)
                                        ),
                                    )
                                })?;
                                if depth == 0 {
                                    next_field = path.first().map_or(0, |&i| i + 1);
                                }
                                ty
                            }
                            Designator::ArrayIndex(index) => {
                                self.evaluate_integer(*index)?;
                                match self.registry.base_kind(member_type) {
                                    TypeKind::Array { element, .. } => *element,
                                    _ => {
                                        return Err(Error::malformed(
                                            location,
                                            "array designator used with a non-array type",
                                        ))
                                    }
                                }
                            }
                        };
                    }
                    self.analyze_initializer_element(member_type, item.initializer)?;
                }
                Ok(())
            }
            _ => {
                let source = self.analyze_expression(initializer)?;
                self.check_initialization(target, initializer, source, location)
            }
        }
    }

    /// Field index and type receiving a positional initializer, searching from raw field
    /// index `from`. Unnamed bit-fields take no initializer.
    fn positional_member(&self, ty: TypeRef, from: usize, location: SourceLocation) -> Result<(usize, TypeRef)> {
        match self.registry.base_kind(ty) {
            TypeKind::Array { element, .. } => Ok((from, *element)),
            TypeKind::Record {
                definition: Some(definition),
                is_union,
                ..
            } => {
                let candidate = definition
                    .fields
                    .iter()
                    .enumerate()
                    .skip(from)
                    .find(|(_, f)| f.name.is_some() || f.bit_width.is_none())
                    .filter(|_| !*is_union || from == 0);
                match candidate {
                    Some((index, field)) => Ok((index, field.ty)),
                    None => Err(Error::malformed(
                        location,
                        format!("excess elements in {} initializer", if *is_union { "union" } else { "struct" }),
                    )),
                }
            }
            _ => Ok((from, ty)),
        }
    }

    /// Element type receiving the first positional initializer of an aggregate.
    fn initializer_element_type(&self, ty: TypeRef) -> TypeRef {
        match self.registry.base_kind(ty) {
            TypeKind::Array { element, .. } => *element,
            TypeKind::Record {
                definition: Some(definition),
                ..
            } => definition.fields.first().map(|f| f.ty).unwrap_or(ty),
            _ => ty,
        }
    }

    fn analyze_initializer_element(&mut self, target: TypeRef, initializer: NodeRef) -> Result<()> {
        if matches!(self.ast.get_kind(initializer), NodeKind::InitializerList(_)) {
            return self.analyze_initializer(target, initializer);
        }
        // brace elision: scalars may initialize the first member of a nested aggregate
        let source = self.analyze_expression(initializer)?;
        let location = self.ast.get_location(initializer);
        if (self.registry.is_array(target) || self.registry.is_record(target))
            && !self.registry.compatible(self.registry.unqualified(target), self.registry.unqualified(source.ty))
            && !matches!(self.ast.get_kind(initializer), NodeKind::StringLiteral(_))
        {
            let first = self.initializer_element_type(target);
            if first != target {
                return self.analyze_initializer_element(first, initializer);
            }
        }
        self.check_initialization(target, initializer, source, location)
    }

    fn check_initialization(
        &mut self,
        target: TypeRef,
        initializer: NodeRef,
        source: ExpressionType,
        location: SourceLocation,
    ) -> Result<()> {
        if let (TypeKind::Array { element, .. }, NodeKind::StringLiteral(_)) =
            (self.registry.base_kind(target), self.ast.get_kind(initializer))
        {
            if self.registry.is_integer(*element) {
                return Ok(());
            }
        }
        if self.registry.is_array(target) {
            return Err(Error::malformed(location, "array initializer must be an initializer list"));
        }
        self.check_assignment(target, initializer, source, location)
    }

    // ============================================================
    // Function definitions
    // ============================================================

    fn analyze_function_definition(&mut self, node: NodeRef, data: &'a FunctionDefData) -> Result<()> {
        let location = self.ast.get_location(node);
        let specifiers = self.resolve_specifiers(&data.specifiers, false, location)?;
        if specifiers.storage == Some(StorageClass::Typedef) {
            return Err(Error::malformed(location, "function definition declared 'typedef'"));
        }
        let DeclaratorInfo {
            ty,
            name,
            location: name_location,
            parameters,
            ..
        } = self.apply_declarator(specifiers.ty, &data.declarator, location)?;
        let (Some(name), Some(parameters)) = (name, parameters) else {
            return Err(Error::malformed(location, "function definition requires a named function declarator"));
        };
        let location = name_location.unwrap_or(location);
        let TypeKind::Function { return_type, .. } = *self.registry.kind(ty) else {
            return Err(Error::malformed(location, format!("'{}' is not a function", name)));
        };
        if !self.registry.is_void(return_type) && !self.registry.is_complete(return_type) {
            return Err(Error::malformed(
                location,
                format!("function '{}' returns incomplete type", name),
            ));
        }

        let storage = self.function_storage(&specifiers, location)?;
        let ty = self.declare_function(name, ty, storage, specifiers.function_specifiers, true, location)?;
        debug!("analyze_function_definition: {} : {}", name, self.registry.display(ty));

        let scope = self.symbols.push_scope(ScopeKind::Function);
        let previous = self.function.replace(FunctionContext { return_type, name });
        let result = self.analyze_function_body(&parameters, data.body, location);
        self.function = previous;
        self.symbols.pop_scope()?;
        result?;
        self.symbols.check_labels(scope)?;

        self.info.functions.push(FunctionInfo {
            name,
            ty,
            scope,
            parameters,
            specifiers: specifiers.function_specifiers,
            location,
        });
        Ok(())
    }

    fn analyze_function_body(
        &mut self,
        parameters: &[FunctionParameter],
        body: NodeRef,
        location: SourceLocation,
    ) -> Result<()> {
        for param in parameters {
            let Some(name) = param.name else {
                return Err(Error::malformed(location, "parameter name omitted in function definition"));
            };
            if !self.registry.is_complete(param.ty) {
                return Err(Error::malformed(
                    location,
                    format!("parameter '{}' has incomplete type", name),
                ));
            }
            self.declare_object(name, param.ty, Storage::Auto, None, true, location)?;
        }

        // the outermost block of the body shares the function scope with the parameters
        let ast = self.ast;
        let NodeKind::Compound(items) = ast.get_kind(body) else {
            return Err(Error::internal("function body is not a compound statement"));
        };
        for &item in items {
            self.analyze_statement(item)?;
        }
        Ok(())
    }

    // ============================================================
    // Statements
    // ============================================================

    fn in_scope(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        self.symbols.push_scope(ScopeKind::Block);
        let result = f(self);
        self.symbols.pop_scope()?;
        result
    }

    fn check_condition(&mut self, condition: NodeRef) -> Result<()> {
        let ty = self.analyze_expression(condition)?.ty;
        let ty = self.value_type(ty);
        if !self.registry.is_scalar(ty) {
            return Err(Error::malformed(
                self.ast.get_location(condition),
                format!(
                    "statement requires expression of scalar type ('{}' invalid)",
                    self.registry.display(ty)
                ),
            ));
        }
        Ok(())
    }

    fn analyze_loop_body(&mut self, body: NodeRef) -> Result<()> {
        self.loop_depth += 1;
        let result = self.analyze_statement(body);
        self.loop_depth -= 1;
        result
    }

    pub(super) fn analyze_statement(&mut self, node: NodeRef) -> Result<()> {
        let ast = self.ast;
        let location = ast.get_location(node);
        match ast.get_kind(node) {
            NodeKind::Compound(items) => self.in_scope(|this| {
                for &item in items {
                    this.analyze_statement(item)?;
                }
                Ok(())
            }),
            NodeKind::Declaration(data) => self.analyze_declaration(node, data),
            NodeKind::StaticAssert(condition, message) => self.analyze_static_assert(node, *condition, message.as_ref()),
            NodeKind::ExpressionStatement(expr) => {
                if let Some(expr) = expr {
                    self.analyze_expression(*expr)?;
                }
                Ok(())
            }
            NodeKind::If(stmt) => {
                self.check_condition(stmt.condition)?;
                self.analyze_statement(stmt.then_branch)?;
                if let Some(else_branch) = stmt.else_branch {
                    self.analyze_statement(else_branch)?;
                }
                Ok(())
            }
            NodeKind::While(stmt) => {
                self.check_condition(stmt.condition)?;
                self.analyze_loop_body(stmt.body)
            }
            NodeKind::DoWhile(body, condition) => {
                self.analyze_loop_body(*body)?;
                self.check_condition(*condition)
            }
            NodeKind::For(stmt) => self.in_scope(|this| {
                if let Some(init) = stmt.init {
                    this.analyze_statement(init)?;
                }
                if let Some(condition) = stmt.condition {
                    this.check_condition(condition)?;
                }
                if let Some(increment) = stmt.increment {
                    this.analyze_expression(increment)?;
                }
                this.analyze_loop_body(stmt.body)
            }),
            NodeKind::Switch(condition, body) => {
                let ty = self.analyze_expression(*condition)?.ty;
                if !self.registry.is_integer(ty) {
                    return Err(Error::malformed(
                        location,
                        format!("switch condition has non-integer type '{}'", self.registry.display(ty)),
                    ));
                }
                self.switches.push(SwitchContext::default());
                let result = self.analyze_statement(*body);
                self.switches.pop();
                result
            }
            NodeKind::Case(value, statement) => {
                let value = self.evaluate_integer(*value)?;
                let Some(switch) = self.switches.last_mut() else {
                    return Err(Error::malformed(location, "'case' statement not in switch statement"));
                };
                if !switch.cases.insert(value) {
                    return Err(Error::malformed(location, format!("duplicate case value '{}'", value)));
                }
                self.analyze_statement(*statement)
            }
            NodeKind::Default(statement) => {
                let Some(switch) = self.switches.last_mut() else {
                    return Err(Error::malformed(location, "'default' statement not in switch statement"));
                };
                if switch.has_default {
                    return Err(Error::malformed(location, "multiple default labels in one switch"));
                }
                switch.has_default = true;
                self.analyze_statement(*statement)
            }
            NodeKind::Label(name, statement) => {
                self.symbols.define_label(*name, location)?;
                self.analyze_statement(*statement)
            }
            NodeKind::Goto(name) => self.symbols.use_label(*name, location),
            NodeKind::Break => {
                if self.loop_depth == 0 && self.switches.is_empty() {
                    return Err(Error::malformed(location, "'break' statement not in loop or switch statement"));
                }
                Ok(())
            }
            NodeKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(Error::malformed(location, "'continue' statement not in loop statement"));
                }
                Ok(())
            }
            NodeKind::Return(value) => self.analyze_return(*value, location),
            kind if kind.is_expression() => self.analyze_expression(node).map(|_| ()),
            other => Err(Error::internal(format!("unexpected statement {:?}", other))),
        }
    }

    fn analyze_return(&mut self, value: Option<NodeRef>, location: SourceLocation) -> Result<()> {
        let Some(function) = self.function.as_ref() else {
            return Err(Error::internal("return outside of a function"));
        };
        let (return_type, name) = (function.return_type, function.name);
        match value {
            Some(value) => {
                let source = self.analyze_expression(value)?;
                if self.registry.is_void(return_type) {
                    if self.registry.is_void(source.ty) {
                        return Ok(());
                    }
                    return Err(Error::malformed(
                        location,
                        format!("void function '{}' should not return a value", name),
                    ));
                }
                self.check_assignment(return_type, value, source, location)
            }
            None => {
                if !self.registry.is_void(return_type) {
                    self.diag.report_warning(
                        format!("non-void function '{}' should return a value", name),
                        Some(location),
                    );
                }
                Ok(())
            }
        }
    }
}

impl ConstContext for SemanticAnalyzer<'_> {
    fn enum_constant(&self, name: Symbol) -> Option<i64> {
        match self.symbols.lookup(name, Namespace::Ordinary) {
            Some((_, ScopedIdentifier::Constant { value, .. })) => Some(*value),
            _ => None,
        }
    }

    fn type_layout(&mut self, type_name: NodeRef) -> Result<(u64, u32)> {
        let ty = self.resolve_type_name(type_name)?;
        self.complete_layout(ty, self.ast.get_location(type_name))
    }

    fn expression_size(&mut self, expr: NodeRef) -> Result<u64> {
        let ty = self.analyze_expression(expr)?.ty;
        Ok(self.complete_layout(ty, self.ast.get_location(expr))?.0)
    }

    fn cast_target(&mut self, type_name: NodeRef) -> Result<CastTarget> {
        let ty = self.resolve_type_name(type_name)?;
        if self.registry.is_void(ty) {
            Ok(CastTarget::Void)
        } else if matches!(self.registry.base_kind(ty), TypeKind::Bool) {
            Ok(CastTarget::Bool)
        } else if self.registry.is_floating(ty) {
            Ok(CastTarget::Float)
        } else if self.registry.is_integer(ty) {
            Ok(CastTarget::Integer {
                size: self.registry.size_of(ty)?,
                unsigned: self.registry.is_unsigned(ty),
            })
        } else {
            Err(Error::malformed(
                self.ast.get_location(type_name),
                format!("cast to '{}' in constant expression", self.registry.display(ty)),
            ))
        }
    }
}

impl SemanticAnalyzer<'_> {
    /// `(size, alignment)` of a type that must be complete, as `sizeof` requires.
    pub(super) fn complete_layout(&mut self, ty: TypeRef, location: SourceLocation) -> Result<(u64, u32)> {
        if self.registry.is_function(ty) {
            return Err(Error::malformed(location, "invalid application of 'sizeof' to a function type"));
        }
        if !self.registry.is_complete(ty) {
            return Err(Error::malformed(
                location,
                format!(
                    "invalid application of 'sizeof' to an incomplete type '{}'",
                    self.registry.display(ty)
                ),
            ));
        }
        let layout = self.registry.layout(ty).map_err(|e| Error {
            location: e.location.or(Some(location)),
            ..e
        })?;
        Ok((layout.size, layout.alignment))
    }
}

/// Run semantic analysis over a parsed translation unit.
pub fn analyze(ast: &Ast, diag: &mut DiagnosticEngine) -> Result<AnalyzedUnit> {
    SemanticAnalyzer::new(ast, diag).analyze()
}
