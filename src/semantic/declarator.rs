//! Declaration specifier and declarator resolution.
//!
//! Turns a declaration-specifier list plus a declarator tree into a canonical type,
//! storage class, function specifiers and alignment. Struct, union and enum
//! specifiers declare their tags and members here as a side effect.

use hashbrown::HashSet;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use super::analyzer::SemanticAnalyzer;
use super::symbol_table::{Namespace, ScopedIdentifier};
use super::types::{ArraySize, EnumConstant, FunctionParameter, RecordField, TypeKind, TypeQualifiers, TypeRef};
use crate::ast::{self, *};
use crate::error::{Error, Result};
use crate::source::SourceLocation;

/// Declaration specifiers after validation.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSpecifiers {
    /// Base type with the specifier-level qualifiers applied
    pub ty: TypeRef,
    pub storage: Option<StorageClass>,
    pub thread_local: bool,
    pub function_specifiers: FunctionSpecifiers,
    pub alignment: Option<u32>,
    /// The specifiers define or forward-declare a tag
    pub declares_tag: bool,
}

/// Result of applying a declarator to a base type.
#[derive(Debug, Clone)]
pub struct DeclaratorInfo {
    pub ty: TypeRef,
    pub name: Option<Symbol>,
    pub location: Option<SourceLocation>,
    /// Parameters of the function declarator closest to the name
    pub parameters: Option<Vec<FunctionParameter>>,
    /// Qualifiers written inside `[]` of the array declarator closest to the name
    pub array_qualifiers: TypeQualifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasicSpecifier {
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,
}

impl BasicSpecifier {
    fn name(self) -> &'static str {
        match self {
            BasicSpecifier::Void => "void",
            BasicSpecifier::Char => "char",
            BasicSpecifier::Short => "short",
            BasicSpecifier::Int => "int",
            BasicSpecifier::Long => "long",
            BasicSpecifier::Float => "float",
            BasicSpecifier::Double => "double",
            BasicSpecifier::Signed => "signed",
            BasicSpecifier::Unsigned => "unsigned",
            BasicSpecifier::Bool => "_Bool",
            BasicSpecifier::Complex => "_Complex",
        }
    }

    /// Whether `next` may follow `seen` in one specifier list.
    fn combines_with(self, next: BasicSpecifier) -> bool {
        use BasicSpecifier::*;
        matches!(
            (self, next),
            (Int, Short | Long | Signed | Unsigned)
                | (Short | Long | Signed | Unsigned, Int)
                | (Short, Signed | Unsigned)
                | (Signed | Unsigned, Short)
                | (Long, Long | Signed | Unsigned | Double | Complex)
                | (Signed | Unsigned | Double | Complex, Long)
                | (Char, Signed | Unsigned)
                | (Signed | Unsigned, Char)
                | (Complex, Float | Double)
                | (Float | Double, Complex)
        )
    }
}

/// Type-specifier state machine.
enum SpecifierState {
    Empty,
    /// A typedef name, tag type or `_Atomic(type)`: combines with nothing
    Named { ty: TypeRef, spelling: &'static str },
    Ordinary(Vec<BasicSpecifier>),
}

impl SpecifierState {
    fn add_named(&mut self, ty: TypeRef, spelling: &'static str, location: SourceLocation) -> Result<()> {
        match self {
            SpecifierState::Empty => {
                *self = SpecifierState::Named { ty, spelling };
                Ok(())
            }
            SpecifierState::Named { spelling: seen, .. } => Err(incompatible(spelling, seen, location)),
            SpecifierState::Ordinary(seen) => Err(incompatible(spelling, seen.last().map_or("", |s| s.name()), location)),
        }
    }

    fn add_basic(&mut self, next: BasicSpecifier, location: SourceLocation) -> Result<()> {
        match self {
            SpecifierState::Empty => {
                *self = SpecifierState::Ordinary(vec![next]);
                Ok(())
            }
            SpecifierState::Named { spelling, .. } => Err(incompatible(next.name(), spelling, location)),
            SpecifierState::Ordinary(seen) => {
                if let Some(conflict) = seen.iter().find(|s| !s.combines_with(next)) {
                    if *conflict == next {
                        return Err(Error::malformed(location, format!("duplicate '{}' declaration specifier", next.name())));
                    }
                    return Err(incompatible(next.name(), conflict.name(), location));
                }
                let longs = seen.iter().filter(|s| **s == BasicSpecifier::Long).count();
                if next == BasicSpecifier::Long && longs == 2 {
                    return Err(Error::malformed(location, "'long long long' is too long"));
                }
                let has_double = seen.contains(&BasicSpecifier::Double);
                if (next == BasicSpecifier::Double && longs == 2) || (next == BasicSpecifier::Long && longs == 1 && has_double) {
                    return Err(incompatible("double", "long long", location));
                }
                seen.push(next);
                Ok(())
            }
        }
    }
}

fn incompatible(next: &str, seen: &str, location: SourceLocation) -> Error {
    Error::malformed(
        location,
        format!("cannot combine '{}' with previous '{}' declaration specifier", next, seen),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Struct,
    Union,
    Enum,
}

impl TagKind {
    fn of(kind: &TypeKind) -> Option<TagKind> {
        match kind {
            TypeKind::Record { is_union: false, .. } => Some(TagKind::Struct),
            TypeKind::Record { is_union: true, .. } => Some(TagKind::Union),
            TypeKind::Enum { .. } => Some(TagKind::Enum),
            _ => None,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            TagKind::Struct => "struct",
            TagKind::Union => "union",
            TagKind::Enum => "enum",
        }
    }
}

fn is_anonymous_record(specifiers: &[DeclSpecifier]) -> bool {
    specifiers.iter().any(|s| {
        matches!(
            s,
            DeclSpecifier::TypeSpecifier(
                TypeSpecifier::Record(RecordSpecifier {
                    tag: None,
                    members: Some(_),
                    ..
                }),
                _
            )
        )
    })
}

impl<'a> SemanticAnalyzer<'a> {
    /// Validate a declaration-specifier list and build its base type.
    ///
    /// `forward` marks a declaration without declarators, where `struct S;` declares a
    /// new incomplete type in the current scope.
    pub(crate) fn resolve_specifiers(
        &mut self,
        specifiers: &'a [DeclSpecifier],
        forward: bool,
        location: SourceLocation,
    ) -> Result<ResolvedSpecifiers> {
        let mut state = SpecifierState::Empty;
        let mut qualifiers = TypeQualifiers::empty();
        let mut storage: Option<StorageClass> = None;
        let mut thread_local = false;
        let mut function_specifiers = FunctionSpecifiers::empty();
        let mut alignment: Option<u32> = None;
        let mut declares_tag = false;

        for specifier in specifiers {
            match specifier {
                DeclSpecifier::StorageClass(StorageClass::ThreadLocal) => {
                    if thread_local {
                        return Err(Error::malformed(location, "duplicate '_Thread_local' declaration specifier"));
                    }
                    thread_local = true;
                }
                DeclSpecifier::StorageClass(class) => {
                    if let Some(previous) = storage {
                        return Err(Error::malformed(
                            location,
                            format!(
                                "cannot combine storage class '{}' with previous '{}'",
                                class.name(),
                                previous.name()
                            ),
                        ));
                    }
                    storage = Some(*class);
                }
                DeclSpecifier::TypeQualifier(q) => qualifiers |= *q,
                DeclSpecifier::FunctionSpecifier(f) => function_specifiers |= *f,
                DeclSpecifier::Alignment(spec) => {
                    let requested = self.resolve_alignment(spec, location)?;
                    alignment = alignment.max(requested);
                }
                DeclSpecifier::TypeSpecifier(type_specifier, spec_location) => {
                    let spec_location = *spec_location;
                    match type_specifier {
                        TypeSpecifier::Record(record) => {
                            declares_tag = true;
                            let ty = self.resolve_record(record, forward, spec_location)?;
                            state.add_named(ty, type_specifier.name(), spec_location)?;
                        }
                        TypeSpecifier::Enum(enumeration) => {
                            declares_tag = true;
                            let ty = self.resolve_enum(enumeration, spec_location)?;
                            state.add_named(ty, "enum", spec_location)?;
                        }
                        TypeSpecifier::TypedefName(name) => {
                            let ty = match self.symbols.lookup(*name, Namespace::Ordinary) {
                                Some((_, ScopedIdentifier::TypeDefinition { ty, .. })) => *ty,
                                _ => {
                                    return Err(Error::not_found(
                                        spec_location,
                                        format!("unknown type name '{}'", name),
                                    ))
                                }
                            };
                            state.add_named(ty, "typedef name", spec_location)?;
                        }
                        TypeSpecifier::Atomic(type_name) => {
                            let ty = self.resolve_type_name(*type_name)?;
                            if self.registry.is_array(ty) || self.registry.is_function(ty) {
                                return Err(Error::malformed(
                                    spec_location,
                                    format!("_Atomic cannot be applied to '{}'", self.registry.display(ty)),
                                ));
                            }
                            let ty = self.registry.qualified(ty, TypeQualifiers::ATOMIC);
                            state.add_named(ty, "_Atomic", spec_location)?;
                        }
                        basic => state.add_basic(basic_specifier(basic)?, spec_location)?,
                    }
                }
            }
        }

        if thread_local && !matches!(storage, None | Some(StorageClass::Extern) | Some(StorageClass::Static)) {
            let class = storage.map_or("", |s| s.name());
            return Err(Error::malformed(
                location,
                format!("'_Thread_local' cannot be combined with '{}'", class),
            ));
        }
        if alignment.is_some() && matches!(storage, Some(StorageClass::Typedef | StorageClass::Register)) {
            return Err(Error::malformed(location, "'_Alignas' applies only to objects"));
        }

        let base = match state {
            SpecifierState::Empty => {
                return Err(Error::malformed(location, "declaration specifiers lack a type specifier"));
            }
            SpecifierState::Named { ty, .. } => ty,
            SpecifierState::Ordinary(seen) => self.basic_type(&seen, location)?,
        };

        Ok(ResolvedSpecifiers {
            ty: self.registry.qualified(base, qualifiers),
            storage,
            thread_local,
            function_specifiers,
            alignment,
            declares_tag,
        })
    }

    fn basic_type(&self, seen: &[BasicSpecifier], location: SourceLocation) -> Result<TypeRef> {
        use BasicSpecifier::*;
        let has = |s: BasicSpecifier| seen.contains(&s);
        let longs = seen.iter().filter(|s| **s == Long).count();
        let unsigned = has(Unsigned);
        let r = &self.registry;

        if has(Complex) {
            return Err(Error::not_supported(location, "complex types are not supported"));
        }
        Ok(if has(Void) {
            r.type_void
        } else if has(Bool) {
            r.type_bool
        } else if has(Char) {
            match (unsigned, has(Signed)) {
                (true, _) => r.type_unsigned_char,
                (_, true) => r.type_signed_char,
                _ => r.type_char,
            }
        } else if has(Short) {
            if unsigned {
                r.type_unsigned_short
            } else {
                r.type_short
            }
        } else if has(Float) {
            r.type_float
        } else if has(Double) {
            if longs > 0 {
                r.type_long_double
            } else {
                r.type_double
            }
        } else {
            match (longs, unsigned) {
                (2, true) => r.type_unsigned_long_long,
                (2, false) => r.type_long_long,
                (1, true) => r.type_unsigned_long,
                (1, false) => r.type_long,
                (_, true) => r.type_unsigned_int,
                (_, false) => r.type_int,
            }
        })
    }

    fn resolve_alignment(&mut self, spec: &'a AlignmentSpecifier, location: SourceLocation) -> Result<Option<u32>> {
        match spec {
            AlignmentSpecifier::Type(type_name) => {
                let ty = self.resolve_type_name(*type_name)?;
                let (_, alignment) = self.complete_layout(ty, location)?;
                Ok(Some(alignment))
            }
            AlignmentSpecifier::Expr(expr) => {
                let value = self.evaluate_integer(*expr)?;
                if value == 0 {
                    return Ok(None);
                }
                match u32::try_from(value) {
                    Ok(v) if v.is_power_of_two() => Ok(Some(v)),
                    _ => Err(Error::malformed(
                        self.ast.get_location(*expr),
                        format!("requested alignment {} is not a positive power of 2", value),
                    )),
                }
            }
        }
    }

    // ============================================================
    // Declarators
    // ============================================================

    /// Apply declarator wrappers to `base`, outermost first.
    pub(crate) fn apply_declarator(
        &mut self,
        base: TypeRef,
        declarator: &'a Declarator,
        location: SourceLocation,
    ) -> Result<DeclaratorInfo> {
        let location = declarator.identifier().map_or(location, |(_, l)| l);
        let mut info = DeclaratorInfo {
            ty: base,
            name: None,
            location: None,
            parameters: None,
            array_qualifiers: TypeQualifiers::empty(),
        };

        let mut current = declarator;
        loop {
            match current {
                Declarator::Identifier(name, name_location) => {
                    info.name = Some(*name);
                    info.location = Some(*name_location);
                    return Ok(info);
                }
                Declarator::Abstract => return Ok(info),
                Declarator::Pointer(qualifiers, inner) => {
                    let pointer = self.registry.pointer_to(info.ty);
                    info.ty = self.registry.qualified(pointer, *qualifiers);
                    info.parameters = None;
                    info.array_qualifiers = TypeQualifiers::empty();
                    current = inner;
                }
                Declarator::Array(inner, size) => {
                    let (ty, qualifiers) = self.array_type(info.ty, size, location)?;
                    info.ty = ty;
                    info.parameters = None;
                    info.array_qualifiers = qualifiers;
                    current = inner;
                }
                Declarator::Function {
                    inner,
                    params,
                    is_variadic,
                    has_prototype,
                } => {
                    let return_type = info.ty;
                    if self.registry.is_function(return_type) || self.registry.is_array(return_type) {
                        return Err(Error::malformed(
                            location,
                            format!("function cannot return '{}'", self.registry.display(return_type)),
                        ));
                    }
                    let parameters = self.resolve_parameters(params)?;
                    info.ty = self.registry.function_type(
                        self.registry.unqualified(return_type),
                        parameters.clone(),
                        *is_variadic,
                        *has_prototype,
                    );
                    info.parameters = Some(parameters);
                    info.array_qualifiers = TypeQualifiers::empty();
                    current = inner;
                }
            }
        }
    }

    fn array_type(
        &mut self,
        element: TypeRef,
        size: &'a ast::ArraySize,
        location: SourceLocation,
    ) -> Result<(TypeRef, TypeQualifiers)> {
        if self.registry.is_function(element) {
            return Err(Error::malformed(location, "declaration of array of functions"));
        }
        if !self.registry.is_complete(element) {
            return Err(Error::malformed(
                location,
                format!("array has incomplete element type '{}'", self.registry.display(element)),
            ));
        }

        let (size, qualifiers) = match size {
            ast::ArraySize::Expression { expr, qualifiers, .. } => {
                let bound = match self.evaluate_integer(*expr) {
                    Ok(n) if n < 0 => {
                        return Err(Error::malformed(location, "array has negative size"));
                    }
                    Ok(n) => ArraySize::Bounded(n as u64),
                    Err(e) if !self.symbols.is_file_scope() && !e.is_internal() => {
                        let bound_type = self.analyze_expression(*expr)?.ty;
                        if !self.registry.is_integer(bound_type) {
                            return Err(Error::malformed(location, "size of array has non-integer type"));
                        }
                        ArraySize::Vla
                    }
                    Err(e) => return Err(e),
                };
                (bound, *qualifiers)
            }
            ast::ArraySize::Star { qualifiers } => (ArraySize::Vla, *qualifiers),
            ast::ArraySize::Incomplete { qualifiers } => (ArraySize::Unbounded, *qualifiers),
        };
        Ok((self.registry.array_of(element, size), qualifiers))
    }

    /// Resolve a parameter list, adjusting array and function parameters to pointers.
    fn resolve_parameters(&mut self, params: &'a [ParamData]) -> Result<Vec<FunctionParameter>> {
        let mut resolved = Vec::with_capacity(params.len());
        let mut names = HashSet::new();
        for param in params {
            let specifiers = self.resolve_specifiers(&param.specifiers, false, param.location)?;
            if !matches!(specifiers.storage, None | Some(StorageClass::Register)) || specifiers.thread_local {
                return Err(Error::malformed(param.location, "invalid storage class for a parameter"));
            }
            let info = self.apply_declarator(specifiers.ty, &param.declarator, param.location)?;
            let ty = match self.registry.base_kind(info.ty) {
                TypeKind::Array { element, .. } => {
                    let element = *element;
                    let pointer = self.registry.pointer_to(element);
                    self.registry.qualified(pointer, info.array_qualifiers)
                }
                TypeKind::Function { .. } => self.registry.pointer_to(info.ty),
                TypeKind::Void => {
                    return Err(Error::malformed(param.location, "parameter has type 'void'"));
                }
                _ => info.ty,
            };
            if let Some(name) = info.name {
                if !names.insert(name) {
                    return Err(Error::malformed(
                        param.location,
                        format!("redefinition of parameter '{}'", name),
                    ));
                }
            }
            resolved.push(FunctionParameter { name: info.name, ty });
        }
        Ok(resolved)
    }

    /// Type named by a `TypeName` node (casts, `sizeof`, compound literals, ...).
    pub(crate) fn resolve_type_name(&mut self, node: NodeRef) -> Result<TypeRef> {
        let ast = self.ast;
        let location = ast.get_location(node);
        let NodeKind::TypeName(type_name) = ast.get_kind(node) else {
            return Err(Error::internal("expected a type name node"));
        };
        let specifiers = self.resolve_specifiers(&type_name.specifiers, false, location)?;
        if specifiers.storage.is_some() || specifiers.thread_local {
            return Err(Error::malformed(location, "storage class in type name"));
        }
        Ok(self.apply_declarator(specifiers.ty, &type_name.declarator, location)?.ty)
    }

    // ============================================================
    // Tags
    // ============================================================

    fn check_tag(&self, existing: TypeRef, expected: TagKind, tag: Symbol, location: SourceLocation) -> Result<()> {
        match TagKind::of(self.registry.kind(existing)) {
            Some(kind) if kind == expected => Ok(()),
            Some(kind) => Err(Error::malformed(
                location,
                format!(
                    "use of '{}' with tag type '{}' that does not match previous declaration '{}'",
                    tag,
                    expected.keyword(),
                    kind.keyword()
                ),
            )),
            None => Err(Error::internal(format!("tag '{}' bound to a non-tag type", tag))),
        }
    }

    /// Find `tag` for a reference; when absent, declare an incomplete type in the current scope.
    fn reference_tag(
        &mut self,
        tag: Symbol,
        kind: TagKind,
        local_only: bool,
        location: SourceLocation,
    ) -> Result<TypeRef> {
        let existing = if local_only {
            self.symbols.lookup_local(tag, Namespace::Tag)
        } else {
            self.symbols.lookup(tag, Namespace::Tag).map(|(_, identifier)| identifier)
        };
        if let Some(identifier) = existing {
            let ty = identifier.ty();
            self.check_tag(ty, kind, tag, location)?;
            return Ok(ty);
        }
        let ty = match kind {
            TagKind::Enum => self.registry.declare_enum(Some(tag)),
            TagKind::Struct | TagKind::Union => self.registry.declare_record(Some(tag), kind == TagKind::Union),
        };
        self.symbols
            .declare(tag, Namespace::Tag, ScopedIdentifier::Tag { ty, location });
        Ok(ty)
    }

    /// Type to complete for a tagged definition in the current scope.
    fn define_tag(&mut self, tag: Option<Symbol>, kind: TagKind, location: SourceLocation) -> Result<TypeRef> {
        let Some(tag) = tag else {
            return Ok(match kind {
                TagKind::Enum => self.registry.declare_enum(None),
                TagKind::Struct | TagKind::Union => self.registry.declare_record(None, kind == TagKind::Union),
            });
        };
        let ty = self.reference_tag(tag, kind, true, location)?;
        if self.registry.is_complete(ty) {
            return Err(Error::malformed(
                location,
                format!("redefinition of '{} {}'", kind.keyword(), tag),
            ));
        }
        Ok(ty)
    }

    fn resolve_record(&mut self, spec: &'a RecordSpecifier, forward: bool, location: SourceLocation) -> Result<TypeRef> {
        let kind = if spec.is_union { TagKind::Union } else { TagKind::Struct };
        let Some(members) = &spec.members else {
            let tag = spec
                .tag
                .ok_or_else(|| Error::malformed(location, "declaration of anonymous struct must be a definition"))?;
            return self.reference_tag(tag, kind, forward, location);
        };

        let ty = self.define_tag(spec.tag, kind, location)?;
        debug!("resolve_record: defining {} {:?}", kind.keyword(), spec.tag);
        let fields = self.resolve_members(members, spec.is_union)?;
        self.registry.complete_record(ty, fields, location)?;
        Ok(ty)
    }

    fn resolve_members(&mut self, members: &'a [MemberDeclaration], is_union: bool) -> Result<Vec<RecordField>> {
        let ast = self.ast;
        let mut fields = Vec::new();
        for member in members {
            match member {
                MemberDeclaration::StaticAssert(node) => {
                    if let NodeKind::StaticAssert(condition, message) = ast.get_kind(*node) {
                        self.analyze_static_assert(*node, *condition, message.as_ref())?;
                    }
                }
                MemberDeclaration::Fields {
                    specifiers,
                    declarators,
                    location,
                } => {
                    let resolved = self.resolve_specifiers(specifiers, false, *location)?;
                    if resolved.storage.is_some() || resolved.thread_local {
                        return Err(Error::malformed(*location, "storage class specified for a member"));
                    }
                    if declarators.is_empty() {
                        if is_anonymous_record(specifiers) {
                            fields.push(RecordField {
                                name: None,
                                ty: resolved.ty,
                                bit_width: None,
                                alignment: resolved.alignment,
                                location: *location,
                            });
                        } else {
                            self.diag
                                .report_warning("declaration does not declare anything", Some(*location));
                        }
                        continue;
                    }
                    for member_declarator in declarators {
                        let info = self.apply_declarator(resolved.ty, &member_declarator.declarator, member_declarator.location)?;
                        if self.registry.is_function(info.ty) {
                            return Err(Error::malformed(
                                member_declarator.location,
                                format!("field '{}' declared as a function", info.name.map(|n| n.to_string()).unwrap_or_default()),
                            ));
                        }
                        let bit_width = match member_declarator.bit_width {
                            Some(width) => Some(self.bit_field_width(info.name, info.ty, width, member_declarator.location)?),
                            None => None,
                        };
                        fields.push(RecordField {
                            name: info.name,
                            ty: info.ty,
                            bit_width,
                            alignment: resolved.alignment,
                            location: member_declarator.location,
                        });
                    }
                }
            }
        }

        let count = fields.len();
        for (i, field) in fields.iter().enumerate() {
            if self.registry.is_complete(field.ty) {
                continue;
            }
            let flexible = !is_union
                && i + 1 == count
                && count > 1
                && matches!(
                    self.registry.base_kind(field.ty),
                    TypeKind::Array {
                        size: ArraySize::Unbounded,
                        ..
                    }
                );
            if !flexible {
                let name = field.name.map(|n| n.to_string()).unwrap_or_default();
                return Err(Error::malformed(
                    field.location,
                    format!(
                        "field '{}' has incomplete type '{}'",
                        name,
                        self.registry.display(field.ty)
                    ),
                ));
            }
        }

        let mut names = HashSet::new();
        self.check_member_names(&fields, &mut names)?;
        Ok(fields)
    }

    /// Member names must be unique, including those reached through anonymous members.
    fn check_member_names(&self, fields: &[RecordField], names: &mut HashSet<Symbol>) -> Result<()> {
        for field in fields {
            match field.name {
                Some(name) => {
                    if !names.insert(name) {
                        return Err(Error::malformed(field.location, format!("duplicate member '{}'", name)));
                    }
                }
                None if field.bit_width.is_none() => {
                    if let TypeKind::Record {
                        definition: Some(definition),
                        ..
                    } = self.registry.base_kind(field.ty)
                    {
                        self.check_member_names(&definition.fields, names)?;
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    fn bit_field_width(
        &mut self,
        name: Option<Symbol>,
        ty: TypeRef,
        width: NodeRef,
        location: SourceLocation,
    ) -> Result<u32> {
        let label = name.map(|n| n.to_string()).unwrap_or_else(|| "<anonymous>".to_string());
        if !self.registry.is_integer(ty) {
            return Err(Error::malformed(
                location,
                format!("bit-field '{}' has non-integral type '{}'", label, self.registry.display(ty)),
            ));
        }
        let value = self.evaluate_integer(width)?;
        let type_bits = self.registry.size_of(ty)? * 8;
        if value < 0 {
            return Err(Error::malformed(location, format!("bit-field '{}' has negative width", label)));
        }
        if value == 0 && name.is_some() {
            return Err(Error::malformed(location, format!("named bit-field '{}' has zero width", label)));
        }
        if value as u64 > type_bits {
            return Err(Error::malformed(
                location,
                format!(
                    "width of bit-field '{}' ({} bits) exceeds the width of its type ({} bits)",
                    label, value, type_bits
                ),
            ));
        }
        Ok(value as u32)
    }

    fn resolve_enum(&mut self, spec: &'a EnumSpecifier, location: SourceLocation) -> Result<TypeRef> {
        let Some(enumerators) = &spec.enumerators else {
            let tag = spec
                .tag
                .ok_or_else(|| Error::malformed(location, "declaration of anonymous enum must be a definition"))?;
            return self.reference_tag(tag, TagKind::Enum, false, location);
        };

        let ty = self.define_tag(spec.tag, TagKind::Enum, location)?;
        let mut constants = Vec::with_capacity(enumerators.len());
        let mut next: Option<i64> = Some(0);
        for enumerator in enumerators {
            let value = match enumerator.value {
                Some(expr) => self.evaluate_integer(expr)?,
                None => next.ok_or_else(|| {
                    Error::out_of_bounds(
                        enumerator.location,
                        format!("overflow in enumeration value '{}'", enumerator.name),
                    )
                })?,
            };
            next = value.checked_add(1);

            if let Some(existing) = self.symbols.lookup_local(enumerator.name, Namespace::Ordinary) {
                return Err(Error::malformed(
                    enumerator.location,
                    format!("redefinition of '{}' as {}", enumerator.name, existing.kind_name()),
                ));
            }
            let constant_type = if i32::try_from(value).is_ok() {
                self.registry.type_int
            } else {
                self.registry.type_long
            };
            self.symbols.declare(
                enumerator.name,
                Namespace::Ordinary,
                ScopedIdentifier::Constant {
                    value,
                    ty: constant_type,
                    location: enumerator.location,
                },
            );
            constants.push(EnumConstant {
                name: enumerator.name,
                value,
            });
        }

        let min = constants.iter().map(|c| c.value).min().unwrap_or(0);
        let max = constants.iter().map(|c| c.value).max().unwrap_or(0);
        let underlying = if min >= 0 && u32::try_from(max).is_ok() {
            self.registry.type_unsigned_int
        } else if i32::try_from(min).is_ok() && i32::try_from(max).is_ok() {
            self.registry.type_int
        } else if min >= 0 {
            self.registry.type_unsigned_long
        } else {
            self.registry.type_long
        };
        self.registry.complete_enum(ty, constants, underlying, location)?;
        Ok(ty)
    }
}

fn basic_specifier(specifier: &TypeSpecifier) -> Result<BasicSpecifier> {
    Ok(match specifier {
        TypeSpecifier::Void => BasicSpecifier::Void,
        TypeSpecifier::Char => BasicSpecifier::Char,
        TypeSpecifier::Short => BasicSpecifier::Short,
        TypeSpecifier::Int => BasicSpecifier::Int,
        TypeSpecifier::Long => BasicSpecifier::Long,
        TypeSpecifier::Float => BasicSpecifier::Float,
        TypeSpecifier::Double => BasicSpecifier::Double,
        TypeSpecifier::Signed => BasicSpecifier::Signed,
        TypeSpecifier::Unsigned => BasicSpecifier::Unsigned,
        TypeSpecifier::Bool => BasicSpecifier::Bool,
        TypeSpecifier::Complex => BasicSpecifier::Complex,
        other => return Err(Error::internal(format!("'{}' is not a basic type specifier", other.name()))),
    })
}
