//! Type Registry
//!
//! Arena + canonicalization layer for semantic types. Every type of a translation
//! unit lives here and is dropped with the registry; nothing frees a single type.

use hashbrown::{HashMap, HashSet};
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use super::types::*;
use crate::error::{Error, Result};
use crate::source::SourceLocation;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FnSigKey {
    return_type: TypeRef,
    params: Vec<TypeRef>,
    is_variadic: bool,
    has_prototype: bool,
}

/// Central arena & factory for semantic types.
///
/// Invariants:
/// - All TypeRef come from this registry
/// - Types are never removed
/// - Pointer, array, function and qualified types are interned
#[derive(Debug)]
pub struct TypeRegistry {
    pub types: Vec<Type>,

    // --- Canonicalization caches ---
    pointer_cache: HashMap<TypeRef, TypeRef>,
    array_cache: HashMap<(TypeRef, ArraySize), TypeRef>,
    function_cache: HashMap<FnSigKey, TypeRef>,
    qualified_cache: HashMap<(TypeRef, TypeQualifiers), TypeRef>,

    // --- Layout computation tracking ---
    layout_in_progress: HashSet<TypeRef>,

    // --- Common builtin types ---
    pub type_void: TypeRef,
    pub type_bool: TypeRef,
    pub type_char: TypeRef,
    pub type_signed_char: TypeRef,
    pub type_unsigned_char: TypeRef,
    pub type_short: TypeRef,
    pub type_unsigned_short: TypeRef,
    pub type_int: TypeRef,
    pub type_unsigned_int: TypeRef,
    pub type_long: TypeRef,
    pub type_unsigned_long: TypeRef,
    pub type_long_long: TypeRef,
    pub type_unsigned_long_long: TypeRef,
    pub type_float: TypeRef,
    pub type_double: TypeRef,
    pub type_long_double: TypeRef,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn alloc_builtin(types: &mut Vec<Type>, kind: TypeKind) -> TypeRef {
    types.push(Type::new(kind));
    TypeRef::from_index(types.len() - 1)
}

impl TypeRegistry {
    /// Create a new TypeRegistry with builtin types initialized.
    pub fn new() -> Self {
        let mut types = Vec::new();
        let type_void = alloc_builtin(&mut types, TypeKind::Void);
        let type_bool = alloc_builtin(&mut types, TypeKind::Bool);
        let type_char = alloc_builtin(&mut types, TypeKind::Char);
        let type_signed_char = alloc_builtin(&mut types, TypeKind::SignedChar);
        let type_unsigned_char = alloc_builtin(&mut types, TypeKind::UnsignedChar);
        let type_short = alloc_builtin(&mut types, TypeKind::Short);
        let type_unsigned_short = alloc_builtin(&mut types, TypeKind::UnsignedShort);
        let type_int = alloc_builtin(&mut types, TypeKind::Int);
        let type_unsigned_int = alloc_builtin(&mut types, TypeKind::UnsignedInt);
        let type_long = alloc_builtin(&mut types, TypeKind::Long);
        let type_unsigned_long = alloc_builtin(&mut types, TypeKind::UnsignedLong);
        let type_long_long = alloc_builtin(&mut types, TypeKind::LongLong);
        let type_unsigned_long_long = alloc_builtin(&mut types, TypeKind::UnsignedLongLong);
        let type_float = alloc_builtin(&mut types, TypeKind::Float);
        let type_double = alloc_builtin(&mut types, TypeKind::Double);
        let type_long_double = alloc_builtin(&mut types, TypeKind::LongDouble);

        TypeRegistry {
            types,
            pointer_cache: HashMap::new(),
            array_cache: HashMap::new(),
            function_cache: HashMap::new(),
            qualified_cache: HashMap::new(),
            layout_in_progress: HashSet::new(),
            type_void,
            type_bool,
            type_char,
            type_signed_char,
            type_unsigned_char,
            type_short,
            type_unsigned_short,
            type_int,
            type_unsigned_int,
            type_long,
            type_unsigned_long,
            type_long_long,
            type_unsigned_long_long,
            type_float,
            type_double,
            type_long_double,
        }
    }

    /// Allocate a new canonical type and return its TypeRef.
    fn alloc(&mut self, ty: Type) -> TypeRef {
        self.types.push(ty);
        TypeRef::from_index(self.types.len() - 1)
    }

    #[inline]
    pub fn get(&self, r: TypeRef) -> &Type {
        &self.types[r.index()]
    }

    #[inline]
    pub fn kind(&self, r: TypeRef) -> &TypeKind {
        &self.get(r).kind
    }

    // ============================================================
    // Canonical type constructors
    // ============================================================

    pub fn pointer_to(&mut self, base: TypeRef) -> TypeRef {
        if let Some(&ptr) = self.pointer_cache.get(&base) {
            return ptr;
        }
        let ptr = self.alloc(Type::new(TypeKind::Pointer { pointee: base }));
        self.pointer_cache.insert(base, ptr);
        ptr
    }

    pub fn array_of(&mut self, element: TypeRef, size: ArraySize) -> TypeRef {
        let key = (element, size);
        if let Some(&arr) = self.array_cache.get(&key) {
            return arr;
        }
        let arr = self.alloc(Type::new(TypeKind::Array { element, size }));
        self.array_cache.insert(key, arr);
        arr
    }

    pub fn function_type(
        &mut self,
        return_type: TypeRef,
        params: Vec<FunctionParameter>,
        is_variadic: bool,
        has_prototype: bool,
    ) -> TypeRef {
        let key = FnSigKey {
            return_type,
            params: params.iter().map(|p| p.ty).collect(),
            is_variadic,
            has_prototype,
        };
        // parameter names are not part of the type; the first spelling wins
        if let Some(&ty) = self.function_cache.get(&key) {
            return ty;
        }
        let ty = self.alloc(Type::new(TypeKind::Function {
            return_type,
            params,
            is_variadic,
            has_prototype,
        }));
        self.function_cache.insert(key, ty);
        ty
    }

    /// Apply qualifiers to a type. Qualifiers on an array type apply to its element type.
    pub fn qualified(&mut self, base: TypeRef, qualifiers: TypeQualifiers) -> TypeRef {
        if qualifiers.is_empty() {
            return base;
        }
        match self.kind(base).clone() {
            TypeKind::Qualified {
                base: inner,
                qualifiers: existing,
            } => self.qualified(inner, existing | qualifiers),
            TypeKind::Array { element, size } => {
                let element = self.qualified(element, qualifiers);
                self.array_of(element, size)
            }
            _ => {
                let key = (base, qualifiers);
                if let Some(&ty) = self.qualified_cache.get(&key) {
                    return ty;
                }
                let ty = self.alloc(Type::new(TypeKind::Qualified { base, qualifiers }));
                self.qualified_cache.insert(key, ty);
                ty
            }
        }
    }

    /// Declare a new incomplete struct or union.
    pub fn declare_record(&mut self, tag: Option<Symbol>, is_union: bool) -> TypeRef {
        debug!("declare_record: {:?} union={}", tag, is_union);
        self.alloc(Type::new(TypeKind::Record {
            tag,
            is_union,
            definition: None,
        }))
    }

    /// Complete a previously declared record with its field list.
    pub fn complete_record(&mut self, ty: TypeRef, fields: Vec<RecordField>, location: SourceLocation) -> Result<()> {
        match &mut self.types[ty.index()].kind {
            TypeKind::Record {
                definition: Some(_),
                tag,
                is_union,
            } => Err(Error::malformed(
                location,
                format!(
                    "redefinition of '{} {}'",
                    if *is_union { "union" } else { "struct" },
                    tag.map(|t| t.as_str().to_string()).unwrap_or_default()
                ),
            )),
            TypeKind::Record { definition, .. } => {
                *definition = Some(RecordDefinition::new(fields));
                Ok(())
            }
            _ => Err(Error::internal("complete_record on a non-record type")),
        }
    }

    /// Declare a new incomplete enumeration. Its underlying type is `unsigned int`
    /// until completion.
    pub fn declare_enum(&mut self, tag: Option<Symbol>) -> TypeRef {
        let underlying = self.type_unsigned_int;
        self.alloc(Type::new(TypeKind::Enum {
            tag,
            underlying,
            constants: None,
        }))
    }

    pub fn complete_enum(
        &mut self,
        ty: TypeRef,
        values: Vec<EnumConstant>,
        new_underlying: TypeRef,
        location: SourceLocation,
    ) -> Result<()> {
        match &mut self.types[ty.index()].kind {
            TypeKind::Enum {
                constants: Some(_),
                tag,
                ..
            } => Err(Error::malformed(
                location,
                format!(
                    "redefinition of 'enum {}'",
                    tag.map(|t| t.as_str().to_string()).unwrap_or_default()
                ),
            )),
            TypeKind::Enum {
                constants,
                underlying,
                ..
            } => {
                *constants = Some(values);
                *underlying = new_underlying;
                Ok(())
            }
            _ => Err(Error::internal("complete_enum on a non-enum type")),
        }
    }

    // ============================================================
    // Queries
    // ============================================================

    /// Strip top-level qualifiers
    pub fn unqualified(&self, r: TypeRef) -> TypeRef {
        match self.kind(r) {
            TypeKind::Qualified { base, .. } => *base,
            _ => r,
        }
    }

    pub fn qualifiers(&self, r: TypeRef) -> TypeQualifiers {
        match self.kind(r) {
            TypeKind::Qualified { qualifiers, .. } => *qualifiers,
            _ => TypeQualifiers::empty(),
        }
    }

    /// Kind after stripping qualifiers
    pub fn base_kind(&self, r: TypeRef) -> &TypeKind {
        self.kind(self.unqualified(r))
    }

    /// The integer type standing for `r` in arithmetic: enums become their underlying type.
    pub fn arithmetic_base(&self, r: TypeRef) -> TypeRef {
        let r = self.unqualified(r);
        match self.kind(r) {
            TypeKind::Enum { underlying, .. } => *underlying,
            _ => r,
        }
    }

    pub fn is_integer(&self, r: TypeRef) -> bool {
        self.kind(self.arithmetic_base(r)).is_basic_integer()
    }

    pub fn is_floating(&self, r: TypeRef) -> bool {
        self.base_kind(r).is_floating()
    }

    pub fn is_arithmetic(&self, r: TypeRef) -> bool {
        self.is_integer(r) || self.is_floating(r)
    }

    pub fn is_pointer(&self, r: TypeRef) -> bool {
        matches!(self.base_kind(r), TypeKind::Pointer { .. })
    }

    pub fn is_scalar(&self, r: TypeRef) -> bool {
        self.is_arithmetic(r) || self.is_pointer(r)
    }

    pub fn is_void(&self, r: TypeRef) -> bool {
        matches!(self.base_kind(r), TypeKind::Void)
    }

    pub fn is_function(&self, r: TypeRef) -> bool {
        matches!(self.base_kind(r), TypeKind::Function { .. })
    }

    pub fn is_array(&self, r: TypeRef) -> bool {
        matches!(self.base_kind(r), TypeKind::Array { .. })
    }

    pub fn is_record(&self, r: TypeRef) -> bool {
        matches!(self.base_kind(r), TypeKind::Record { .. })
    }

    pub fn is_unsigned(&self, r: TypeRef) -> bool {
        self.kind(self.arithmetic_base(r)).is_unsigned_integer()
    }

    /// Integer conversion rank, `None` for non-integer types
    pub fn rank(&self, r: TypeRef) -> Option<u8> {
        self.kind(self.arithmetic_base(r)).rank()
    }

    pub fn pointee(&self, r: TypeRef) -> Option<TypeRef> {
        match self.base_kind(r) {
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    /// A type is complete when its size is known.
    pub fn is_complete(&self, r: TypeRef) -> bool {
        match self.base_kind(r) {
            TypeKind::Void | TypeKind::Function { .. } => false,
            TypeKind::Array { element, size } => {
                matches!(size, ArraySize::Bounded(_) | ArraySize::Vla) && self.is_complete(*element)
            }
            TypeKind::Record { definition, .. } => definition.is_some(),
            TypeKind::Enum { constants, .. } => constants.is_some(),
            _ => true,
        }
    }

    /// Unsigned counterpart of an integer type
    pub fn unsigned_of(&self, r: TypeRef) -> TypeRef {
        match self.kind(self.arithmetic_base(r)) {
            TypeKind::Char | TypeKind::SignedChar => self.type_unsigned_char,
            TypeKind::Short => self.type_unsigned_short,
            TypeKind::Int => self.type_unsigned_int,
            TypeKind::Long => self.type_unsigned_long,
            TypeKind::LongLong => self.type_unsigned_long_long,
            _ => self.arithmetic_base(r),
        }
    }

    /// Structural identity. Interning makes derived types canonical, so this reduces
    /// to identity for everything except nominal record and enum types.
    pub fn same(&self, a: TypeRef, b: TypeRef) -> bool {
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (
                TypeKind::Qualified {
                    base: ba,
                    qualifiers: qa,
                },
                TypeKind::Qualified {
                    base: bb,
                    qualifiers: qb,
                },
            ) => qa == qb && self.same(*ba, *bb),
            (TypeKind::Pointer { pointee: pa }, TypeKind::Pointer { pointee: pb }) => self.same(*pa, *pb),
            (
                TypeKind::Array {
                    element: ea,
                    size: sa,
                },
                TypeKind::Array {
                    element: eb,
                    size: sb,
                },
            ) => sa == sb && self.same(*ea, *eb),
            (
                TypeKind::Function {
                    return_type: ra,
                    params: pa,
                    is_variadic: va,
                    has_prototype: ha,
                },
                TypeKind::Function {
                    return_type: rb,
                    params: pb,
                    is_variadic: vb,
                    has_prototype: hb,
                },
            ) => {
                va == vb
                    && ha == hb
                    && pa.len() == pb.len()
                    && self.same(*ra, *rb)
                    && pa.iter().zip(pb).all(|(x, y)| self.same(x.ty, y.ty))
            }
            (ka, kb) => ka.basic_name().is_some() && ka == kb,
        }
    }

    /// Type compatibility (C11 6.2.7), weaker than [`same`](Self::same): an enum is
    /// compatible with its underlying type, an array of unknown size with any size.
    pub fn compatible(&self, a: TypeRef, b: TypeRef) -> bool {
        if self.same(a, b) {
            return true;
        }
        if self.qualifiers(a) != self.qualifiers(b) {
            return false;
        }
        let (ua, ub) = (self.unqualified(a), self.unqualified(b));
        match (self.kind(ua), self.kind(ub)) {
            (TypeKind::Enum { underlying, .. }, other) if other.is_basic_integer() => self.same(*underlying, ub),
            (other, TypeKind::Enum { underlying, .. }) if other.is_basic_integer() => self.same(*underlying, ua),
            (TypeKind::Pointer { pointee: pa }, TypeKind::Pointer { pointee: pb }) => self.compatible(*pa, *pb),
            (
                TypeKind::Array {
                    element: ea,
                    size: sa,
                },
                TypeKind::Array {
                    element: eb,
                    size: sb,
                },
            ) => {
                let sizes_agree = match (sa, sb) {
                    (ArraySize::Bounded(x), ArraySize::Bounded(y)) => x == y,
                    _ => true,
                };
                sizes_agree && self.compatible(*ea, *eb)
            }
            (
                TypeKind::Function {
                    return_type: ra,
                    params: pa,
                    is_variadic: va,
                    has_prototype: ha,
                },
                TypeKind::Function {
                    return_type: rb,
                    params: pb,
                    is_variadic: vb,
                    has_prototype: hb,
                },
            ) => {
                if !self.compatible(*ra, *rb) {
                    return false;
                }
                if !(*ha && *hb) {
                    return true;
                }
                va == vb
                    && pa.len() == pb.len()
                    && pa
                        .iter()
                        .zip(pb)
                        .all(|(x, y)| self.compatible(self.unqualified(x.ty), self.unqualified(y.ty)))
            }
            _ => false,
        }
    }

    /// Composite type of two compatible types (C11 6.2.7p3).
    pub fn composite(&mut self, a: TypeRef, b: TypeRef, location: SourceLocation) -> Result<TypeRef> {
        if !self.compatible(a, b) {
            return Err(Error::malformed(
                location,
                format!(
                    "conflicting types '{}' and '{}'",
                    self.display(a),
                    self.display(b)
                ),
            ));
        }
        if self.same(a, b) {
            return Ok(a);
        }

        let qualifiers = self.qualifiers(a);
        let (ua, ub) = (self.unqualified(a), self.unqualified(b));
        let composite = match (self.kind(ua).clone(), self.kind(ub).clone()) {
            (TypeKind::Pointer { pointee: pa }, TypeKind::Pointer { pointee: pb }) => {
                let pointee = self.composite(pa, pb, location)?;
                self.pointer_to(pointee)
            }
            (
                TypeKind::Array {
                    element: ea,
                    size: sa,
                },
                TypeKind::Array {
                    element: eb,
                    size: sb,
                },
            ) => {
                let element = self.composite(ea, eb, location)?;
                let size = match (sa, sb) {
                    (ArraySize::Bounded(n), _) | (_, ArraySize::Bounded(n)) => ArraySize::Bounded(n),
                    (ArraySize::Vla, _) | (_, ArraySize::Vla) => ArraySize::Vla,
                    _ => ArraySize::Unbounded,
                };
                self.array_of(element, size)
            }
            (
                TypeKind::Function {
                    return_type: ra,
                    params: pa,
                    is_variadic,
                    has_prototype: ha,
                },
                TypeKind::Function {
                    return_type: rb,
                    params: pb,
                    has_prototype: hb,
                    ..
                },
            ) => {
                let return_type = self.composite(ra, rb, location)?;
                match (ha, hb) {
                    (true, true) => {
                        let mut params = Vec::with_capacity(pa.len());
                        for (x, y) in pa.iter().zip(&pb) {
                            let ty = self.composite(self.unqualified(x.ty), self.unqualified(y.ty), location)?;
                            params.push(FunctionParameter {
                                name: x.name.or(y.name),
                                ty,
                            });
                        }
                        self.function_type(return_type, params, is_variadic, true)
                    }
                    (true, false) => self.function_type(return_type, pa, is_variadic, true),
                    (false, true) => return Ok(b),
                    (false, false) => self.function_type(return_type, Vec::new(), false, false),
                }
            }
            // enum against its underlying integer type
            (TypeKind::Enum { .. }, _) => ua,
            (_, TypeKind::Enum { .. }) => ub,
            _ => ua,
        };
        Ok(self.qualified(composite, qualifiers))
    }

    // ============================================================
    // Layout
    // ============================================================

    /// Compute (once) and return the layout of a complete object type.
    pub fn layout(&mut self, r: TypeRef) -> Result<&TypeLayout> {
        if self.get(r).layout.is_none() {
            if !self.layout_in_progress.insert(r) {
                return Err(Error::malformed(None, format!("type '{}' contains itself", self.display(r))));
            }
            let computed = self.compute_layout(r);
            self.layout_in_progress.remove(&r);
            self.types[r.index()].layout = Some(computed?);
        }
        self.get(r)
            .layout
            .as_ref()
            .ok_or_else(|| Error::internal("layout missing after computation"))
    }

    pub fn size_of(&mut self, r: TypeRef) -> Result<u64> {
        Ok(self.layout(r)?.size)
    }

    pub fn align_of(&mut self, r: TypeRef) -> Result<u32> {
        Ok(self.layout(r)?.alignment)
    }

    fn compute_layout(&mut self, r: TypeRef) -> Result<TypeLayout> {
        let kind = self.kind(r).clone();
        if let Some((size, alignment)) = kind.scalar_layout() {
            return Ok(TypeLayout {
                size,
                alignment,
                kind: LayoutKind::Scalar,
            });
        }

        match kind {
            TypeKind::Qualified { base, .. } => self.layout(base).cloned(),
            TypeKind::Enum {
                underlying,
                constants: Some(_),
                ..
            } => {
                let mut layout = self.layout(underlying)?.clone();
                layout.kind = LayoutKind::Scalar;
                Ok(layout)
            }
            TypeKind::Array {
                element,
                size: ArraySize::Bounded(len),
            } => {
                let element_layout = self.layout(element)?;
                let (element_size, alignment) = (element_layout.size, element_layout.alignment);
                let size = element_size
                    .checked_mul(len)
                    .ok_or_else(|| Error::out_of_bounds(None, "array size is too large"))?;
                Ok(TypeLayout {
                    size,
                    alignment,
                    kind: LayoutKind::Array { element, len },
                })
            }
            TypeKind::Array {
                size: ArraySize::Vla, ..
            } => Err(Error::not_implemented(None, "variable length arrays are not implemented")),
            TypeKind::Record {
                is_union,
                definition: Some(definition),
                ..
            } => self.record_layout(&definition.fields, is_union),
            _ => Err(Error::malformed(
                None,
                format!("incomplete type '{}' has no size", self.display(r)),
            )),
        }
    }

    /// Lay out a record. Consecutive bit-fields of the same declared type share a storage
    /// unit while they fit; a bit-field that would straddle the unit opens a new one and a
    /// zero-width bit-field closes the current one.
    fn record_layout(&mut self, fields: &[RecordField], is_union: bool) -> Result<TypeLayout> {
        struct OpenUnit {
            index: usize,
            ty: TypeRef,
            capacity: u32,
            used: u32,
        }

        let mut field_layouts = Vec::with_capacity(fields.len());
        let mut units: Vec<StorageUnit> = Vec::new();
        let mut offset: u64 = 0;
        let mut size: u64 = 0;
        let mut alignment: u32 = 1;
        let mut open: Option<OpenUnit> = None;

        for (i, field) in fields.iter().enumerate() {
            let is_last = i + 1 == fields.len();
            let flexible_element = match self.base_kind(field.ty) {
                TypeKind::Array {
                    element,
                    size: ArraySize::Unbounded,
                } if is_last && !is_union => Some(*element),
                _ => None,
            };
            let (field_size, natural_alignment) = match flexible_element {
                // flexible array member
                Some(element) => (0, self.align_of(element)?),
                None => {
                    let layout = self.layout(field.ty)?;
                    (layout.size, layout.alignment)
                }
            };
            let field_alignment = natural_alignment.max(field.alignment.unwrap_or(1));

            if let Some(width) = field.bit_width {
                let storage = self.arithmetic_base(field.ty);
                let capacity = (field_size * 8) as u32;
                if width == 0 {
                    open = None;
                    field_layouts.push(FieldLayout {
                        offset,
                        unit: None,
                        bit_field: Some(BitFieldLayout { bit_offset: 0, width: 0 }),
                    });
                    continue;
                }

                if !is_union {
                    if let Some(unit) = open.as_mut().filter(|u| u.ty == storage && u.used + width <= u.capacity) {
                        let bit_offset = unit.used;
                        unit.used += width;
                        if field.name.is_some() {
                            units[unit.index].named = true;
                        }
                        field_layouts.push(FieldLayout {
                            offset: units[unit.index].offset,
                            unit: Some(unit.index),
                            bit_field: Some(BitFieldLayout { bit_offset, width }),
                        });
                        continue;
                    }
                }

                let unit_offset = if is_union { 0 } else { align_up(offset, field_alignment) };
                units.push(StorageUnit {
                    ty: storage,
                    offset: unit_offset,
                    alignment: field_alignment,
                    named: field.name.is_some(),
                });
                let index = units.len() - 1;
                open = Some(OpenUnit {
                    index,
                    ty: storage,
                    capacity,
                    used: width,
                });
                field_layouts.push(FieldLayout {
                    offset: unit_offset,
                    unit: Some(index),
                    bit_field: Some(BitFieldLayout { bit_offset: 0, width }),
                });
                offset = unit_offset + field_size;
            } else {
                open = None;
                let field_offset = if is_union { 0 } else { align_up(offset, field_alignment) };
                units.push(StorageUnit {
                    ty: field.ty,
                    offset: field_offset,
                    alignment: field_alignment,
                    named: true,
                });
                field_layouts.push(FieldLayout {
                    offset: field_offset,
                    unit: Some(units.len() - 1),
                    bit_field: None,
                });
                offset = field_offset + field_size;
            }

            alignment = alignment.max(field_alignment);
            size = size.max(offset);
        }

        Ok(TypeLayout {
            size: align_up(size, alignment),
            alignment,
            kind: LayoutKind::Record {
                fields: field_layouts,
                units,
                is_union,
            },
        })
    }

    /// Find a member by name, descending into anonymous struct/union members.
    /// Returns the path of field indices from the outer record and the member type.
    pub fn find_member(&self, record: TypeRef, name: Symbol) -> Option<(Vec<usize>, TypeRef)> {
        let TypeKind::Record {
            definition: Some(definition),
            ..
        } = self.base_kind(record)
        else {
            return None;
        };

        if let Some(index) = definition.field_index(name) {
            return Some((vec![index], definition.fields[index].ty));
        }

        definition
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name.is_none() && f.bit_width.is_none())
            .find_map(|(i, f)| {
                let (mut path, ty) = self.find_member(f.ty, name)?;
                path.insert(0, i);
                Some((path, ty))
            })
    }

    /// Human-readable spelling of a type, for diagnostics and dumps.
    pub fn display(&self, r: TypeRef) -> String {
        match self.kind(r) {
            TypeKind::Qualified { base, qualifiers } => format!("{} {}", qualifiers, self.display(*base)),
            TypeKind::Pointer { pointee } => format!("{} *", self.display(*pointee)),
            TypeKind::Array { element, size } => match size {
                ArraySize::Bounded(n) => format!("{} [{}]", self.display(*element), n),
                ArraySize::Unbounded => format!("{} []", self.display(*element)),
                ArraySize::Vla => format!("{} [*]", self.display(*element)),
            },
            TypeKind::Record { tag, is_union, .. } => format!(
                "{} {}",
                if *is_union { "union" } else { "struct" },
                tag.map(|t| t.as_str().to_string()).unwrap_or_else(|| "<anonymous>".to_string())
            ),
            TypeKind::Enum { tag, .. } => format!(
                "enum {}",
                tag.map(|t| t.as_str().to_string()).unwrap_or_else(|| "<anonymous>".to_string())
            ),
            TypeKind::Function {
                return_type,
                params,
                is_variadic,
                has_prototype,
            } => {
                let mut parts: Vec<String> = params.iter().map(|p| self.display(p.ty)).collect();
                if *is_variadic {
                    parts.push("...".to_string());
                }
                if parts.is_empty() && *has_prototype {
                    parts.push("void".to_string());
                }
                format!("{} ({})", self.display(*return_type), parts.join(", "))
            }
            other => other.basic_name().unwrap_or("?").to_string(),
        }
    }
}

pub(crate) fn align_up(value: u64, alignment: u32) -> u64 {
    let alignment = u64::from(alignment.max(1));
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: TypeRef, bit_width: Option<u32>) -> RecordField {
        RecordField {
            name: Some(Symbol::new(name)),
            ty,
            bit_width,
            alignment: None,
            location: SourceLocation::builtin(),
        }
    }

    #[test]
    fn test_interning() {
        let mut reg = TypeRegistry::new();
        let p1 = reg.pointer_to(reg.type_int);
        let p2 = reg.pointer_to(reg.type_int);
        assert_eq!(p1, p2);
        let c1 = reg.qualified(reg.type_int, TypeQualifiers::CONST);
        let c2 = reg.qualified(c1, TypeQualifiers::VOLATILE);
        let c3 = reg.qualified(reg.type_int, TypeQualifiers::CONST | TypeQualifiers::VOLATILE);
        assert_eq!(c2, c3);
        assert_eq!(reg.display(c3), "const volatile int");
    }

    #[test]
    fn test_enum_compatible_not_same() {
        let mut reg = TypeRegistry::new();
        let e = reg.declare_enum(Some(Symbol::new("color")));
        let int = reg.type_unsigned_int;
        reg.complete_enum(e, Vec::new(), int, SourceLocation::builtin()).unwrap();
        assert!(!reg.same(e, int));
        assert!(reg.compatible(e, int));
        assert!(reg.compatible(int, e));
        assert!(!reg.compatible(e, reg.type_long));
    }

    #[test]
    fn test_array_composite() {
        let mut reg = TypeRegistry::new();
        let unbounded = reg.array_of(reg.type_int, ArraySize::Unbounded);
        let bounded = reg.array_of(reg.type_int, ArraySize::Bounded(4));
        let other = reg.array_of(reg.type_int, ArraySize::Bounded(5));
        assert!(reg.compatible(unbounded, bounded));
        assert!(!reg.compatible(bounded, other));
        let composite = reg.composite(unbounded, bounded, SourceLocation::builtin()).unwrap();
        assert_eq!(composite, bounded);
        assert!(reg.composite(bounded, other, SourceLocation::builtin()).is_err());
    }

    #[test]
    fn test_struct_layout() {
        let mut reg = TypeRegistry::new();
        let s = reg.declare_record(Some(Symbol::new("s")), false);
        let fields = vec![field("c", reg.type_char, None), field("l", reg.type_long, None), field("i", reg.type_int, None)];
        reg.complete_record(s, fields, SourceLocation::builtin()).unwrap();
        let layout = reg.layout(s).unwrap().clone();
        assert_eq!(layout.size, 24);
        assert_eq!(layout.alignment, 8);
        let LayoutKind::Record { fields, .. } = layout.kind else {
            panic!("expected record layout");
        };
        let offsets: Vec<u64> = fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
    }

    #[test]
    fn test_bit_field_packing() {
        let mut reg = TypeRegistry::new();
        let s = reg.declare_record(None, false);
        let int = reg.type_int;
        let unnamed = RecordField {
            name: None,
            ty: int,
            bit_width: Some(0),
            alignment: None,
            location: SourceLocation::builtin(),
        };
        let fields = vec![
            field("a", int, Some(3)),
            field("b", int, Some(29)),
            field("c", int, Some(1)),
            unnamed,
            field("d", int, Some(2)),
        ];
        reg.complete_record(s, fields, SourceLocation::builtin()).unwrap();
        let layout = reg.layout(s).unwrap().clone();
        assert_eq!(layout.size, 12);
        let LayoutKind::Record { fields, units, .. } = layout.kind else {
            panic!("expected record layout");
        };
        assert_eq!(units.len(), 3);
        assert_eq!(fields[1].bit_field, Some(BitFieldLayout { bit_offset: 3, width: 29 }));
        assert_eq!(fields[2].unit, Some(1));
        assert_eq!(fields[3].unit, None);
        assert_eq!(fields[4].unit, Some(2));
        assert_eq!(fields[4].offset, 8);
    }

    #[test]
    fn test_incomplete_layout_fails() {
        let mut reg = TypeRegistry::new();
        let s = reg.declare_record(Some(Symbol::new("fwd")), false);
        assert!(!reg.is_complete(s));
        assert!(reg.size_of(s).is_err());
        let vla = reg.array_of(reg.type_int, ArraySize::Vla);
        assert_eq!(reg.size_of(vla).unwrap_err().kind, crate::error::ErrorKind::NotImplemented);
    }
}
