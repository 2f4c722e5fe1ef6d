//! Type system representation and utilities.
//!
//! This module defines the semantic type system used during analysis,
//! distinct from the syntactic `TypeSpecifier` constructs used in parsing.
//! Types live in the [`TypeRegistry`](super::TypeRegistry) arena and are referenced
//! through [`TypeRef`].

use std::fmt;
use std::num::NonZeroU32;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::Serialize;
use symbol_table::GlobalSymbol as Symbol;

use crate::source::SourceLocation;

/// Opaque reference to a canonical type.
/// Internally index + 1 (NonZeroU32 for niche optimization).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeRef(NonZeroU32);

impl TypeRef {
    #[inline]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(TypeRef)
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        TypeRef(NonZeroU32::MIN.saturating_add(index as u32))
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.get())
    }
}

bitflags! {
    /// Type qualifiers (C11 6.7.3)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct TypeQualifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const ATOMIC = 1 << 3;
    }
}

impl fmt::Display for TypeQualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(TypeQualifiers::CONST) {
            names.push("const");
        }
        if self.contains(TypeQualifiers::VOLATILE) {
            names.push("volatile");
        }
        if self.contains(TypeQualifiers::RESTRICT) {
            names.push("restrict");
        }
        if self.contains(TypeQualifiers::ATOMIC) {
            names.push("_Atomic");
        }
        f.write_str(&names.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySize {
    /// `T x[]`: size unknown (flexible member or external array)
    Unbounded,
    Bounded(u64),
    /// Variable length array, not supported past analysis
    Vla,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    /// `None` for unnamed bit-fields and anonymous struct/union members
    pub name: Option<Symbol>,
    pub ty: TypeRef,
    pub bit_width: Option<u32>,
    /// Explicit `_Alignas` requirement, if any
    pub alignment: Option<u32>,
    pub location: SourceLocation,
}

/// Field list of a complete struct or union with name lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDefinition {
    pub fields: Vec<RecordField>,
    index: IndexMap<Symbol, usize>,
}

impl RecordDefinition {
    pub fn new(fields: Vec<RecordField>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.name.map(|name| (name, i)))
            .collect();
        RecordDefinition { fields, index }
    }

    /// Direct (non-anonymous) member by name
    pub fn field_index(&self, name: Symbol) -> Option<usize> {
        self.index.get(&name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumConstant {
    pub name: Symbol,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionParameter {
    pub name: Option<Symbol>,
    pub ty: TypeRef,
}

/// The kind of type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    Pointer {
        pointee: TypeRef,
    },
    Array {
        element: TypeRef,
        size: ArraySize,
    },
    Record {
        tag: Option<Symbol>,
        is_union: bool,
        /// `None` while incomplete
        definition: Option<RecordDefinition>,
    },
    Enum {
        tag: Option<Symbol>,
        underlying: TypeRef,
        /// `None` while incomplete
        constants: Option<Vec<EnumConstant>>,
    },
    Function {
        return_type: TypeRef,
        params: Vec<FunctionParameter>,
        is_variadic: bool,
        has_prototype: bool,
    },
    Qualified {
        base: TypeRef,
        qualifiers: TypeQualifiers,
    },
}

impl TypeKind {
    /// Integer conversion rank (C11 6.3.1.1), `None` for non-integer kinds.
    /// Enumerations take the rank of their underlying type, resolved by the registry.
    pub fn rank(&self) -> Option<u8> {
        Some(match self {
            TypeKind::Bool => 1,
            TypeKind::Char | TypeKind::SignedChar | TypeKind::UnsignedChar => 2,
            TypeKind::Short | TypeKind::UnsignedShort => 3,
            TypeKind::Int | TypeKind::UnsignedInt => 4,
            TypeKind::Long | TypeKind::UnsignedLong => 5,
            TypeKind::LongLong | TypeKind::UnsignedLongLong => 6,
            _ => return None,
        })
    }

    /// Basic integer kinds, excluding enumerations.
    pub fn is_basic_integer(&self) -> bool {
        self.rank().is_some()
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::UnsignedChar
                | TypeKind::UnsignedShort
                | TypeKind::UnsignedInt
                | TypeKind::UnsignedLong
                | TypeKind::UnsignedLongLong
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, TypeKind::Float | TypeKind::Double | TypeKind::LongDouble)
    }

    /// (size, alignment) of scalar kinds on an LP64 target.
    pub fn scalar_layout(&self) -> Option<(u64, u32)> {
        Some(match self {
            TypeKind::Bool | TypeKind::Char | TypeKind::SignedChar | TypeKind::UnsignedChar => (1, 1),
            TypeKind::Short | TypeKind::UnsignedShort => (2, 2),
            TypeKind::Int | TypeKind::UnsignedInt | TypeKind::Float => (4, 4),
            TypeKind::Long
            | TypeKind::UnsignedLong
            | TypeKind::LongLong
            | TypeKind::UnsignedLongLong
            | TypeKind::Double
            | TypeKind::Pointer { .. } => (8, 8),
            TypeKind::LongDouble => (16, 16),
            _ => return None,
        })
    }

    pub fn basic_name(&self) -> Option<&'static str> {
        Some(match self {
            TypeKind::Void => "void",
            TypeKind::Bool => "_Bool",
            TypeKind::Char => "char",
            TypeKind::SignedChar => "signed char",
            TypeKind::UnsignedChar => "unsigned char",
            TypeKind::Short => "short",
            TypeKind::UnsignedShort => "unsigned short",
            TypeKind::Int => "int",
            TypeKind::UnsignedInt => "unsigned int",
            TypeKind::Long => "long",
            TypeKind::UnsignedLong => "unsigned long",
            TypeKind::LongLong => "long long",
            TypeKind::UnsignedLongLong => "unsigned long long",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::LongDouble => "long double",
            _ => return None,
        })
    }
}

/// Type representation (for semantic analysis)
/// invariant:
/// - layout == None until computed, and always for incomplete types
#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub layout: Option<TypeLayout>,
}

impl Type {
    pub(crate) fn new(kind: TypeKind) -> Self {
        Type { kind, layout: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeLayout {
    pub size: u64,
    pub alignment: u32,
    pub kind: LayoutKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutKind {
    Scalar,
    Array {
        element: TypeRef,
        len: u64,
    },
    Record {
        fields: Vec<FieldLayout>,
        units: Vec<StorageUnit>,
        is_union: bool,
    },
}

/// Placement of one declared field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldLayout {
    /// Byte offset of the storage unit holding the field
    pub offset: u64,
    /// Index into the record's storage units; `None` for zero-width bit-fields
    pub unit: Option<usize>,
    pub bit_field: Option<BitFieldLayout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitFieldLayout {
    pub bit_offset: u32,
    pub width: u32,
}

/// One allocated slot of a record: an ordinary member, or a bit-field storage unit
/// shared by consecutive bit-fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageUnit {
    pub ty: TypeRef,
    pub offset: u64,
    pub alignment: u32,
    /// False for units holding only unnamed bit-fields (pure padding)
    pub named: bool,
}
