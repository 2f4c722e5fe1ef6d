//! Object type to IR descriptor translation.

use log::trace;

use super::types::{IrType, IrTypeCode, IrTypeEntry};
use crate::error::{Error, Result};
use crate::semantic::types::{ArraySize, BitFieldLayout, LayoutKind, StorageUnit, TypeKind, TypeRef};
use crate::semantic::TypeRegistry;
use crate::source::SourceLocation;

/// Where one declared record field landed inside a translated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrFieldEntry {
    /// Index of the storage unit's entry in the descriptor
    pub entry: usize,
    pub bit_field: Option<BitFieldLayout>,
}

/// Appends IR subtrees for C object types.
///
/// Qualifiers are erased, enumerations become their underlying integer type and
/// records are emitted one entry per storage unit, so consecutive bit-fields share
/// a single scalar entry and units holding only unnamed bit-fields become padding.
pub struct IrTypeTranslator<'r> {
    registry: &'r mut TypeRegistry,
}

impl<'r> IrTypeTranslator<'r> {
    pub fn new(registry: &'r mut TypeRegistry) -> Self {
        IrTypeTranslator { registry }
    }

    /// Complete types, and arrays of unknown bound over a complete element type.
    pub fn is_translatable(&self, ty: TypeRef) -> bool {
        match self.registry.base_kind(ty) {
            &TypeKind::Array {
                element,
                size: ArraySize::Unbounded,
            } => self.registry.is_complete(element),
            _ => self.registry.is_complete(ty),
        }
    }

    /// Append the subtree of `ty` to `out` and return the index of its root entry.
    pub fn translate_object_type(
        &mut self,
        ty: TypeRef,
        alignment: Option<u32>,
        out: &mut IrType,
        location: SourceLocation,
    ) -> Result<usize> {
        self.translate(ty, alignment.unwrap_or(0), out, location)
    }

    fn translate(&mut self, ty: TypeRef, alignment: u32, out: &mut IrType, location: SourceLocation) -> Result<usize> {
        let code = match self.registry.kind(ty) {
            TypeKind::Bool => IrTypeCode::Bool,
            TypeKind::Char | TypeKind::SignedChar | TypeKind::UnsignedChar => IrTypeCode::Char,
            TypeKind::Short | TypeKind::UnsignedShort => IrTypeCode::Short,
            TypeKind::Int | TypeKind::UnsignedInt => IrTypeCode::Int,
            TypeKind::Long | TypeKind::UnsignedLong | TypeKind::LongLong | TypeKind::UnsignedLongLong => {
                IrTypeCode::Long
            }
            TypeKind::Float => IrTypeCode::Float32,
            TypeKind::Double => IrTypeCode::Float64,
            TypeKind::LongDouble => IrTypeCode::LongDouble,
            TypeKind::Pointer { .. } => IrTypeCode::Word,
            &TypeKind::Qualified { base, .. } => return self.translate(base, alignment, out, location),
            &TypeKind::Enum {
                underlying,
                constants: Some(_),
                ..
            } => return self.translate(underlying, alignment, out, location),
            &TypeKind::Array { element, size } => {
                let len = match size {
                    ArraySize::Bounded(len) => len,
                    ArraySize::Unbounded => 0,
                    ArraySize::Vla => {
                        return Err(Error::not_implemented(
                            location,
                            "variable length arrays are not implemented",
                        ))
                    }
                };
                let root = out.push(IrTypeEntry::new(IrTypeCode::Array, alignment, len));
                self.translate(element, 0, out, location)?;
                return Ok(root);
            }
            &TypeKind::Record {
                is_union,
                definition: Some(_),
                ..
            } => return self.translate_record(ty, is_union, alignment, out, location),
            TypeKind::Function { .. } => {
                return Err(Error::malformed(
                    location,
                    format!("function type '{}' cannot be used as object storage", self.registry.display(ty)),
                ))
            }
            TypeKind::Void => return Err(Error::malformed(location, "'void' cannot be used as object storage")),
            TypeKind::Record { definition: None, .. } | TypeKind::Enum { constants: None, .. } => {
                return Err(Error::malformed(
                    location,
                    format!("incomplete type '{}' cannot be used as object storage", self.registry.display(ty)),
                ))
            }
        };
        Ok(out.push(IrTypeEntry::scalar(code, alignment)))
    }

    fn translate_record(
        &mut self,
        ty: TypeRef,
        is_union: bool,
        alignment: u32,
        out: &mut IrType,
        location: SourceLocation,
    ) -> Result<usize> {
        let (units, requested) = self.record_units(ty)?;
        let code = if is_union { IrTypeCode::Union } else { IrTypeCode::Struct };
        trace!("translate_record: {} -> {} units", self.registry.display(ty), units.len());

        let root = out.push(IrTypeEntry::new(code, alignment, units.len() as u64));
        for (unit, requested) in units.iter().zip(requested) {
            if unit.named {
                self.translate(unit.ty, requested, out, location)?;
            } else {
                let size = self.registry.size_of(unit.ty)?;
                out.push(IrTypeEntry::new(IrTypeCode::Pad, unit.alignment, size));
            }
        }
        Ok(root)
    }

    /// Storage units of a complete record plus the explicit alignment requested for each.
    fn record_units(&mut self, ty: TypeRef) -> Result<(Vec<StorageUnit>, Vec<u32>)> {
        let explicit: Vec<Option<u32>> = match self.registry.kind(ty) {
            TypeKind::Record {
                definition: Some(definition),
                ..
            } => definition.fields.iter().map(|f| f.alignment).collect(),
            _ => return Err(Error::internal("record translation of a non-record type")),
        };
        let LayoutKind::Record { fields, units, .. } = &self.registry.layout(ty)?.kind else {
            return Err(Error::internal("complete record without a record layout"));
        };

        let mut requested = vec![0u32; units.len()];
        for (field, alignment) in fields.iter().zip(explicit) {
            if let (Some(unit), Some(alignment)) = (field.unit, alignment) {
                if let Some(slot) = requested.get_mut(unit) {
                    *slot = (*slot).max(alignment);
                }
            }
        }
        Ok((units.clone(), requested))
    }

    /// Map each declared field of `record` (translated at `root` in `ir`) to its entry.
    /// Zero-width bit-fields map to `None`.
    pub fn field_entries(&mut self, record: TypeRef, root: usize, ir: &IrType) -> Result<Vec<Option<IrFieldEntry>>> {
        let record = self.registry.unqualified(record);
        let LayoutKind::Record { fields, units, .. } = &self.registry.layout(record)?.kind else {
            return Err(Error::internal("field lookup on a type without record layout"));
        };
        let header = ir
            .get(root)
            .filter(|e| matches!(e.code, IrTypeCode::Struct | IrTypeCode::Union) && e.param == units.len() as u64)
            .ok_or_else(|| Error::internal(format!("IR entry {} does not hold the translated record", root)))?;
        trace!("field_entries: record entry {} with {} units", root, header.param);

        let mut unit_entries = Vec::with_capacity(units.len());
        let mut next = root + 1;
        for _ in 0..units.len() {
            unit_entries.push(next);
            next = ir.subtree_end(next)?;
        }
        Ok(fields
            .iter()
            .map(|field| {
                field.unit.and_then(|unit| unit_entries.get(unit)).map(|&entry| IrFieldEntry {
                    entry,
                    bit_field: field.bit_field,
                })
            })
            .collect())
    }
}
