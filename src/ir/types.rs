//! Flat IR type descriptors.
//!
//! A descriptor is a preorder linearization of one or more C object types. Aggregate
//! entries announce how many subtrees follow them: a STRUCT or UNION entry is followed
//! by exactly `param` member subtrees, an ARRAY entry by exactly one element subtree
//! (logically repeated `param` times). Consumers walk the entries with a single
//! pending-subtree counter and never need pointers.

use std::fmt;
use std::num::NonZeroU32;

use serde::Serialize;

use crate::error::{Error, Result};

/// Reference to a descriptor owned by an [`IrModule`](super::IrModule).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IrTypeId(NonZeroU32);

impl IrTypeId {
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(IrTypeId)
    }

    pub(crate) fn from_index(index: usize) -> Self {
        IrTypeId(NonZeroU32::MIN.saturating_add(index as u32))
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for IrTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type{}", self.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IrTypeCode {
    Struct,
    Union,
    Array,
    /// Explicit padding of `param` bytes
    Pad,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float32,
    Float64,
    LongDouble,
    /// Pointer-sized machine word
    Word,
}

impl IrTypeCode {
    pub fn is_aggregate(self) -> bool {
        matches!(self, IrTypeCode::Struct | IrTypeCode::Union | IrTypeCode::Array)
    }

    pub fn name(self) -> &'static str {
        match self {
            IrTypeCode::Struct => "struct",
            IrTypeCode::Union => "union",
            IrTypeCode::Array => "array",
            IrTypeCode::Pad => "pad",
            IrTypeCode::Bool => "bool",
            IrTypeCode::Char => "char",
            IrTypeCode::Short => "short",
            IrTypeCode::Int => "int",
            IrTypeCode::Long => "long",
            IrTypeCode::Float32 => "float32",
            IrTypeCode::Float64 => "float64",
            IrTypeCode::LongDouble => "long_double",
            IrTypeCode::Word => "word",
        }
    }
}

/// One entry of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrTypeEntry {
    pub code: IrTypeCode,
    /// Requested alignment; 0 means the natural alignment of `code`
    pub alignment: u32,
    /// Member count (STRUCT/UNION), element count (ARRAY), byte count (PAD)
    pub param: u64,
}

impl IrTypeEntry {
    pub fn new(code: IrTypeCode, alignment: u32, param: u64) -> Self {
        IrTypeEntry { code, alignment, param }
    }

    pub fn scalar(code: IrTypeCode, alignment: u32) -> Self {
        Self::new(code, alignment, 0)
    }

    /// Number of subtrees immediately subordinate to this entry.
    pub fn subtree_count(&self) -> u64 {
        match self.code {
            IrTypeCode::Struct | IrTypeCode::Union => self.param,
            IrTypeCode::Array => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for IrTypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code.name())?;
        if self.code.is_aggregate() || self.code == IrTypeCode::Pad {
            write!(f, "({})", self.param)?;
        }
        if self.alignment != 0 {
            write!(f, " align {}", self.alignment)?;
        }
        Ok(())
    }
}

/// Append-only descriptor: a sequence of top-level subtrees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IrType {
    entries: Vec<IrTypeEntry>,
}

impl IrType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry, returning its index.
    pub fn push(&mut self, entry: IrTypeEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IrTypeEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[IrTypeEntry] {
        &self.entries
    }

    /// Index one past the last entry of the subtree rooted at `index`.
    pub fn subtree_end(&self, index: usize) -> Result<usize> {
        let mut pending: u64 = 1;
        let mut next = index;
        while pending > 0 {
            let entry = self.entries.get(next).ok_or_else(|| {
                Error::internal(format!(
                    "IR type subtree at entry {} is truncated: {} subtrees missing after entry {}",
                    index,
                    pending,
                    next.saturating_sub(1)
                ))
            })?;
            pending = (pending - 1)
                .checked_add(entry.subtree_count())
                .ok_or_else(|| Error::internal(format!("IR type entry {} announces too many members", next)))?;
            next += 1;
        }
        Ok(next)
    }

    /// Number of entries in the subtree rooted at `index`.
    pub fn subtree_len(&self, index: usize) -> Result<usize> {
        Ok(self.subtree_end(index)? - index)
    }

    /// Root indices of the top-level subtrees, in order.
    pub fn top_level(&self) -> Result<Vec<usize>> {
        let mut roots = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            roots.push(index);
            index = self.subtree_end(index)?;
        }
        Ok(roots)
    }

    /// Check the STRUCT/UNION/ARRAY entry-count invariant over the whole descriptor.
    pub fn validate(&self) -> Result<()> {
        self.top_level().map(|_| ())
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // remaining subtrees of each open aggregate, innermost last
        let mut open: Vec<u64> = Vec::new();
        for entry in &self.entries {
            writeln!(f, "{}{}", "  ".repeat(open.len()), entry)?;
            if let Some(remaining) = open.last_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            let children = entry.subtree_count();
            if children > 0 {
                open.push(children);
            }
            while open.last() == Some(&0) {
                open.pop();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IrType {
        let mut ty = IrType::new();
        ty.push(IrTypeEntry::new(IrTypeCode::Struct, 0, 2));
        ty.push(IrTypeEntry::scalar(IrTypeCode::Int, 0));
        ty.push(IrTypeEntry::new(IrTypeCode::Array, 0, 4));
        ty.push(IrTypeEntry::scalar(IrTypeCode::Char, 0));
        ty.push(IrTypeEntry::scalar(IrTypeCode::Long, 16));
        ty
    }

    #[test]
    fn test_subtree_lengths() {
        let ty = sample();
        assert_eq!(ty.subtree_len(0).unwrap(), 4);
        assert_eq!(ty.subtree_len(2).unwrap(), 2);
        assert_eq!(ty.subtree_len(4).unwrap(), 1);
        assert_eq!(ty.top_level().unwrap(), vec![0, 4]);
        assert!(ty.validate().is_ok());
    }

    #[test]
    fn test_truncated_struct_is_internal_error() {
        let mut ty = IrType::new();
        ty.push(IrTypeEntry::new(IrTypeCode::Union, 0, 3));
        ty.push(IrTypeEntry::scalar(IrTypeCode::Int, 0));
        let err = ty.validate().unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_display_indents_members() {
        insta::assert_snapshot!(sample().to_string(), @r"
        struct(2)
          int
          array(4)
            char
        long align 16
        ");
    }
}
