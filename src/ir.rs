//! IR layout contract handed to code generation.
//!
//! The module owns every descriptor produced for a translation unit: the shared
//! static and thread-local descriptors, one descriptor per complete external object,
//! and one descriptor of automatic storage per defined function.

use std::fmt;

use indexmap::IndexMap;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use crate::error::Result;
use crate::semantic::AnalyzedUnit;
use crate::source::SourceLocation;

pub mod layout;
pub mod type_translator;
pub mod types;

pub use layout::{translate_local_scope, GlobalScopeLayout, IrSlot, LocalScopeLayout};
pub use type_translator::{IrFieldEntry, IrTypeTranslator};
pub use types::{IrType, IrTypeCode, IrTypeEntry, IrTypeId};

/// Storage record of a defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrFunctionLayout {
    pub name: Symbol,
    /// Descriptor of the function's automatic objects
    pub locals: IrTypeId,
    pub location: SourceLocation,
}

/// Append-only owner of IR type descriptors and function layouts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrModule {
    types: Vec<IrType>,
    pub functions: IndexMap<Symbol, IrFunctionLayout>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new, empty descriptor.
    pub fn new_type(&mut self) -> IrTypeId {
        self.types.push(IrType::new());
        IrTypeId::from_index(self.types.len() - 1)
    }

    pub fn get_type(&self, id: IrTypeId) -> &IrType {
        &self.types[id.index()]
    }

    pub fn get_type_mut(&mut self, id: IrTypeId) -> &mut IrType {
        &mut self.types[id.index()]
    }

    pub fn types(&self) -> impl Iterator<Item = (IrTypeId, &IrType)> {
        self.types.iter().enumerate().map(|(i, ty)| (IrTypeId::from_index(i), ty))
    }

    pub fn declare_function(&mut self, function: IrFunctionLayout) {
        self.functions.insert(function.name, function);
    }

    /// Check the entry-count invariant of every descriptor.
    pub fn validate(&self) -> Result<()> {
        self.types.iter().try_for_each(IrType::validate)
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, ty) in self.types() {
            writeln!(f, "{}:", id)?;
            for line in ty.to_string().lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        for function in self.functions.values() {
            writeln!(f, "function {}: locals {}", function.name, function.locals)?;
        }
        Ok(())
    }
}

/// Result of laying out a whole translation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedUnit {
    pub module: IrModule,
    pub globals: GlobalScopeLayout,
    pub functions: Vec<LocalScopeLayout>,
}

/// Translate the objects of an analyzed unit into IR descriptors.
pub fn translate(unit: &mut AnalyzedUnit) -> Result<TranslatedUnit> {
    let mut module = IrModule::new();
    let mut globals = GlobalScopeLayout::translate(&mut module, &mut unit.registry, &unit.symbols)?;

    let mut functions = Vec::with_capacity(unit.info.functions.len());
    for function in &unit.info.functions {
        let layout = translate_local_scope(&mut module, &mut unit.registry, &unit.symbols, &mut globals, function)?;
        module.declare_function(IrFunctionLayout {
            name: function.name,
            locals: layout.locals,
            location: function.location,
        });
        functions.push(layout);
    }

    module.validate()?;
    debug!(
        "translated unit: {} descriptors, {} functions",
        module.types.len(),
        functions.len()
    );
    Ok(TranslatedUnit {
        module,
        globals,
        functions,
    })
}
