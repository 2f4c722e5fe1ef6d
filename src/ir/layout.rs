//! Storage layout of declared objects at global and local scope.
//!
//! Objects with static storage duration of the whole translation unit share one
//! descriptor, thread-local ones another; each slot is the index of the object's root
//! entry in its descriptor. Automatic objects of a function live in a single
//! per-function descriptor mirroring the block tree: a block is a STRUCT of its
//! locals, followed by a UNION of its child blocks when it has any, since sibling
//! blocks are never live at the same time.

use indexmap::IndexMap;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use super::type_translator::IrTypeTranslator;
use super::types::{IrTypeCode, IrTypeEntry, IrTypeId};
use super::IrModule;
use crate::error::{Error, Result};
use crate::semantic::symbol_table::{ScopeId, ScopedIdentifier, Storage, SymbolTable};
use crate::semantic::types::TypeRef;
use crate::semantic::{FunctionInfo, TypeRegistry};
use crate::source::SourceLocation;

/// Position of an object inside a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrSlot {
    pub descriptor: IrTypeId,
    pub index: usize,
}

/// Layout of file-scope objects, plus the block-scope statics redirected into it.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalScopeLayout {
    /// Shared descriptor of every object with static storage duration
    pub static_layout: IrTypeId,
    /// Shared descriptor of every object with thread storage duration
    pub static_thread_local_layout: IrTypeId,
    /// External objects with their own descriptor; `None` while the type is incomplete
    pub external_objects: IndexMap<Symbol, Option<IrTypeId>>,
    pub external_thread_local_objects: IndexMap<Symbol, Option<IrTypeId>>,
    pub static_objects: IndexMap<Symbol, IrSlot>,
    pub static_thread_local_objects: IndexMap<Symbol, IrSlot>,
}

/// Layout of one function's objects.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalScopeLayout {
    pub function: Symbol,
    /// Descriptor of the automatic objects
    pub locals: IrTypeId,
    /// Every object declared in the function's scopes, including parameters.
    /// Block-scope statics point into the global descriptors.
    pub objects: IndexMap<(ScopeId, Symbol), IrSlot>,
}

impl LocalScopeLayout {
    pub fn slot(&self, scope: ScopeId, name: Symbol) -> Option<IrSlot> {
        self.objects.get(&(scope, name)).copied()
    }
}

struct ObjectDecl {
    name: Symbol,
    ty: TypeRef,
    storage: Storage,
    alignment: Option<u32>,
    file_scope_entity: bool,
    location: SourceLocation,
}

/// Objects of `scope` in declaration order.
fn scope_objects(symbols: &SymbolTable, scope: ScopeId) -> Vec<ObjectDecl> {
    symbols
        .scope(scope)
        .symbols
        .iter()
        .filter_map(|(&name, identifier)| match *identifier {
            ScopedIdentifier::Object {
                ty,
                storage,
                alignment,
                file_scope_entity,
                location,
                ..
            } => Some(ObjectDecl {
                name,
                ty,
                storage,
                alignment,
                file_scope_entity,
                location,
            }),
            _ => None,
        })
        .collect()
}

impl GlobalScopeLayout {
    /// Allocate the two shared descriptors.
    pub fn new(module: &mut IrModule) -> Self {
        GlobalScopeLayout {
            static_layout: module.new_type(),
            static_thread_local_layout: module.new_type(),
            external_objects: IndexMap::new(),
            external_thread_local_objects: IndexMap::new(),
            static_objects: IndexMap::new(),
            static_thread_local_objects: IndexMap::new(),
        }
    }

    /// Lay out every object of the file scope.
    pub fn translate(module: &mut IrModule, registry: &mut TypeRegistry, symbols: &SymbolTable) -> Result<Self> {
        let mut layout = Self::new(module);
        let mut translator = IrTypeTranslator::new(registry);
        for object in scope_objects(symbols, ScopeId::GLOBAL) {
            match object.storage {
                Storage::Extern | Storage::ExternThreadLocal => {
                    layout.register_external(module, &mut translator, &object)?;
                }
                Storage::Static | Storage::StaticThreadLocal | Storage::ThreadLocal => {
                    let slot = layout.append_static(module, &mut translator, &object)?;
                    let objects = if object.storage.is_thread_local() {
                        &mut layout.static_thread_local_objects
                    } else {
                        &mut layout.static_objects
                    };
                    objects.insert(object.name, slot);
                }
                Storage::Auto | Storage::Register => {
                    return Err(Error::malformed(
                        object.location,
                        format!("file-scope object '{}' cannot have automatic storage", object.name),
                    ))
                }
            }
        }
        Ok(layout)
    }

    fn register_external(
        &mut self,
        module: &mut IrModule,
        translator: &mut IrTypeTranslator<'_>,
        object: &ObjectDecl,
    ) -> Result<()> {
        let objects = if object.storage.is_thread_local() {
            &mut self.external_thread_local_objects
        } else {
            &mut self.external_objects
        };
        if let Some(Some(_)) = objects.get(&object.name) {
            return Ok(());
        }
        let descriptor = if translator.is_translatable(object.ty) {
            let descriptor = module.new_type();
            translator.translate_object_type(
                object.ty,
                object.alignment,
                module.get_type_mut(descriptor),
                object.location,
            )?;
            Some(descriptor)
        } else {
            None
        };
        debug!("external object '{}' -> {:?}", object.name, descriptor);
        objects.insert(object.name, descriptor);
        Ok(())
    }

    /// Slot of a file-scope object with internal linkage.
    pub fn static_slot(&self, name: Symbol, storage: Storage) -> Option<IrSlot> {
        let objects = if storage.is_thread_local() {
            &self.static_thread_local_objects
        } else {
            &self.static_objects
        };
        objects.get(&name).copied()
    }

    fn append_static(
        &mut self,
        module: &mut IrModule,
        translator: &mut IrTypeTranslator<'_>,
        object: &ObjectDecl,
    ) -> Result<IrSlot> {
        let descriptor = if object.storage.is_thread_local() {
            self.static_thread_local_layout
        } else {
            self.static_layout
        };
        let index = translator.translate_object_type(
            object.ty,
            object.alignment,
            module.get_type_mut(descriptor),
            object.location,
        )?;
        debug!("static object '{}' -> {} slot {}", object.name, descriptor, index);
        Ok(IrSlot { descriptor, index })
    }
}

/// Lay out the objects of one defined function.
pub fn translate_local_scope(
    module: &mut IrModule,
    registry: &mut TypeRegistry,
    symbols: &SymbolTable,
    globals: &mut GlobalScopeLayout,
    function: &FunctionInfo,
) -> Result<LocalScopeLayout> {
    let mut layout = LocalScopeLayout {
        function: function.name,
        locals: module.new_type(),
        objects: IndexMap::new(),
    };
    let mut translator = IrTypeTranslator::new(registry);
    translate_block(module, &mut translator, symbols, globals, &mut layout, function.scope)?;
    module.get_type(layout.locals).validate()?;
    debug!(
        "local layout of '{}': {} entries, {} objects",
        function.name,
        module.get_type(layout.locals).len(),
        layout.objects.len()
    );
    Ok(layout)
}

fn translate_block(
    module: &mut IrModule,
    translator: &mut IrTypeTranslator<'_>,
    symbols: &SymbolTable,
    globals: &mut GlobalScopeLayout,
    layout: &mut LocalScopeLayout,
    scope: ScopeId,
) -> Result<()> {
    let objects = scope_objects(symbols, scope);
    let children = &symbols.scope(scope).children;
    let automatic: Vec<&ObjectDecl> = objects.iter().filter(|o| o.storage.is_automatic()).collect();

    let members = automatic.len() + usize::from(!children.is_empty());
    module
        .get_type_mut(layout.locals)
        .push(IrTypeEntry::new(IrTypeCode::Struct, 0, members as u64));

    for object in &objects {
        match object.storage {
            Storage::Auto | Storage::Register => {
                let index = translator.translate_object_type(
                    object.ty,
                    object.alignment,
                    module.get_type_mut(layout.locals),
                    object.location,
                )?;
                layout.objects.insert(
                    (scope, object.name),
                    IrSlot {
                        descriptor: layout.locals,
                        index,
                    },
                );
            }
            Storage::Static | Storage::StaticThreadLocal | Storage::ThreadLocal if object.file_scope_entity => {
                let slot = globals.static_slot(object.name, object.storage).ok_or_else(|| {
                    Error::internal(format!("file-scope object '{}' has no static slot", object.name))
                })?;
                layout.objects.insert((scope, object.name), slot);
            }
            Storage::Static | Storage::StaticThreadLocal | Storage::ThreadLocal => {
                let slot = globals.append_static(module, translator, object)?;
                layout.objects.insert((scope, object.name), slot);
            }
            Storage::Extern | Storage::ExternThreadLocal => {
                globals.register_external(module, translator, object)?;
            }
        }
    }

    if !children.is_empty() {
        module
            .get_type_mut(layout.locals)
            .push(IrTypeEntry::new(IrTypeCode::Union, 0, children.len() as u64));
        for &child in children {
            translate_block(module, translator, symbols, globals, layout, child)?;
        }
    }
    Ok(())
}
