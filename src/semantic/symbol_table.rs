//! Symbol table management and scope handling.
//!
//! Scopes form a tree (file -> function -> block -> nested block) stored flat in one
//! vector. A scope is closed when its block ends but is never freed: the local layout
//! engine walks the finished tree of a function to allocate automatic storage.

use std::num::NonZeroU32;

use indexmap::IndexMap;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use super::types::TypeRef;
use crate::ast::FunctionSpecifiers;
use crate::error::{Error, Result};
use crate::source::SourceLocation;

/// Scope ID for efficient scope references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(NonZeroU32);

impl ScopeId {
    pub const GLOBAL: Self = Self(NonZeroU32::MIN);

    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index as u32))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Symbol namespaces in C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Ordinary, // Variables, functions, typedefs, enum constants
    Tag,      // Struct, union, and enum tags
    Label,    // Goto labels, function-wide
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    File,
    Function,
    Block,
}

/// Storage class of an object, with linkage folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    Extern,
    ExternThreadLocal,
    Static,
    StaticThreadLocal,
    /// `_Thread_local` without `static` or `extern`
    ThreadLocal,
    Auto,
    Register,
}

impl Storage {
    pub fn is_thread_local(self) -> bool {
        matches!(
            self,
            Storage::ExternThreadLocal | Storage::StaticThreadLocal | Storage::ThreadLocal
        )
    }

    pub fn is_automatic(self) -> bool {
        matches!(self, Storage::Auto | Storage::Register)
    }
}

/// What a name in a scope is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopedIdentifier {
    Object {
        ty: TypeRef,
        storage: Storage,
        /// Effective alignment from `_Alignas`, if any
        alignment: Option<u32>,
        /// Has an initializer (or is a tentative definition at file scope)
        defined: bool,
        /// Block-scope `extern` naming an object declared at file scope
        file_scope_entity: bool,
        location: SourceLocation,
    },
    Function {
        ty: TypeRef,
        storage: Storage,
        specifiers: FunctionSpecifiers,
        defined: bool,
        location: SourceLocation,
    },
    TypeDefinition {
        ty: TypeRef,
        location: SourceLocation,
    },
    Tag {
        ty: TypeRef,
        location: SourceLocation,
    },
    /// Enumeration constant
    Constant {
        value: i64,
        ty: TypeRef,
        location: SourceLocation,
    },
}

impl ScopedIdentifier {
    pub fn location(&self) -> SourceLocation {
        match self {
            ScopedIdentifier::Object { location, .. }
            | ScopedIdentifier::Function { location, .. }
            | ScopedIdentifier::TypeDefinition { location, .. }
            | ScopedIdentifier::Tag { location, .. }
            | ScopedIdentifier::Constant { location, .. } => *location,
        }
    }

    pub fn ty(&self) -> TypeRef {
        match self {
            ScopedIdentifier::Object { ty, .. }
            | ScopedIdentifier::Function { ty, .. }
            | ScopedIdentifier::TypeDefinition { ty, .. }
            | ScopedIdentifier::Tag { ty, .. }
            | ScopedIdentifier::Constant { ty, .. } => *ty,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ScopedIdentifier::Object { .. } => "object",
            ScopedIdentifier::Function { .. } => "function",
            ScopedIdentifier::TypeDefinition { .. } => "typedef",
            ScopedIdentifier::Tag { .. } => "tag",
            ScopedIdentifier::Constant { .. } => "enumeration constant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelState {
    pub defined: bool,
    pub location: SourceLocation,
}

/// Scope information
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    /// Ordinary identifiers in declaration order
    pub symbols: IndexMap<Symbol, ScopedIdentifier>,
    /// Struct/union/enum tags
    pub tags: IndexMap<Symbol, ScopedIdentifier>,
    /// Goto labels, only populated on function scopes
    pub labels: IndexMap<Symbol, LabelState>,
    pub children: Vec<ScopeId>,
    pub level: u32,
}

/// Symbol table using flattened storage
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current_scope_id: ScopeId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::File,
                symbols: IndexMap::new(),
                tags: IndexMap::new(),
                labels: IndexMap::new(),
                children: Vec::new(),
                level: 0,
            }],
            current_scope_id: ScopeId::GLOBAL,
        }
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope_id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn is_file_scope(&self) -> bool {
        self.current_scope_id == ScopeId::GLOBAL
    }

    /// Open a child of the current scope and make it current.
    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let parent = self.current_scope_id;
        let level = self.scope(parent).level + 1;
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            symbols: IndexMap::new(),
            tags: IndexMap::new(),
            labels: IndexMap::new(),
            children: Vec::new(),
            level,
        });
        let id = ScopeId::from_index(self.scopes.len() - 1);
        self.scope_mut(parent).children.push(id);
        self.current_scope_id = id;
        debug!("push_scope: {:?} {:?} (level {})", id, kind, level);
        id
    }

    pub fn pop_scope(&mut self) -> Result<ScopeId> {
        let closed = self.current_scope_id;
        let parent = self
            .scope(closed)
            .parent
            .ok_or_else(|| Error::internal("cannot pop the file scope"))?;
        debug!("pop_scope: {:?} -> {:?}", closed, parent);
        self.current_scope_id = parent;
        Ok(closed)
    }

    /// Bind `name` in the current scope, replacing any previous binding there.
    pub fn declare(&mut self, name: Symbol, namespace: Namespace, identifier: ScopedIdentifier) {
        let scope = self.current_scope_id;
        self.declare_in(scope, name, namespace, identifier);
    }

    pub fn declare_in(&mut self, scope: ScopeId, name: Symbol, namespace: Namespace, identifier: ScopedIdentifier) {
        let scope = self.scope_mut(scope);
        match namespace {
            Namespace::Tag => {
                scope.tags.insert(name, identifier);
            }
            _ => {
                scope.symbols.insert(name, identifier);
            }
        }
    }

    /// Lookup in the current scope only
    pub fn lookup_local(&self, name: Symbol, namespace: Namespace) -> Option<&ScopedIdentifier> {
        let scope = self.scope(self.current_scope_id);
        match namespace {
            Namespace::Tag => scope.tags.get(&name),
            _ => scope.symbols.get(&name),
        }
    }

    /// Walk from the innermost scope outwards, stopping at the first hit.
    pub fn lookup(&self, name: Symbol, namespace: Namespace) -> Option<(ScopeId, &ScopedIdentifier)> {
        let mut current = Some(self.current_scope_id);
        while let Some(id) = current {
            let scope = self.scope(id);
            let found = match namespace {
                Namespace::Tag => scope.tags.get(&name),
                _ => scope.symbols.get(&name),
            };
            if let Some(identifier) = found {
                return Some((id, identifier));
            }
            current = scope.parent;
        }
        None
    }

    pub fn lookup_global(&self, name: Symbol) -> Option<&ScopedIdentifier> {
        self.scope(ScopeId::GLOBAL).symbols.get(&name)
    }

    /// Update a binding found through [`lookup`](Self::lookup).
    pub fn replace(&mut self, scope: ScopeId, name: Symbol, identifier: ScopedIdentifier) -> Result<()> {
        let slot = self
            .scope_mut(scope)
            .symbols
            .get_mut(&name)
            .ok_or_else(|| Error::internal(format!("replacing unbound identifier '{}'", name)))?;
        *slot = identifier;
        Ok(())
    }

    fn enclosing_function(&self) -> Result<ScopeId> {
        let mut current = Some(self.current_scope_id);
        while let Some(id) = current {
            let scope = self.scope(id);
            if scope.kind == ScopeKind::Function {
                return Ok(id);
            }
            current = scope.parent;
        }
        Err(Error::internal("label outside of a function"))
    }

    pub fn define_label(&mut self, name: Symbol, location: SourceLocation) -> Result<()> {
        let function = self.enclosing_function()?;
        let labels = &mut self.scope_mut(function).labels;
        match labels.get_mut(&name) {
            Some(LabelState { defined: true, .. }) => {
                Err(Error::malformed(location, format!("redefinition of label '{}'", name)))
            }
            Some(state) => {
                *state = LabelState {
                    defined: true,
                    location,
                };
                Ok(())
            }
            None => {
                labels.insert(
                    name,
                    LabelState {
                        defined: true,
                        location,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn use_label(&mut self, name: Symbol, location: SourceLocation) -> Result<()> {
        let function = self.enclosing_function()?;
        self.scope_mut(function)
            .labels
            .entry(name)
            .or_insert(LabelState {
                defined: false,
                location,
            });
        Ok(())
    }

    /// Fails on the first label used by `goto` but never defined in `function`.
    pub fn check_labels(&self, function: ScopeId) -> Result<()> {
        match self.scope(function).labels.iter().find(|(_, state)| !state.defined) {
            Some((name, state)) => Err(Error::malformed(
                state.location,
                format!("use of undeclared label '{}'", name),
            )),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(ty: TypeRef) -> ScopedIdentifier {
        ScopedIdentifier::Object {
            ty,
            storage: Storage::Auto,
            alignment: None,
            defined: true,
            file_scope_entity: false,
            location: SourceLocation::builtin(),
        }
    }

    #[test]
    fn test_lookup_walks_outwards() {
        let mut table = SymbolTable::new();
        let x = Symbol::new("x");
        let outer = TypeRef::new(1).unwrap();
        let inner = TypeRef::new(2).unwrap();
        table.declare(x, Namespace::Ordinary, object(outer));

        let block = table.push_scope(ScopeKind::Block);
        assert_eq!(table.lookup(x, Namespace::Ordinary).map(|(s, i)| (s, i.ty())), Some((ScopeId::GLOBAL, outer)));
        table.declare(x, Namespace::Ordinary, object(inner));
        assert_eq!(table.lookup(x, Namespace::Ordinary).map(|(s, i)| (s, i.ty())), Some((block, inner)));
        assert!(table.lookup(x, Namespace::Tag).is_none());

        assert_eq!(table.pop_scope().unwrap(), block);
        assert_eq!(table.lookup(x, Namespace::Ordinary).unwrap().1.ty(), outer);
        assert_eq!(table.scope(ScopeId::GLOBAL).children, vec![block]);
        assert!(table.pop_scope().is_err());
    }

    #[test]
    fn test_labels_are_function_wide() {
        let mut table = SymbolTable::new();
        let function = table.push_scope(ScopeKind::Function);
        table.push_scope(ScopeKind::Block);
        let end = Symbol::new("end");
        table.use_label(end, SourceLocation::builtin()).unwrap();
        assert!(table.check_labels(function).is_err());
        table.pop_scope().unwrap();
        table.define_label(end, SourceLocation::builtin()).unwrap();
        assert!(table.check_labels(function).is_ok());
        assert!(table.define_label(end, SourceLocation::builtin()).is_err());
    }
}
