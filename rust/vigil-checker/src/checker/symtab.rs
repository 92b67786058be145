//! Symbol table: scoped name bindings over an entry arena.
//!
//! Entries are addressed by id so the reconciler can keep references to
//! them across scope changes and mutate them in place (old-style
//! parameter stamping, enum member retyping). Tags live in their own
//! namespace, as in C.

use crate::checker::clauses::EffectContract;
use std::collections::HashMap;
use vigil_core::config::CheckLevel;
use vigil_core::loc::Loc;
use vigil_core::store::{StoreRef, VarScope};
use vigil_core::types::Ty;
use vigil_core::values::ConstValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    #[default]
    None,
    Static,
    Extern,
}

/// Lint-style special function markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCode {
    PrintfLike,
    ScanfLike,
    MessageLike,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionInfo {
    pub contract: EffectContract,
    pub special: Option<SpecialCode>,
    pub args_used: bool,
    /// Contractually never returns; calls diverge.
    pub never_returns: bool,
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Var { check: CheckLevel },
    Param { index: usize, typed: bool },
    Function(FunctionInfo),
    Datatype { is_abstract: bool, is_mutable: bool },
    EnumConstant { value: Option<i64> },
    Constant { value: Option<ConstValue> },
    Iter { yields: Vec<usize> },
    EndIter,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub ty: Ty,
    pub sref: StoreRef,
    pub storage: Storage,
    pub declared: Option<Loc>,
    pub defined: Option<Loc>,
    pub used: bool,
}

impl Entry {
    fn base(name: String, kind: EntryKind, ty: Ty, sref: StoreRef, loc: Loc) -> Self {
        Entry {
            name,
            kind,
            ty,
            sref,
            storage: Storage::None,
            declared: Some(loc),
            defined: None,
            used: false,
        }
    }

    pub fn var(name: impl Into<String>, ty: Ty, scope: VarScope, loc: Loc) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), scope, ty.clone());
        Entry::base(
            name,
            EntryKind::Var {
                check: CheckLevel::Unknown,
            },
            ty,
            sref,
            loc,
        )
    }

    pub fn param(name: impl Into<String>, index: usize, ty: Ty, loc: Loc) -> Self {
        let name = name.into();
        let typed = !ty.is_unknown();
        let sref = StoreRef::param(index, ty.clone());
        Entry::base(name, EntryKind::Param { index, typed }, ty, sref, loc)
    }

    pub fn function(name: impl Into<String>, ty: Ty, scope: VarScope, loc: Loc) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), scope, ty.clone());
        Entry::base(
            name,
            EntryKind::Function(FunctionInfo::default()),
            ty,
            sref,
            loc,
        )
    }

    pub fn datatype(
        name: impl Into<String>,
        ty: Ty,
        is_abstract: bool,
        is_mutable: bool,
        loc: Loc,
    ) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), VarScope::Global, ty.clone());
        Entry::base(
            name,
            EntryKind::Datatype {
                is_abstract,
                is_mutable,
            },
            ty,
            sref,
            loc,
        )
    }

    pub fn enum_constant(
        name: impl Into<String>,
        ty: Ty,
        value: Option<i64>,
        loc: Loc,
    ) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), VarScope::Global, ty.clone());
        Entry::base(name, EntryKind::EnumConstant { value }, ty, sref, loc)
    }

    pub fn constant(
        name: impl Into<String>,
        ty: Ty,
        value: Option<ConstValue>,
        loc: Loc,
    ) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), VarScope::Global, ty.clone());
        Entry::base(name, EntryKind::Constant { value }, ty, sref, loc)
    }

    pub fn iter(name: impl Into<String>, ty: Ty, yields: Vec<usize>, loc: Loc) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), VarScope::Global, ty.clone());
        Entry::base(name, EntryKind::Iter { yields }, ty, sref, loc)
    }

    pub fn end_iter(name: impl Into<String>, loc: Loc) -> Self {
        let name = name.into();
        let sref = StoreRef::var(name.clone(), VarScope::Global, Ty::Unknown);
        Entry::base(name, EntryKind::EndIter, Ty::Unknown, sref, loc)
    }

    pub fn is_var(&self) -> bool {
        matches!(self.kind, EntryKind::Var { .. })
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, EntryKind::Param { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, EntryKind::Function(_))
    }

    pub fn is_datatype(&self) -> bool {
        matches!(self.kind, EntryKind::Datatype { .. })
    }

    pub fn is_enum_constant(&self) -> bool {
        matches!(self.kind, EntryKind::EnumConstant { .. })
    }

    /// Anything with storage a globals or modifies list may name.
    pub fn is_variable_like(&self) -> bool {
        self.is_var() || self.is_param()
    }

    pub fn check_level(&self) -> Option<CheckLevel> {
        match self.kind {
            EntryKind::Var { check } => Some(check),
            _ => None,
        }
    }

    pub fn set_check_level(&mut self, level: CheckLevel) {
        if let EntryKind::Var { check } = &mut self.kind {
            *check = level;
        }
    }

    pub fn function_info(&self) -> Option<&FunctionInfo> {
        match &self.kind {
            EntryKind::Function(info) => Some(info),
            _ => None,
        }
    }

    pub fn function_info_mut(&mut self) -> Option<&mut FunctionInfo> {
        match &mut self.kind {
            EntryKind::Function(info) => Some(info),
            _ => None,
        }
    }

    pub fn constant_value(&self) -> Option<ConstValue> {
        match &self.kind {
            EntryKind::Constant { value } => value.clone(),
            EntryKind::EnumConstant { value } => value.map(ConstValue::Int),
            _ => None,
        }
    }

    /// Replace the type, keeping the storage reference consistent.
    pub fn set_type(&mut self, ty: Ty) {
        self.sref.ty = ty.clone();
        self.ty = ty;
    }

    pub fn mark_used(&mut self) {
        self.used = true;
    }
}

/// Scoped bindings plus the tag namespace.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Entry>,
    scopes: Vec<HashMap<String, SymbolId>>,
    tags: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::new(),
            scopes: vec![HashMap::new()],
            tags: HashMap::new(),
        }
    }

    /// Nesting depth: 0 at file scope.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn at_file_scope(&self) -> bool {
        self.depth() == 0
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        assert!(
            self.scopes.len() > 1,
            "attempted to exit the file scope"
        );
        self.scopes.pop();
    }

    fn push_entry(&mut self, entry: Entry) -> SymbolId {
        let id = SymbolId(self.entries.len() as u32);
        self.entries.push(entry);
        id
    }

    /// Bind in the current scope, shadowing outer bindings.
    pub fn declare(&mut self, entry: Entry) -> SymbolId {
        let name = entry.name.clone();
        let id = self.push_entry(entry);
        self.scopes
            .last_mut()
            .map(|s| s.insert(name, id));
        id
    }

    /// Bind at file scope with supersede semantics: a rebinding replaces
    /// the old entry under the same id, so outstanding references see
    /// the new declaration.
    pub fn declare_global(&mut self, entry: Entry) -> SymbolId {
        if let Some(&id) = self.scopes[0].get(&entry.name) {
            log::debug!("superseding file-scope entry {}", entry.name);
            self.entries[id.0 as usize] = entry;
            return id;
        }
        let name = entry.name.clone();
        let id = self.push_entry(entry);
        self.scopes[0].insert(name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                return Some(id);
            }
        }
        None
    }

    pub fn lookup_global(&self, name: &str) -> Option<SymbolId> {
        self.scopes[0].get(name).copied()
    }

    /// Every symbol bound in the innermost scope, in no particular
    /// order.
    pub fn scope_symbols(&self) -> Vec<SymbolId> {
        self.scopes
            .last()
            .map(|s| s.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn entry(&self, id: SymbolId) -> &Entry {
        &self.entries[id.0 as usize]
    }

    pub fn entry_mut(&mut self, id: SymbolId) -> &mut Entry {
        &mut self.entries[id.0 as usize]
    }

    pub fn declare_tag(&mut self, entry: Entry) -> SymbolId {
        if let Some(&id) = self.tags.get(&entry.name) {
            self.entries[id.0 as usize] = entry;
            return id;
        }
        let name = entry.name.clone();
        let id = self.push_entry(entry);
        self.tags.insert(name, id);
        id
    }

    pub fn lookup_tag(&self, name: &str) -> Option<SymbolId> {
        self.tags.get(name).copied()
    }
}
