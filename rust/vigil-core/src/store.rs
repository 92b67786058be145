//! Storage references and the state lattices tracked on them.
//!
//! A `StoreRef` names a storage location in caller- or file-relative
//! terms: a variable, a positional parameter, a path of fields and
//! dereferences over one of those, or a pseudo-location (`nothing`,
//! `internalState`, `systemState`, `result`, or unconstrained external
//! state). Identity is the location path alone; the tracked definedness
//! and nullability states ride along but never affect set membership.

use crate::qual::Qual;
use crate::types::Ty;
use indexmap::IndexSet;
use std::fmt;
use std::hash::{Hash, Hasher};

// ── Scopes ──────────────────────────────────────────────────────────

/// Where a named variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    Local,
    FileStatic,
    Global,
}

// ── Reference identity ──────────────────────────────────────────────

/// The identity of a storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefBase {
    Var { name: String, scope: VarScope },
    Param(usize),
    Field { base: Box<RefBase>, name: String },
    Deref(Box<RefBase>),
    AnyIndex(Box<RefBase>),
    /// The empty location ("modifies nothing").
    Nothing,
    /// State internal to the module under analysis.
    Internal,
    /// State of the surrounding system (file system and the like).
    System,
    /// The function result, meaningful in state clauses.
    Result,
    /// Unconstrained external state (unknown callee effects).
    Unknown,
}

impl RefBase {
    /// True for the pseudo-locations that do not name program storage.
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            RefBase::Nothing | RefBase::Internal | RefBase::System | RefBase::Result | RefBase::Unknown
        )
    }

    /// The scope of the root variable, when the path bottoms out in one.
    pub fn root_scope(&self) -> Option<VarScope> {
        match self {
            RefBase::Var { scope, .. } => Some(*scope),
            RefBase::Field { base, .. } | RefBase::Deref(base) | RefBase::AnyIndex(base) => {
                base.root_scope()
            }
            _ => None,
        }
    }

    /// The parameter index at the root of the path, if any.
    pub fn root_param(&self) -> Option<usize> {
        match self {
            RefBase::Param(i) => Some(*i),
            RefBase::Field { base, .. } | RefBase::Deref(base) | RefBase::AnyIndex(base) => {
                base.root_param()
            }
            _ => None,
        }
    }

    /// Rewrite a parameter-rooted path onto a concrete base, for mapping
    /// declared callee effects onto actual arguments.
    pub fn rebase_param(&self, actuals: &[RefBase]) -> Option<RefBase> {
        match self {
            RefBase::Param(i) => actuals.get(*i).cloned(),
            RefBase::Field { base, name } => Some(RefBase::Field {
                base: Box::new(base.rebase_param(actuals)?),
                name: name.clone(),
            }),
            RefBase::Deref(base) => Some(RefBase::Deref(Box::new(base.rebase_param(actuals)?))),
            RefBase::AnyIndex(base) => {
                Some(RefBase::AnyIndex(Box::new(base.rebase_param(actuals)?)))
            }
            _ => None,
        }
    }
}

impl fmt::Display for RefBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefBase::Var { name, .. } => write!(f, "{}", name),
            RefBase::Param(i) => write!(f, "arg{}", i + 1),
            RefBase::Field { base, name } => write!(f, "{}.{}", base, name),
            RefBase::Deref(base) => write!(f, "*{}", base),
            RefBase::AnyIndex(base) => write!(f, "{}[]", base),
            RefBase::Nothing => write!(f, "nothing"),
            RefBase::Internal => write!(f, "internalState"),
            RefBase::System => write!(f, "systemState"),
            RefBase::Result => write!(f, "result"),
            RefBase::Unknown => write!(f, "<unknown>"),
        }
    }
}

// ── State lattices ──────────────────────────────────────────────────

/// Definedness of the referenced storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefState {
    #[default]
    Unknown,
    Undefined,
    /// Allocated but contents not defined (an `out` location).
    Allocated,
    /// Partially defined (`partial`).
    Partial,
    Defined,
    /// Relaxed definition requirement (`reldef`).
    RelDef,
    /// Undefined when the annotated call returns (`undef` global).
    UndefGlob,
    /// Deallocated by the annotated call (`killed` global).
    Killed,
    /// Both undefined and deallocated (`undef killed` in either order).
    UndefKilled,
}

impl DefState {
    /// Fold a global-state qualifier into the current state. `undef` and
    /// `killed` commute: applying both lands on `UndefKilled` regardless
    /// of order.
    pub fn reflect_global_qual(self, q: Qual) -> DefState {
        match q {
            Qual::Undef => match self {
                DefState::Killed | DefState::UndefKilled => DefState::UndefKilled,
                _ => DefState::UndefGlob,
            },
            Qual::Killed => match self {
                DefState::UndefGlob | DefState::UndefKilled => DefState::UndefKilled,
                _ => DefState::Killed,
            },
            _ => self,
        }
    }

    /// Fold an allocation qualifier into the current state.
    pub fn reflect_alloc_qual(self, q: Qual) -> DefState {
        match q {
            Qual::Out => DefState::Allocated,
            Qual::Partial => DefState::Partial,
            Qual::RelDef => DefState::RelDef,
            Qual::Special => self,
            _ => self,
        }
    }
}

/// Nullability of the referenced storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullState {
    #[default]
    Unknown,
    NotNull,
    PosNull,
    RelNull,
}

impl NullState {
    pub fn reflect_null_qual(self, q: Qual) -> NullState {
        match q {
            Qual::Null => NullState::PosNull,
            Qual::RelNull => NullState::RelNull,
            Qual::NotNull => NullState::NotNull,
            _ => self,
        }
    }
}

// ── Storage references ──────────────────────────────────────────────

/// A storage location plus its tracked state.
///
/// Equality and hashing look at the identity only, so a set of
/// references deduplicates by location no matter how the states differ.
#[derive(Debug, Clone)]
pub struct StoreRef {
    pub base: RefBase,
    pub ty: Ty,
    pub def: DefState,
    pub null: NullState,
}

impl PartialEq for StoreRef {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Eq for StoreRef {}

impl Hash for StoreRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base.hash(state);
    }
}

impl StoreRef {
    pub fn new(base: RefBase, ty: Ty) -> Self {
        StoreRef {
            base,
            ty,
            def: DefState::Unknown,
            null: NullState::Unknown,
        }
    }

    pub fn var(name: impl Into<String>, scope: VarScope, ty: Ty) -> Self {
        StoreRef::new(
            RefBase::Var {
                name: name.into(),
                scope,
            },
            ty,
        )
    }

    pub fn param(index: usize, ty: Ty) -> Self {
        StoreRef::new(RefBase::Param(index), ty)
    }

    pub fn field(self, name: impl Into<String>, ty: Ty) -> Self {
        StoreRef::new(
            RefBase::Field {
                base: Box::new(self.base),
                name: name.into(),
            },
            ty,
        )
    }

    pub fn deref(self, ty: Ty) -> Self {
        StoreRef::new(RefBase::Deref(Box::new(self.base)), ty)
    }

    pub fn any_index(self, ty: Ty) -> Self {
        StoreRef::new(RefBase::AnyIndex(Box::new(self.base)), ty)
    }

    pub fn nothing() -> Self {
        StoreRef::new(RefBase::Nothing, Ty::Unknown)
    }

    pub fn internal_state() -> Self {
        StoreRef::new(RefBase::Internal, Ty::Unknown)
    }

    pub fn system_state() -> Self {
        StoreRef::new(RefBase::System, Ty::Unknown)
    }

    pub fn result(ty: Ty) -> Self {
        StoreRef::new(RefBase::Result, ty)
    }

    pub fn unknown() -> Self {
        StoreRef::new(RefBase::Unknown, Ty::Unknown)
    }

    pub fn is_pseudo(&self) -> bool {
        self.base.is_pseudo()
    }

    pub fn scope(&self) -> Option<VarScope> {
        self.base.root_scope()
    }

    pub fn is_global(&self) -> bool {
        matches!(self.scope(), Some(VarScope::Global) | Some(VarScope::FileStatic))
    }

    /// Map a parameter-rooted reference onto the actual arguments of a
    /// call. `None` when the reference is not parameter-rooted or an
    /// actual carries no storage.
    pub fn substitute_params(&self, actuals: &[Option<&StoreRef>]) -> Option<StoreRef> {
        let bases: Vec<RefBase> = actuals
            .iter()
            .map(|a| a.map(|r| r.base.clone()).unwrap_or(RefBase::Unknown))
            .collect();
        self.base
            .rebase_param(&bases)
            .map(|b| StoreRef::new(b, self.ty.clone()))
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)
    }
}

// ── Reference sets ──────────────────────────────────────────────────

/// An insertion-ordered set of storage references, deduplicated by
/// identity.
#[derive(Debug, Clone, Default)]
pub struct RefSet(IndexSet<StoreRef>);

impl RefSet {
    pub fn new() -> Self {
        RefSet::default()
    }

    pub fn single(r: StoreRef) -> Self {
        let mut s = RefSet::new();
        s.insert(r);
        s
    }

    /// Insert, keeping the first occurrence on duplicates. Returns true
    /// when the reference was new.
    pub fn insert(&mut self, r: StoreRef) -> bool {
        self.0.insert(r)
    }

    pub fn remove(&mut self, r: &StoreRef) -> bool {
        self.0.shift_remove(r)
    }

    pub fn remove_base(&mut self, base: &RefBase) -> bool {
        let probe = StoreRef::new(base.clone(), Ty::Unknown);
        self.0.shift_remove(&probe)
    }

    pub fn contains(&self, r: &StoreRef) -> bool {
        self.0.contains(r)
    }

    pub fn contains_base(&self, base: &RefBase) -> bool {
        let probe = StoreRef::new(base.clone(), Ty::Unknown);
        self.0.contains(&probe)
    }

    pub fn union_with(&mut self, other: &RefSet) {
        for r in other.iter() {
            self.insert(r.clone());
        }
    }

    /// Keep only references also present in `other`.
    pub fn intersect_with(&mut self, other: &RefSet) {
        self.0.retain(|r| other.contains(r));
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreRef> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for RefSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|r| other.contains(r))
    }
}

impl Eq for RefSet {}

impl FromIterator<StoreRef> for RefSet {
    fn from_iter<T: IntoIterator<Item = StoreRef>>(iter: T) -> Self {
        let mut s = RefSet::new();
        for r in iter {
            s.insert(r);
        }
        s
    }
}

impl Extend<StoreRef> for RefSet {
    fn extend<T: IntoIterator<Item = StoreRef>>(&mut self, iter: T) {
        for r in iter {
            self.insert(r);
        }
    }
}

impl<'a> IntoIterator for &'a RefSet {
    type Item = &'a StoreRef;
    type IntoIter = indexmap::set::Iter<'a, StoreRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RefSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}
