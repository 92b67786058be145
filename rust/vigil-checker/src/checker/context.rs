//! In-flight declaration state.
//!
//! Everything the grammar accumulates between "declaration starts" and
//! "declaration ends" lives in one [`DeclContext`] owned by the checker:
//! the active mode (variables, typedef, globals list), the declared
//! storage class, pending effect clauses, the saved function for
//! old-style definitions, and the iterator body being defined. Nothing
//! here is global state; a second checker gets a second context.
//!
//! Mode transitions are protocol-checked: beginning a new declaration
//! while another is in flight, asserting both a globals list and an
//! explicit no-globals marker, or nesting the scope override all fail
//! fast with [`CheckFatal`] instead of silently corrupting state.

use crate::checker::clauses::{EffectContract, GlobalsSpec, StateClause, WarnClause};
use crate::checker::symtab::{SpecialCode, Storage, SymbolId};
use crate::CheckFatal;
use log::debug;
use std::mem;
use vigil_core::loc::Loc;
use vigil_core::qual::Qual;
use vigil_core::store::{RefSet, StoreRef};
use vigil_core::types::Ty;

// ── Qualified types and declarators ─────────────────────────────────

/// A base type plus the qualifiers spelled with it.
#[derive(Debug, Clone, PartialEq)]
pub struct QualType {
    pub ty: Ty,
    pub quals: Vec<Qual>,
}

impl QualType {
    pub fn new(ty: Ty) -> Self {
        QualType {
            ty,
            quals: Vec::new(),
        }
    }

    pub fn with_quals(ty: Ty, quals: Vec<Qual>) -> Self {
        QualType { ty, quals }
    }

    pub fn has(&self, q: Qual) -> bool {
        self.quals.contains(&q)
    }

    /// Add a qualifier. Returns false when it was already present so the
    /// caller can diagnose the duplicate.
    pub fn add(&mut self, q: Qual) -> bool {
        if self.has(q) {
            false
        } else {
            self.quals.push(q);
            true
        }
    }
}

/// One declarator as the grammar hands it over: the name, the type
/// shape built around a hole for the base type, and its own qualifiers.
#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub ty: Ty,
    pub quals: Vec<Qual>,
    pub loc: Loc,
}

/// Plug the declaration's base type into the hole at the bottom of a
/// declarator shape. `int *x[3]` arrives as an array of pointers to
/// unknown; plugging `int` completes it.
fn plug(shape: &Ty, base: &Ty) -> Ty {
    match shape {
        Ty::Unknown => base.clone(),
        Ty::Pointer(inner) => Ty::pointer(plug(inner, base)),
        Ty::Array(inner, len) => Ty::array(plug(inner, base), *len),
        Ty::Function(f) => Ty::function(plug(&f.ret, base), f.params.clone(), f.varargs),
        other => other.clone(),
    }
}

impl Declarator {
    pub fn new(name: impl Into<String>, loc: Loc) -> Self {
        Declarator {
            name: name.into(),
            ty: Ty::Unknown,
            quals: Vec::new(),
            loc,
        }
    }

    pub fn with_type(name: impl Into<String>, ty: Ty, loc: Loc) -> Self {
        Declarator {
            name: name.into(),
            ty,
            quals: Vec::new(),
            loc,
        }
    }

    pub fn with_quals(mut self, quals: Vec<Qual>) -> Self {
        self.quals = quals;
        self
    }

    pub fn has_qual(&self, q: Qual) -> bool {
        self.quals.contains(&q)
    }

    /// The complete type this declarator denotes once the declaration's
    /// base type fills the hole.
    pub fn resolved_type(&self, base: &Ty) -> Ty {
        plug(&self.ty, base)
    }
}

// ── Declaration modes ───────────────────────────────────────────────

/// What kind of declaration is in flight.
#[derive(Debug, Clone, Default)]
pub enum DeclMode {
    #[default]
    None,
    Vars(QualType),
    Typedef(QualType),
    GlobalsList,
}

impl DeclMode {
    pub fn name(&self) -> &'static str {
        match self {
            DeclMode::None => "none",
            DeclMode::Vars(_) => "variable declaration",
            DeclMode::Typedef(_) => "typedef",
            DeclMode::GlobalsList => "globals list",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DeclMode::None)
    }
}

// ── The context ─────────────────────────────────────────────────────

/// All in-flight declaration state, owned by the checker.
#[derive(Debug, Default)]
pub struct DeclContext {
    mode: DeclMode,
    storage: Storage,
    globals: GlobalsSpec,
    modifies: Option<RefSet>,
    state: Vec<StateClause>,
    warn: Option<WarnClause>,
    saved_function: Option<SymbolId>,
    old_style_params: bool,
    iter: Option<SymbolId>,
    special: Option<SpecialCode>,
    args_used: bool,
    scope_override: bool,
}

impl DeclContext {
    pub fn new() -> Self {
        DeclContext::default()
    }

    pub fn mode(&self) -> &DeclMode {
        &self.mode
    }

    pub fn in_globals_list(&self) -> bool {
        matches!(self.mode, DeclMode::GlobalsList)
    }

    fn begin_mode(&mut self, next: DeclMode) -> Result<(), CheckFatal> {
        if !self.mode.is_none() {
            return Err(CheckFatal::ModeConflict {
                in_flight: self.mode.name(),
                attempted: next.name(),
            });
        }
        debug!("declaration begins: {}", next.name());
        self.mode = next;
        Ok(())
    }

    pub fn begin_vars(&mut self, base: QualType) -> Result<(), CheckFatal> {
        self.begin_mode(DeclMode::Vars(base))
    }

    pub fn begin_typedef(&mut self, base: QualType) -> Result<(), CheckFatal> {
        self.begin_mode(DeclMode::Typedef(base))
    }

    pub fn begin_globals_list(&mut self) -> Result<(), CheckFatal> {
        self.begin_mode(DeclMode::GlobalsList)
    }

    /// Close out the current declaration. Mode and storage reset. A
    /// globals-list episode leaves its pending clauses in place for the
    /// function declarator that follows; any other mode drops clauses
    /// no declarator drained.
    pub fn end_declaration(&mut self) {
        debug!("declaration ends: {}", self.mode.name());
        let pending_for_function = self.in_globals_list();
        self.mode = DeclMode::None;
        self.storage = Storage::None;
        if pending_for_function {
            return;
        }
        if self.has_pending_effects() {
            debug!("dropping undrained effect clauses at declaration end");
            let _ = self.take_contract();
        }
        self.special = None;
        self.args_used = false;
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    /// Record the storage class, returning the previous one so the
    /// caller can diagnose a conflict.
    pub fn set_storage(&mut self, storage: Storage) -> Storage {
        mem::replace(&mut self.storage, storage)
    }

    // ── Pending globals ─────────────────────────────────────────────

    pub fn pending_globals(&self) -> &GlobalsSpec {
        &self.globals
    }

    /// Assert that the function touches no globals.
    pub fn set_no_globals(&mut self) -> Result<(), CheckFatal> {
        match self.globals {
            GlobalsSpec::Listed(_) => Err(CheckFatal::GlobalsConflict),
            _ => {
                self.globals = GlobalsSpec::Nothing;
                Ok(())
            }
        }
    }

    /// Append one reference to the pending globals list.
    pub fn add_global(&mut self, r: StoreRef) -> Result<(), CheckFatal> {
        match &mut self.globals {
            GlobalsSpec::Nothing => Err(CheckFatal::GlobalsConflict),
            GlobalsSpec::Listed(refs) => {
                refs.insert(r);
                Ok(())
            }
            GlobalsSpec::Unspecified => {
                self.globals = GlobalsSpec::Listed(RefSet::single(r));
                Ok(())
            }
        }
    }

    // ── Pending modifies, state, warn ───────────────────────────────

    pub fn set_modifies(&mut self, refs: RefSet) {
        if self.modifies.is_some() {
            debug!("modifies clause restated, later clause wins");
        }
        self.modifies = Some(refs);
    }

    pub fn add_state_clause(&mut self, clause: StateClause) {
        self.state.push(clause);
    }

    pub fn set_warn(&mut self, warn: WarnClause) {
        if self.warn.is_some() {
            debug!("warn clause restated, later clause wins");
        }
        self.warn = Some(warn);
    }

    pub fn has_pending_effects(&self) -> bool {
        !self.globals.is_unspecified()
            || self.modifies.is_some()
            || !self.state.is_empty()
            || self.warn.is_some()
    }

    /// Drain every pending clause into one contract. The second drain
    /// yields the empty contract.
    pub fn take_contract(&mut self) -> EffectContract {
        EffectContract {
            globals: mem::take(&mut self.globals),
            modifies: self.modifies.take(),
            state: mem::take(&mut self.state),
            warn: self.warn.take(),
        }
    }

    // ── Saved function and old-style parameters ─────────────────────

    pub fn save_function(&mut self, id: SymbolId) {
        self.saved_function = Some(id);
    }

    pub fn saved_function(&self) -> Option<SymbolId> {
        self.saved_function
    }

    pub fn take_saved_function(&mut self) -> Option<SymbolId> {
        self.saved_function.take()
    }

    pub fn begin_old_style_params(&mut self) {
        self.old_style_params = true;
    }

    pub fn in_old_style_params(&self) -> bool {
        self.old_style_params
    }

    pub fn end_old_style_params(&mut self) {
        self.old_style_params = false;
    }

    // ── Iterator definitions ────────────────────────────────────────

    pub fn begin_iter_body(&mut self, id: SymbolId) {
        self.iter = Some(id);
    }

    pub fn current_iter(&self) -> Option<SymbolId> {
        self.iter
    }

    pub fn end_iter_body(&mut self) {
        self.iter = None;
    }

    // ── Special codes and the args-used flag ────────────────────────

    /// Record a special-function code for the next function declarator,
    /// returning any code already pending so the caller can diagnose.
    pub fn set_special(&mut self, code: SpecialCode) -> Option<SpecialCode> {
        self.special.replace(code)
    }

    pub fn take_special(&mut self) -> Option<SpecialCode> {
        self.special.take()
    }

    /// Returns true when the flag was already set.
    pub fn set_args_used(&mut self) -> bool {
        mem::replace(&mut self.args_used, true)
    }

    pub fn take_args_used(&mut self) -> bool {
        mem::take(&mut self.args_used)
    }

    // ── Scope override ──────────────────────────────────────────────

    /// Enter the global-installation override from an inner scope. One
    /// level only; re-entering while active is a protocol error.
    pub fn enter_scope_override(&mut self) -> Result<(), CheckFatal> {
        if self.scope_override {
            return Err(CheckFatal::NestedScopeOverride);
        }
        self.scope_override = true;
        Ok(())
    }

    pub fn exit_scope_override(&mut self) {
        self.scope_override = false;
    }

    pub fn in_scope_override(&self) -> bool {
        self.scope_override
    }
}
