//! Function effect clauses and the per-function contract.
//!
//! ## Design overview
//!
//! Annotation clauses arrive from the grammar one at a time: a globals
//! list, a modifies list, before/after state clauses, or a warn clause.
//! Each is a [`FunctionClause`] while in transit. The payload of a
//! clause can be borrowed (`get_*`, which insists on the matching tag)
//! or consumed (`take_*`, which moves the payload out and leaves the
//! `Dead` tombstone so a second consume is a safe no-op).
//!
//! At declarator reconciliation the pending clauses merge into one
//! [`EffectContract`] on the function entry: an explicitly empty globals
//! list is recorded as "nothing", never conflated with an unspecified
//! one; a later modifies list overwrites an earlier one; state clauses
//! accumulate in order.

use crate::checker::symtab::SymbolTable;
use std::fmt;
use std::mem;
use strum_macros::Display;
use vigil_core::diag::{Category, Diagnostic, Reporter};
use vigil_core::loc::Loc;
use vigil_core::store::{RefSet, StoreRef, VarScope};

// ── State clauses ───────────────────────────────────────────────────

/// Whether a state clause constrains call entry or call exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StateWhen {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StateKind {
    Uses,
    Defines,
    Allocates,
    Sets,
    Releases,
}

impl StateKind {
    /// The conventional side of the call each kind constrains.
    pub fn default_when(self) -> StateWhen {
        match self {
            StateKind::Uses => StateWhen::Before,
            StateKind::Defines | StateKind::Allocates | StateKind::Sets | StateKind::Releases => {
                StateWhen::After
            }
        }
    }
}

/// One before/after constraint over parameters and the result.
#[derive(Debug, Clone, PartialEq)]
pub struct StateClause {
    pub when: StateWhen,
    pub kind: StateKind,
    pub refs: RefSet,
}

impl StateClause {
    pub fn new(when: StateWhen, kind: StateKind, refs: RefSet) -> Self {
        StateClause { when, kind, refs }
    }

    /// A clause on the kind's conventional side.
    pub fn of_kind(kind: StateKind, refs: RefSet) -> Self {
        StateClause::new(kind.default_when(), kind, refs)
    }

    pub fn uses(refs: RefSet) -> Self {
        StateClause::of_kind(StateKind::Uses, refs)
    }

    pub fn defines(refs: RefSet) -> Self {
        StateClause::of_kind(StateKind::Defines, refs)
    }

    pub fn allocates(refs: RefSet) -> Self {
        StateClause::of_kind(StateKind::Allocates, refs)
    }

    pub fn sets(refs: RefSet) -> Self {
        StateClause::of_kind(StateKind::Sets, refs)
    }

    pub fn releases(refs: RefSet) -> Self {
        StateClause::of_kind(StateKind::Releases, refs)
    }
}

impl fmt::Display for StateClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.when == self.kind.default_when() {
            write!(f, "{} {}", self.kind, self.refs)
        } else {
            write!(f, "{} {} {}", self.when, self.kind, self.refs)
        }
    }
}

/// A warn clause: report under `flag` with `message` when the annotated
/// function is used.
#[derive(Debug, Clone, PartialEq)]
pub struct WarnClause {
    pub flag: String,
    pub message: String,
}

impl fmt::Display for WarnClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warn {} \"{}\"", self.flag, self.message)
    }
}

// ── Function clauses ────────────────────────────────────────────────

/// An annotation clause in transit between the grammar and the entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionClause {
    Globals(RefSet),
    Modifies(RefSet),
    State(StateClause),
    Warn(WarnClause),
    /// Tombstone left behind once the payload has been consumed.
    Dead,
}

impl FunctionClause {
    pub fn globals(refs: RefSet) -> Self {
        FunctionClause::Globals(refs)
    }

    pub fn modifies(refs: RefSet) -> Self {
        FunctionClause::Modifies(refs)
    }

    pub fn state(clause: StateClause) -> Self {
        FunctionClause::State(clause)
    }

    pub fn warn(flag: impl Into<String>, message: impl Into<String>) -> Self {
        FunctionClause::Warn(WarnClause {
            flag: flag.into(),
            message: message.into(),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FunctionClause::Globals(_) => "globals",
            FunctionClause::Modifies(_) => "modifies",
            FunctionClause::State(_) => "state",
            FunctionClause::Warn(_) => "warn",
            FunctionClause::Dead => "dead",
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, FunctionClause::Dead)
    }

    /// Borrow the globals payload. The clause must carry the matching
    /// tag; anything else is a caller contract violation.
    pub fn get_globals(&self) -> &RefSet {
        match self {
            FunctionClause::Globals(refs) => refs,
            other => panic!("globals clause expected, found {} clause", other.kind_name()),
        }
    }

    pub fn get_modifies(&self) -> &RefSet {
        match self {
            FunctionClause::Modifies(refs) => refs,
            other => panic!(
                "modifies clause expected, found {} clause",
                other.kind_name()
            ),
        }
    }

    pub fn get_state(&self) -> &StateClause {
        match self {
            FunctionClause::State(clause) => clause,
            other => panic!("state clause expected, found {} clause", other.kind_name()),
        }
    }

    pub fn get_warn(&self) -> &WarnClause {
        match self {
            FunctionClause::Warn(clause) => clause,
            other => panic!("warn clause expected, found {} clause", other.kind_name()),
        }
    }

    /// Consume the state payload, leaving the tombstone. A second call
    /// returns `None`. A live clause of another kind is a caller
    /// contract violation.
    pub fn take_state(&mut self) -> Option<StateClause> {
        match self {
            FunctionClause::State(_) => match mem::replace(self, FunctionClause::Dead) {
                FunctionClause::State(clause) => Some(clause),
                _ => unreachable!(),
            },
            FunctionClause::Dead => None,
            other => panic!("state clause expected, found {} clause", other.kind_name()),
        }
    }

    pub fn take_warn(&mut self) -> Option<WarnClause> {
        match self {
            FunctionClause::Warn(_) => match mem::replace(self, FunctionClause::Dead) {
                FunctionClause::Warn(clause) => Some(clause),
                _ => unreachable!(),
            },
            FunctionClause::Dead => None,
            other => panic!("warn clause expected, found {} clause", other.kind_name()),
        }
    }
}

impl fmt::Display for FunctionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionClause::Globals(refs) => write!(f, "globals {}", refs),
            FunctionClause::Modifies(refs) => write!(f, "modifies {}", refs),
            FunctionClause::State(clause) => write!(f, "{}", clause),
            FunctionClause::Warn(clause) => write!(f, "{}", clause),
            FunctionClause::Dead => unreachable!("dead clause has no rendering"),
        }
    }
}

// ── Contracts ───────────────────────────────────────────────────────

/// The globals assertion on a function: absent, explicitly empty, or a
/// list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GlobalsSpec {
    #[default]
    Unspecified,
    /// An explicitly empty list: the function touches no globals.
    Nothing,
    Listed(RefSet),
}

impl GlobalsSpec {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, GlobalsSpec::Unspecified)
    }

    pub fn refs(&self) -> Option<&RefSet> {
        match self {
            GlobalsSpec::Listed(refs) => Some(refs),
            _ => None,
        }
    }
}

/// The merged effect contract attached to a function entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectContract {
    pub globals: GlobalsSpec,
    pub modifies: Option<RefSet>,
    pub state: Vec<StateClause>,
    pub warn: Option<WarnClause>,
}

impl EffectContract {
    pub fn is_empty(&self) -> bool {
        self.globals.is_unspecified()
            && self.modifies.is_none()
            && self.state.is_empty()
            && self.warn.is_none()
    }

    pub fn state_of_kind(&self, kind: StateKind) -> Vec<&StateClause> {
        self.state.iter().filter(|c| c.kind == kind).collect()
    }

    /// Fold a newer contract into this one, as when a function is
    /// redeclared. Stated parts replace earlier ones; absent parts keep
    /// what was already recorded; state clauses accumulate.
    pub fn absorb(&mut self, newer: EffectContract) {
        if !newer.globals.is_unspecified() {
            self.globals = newer.globals;
        }
        if newer.modifies.is_some() {
            self.modifies = newer.modifies;
        }
        self.state.extend(newer.state);
        if newer.warn.is_some() {
            self.warn = newer.warn;
        }
    }
}

// ── Clause reference builders ───────────────────────────────────────
//
// These mirror the modifies-list grammar: each step extends a reference
// path and diagnoses misuse without aborting (a bad step keeps the base
// reference so the rest of the list still parses).

fn warn_syntax(reporter: &dyn Reporter, message: String, loc: &Loc) {
    reporter.report(Diagnostic::warning(Category::Syntax, message, loc.clone()));
}

/// `*x` in an effect list.
pub fn clause_ref_deref(reporter: &dyn Reporter, base: StoreRef, loc: &Loc) -> StoreRef {
    let rt = base.ty.real().clone();
    if rt.is_pointer_or_array() || rt.is_unknown() {
        let pointee = rt.base_type().cloned().unwrap_or(vigil_core::types::Ty::Unknown);
        base.deref(pointee)
    } else {
        reporter.report(Diagnostic::warning(
            Category::TypeMismatch,
            format!("dereference of non-pointer in effect list (type {})", base.ty),
            loc.clone(),
        ));
        base
    }
}

/// `x.f` in an effect list.
pub fn clause_ref_field(
    reporter: &dyn Reporter,
    base: StoreRef,
    field: &str,
    loc: &Loc,
) -> StoreRef {
    if base.ty.is_abstract() {
        reporter.report(Diagnostic::warning(
            Category::AbstractRep,
            format!(
                "effect list exposes the representation of abstract type {}",
                base.ty
            ),
            loc.clone(),
        ));
        return base;
    }
    match base.ty.field(field) {
        Some(f) => {
            let fty = f.ty.clone();
            base.field(field, fty)
        }
        None => {
            if base.ty.is_struct_or_union() {
                reporter.report(Diagnostic::warning(
                    Category::TypeMismatch,
                    format!("{} has no field named {}", base.ty, field),
                    loc.clone(),
                ));
            } else {
                reporter.report(Diagnostic::warning(
                    Category::TypeMismatch,
                    format!(
                        "field access in effect list on non-struct (type {})",
                        base.ty
                    ),
                    loc.clone(),
                ));
            }
            base
        }
    }
}

/// `x->f` in an effect list.
pub fn clause_ref_arrow(
    reporter: &dyn Reporter,
    base: StoreRef,
    field: &str,
    loc: &Loc,
) -> StoreRef {
    if base.ty.is_abstract() {
        reporter.report(Diagnostic::warning(
            Category::AbstractRep,
            format!(
                "effect list exposes the representation of abstract type {}",
                base.ty
            ),
            loc.clone(),
        ));
        return base;
    }
    if !base.ty.is_pointer_or_array() {
        reporter.report(Diagnostic::warning(
            Category::TypeMismatch,
            format!("arrow access in effect list on non-pointer (type {})", base.ty),
            loc.clone(),
        ));
        return base;
    }
    let derefed = clause_ref_deref(reporter, base, loc);
    clause_ref_field(reporter, derefed, field, loc)
}

/// `x[]` in an effect list.
pub fn clause_ref_index(reporter: &dyn Reporter, base: StoreRef, loc: &Loc) -> StoreRef {
    let rt = base.ty.real().clone();
    if rt.is_pointer_or_array() || rt.is_unknown() {
        let elem = rt.base_type().cloned().unwrap_or(vigil_core::types::Ty::Unknown);
        base.any_index(elem)
    } else {
        reporter.report(Diagnostic::warning(
            Category::TypeMismatch,
            format!("index in effect list on non-array (type {})", base.ty),
            loc.clone(),
        ));
        base
    }
}

// ── Clause identifier resolution ────────────────────────────────────

fn pseudo_ref(name: &str) -> Option<StoreRef> {
    match name {
        "nothing" => Some(StoreRef::nothing()),
        "internalState" => Some(StoreRef::internal_state()),
        "systemState" | "fileSystem" => Some(StoreRef::system_state()),
        _ => None,
    }
}

/// Resolve an identifier inside a globals list. `None` means the name
/// was unrecognized and the caller should skip it.
pub fn resolve_globals_id(
    reporter: &dyn Reporter,
    table: &SymbolTable,
    name: &str,
    loc: &Loc,
) -> Option<StoreRef> {
    if let Some(r) = pseudo_ref(name) {
        return Some(r);
    }
    match table.lookup(name) {
        Some(id) => Some(table.entry(id).sref.clone()),
        None => {
            reporter.report(Diagnostic::warning(
                Category::UnrecognizedIdentifier,
                format!("unrecognized identifier in globals list: {}", name),
                loc.clone(),
            ));
            None
        }
    }
}

/// Resolve an identifier inside a modifies list. Pseudo spellings win
/// over declared names, with a warning when they shadow one.
pub fn resolve_modifies_id(
    reporter: &dyn Reporter,
    table: &SymbolTable,
    name: &str,
    loc: &Loc,
) -> Option<StoreRef> {
    if let Some(r) = pseudo_ref(name) {
        if table.lookup(name).is_some() {
            warn_syntax(
                reporter,
                format!(
                    "{} is declared but has special meaning in a modifies list \
                     (special meaning assumed)",
                    name
                ),
                loc,
            );
        }
        return Some(r);
    }
    match table.lookup(name) {
        Some(id) => Some(table.entry(id).sref.clone()),
        None => {
            reporter.report(Diagnostic::warning(
                Category::UnrecognizedIdentifier,
                format!("unrecognized identifier in modifies list: {}", name),
                loc.clone(),
            ));
            None
        }
    }
}

/// Resolve an identifier inside a state clause. State clauses constrain
/// parameters and the result; globals are rejected.
pub fn resolve_state_clause_id(
    reporter: &dyn Reporter,
    table: &SymbolTable,
    name: &str,
    loc: &Loc,
) -> Option<StoreRef> {
    if name == "result" {
        if table.lookup(name).is_some() {
            warn_syntax(
                reporter,
                "result is declared but has special meaning in a state clause \
                 (special meaning assumed)"
                    .to_string(),
                loc,
            );
        }
        return Some(StoreRef::result(vigil_core::types::Ty::Unknown));
    }
    match table.lookup(name) {
        Some(id) => {
            let sref = &table.entry(id).sref;
            if matches!(
                sref.scope(),
                Some(VarScope::Global) | Some(VarScope::FileStatic)
            ) {
                warn_syntax(
                    reporter,
                    format!("global variable {} is not recognized in state clauses", name),
                    loc,
                );
                None
            } else {
                Some(sref.clone())
            }
        }
        None => {
            reporter.report(Diagnostic::warning(
                Category::UnrecognizedIdentifier,
                format!("unrecognized identifier in state clause: {}", name),
                loc.clone(),
            ));
            None
        }
    }
}
